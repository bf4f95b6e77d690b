use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::Args;
use eyre::Context;
use tether_executor::{acquire_all, release_all};

use super::Command;
use crate::{cli::HYPHEN, utils};

/// Subcommand for copying one input into several output files.
///
/// All outputs are created before anything gets written. When one of
/// them cannot be created, the ones created so far are closed again
/// and nothing is copied.
#[derive(Debug, Args)]
pub struct Tee {
    /// The input to copy.
    ///
    /// When the value is "-", the input will be read from stdin.
    input: String,

    /// The output files to create.
    #[clap(required = true)]
    outputs: Vec<PathBuf>,

    /// Refuses to overwrite existing output files.
    #[clap(short, long, default_value_t = false)]
    no_clobber: bool,
}

fn open_options(no_clobber: bool) -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.write(true);

    if no_clobber {
        opts.create_new(true);
    } else {
        opts.create(true).truncate(true);
    }

    opts
}

fn copy_into(outputs: Vec<PathBuf>, data: &[u8], opts: &OpenOptions) -> eyre::Result<()> {
    // The rollback is part of the error, along with the failed creation.
    let mut writers = acquire_all(outputs, |path| opts.open(path).map(BufWriter::new))
        .map_err(|e| eyre::Report::new(e.map_names(|path| path.display().to_string())))?;

    // Every writer gets released, even when writing to one of them fails.
    let written = writers.iter_mut().try_for_each(|w| w.write_all(data));
    let released = release_all(writers);

    written.wrap_err("failed to write outputs")?;
    released.wrap_err("failed to close outputs")?;

    Ok(())
}

fn read_input(input: &str) -> eyre::Result<Vec<u8>> {
    if input == HYPHEN {
        Ok(utils::read_stdin()?)
    } else {
        let path = Path::new(input);
        fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))
    }
}

impl Command for Tee {
    fn handle(self) -> eyre::Result<()> {
        let data = read_input(&self.input)?;
        let count = self.outputs.len();

        copy_into(self.outputs, &data, &open_options(self.no_clobber))?;
        log::info!("Copied {} bytes into {count} file(s)", data.len());

        Ok(())
    }
}
