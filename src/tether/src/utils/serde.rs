use std::{
    fs,
    io::{self, BufWriter, IsTerminal, Write},
    path::Path,
};

use serde::Serialize;

/// Serializes the given value to a file or, when no path is given,
/// to stdout.
///
/// This will produce valid JSON. If the output is a file or piped to
/// another application, a minified representation will be emitted.
///
/// Output to stdout always gets pretty-printed when it is a terminal.
pub fn serialize_to_output<T: Serialize>(out: Option<&Path>, value: &T) -> eyre::Result<()> {
    match out {
        Some(path) => {
            let file = fs::File::create(path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, value)?;
            writer.flush()?;
        }

        None => {
            let mut stdout = io::stdout().lock();
            if stdout.is_terminal() {
                serde_json::to_writer_pretty(&mut stdout, value)?;
            } else {
                serde_json::to_writer(&mut stdout, value)?;
            }
            writeln!(stdout)?;
        }
    }

    Ok(())
}
