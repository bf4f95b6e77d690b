use clap::{Parser, Subcommand};

use crate::cmd::*;

mod args;
pub use args::Workers;

pub mod io;
pub use io::*;

pub const HYPHEN: &str = "-";

/// The CLI interface for the Tether application.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    /// The selected command.
    #[clap(subcommand)]
    pub command: TetherCommand,

    #[clap(flatten)]
    pub verbosity: args::Verbosity,
}

/// The top-level commands supported by Tether.
#[derive(Debug, Subcommand)]
pub enum TetherCommand {
    Sum(sum::Sum),
    Tee(tee::Tee),
}

impl Command for TetherCommand {
    fn handle(self) -> eyre::Result<()> {
        match self {
            Self::Sum(sum) => sum.handle(),
            Self::Tee(tee) => tee.handle(),
        }
    }
}
