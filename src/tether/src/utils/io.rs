use std::{
    io::{self, IsTerminal, Read},
    process,
};

use clap::CommandFactory;

use crate::cli::Cli;

/// Reads all of stdin into memory.
///
/// This function will terminate the process and print the running
/// command's help if stdin is connected to a terminal.
pub fn read_stdin() -> io::Result<Vec<u8>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        let _ = Cli::command().print_help();
        process::exit(2);
    }

    let mut buf = Vec::new();
    stdin.lock().read_to_end(&mut buf)?;

    Ok(buf)
}
