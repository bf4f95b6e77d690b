use std::time::Duration;

use clap::{ArgAction, Args};
use tether_executor::{Executor, TETHER_WORKER_THREADS};

/// Configures the verbosity of the builtin logger.
#[derive(Clone, Copy, Debug, Args)]
pub struct Verbosity {
    /// Configures the log verbosity of Tether.
    ///
    /// `-v` is Debug, `-vv` is Trace.
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Verbosity {
    /// Configures the global logger based on the settings.
    pub fn setup(self) {
        let level = self.log_level();
        if let Err(e) = simple_logger::init_with_level(level) {
            eprintln!("failed to set up logging: {e}");
        }
    }

    fn log_level(self) -> log::Level {
        match self.verbose {
            0 => log::Level::Info,
            1 => log::Level::Debug,
            _ => log::Level::Trace,
        }
    }
}

/// Options for commands which spread work over a pool of workers.
#[derive(Clone, Copy, Debug, Args)]
pub struct Workers {
    /// The number of files to process concurrently.
    ///
    /// Defaults to the available parallelism of the system.
    #[clap(short, long, env = TETHER_WORKER_THREADS)]
    pub jobs: Option<usize>,

    /// Gives up on the batch after this many milliseconds.
    ///
    /// Files still being processed at that point are abandoned
    /// cooperatively; the command waits for them to stop before
    /// it exits.
    #[clap(short, long)]
    pub timeout: Option<u64>,
}

impl Workers {
    /// Builds the executor for the configured number of workers.
    pub fn executor(self) -> eyre::Result<Executor> {
        let ex = match self.jobs {
            Some(n) => Executor::new(n)?,
            None => Executor::get()?,
        };

        Ok(ex)
    }

    /// Gets the configured timeout.
    #[inline]
    pub fn timeout(self) -> Option<Duration> {
        self.timeout.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        let level = |verbose| Verbosity { verbose }.log_level();

        assert_eq!(level(0), log::Level::Info);
        assert_eq!(level(1), log::Level::Debug);
        assert_eq!(level(5), log::Level::Trace);
    }

    #[test]
    fn test_worker_options() {
        let workers = Workers {
            jobs: Some(3),
            timeout: Some(250),
        };

        assert_eq!(workers.executor().unwrap().workers(), 3);
        assert_eq!(workers.timeout(), Some(Duration::from_millis(250)));

        let workers = Workers {
            jobs: Some(0),
            timeout: None,
        };
        assert!(workers.executor().is_err());
    }
}
