use std::{
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use clap::Args;
use eyre::Context;
use serde::Serialize;
use tether_executor::{CancelGate, Failure, Outcome, tally::Kind};

use super::Command;
use crate::{
    cli::{HYPHEN, Inputs, Workers, output_path},
    utils,
};

// How many lines to read between two looks at the cancellation gate.
const CHECK_INTERVAL: usize = 4096;

/// Subcommand for summing the integers in many files concurrently.
///
/// Every input file is expected to hold one integer per line. Empty
/// lines are skipped.
#[derive(Debug, Args)]
pub struct Sum {
    #[clap(flatten)]
    inputs: Inputs,

    #[clap(flatten)]
    workers: Workers,

    /// Where to write the JSON report.
    ///
    /// Defaults to "-" for printing the report to stdout.
    #[clap(short, long, default_value = HYPHEN)]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct Entry<'a> {
    index: usize,
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    sum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: f64,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    files: Vec<Entry<'a>>,
    total: i64,
    succeeded: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled: Option<String>,
    outstanding: usize,
    elapsed_ms: f64,
}

/// Sums the integers in a file, one per line.
fn sum_file(path: &Path, gate: &CancelGate) -> eyre::Result<i64> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;

    let mut sum = 0i64;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        if i % CHECK_INTERVAL == 0 && gate.is_cancelled() {
            eyre::bail!("cancelled after {i} lines");
        }

        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: i64 = line
            .parse()
            .with_context(|| format!("line {}: '{line}' is not an integer", i + 1))?;
        sum = sum
            .checked_add(value)
            .ok_or_else(|| eyre::eyre!("line {}: sum overflows", i + 1))?;
    }

    Ok(sum)
}

impl Command for Sum {
    fn handle(self) -> eyre::Result<()> {
        let paths = self.inputs.evaluate()?;
        let ex = self.workers.executor()?;

        let session = ex.dispatch(
            paths.clone(),
            self.workers.timeout(),
            |path: PathBuf, gate: &CancelGate| sum_file(&path, gate),
        );

        let (cancelled, outstanding) = match &session.outcome {
            Outcome::Finished(..) => (None, 0),
            Outcome::Cancelled(c) => (Some(c.reason.to_string()), c.outstanding),
        };

        let mut total = 0i64;
        let mut files = Vec::with_capacity(paths.len());
        for c in session.outcome.into_completed() {
            let (sum, error) = match c.result {
                Ok(sum) => {
                    total = total.saturating_add(sum);
                    (Some(sum), None)
                }

                Err(e) => {
                    let message = match e {
                        Failure::Failed(e) => format!("{e:#}"),
                        e => e.to_string(),
                    };

                    log::warn!("Failed to sum '{}': {message}", paths[c.index].display());
                    (None, Some(message))
                }
            };

            files.push(Entry {
                index: c.index,
                path: &paths[c.index],
                sum,
                error,
                duration_ms: utils::millis(c.duration),
            });
        }

        let succeeded = files.iter().filter(|e| e.sum.is_some()).count();
        let failed = files.len() - succeeded;
        log::debug!("{}", session.tally);
        if session.tally.get(Kind::Discarded) > 0 {
            log::info!(
                "Discarded {} result(s) which arrived after cancellation",
                session.tally.get(Kind::Discarded)
            );
        }

        let report = Report {
            files,
            total,
            succeeded,
            failed,
            cancelled: cancelled.clone(),
            outstanding,
            elapsed_ms: utils::millis(session.elapsed),
        };
        utils::serialize_to_output(output_path(&self.output), &report)?;

        if let Some(reason) = cancelled {
            eyre::bail!("batch cancelled ({reason}) with {outstanding} file(s) outstanding");
        }
        eyre::ensure!(failed == 0, "{failed} of {} file(s) failed", paths.len());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use super::*;

    fn fixture(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tether-sum-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_sum_file() {
        let path = fixture("numbers.txt", "1\n2\n\n-4\n  10  \n");
        assert_eq!(sum_file(&path, &CancelGate::new()).unwrap(), 9);
    }

    #[test]
    fn test_sum_file_rejects_garbage() {
        let path = fixture("garbage.txt", "1\ntwo\n3\n");
        let err = sum_file(&path, &CancelGate::new()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
    }

    #[test]
    fn test_sum_file_missing() {
        let path = std::env::temp_dir().join("tether-sum-does-not-exist.txt");
        assert!(sum_file(&path, &CancelGate::new()).is_err());
    }

    #[test]
    fn test_sum_file_honors_cancellation() {
        let path = fixture("cancelled.txt", "1\n");
        let gate = CancelGate::with_timeout(Duration::ZERO);

        let err = sum_file(&path, &gate).unwrap_err();
        assert!(err.to_string().contains("cancelled"), "{err}");
    }
}
