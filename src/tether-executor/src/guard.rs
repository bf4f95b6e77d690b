//! Acquisition of several resources as one unit.
//!
//! Resources which need an explicit, fallible release step cannot rely
//! on [`Drop`] to report errors. [`acquire_all`] acquires a batch of
//! them in order and, when one acquisition fails, releases everything
//! acquired before it so that nothing leaks on the error path.

use std::{
    error::Error,
    fmt, fs,
    io::{self, Write},
};

/// A resource which must be released explicitly.
pub trait Release {
    /// The error produced by a failed release.
    type Error;

    /// Releases the resource, reporting whether it went cleanly.
    fn release(self) -> Result<(), Self::Error>;
}

/// Files release by syncing their contents to disk.
///
/// Meant for files opened for writing.
impl Release for fs::File {
    type Error = io::Error;

    fn release(self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Buffered writers release by flushing, then releasing the inner writer.
impl<W> Release for io::BufWriter<W>
where
    W: Write + Release<Error = io::Error>,
{
    type Error = io::Error;

    fn release(self) -> io::Result<()> {
        self.into_inner()
            .map_err(io::IntoInnerError::into_error)?
            .release()
    }
}

/// Errors from releasing a batch of resources.
///
/// Each failure is paired with the position of its resource in the
/// batch.
#[derive(Debug)]
pub struct ReleaseErrors<R> {
    pub failures: Vec<(usize, R)>,
}

impl<R: fmt::Display> fmt::Display for ReleaseErrors<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to release {} resource(s)", self.failures.len())?;
        for (position, e) in &self.failures {
            write!(f, "; #{position}: {e}")?;
        }

        Ok(())
    }
}

impl<R: fmt::Debug + fmt::Display> Error for ReleaseErrors<R> {}

/// The error produced when [`acquire_all`] fails.
///
/// It carries the acquisition error along with the outcome of the
/// rollback, so callers see both what failed and what was cleaned up.
#[derive(Debug)]
pub struct BatchError<N, E, R> {
    /// The name whose acquisition failed.
    pub name: N,
    /// The acquisition error.
    pub source: E,
    /// Names of the resources which were released cleanly during rollback.
    pub released: Vec<N>,
    /// Names and errors of the resources which failed to release.
    pub release_failures: Vec<(N, R)>,
}

impl<N, E, R> BatchError<N, E, R> {
    /// Whether every previously acquired resource was released cleanly.
    #[inline]
    pub fn rolled_back_cleanly(&self) -> bool {
        self.release_failures.is_empty()
    }

    /// Converts every name in the error, keeping the errors themselves.
    pub fn map_names<M>(self, mut f: impl FnMut(N) -> M) -> BatchError<M, E, R> {
        BatchError {
            name: f(self.name),
            source: self.source,
            released: self.released.into_iter().map(&mut f).collect(),
            release_failures: self
                .release_failures
                .into_iter()
                .map(|(name, e)| (f(name), e))
                .collect(),
        }
    }
}

impl<N, E, R> fmt::Display for BatchError<N, E, R>
where
    N: fmt::Display,
    E: fmt::Display,
    R: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to acquire '{}': {}", self.name, self.source)?;

        if !self.released.is_empty() {
            f.write_str("; released")?;
            for (i, name) in self.released.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                write!(f, "{sep}'{name}'")?;
            }
        }

        for (name, e) in &self.release_failures {
            write!(f, "; failed to release '{name}': {e}")?;
        }

        Ok(())
    }
}

impl<N, E, R> Error for BatchError<N, E, R>
where
    N: fmt::Debug + fmt::Display,
    E: Error + 'static,
    R: fmt::Debug + fmt::Display,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Acquires a resource for every name, in order.
///
/// On success, ownership of every handle passes to the caller, who is
/// then responsible for releasing them, e.g. through [`release_all`].
///
/// When `acquire` fails, no further names are tried. Every handle
/// acquired so far is released in reverse order, continuing past
/// failed releases, and the returned [`BatchError`] describes both
/// the acquisition error and the rollback.
///
/// An empty list of names yields an empty batch without ever calling
/// `acquire`.
pub fn acquire_all<N, H, E, F>(
    names: impl IntoIterator<Item = N>,
    mut acquire: F,
) -> Result<Vec<H>, BatchError<N, E, H::Error>>
where
    H: Release,
    H::Error: fmt::Display,
    F: FnMut(&N) -> Result<H, E>,
{
    let mut acquired: Vec<(N, H)> = Vec::new();

    for name in names {
        match acquire(&name) {
            Ok(handle) => acquired.push((name, handle)),
            Err(source) => {
                log::debug!("Acquisition #{} failed; rolling back", acquired.len());

                let mut released = Vec::with_capacity(acquired.len());
                let mut release_failures = Vec::new();
                while let Some((held, handle)) = acquired.pop() {
                    let position = acquired.len();
                    match handle.release() {
                        Ok(()) => released.push(held),
                        Err(e) => {
                            log::warn!(
                                "Failed to release resource #{position} during rollback: {e}"
                            );
                            release_failures.push((held, e));
                        }
                    }
                }

                return Err(BatchError {
                    name,
                    source,
                    released,
                    release_failures,
                });
            }
        }
    }

    Ok(acquired.into_iter().map(|(_, handle)| handle).collect())
}

/// Releases every handle in the batch, in order.
///
/// A failed release does not stop the remaining ones; all failures
/// are reported together.
pub fn release_all<H>(handles: impl IntoIterator<Item = H>) -> Result<(), ReleaseErrors<H::Error>>
where
    H: Release,
{
    let failures: Vec<_> = handles
        .into_iter()
        .enumerate()
        .filter_map(|(position, handle)| handle.release().err().map(|e| (position, e)))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReleaseErrors { failures })
    }
}
