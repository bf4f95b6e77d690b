mod io;
pub use io::*;

mod serde;
pub use serde::*;

/// Converts a [`std::time::Duration`] into fractional milliseconds
/// for reports.
#[inline]
pub fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
