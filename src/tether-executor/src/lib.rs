//! Implementation of a worker pool for batches of independent tasks.
//!
//! # Motivation
//!
//! Fanning a batch of blocking operations, such as remote calls or file
//! I/O, out to a handful of threads is easy. Making sure none of those
//! threads is still busy after the caller stopped caring about the
//! results is the part that usually goes wrong, especially once
//! timeouts come into play.
//!
//! # Design
//!
//! The [`Executor`] seeds a bounded queue with one [`Task`] per input,
//! lets a fixed number of workers drain it and collects exactly one
//! [`Completed`] result per claimed task. A [`CancelGate`] shared by all
//! parties carries explicit stop requests and deadlines.
//!
//! A dispatch call never returns while one of its workers is running,
//! so no work started on behalf of a batch outlives it. Results of
//! tasks that finish after cancellation are discarded rather than
//! left behind.
//!
//! [`acquire_all`] applies the same discipline to acquiring several
//! resources in a row: when one acquisition fails, everything acquired
//! before it is released again.

#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod executor;
pub use executor::*;

pub mod gate;
pub use gate::{CancelGate, CancelReason, Wait};

pub mod guard;
pub use guard::{acquire_all, release_all, BatchError, Release, ReleaseErrors};

pub mod tally;
pub use tally::Tally;

mod task;
pub use task::{Completed, Failure, Task};
