use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::gate::CancelGate;

/// A unit of work queued for the executor.
///
/// Tasks are created by the dispatch session, one per input, and
/// moved by value into the worker that claims them.
#[derive(Debug)]
pub struct Task<I> {
    /// The position of the input in the dispatched batch.
    pub index: usize,
    /// The input to hand to the work function.
    pub input: I,
}

/// The reason a task did not produce an output.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Failure<E> {
    /// The work function returned an error.
    #[error("{0}")]
    Failed(E),
    /// The work function panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl<E> Failure<E> {
    /// Gets the error returned by the work function, if any.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Panicked(..) => None,
        }
    }
}

/// The result of a finished [`Task`].
#[derive(Debug)]
pub struct Completed<O, E> {
    /// The position of the input in the dispatched batch.
    pub index: usize,
    /// Either the output of the work function or its failure.
    pub result: Result<O, Failure<E>>,
    /// Wall time spent in the work function.
    pub duration: Duration,
}

impl<O, E> Completed<O, E> {
    /// Whether the task produced an output.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

impl<I> Task<I> {
    /// Runs the work function on this task's input and captures the
    /// outcome, including panics.
    pub(crate) fn process<O, E, F>(self, work: &F, gate: &CancelGate) -> Completed<O, E>
    where
        F: Fn(I, &CancelGate) -> Result<O, E>,
    {
        let Task { index, input } = self;
        log::trace!("Running task #{index}");

        let start = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| work(input, gate))) {
            Ok(result) => result.map_err(Failure::Failed),
            Err(payload) => {
                let message = panic_message(&*payload);
                log::warn!("Task #{index} panicked: {message}");

                Err(Failure::Panicked(message))
            }
        };

        Completed {
            index,
            result,
            duration: start.elapsed(),
        }
    }
}
