use std::{
    env, thread,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    gate::{CancelGate, CancelReason},
    tally::Tally,
    task::Completed,
};

mod current;
use current::Current;

mod session;

mod threaded;
use threaded::Threaded;

/// The environment variable consulted by [`Executor::get`].
pub const TETHER_WORKER_THREADS: &str = "TETHER_WORKER_THREADS";

/// An invalid worker configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BadConfiguration {
    #[error(
        "invalid value in {}; must be a natural number",
        TETHER_WORKER_THREADS
    )]
    Environment,
    #[error("an executor needs at least one worker")]
    NoWorkers,
}

fn available_threads() -> Result<usize, BadConfiguration> {
    match env::var(TETHER_WORKER_THREADS) {
        Ok(value) => value.trim().parse().map_err(|_| BadConfiguration::Environment),

        Err(_) => Ok(thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1)),
    }
}

/// Results of a dispatch session which was cancelled before every
/// task reported back.
#[derive(Debug)]
pub struct Cancelled<O, E> {
    /// Why the session was cancelled.
    pub reason: CancelReason,
    /// The results collected before cancellation, ordered by index.
    pub completed: Vec<Completed<O, E>>,
    /// The number of tasks without a collected result.
    ///
    /// Their workers have exited by the time this value is seen.
    pub outstanding: usize,
}

/// How a dispatch session ended.
#[derive(Debug)]
pub enum Outcome<O, E> {
    /// Every task reported back. Results are ordered by index, which
    /// matches the order of the dispatched inputs.
    Finished(Vec<Completed<O, E>>),
    /// The session was cancelled with tasks outstanding.
    Cancelled(Cancelled<O, E>),
}

impl<O, E> Outcome<O, E> {
    /// Whether the session was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(..))
    }

    /// Gets the collected results, ordered by index.
    pub fn completed(&self) -> &[Completed<O, E>] {
        match self {
            Self::Finished(completed) => completed,
            Self::Cancelled(c) => &c.completed,
        }
    }

    /// Consumes the outcome into the collected results.
    pub fn into_completed(self) -> Vec<Completed<O, E>> {
        match self {
            Self::Finished(completed) => completed,
            Self::Cancelled(c) => c.completed,
        }
    }
}

/// The summary of one dispatch session.
#[derive(Debug)]
pub struct Report<O, E> {
    /// The results of the session.
    pub outcome: Outcome<O, E>,
    /// Counters merged from all the workers.
    pub tally: Tally,
    /// Wall time of the whole session, including waiting for its workers
    /// to exit.
    pub elapsed: Duration,
}

/// An executor for batches of independent tasks.
///
/// Configuration is possible with the `TETHER_WORKER_THREADS`
/// environment variable specifying the number of threads to use.
/// If not set, falls back to [`thread::available_parallelism`].
///
/// The API is the same for both flavors of execution and users
/// should not need to worry about any execution flavor details.
///
/// Every call to [`Executor::dispatch`] returns only once all of its
/// workers have stopped, whether the batch finished or got cancelled.
pub enum Executor {
    /// A single-threaded executor on the current thread.
    Current(Current),
    /// A multithreaded executor performing work on background threads.
    Threaded(Threaded),
}

impl Executor {
    /// Creates a single-threaded executor on the current thread.
    #[inline]
    pub fn current() -> Self {
        Self::Current(Current::new())
    }

    /// Creates an executor running `workers` tasks concurrently.
    pub fn new(workers: usize) -> Result<Self, BadConfiguration> {
        match workers {
            0 => Err(BadConfiguration::NoWorkers),
            1 => Ok(Self::current()),
            n => Ok(Self::Threaded(Threaded::new(n))),
        }
    }

    /// Gets the preferred executor for the configuration of available
    /// worker threads on the system.
    #[inline]
    pub fn get() -> Result<Self, BadConfiguration> {
        Self::new(available_threads()?)
    }

    /// Gets the number of workers a dispatch session starts.
    #[inline]
    pub fn workers(&self) -> usize {
        match self {
            Self::Current(..) => 1,
            Self::Threaded(t) => t.workers(),
        }
    }

    /// Gets the number of workers which are still running or waiting
    /// to run, across all sessions in progress on this executor.
    ///
    /// Workers of a session never count once its dispatch call has
    /// returned, so this is zero while no session is in progress.
    #[inline]
    pub fn active_workers(&self) -> usize {
        match self {
            Self::Current(..) => 0,
            Self::Threaded(t) => t.active_workers(),
        }
    }

    /// Runs `work` for every input and collects the results.
    ///
    /// When `timeout` is given, the session is cancelled once it has
    /// elapsed. See [`Executor::dispatch_with`] for details.
    pub fn dispatch<I, O, E, F>(
        &self,
        inputs: Vec<I>,
        timeout: Option<Duration>,
        work: F,
    ) -> Report<O, E>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(I, &CancelGate) -> Result<O, E> + Send + Sync + 'static,
    {
        let gate = match timeout {
            Some(timeout) => CancelGate::with_timeout(timeout),
            None => CancelGate::new(),
        };

        self.dispatch_with(inputs, &gate, work)
    }

    /// Runs `work` for every input under the given cancellation gate.
    ///
    /// Each worker claims tasks one by one and reports exactly one
    /// result per claimed task, failures and panics included. Once the
    /// gate closes, workers stop claiming tasks and results that arrive
    /// afterwards are no longer collected.
    ///
    /// Cancellation is cooperative. A work function that blocks without
    /// consulting the gate holds up the end of the session until it
    /// returns, because this never returns while a worker is running.
    pub fn dispatch_with<I, O, E, F>(
        &self,
        inputs: Vec<I>,
        gate: &CancelGate,
        work: F,
    ) -> Report<O, E>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(I, &CancelGate) -> Result<O, E> + Send + Sync + 'static,
    {
        let start = Instant::now();
        log::debug!(
            "Dispatching {} tasks onto {} workers",
            inputs.len(),
            self.workers()
        );

        let (collector, mut tally) = match self {
            Self::Current(c) => c.dispatch(inputs, gate, work),
            Self::Threaded(t) => t.dispatch(inputs, gate, work),
        };
        let outcome = collector.finish(gate, &mut tally);

        let elapsed = start.elapsed();
        match &outcome {
            Outcome::Finished(..) => log::debug!("Session finished in {elapsed:?}: {tally}"),
            Outcome::Cancelled(c) => log::debug!(
                "Session cancelled ({}) after {elapsed:?} with {} tasks outstanding: {tally}",
                c.reason,
                c.outstanding,
            ),
        }

        Report {
            outcome,
            tally,
            elapsed,
        }
    }
}
