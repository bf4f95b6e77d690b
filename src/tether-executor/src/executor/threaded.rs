use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc::{self, RecvTimeoutError},
    Arc, Mutex, PoisonError,
};

use threadpool::{Builder, ThreadPool};

use super::session::{self, Collector};
use crate::{gate::CancelGate, tally::Tally, task::Completed};

const WORKER_NAME: &str = "tether-worker";
const WORKER_STACK: usize = 1_048_576;

fn make_worker_pool(nthreads: usize) -> ThreadPool {
    Builder::new()
        .num_threads(nthreads)
        .thread_name(WORKER_NAME.into())
        .thread_stack_size(WORKER_STACK)
        .build()
}

enum Notification<O, E> {
    Done(Completed<O, E>),
    Exit(Tally),
}

/// An executor flavor which processes tasks on background threads.
pub struct Threaded {
    pool: ThreadPool,
    nthreads: usize,
    sessions: Mutex<usize>,
    running: Arc<AtomicUsize>,
}

/// Keeps the pool grown by one session's worth of threads while a
/// dispatch session is in progress.
struct Lease<'a> {
    threaded: &'a Threaded,
}

impl Threaded {
    pub(super) fn new(nthreads: usize) -> Self {
        Self {
            pool: make_worker_pool(nthreads),
            nthreads,
            sessions: Mutex::new(0),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    pub(super) fn workers(&self) -> usize {
        self.nthreads
    }

    #[inline]
    pub(super) fn active_workers(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    // Every session gets `nthreads` threads of its own, so concurrent
    // sessions never queue their workers behind each other.
    fn resize(&self, sessions: usize) {
        // Clones share the pool, only the handle is needed mutably.
        self.pool
            .clone()
            .set_num_threads(self.nthreads * sessions.max(1));
    }

    fn lease(&self) -> Lease<'_> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        *sessions += 1;
        self.resize(*sessions);

        Lease { threaded: self }
    }

    pub(super) fn dispatch<I, O, E, F>(
        &self,
        inputs: Vec<I>,
        gate: &CancelGate,
        work: F,
    ) -> (Collector<O, E>, Tally)
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(I, &CancelGate) -> Result<O, E> + Send + Sync + 'static,
    {
        let mut collector = Collector::new(inputs.len());
        let mut tally = Tally::new();

        let _lease = self.lease();
        let queue = Arc::new(session::seed(inputs));
        let work = Arc::new(work);
        let (tx, rx) = mpsc::channel();

        for worker in 0..self.nthreads {
            let queue = queue.clone();
            let gate = gate.clone();
            let work = work.clone();
            let tx = tx.clone();
            let running = self.running.clone();

            running.fetch_add(1, Ordering::AcqRel);
            self.pool.execute(move || {
                let shard = session::work_loop(worker, &queue, &gate, &*work, |c| {
                    let _ = tx.send(Notification::Done(c));
                });

                // Nothing of the session is touched past this point.
                drop((queue, gate, work));
                running.fetch_sub(1, Ordering::AcqRel);
                let _ = tx.send(Notification::Exit(shard));
            });
        }

        // Only the workers hold senders from here on.
        drop(tx);

        // No worker of this session may outlive it, so listening goes on
        // until every one of them has exited. Results arriving after the
        // collector closed are discarded.
        let mut alive = self.nthreads;
        while alive > 0 {
            let received = match gate.remaining() {
                Some(timeout) if !collector.is_done() => rx.recv_timeout(timeout),
                _ => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Notification::Done(c)) => collector.offer(c, gate),
                Ok(Notification::Exit(shard)) => {
                    alive -= 1;
                    tally += shard;
                }

                Err(RecvTimeoutError::Timeout) => {
                    // The deadline passed; this latches the transition.
                    gate.cancel();
                    collector.close();
                }

                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        (collector, tally)
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let threaded = self.threaded;
        let mut sessions = threaded
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *sessions -= 1;
        threaded.resize(*sessions);
    }
}

impl Drop for Threaded {
    fn drop(&mut self) {
        self.pool.join();
    }
}
