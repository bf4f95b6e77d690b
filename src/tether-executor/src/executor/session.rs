use crossbeam_queue::ArrayQueue;

use super::{Cancelled, Outcome};
use crate::{
    gate::{CancelGate, CancelReason},
    tally::{Kind, Tally},
    task::{Completed, Task},
};

/// Builds the task queue for a batch, one task per input.
///
/// The queue is sized to the batch and fully seeded before any
/// worker starts, so claiming a task never waits on a producer.
pub(super) fn seed<I>(inputs: Vec<I>) -> ArrayQueue<Task<I>> {
    // `ArrayQueue` rejects a capacity of zero.
    let queue = ArrayQueue::new(inputs.len().max(1));

    for (index, input) in inputs.into_iter().enumerate() {
        let pushed = queue.push(Task { index, input }).is_ok();
        debug_assert!(pushed, "queue is sized for the whole batch");
    }

    queue
}

/// The loop every worker runs: claim a task, process it, emit exactly
/// one result for it, repeat until the queue is empty or the gate
/// closes.
///
/// Returns the worker's own shard of the session tally.
pub(super) fn work_loop<I, O, E, F>(
    worker: usize,
    queue: &ArrayQueue<Task<I>>,
    gate: &CancelGate,
    work: &F,
    mut emit: impl FnMut(Completed<O, E>),
) -> Tally
where
    F: Fn(I, &CancelGate) -> Result<O, E>,
{
    let mut tally = Tally::new();

    // Checking the gate before claiming leaves unclaimed tasks in the
    // queue, where they are dropped along with it.
    while !gate.is_cancelled() {
        let Some(task) = queue.pop() else {
            break;
        };

        let completed = task.process(work, gate);
        tally.record(&completed);
        emit(completed);
    }

    log::trace!("Worker {worker} exiting ({tally})");
    tally
}

/// Collects results by their index until all arrived or the session
/// is cancelled.
pub(super) struct Collector<O, E> {
    slots: Vec<Option<Completed<O, E>>>,
    received: usize,
    discarded: usize,
    closed: bool,
}

impl<O, E> Collector<O, E> {
    pub fn new(total: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(total).collect(),
            received: 0,
            discarded: 0,
            closed: false,
        }
    }

    /// Whether the drain loop can stop listening for results.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.closed || self.received == self.slots.len()
    }

    /// Stops collecting; everything offered from now on is discarded.
    #[inline]
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Offers a result for collection.
    ///
    /// Results arriving once the gate is closed are not collected.
    pub fn offer(&mut self, completed: Completed<O, E>, gate: &CancelGate) {
        if !self.closed && gate.is_cancelled() {
            self.close();
        }

        if self.closed {
            log::trace!("Discarding result of task #{}", completed.index);
            self.discarded += 1;
            return;
        }

        // Workers emit exactly one result per claimed task, and tasks
        // are only ever claimed once from the queue.
        let index = completed.index;
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(completed);
                self.received += 1;
            }

            _ => debug_assert!(false, "unexpected result for task #{index}"),
        }
    }

    /// Turns the collected results into the session outcome.
    pub fn finish(self, gate: &CancelGate, tally: &mut Tally) -> Outcome<O, E> {
        for _ in 0..self.discarded {
            tally.bump(Kind::Discarded);
        }

        let outstanding = self.slots.len() - self.received;
        let completed: Vec<_> = self.slots.into_iter().flatten().collect();

        if outstanding == 0 {
            Outcome::Finished(completed)
        } else {
            Outcome::Cancelled(Cancelled {
                reason: gate.reason().unwrap_or(CancelReason::Stopped),
                completed,
                outstanding,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::task::Failure;

    fn completed(index: usize) -> Completed<usize, ()> {
        Completed {
            index,
            result: Ok(index),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn seed_preserves_positions() {
        let queue = seed(vec!["a", "b", "c"]);

        let tasks: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|t| (t.index, t.input))
            .collect();
        assert_eq!(tasks, [(0, "a"), (1, "b"), (2, "c")]);
    }

    #[test]
    fn seed_accepts_empty_batch() {
        let queue = seed(Vec::<u8>::new());
        assert!(queue.is_empty());
    }

    #[test]
    fn collector_orders_by_index() {
        let gate = CancelGate::new();
        let mut collector = Collector::new(3);

        for index in [2, 0, 1] {
            assert!(!collector.is_done());
            collector.offer(completed(index), &gate);
        }
        assert!(collector.is_done());

        let mut tally = Tally::new();
        let Outcome::Finished(results) = collector.finish(&gate, &mut tally) else {
            panic!("expected a finished outcome");
        };

        let indices: Vec<_> = results.iter().map(|c| c.index).collect();
        assert_eq!(indices, [0, 1, 2]);
        assert_eq!(tally.get(Kind::Discarded), 0);
    }

    #[test]
    fn collector_discards_after_cancel() {
        let gate = CancelGate::new();
        let mut collector = Collector::new(3);

        collector.offer(completed(1), &gate);
        gate.cancel();
        collector.offer(completed(0), &gate);
        assert!(collector.is_done());

        let mut tally = Tally::new();
        let Outcome::Cancelled(cancelled) = collector.finish(&gate, &mut tally) else {
            panic!("expected a cancelled outcome");
        };

        assert_eq!(cancelled.reason, CancelReason::Stopped);
        assert_eq!(cancelled.outstanding, 2);
        assert_eq!(cancelled.completed.len(), 1);
        assert_eq!(cancelled.completed[0].index, 1);
        assert_eq!(tally.get(Kind::Discarded), 1);
    }

    #[test]
    fn work_loop_stops_on_closed_gate() {
        let gate = CancelGate::new();
        let queue = seed(vec![1, 2, 3, 4]);

        let mut emitted = Vec::new();
        let tally = work_loop(
            0,
            &queue,
            &gate,
            &|n: i32, gate: &CancelGate| {
                if n == 2 {
                    gate.cancel();
                }
                if n % 2 == 0 { Err("even") } else { Ok(n) }
            },
            |c| emitted.push(c),
        );

        // The task that closed the gate still reports, the rest stay queued.
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1].result, Err(Failure::Failed("even")));
        assert_eq!(tally.get(Kind::Succeeded), 1);
        assert_eq!(tally.get(Kind::Failed), 1);
        assert_eq!(queue.len(), 2);
    }
}
