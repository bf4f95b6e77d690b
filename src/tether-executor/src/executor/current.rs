use super::session::{self, Collector};
use crate::{gate::CancelGate, tally::Tally};

/// An executor flavor which carries out every task on the
/// current thread in sequential order.
pub struct Current;

impl Current {
    #[inline]
    pub(super) fn new() -> Self {
        Self
    }

    pub(super) fn dispatch<I, O, E, F>(
        &self,
        inputs: Vec<I>,
        gate: &CancelGate,
        work: F,
    ) -> (Collector<O, E>, Tally)
    where
        F: Fn(I, &CancelGate) -> Result<O, E>,
    {
        let mut collector = Collector::new(inputs.len());

        // The calling thread is the only worker, so results are handed
        // to the collector the moment they are produced.
        let queue = session::seed(inputs);
        let tally = session::work_loop(0, &queue, gate, &work, |c| collector.offer(c, gate));

        (collector, tally)
    }
}
