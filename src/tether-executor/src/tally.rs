use std::{fmt, ops::AddAssign};

use enum_map::{Enum, EnumMap};

use crate::task::{Completed, Failure};

/// Categories counted by a [`Tally`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum)]
pub enum Kind {
    /// Tasks whose work function returned an output.
    Succeeded,
    /// Tasks whose work function returned an error.
    Failed,
    /// Tasks whose work function panicked.
    Panicked,
    /// Tasks which finished after the session was cancelled and whose
    /// results were therefore not collected.
    Discarded,
}

/// Counters for the tasks processed in one dispatch session.
///
/// Every worker owns a tally of its own and hands it back to the
/// session on exit, where the shards get merged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    counts: EnumMap<Kind, usize>,
}

impl Tally {
    /// Creates a tally with all counters at zero.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the count for `kind`.
    #[inline]
    pub fn get(&self, kind: Kind) -> usize {
        self.counts[kind]
    }

    /// Gets the number of tasks the workers ran to completion, whether
    /// their results were collected or not.
    pub fn processed(&self) -> usize {
        self.get(Kind::Succeeded) + self.get(Kind::Failed) + self.get(Kind::Panicked)
    }

    pub(crate) fn bump(&mut self, kind: Kind) {
        self.counts[kind] += 1;
    }

    pub(crate) fn record<O, E>(&mut self, completed: &Completed<O, E>) {
        let kind = match completed.result {
            Ok(..) => Kind::Succeeded,
            Err(Failure::Failed(..)) => Kind::Failed,
            Err(Failure::Panicked(..)) => Kind::Panicked,
        };

        self.bump(kind);
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        for (kind, count) in rhs.counts {
            self.counts[kind] += count;
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} panicked, {} discarded",
            self.get(Kind::Succeeded),
            self.get(Kind::Failed),
            self.get(Kind::Panicked),
            self.get(Kind::Discarded),
        )
    }
}
