use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Condvar, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

const ACTIVE: u8 = 0;
const STOPPED: u8 = 1;
const DEADLINE: u8 = 2;

/// Why a [`CancelGate`] was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancellation was requested explicitly through [`CancelGate::cancel`].
    Stopped,
    /// The deadline the gate was armed with expired.
    Deadline,
}

impl CancelReason {
    fn from_state(state: u8) -> Option<Self> {
        match state {
            STOPPED => Some(Self::Stopped),
            DEADLINE => Some(Self::Deadline),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

/// The outcome of [`CancelGate::wait_until_cancelled_or`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// The gate was closed before the duration elapsed.
    Cancelled,
    /// The full duration elapsed with the gate still open.
    Elapsed,
}

#[derive(Debug)]
struct Inner {
    state: AtomicU8,
    deadline: Option<Instant>,
    lock: Mutex<()>,
    signal: Condvar,
}

/// A shared signal for cooperative cancellation.
///
/// A gate starts out open and closes exactly once, either through an
/// explicit [`cancel`](Self::cancel) call or when its deadline passes.
/// Clones observe the same gate, so one can be handed to every worker
/// and every task of a dispatch session.
///
/// Cancellation is cooperative: work only stops at the points where it
/// consults the gate.
#[derive(Clone, Debug)]
pub struct CancelGate {
    inner: Arc<Inner>,
}

impl CancelGate {
    /// Creates an open gate without a deadline.
    #[inline]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a gate which closes once `timeout` has elapsed.
    #[inline]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    /// Creates a gate which closes at the given point in time.
    #[inline]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ACTIVE),
                deadline,
                lock: Mutex::new(()),
                signal: Condvar::new(),
            }),
        }
    }

    /// Closes the gate.
    ///
    /// Returns `true` if this call performed the transition and `false`
    /// if the gate was already closed. Calling this any number of times,
    /// from any number of threads, has the same effect as calling it once.
    #[inline]
    pub fn cancel(&self) -> bool {
        let reason = if self.deadline_passed() {
            DEADLINE
        } else {
            STOPPED
        };

        self.close(reason)
    }

    fn close(&self, reason: u8) -> bool {
        let closed = self
            .inner
            .state
            .compare_exchange(ACTIVE, reason, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if closed {
            // Taking the lock orders this notification after any waiter
            // that has checked the state but not yet started waiting.
            let _guard = self.lock();
            self.inner.signal.notify_all();
        }

        closed
    }

    /// Checks whether the gate is closed without blocking.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Gets the reason the gate was closed, if it is closed.
    pub fn reason(&self) -> Option<CancelReason> {
        let state = self.inner.state.load(Ordering::Acquire);
        if state == ACTIVE && self.deadline_passed() {
            self.close(DEADLINE);
            return CancelReason::from_state(self.inner.state.load(Ordering::Acquire));
        }

        CancelReason::from_state(state)
    }

    /// Gets the deadline of the gate, if it has one.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Gets the time left until the deadline passes.
    ///
    /// This is [`None`] for gates without a deadline and zero for gates
    /// past their deadline.
    #[inline]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Blocks the calling thread until either the gate closes or `duration`
    /// elapses, whichever happens first.
    ///
    /// Work units should use this in place of plain sleeps so they stay
    /// responsive to cancellation.
    pub fn wait_until_cancelled_or(&self, duration: Duration) -> Wait {
        let until = Instant::now().checked_add(duration);

        let mut guard = self.lock();
        let outcome = loop {
            // Reading the raw state here; `reason` may need the lock.
            if self.inner.state.load(Ordering::Acquire) != ACTIVE || self.deadline_passed() {
                break Wait::Cancelled;
            }

            let now = Instant::now();
            let wake = match (until, self.inner.deadline) {
                (Some(u), Some(d)) => u.min(d),
                (Some(u), None) => u,
                (None, Some(d)) => d,
                // Nothing but cancellation can end this wait.
                (None, None) => {
                    guard = self
                        .inner
                        .signal
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
            };

            if until.is_some_and(|u| now >= u) {
                break Wait::Elapsed;
            }

            guard = self
                .inner
                .signal
                .wait_timeout(guard, wake.saturating_duration_since(now))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        };
        drop(guard);

        if outcome == Wait::Cancelled {
            // Latch a deadline transition now that the lock is released.
            self.reason();
        }

        outcome
    }

    #[inline]
    fn deadline_passed(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    #[inline]
    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CancelGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let gate = CancelGate::new();
        assert!(!gate.is_cancelled());
        assert_eq!(gate.reason(), None);

        assert!(gate.cancel());
        assert!(!gate.cancel());

        assert!(gate.is_cancelled());
        assert_eq!(gate.reason(), Some(CancelReason::Stopped));
    }

    #[test]
    fn racing_cancels_close_once() {
        let gate = CancelGate::new();
        let start = std::sync::Barrier::new(8);

        let closed = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        start.wait();
                        gate.clone().cancel()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&closed| closed)
                .count()
        });

        assert_eq!(closed, 1);
        assert_eq!(gate.reason(), Some(CancelReason::Stopped));
    }

    #[test]
    fn clones_share_state() {
        let gate = CancelGate::new();
        let other = gate.clone();

        other.cancel();
        assert!(gate.is_cancelled());
    }

    #[test]
    fn deadline_closes_gate() {
        let gate = CancelGate::with_timeout(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));

        assert!(gate.is_cancelled());
        assert_eq!(gate.reason(), Some(CancelReason::Deadline));
        assert_eq!(gate.remaining(), Some(Duration::ZERO));

        // The deadline won; an explicit request afterwards changes nothing.
        assert!(!gate.cancel());
        assert_eq!(gate.reason(), Some(CancelReason::Deadline));
    }

    #[test]
    fn wait_elapses_on_open_gate() {
        let gate = CancelGate::new();
        assert_eq!(
            gate.wait_until_cancelled_or(Duration::from_millis(10)),
            Wait::Elapsed
        );
        assert!(!gate.is_cancelled());
    }

    #[test]
    fn wait_wakes_on_cancel() {
        let gate = CancelGate::new();
        let started = Instant::now();

        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                gate.cancel();
            });

            assert_eq!(
                gate.wait_until_cancelled_or(Duration::from_secs(10)),
                Wait::Cancelled
            );
        });

        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_wakes_on_deadline() {
        let gate = CancelGate::with_timeout(Duration::from_millis(10));

        assert_eq!(
            gate.wait_until_cancelled_or(Duration::from_secs(10)),
            Wait::Cancelled
        );
        assert_eq!(gate.reason(), Some(CancelReason::Deadline));
    }
}
