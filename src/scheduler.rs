//! Cooperative one-shot timers.
//!
//! Pending entries carry a typed task instead of a closure; whoever drives
//! the scheduler pops due tasks one at a time and runs them on its own
//! thread, so no two tasks ever run concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::Clock;

/// Identifies a pending entry for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub struct Scheduler<T> {
    clock: Arc<dyn Clock>,
    next_id: u64,
    // Ordered by due time, ties broken by scheduling order.
    queue: BTreeMap<(Instant, u64), T>,
    pending: HashMap<u64, Instant>,
}

impl<T> Scheduler<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: 0,
            queue: BTreeMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Queue `task` to become due `delay` from now.
    pub fn schedule(&mut self, delay: Duration, task: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let due = self.clock.now() + delay;
        self.queue.insert((due, id), task);
        self.pending.insert(id, due);
        trace!(timer = id, delay_ms = delay.as_millis() as u64, "timer_scheduled");
        TimerHandle(id)
    }

    /// Cancel a pending entry. Fired or already cancelled handles are ignored.
    pub fn cancel(&mut self, handle: TimerHandle) {
        if let Some(due) = self.pending.remove(&handle.0) {
            self.queue.remove(&(due, handle.0));
            trace!(timer = handle.0, "timer_cancelled");
        }
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// When the earliest pending entry becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.keys().next().map(|&(due, _)| due)
    }

    /// Remove and return the earliest entry if it is due now.
    pub fn pop_due(&mut self) -> Option<(TimerHandle, T)> {
        let now = self.clock.now();
        match self.next_due() {
            Some(due) if due <= now => self.pop_first(),
            _ => None,
        }
    }

    fn pop_first(&mut self) -> Option<(TimerHandle, T)> {
        let ((_, id), task) = self.queue.pop_first()?;
        self.pending.remove(&id);
        Some((TimerHandle(id), task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scheduler() -> (ManualClock, Scheduler<&'static str>) {
        let clock = ManualClock::new();
        let sched = Scheduler::new(Arc::new(clock.clone()));
        (clock, sched)
    }

    #[test]
    fn test_pop_due_respects_time_and_order() {
        let (clock, mut sched) = scheduler();
        sched.schedule(Duration::from_millis(20), "late");
        sched.schedule(Duration::from_millis(10), "early");
        sched.schedule(Duration::from_millis(10), "early-second");

        assert!(sched.pop_due().is_none());

        clock.advance(Duration::from_millis(10));
        assert_eq!(sched.pop_due().map(|(_, t)| t), Some("early"));
        assert_eq!(sched.pop_due().map(|(_, t)| t), Some("early-second"));
        assert!(sched.pop_due().is_none());

        clock.advance(Duration::from_millis(10));
        assert_eq!(sched.pop_due().map(|(_, t)| t), Some("late"));
        assert!(sched.is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (clock, mut sched) = scheduler();
        let handle = sched.schedule(Duration::from_millis(5), "tick");
        assert!(sched.is_pending(handle));

        sched.cancel(handle);
        sched.cancel(handle);
        assert!(!sched.is_pending(handle));

        clock.advance(Duration::from_millis(5));
        assert!(sched.pop_due().is_none());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let (clock, mut sched) = scheduler();
        let fired = sched.schedule(Duration::ZERO, "first");
        let other = sched.schedule(Duration::from_millis(1), "second");

        let (handle, _) = sched.pop_due().unwrap();
        assert_eq!(handle, fired);
        sched.cancel(fired);

        assert!(sched.is_pending(other));
        clock.advance(Duration::from_millis(1));
        assert_eq!(sched.pop_due().map(|(_, t)| t), Some("second"));
    }

    #[test]
    fn test_next_due() {
        let (clock, mut sched) = scheduler();
        assert!(sched.next_due().is_none());
        let start = clock.now();
        sched.schedule(Duration::from_millis(16), "tick");
        assert_eq!(sched.next_due(), Some(start + Duration::from_millis(16)));
    }
}
