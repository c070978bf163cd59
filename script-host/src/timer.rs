//! One-shot timers for deferred script actions.
//!
//! [`TimerScheduler`] holds at most one pending timer per [`ActionKind`] and
//! knows when the next one is due (for use as a `tokio::time::sleep_until`
//! deadline).  The host loop calls [`TimerScheduler::take_ready`] through
//! [`crate::ScriptEngine::run_timers`] to collect the timers that fired.

use std::time::{Duration, Instant};

use crate::actions::ActionKind;

/// Delay between an action request and its execution.
pub const ACTION_DELAY: Duration = Duration::from_millis(1);

/// A pending one-shot timer.
#[derive(Debug, Clone)]
pub struct Timer {
    /// Monotonically increasing timer ID.
    pub id: u32,
    /// Which action list to run when it fires.
    pub kind: ActionKind,
    pub due: Instant,
}

/// Pending timers.
///
/// ```rust,ignore
/// loop {
///     if let Some(deadline) = timers.next_wakeup() {
///         sleep_until(deadline.into()).await;
///     }
///     for timer in timers.take_ready(Instant::now()) {
///         // … run timer.kind's action list …
///     }
/// }
/// ```
#[derive(Debug)]
pub struct TimerScheduler {
    timers: Vec<Timer>,
    next_id: u32,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self { timers: Vec::new(), next_id: 1 }
    }

    /// Arm the timer for `kind` to fire `delay` from now, replacing any
    /// timer already pending for it.  Returns the timer ID.
    pub fn arm(&mut self, kind: ActionKind, delay: Duration) -> u32 {
        self.cancel(kind);
        let id = self.next_id;
        self.next_id += 1;
        self.timers.push(Timer { id, kind, due: Instant::now() + delay });
        id
    }

    /// Drop the pending timer for `kind`.  Returns `true` if there was one.
    pub fn cancel(&mut self, kind: ActionKind) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.kind != kind);
        self.timers.len() < before
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// The soonest due time, or `None` if nothing is pending.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.due).min()
    }

    /// Remove and return every timer due at `now`, soonest first.
    pub fn take_ready(&mut self, now: Instant) -> Vec<Timer> {
        let (mut ready, pending): (Vec<Timer>, Vec<Timer>) =
            self.timers.drain(..).partition(|t| t.due <= now);
        self.timers = pending;
        ready.sort_by_key(|t| t.due);
        ready
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn rearm_replaces_pending_timer() {
        let mut t = TimerScheduler::new();
        let first = t.arm(ActionKind::Install, ms(100));
        let second = t.arm(ActionKind::Install, ms(100));
        assert_ne!(first, second);
        assert_eq!(t.len(), 1);
        assert_eq!(t.iter().next().unwrap().id, second);
    }

    #[test]
    fn kinds_have_separate_timers() {
        let mut t = TimerScheduler::new();
        t.arm(ActionKind::Install, ms(100));
        t.arm(ActionKind::Remove, ms(100));
        assert_eq!(t.len(), 2);
        assert!(t.cancel(ActionKind::Install));
        assert!(!t.cancel(ActionKind::Install));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn next_wakeup_none_when_empty() {
        assert!(TimerScheduler::new().next_wakeup().is_none());
    }

    #[test]
    fn take_ready_only_returns_due_timers() {
        let mut t = TimerScheduler::new();
        let now = Instant::now();
        t.timers.push(Timer { id: 1, kind: ActionKind::Remove, due: now - ms(1) });
        t.timers.push(Timer { id: 2, kind: ActionKind::Install, due: now + ms(1000) });

        let ready = t.take_ready(now);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].kind, ActionKind::Remove);
        assert_eq!(t.len(), 1);
        assert_eq!(t.next_wakeup(), Some(now + ms(1000)));
    }

    #[test]
    fn clear_drops_everything() {
        let mut t = TimerScheduler::new();
        t.arm(ActionKind::Autoload, ACTION_DELAY);
        t.clear();
        assert!(t.is_empty());
    }
}
