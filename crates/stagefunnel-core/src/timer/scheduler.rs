//! Virtual-clock timer scheduler.
//!
//! The scheduler owns no threads and never sleeps. Timers are plain records
//! with a due time on a millisecond clock that only moves when the caller
//! pops due timers up to a target instant. Every timer belongs to a
//! [`TimerScope`]; tearing a scope down with [`Scheduler::cancel_scope`]
//! removes every timer it acquired, so nothing owned by a stage can fire
//! after that stage has exited.
//!
//! ## Usage
//!
//! ```ignore
//! let mut scheduler = Scheduler::new();
//! scheduler.set_interval(scope, TimerKind::ProgressTick, Duration::from_millis(400));
//! while let Some(fired) = scheduler.pop_due(target_ms) {
//!     // handle fired.kind; handlers may schedule or cancel timers
//! }
//! scheduler.finish(target_ms);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(u64);

/// Owner of a group of timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerScope {
    /// Released when the funnel leaves this stage.
    Stage(Stage),
    /// Released when the funnel leaves every countdown stage.
    Countdown,
    /// Released when the funnel leaves every notification stage.
    Notification,
}

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    ProgressTick,
    AutoAdvance,
    CountdownTick,
    NotificationAttempt,
    NotificationHide,
    CarouselAdvance,
}

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    scope: TimerScope,
    kind: TimerKind,
    due_ms: u64,
    /// `Some` for intervals.
    period_ms: Option<u64>,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub scope: TimerScope,
    pub kind: TimerKind,
    pub at_ms: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now_ms: u64,
    next_id: u64,
    timers: Vec<Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    /// Number of live timers owned by `scope`.
    pub fn pending_in(&self, scope: TimerScope) -> usize {
        self.timers.iter().filter(|t| t.scope == scope).count()
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Due time of the earliest live timer.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.timers.iter().map(|t| t.due_ms).min()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Fire once, `delay` from now.
    pub fn set_timeout(&mut self, scope: TimerScope, kind: TimerKind, delay: Duration) -> TimerId {
        let due_ms = self.now_ms.saturating_add(duration_ms(delay));
        self.insert(scope, kind, due_ms, None)
    }

    /// Fire every `period`, first firing one period from now.
    ///
    /// Periods shorter than one millisecond are raised to one millisecond.
    pub fn set_interval(&mut self, scope: TimerScope, kind: TimerKind, period: Duration) -> TimerId {
        let period_ms = duration_ms(period).max(1);
        let due_ms = self.now_ms.saturating_add(period_ms);
        self.insert(scope, kind, due_ms, Some(period_ms))
    }

    /// Returns `false` if the timer already fired (one-shot) or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    /// Cancel every timer owned by `scope`. Returns how many were removed.
    pub fn cancel_scope(&mut self, scope: TimerScope) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| t.scope != scope);
        let removed = before - self.timers.len();
        if removed > 0 {
            tracing::debug!(?scope, removed, "released scoped timers");
        }
        removed
    }

    /// Pop the earliest timer due at or before `until_ms`, moving the clock to
    /// its due time. Ties fire in scheduling order. Intervals are re-armed
    /// before being returned, so a handler may cancel them. An interval that
    /// cannot be re-armed within the clock's range fires one last time and is
    /// removed.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<Fired> {
        let (pos, _) = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= until_ms)
            .min_by_key(|(_, t)| (t.due_ms, t.id))?;

        let timer = &mut self.timers[pos];
        let fired = Fired {
            id: timer.id,
            scope: timer.scope,
            kind: timer.kind,
            at_ms: timer.due_ms,
        };
        self.now_ms = self.now_ms.max(timer.due_ms);

        match timer.period_ms.and_then(|period| timer.due_ms.checked_add(period)) {
            Some(next_due) => timer.due_ms = next_due,
            None => {
                self.timers.swap_remove(pos);
            }
        }
        Some(fired)
    }

    /// Move the clock to `until_ms` once every due timer has been popped.
    /// The clock never moves backwards.
    pub fn finish(&mut self, until_ms: u64) {
        self.now_ms = self.now_ms.max(until_ms);
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn insert(
        &mut self,
        scope: TimerScope,
        kind: TimerKind,
        due_ms: u64,
        period_ms: Option<u64>,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            scope,
            kind,
            due_ms,
            period_ms,
        });
        id
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFY: TimerScope = TimerScope::Stage(Stage::Verifying);

    fn drain(s: &mut Scheduler, until: u64) -> Vec<Fired> {
        let mut out = Vec::new();
        while let Some(f) = s.pop_due(until) {
            out.push(f);
        }
        s.finish(until);
        out
    }

    #[test]
    fn timeout_fires_once() {
        let mut s = Scheduler::new();
        s.set_timeout(VERIFY, TimerKind::AutoAdvance, Duration::from_secs(1));
        assert!(drain(&mut s, 999).is_empty());
        let fired = drain(&mut s, 5_000);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].at_ms, 1_000);
        assert_eq!(s.pending(), 0);
        assert_eq!(s.now_ms(), 5_000);
    }

    #[test]
    fn interval_rearms() {
        let mut s = Scheduler::new();
        s.set_interval(VERIFY, TimerKind::ProgressTick, Duration::from_millis(400));
        let fired = drain(&mut s, 2_000);
        let times: Vec<u64> = fired.iter().map(|f| f.at_ms).collect();
        assert_eq!(times, vec![400, 800, 1_200, 1_600, 2_000]);
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn ties_fire_in_scheduling_order() {
        let mut s = Scheduler::new();
        let a = s.set_timeout(VERIFY, TimerKind::AutoAdvance, Duration::from_millis(100));
        let b = s.set_timeout(TimerScope::Countdown, TimerKind::CountdownTick, Duration::from_millis(100));
        let fired = drain(&mut s, 100);
        assert_eq!(fired[0].id, a);
        assert_eq!(fired[1].id, b);
    }

    #[test]
    fn cancel_scope_releases_only_that_scope() {
        let mut s = Scheduler::new();
        s.set_interval(VERIFY, TimerKind::ProgressTick, Duration::from_millis(400));
        s.set_timeout(VERIFY, TimerKind::AutoAdvance, Duration::from_secs(1));
        s.set_interval(TimerScope::Countdown, TimerKind::CountdownTick, Duration::from_secs(1));

        assert_eq!(s.cancel_scope(VERIFY), 2);
        assert_eq!(s.pending_in(VERIFY), 0);
        assert_eq!(s.pending_in(TimerScope::Countdown), 1);

        let fired = drain(&mut s, 3_000);
        assert!(fired.iter().all(|f| f.scope == TimerScope::Countdown));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut s = Scheduler::new();
        let id = s.set_timeout(TimerScope::Notification, TimerKind::NotificationHide, Duration::from_secs(6));
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        assert!(drain(&mut s, 10_000).is_empty());
    }

    #[test]
    fn zero_period_is_clamped() {
        let mut s = Scheduler::new();
        s.set_interval(VERIFY, TimerKind::ProgressTick, Duration::ZERO);
        assert_eq!(drain(&mut s, 3).len(), 3);
    }

    #[test]
    fn interval_at_end_of_clock_is_exhausted() {
        let mut s = Scheduler::new();
        s.finish(u64::MAX - 1_000);
        s.set_interval(VERIFY, TimerKind::ProgressTick, Duration::from_millis(400));
        let fired = drain(&mut s, u64::MAX);
        assert_eq!(fired.len(), 2);
        assert_eq!(s.pending(), 0);

        // a timer saturated onto the last instant fires once
        s.set_interval(VERIFY, TimerKind::ProgressTick, Duration::from_millis(400));
        assert_eq!(drain(&mut s, u64::MAX).len(), 1);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn clock_never_moves_backwards() {
        let mut s = Scheduler::new();
        s.finish(500);
        s.finish(100);
        assert_eq!(s.now_ms(), 500);
    }
}
