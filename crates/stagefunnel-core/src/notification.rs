//! Transient activity notifications.
//!
//! While active, the scheduler makes one display attempt after an initial
//! delay and then one per recurring interval. Each attempt is a weighted coin
//! flip; a shown notification auto-hides after a fixed duration unless it is
//! dismissed first. All timers live in [`TimerScope::Notification`], so
//! deactivation releases them together.
//!
//! The random decisions are isolated in [`should_show`] and [`pick_message`]
//! so they can be driven by a seeded generator.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::timer::{Scheduler, TimerId, TimerKind, TimerScope};

/// Weighted coin flip: `true` with the given probability.
pub fn should_show<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.gen::<f64>() < probability
}

/// Uniform pick from `pool`.
pub fn pick_message<'a, R: Rng + ?Sized>(rng: &mut R, pool: &'a [String]) -> Option<&'a str> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.gen_range(0..pool.len())].as_str())
}

/// Timing and content of the notification schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTiming {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
    pub display_ms: u64,
    pub probability: f64,
}

/// Visible state plus the timers that drive it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationScheduler {
    active: bool,
    visible: bool,
    message: Option<String>,
    #[serde(skip)]
    hide_timer: Option<TimerId>,
}

impl NotificationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hide_timer(&self) -> Option<TimerId> {
        self.hide_timer
    }

    /// Arm the initial delay and the recurring interval. No-op when already active.
    pub fn activate(&mut self, scheduler: &mut Scheduler, timing: &NotificationTiming) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        scheduler.set_timeout(
            TimerScope::Notification,
            TimerKind::NotificationAttempt,
            Duration::from_millis(timing.initial_delay_ms),
        );
        scheduler.set_interval(
            TimerScope::Notification,
            TimerKind::NotificationAttempt,
            Duration::from_millis(timing.interval_ms),
        );
        true
    }

    /// Release every notification timer and hide.
    ///
    /// Returns `true` if a notification was visible.
    pub fn deactivate(&mut self, scheduler: &mut Scheduler) -> bool {
        scheduler.cancel_scope(TimerScope::Notification);
        let was_visible = self.visible;
        *self = Self::default();
        was_visible
    }

    /// One scheduled attempt. Returns the message if one was shown.
    ///
    /// A notification shown while another is still visible replaces it, and
    /// its auto-hide replaces the pending one, so hides never stack.
    pub fn attempt<R: Rng + ?Sized>(
        &mut self,
        scheduler: &mut Scheduler,
        rng: &mut R,
        timing: &NotificationTiming,
        pool: &[String],
    ) -> Option<String> {
        if !self.active || !should_show(rng, timing.probability) {
            return None;
        }
        let message = pick_message(rng, pool)?.to_string();

        if let Some(previous) = self.hide_timer.take() {
            scheduler.cancel(previous);
        }
        self.hide_timer = Some(scheduler.set_timeout(
            TimerScope::Notification,
            TimerKind::NotificationHide,
            Duration::from_millis(timing.display_ms),
        ));
        self.visible = true;
        self.message = Some(message.clone());
        Some(message)
    }

    /// Handle an auto-hide firing. Ignores hides that were superseded.
    pub fn auto_hide(&mut self, fired: TimerId) -> bool {
        if self.hide_timer != Some(fired) {
            return false;
        }
        self.hide_timer = None;
        self.visible = false;
        true
    }

    /// Manual dismissal: hide now and cancel the pending auto-hide.
    /// Future scheduled attempts are unaffected.
    pub fn dismiss(&mut self, scheduler: &mut Scheduler) -> bool {
        if !self.visible {
            return false;
        }
        if let Some(id) = self.hide_timer.take() {
            scheduler.cancel(id);
        }
        self.visible = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Mcg128Xsl64;

    fn timing(probability: f64) -> NotificationTiming {
        NotificationTiming {
            initial_delay_ms: 5_000,
            interval_ms: 25_000,
            display_ms: 6_000,
            probability,
        }
    }

    fn pool() -> Vec<String> {
        vec!["one".into(), "two".into(), "three".into()]
    }

    #[test]
    fn coin_flip_extremes() {
        let mut rng = Mcg128Xsl64::seed_from_u64(3);
        assert!((0..100).all(|_| should_show(&mut rng, 1.0)));
        assert!((0..100).all(|_| !should_show(&mut rng, 0.0)));
    }

    #[test]
    fn coin_flip_rate_is_close_to_probability() {
        let mut rng = Mcg128Xsl64::seed_from_u64(11);
        let shown = (0..10_000).filter(|_| should_show(&mut rng, 0.7)).count();
        assert!((6_700..7_300).contains(&shown), "shown {shown}");
    }

    #[test]
    fn same_seed_same_picks() {
        let pool = pool();
        let mut a = Mcg128Xsl64::seed_from_u64(5);
        let mut b = Mcg128Xsl64::seed_from_u64(5);
        for _ in 0..20 {
            assert_eq!(pick_message(&mut a, &pool), pick_message(&mut b, &pool));
        }
        assert_eq!(pick_message(&mut a, &[]), None);
    }

    #[test]
    fn activate_arms_two_timers_once() {
        let mut sched = Scheduler::new();
        let mut n = NotificationScheduler::new();
        assert!(n.activate(&mut sched, &timing(1.0)));
        assert!(!n.activate(&mut sched, &timing(1.0)));
        assert_eq!(sched.pending_in(TimerScope::Notification), 2);
    }

    #[test]
    fn dismiss_cancels_auto_hide() {
        let mut sched = Scheduler::new();
        let mut rng = Mcg128Xsl64::seed_from_u64(1);
        let mut n = NotificationScheduler::new();
        n.activate(&mut sched, &timing(1.0));

        assert!(n.attempt(&mut sched, &mut rng, &timing(1.0), &pool()).is_some());
        let hide = n.hide_timer().unwrap();
        assert!(n.dismiss(&mut sched));
        assert!(!sched.is_pending(hide));
        assert!(!n.is_visible());
        assert!(!n.dismiss(&mut sched));
        // recurring attempts survive dismissal
        assert_eq!(sched.pending_in(TimerScope::Notification), 2);
    }

    #[test]
    fn replacing_a_notification_does_not_stack_hides() {
        let mut sched = Scheduler::new();
        let mut rng = Mcg128Xsl64::seed_from_u64(1);
        let mut n = NotificationScheduler::new();
        n.activate(&mut sched, &timing(1.0));

        n.attempt(&mut sched, &mut rng, &timing(1.0), &pool());
        let first = n.hide_timer().unwrap();
        n.attempt(&mut sched, &mut rng, &timing(1.0), &pool());
        let second = n.hide_timer().unwrap();

        assert!(!sched.is_pending(first));
        assert!(!n.auto_hide(first));
        assert!(n.is_visible());
        assert!(n.auto_hide(second));
        assert!(!n.is_visible());
    }

    #[test]
    fn deactivate_releases_everything() {
        let mut sched = Scheduler::new();
        let mut rng = Mcg128Xsl64::seed_from_u64(1);
        let mut n = NotificationScheduler::new();
        n.activate(&mut sched, &timing(1.0));
        n.attempt(&mut sched, &mut rng, &timing(1.0), &pool());

        assert!(n.deactivate(&mut sched));
        assert_eq!(sched.pending_in(TimerScope::Notification), 0);
        assert!(!n.is_active());
        assert!(n.attempt(&mut sched, &mut rng, &timing(1.0), &pool()).is_none());
    }
}
