//! Shared one-second countdown.
//!
//! The value is initialised once per session and survives every stage
//! change; only the interval that ticks it is scoped to the countdown
//! stages. Urgency is derived from the remaining time, never stored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Countdown {
    remaining_secs: Option<u32>,
    urgent_threshold_secs: u32,
}

impl Countdown {
    pub fn new(urgent_threshold_secs: u32) -> Self {
        Self {
            remaining_secs: None,
            urgent_threshold_secs,
        }
    }

    /// Set the remaining time unless it is already set.
    ///
    /// Returns `true` if this call initialised the countdown.
    pub fn initialize(&mut self, seconds: u32) -> bool {
        if self.remaining_secs.is_some() {
            return false;
        }
        self.remaining_secs = Some(seconds);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.remaining_secs.is_some()
    }

    /// Decrement by one second, floored at zero.
    pub fn tick(&mut self) -> Option<u32> {
        let remaining = self.remaining_secs.as_mut()?;
        *remaining = remaining.saturating_sub(1);
        Some(*remaining)
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.remaining_secs
    }

    pub fn is_urgent(&self) -> bool {
        self.remaining_secs
            .is_some_and(|r| r <= self.urgent_threshold_secs)
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == Some(0)
    }

    /// `MM:SS`, e.g. `09:50`.
    pub fn display(&self) -> Option<String> {
        self.remaining_secs.map(format_mmss)
    }
}

pub fn format_mmss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_once() {
        let mut c = Countdown::new(120);
        assert!(c.initialize(590));
        c.tick();
        assert!(!c.initialize(590));
        assert_eq!(c.remaining_secs(), Some(589));
    }

    #[test]
    fn never_goes_negative() {
        let mut c = Countdown::new(120);
        c.initialize(590);
        for _ in 0..600 {
            c.tick();
        }
        assert_eq!(c.remaining_secs(), Some(0));
        assert!(c.is_expired());
    }

    #[test]
    fn tick_before_initialize_is_noop() {
        let mut c = Countdown::new(120);
        assert_eq!(c.tick(), None);
        assert!(!c.is_urgent());
    }

    #[test]
    fn urgency_threshold_is_inclusive() {
        let mut c = Countdown::new(120);
        c.initialize(121);
        assert!(!c.is_urgent());
        c.tick();
        assert!(c.is_urgent());
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_mmss(590), "09:50");
        assert_eq!(format_mmss(61), "01:01");
        assert_eq!(format_mmss(0), "00:00");
    }
}
