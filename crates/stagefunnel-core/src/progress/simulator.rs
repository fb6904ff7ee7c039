//! Simulated progress for the timed stages.
//!
//! The simulator itself holds no timer: the funnel drives [`ProgressSimulator::tick`]
//! from an interval owned by the stage scope, and stopping the simulator is
//! cancelling that scope. Within a tick, progress is updated first, then the
//! message is looked up, then completion is reported.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::messages::MessageTable;
use crate::config::StageProgressConfig;
use crate::error::ValidationError;

pub const PROGRESS_MAX: f64 = 100.0;

const COMPLETION_EPSILON: f64 = 1e-9;

/// How much progress a single tick adds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncrementPolicy {
    /// Uniform draw from `[min, max)`.
    Uniform { min: f64, max: f64 },
    /// Constant step, so the stage takes a fixed number of ticks.
    Fixed { step: f64 },
}

impl IncrementPolicy {
    /// Fixed step that reaches 100 in `duration_ms / tick_ms` ticks.
    pub fn fixed_duration(duration_ms: u64, tick_ms: u64) -> Self {
        let ticks = (duration_ms / tick_ms.max(1)).max(1);
        IncrementPolicy::Fixed {
            step: PROGRESS_MAX / ticks as f64,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            IncrementPolicy::Uniform { min, max } if max > min => rng.gen_range(min..max),
            IncrementPolicy::Uniform { min, .. } => min,
            IncrementPolicy::Fixed { step } => step,
        }
    }

    /// Every increment must be positive so the stage always completes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (lowest, highest) = match *self {
            IncrementPolicy::Uniform { min, max } => (min, max),
            IncrementPolicy::Fixed { step } => (step, step),
        };
        if !(lowest.is_finite() && highest.is_finite() && lowest > 0.0 && highest >= lowest) {
            return Err(ValidationError::InvalidValue {
                field: "increment".into(),
                message: format!("increments must be positive and ordered, got {self:?}"),
            });
        }
        Ok(())
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressTick {
    pub progress: f64,
    pub message: String,
    /// `true` exactly once, on the tick that reached 100.
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    progress: f64,
    message: String,
    table: MessageTable,
    increment: IncrementPolicy,
    ticks: u32,
    completed: bool,
}

impl ProgressSimulator {
    /// A fresh simulator at 0 showing `initial_message`.
    pub fn new(table: MessageTable, increment: IncrementPolicy, initial_message: impl Into<String>) -> Self {
        Self {
            progress: 0.0,
            message: initial_message.into(),
            table,
            increment,
            ticks: 0,
            completed: false,
        }
    }

    /// A fresh simulator for a configured stage, using its base table.
    pub fn start(stage: &StageProgressConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(
            stage.table()?,
            stage.increment,
            stage.initial_message.clone(),
        ))
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn table(&self) -> &MessageTable {
        &self.table
    }

    /// Advance by one tick. Returns `None` once completed.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<ProgressTick> {
        if self.completed {
            return None;
        }
        self.ticks += 1;

        let step = self.increment.sample(rng).max(0.0);
        self.progress = (self.progress + step).min(PROGRESS_MAX);
        // fixed steps of 100/n can sum to just under 100
        if PROGRESS_MAX - self.progress < COMPLETION_EPSILON {
            self.progress = PROGRESS_MAX;
        }

        if let Some(message) = self.table.select(self.progress) {
            if message != self.message {
                self.message = message.to_string();
            }
        }

        if self.progress >= PROGRESS_MAX {
            self.completed = true;
        }

        Some(ProgressTick {
            progress: self.progress,
            message: self.message.clone(),
            completed: self.completed,
        })
    }
}
