//! Funnel stages and the step indicator derived from them.

use serde::{Deserialize, Serialize};

/// One screen of the funnel. Declaration order is funnel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Landing,
    Form,
    Verifying,
    Preliminary,
    Generating,
    Result,
    Offer,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Landing,
        Stage::Form,
        Stage::Verifying,
        Stage::Preliminary,
        Stage::Generating,
        Stage::Result,
        Stage::Offer,
    ];

    /// Stages that run a progress simulator.
    pub fn is_timed(self) -> bool {
        matches!(self, Stage::Verifying | Stage::Generating)
    }

    /// Stages that display (and tick) the shared countdown.
    pub fn shows_countdown(self) -> bool {
        matches!(self, Stage::Result | Stage::Offer)
    }

    /// Stages during which notifications are scheduled.
    pub fn shows_notifications(self) -> bool {
        matches!(self, Stage::Generating | Stage::Result | Stage::Offer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Landing => "landing",
            Stage::Form => "form",
            Stage::Verifying => "verifying",
            Stage::Preliminary => "preliminary",
            Stage::Generating => "generating",
            Stage::Result => "result",
            Stage::Offer => "offer",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the top-of-screen step indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepIndicator {
    pub id: &'static str,
    pub label: &'static str,
    pub completed: bool,
}

/// The five-step indicator shown on every stage except `Landing`.
///
/// A step counts as completed once the funnel has reached the stage it
/// stands for; the final step completes only on `Offer`.
pub fn step_indicator(stage: Stage) -> Vec<StepIndicator> {
    const STEPS: [(&str, &str, Stage); 5] = [
        ("form", "Configuration", Stage::Form),
        ("verification", "Verification", Stage::Verifying),
        ("preliminary", "Result", Stage::Preliminary),
        ("generating", "Report", Stage::Generating),
        ("offer", "Unlock", Stage::Offer),
    ];

    STEPS
        .iter()
        .map(|&(id, label, reached)| StepIndicator {
            id,
            label,
            completed: stage >= reached,
        })
        .collect()
}
