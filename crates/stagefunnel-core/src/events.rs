use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::photo::PhotoRequest;
use crate::stage::Stage;

/// Who caused a stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionTrigger {
    User,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Phone,
    Gender,
    LastActive,
    Relocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HideReason {
    Timeout,
    Dismissed,
    StageExit,
}

/// Every state change in the funnel produces an event.
/// The presentation layer renders from these; `clock_ms` is the funnel's
/// virtual clock at the moment the event was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FunnelEvent {
    StageChanged {
        from: Stage,
        to: Stage,
        trigger: TransitionTrigger,
        clock_ms: u64,
        at: DateTime<Utc>,
    },
    FormUpdated {
        field: FormField,
        can_submit: bool,
        at: DateTime<Utc>,
    },
    PhotoRequested {
        request_id: u64,
        phone: String,
        at: DateTime<Utc>,
    },
    PhotoResolved {
        request_id: u64,
        url: String,
        private: bool,
        notice: Option<String>,
        at: DateTime<Utc>,
    },
    /// A response arrived for a request that is no longer current.
    PhotoDiscarded {
        request_id: u64,
        at: DateTime<Utc>,
    },
    PhotoCleared {
        at: DateTime<Utc>,
    },
    ProgressAdvanced {
        stage: Stage,
        progress: f64,
        message: String,
        clock_ms: u64,
        at: DateTime<Utc>,
    },
    ProgressCompleted {
        stage: Stage,
        clock_ms: u64,
        at: DateTime<Utc>,
    },
    CountdownTicked {
        remaining_secs: u32,
        display: String,
        urgent: bool,
        at: DateTime<Utc>,
    },
    NotificationShown {
        message: String,
        clock_ms: u64,
        at: DateTime<Utc>,
    },
    NotificationHidden {
        reason: HideReason,
        clock_ms: u64,
        at: DateTime<Utc>,
    },
    CarouselMoved {
        index: usize,
        image: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        session_id: Uuid,
        stage: Stage,
        progress: Option<f64>,
        message: Option<String>,
        can_submit: bool,
        countdown_secs: Option<u32>,
        countdown_urgent: bool,
        notification: Option<String>,
        carousel_index: usize,
        locality: Option<String>,
        clock_ms: u64,
        at: DateTime<Utc>,
    },
}

impl FunnelEvent {
    /// The lookup to perform, if this event asks for one.
    pub fn photo_request(&self) -> Option<PhotoRequest> {
        match self {
            FunnelEvent::PhotoRequested {
                request_id, phone, ..
            } => Some(PhotoRequest {
                request_id: *request_id,
                phone: phone.clone(),
            }),
            _ => None,
        }
    }

    /// Serde tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            FunnelEvent::StageChanged { .. } => "StageChanged",
            FunnelEvent::FormUpdated { .. } => "FormUpdated",
            FunnelEvent::PhotoRequested { .. } => "PhotoRequested",
            FunnelEvent::PhotoResolved { .. } => "PhotoResolved",
            FunnelEvent::PhotoDiscarded { .. } => "PhotoDiscarded",
            FunnelEvent::PhotoCleared { .. } => "PhotoCleared",
            FunnelEvent::ProgressAdvanced { .. } => "ProgressAdvanced",
            FunnelEvent::ProgressCompleted { .. } => "ProgressCompleted",
            FunnelEvent::CountdownTicked { .. } => "CountdownTicked",
            FunnelEvent::NotificationShown { .. } => "NotificationShown",
            FunnelEvent::NotificationHidden { .. } => "NotificationHidden",
            FunnelEvent::CarouselMoved { .. } => "CarouselMoved",
            FunnelEvent::StateSnapshot { .. } => "StateSnapshot",
        }
    }
}
