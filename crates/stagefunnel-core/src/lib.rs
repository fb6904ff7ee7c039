//! # Stagefunnel Core Library
//!
//! This library provides the semantics of a single-session, multi-stage
//! funnel: a fixed sequence of screens gated by form inputs, with simulated
//! progress on the timed stages, a countdown shared by the final stages and
//! a probabilistic notification schedule. The `stagefunnel` CLI is a thin
//! driver over the same library.
//!
//! ## Architecture
//!
//! - **Funnel**: the state machine and session container; the only place a
//!   stage can change
//! - **Scheduler**: a virtual-clock timer wheel with scoped teardown; the
//!   caller moves the clock, nothing runs on its own thread
//! - **Progress**: tick-driven progress simulation and message tables
//! - **Collaborators**: photo lookup (HTTP) and locality, both behind traits
//!
//! ## Key Components
//!
//! - [`Funnel`]: Stage machine and session owner
//! - [`Scheduler`]: Scoped one-shot and interval timers
//! - [`ProgressSimulator`]: Monotonic simulated progress
//! - [`Config`]: Application configuration management
//! - [`PhotoLookup`]: Trait for the photo lookup service

pub mod carousel;
pub mod config;
pub mod error;
pub mod events;
pub mod form;
pub mod funnel;
pub mod locality;
pub mod notification;
pub mod photo;
pub mod progress;
pub mod stage;
pub mod timer;

pub use carousel::Carousel;
pub use config::Config;
pub use error::{ConfigError, CoreError, LookupError, TransitionError, ValidationError};
pub use events::{FormField, FunnelEvent, HideReason, TransitionTrigger};
pub use form::{FormInputs, Gender, GuardReport, LastActive, PhotoState, Relocation};
pub use funnel::{Funnel, Session};
pub use locality::{Locality, LocalitySource, SharedLocality, StaticLocality};
pub use notification::{NotificationScheduler, NotificationTiming};
pub use photo::{
    HttpPhotoLookup, LookupOutcome, OfflinePhotoLookup, PhotoLookup, PhotoRequest, ProfilePhoto,
};
pub use progress::{IncrementPolicy, MessageEntry, MessageTable, ProgressSimulator};
pub use stage::{Stage, StepIndicator};
pub use timer::{Countdown, Scheduler, TimerKind, TimerScope};
