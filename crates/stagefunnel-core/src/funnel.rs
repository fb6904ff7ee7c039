//! Funnel state machine.
//!
//! [`Funnel`] owns the whole session: the stage, the form, the running
//! simulator, the countdown, the notification and carousel state, the
//! virtual-clock scheduler and the random generator. It has no internal
//! thread; the caller moves the clock with [`Funnel::advance_by`] or
//! [`Funnel::advance_to`] and receives the events produced meanwhile.
//!
//! ## State Transitions
//!
//! ```text
//! Landing -> Form -> Verifying -> Preliminary -> Generating -> Result -> Offer
//!   user     user      auto          user            auto       user
//! ```
//!
//! Every stage change goes through `transition_to`, which releases the
//! timers of the stage being left before the new stage acquires its own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use uuid::Uuid;

use crate::carousel::Carousel;
use crate::config::Config;
use crate::error::{Result, TransitionError, ValidationError};
use crate::events::{FormField, FunnelEvent, HideReason, TransitionTrigger};
use crate::form::{FormInputs, Gender, GuardReport, LastActive, PhoneEdit, Relocation};
use crate::locality::LocalitySource;
use crate::notification::{NotificationScheduler, NotificationTiming};
use crate::photo::{resolve_photo, LookupOutcome, PhotoFallback};
use crate::progress::{generation_table, MessageTable, ProgressSimulator};
use crate::stage::{step_indicator, Stage, StepIndicator};
use crate::timer::{Countdown, Fired, Scheduler, TimerKind, TimerScope};

/// Everything the presentation layer renders from.
#[derive(Debug, Clone)]
pub struct Session {
    pub stage: Stage,
    pub form: FormInputs,
    /// Present only while a timed stage is active.
    pub progress: Option<ProgressSimulator>,
    pub countdown: Countdown,
    pub notification: NotificationScheduler,
    pub carousel: Carousel,
    /// City read when `Result` was entered.
    pub locality: Option<String>,
}

pub struct Funnel {
    id: Uuid,
    config: Config,
    session: Session,
    scheduler: Scheduler,
    rng: Mcg128Xsl64,
    locality: Box<dyn LocalitySource>,
    epoch: DateTime<Utc>,
    verification_table: MessageTable,
    generation_base: MessageTable,
    timing: NotificationTiming,
    fallback: PhotoFallback,
}

impl std::fmt::Debug for Funnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Funnel")
            .field("id", &self.id)
            .field("stage", &self.session.stage)
            .field("clock_ms", &self.scheduler.now_ms())
            .finish_non_exhaustive()
    }
}

impl Funnel {
    /// Create a session on `Landing`.
    ///
    /// The configuration is validated up front so nothing inside a running
    /// session can fail on a bad table or pool.
    pub fn new(config: Config, locality: impl LocalitySource + 'static) -> Result<Self> {
        config.validate()?;

        let verification_table = config.progress.verification.table()?;
        let generation_base = config.progress.generation.table()?;
        let carousel = Carousel::new(config.carousel.images.clone())?;
        let rng = match config.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };

        let session = Session {
            stage: Stage::Landing,
            form: FormInputs::new(),
            progress: None,
            countdown: Countdown::new(config.countdown.urgent_threshold_secs),
            notification: NotificationScheduler::new(),
            carousel,
            locality: None,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            timing: config.notifications.timing(),
            fallback: config.photo.fallback(),
            config,
            session,
            scheduler: Scheduler::new(),
            rng,
            locality: Box::new(locality),
            epoch: Utc::now(),
            verification_table,
            generation_base,
        })
    }

    /// Anchor event timestamps at `epoch` instead of the creation time.
    pub fn with_epoch(mut self, epoch: DateTime<Utc>) -> Self {
        self.epoch = epoch;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.session.stage
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn clock_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Due time of the next timer, if any.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.scheduler.next_due_ms()
    }

    pub fn guard(&self) -> GuardReport {
        self.session.form.guard(self.config.form.min_phone_digits)
    }

    pub fn can_submit(&self) -> bool {
        self.guard().passes()
    }

    pub fn step_indicator(&self) -> Vec<StepIndicator> {
        step_indicator(self.session.stage)
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> FunnelEvent {
        let s = &self.session;
        FunnelEvent::StateSnapshot {
            session_id: self.id,
            stage: s.stage,
            progress: s.progress.as_ref().map(ProgressSimulator::progress),
            message: s.progress.as_ref().map(|p| p.message().to_string()),
            can_submit: self.can_submit(),
            countdown_secs: s.countdown.remaining_secs(),
            countdown_urgent: s.countdown.is_urgent(),
            notification: s
                .notification
                .is_visible()
                .then(|| s.notification.message().map(str::to_string))
                .flatten(),
            carousel_index: s.carousel.index(),
            locality: s.locality.clone(),
            clock_ms: self.clock_ms(),
            at: self.at(),
        }
    }

    // ── User actions ─────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<Vec<FunnelEvent>, TransitionError> {
        self.require(Stage::Landing, "start")?;
        Ok(self.transition_to(Stage::Form, TransitionTrigger::User))
    }

    pub fn submit(&mut self) -> Result<Vec<FunnelEvent>, TransitionError> {
        self.require(Stage::Form, "submit")?;
        let guard = self.guard();
        if !guard.passes() {
            return Err(TransitionError::GuardUnsatisfied {
                missing: guard.missing(),
            });
        }
        Ok(self.transition_to(Stage::Verifying, TransitionTrigger::User))
    }

    pub fn continue_to_report(&mut self) -> Result<Vec<FunnelEvent>, TransitionError> {
        self.require(Stage::Preliminary, "continue")?;
        Ok(self.transition_to(Stage::Generating, TransitionTrigger::User))
    }

    pub fn unlock(&mut self) -> Result<Vec<FunnelEvent>, TransitionError> {
        self.require(Stage::Result, "unlock")?;
        Ok(self.transition_to(Stage::Offer, TransitionTrigger::User))
    }

    /// Hide the visible notification. Later attempts still happen.
    pub fn dismiss_notification(&mut self) -> Option<FunnelEvent> {
        if !self.session.notification.dismiss(&mut self.scheduler) {
            return None;
        }
        Some(FunnelEvent::NotificationHidden {
            reason: HideReason::Dismissed,
            clock_ms: self.clock_ms(),
            at: self.at(),
        })
    }

    // ── Form ─────────────────────────────────────────────────────────

    /// Store the phone text. Emits a `PhotoRequested` event when the caller
    /// must start a lookup.
    pub fn set_phone(&mut self, text: &str) -> Result<Vec<FunnelEvent>, TransitionError> {
        self.require(Stage::Form, "set_phone")?;
        let edit = self
            .session
            .form
            .set_phone(text, self.config.form.min_phone_digits);

        let mut events = Vec::new();
        match edit {
            PhoneEdit::Unchanged => {}
            PhoneEdit::Cleared => events.push(FunnelEvent::PhotoCleared { at: self.at() }),
            PhoneEdit::Requested(request) => {
                tracing::debug!(request_id = request.request_id, "photo lookup requested");
                events.push(FunnelEvent::PhotoRequested {
                    request_id: request.request_id,
                    phone: request.phone,
                    at: self.at(),
                });
            }
        }
        events.push(self.form_updated(FormField::Phone));
        Ok(events)
    }

    pub fn set_gender(&mut self, gender: Gender) -> Result<FunnelEvent, TransitionError> {
        self.require(Stage::Form, "set_gender")?;
        self.session.form.gender = Some(gender);
        Ok(self.form_updated(FormField::Gender))
    }

    pub fn set_last_active(&mut self, value: LastActive) -> Result<FunnelEvent, TransitionError> {
        self.require(Stage::Form, "set_last_active")?;
        self.session.form.last_active = Some(value);
        Ok(self.form_updated(FormField::LastActive))
    }

    pub fn set_relocation(&mut self, value: Relocation) -> Result<FunnelEvent, TransitionError> {
        self.require(Stage::Form, "set_relocation")?;
        self.session.form.relocation = Some(value);
        Ok(self.form_updated(FormField::Relocation))
    }

    /// Apply the outcome of the lookup issued as `request_id`.
    ///
    /// Outcomes for any request other than the pending one are discarded.
    pub fn apply_photo_result(
        &mut self,
        request_id: u64,
        outcome: &LookupOutcome,
    ) -> Vec<FunnelEvent> {
        let photo = resolve_photo(outcome, &self.fallback);
        if !self.session.form.resolve_photo(request_id, photo.clone()) {
            tracing::debug!(
                request_id,
                pending = ?self.session.form.pending_request(),
                "discarding stale photo response"
            );
            return vec![FunnelEvent::PhotoDiscarded {
                request_id,
                at: self.at(),
            }];
        }
        vec![
            FunnelEvent::PhotoResolved {
                request_id,
                url: photo.url,
                private: photo.private,
                notice: photo.notice,
                at: self.at(),
            },
            self.form_updated(FormField::Phone),
        ]
    }

    // ── Carousel ─────────────────────────────────────────────────────

    pub fn carousel_next(&mut self) -> FunnelEvent {
        self.session.carousel.next();
        self.carousel_moved()
    }

    pub fn carousel_prev(&mut self) -> FunnelEvent {
        self.session.carousel.prev();
        self.carousel_moved()
    }

    pub fn carousel_jump(&mut self, index: usize) -> Result<FunnelEvent, ValidationError> {
        self.session.carousel.jump_to(index)?;
        Ok(self.carousel_moved())
    }

    // ── Clock ────────────────────────────────────────────────────────

    pub fn advance_by(&mut self, delta: Duration) -> Vec<FunnelEvent> {
        let delta_ms = u64::try_from(delta.as_millis()).unwrap_or(u64::MAX);
        self.advance_to(self.clock_ms().saturating_add(delta_ms))
    }

    /// Fire every timer due up to `target_ms` in due order, then move the
    /// clock to `target_ms`. Targets in the past only fire nothing.
    pub fn advance_to(&mut self, target_ms: u64) -> Vec<FunnelEvent> {
        let mut events = Vec::new();
        while let Some(fired) = self.scheduler.pop_due(target_ms) {
            tracing::debug!(kind = ?fired.kind, scope = ?fired.scope, at_ms = fired.at_ms, "timer fired");
            self.handle_timer(fired, &mut events);
        }
        self.scheduler.finish(target_ms);
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn require(&self, stage: Stage, action: &'static str) -> Result<(), TransitionError> {
        if self.session.stage != stage {
            return Err(TransitionError::NotAllowed {
                action,
                stage: self.session.stage,
            });
        }
        Ok(())
    }

    fn at(&self) -> DateTime<Utc> {
        // clamps once the clock runs past what chrono can represent
        i64::try_from(self.clock_ms())
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|offset| self.epoch.checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn form_updated(&self, field: FormField) -> FunnelEvent {
        FunnelEvent::FormUpdated {
            field,
            can_submit: self.can_submit(),
            at: self.at(),
        }
    }

    fn carousel_moved(&self) -> FunnelEvent {
        FunnelEvent::CarouselMoved {
            index: self.session.carousel.index(),
            image: self.session.carousel.current().to_string(),
            at: self.at(),
        }
    }

    fn transition_to(&mut self, to: Stage, trigger: TransitionTrigger) -> Vec<FunnelEvent> {
        let from = self.session.stage;
        let mut events = Vec::new();

        self.exit_stage(from, to, &mut events);
        self.session.stage = to;
        tracing::info!(%from, %to, ?trigger, clock_ms = self.clock_ms(), "stage transition");
        events.push(FunnelEvent::StageChanged {
            from,
            to,
            trigger,
            clock_ms: self.clock_ms(),
            at: self.at(),
        });
        self.enter_stage(to, &mut events);
        events
    }

    fn exit_stage(&mut self, from: Stage, to: Stage, events: &mut Vec<FunnelEvent>) {
        self.scheduler.cancel_scope(TimerScope::Stage(from));
        self.session.progress = None;

        if from.shows_countdown() && !to.shows_countdown() {
            self.scheduler.cancel_scope(TimerScope::Countdown);
        }
        if from.shows_notifications()
            && !to.shows_notifications()
            && self.session.notification.deactivate(&mut self.scheduler)
        {
            events.push(FunnelEvent::NotificationHidden {
                reason: HideReason::StageExit,
                clock_ms: self.clock_ms(),
                at: self.at(),
            });
        }
    }

    fn enter_stage(&mut self, stage: Stage, events: &mut Vec<FunnelEvent>) {
        match stage {
            Stage::Verifying => {
                let cfg = &self.config.progress.verification;
                self.session.progress = Some(ProgressSimulator::new(
                    self.verification_table.clone(),
                    cfg.increment,
                    cfg.initial_message.clone(),
                ));
            }
            Stage::Generating => {
                let table = self.generation_table_for_entry();
                let cfg = &self.config.progress.generation;
                self.session.progress = Some(ProgressSimulator::new(
                    table,
                    cfg.increment,
                    cfg.initial_message.clone(),
                ));
            }
            Stage::Result => {
                self.session.locality = self
                    .locality
                    .locality()
                    .available_city()
                    .map(str::to_string);
                self.scheduler.set_interval(
                    TimerScope::Stage(Stage::Result),
                    TimerKind::CarouselAdvance,
                    Duration::from_millis(self.config.carousel.interval_ms),
                );
            }
            Stage::Landing | Stage::Form | Stage::Preliminary | Stage::Offer => {}
        }

        if stage.is_timed() {
            self.scheduler.set_interval(
                TimerScope::Stage(stage),
                TimerKind::ProgressTick,
                Duration::from_millis(self.config.progress.tick_ms),
            );
        }

        if stage.shows_countdown() {
            self.session
                .countdown
                .initialize(self.config.countdown.initial_secs);
            if self.scheduler.pending_in(TimerScope::Countdown) == 0
                && !self.session.countdown.is_expired()
            {
                self.scheduler.set_interval(
                    TimerScope::Countdown,
                    TimerKind::CountdownTick,
                    Duration::from_millis(self.config.countdown.tick_ms),
                );
            }
            if let Some(remaining) = self.session.countdown.remaining_secs() {
                events.push(self.countdown_ticked(remaining));
            }
        }

        if stage.shows_notifications() && self.config.notifications.enabled {
            self.session
                .notification
                .activate(&mut self.scheduler, &self.timing);
        }
    }

    /// Base table, with the locality entry spliced in when a city is known.
    fn generation_table_for_entry(&self) -> MessageTable {
        let locality = self.locality.locality();
        let city = locality.available_city();
        match generation_table(
            &self.generation_base,
            &self.config.progress.locality_message,
            city,
        ) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(error = %e, "locality entry rejected, using base table");
                self.generation_base.clone()
            }
        }
    }

    fn countdown_ticked(&self, remaining: u32) -> FunnelEvent {
        FunnelEvent::CountdownTicked {
            remaining_secs: remaining,
            display: crate::timer::format_mmss(remaining),
            urgent: self.session.countdown.is_urgent(),
            at: self.at(),
        }
    }

    fn handle_timer(&mut self, fired: Fired, events: &mut Vec<FunnelEvent>) {
        match fired.kind {
            TimerKind::ProgressTick => self.on_progress_tick(fired, events),
            TimerKind::AutoAdvance => {
                let next = match self.session.stage {
                    Stage::Verifying => Stage::Preliminary,
                    Stage::Generating => Stage::Result,
                    other => {
                        tracing::debug!(stage = %other, "auto-advance outside a timed stage");
                        return;
                    }
                };
                events.extend(self.transition_to(next, TransitionTrigger::Auto));
            }
            TimerKind::CountdownTick => {
                if let Some(remaining) = self.session.countdown.tick() {
                    if remaining == 0 {
                        self.scheduler.cancel_scope(TimerScope::Countdown);
                    }
                    events.push(self.countdown_ticked(remaining));
                }
            }
            TimerKind::NotificationAttempt => {
                let shown = self.session.notification.attempt(
                    &mut self.scheduler,
                    &mut self.rng,
                    &self.timing,
                    &self.config.notifications.messages,
                );
                if let Some(message) = shown {
                    events.push(FunnelEvent::NotificationShown {
                        message,
                        clock_ms: self.clock_ms(),
                        at: self.at(),
                    });
                }
            }
            TimerKind::NotificationHide => {
                if self.session.notification.auto_hide(fired.id) {
                    events.push(FunnelEvent::NotificationHidden {
                        reason: HideReason::Timeout,
                        clock_ms: self.clock_ms(),
                        at: self.at(),
                    });
                }
            }
            TimerKind::CarouselAdvance => {
                self.session.carousel.next();
                events.push(self.carousel_moved());
            }
        }
    }

    fn on_progress_tick(&mut self, fired: Fired, events: &mut Vec<FunnelEvent>) {
        let stage = self.session.stage;
        let Some(sim) = self.session.progress.as_mut() else {
            return;
        };
        let Some(tick) = sim.tick(&mut self.rng) else {
            return;
        };

        events.push(FunnelEvent::ProgressAdvanced {
            stage,
            progress: tick.progress,
            message: tick.message,
            clock_ms: self.scheduler.now_ms(),
            at: self.at(),
        });

        if tick.completed {
            self.scheduler.cancel(fired.id);
            self.scheduler.set_timeout(
                TimerScope::Stage(stage),
                TimerKind::AutoAdvance,
                Duration::from_millis(self.config.progress.completion_delay_ms),
            );
            tracing::debug!(%stage, "progress complete, auto-advance scheduled");
            events.push(FunnelEvent::ProgressCompleted {
                stage,
                clock_ms: self.clock_ms(),
                at: self.at(),
            });
        }
    }
}
