//! End-to-end runs of the funnel on the virtual clock.
//!
//! These tests drive a whole session through its stages and check the
//! timing and teardown behaviour observable from the event stream.

use std::time::Duration;

use stagefunnel_core::events::{FunnelEvent, HideReason, TransitionTrigger};
use stagefunnel_core::photo::{LookupOutcome, PhotoLookup, PhotoLookupResponse};
use stagefunnel_core::{
    Config, Funnel, Gender, LastActive, Locality, OfflinePhotoLookup, Relocation,
    SharedLocality, Stage, StaticLocality, TimerScope,
};

fn config() -> Config {
    let mut config = Config::default();
    config.seed = Some(2024);
    config
}

fn public_photo() -> LookupOutcome {
    LookupOutcome::Response(PhotoLookupResponse {
        success: true,
        result: Some("https://cdn.example/p.jpg".into()),
        is_photo_private: Some(false),
    })
}

/// Fill every field and resolve the photo.
fn complete_form(f: &mut Funnel) {
    let request = f
        .set_phone("11987654321")
        .unwrap()
        .iter()
        .find_map(FunnelEvent::photo_request)
        .expect("phone at minimum length requests a photo");
    f.set_gender(Gender::Male).unwrap();
    f.set_last_active(LastActive::Last30Days).unwrap();
    f.set_relocation(Relocation::Unknown).unwrap();
    f.apply_photo_result(request.request_id, &public_photo());
}

/// Advance in small steps until `stage` is reached.
fn run_until(f: &mut Funnel, stage: Stage) -> Vec<FunnelEvent> {
    let mut events = Vec::new();
    for _ in 0..10_000 {
        if f.stage() == stage {
            return events;
        }
        events.extend(f.advance_by(Duration::from_millis(100)));
    }
    panic!("never reached {stage}, stuck in {}", f.stage());
}

fn to_preliminary(f: &mut Funnel) -> Vec<FunnelEvent> {
    f.start().unwrap();
    complete_form(f);
    f.submit().unwrap();
    run_until(f, Stage::Preliminary)
}

/// Drive to `Generating`, returning the clock at entry.
fn to_generating(f: &mut Funnel) -> u64 {
    to_preliminary(f);
    f.continue_to_report().unwrap();
    f.clock_ms()
}

fn stage_change(events: &[FunnelEvent], to_stage: Stage) -> (u64, TransitionTrigger) {
    events
        .iter()
        .find_map(|e| match e {
            FunnelEvent::StageChanged {
                to,
                clock_ms,
                trigger,
                ..
            } if *to == to_stage => Some((*clock_ms, *trigger)),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no transition to {to_stage}"))
}

fn completed_at(events: &[FunnelEvent], stage_done: Stage) -> u64 {
    events
        .iter()
        .find_map(|e| match e {
            FunnelEvent::ProgressCompleted {
                stage, clock_ms, ..
            } if *stage == stage_done => Some(*clock_ms),
            _ => None,
        })
        .expect("stage completed")
}

fn progress_messages(events: &[FunnelEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            FunnelEvent::ProgressAdvanced { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn verification_auto_advances_one_second_after_completion() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    let events = to_preliminary(&mut f);

    let done = completed_at(&events, Stage::Verifying);
    let (changed, trigger) = stage_change(&events, Stage::Preliminary);
    assert_eq!(changed, done + 1_000);
    assert_eq!(trigger, TransitionTrigger::Auto);

    // no tick after completion
    assert!(!events.iter().any(|e| matches!(
        e,
        FunnelEvent::ProgressAdvanced { clock_ms, .. } if *clock_ms > done
    )));

    // exactly one transition out of Verifying
    let transitions = events
        .iter()
        .filter(|e| matches!(e, FunnelEvent::StageChanged { .. }))
        .count();
    assert_eq!(transitions, 1);
}

#[test]
fn verification_progress_is_monotonic_with_bounded_steps() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    let events = to_preliminary(&mut f);

    let mut last = 0.0;
    for e in &events {
        if let FunnelEvent::ProgressAdvanced { progress, .. } = e {
            let step = progress - last;
            assert!(step >= 0.0);
            // the final step may be clamped
            assert!(step < 10.0 || *progress == 100.0, "step {step}");
            last = *progress;
        }
    }
    assert_eq!(last, 100.0);
}

#[test]
fn verification_messages_follow_the_table() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    let events = to_preliminary(&mut f);
    let messages = progress_messages(&events);
    assert_eq!(messages.first().map(String::as_str), Some("Connecting to the lookup service..."));
    assert_eq!(messages.last().map(String::as_str), Some("Preliminary analysis complete!"));
}

#[test]
fn generation_takes_thirty_seconds_then_advances() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    let entered = to_generating(&mut f);
    let events = run_until(&mut f, Stage::Result);

    assert_eq!(completed_at(&events, Stage::Generating), entered + 30_000);
    let (changed, _) = stage_change(&events, Stage::Result);
    assert_eq!(changed, entered + 31_000);
}

#[test]
fn locality_is_spliced_into_generation_messages() {
    let mut f = Funnel::new(config(), StaticLocality(Locality::city("Lisbon"))).unwrap();
    to_generating(&mut f);
    let messages = progress_messages(&run_until(&mut f, Stage::Result));
    assert!(messages
        .iter()
        .any(|m| m == "Reviewing recent activity around Lisbon..."));
}

#[test]
fn no_locality_means_base_table_only() {
    let mut f = Funnel::new(config(), StaticLocality(Locality::unavailable())).unwrap();
    to_generating(&mut f);
    let messages = progress_messages(&run_until(&mut f, Stage::Result));
    assert!(!messages.iter().any(|m| m.contains("around")));
    assert!(messages.iter().any(|m| m == "Processing recent activity..."));
}

#[test]
fn locality_is_read_at_stage_entry_only() {
    let shared = SharedLocality::new(Locality::city("Lisbon"));
    let mut f = Funnel::new(config(), shared.clone()).unwrap();
    to_generating(&mut f);

    // a later change is not picked up mid-stage
    shared.set(Locality::city("Porto"));
    let events = run_until(&mut f, Stage::Result);
    let messages = progress_messages(&events);
    assert!(messages.iter().any(|m| m.contains("Lisbon")));
    assert!(!messages.iter().any(|m| m.contains("Porto")));

    // but the result stage reads it again on entry
    assert_eq!(f.session().locality.as_deref(), Some("Porto"));
}

#[test]
fn countdown_survives_result_to_offer() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    to_generating(&mut f);
    let events = run_until(&mut f, Stage::Result);
    assert!(events.iter().any(|e| matches!(
        e,
        FunnelEvent::CountdownTicked { remaining_secs: 590, .. }
    )));

    let entered = f.clock_ms();
    f.advance_to(entered + 1_000);
    assert_eq!(f.session().countdown.remaining_secs(), Some(589));

    f.unlock().unwrap();
    assert_eq!(f.session().countdown.remaining_secs(), Some(589));
    assert_eq!(f.scheduler().pending_in(TimerScope::Countdown), 1);

    f.advance_to(entered + 2_000);
    assert_eq!(f.session().countdown.remaining_secs(), Some(588));
}

#[test]
fn countdown_turns_urgent_and_stops_at_zero() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    to_generating(&mut f);
    run_until(&mut f, Stage::Result);
    let entered = f.clock_ms();

    f.advance_to(entered + 469_000);
    assert_eq!(f.session().countdown.remaining_secs(), Some(121));
    assert!(!f.session().countdown.is_urgent());
    let events = f.advance_to(entered + 470_000);
    assert!(events.iter().any(|e| matches!(
        e,
        FunnelEvent::CountdownTicked { remaining_secs: 120, urgent: true, display, .. } if display == "02:00"
    )));

    f.advance_to(entered + 600_000);
    assert_eq!(f.session().countdown.remaining_secs(), Some(0));
    assert_eq!(f.scheduler().pending_in(TimerScope::Countdown), 0);
}

#[test]
fn carousel_advances_only_while_result_is_active() {
    let mut config = config();
    config.notifications.enabled = false;
    let mut f = Funnel::new(config, StaticLocality::default()).unwrap();
    to_generating(&mut f);
    run_until(&mut f, Stage::Result);
    let entered = f.clock_ms();

    let events = f.advance_to(entered + 16_000);
    let indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            FunnelEvent::CarouselMoved { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 0]);

    f.unlock().unwrap();
    assert_eq!(f.scheduler().pending_in(TimerScope::Stage(Stage::Result)), 0);
    let events = f.advance_by(Duration::from_secs(20));
    assert!(!events
        .iter()
        .any(|e| matches!(e, FunnelEvent::CarouselMoved { .. })));
}

#[test]
fn notifications_start_with_generation_and_keep_running_into_result() {
    let mut config = config();
    config.notifications.probability = 1.0;
    let mut f = Funnel::new(config, StaticLocality::default()).unwrap();

    let prelim = to_preliminary(&mut f);
    assert!(!prelim
        .iter()
        .any(|e| matches!(e, FunnelEvent::NotificationShown { .. })));
    assert_eq!(f.scheduler().pending_in(TimerScope::Notification), 0);

    f.continue_to_report().unwrap();
    let entered = f.clock_ms();

    let events = f.advance_to(entered + 5_000);
    assert!(events.iter().any(|e| matches!(
        e,
        FunnelEvent::NotificationShown { clock_ms, .. } if *clock_ms == entered + 5_000
    )));
    assert!(f.session().notification.is_visible());

    let events = f.advance_to(entered + 11_000);
    assert!(events.iter().any(|e| matches!(
        e,
        FunnelEvent::NotificationHidden { reason: HideReason::Timeout, .. }
    )));

    run_until(&mut f, Stage::Result);
    assert!(f.scheduler().pending_in(TimerScope::Notification) >= 1);

    // second interval firing lands inside Result
    let events = f.advance_to(entered + 50_000);
    assert!(events.iter().any(|e| matches!(
        e,
        FunnelEvent::NotificationShown { clock_ms, .. } if *clock_ms == entered + 50_000
    )));
}

#[test]
fn dismissal_cancels_auto_hide_but_not_future_attempts() {
    let mut config = config();
    config.notifications.probability = 1.0;
    let mut f = Funnel::new(config, StaticLocality::default()).unwrap();
    let entered = to_generating(&mut f);

    f.advance_to(entered + 5_000);
    let hidden = f.dismiss_notification();
    assert!(matches!(
        hidden,
        Some(FunnelEvent::NotificationHidden { reason: HideReason::Dismissed, .. })
    ));
    assert!(f.dismiss_notification().is_none());

    let events = f.advance_to(entered + 11_000);
    assert!(!events
        .iter()
        .any(|e| matches!(e, FunnelEvent::NotificationHidden { .. })));

    let events = f.advance_to(entered + 25_000);
    assert!(events
        .iter()
        .any(|e| matches!(e, FunnelEvent::NotificationShown { .. })));
}

#[test]
fn zero_probability_never_shows() {
    let mut config = config();
    config.notifications.probability = 0.0;
    let mut f = Funnel::new(config, StaticLocality::default()).unwrap();
    let entered = to_generating(&mut f);
    let events = f.advance_to(entered + 300_000);
    assert!(!events
        .iter()
        .any(|e| matches!(e, FunnelEvent::NotificationShown { .. })));
}

#[test]
fn stale_photo_response_is_discarded() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    f.start().unwrap();

    let first = f
        .set_phone("1198765432")
        .unwrap()
        .iter()
        .find_map(FunnelEvent::photo_request)
        .unwrap();
    let second = f
        .set_phone("11987654321")
        .unwrap()
        .iter()
        .find_map(FunnelEvent::photo_request)
        .unwrap();

    let events = f.apply_photo_result(first.request_id, &public_photo());
    assert!(matches!(events[..], [FunnelEvent::PhotoDiscarded { .. }]));
    assert!(!f.guard().photo);

    let events = f.apply_photo_result(second.request_id, &public_photo());
    assert!(matches!(events[0], FunnelEvent::PhotoResolved { private: false, .. }));
    assert!(f.guard().photo);
}

#[test]
fn unsuccessful_lookup_resolves_to_private_fallback() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    f.start().unwrap();
    let request = f
        .set_phone("11987654321")
        .unwrap()
        .iter()
        .find_map(FunnelEvent::photo_request)
        .unwrap();
    f.set_gender(Gender::Female).unwrap();
    f.set_last_active(LastActive::Last7Days).unwrap();
    f.set_relocation(Relocation::No).unwrap();
    assert!(!f.can_submit());

    let failed = LookupOutcome::Response(PhotoLookupResponse {
        success: false,
        ..PhotoLookupResponse::default()
    });
    f.apply_photo_result(request.request_id, &failed);

    let photo = f.session().form.photo.photo().unwrap();
    assert!(photo.private);
    assert_eq!(photo.url, f.config().photo.fallback_url);
    assert!(f.can_submit());
}

#[tokio::test]
async fn offline_lookup_falls_back_and_unblocks_the_form() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    f.start().unwrap();
    let request = f
        .set_phone("11987654321")
        .unwrap()
        .iter()
        .find_map(FunnelEvent::photo_request)
        .unwrap();
    assert!(!f.guard().photo);

    let outcome = OfflinePhotoLookup.lookup(&request.phone).await;
    let events = f.apply_photo_result(request.request_id, &outcome);
    match &events[0] {
        FunnelEvent::PhotoResolved {
            url,
            private,
            notice,
            ..
        } => {
            assert_eq!(url, &f.config().photo.fallback_url);
            assert!(*private);
            assert_eq!(notice.as_deref(), Some("Error loading photo"));
        }
        other => panic!("unexpected {other:?}"),
    }

    f.set_gender(Gender::NonBinary).unwrap();
    f.set_last_active(LastActive::NotSure).unwrap();
    f.set_relocation(Relocation::Yes).unwrap();
    assert!(f.can_submit());
    f.submit().unwrap();
    assert_eq!(f.stage(), Stage::Verifying);
}

#[test]
fn step_indicator_tracks_stage() {
    let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
    assert!(f.step_indicator().iter().all(|s| !s.completed));
    to_preliminary(&mut f);
    let done: Vec<&str> = f
        .step_indicator()
        .iter()
        .filter(|s| s.completed)
        .map(|s| s.id)
        .collect();
    assert_eq!(done, vec!["form", "verification", "preliminary"]);
}

#[test]
fn same_seed_same_session() {
    let run = || {
        let mut f = Funnel::new(config(), StaticLocality::default()).unwrap();
        let events = to_preliminary(&mut f);
        completed_at(&events, Stage::Verifying)
    };
    assert_eq!(run(), run());
}
