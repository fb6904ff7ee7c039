//! Real-time interactive session.
//!
//! A current-thread tokio runtime multiplexes three sources: a short
//! interval that moves the funnel clock to the wall clock, stdin lines
//! that become user actions, and photo lookup results coming back from
//! spawned tasks. All of them are applied to the funnel on this one task.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use stagefunnel_core::photo::{HttpPhotoLookup, LookupOutcome, OfflinePhotoLookup, PhotoLookup};
use stagefunnel_core::{Config, Funnel, FunnelEvent, Locality, StaticLocality};

use super::input::{parse_line, Input, HELP};
use super::print_events;

/// How often the funnel clock is synced to the wall clock.
const SYNC_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Args)]
pub struct PlayArgs {
    /// Seed for every random draw (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
    /// City reported by the locality source
    #[arg(long)]
    city: Option<String>,
    /// Never call the photo lookup service; every photo uses the fallback
    #[arg(long)]
    offline: bool,
}

pub fn run(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default();
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let lookup: Arc<dyn PhotoLookup> = if args.offline {
        Arc::new(OfflinePhotoLookup)
    } else {
        Arc::new(HttpPhotoLookup::new(config.photo.endpoint_url()?))
    };
    let locality = StaticLocality(args.city.map(Locality::city).unwrap_or_default());
    let funnel = Funnel::new(config, locality)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(session(funnel, lookup))
}

async fn session(
    mut funnel: Funnel,
    lookup: Arc<dyn PhotoLookup>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(session = %funnel.id(), "session started, type 'help' for commands");

    let (tx, mut rx) = mpsc::unbounded_channel::<(u64, LookupOutcome)>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(SYNC_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let started = Instant::now();

    print_events(&[funnel.snapshot()])?;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                print_events(&funnel.advance_to(elapsed))?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed, ending session");
                    break;
                };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(Input::Help)) => eprintln!("{HELP}"),
                    Ok(Some(Input::Steps)) => {
                        println!("{}", serde_json::to_string(&funnel.step_indicator())?);
                    }
                    Ok(Some(Input::Wait(_) | Input::WaitFor(_))) => {
                        eprintln!("wait directives only apply to 'simulate'");
                    }
                    Ok(Some(Input::Action(action))) => match action.apply(&mut funnel) {
                        Ok(events) => {
                            spawn_lookups(&events, &lookup, &tx);
                            print_events(&events)?;
                        }
                        Err(e) => eprintln!("error: {e}"),
                    },
                    Err(e) => eprintln!("{e}"),
                }
            }
            Some((request_id, outcome)) = rx.recv() => {
                print_events(&funnel.apply_photo_result(request_id, &outcome))?;
            }
        }
    }

    print_events(&[funnel.snapshot()])?;
    Ok(())
}

/// Start one lookup task per `PhotoRequested` event.
fn spawn_lookups(
    events: &[FunnelEvent],
    lookup: &Arc<dyn PhotoLookup>,
    tx: &mpsc::UnboundedSender<(u64, LookupOutcome)>,
) {
    for request in events.iter().filter_map(FunnelEvent::photo_request) {
        let lookup = Arc::clone(lookup);
        let tx = tx.clone();
        tracing::debug!(request_id = request.request_id, "spawning photo lookup");
        tokio::spawn(async move {
            let outcome = lookup.lookup(&request.phone).await;
            // receiver gone means the session ended
            let _ = tx.send((request.request_id, outcome));
        });
    }
}
