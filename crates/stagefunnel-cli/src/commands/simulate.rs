//! Scripted session on the virtual clock.
//!
//! Without `--script` a built-in walkthrough fills the form, goes through
//! every stage and lingers on the offer. The run is deterministic for a
//! given seed, so its event log can be diffed between configurations.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use stagefunnel_core::photo::{HttpPhotoLookup, OfflinePhotoLookup, PhotoLookup};
use stagefunnel_core::{Config, Funnel, FunnelEvent, Locality, Stage, StaticLocality};

use super::input::{parse_line, Input, HELP};
use super::print_events;

/// Step used by `wait-for`.
const POLL_STEP: Duration = Duration::from_millis(100);
/// `wait-for` gives up after this much virtual time.
const WAIT_FOR_LIMIT_MS: u64 = 10 * 60 * 1_000;

#[derive(Args)]
pub struct SimulateArgs {
    /// Seed for every random draw
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// City reported by the locality source
    #[arg(long)]
    city: Option<String>,
    /// Phone entered by the built-in walkthrough
    #[arg(long, default_value = "11987654321")]
    phone: String,
    /// Virtual milliseconds to keep running once the offer is reached
    #[arg(long, default_value_t = 10_000)]
    linger_ms: u64,
    /// Read commands from this file instead of the built-in walkthrough
    #[arg(long)]
    script: Option<PathBuf>,
    /// Ignore the config file and use built-in defaults
    #[arg(long)]
    defaults: bool,
    /// Call the configured lookup service instead of using the fallback photo
    #[arg(long)]
    online: bool,
}

fn walkthrough(args: &SimulateArgs) -> String {
    format!(
        "start
phone {phone}
gender female
last-active last_7_days
relocation no
submit
wait-for preliminary
continue
wait-for result
wait 5000
unlock
wait {linger}
snapshot",
        phone = args.phone,
        linger = args.linger_ms,
    )
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if args.defaults {
        Config::default()
    } else {
        Config::load_or_default()
    };
    config.seed = Some(args.seed);

    let lookup: Box<dyn PhotoLookup> = if args.online {
        Box::new(HttpPhotoLookup::new(config.photo.endpoint_url()?))
    } else {
        Box::new(OfflinePhotoLookup)
    };
    let locality = StaticLocality(args.city.clone().map(Locality::city).unwrap_or_default());
    let mut funnel = Funnel::new(config, locality)?;

    let script = match &args.script {
        Some(path) => std::fs::read_to_string(path)?,
        None => walkthrough(&args),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    for (n, line) in script.lines().enumerate() {
        let input = match parse_line(line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => return Err(format!("line {}: {e}", n + 1).into()),
        };

        match input {
            Input::Quit => break,
            Input::Help => eprintln!("{HELP}"),
            Input::Steps => println!("{}", serde_json::to_string(&funnel.step_indicator())?),
            Input::Wait(ms) => print_events(&funnel.advance_by(Duration::from_millis(ms)))?,
            Input::WaitFor(stage) => wait_for(&mut funnel, stage)?,
            Input::Action(action) => {
                let events = action
                    .apply(&mut funnel)
                    .map_err(|e| format!("line {}: {e}", n + 1))?;
                print_events(&events)?;

                // lookups resolve before the clock moves again
                for request in events.iter().filter_map(FunnelEvent::photo_request) {
                    let outcome = runtime.block_on(lookup.lookup(&request.phone));
                    print_events(&funnel.apply_photo_result(request.request_id, &outcome))?;
                }
            }
        }
    }

    tracing::info!(stage = %funnel.stage(), clock_ms = funnel.clock_ms(), "simulation finished");
    Ok(())
}

fn wait_for(funnel: &mut Funnel, stage: Stage) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = funnel.clock_ms().saturating_add(WAIT_FOR_LIMIT_MS);
    while funnel.stage() != stage {
        if funnel.clock_ms() >= deadline {
            return Err(format!(
                "stage {stage} not reached within {}s (stuck in {})",
                WAIT_FOR_LIMIT_MS / 1_000,
                funnel.stage()
            )
            .into());
        }
        print_events(&funnel.advance_by(POLL_STEP))?;
    }
    Ok(())
}
