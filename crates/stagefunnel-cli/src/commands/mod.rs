pub mod config;
pub mod input;
pub mod play;
pub mod simulate;

use std::io::Write;

use stagefunnel_core::FunnelEvent;

/// Write each event as one JSON line on stdout.
pub fn print_events(events: &[FunnelEvent]) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for event in events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    out.flush()?;
    Ok(())
}
