mod countdown;
mod scheduler;

pub use countdown::{format_mmss, Countdown};
pub use scheduler::{Fired, Scheduler, TimerId, TimerKind, TimerScope};
