mod messages;
mod simulator;

pub use messages::{
    generation_table, select_message, MessageEntry, MessageTable, CITY_PLACEHOLDER,
    LOCALITY_BREAKPOINT,
};
pub use simulator::{IncrementPolicy, ProgressSimulator, ProgressTick, PROGRESS_MAX};
