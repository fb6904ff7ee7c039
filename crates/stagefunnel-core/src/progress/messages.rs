//! Progress-to-message mapping.
//!
//! A table is an ascending list of `(breakpoint, message)` entries plus a
//! window width. An entry matches when `breakpoint <= progress <
//! breakpoint + window`; the highest matching breakpoint wins. With a window
//! wider than the largest single tick, a random step can overshoot a
//! breakpoint without ever leaving progress uncovered.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Placeholder replaced by the locality name in the locality entry.
pub const CITY_PLACEHOLDER: &str = "{city}";

/// Breakpoint of the spliced locality entry.
pub const LOCALITY_BREAKPOINT: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub breakpoint: f64,
    pub message: String,
}

impl MessageEntry {
    pub fn new(breakpoint: f64, message: impl Into<String>) -> Self {
        Self {
            breakpoint,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTable {
    entries: Vec<MessageEntry>,
    window: f64,
}

impl MessageTable {
    /// Build a table, rejecting empty tables, non-positive windows and
    /// breakpoints that are not ascending.
    pub fn new(entries: Vec<MessageEntry>, window: f64) -> Result<Self, ValidationError> {
        if entries.is_empty() {
            return Err(ValidationError::EmptyCollection("message table".into()));
        }
        if !(window.is_finite() && window > 0.0) {
            return Err(ValidationError::InvalidValue {
                field: "window".into(),
                message: format!("must be a positive number, got {window}"),
            });
        }
        for pair in entries.windows(2) {
            if !(pair[0].breakpoint < pair[1].breakpoint) {
                return Err(ValidationError::UnorderedTable {
                    previous: pair[0].breakpoint,
                    next: pair[1].breakpoint,
                });
            }
        }
        Ok(Self { entries, window })
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    /// Message for the highest breakpoint whose window contains `progress`.
    pub fn select(&self, progress: f64) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.breakpoint <= progress && progress < e.breakpoint + self.window)
            .map(|e| e.message.as_str())
    }

    /// Copy of this table with `entry` inserted after every entry whose
    /// breakpoint does not exceed it.
    pub fn with_entry(&self, entry: MessageEntry) -> Result<Self, ValidationError> {
        let mut entries = self.entries.clone();
        let pos = entries.partition_point(|e| e.breakpoint <= entry.breakpoint);
        entries.insert(pos, entry);
        Self::new(entries, self.window)
    }
}

/// Free-function form of [`MessageTable::select`].
pub fn select_message(progress: f64, table: &MessageTable) -> Option<&str> {
    table.select(progress)
}

/// The report-generation table for one stage entry.
///
/// When `city` is available the locality entry is spliced in at
/// [`LOCALITY_BREAKPOINT`]; otherwise the base table is returned unchanged.
pub fn generation_table(
    base: &MessageTable,
    locality_template: &str,
    city: Option<&str>,
) -> Result<MessageTable, ValidationError> {
    match city {
        Some(city) => base.with_entry(MessageEntry::new(
            LOCALITY_BREAKPOINT,
            locality_template.replace(CITY_PLACEHOLDER, city),
        )),
        None => Ok(base.clone()),
    }
}
