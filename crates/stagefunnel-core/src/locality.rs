//! Geolocation collaborator.
//!
//! The funnel samples the locality at two instants only (entering
//! `Generating` and entering `Result`); later changes are not observed
//! mid-stage.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    pub city: Option<String>,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl Locality {
    pub fn city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    /// The city name, if present and non-blank.
    pub fn available_city(&self) -> Option<&str> {
        self.city.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

pub trait LocalitySource: Send {
    fn locality(&self) -> Locality;
}

impl<F> LocalitySource for F
where
    F: Fn() -> Locality + Send,
{
    fn locality(&self) -> Locality {
        self()
    }
}

/// Fixed locality.
#[derive(Debug, Clone, Default)]
pub struct StaticLocality(pub Locality);

impl LocalitySource for StaticLocality {
    fn locality(&self) -> Locality {
        self.0.clone()
    }
}

/// Locality that can be updated from outside the funnel, e.g. when a
/// geolocation lookup finishes after the session started.
#[derive(Debug, Clone, Default)]
pub struct SharedLocality {
    inner: Arc<Mutex<Locality>>,
}

impl SharedLocality {
    pub fn new(initial: Locality) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, locality: Locality) {
        match self.inner.lock() {
            Ok(mut guard) => *guard = locality,
            Err(poisoned) => *poisoned.into_inner() = locality,
        }
    }
}

impl LocalitySource for SharedLocality {
    fn locality(&self) -> Locality {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
