//! TOML-based funnel configuration.
//!
//! Holds every tunable of a session:
//! - Form gate (minimum phone digits)
//! - Progress tick, completion delay and per-stage message tables
//! - Countdown length and urgency threshold
//! - Notification timing, probability and message pool
//! - Carousel images and auto-advance interval
//! - Photo lookup endpoint and fallback
//!
//! Configuration is stored at `~/.config/stagefunnel/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ValidationError};
use crate::notification::NotificationTiming;
use crate::photo::PhotoFallback;
use crate::progress::{generation_table, IncrementPolicy, MessageEntry, MessageTable};

/// Form configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default = "default_min_phone_digits")]
    pub min_phone_digits: usize,
}

/// One timed stage: increment policy and message table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgressConfig {
    pub window: f64,
    pub initial_message: String,
    pub increment: IncrementPolicy,
    pub messages: Vec<MessageEntry>,
}

impl StageProgressConfig {
    pub fn table(&self) -> Result<MessageTable, ValidationError> {
        MessageTable::new(self.messages.clone(), self.window)
    }
}

/// Progress simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_completion_delay_ms")]
    pub completion_delay_ms: u64,
    /// Template for the locality entry; `{city}` is replaced.
    #[serde(default = "default_locality_message")]
    pub locality_message: String,
    #[serde(default = "default_verification")]
    pub verification: StageProgressConfig,
    #[serde(default = "default_generation")]
    pub generation: StageProgressConfig,
}

/// Countdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    #[serde(default = "default_countdown_secs")]
    pub initial_secs: u32,
    #[serde(default = "default_urgent_threshold_secs")]
    pub urgent_threshold_secs: u32,
    #[serde(default = "default_countdown_tick_ms")]
    pub tick_ms: u64,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default = "default_notification_messages")]
    pub messages: Vec<String>,
}

impl NotificationsConfig {
    pub fn timing(&self) -> NotificationTiming {
        NotificationTiming {
            initial_delay_ms: self.initial_delay_ms,
            interval_ms: self.interval_ms,
            display_ms: self.display_ms,
            probability: self.probability,
        }
    }
}

/// Carousel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarouselConfig {
    #[serde(default = "default_carousel_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_carousel_images")]
    pub images: Vec<String>,
}

/// Photo lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    #[serde(default = "default_photo_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    #[serde(default = "default_unavailable_notice")]
    pub unavailable_notice: String,
    #[serde(default = "default_error_notice")]
    pub error_notice: String,
}

impl PhotoConfig {
    pub fn fallback(&self) -> PhotoFallback {
        PhotoFallback {
            url: self.fallback_url.clone(),
            unavailable_notice: self.unavailable_notice.clone(),
            error_notice: self.error_notice.clone(),
        }
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "photo.endpoint".into(),
            message: e.to_string(),
        })
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/stagefunnel/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seed for every random draw; `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub form: FormConfig,
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub photo: PhotoConfig,
    #[serde(default)]
    pub carousel: CarouselConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

// Default functions
fn default_min_phone_digits() -> usize {
    10
}
fn default_tick_ms() -> u64 {
    400
}
fn default_completion_delay_ms() -> u64 {
    1_000
}
fn default_locality_message() -> String {
    "Reviewing recent activity around {city}...".into()
}
fn default_verification() -> StageProgressConfig {
    StageProgressConfig {
        window: 25.0,
        initial_message: "Starting analysis...".into(),
        increment: IncrementPolicy::Uniform {
            min: 2.0,
            max: 10.0,
        },
        messages: vec![
            MessageEntry::new(0.0, "Connecting to the lookup service..."),
            MessageEntry::new(15.0, "Retrieving profile information..."),
            MessageEntry::new(30.0, "Processing activity records..."),
            MessageEntry::new(45.0, "Resolving approximate region..."),
            MessageEntry::new(60.0, "Cross-checking public records..."),
            MessageEntry::new(75.0, "Analyzing activity patterns..."),
            MessageEntry::new(90.0, "Compiling the summary..."),
            MessageEntry::new(100.0, "Preliminary analysis complete!"),
        ],
    }
}
fn default_generation() -> StageProgressConfig {
    StageProgressConfig {
        window: 20.0,
        initial_message: "Reviewing profile photos...".into(),
        // 30 seconds at the default tick
        increment: IncrementPolicy::fixed_duration(30_000, default_tick_ms()),
        messages: vec![
            MessageEntry::new(0.0, "Reviewing profile photos..."),
            MessageEntry::new(20.0, "Processing recent activity..."),
            MessageEntry::new(40.0, "Checking recently used locations..."),
            MessageEntry::new(60.0, "Compiling activity data..."),
            MessageEntry::new(80.0, "Securing report contents..."),
            MessageEntry::new(95.0, "Finalizing the full report..."),
            MessageEntry::new(100.0, "Report generated successfully!"),
        ],
    }
}
fn default_countdown_secs() -> u32 {
    9 * 60 + 50
}
fn default_urgent_threshold_secs() -> u32 {
    120
}
fn default_countdown_tick_ms() -> u64 {
    1_000
}
fn default_true() -> bool {
    true
}
fn default_initial_delay_ms() -> u64 {
    5_000
}
fn default_interval_ms() -> u64 {
    25_000
}
fn default_display_ms() -> u64 {
    6_000
}
fn default_probability() -> f64 {
    0.7
}
fn default_notification_messages() -> Vec<String> {
    [
        "A report was unlocked a few minutes ago",
        "A conversation history review was just opened",
        "A photo review was just unlocked",
        "A full analysis was completed just now",
        "A confidential report was accessed moments ago",
        "A complete verification was just finished",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_carousel_interval_ms() -> u64 {
    4_000
}
fn default_carousel_images() -> Vec<String> {
    (1..=4)
        .map(|i| format!("/images/blocked-{i}.png"))
        .collect()
}
fn default_photo_endpoint() -> String {
    "http://localhost:3000/api/photo-lookup".into()
}
fn default_fallback_url() -> String {
    "/images/default-avatar.png".into()
}
fn default_unavailable_notice() -> String {
    "Could not load photo".into()
}
fn default_error_notice() -> String {
    "Error loading photo".into()
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            min_phone_digits: default_min_phone_digits(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            completion_delay_ms: default_completion_delay_ms(),
            locality_message: default_locality_message(),
            verification: default_verification(),
            generation: default_generation(),
        }
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            initial_secs: default_countdown_secs(),
            urgent_threshold_secs: default_urgent_threshold_secs(),
            tick_ms: default_countdown_tick_ms(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            interval_ms: default_interval_ms(),
            display_ms: default_display_ms(),
            probability: default_probability(),
            messages: default_notification_messages(),
        }
    }
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_carousel_interval_ms(),
            images: default_carousel_images(),
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            endpoint: default_photo_endpoint(),
            fallback_url: default_fallback_url(),
            unavailable_notice: default_unavailable_notice(),
            error_notice: default_error_notice(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            form: FormConfig::default(),
            countdown: CountdownConfig::default(),
            photo: PhotoConfig::default(),
            carousel: CarouselConfig::default(),
            notifications: NotificationsConfig::default(),
            progress: ProgressConfig::default(),
        }
    }
}

/// Returns `~/.config/stagefunnel[-dev]/` based on STAGEFUNNEL_ENV.
///
/// Set STAGEFUNNEL_ENV=dev to use the development data directory.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STAGEFUNNEL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("stagefunnel-dev")
    } else {
        base_dir.join("stagefunnel")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::SaveFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<f64>() {
                        serde_json::Number::from_f64(n)
                            .map(serde_json::Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as number")));
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                // unset optional: take JSON, else a plain string
                serde_json::Value::Null => serde_json::from_str(value)
                    .unwrap_or_else(|_| serde_json::Value::String(value.into())),
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(cfg)
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without saving. The result must
    /// still deserialize and validate.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by key and persist. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Check every value the funnel relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.form.min_phone_digits == 0 {
            return Err(invalid("form.min_phone_digits", "must be at least 1"));
        }
        if self.progress.tick_ms == 0 {
            return Err(invalid("progress.tick_ms", "must be positive"));
        }
        if self.countdown.tick_ms == 0 {
            return Err(invalid("countdown.tick_ms", "must be positive"));
        }
        for stage in [&self.progress.verification, &self.progress.generation] {
            stage.increment.validate()?;
        }
        let base = self.progress.generation.table()?;
        self.progress.verification.table()?;
        generation_table(&base, &self.progress.locality_message, Some("check"))?;

        let n = &self.notifications;
        if !(0.0..=1.0).contains(&n.probability) {
            return Err(invalid("notifications.probability", "must be within [0, 1]"));
        }
        if n.interval_ms == 0 {
            return Err(invalid("notifications.interval_ms", "must be positive"));
        }
        if n.enabled && n.messages.is_empty() {
            return Err(invalid("notifications.messages", "must not be empty"));
        }
        if self.carousel.images.is_empty() {
            return Err(invalid("carousel.images", "must not be empty"));
        }
        if self.carousel.interval_ms == 0 {
            return Err(invalid("carousel.interval_ms", "must be positive"));
        }
        self.photo.endpoint_url()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.countdown.initial_secs, 590);
        assert_eq!(parsed.progress.verification.messages.len(), 8);
        assert_eq!(parsed.progress.generation.increment, cfg.progress.generation.increment);
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_file_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.form.min_phone_digits, 10);
        assert_eq!(parsed.notifications.probability, 0.7);
        assert_eq!(parsed.carousel.images.len(), 4);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("countdown.initial_secs").as_deref(), Some("590"));
        assert_eq!(cfg.get("notifications.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("progress.tick_ms").as_deref(), Some("400"));
        assert!(cfg.get("countdown.missing_key").is_none());
    }

    #[test]
    fn set_value_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.set_value("notifications.probability", "0.5").unwrap();
        assert_eq!(cfg.notifications.probability, 0.5);
        cfg.set_value("countdown.initial_secs", "60").unwrap();
        assert_eq!(cfg.countdown.initial_secs, 60);
    }

    #[test]
    fn set_value_fills_unset_seed() {
        let mut cfg = Config::default();
        assert_eq!(cfg.get("seed").as_deref(), Some("null"));
        cfg.set_value("seed", "5").unwrap();
        assert_eq!(cfg.seed, Some(5));
        assert_eq!(cfg.get("seed").as_deref(), Some("5"));

        cfg.set_value("seed", "9").unwrap();
        assert_eq!(cfg.seed, Some(9));
        assert!(cfg.set_value("seed", "soon").is_err());
    }

    #[test]
    fn set_value_updates_array_from_json() {
        let mut cfg = Config::default();
        cfg.set_value("carousel.images", r#"["a.png", "b.png"]"#).unwrap();
        assert_eq!(cfg.carousel.images, vec!["a.png", "b.png"]);
    }

    #[test]
    fn set_value_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set_value("countdown.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_value_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set_value("notifications.enabled", "not_a_bool").is_err());
    }

    #[test]
    fn set_value_rejects_values_that_fail_validation() {
        let mut cfg = Config::default();
        assert!(cfg.set_value("notifications.probability", "1.5").is_err());
        assert_eq!(cfg.notifications.probability, 0.7);
        assert!(cfg.set_value("carousel.images", "[]").is_err());
    }

    #[test]
    fn unordered_table_fails_validation() {
        let mut cfg = Config::default();
        cfg.progress.verification.messages.swap(0, 1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.seed = Some(42);
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.seed, Some(42));
        assert_eq!(loaded.photo.endpoint, cfg.photo.endpoint);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "countdown = 5").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }
}
