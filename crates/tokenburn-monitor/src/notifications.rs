//! Notification cooldown bookkeeping
//!
//! Each alert key remembers whether and when it last fired. A key may fire
//! again once its cooldown has elapsed. The table is persisted as JSON in the
//! state directory so cooldowns survive restarts; the in-memory copy stays
//! authoritative when a write fails. Delivery preferences live in a sibling
//! file, see [`crate::preferences`].

use crate::alerts::AlertKind;
use crate::preferences::NotificationPreferences;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokenburn_core::{Result, TokenburnError};
use tracing::{debug, warn};

/// File name of the persisted table inside the state directory
pub const STATE_FILE_NAME: &str = "notification_states.json";

/// Cooldown applied to keys nobody configured
pub const DEFAULT_COOLDOWN_HOURS: f64 = 24.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

impl FromStr for NotificationPriority {
    type Err = TokenburnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(TokenburnError::InvalidArgument(format!(
                "unknown notification priority: {s}"
            ))),
        }
    }
}

fn default_cooldown_hours() -> f64 {
    DEFAULT_COOLDOWN_HOURS
}

/// Persisted record for one alert key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationState {
    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: f64,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::new(NotificationPriority::Normal, DEFAULT_COOLDOWN_HOURS)
    }
}

impl NotificationState {
    pub fn new(priority: NotificationPriority, cooldown_hours: f64) -> Self {
        Self {
            triggered: false,
            timestamp: None,
            count: 0,
            priority,
            cooldown_hours,
        }
    }

    /// True when the last firing is younger than `cooldown_hours`
    fn cooling_down(&self, cooldown_hours: f64, now: DateTime<Utc>) -> bool {
        match (self.triggered, self.timestamp) {
            (true, Some(fired_at)) => {
                let elapsed_ms = (now - fired_at).num_milliseconds() as f64;
                elapsed_ms < cooldown_hours * 3_600_000.0
            }
            _ => false,
        }
    }
}

/// Aggregate view over the table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total_sent: u64,
    pub active_notifications: usize,
    pub configured_keys: Vec<String>,
}

/// Default records for every known alert kind
pub fn default_states() -> BTreeMap<String, NotificationState> {
    AlertKind::ALL
        .iter()
        .map(|kind| {
            (
                kind.key().to_string(),
                NotificationState::new(kind.priority(), kind.default_cooldown_hours()),
            )
        })
        .collect()
}

fn default_state_for(key: &str) -> NotificationState {
    AlertKind::ALL
        .iter()
        .find(|kind| kind.key() == key)
        .map(|kind| NotificationState::new(kind.priority(), kind.default_cooldown_hours()))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct NotificationManager {
    path: Option<PathBuf>,
    states: BTreeMap<String, NotificationState>,
    preferences: NotificationPreferences,
    /// Firings of this process, pruned to the last hour
    recent: Vec<DateTime<Utc>>,
}

impl NotificationManager {
    /// Load the table and preferences from `state_dir`, falling back to
    /// defaults when a file is missing or unreadable
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let state_dir = state_dir.as_ref();
        let path = state_dir.join(STATE_FILE_NAME);
        let states = load_states(&path);
        Self {
            path: Some(path),
            states,
            preferences: NotificationPreferences::load(state_dir),
            recent: Vec::new(),
        }
    }

    /// Manager that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            states: default_states(),
            preferences: NotificationPreferences::default(),
            recent: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn preferences(&self) -> &NotificationPreferences {
        &self.preferences
    }

    /// Replace the preferences and store them next to the state table
    pub fn set_preferences(&mut self, preferences: NotificationPreferences) -> Result<()> {
        self.preferences = preferences;
        match self.path.as_deref().and_then(Path::parent) {
            Some(state_dir) => self.preferences.save(state_dir),
            None => Ok(()),
        }
    }

    /// Number of firings in the hour before `now`
    pub fn sent_within_hour(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(1);
        self.recent.retain(|fired_at| *fired_at > cutoff);
        self.recent.len()
    }

    pub fn should_notify(&mut self, key: &str, cooldown_hours: f64) -> bool {
        self.should_notify_at(key, cooldown_hours, Utc::now())
    }

    /// Whether `key` may fire at `now`.
    ///
    /// Unknown keys are registered untriggered and always pass. A triggered key
    /// with no timestamp also passes.
    pub fn should_notify_at(&mut self, key: &str, cooldown_hours: f64, now: DateTime<Utc>) -> bool {
        let state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| default_state_for(key));
        !state.cooling_down(cooldown_hours, now)
    }

    pub fn mark_notified(&mut self, key: &str) {
        self.mark_notified_at(key, Utc::now());
    }

    /// Record a firing of `key` and persist the whole table
    pub fn mark_notified_at(&mut self, key: &str, now: DateTime<Utc>) {
        let state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| default_state_for(key));
        state.triggered = true;
        state.timestamp = Some(now);
        state.count += 1;
        debug!("Notification {} fired ({} total)", key, state.count);
        self.recent.push(now);

        self.persist();
    }

    pub fn get(&self, key: &str) -> Option<&NotificationState> {
        self.states.get(key)
    }

    pub fn states(&self) -> &BTreeMap<String, NotificationState> {
        &self.states
    }

    pub fn is_notification_active(&self, key: &str) -> bool {
        self.is_notification_active_at(key, Utc::now())
    }

    /// True when `key` fired within its own configured cooldown
    pub fn is_notification_active_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.states
            .get(key)
            .is_some_and(|state| state.cooling_down(state.cooldown_hours, now))
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            total_sent: self.states.values().map(|s| s.count).sum(),
            active_notifications: self
                .states
                .values()
                .filter(|s| s.triggered && s.timestamp.is_some())
                .count(),
            configured_keys: self.states.keys().cloned().collect(),
        }
    }

    /// Forget every firing of `key`; false if the key is unknown
    pub fn reset(&mut self, key: &str) -> bool {
        let Some(state) = self.states.get_mut(key) else {
            return false;
        };
        *state = NotificationState::new(state.priority, state.cooldown_hours);
        self.persist();
        true
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_json_atomic(path, &self.states) {
            warn!(
                "Failed to save notification states to {}: {}",
                path.display(),
                e
            );
        }
    }
}

fn load_states(path: &Path) -> BTreeMap<String, NotificationState> {
    let mut states = default_states();

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return states,
        Err(e) => {
            warn!("Failed to read notification states from {}: {}", path.display(), e);
            return states;
        }
    };

    match serde_json::from_str::<BTreeMap<String, NotificationState>>(&content) {
        Ok(loaded) => {
            debug!("Loaded {} notification states from {}", loaded.len(), path.display());
            states.extend(loaded);
        }
        Err(e) => warn!(
            "Ignoring corrupt notification state file {}: {}",
            path.display(),
            e
        ),
    }
    states
}

/// Write to a sibling temp file and rename it over the target, so a crash
/// mid-write leaves the previous file intact
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let _ = fs::remove_file(&temp_path);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;

    fs::rename(&temp_path, path).map_err(|e| {
        TokenburnError::NotificationState(format!(
            "cannot replace {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_key_notifies_and_is_registered() {
        let mut manager = NotificationManager::in_memory();
        assert!(manager.get("custom").is_none());
        assert!(manager.should_notify_at("custom", 24.0, at(0)));

        let state = manager.get("custom").unwrap();
        assert!(!state.triggered);
        assert_eq!(state.cooldown_hours, DEFAULT_COOLDOWN_HOURS);
    }

    #[test]
    fn test_cooldown_blocks_then_releases() {
        let mut manager = NotificationManager::in_memory();
        manager.mark_notified_at("k", at(0));

        assert!(!manager.should_notify_at("k", 24.0, at(0)));
        assert!(!manager.should_notify_at("k", 24.0, at(23)));
        assert!(manager.should_notify_at("k", 24.0, at(0) + Duration::hours(24)));
    }

    #[test]
    fn test_triggered_without_timestamp_notifies() {
        let mut manager = NotificationManager::in_memory();
        manager.states.insert(
            "k".to_string(),
            NotificationState {
                triggered: true,
                ..NotificationState::default()
            },
        );
        assert!(manager.should_notify_at("k", 24.0, at(0)));
    }

    #[test]
    fn test_known_kinds_are_seeded() {
        let manager = NotificationManager::in_memory();
        let state = manager.get("tokens_will_run_out").unwrap();
        assert_eq!(state.priority, NotificationPriority::Critical);
        assert_eq!(state.cooldown_hours, 1.0);
        assert_eq!(manager.get("exceed_max_limit").unwrap().cooldown_hours, 6.0);
    }

    #[test]
    fn test_mark_counts_and_active_window() {
        let mut manager = NotificationManager::in_memory();
        manager.mark_notified_at("exceed_max_limit", at(0));
        manager.mark_notified_at("exceed_max_limit", at(7));

        assert_eq!(manager.get("exceed_max_limit").unwrap().count, 2);
        assert!(manager.is_notification_active_at("exceed_max_limit", at(12)));
        assert!(!manager.is_notification_active_at("exceed_max_limit", at(13)));
        assert!(!manager.is_notification_active_at("switch_to_custom", at(7)));

        let stats = manager.stats();
        assert_eq!(stats.total_sent, 2);
        assert_eq!(stats.active_notifications, 1);
        assert_eq!(stats.configured_keys.len(), 3);
    }

    #[test]
    fn test_reset() {
        let mut manager = NotificationManager::in_memory();
        manager.mark_notified_at("switch_to_custom", at(0));
        assert!(manager.reset("switch_to_custom"));
        assert!(manager.should_notify_at("switch_to_custom", 24.0, at(1)));
        assert_eq!(manager.get("switch_to_custom").unwrap().count, 0);
        assert!(!manager.reset("missing"));
    }

    #[test]
    fn test_state_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join("nested");

        let mut manager = NotificationManager::new(&state_dir);
        manager.mark_notified_at("k", at(3));
        assert!(state_dir.join(STATE_FILE_NAME).exists());
        assert!(!state_dir.join("notification_states.json.tmp").exists());

        let mut reloaded = NotificationManager::new(&state_dir);
        let state = reloaded.get("k").unwrap();
        assert!(state.triggered);
        assert_eq!(state.timestamp, Some(at(3)));
        assert!(!reloaded.should_notify_at("k", 24.0, at(4)));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE_NAME), "{not json").unwrap();

        let mut manager = NotificationManager::new(dir.path());
        assert!(manager.should_notify_at("exceed_max_limit", 6.0, at(0)));
        assert_eq!(manager.stats().total_sent, 0);
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        // state dir below a regular file cannot be created
        let mut manager = NotificationManager::new(blocker.join("state"));
        manager.mark_notified_at("k", at(0));
        assert!(!manager.should_notify_at("k", 24.0, at(1)));
    }

    #[test]
    fn test_timestamps_serialize_as_iso8601() {
        let dir = TempDir::new().unwrap();
        let mut manager = NotificationManager::new(dir.path());
        manager.mark_notified_at("k", at(5));

        let content = fs::read_to_string(dir.path().join(STATE_FILE_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["k"]["timestamp"], "2024-01-01T05:00:00Z");
        assert_eq!(value["k"]["priority"], "normal");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<NotificationPriority>().unwrap(), NotificationPriority::High);
        assert!("urgent".parse::<NotificationPriority>().is_err());
    }

    #[test]
    fn test_sent_within_hour_prunes() {
        let mut manager = NotificationManager::in_memory();
        manager.mark_notified_at("a", at(0));
        manager.mark_notified_at("b", at(0) + Duration::minutes(30));
        assert_eq!(manager.sent_within_hour(at(0) + Duration::minutes(45)), 2);
        assert_eq!(manager.sent_within_hour(at(1) + Duration::minutes(15)), 1);
        assert_eq!(manager.sent_within_hour(at(3)), 0);
    }

    #[test]
    fn test_preferences_persist_next_to_states() {
        let dir = TempDir::new().unwrap();
        let mut manager = NotificationManager::new(dir.path());
        let preferences = NotificationPreferences {
            priority_threshold: NotificationPriority::High,
            ..NotificationPreferences::default()
        };
        manager.set_preferences(preferences).unwrap();
        assert!(dir.path().join(crate::preferences::PREFERENCES_FILE_NAME).exists());

        let reloaded = NotificationManager::new(dir.path());
        assert_eq!(reloaded.preferences(), &preferences);
    }
}
