//! User preferences that gate alert delivery
//!
//! These filters sit in front of the cooldown table: an alert must clear the
//! priority threshold, fall outside quiet hours (critical alerts are exempt)
//! and fit the hourly budget before its cooldown is even consulted.

use crate::notifications::{NotificationPriority, write_json_atomic};
use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tokenburn_core::{Result, TokenburnError};
use tracing::{debug, warn};

/// File name of the persisted preferences inside the state directory
pub const PREFERENCES_FILE_NAME: &str = "notification_preferences.json";

pub const DEFAULT_MAX_NOTIFICATIONS_PER_HOUR: u32 = 10;

/// Local-time hour range, `[start, end)`, that may wrap past midnight
///
/// ```
/// use tokenburn_monitor::preferences::QuietHours;
///
/// let night: QuietHours = "22-7".parse().unwrap();
/// assert!(night.contains(23));
/// assert!(night.contains(3));
/// assert!(!night.contains(7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            self.start <= hour && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl fmt::Display for QuietHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for QuietHours {
    type Err = TokenburnError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            TokenburnError::InvalidArgument(format!(
                "quiet hours must look like START-END with hours 0-24, got {s:?}"
            ))
        };
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start: u32 = start.trim().parse().map_err(|_| invalid())?;
        let end: u32 = end.trim().parse().map_err(|_| invalid())?;
        if start > 23 || end > 24 {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

fn default_max_per_hour() -> u32 {
    DEFAULT_MAX_NOTIFICATIONS_PER_HOUR
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Alerts below this priority never fire
    #[serde(default)]
    pub priority_threshold: NotificationPriority,
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default = "default_max_per_hour")]
    pub max_notifications_per_hour: u32,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            priority_threshold: NotificationPriority::Normal,
            quiet_hours: None,
            max_notifications_per_hour: DEFAULT_MAX_NOTIFICATIONS_PER_HOUR,
        }
    }
}

impl NotificationPreferences {
    /// Read preferences from `state_dir`; missing or corrupt files give defaults
    pub fn load(state_dir: &Path) -> Self {
        let path = state_dir.join(PREFERENCES_FILE_NAME);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Failed to read notification preferences from {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(preferences) => {
                debug!("Loaded notification preferences from {}", path.display());
                preferences
            }
            Err(e) => {
                warn!(
                    "Ignoring corrupt notification preferences {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        write_json_atomic(&state_dir.join(PREFERENCES_FILE_NAME), self)
    }

    pub fn meets_threshold(&self, priority: NotificationPriority) -> bool {
        priority >= self.priority_threshold
    }

    /// Whether a non-critical alert is muted at `hour` (local time)
    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        self.quiet_hours.is_some_and(|quiet| quiet.contains(hour))
    }

    pub fn is_quiet_at(&self, now: DateTime<Utc>) -> bool {
        self.is_quiet_hour(now.with_timezone(&Local).hour())
    }

    /// Priority, quiet-hour and budget checks; `sent_last_hour` counts
    /// firings in the hour before `now`
    pub fn allows(
        &self,
        priority: NotificationPriority,
        now: DateTime<Utc>,
        sent_last_hour: usize,
    ) -> bool {
        if !self.meets_threshold(priority) {
            return false;
        }
        if priority != NotificationPriority::Critical && self.is_quiet_at(now) {
            return false;
        }
        sent_last_hour < self.max_notifications_per_hour as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_quiet_hours_parse_and_wrap() {
        let day: QuietHours = "9-17".parse().unwrap();
        assert!(day.contains(9));
        assert!(!day.contains(17));
        assert!(!day.contains(3));

        let night: QuietHours = " 22 - 6 ".parse().unwrap();
        assert!(night.contains(0));
        assert!(!night.contains(12));
        assert_eq!(night.to_string(), "22-6");

        assert!("22".parse::<QuietHours>().is_err());
        assert!("25-3".parse::<QuietHours>().is_err());
        assert!("a-b".parse::<QuietHours>().is_err());
    }

    #[test]
    fn test_threshold() {
        let preferences = NotificationPreferences {
            priority_threshold: NotificationPriority::High,
            ..NotificationPreferences::default()
        };
        assert!(!preferences.allows(NotificationPriority::Normal, now(), 0));
        assert!(preferences.allows(NotificationPriority::High, now(), 0));
        assert!(preferences.allows(NotificationPriority::Critical, now(), 0));
    }

    #[test]
    fn test_quiet_hours_spare_critical() {
        // covers every local hour
        let preferences = NotificationPreferences {
            quiet_hours: Some(QuietHours { start: 0, end: 24 }),
            ..NotificationPreferences::default()
        };
        assert!(!preferences.allows(NotificationPriority::High, now(), 0));
        assert!(preferences.allows(NotificationPriority::Critical, now(), 0));
    }

    #[test]
    fn test_hourly_budget() {
        let preferences = NotificationPreferences {
            max_notifications_per_hour: 2,
            ..NotificationPreferences::default()
        };
        assert!(preferences.allows(NotificationPriority::Critical, now(), 1));
        assert!(!preferences.allows(NotificationPriority::Critical, now(), 2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            NotificationPreferences::load(dir.path()),
            NotificationPreferences::default()
        );

        let preferences = NotificationPreferences {
            priority_threshold: NotificationPriority::Critical,
            quiet_hours: Some(QuietHours { start: 22, end: 7 }),
            max_notifications_per_hour: 3,
        };
        preferences.save(dir.path()).unwrap();
        assert_eq!(NotificationPreferences::load(dir.path()), preferences);

        let raw = fs::read_to_string(dir.path().join(PREFERENCES_FILE_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["priority_threshold"], "critical");
        assert_eq!(value["quiet_hours"]["start"], 22);
    }

    #[test]
    fn test_partial_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREFERENCES_FILE_NAME);

        fs::write(&path, r#"{"priority_threshold": "high"}"#).unwrap();
        let preferences = NotificationPreferences::load(dir.path());
        assert_eq!(preferences.priority_threshold, NotificationPriority::High);
        assert_eq!(preferences.max_notifications_per_hour, 10);

        fs::write(&path, "not json").unwrap();
        assert_eq!(
            NotificationPreferences::load(dir.path()),
            NotificationPreferences::default()
        );
    }
}
