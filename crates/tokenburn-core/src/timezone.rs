//! Display timezone selection
//!
//! All block arithmetic happens in UTC. The zone chosen here only affects how
//! times are printed.

use crate::error::{Result, TokenburnError};
use chrono_tz::Tz;
use std::str::FromStr;
use tracing::debug;

/// Zone used when rendering timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayZone {
    pub tz: Tz,
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self { tz: local_zone() }
    }
}

impl DisplayZone {
    /// Resolve from CLI flags; `--utc` wins over `--timezone`
    pub fn from_cli(timezone: Option<&str>, utc: bool) -> Result<Self> {
        if utc {
            return Ok(Self { tz: Tz::UTC });
        }
        match timezone {
            Some(name) => Tz::from_str(name).map(|tz| Self { tz }).map_err(|_| {
                TokenburnError::InvalidTimezone(format!(
                    "'{name}'. Use a zone name like 'Europe/Berlin' or 'UTC'"
                ))
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn is_utc(&self) -> bool {
        self.tz == Tz::UTC
    }

    pub fn name(&self) -> &str {
        if self.is_utc() { "UTC" } else { self.tz.name() }
    }
}

/// Local zone from `TZ`, then the OS, then UTC
pub fn local_zone() -> Tz {
    if let Ok(name) = std::env::var("TZ")
        && let Ok(tz) = Tz::from_str(&name)
    {
        debug!("Using timezone from TZ: {}", name);
        return tz;
    }

    match iana_time_zone::get_timezone() {
        Ok(name) => Tz::from_str(&name).unwrap_or_else(|_| {
            debug!("Unrecognized system timezone '{}', using UTC", name);
            Tz::UTC
        }),
        Err(e) => {
            debug!("Could not detect local timezone: {:?}, using UTC", e);
            Tz::UTC
        }
    }
}
