//! Runtime configuration
//!
//! Resolved once from the CLI at startup and passed by reference to the
//! components that need it.

use crate::cli::Cli;
use std::path::PathBuf;
use std::time::Duration as StdDuration;
use tokenburn_core::timezone::DisplayZone;
use tokenburn_core::{BlockConfig, CostMode, PlanType, Result, TokenburnError};

const APP_DIR: &str = "tokenburn";
const DEFAULT_DATA_FILE: &str = "usage.jsonl";

/// Settings that drive one refresh tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSettings {
    pub block: BlockConfig,
    pub plan: PlanType,
    pub cost_mode: CostMode,
    pub interval: StdDuration,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            block: BlockConfig::default(),
            plan: PlanType::default(),
            cost_mode: CostMode::default(),
            interval: StdDuration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: PathBuf,
    pub state_dir: PathBuf,
    pub tick: TickSettings,
    pub zone: DisplayZone,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.interval == 0 {
            return Err(TokenburnError::InvalidArgument(
                "--interval must be at least 1 second".to_string(),
            ));
        }
        if cli.window_hours == 0 {
            return Err(TokenburnError::InvalidArgument(
                "--window-hours must be at least 1".to_string(),
            ));
        }

        let window = chrono::Duration::hours(i64::from(cli.window_hours));
        let idle = cli
            .idle_minutes
            .map(|minutes| chrono::Duration::minutes(i64::from(minutes)));
        let block = BlockConfig::new(window, idle, cli.anchor)?;

        let data_path = match &cli.data {
            Some(path) => path.clone(),
            None => default_data_path()?,
        };
        let state_dir = match &cli.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir()?,
        };

        Ok(Self {
            data_path,
            state_dir,
            tick: TickSettings {
                block,
                plan: cli.plan,
                cost_mode: cli.mode,
                interval: StdDuration::from_secs(cli.interval),
            },
            zone: DisplayZone::from_cli(cli.timezone.as_deref(), cli.utc)?,
            json: cli.json,
            verbose: cli.verbose,
        })
    }
}

/// `<config dir>/tokenburn`
pub fn default_state_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| {
            TokenburnError::Config(
                "cannot determine a config directory; pass --state-dir".to_string(),
            )
        })
}

/// `<data dir>/tokenburn/usage.jsonl`
pub fn default_data_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR).join(DEFAULT_DATA_FILE))
        .ok_or_else(|| {
            TokenburnError::Config("cannot determine a data directory; pass --data".to_string())
        })
}
