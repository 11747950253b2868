//! CLI interface for tokenburn
//!
//! # Example
//!
//! ```bash
//! # Live panel over a usage file, Pro plan limits
//! tokenburn watch --data ~/usage.jsonl --plan pro
//!
//! # One-shot block report as JSON
//! tokenburn blocks --json
//!
//! # Inspect or clear alert cooldowns
//! tokenburn alerts
//! tokenburn alerts --reset exceed_max_limit
//! tokenburn alerts --priority-threshold high --quiet-hours 22-7
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokenburn_core::{BlockAnchor, CostMode, PlanType};
use tokenburn_monitor::{NotificationPriority, QuietHours};

/// Track token burn rate, session blocks and limit alerts
#[derive(Parser, Debug, Clone)]
#[command(name = "tokenburn")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show informational output (default is quiet mode with only warnings and errors)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// JSONL file of usage records
    #[arg(long, env = "TOKENBURN_DATA", global = true)]
    pub data: Option<PathBuf>,

    /// Refresh interval in seconds for watch mode
    #[arg(long, default_value = "5", global = true)]
    pub interval: u64,

    /// Session block length in hours
    #[arg(long, default_value = "5", global = true)]
    pub window_hours: u32,

    /// Silence in minutes that ends a block with an idle gap (defaults to the block length)
    #[arg(long, global = true)]
    pub idle_minutes: Option<u32>,

    /// Block start anchoring: first-entry or hour
    #[arg(long, default_value = "first-entry", global = true)]
    pub anchor: BlockAnchor,

    /// Plan whose limits apply: pro, max5, max20 or custom
    #[arg(long, default_value = "custom", global = true)]
    pub plan: PlanType,

    /// Cost calculation mode: auto, cached or calculated
    #[arg(long, default_value = "auto", global = true)]
    pub mode: CostMode,

    /// Directory holding persisted notification state
    #[arg(long, env = "TOKENBURN_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Timezone for displayed times (e.g. "America/New_York", "Asia/Tokyo", "UTC").
    /// If not specified, uses the system's local timezone
    #[arg(long, short = 'z', global = true)]
    pub timezone: Option<String>,

    /// Use UTC for displayed times (overrides --timezone)
    #[arg(long, global = true)]
    pub utc: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute; defaults to `watch`
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Arguments for the live refresh loop
#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Stop after this many ticks instead of running until Ctrl+C
    #[arg(long)]
    pub ticks: Option<u64>,
}

/// Arguments for the block report
#[derive(Args, Debug, Clone, Default)]
pub struct BlocksArgs {
    /// Show only the active block
    #[arg(long)]
    pub active: bool,

    /// Show only blocks that started in the last 24 hours
    #[arg(long)]
    pub recent: bool,

    /// Include the per-model breakdown of each block
    #[arg(long)]
    pub models: bool,
}

/// Arguments for the alert table
#[derive(Args, Debug, Clone, Default)]
pub struct AlertsArgs {
    /// Clear the cooldown of one alert key
    #[arg(long, value_name = "KEY")]
    pub reset: Option<String>,

    /// Lowest priority that may fire: low, normal, high or critical
    #[arg(long, value_name = "LEVEL")]
    pub priority_threshold: Option<NotificationPriority>,

    /// Local hours during which only critical alerts fire, e.g. 22-7
    #[arg(long, value_name = "START-END", conflicts_with = "no_quiet_hours")]
    pub quiet_hours: Option<QuietHours>,

    /// Clear the quiet hours
    #[arg(long)]
    pub no_quiet_hours: bool,

    /// Most alerts fired in any hour
    #[arg(long, value_name = "N")]
    pub max_per_hour: Option<u32>,
}

impl AlertsArgs {
    /// Whether any preference flag was given
    pub fn changes_preferences(&self) -> bool {
        self.priority_threshold.is_some()
            || self.quiet_hours.is_some()
            || self.no_quiet_hours
            || self.max_per_hour.is_some()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Live panel refreshed every interval
    Watch(WatchArgs),
    /// Session block report
    Blocks(BlocksArgs),
    /// Persisted alert cooldowns
    Alerts(AlertsArgs),
}

impl Cli {
    /// The subcommand to run, `watch` when none was given
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Watch(WatchArgs::default()))
    }
}
