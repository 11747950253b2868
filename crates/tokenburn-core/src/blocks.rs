//! Session block construction
//!
//! Groups timestamp-ordered usage entries into fixed-length windows
//! ("session blocks") and inserts gap blocks for idle periods between them.
//!
//! A block starts at its anchor (the first entry's timestamp by default, or
//! that timestamp floored to the hour) and covers `[start, start + window)`.
//! An entry at or past the window end closes the current block at its last
//! entry. If the silence before the new entry reaches the idle threshold a gap
//! block spans it and the next block is anchored at the new entry; the gap
//! never runs past that anchor. Otherwise the next block begins at the
//! previous window boundary.
//!
//! # Example
//!
//! ```
//! use tokenburn_core::blocks::{BlockConfig, SessionBlockBuilder};
//! use tokenburn_core::types::{ModelName, TokenCounts, UsageEntry};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap();
//! let entries = vec![
//!     UsageEntry::new(start, ModelName::new("claude-3-opus"), TokenCounts::new(100, 50, 0, 0)),
//!     UsageEntry::new(start + Duration::hours(1), ModelName::new("claude-3-opus"), TokenCounts::new(10, 5, 0, 0)),
//! ];
//!
//! let blocks = SessionBlockBuilder::new(BlockConfig::default())
//!     .build(&entries, start + Duration::hours(2));
//! assert_eq!(blocks.len(), 1);
//! assert!(blocks[0].is_active);
//! assert_eq!(blocks[0].total_tokens(), 165);
//! ```

use crate::calculator::{BurnRate, UsageProjection};
use crate::error::{Result, TokenburnError};
use crate::pricing::entry_cost;
use crate::types::{CostMode, SessionId, TokenCounts, UsageEntry};
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default window length in hours
pub const DEFAULT_WINDOW_HOURS: i64 = 5;

/// Floor applied to every block duration, in minutes
pub const MIN_DURATION_MINUTES: f64 = 1.0;

/// How a new block's start time is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockAnchor {
    /// Start exactly at the first entry's timestamp
    #[default]
    FirstEntry,
    /// Start at the first entry's timestamp floored to the hour
    Hour,
}

impl fmt::Display for BlockAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstEntry => write!(f, "first-entry"),
            Self::Hour => write!(f, "hour"),
        }
    }
}

impl FromStr for BlockAnchor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first-entry" | "first_entry" | "entry" => Ok(Self::FirstEntry),
            "hour" => Ok(Self::Hour),
            _ => Err(format!("Invalid block anchor: {s}")),
        }
    }
}

/// Windowing policy for the block builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockConfig {
    /// Nominal block length
    pub window: Duration,
    /// Silence at or above which a gap block is synthesized
    pub idle_threshold: Duration,
    /// Start-time anchoring rule
    pub anchor: BlockAnchor,
}

impl Default for BlockConfig {
    fn default() -> Self {
        let window = Duration::hours(DEFAULT_WINDOW_HOURS);
        Self {
            window,
            idle_threshold: window,
            anchor: BlockAnchor::FirstEntry,
        }
    }
}

impl BlockConfig {
    /// Build a config, rejecting non-positive durations.
    ///
    /// When `idle_threshold` is `None` it equals the window length.
    pub fn new(
        window: Duration,
        idle_threshold: Option<Duration>,
        anchor: BlockAnchor,
    ) -> Result<Self> {
        if window <= Duration::zero() {
            return Err(TokenburnError::Config(format!(
                "block window must be positive, got {} minutes",
                window.num_minutes()
            )));
        }
        let idle_threshold = idle_threshold.unwrap_or(window);
        if idle_threshold <= Duration::zero() {
            return Err(TokenburnError::Config(format!(
                "idle threshold must be positive, got {} minutes",
                idle_threshold.num_minutes()
            )));
        }
        Ok(Self {
            window,
            idle_threshold,
            anchor,
        })
    }

    fn anchor_at(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        match self.anchor {
            BlockAnchor::FirstEntry => timestamp,
            BlockAnchor::Hour => timestamp
                .duration_trunc(Duration::hours(1))
                .unwrap_or(timestamp),
        }
    }
}

/// Per-model totals inside one block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub tokens: TokenCounts,
    pub cost_usd: f64,
    pub entries_count: u64,
}

/// A bounded window of usage, or a synthetic idle gap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlock {
    /// RFC 3339 start time, `gap-` prefixed for gap blocks
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Entries in timestamp order; always empty for gap blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<UsageEntry>,
    pub token_counts: TokenCounts,
    pub cost_usd: f64,
    pub is_active: bool,
    #[serde(default)]
    pub is_gap: bool,
    /// Set once the block is closed; `None` while active and for gap blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub per_model_stats: BTreeMap<String, ModelStats>,
    /// Normalized model names in first-seen order
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub sent_messages_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_rate: Option<BurnRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_data: Option<UsageProjection>,
}

impl SessionBlock {
    fn open(start_time: DateTime<Utc>, window: Duration) -> Self {
        Self {
            id: SessionId::new(start_time.to_rfc3339()),
            start_time,
            end_time: start_time + window,
            entries: Vec::new(),
            token_counts: TokenCounts::default(),
            cost_usd: 0.0,
            is_active: false,
            is_gap: false,
            actual_end_time: None,
            per_model_stats: BTreeMap::new(),
            models: Vec::new(),
            sent_messages_count: 0,
            burn_rate: None,
            projection_data: None,
        }
    }

    /// An idle interval with no entries
    pub fn gap(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let mut block = Self::open(start_time, end_time - start_time);
        block.id = SessionId::new(format!("gap-{}", start_time.to_rfc3339()));
        block.is_gap = true;
        block
    }

    fn push(&mut self, entry: &UsageEntry, cost: f64) {
        self.token_counts += entry.tokens;
        self.cost_usd += cost;
        self.sent_messages_count += 1;

        let model = entry.model.normalized();
        let stats = self.per_model_stats.entry(model.clone()).or_default();
        stats.tokens += entry.tokens;
        stats.cost_usd += cost;
        stats.entries_count += 1;
        if !self.models.contains(&model) {
            self.models.push(model);
        }

        self.entries.push(entry.clone());
    }

    fn close(&mut self) {
        self.is_active = false;
        self.actual_end_time = self.last_activity();
    }

    /// Timestamp of the most recent entry
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.timestamp)
    }

    /// Sum of all four token categories
    pub fn total_tokens(&self) -> u64 {
        self.token_counts.total_tokens()
    }

    /// Aggregate cost in USD
    pub fn total_cost(&self) -> f64 {
        self.cost_usd
    }

    /// Minutes from start to `actual_end_time` (or `end_time`), floored at 1.0
    pub fn duration_minutes(&self) -> f64 {
        let end = self.actual_end_time.unwrap_or(self.end_time);
        let minutes = (end - self.start_time).num_milliseconds() as f64 / 60_000.0;
        minutes.max(MIN_DURATION_MINUTES)
    }
}

/// Incremental builder for session blocks
///
/// Entries must arrive in timestamp order. Each `push` is O(1) apart from
/// the entry clone; [`finish`](Self::finish) decides whether the trailing
/// block is still active.
#[derive(Debug)]
pub struct SessionBlockBuilder {
    config: BlockConfig,
    cost_mode: CostMode,
    blocks: Vec<SessionBlock>,
    current: Option<SessionBlock>,
}

impl SessionBlockBuilder {
    pub fn new(config: BlockConfig) -> Self {
        Self {
            config,
            cost_mode: CostMode::default(),
            blocks: Vec::new(),
            current: None,
        }
    }

    pub fn with_cost_mode(mut self, cost_mode: CostMode) -> Self {
        self.cost_mode = cost_mode;
        self
    }

    /// Append one entry, closing the current block if the entry falls past it
    pub fn push(&mut self, entry: &UsageEntry) {
        let ts = entry.timestamp;
        let cost = entry_cost(entry, self.cost_mode);

        if let Some(block) = self.current.as_mut()
            && ts < block.end_time
        {
            block.push(entry, cost);
            return;
        }

        let start = match self.current.take() {
            Some(mut block) => {
                let window_end = block.end_time;
                let last = block.last_activity().unwrap_or(block.start_time);
                block.close();
                self.blocks.push(block);

                if ts - last >= self.config.idle_threshold {
                    debug!(
                        "Idle gap of {} minutes before {}",
                        (ts - last).num_minutes(),
                        ts
                    );
                    // an hour-anchored block may start before `ts`; the gap stops there
                    let next_start = self.config.anchor_at(ts);
                    let gap_end = ts.min(next_start);
                    if gap_end > last {
                        self.blocks.push(SessionBlock::gap(last, gap_end));
                    }
                    next_start
                } else {
                    let mut start = window_end;
                    while ts >= start + self.config.window {
                        start += self.config.window;
                    }
                    start
                }
            }
            None => self.config.anchor_at(ts),
        };

        let mut block = SessionBlock::open(start, self.config.window);
        block.push(entry, cost);
        self.current = Some(block);
    }

    /// Close out the trailing block relative to `now` and return all blocks
    pub fn finish(mut self, now: DateTime<Utc>) -> Vec<SessionBlock> {
        if let Some(mut block) = self.current.take() {
            let idle = block
                .last_activity()
                .map(|last| now - last)
                .unwrap_or_else(Duration::zero);
            if now < block.end_time && idle < self.config.idle_threshold {
                block.is_active = true;
                block.actual_end_time = None;
            } else {
                block.close();
            }
            self.blocks.push(block);
        }

        debug!("Built {} session blocks", self.blocks.len());
        self.blocks
    }

    /// Build blocks from a full, ordered slice of entries
    pub fn build(mut self, entries: &[UsageEntry], now: DateTime<Utc>) -> Vec<SessionBlock> {
        for entry in entries {
            self.push(entry);
        }
        self.finish(now)
    }
}
