//! Burn rate and projection arithmetic
//!
//! Only input and output tokens count toward a burn rate. Cache creation and
//! cache read tokens are excluded regardless of their size. Projections still
//! start from the block's full four-category total.

use crate::blocks::SessionBlock;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MINUTES_PER_HOUR: f64 = 60.0;

/// Consumption rate of a block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurnRate {
    pub tokens_per_minute: f64,
    pub cost_per_hour: f64,
}

/// Extrapolated totals at the end of a block's window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageProjection {
    pub projected_total_tokens: u64,
    pub projected_total_cost: f64,
    pub remaining_minutes: f64,
}

/// Rate of a block over its duration.
///
/// Returns `None` when the block has no entries yet. Callers should read that
/// as "insufficient data", not as a zero rate.
///
/// # Examples
/// ```
/// use tokenburn_core::blocks::{BlockConfig, SessionBlockBuilder};
/// use tokenburn_core::calculator::calculate_burn_rate;
/// use tokenburn_core::types::{ModelName, TokenCounts, UsageEntry};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
/// let entries = vec![
///     UsageEntry::new(start, ModelName::new("claude-3-opus"), TokenCounts::new(1000, 500, 0, 0)).with_cost(1.5),
///     UsageEntry::new(start + Duration::minutes(30), ModelName::new("claude-3-opus"), TokenCounts::default()),
/// ];
/// let blocks = SessionBlockBuilder::new(BlockConfig::default()).build(&entries, start + Duration::hours(6));
///
/// let rate = calculate_burn_rate(&blocks[0]).unwrap();
/// assert_eq!(rate.tokens_per_minute, 50.0);
/// assert_eq!(rate.cost_per_hour, 3.0);
/// ```
pub fn calculate_burn_rate(block: &SessionBlock) -> Option<BurnRate> {
    if block.entries.is_empty() {
        return None;
    }

    let duration = block.duration_minutes();
    let tokens_per_minute = block.token_counts.billable_tokens() as f64 / duration;
    let cost_per_hour = block.cost_usd / duration * MINUTES_PER_HOUR;

    debug!(
        "Burn rate for {}: {:.2} tokens/min, ${:.4}/hour over {:.2}min",
        block.id, tokens_per_minute, cost_per_hour, duration
    );

    Some(BurnRate {
        tokens_per_minute,
        cost_per_hour,
    })
}

/// Extrapolate a block to the end of its window.
///
/// Without a burn rate the projection equals the current totals, but
/// `remaining_minutes` is still reported.
pub fn project(
    block: &SessionBlock,
    burn_rate: Option<&BurnRate>,
    now: DateTime<Utc>,
) -> UsageProjection {
    let remaining = (block.end_time - now).max(Duration::zero());
    let remaining_minutes = remaining.num_milliseconds() as f64 / 60_000.0;

    let current_tokens = block.total_tokens() as f64;
    let current_cost = block.total_cost();

    let (projected_tokens, projected_cost) = match burn_rate {
        Some(rate) => (
            current_tokens + rate.tokens_per_minute * remaining_minutes,
            current_cost + rate.cost_per_hour / MINUTES_PER_HOUR * remaining_minutes,
        ),
        None => (current_tokens, current_cost),
    };

    UsageProjection {
        projected_total_tokens: projected_tokens.round() as u64,
        projected_total_cost: projected_cost,
        remaining_minutes,
    }
}

/// Recompute burn rate and projection on every active block.
///
/// Runs each refresh tick because both values depend on `now`.
pub fn refresh_active_metrics(blocks: &mut [SessionBlock], now: DateTime<Utc>) {
    for block in blocks.iter_mut().filter(|b| b.is_active && !b.is_gap) {
        let burn_rate = calculate_burn_rate(block);
        block.projection_data = Some(project(block, burn_rate.as_ref(), now));
        block.burn_rate = burn_rate;
    }
}

/// Tokens per minute across all blocks over the hour ending at `now`.
///
/// Each non-gap block contributes its total pro-rated by how much of its
/// span overlaps the window. Active blocks are treated as running until
/// `now`, closed blocks until their actual end.
pub fn hourly_burn_rate(blocks: &[SessionBlock], now: DateTime<Utc>) -> f64 {
    let window_start = now - Duration::hours(1);

    let tokens: f64 = blocks
        .iter()
        .filter(|block| !block.is_gap)
        .map(|block| {
            let span_end = if block.is_active {
                now
            } else {
                block.actual_end_time.unwrap_or(now)
            };
            tokens_in_window(block, span_end, window_start, now)
        })
        .sum();

    let rate = tokens / MINUTES_PER_HOUR;
    debug!("Hourly burn rate: {:.3} tokens/min from {:.1} tokens", rate, tokens);
    rate
}

fn tokens_in_window(
    block: &SessionBlock,
    span_end: DateTime<Utc>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> f64 {
    if span_end < window_start {
        return 0.0;
    }

    let overlap_start = block.start_time.max(window_start);
    let overlap_end = span_end.min(window_end);
    if overlap_end <= overlap_start {
        return 0.0;
    }

    let span = (span_end - block.start_time).num_milliseconds() as f64;
    if span <= 0.0 {
        return 0.0;
    }

    let overlap = (overlap_end - overlap_start).num_milliseconds() as f64;
    block.total_tokens() as f64 * (overlap / span)
}
