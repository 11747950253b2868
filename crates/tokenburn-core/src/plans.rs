//! Subscription plans and token limits
//!
//! Fixed plans carry static limits. The custom plan derives its token limit
//! from history: the 90th percentile of closed blocks that came close to a
//! known plan ceiling.

use crate::blocks::SessionBlock;
use crate::error::TokenburnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Token ceilings of the known plans
pub const COMMON_TOKEN_LIMITS: [u64; 4] = [44_000, 88_000, 220_000, 880_000];

/// Fraction of a ceiling at which a block counts as having hit it
pub const LIMIT_DETECTION_THRESHOLD: f64 = 0.95;

/// Lower bound for any derived limit
pub const DEFAULT_TOKEN_LIMIT: u64 = 44_000;

/// Static limits of one plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub token_limit: u64,
    pub cost_limit: f64,
    pub message_limit: u64,
}

/// Available subscription plans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Pro,
    Max5,
    Max20,
    #[default]
    Custom,
}

impl PlanType {
    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Pro => PlanLimits {
                token_limit: 44_000,
                cost_limit: 18.0,
                message_limit: 250,
            },
            Self::Max5 => PlanLimits {
                token_limit: 88_000,
                cost_limit: 35.0,
                message_limit: 1_000,
            },
            Self::Max20 => PlanLimits {
                token_limit: 220_000,
                cost_limit: 140.0,
                message_limit: 2_000,
            },
            Self::Custom => PlanLimits {
                token_limit: DEFAULT_TOKEN_LIMIT,
                cost_limit: 200.0,
                message_limit: 250,
            },
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pro => "Pro",
            Self::Max5 => "Max5",
            Self::Max20 => "Max20",
            Self::Custom => "Custom",
        }
    }

    /// Effective token limit; the custom plan derives it from `blocks`
    pub fn token_limit(&self, blocks: &[SessionBlock]) -> u64 {
        match self {
            Self::Custom => p90_token_limit(blocks),
            plan => plan.limits().token_limit,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pro => write!(f, "pro"),
            Self::Max5 => write!(f, "max5"),
            Self::Max20 => write!(f, "max20"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for PlanType {
    type Err = TokenburnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pro" => Ok(Self::Pro),
            "max5" => Ok(Self::Max5),
            "max20" => Ok(Self::Max20),
            "custom" => Ok(Self::Custom),
            _ => Err(TokenburnError::UnknownPlan(s.to_string())),
        }
    }
}

/// Percentage of `limit` consumed by `used`, 0 when there is no limit
pub fn usage_percentage(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}

fn hit_common_limit(tokens: u64) -> bool {
    COMMON_TOKEN_LIMITS
        .iter()
        .any(|&limit| tokens as f64 >= limit as f64 * LIMIT_DETECTION_THRESHOLD)
}

/// P90 of closed block totals, never below [`DEFAULT_TOKEN_LIMIT`].
///
/// Prefers blocks that reached a known ceiling and falls back to every
/// closed block when none did.
pub fn p90_token_limit(blocks: &[SessionBlock]) -> u64 {
    let closed: Vec<u64> = blocks
        .iter()
        .filter(|b| !b.is_gap && !b.is_active)
        .map(|b| b.total_tokens())
        .filter(|&tokens| tokens > 0)
        .collect();

    let hits: Vec<u64> = closed
        .iter()
        .copied()
        .filter(|&tokens| hit_common_limit(tokens))
        .collect();

    let sample = if hits.is_empty() { closed } else { hits };
    let Some(p90) = percentile_90(sample) else {
        return DEFAULT_TOKEN_LIMIT;
    };

    let limit = (p90 as u64).max(DEFAULT_TOKEN_LIMIT);
    debug!("P90 token limit: {}", limit);
    limit
}

/// Ninth decile cut point using exclusive interpolation
fn percentile_90(mut values: Vec<u64>) -> Option<f64> {
    const N: usize = 10;
    const I: usize = 9;

    match values.len() {
        0 => return None,
        1 => return Some(values[0] as f64),
        _ => {}
    }
    values.sort_unstable();

    let len = values.len();
    let m = len + 1;
    let j = (I * m / N).clamp(1, len - 1);
    let delta = (I * m) as f64 - (j * N) as f64;
    let lower = values[j - 1] as f64;
    let upper = values[j] as f64;
    Some((lower * (N as f64 - delta) + upper * delta) / N as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use crate::types::TokenCounts;

    fn closed(tokens: u64) -> SessionBlock {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut block = SessionBlock::gap(start, start + Duration::hours(5));
        block.is_gap = false;
        block.token_counts = TokenCounts::new(tokens, 0, 0, 0);
        block
    }

    #[test]
    fn test_plan_limits() {
        assert_eq!(PlanType::Pro.limits().token_limit, 44_000);
        assert_eq!(PlanType::Max5.limits().message_limit, 1_000);
        assert_eq!(PlanType::Max20.limits().cost_limit, 140.0);
        assert_eq!(PlanType::Custom.limits().cost_limit, 200.0);
    }

    #[test]
    fn test_plan_parse() {
        assert_eq!("MAX20".parse::<PlanType>().unwrap(), PlanType::Max20);
        assert!(matches!(
            "team".parse::<PlanType>(),
            Err(TokenburnError::UnknownPlan(_))
        ));
    }

    #[test]
    fn test_fixed_plan_ignores_history() {
        let blocks = vec![closed(500_000)];
        assert_eq!(PlanType::Max5.token_limit(&blocks), 88_000);
    }

    #[test]
    fn test_p90_defaults_without_history() {
        assert_eq!(p90_token_limit(&[]), DEFAULT_TOKEN_LIMIT);
        assert_eq!(p90_token_limit(&[closed(0)]), DEFAULT_TOKEN_LIMIT);
    }

    #[test]
    fn test_p90_never_below_default() {
        let blocks: Vec<_> = [1_000, 2_000, 3_000].into_iter().map(closed).collect();
        assert_eq!(p90_token_limit(&blocks), DEFAULT_TOKEN_LIMIT);
    }

    #[test]
    fn test_p90_prefers_limit_hits() {
        // 90_000 and 100_000 reach 95% of 88k; the small blocks are ignored
        let blocks: Vec<_> = [1_000, 2_000, 90_000, 100_000]
            .into_iter()
            .map(closed)
            .collect();
        // j = clamp(9*3/10 = 2, 1, 1) = 1, delta = 27 - 10 = 17
        // (90_000 * -7 + 100_000 * 17) / 10 = 107_000
        assert_eq!(p90_token_limit(&blocks), 107_000);
    }

    #[test]
    fn test_p90_skips_active_and_gap_blocks() {
        let mut active = closed(900_000);
        active.is_active = true;
        let mut gap = closed(900_000);
        gap.is_gap = true;
        assert_eq!(p90_token_limit(&[active, gap]), DEFAULT_TOKEN_LIMIT);
    }

    #[test]
    fn test_percentile_interpolation() {
        let values: Vec<u64> = (1..=10).map(|v| v * 10_000).collect();
        // m = 11, j = 9, delta = 99 - 90 = 9 -> (90k*1 + 100k*9)/10
        assert_eq!(percentile_90(values), Some(99_000.0));
    }

    #[test]
    fn test_usage_percentage() {
        assert_eq!(usage_percentage(22_000, 44_000), 50.0);
        assert_eq!(usage_percentage(10, 0), 0.0);
    }
}
