//! Fallback model pricing and per-entry cost resolution
//!
//! Prices are a static table keyed by model family. There is no network
//! lookup; entries that carry a recorded cost can bypass the table entirely
//! through [`CostMode`].

use crate::types::{CostMode, ModelName, TokenCounts, UsageEntry};
use serde::{Deserialize, Serialize};
use tracing::trace;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Per-million-token prices in USD
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPricing {
    /// Input token price
    pub input: f64,
    /// Output token price
    pub output: f64,
    /// Cache creation token price
    pub cache_creation: f64,
    /// Cache read token price
    pub cache_read: f64,
}

pub const OPUS_PRICING: ModelPricing = ModelPricing {
    input: 15.0,
    output: 75.0,
    cache_creation: 18.75,
    cache_read: 1.5,
};

pub const SONNET_PRICING: ModelPricing = ModelPricing {
    input: 3.0,
    output: 15.0,
    cache_creation: 3.75,
    cache_read: 0.3,
};

pub const HAIKU_PRICING: ModelPricing = ModelPricing {
    input: 0.25,
    output: 1.25,
    cache_creation: 0.3,
    cache_read: 0.03,
};

/// Pick the price row for a model, defaulting to sonnet rates
pub fn pricing_for(model: &ModelName) -> ModelPricing {
    let key = model.normalized();
    if key.contains("opus") {
        OPUS_PRICING
    } else if key.contains("haiku") {
        HAIKU_PRICING
    } else {
        SONNET_PRICING
    }
}

/// Price a set of token counts
///
/// # Examples
/// ```
/// use tokenburn_core::pricing::{calculate_from_pricing, SONNET_PRICING};
/// use tokenburn_core::types::TokenCounts;
///
/// let cost = calculate_from_pricing(&TokenCounts::new(1_000_000, 0, 0, 0), &SONNET_PRICING);
/// assert!((cost - 3.0).abs() < 1e-9);
/// ```
pub fn calculate_from_pricing(tokens: &TokenCounts, pricing: &ModelPricing) -> f64 {
    let cost = (tokens.input_tokens as f64 * pricing.input
        + tokens.output_tokens as f64 * pricing.output
        + tokens.cache_creation_tokens as f64 * pricing.cache_creation
        + tokens.cache_read_tokens as f64 * pricing.cache_read)
        / TOKENS_PER_MILLION;

    trace!(
        "Calculated cost: ${:.6} for {} total tokens",
        cost,
        tokens.total_tokens()
    );
    cost
}

/// Resolve the cost of one entry under the given mode
pub fn entry_cost(entry: &UsageEntry, mode: CostMode) -> f64 {
    match mode {
        CostMode::Cached => entry.cost_usd.unwrap_or(0.0),
        CostMode::Calculated => calculate_from_pricing(&entry.tokens, &pricing_for(&entry.model)),
        CostMode::Auto => match entry.cost_usd {
            Some(cost) if cost > 0.0 => cost,
            _ => calculate_from_pricing(&entry.tokens, &pricing_for(&entry.model)),
        },
    }
}
