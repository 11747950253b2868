//! Core domain types for tokenburn
//!
//! This module contains the input unit of the engine, [`UsageEntry`], and the
//! small value types it is built from. Entries are produced by an external
//! reader and are never mutated once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Model id as it appears in the usage record
///
/// # Examples
/// ```
/// use tokenburn_core::types::ModelName;
///
/// let model = ModelName::new("claude-3-opus-20240229");
/// assert_eq!(model.as_str(), "claude-3-opus-20240229");
/// assert_eq!(model.normalized(), "claude-3-opus");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Family key used for per-model statistics and pricing lookups
    pub fn normalized(&self) -> String {
        normalize_model_name(&self.0)
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collapse dated or display-style model ids into a stable family key.
///
/// Claude 4 ids are already stable and are only lowercased.
pub fn normalize_model_name(model: &str) -> String {
    if model.is_empty() {
        return String::new();
    }

    let lower = model.to_lowercase();
    let is_claude4 = ["opus-4-", "sonnet-4-", "haiku-4-"]
        .iter()
        .any(|marker| lower.contains(marker));
    if is_claude4 {
        return lower;
    }

    let is_3_5 = lower.contains("3.5") || lower.contains("3-5");
    if lower.contains("opus") {
        if lower.contains("4-") {
            return lower;
        }
        return "claude-3-opus".to_string();
    }
    if lower.contains("sonnet") {
        if lower.contains("4-") {
            return lower;
        }
        return if is_3_5 {
            "claude-3-5-sonnet".to_string()
        } else {
            "claude-3-sonnet".to_string()
        };
    }
    if lower.contains("haiku") {
        return if is_3_5 {
            "claude-3-5-haiku".to_string()
        } else {
            "claude-3-haiku".to_string()
        };
    }

    model.to_string()
}

/// Identifier of a session block
///
/// Real blocks use the RFC 3339 form of their start time, gap blocks carry a
/// `gap-` prefix. The session monitor tracks sessions by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The four token categories of a record or an aggregate
///
/// ```
/// use tokenburn_core::types::TokenCounts;
///
/// let mut block = TokenCounts::default();
/// block += TokenCounts::new(1_000, 500, 999_999, 999_999);
/// assert_eq!(block.billable_tokens(), 1_500);
/// assert_eq!(block.total_tokens(), 2_001_498);
/// ```
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenCounts {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    pub fn new(
        input_tokens: u64,
        output_tokens: u64,
        cache_creation_tokens: u64,
        cache_read_tokens: u64,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_creation_tokens,
            cache_read_tokens,
        }
    }

    /// Sum of all four categories
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }

    /// Input plus output, the only categories that count toward burn rate
    pub fn billable_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl Add for TokenCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens + other.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens + other.cache_read_tokens,
        }
    }
}

impl AddAssign for TokenCounts {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }
}

/// Cost resolution mode
///
/// Selects which cost figure the block builder trusts for each entry. It does
/// not change any of the rate or projection arithmetic.
///
/// # Examples
/// ```
/// use tokenburn_core::types::CostMode;
/// use std::str::FromStr;
///
/// assert_eq!(CostMode::from_str("cached").unwrap(), CostMode::Cached);
/// assert_eq!(CostMode::Calculated.to_string(), "calculated");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Use the recorded cost when present, otherwise price the tokens
    #[default]
    Auto,
    /// Always use the recorded cost, zero when absent
    Cached,
    /// Always price the tokens from the fallback table
    Calculated,
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cached => write!(f, "cached"),
            Self::Calculated => write!(f, "calculated"),
        }
    }
}

impl std::str::FromStr for CostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cached" => Ok(Self::Cached),
            "calculated" | "calculate" => Ok(Self::Calculated),
            _ => Err(format!("Invalid cost mode: {s}")),
        }
    }
}

/// A single usage record
///
/// Token categories are flattened into the record when serialized, so a JSONL
/// line looks like
/// `{"timestamp":"...","model":"...","input_tokens":10,"output_tokens":5,...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageEntry {
    /// When the request completed
    pub timestamp: DateTime<Utc>,
    /// Token counts for this request
    #[serde(flatten)]
    pub tokens: TokenCounts,
    /// Recorded cost in USD, if the source had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// Model that served the request
    #[serde(default)]
    pub model: ModelName,
    /// Message identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl UsageEntry {
    /// Create an entry without identifiers or a recorded cost
    pub fn new(timestamp: DateTime<Utc>, model: ModelName, tokens: TokenCounts) -> Self {
        Self {
            timestamp,
            tokens,
            cost_usd: None,
            model,
            message_id: None,
            request_id: None,
        }
    }

    /// Attach a recorded cost
    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = Some(cost_usd);
        self
    }

    /// Attach message and request identifiers
    pub fn with_ids(mut self, message_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self.request_id = Some(request_id.into());
        self
    }

    /// Deduplication key, present only when both identifiers are known
    pub fn dedup_key(&self) -> Option<String> {
        match (&self.message_id, &self.request_id) {
            (Some(message), Some(request)) => Some(format!("{message}:{request}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_token_counts_total() {
        let tokens = TokenCounts::new(1000, 500, 200, 100);
        assert_eq!(tokens.total_tokens(), 1800);
        assert_eq!(tokens.billable_tokens(), 1500);
    }

    #[test]
    fn test_token_counts_add_assign() {
        let mut tokens = TokenCounts::default();
        tokens += TokenCounts::new(1, 2, 3, 4);
        tokens += TokenCounts::new(10, 20, 30, 40);
        assert_eq!(tokens, TokenCounts::new(11, 22, 33, 44));
    }

    #[test]
    fn test_cost_mode_parse() {
        use std::str::FromStr;
        assert_eq!(CostMode::from_str("AUTO").unwrap(), CostMode::Auto);
        assert_eq!(CostMode::from_str("calculate").unwrap(), CostMode::Calculated);
        assert!(CostMode::from_str("display").is_err());
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("claude-3-opus-20240229"), "claude-3-opus");
        assert_eq!(normalize_model_name("Claude 3.5 Sonnet"), "claude-3-5-sonnet");
        assert_eq!(normalize_model_name("claude-3-5-haiku-20241022"), "claude-3-5-haiku");
        assert_eq!(
            normalize_model_name("claude-sonnet-4-20250514"),
            "claude-sonnet-4-20250514"
        );
        assert_eq!(normalize_model_name("gpt-4o"), "gpt-4o");
        assert_eq!(normalize_model_name(""), "");
    }

    #[test]
    fn test_usage_entry_json_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let entry = UsageEntry::new(ts, ModelName::new("claude-3-opus"), TokenCounts::new(10, 5, 0, 0))
            .with_cost(0.25)
            .with_ids("msg_1", "req_1");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["input_tokens"], 10);
        assert_eq!(json["cost_usd"], 0.25);

        let parsed: UsageEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_usage_entry_defaults() {
        let parsed: UsageEntry =
            serde_json::from_str(r#"{"timestamp":"2024-01-01T10:00:00Z","output_tokens":7}"#)
                .unwrap();
        assert_eq!(parsed.tokens, TokenCounts::new(0, 7, 0, 0));
        assert!(parsed.cost_usd.is_none());
        assert!(parsed.dedup_key().is_none());
    }

    #[test]
    fn test_dedup_key() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let entry = UsageEntry::new(ts, ModelName::new("m"), TokenCounts::default())
            .with_ids("msg_1", "req_9");
        assert_eq!(entry.dedup_key().as_deref(), Some("msg_1:req_9"));
    }
}
