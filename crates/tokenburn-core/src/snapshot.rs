//! Block snapshots exchanged with the session monitor
//!
//! A snapshot is a keyed document `{ "blocks": [ { "id", "isActive",
//! "totalTokens", "costUSD", "startTime", ... } ] }`. Producers serialize
//! [`UsageSnapshot`]; consumers run [`validate_snapshot`] on the raw JSON and
//! get back either a typed snapshot or the full list of problems found.

use crate::blocks::SessionBlock;
use crate::types::{SessionId, TokenCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const REQUIRED_BLOCK_FIELDS: [&str; 4] = ["id", "isActive", "totalTokens", "costUSD"];

/// Wire form of one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSnapshot {
    pub id: SessionId,
    pub is_active: bool,
    pub total_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_gap: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_counts: Option<TokenCounts>,
    #[serde(default)]
    pub sent_messages_count: u64,
}

impl From<&SessionBlock> for BlockSnapshot {
    fn from(block: &SessionBlock) -> Self {
        Self {
            id: block.id.clone(),
            is_active: block.is_active,
            total_tokens: block.total_tokens(),
            cost_usd: block.total_cost(),
            start_time: Some(block.start_time),
            end_time: Some(block.end_time),
            is_gap: block.is_gap,
            token_counts: Some(block.token_counts),
            sent_messages_count: block.sent_messages_count,
        }
    }
}

/// Wire form of a full block list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub blocks: Vec<BlockSnapshot>,
}

impl UsageSnapshot {
    pub fn from_blocks(blocks: &[SessionBlock]) -> Self {
        Self {
            blocks: blocks.iter().map(BlockSnapshot::from).collect(),
        }
    }

    /// First active block, which is authoritative when several claim to be
    pub fn active_block(&self) -> Option<&BlockSnapshot> {
        self.blocks.iter().find(|b| b.is_active)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Outcome of validating a raw snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValidation {
    Valid(UsageSnapshot),
    Invalid(Vec<String>),
}

impl SnapshotValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Problems found; empty when valid
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Valid(_) => &[],
            Self::Invalid(errors) => errors,
        }
    }
}

/// Check a raw snapshot and decode it.
///
/// Every problem is collected rather than stopping at the first, and the
/// result depends only on the input.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use tokenburn_core::snapshot::validate_snapshot;
///
/// let result = validate_snapshot(&json!({}));
/// assert_eq!(result.errors(), ["Missing required field: blocks"]);
///
/// let result = validate_snapshot(&json!({"blocks": [
///     {"id": "s1", "isActive": true, "totalTokens": 10, "costUSD": 0.1}
/// ]}));
/// assert!(result.is_valid());
/// ```
pub fn validate_snapshot(raw: &Value) -> SnapshotValidation {
    let Some(root) = raw.as_object() else {
        return SnapshotValidation::Invalid(vec!["Snapshot must be an object".to_string()]);
    };

    let Some(blocks) = root.get("blocks") else {
        return SnapshotValidation::Invalid(vec!["Missing required field: blocks".to_string()]);
    };

    let Some(blocks) = blocks.as_array() else {
        return SnapshotValidation::Invalid(vec!["Field blocks must be a list".to_string()]);
    };

    let mut errors = Vec::new();
    let mut decoded = Vec::with_capacity(blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        match validate_block(block, index) {
            Ok(snapshot) => decoded.push(snapshot),
            Err(block_errors) => errors.extend(block_errors),
        }
    }

    if errors.is_empty() {
        SnapshotValidation::Valid(UsageSnapshot { blocks: decoded })
    } else {
        SnapshotValidation::Invalid(errors)
    }
}

fn validate_block(raw: &Value, index: usize) -> Result<BlockSnapshot, Vec<String>> {
    let Some(block) = raw.as_object() else {
        return Err(vec![format!("Block {index} must be an object")]);
    };

    let mut errors: Vec<String> = REQUIRED_BLOCK_FIELDS
        .iter()
        .filter(|field| !block.contains_key(**field))
        .map(|field| format!("Block {index} missing required field: {field}"))
        .collect();

    // numeric ids are kept in their JSON text form
    let id = block.get("id").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    if block.contains_key("id") && id.is_none() {
        errors.push(format!("Block {index} id must be a string or number"));
    }

    let is_active = block.get("isActive").and_then(Value::as_bool);
    if block.contains_key("isActive") && is_active.is_none() {
        errors.push(format!("Block {index} isActive must be boolean"));
    }

    let total_tokens = block.get("totalTokens").and_then(Value::as_f64);
    if block.contains_key("totalTokens") && total_tokens.is_none() {
        errors.push(format!("Block {index} totalTokens must be numeric"));
    }

    let cost_usd = block.get("costUSD").and_then(Value::as_f64);
    if block.contains_key("costUSD") && cost_usd.is_none() {
        errors.push(format!("Block {index} costUSD must be numeric"));
    }

    match (id, is_active, total_tokens, cost_usd) {
        (Some(id), Some(is_active), Some(total_tokens), Some(cost_usd)) if errors.is_empty() => {
            Ok(BlockSnapshot {
                id: SessionId::new(id),
                is_active,
                total_tokens: total_tokens.max(0.0).round() as u64,
                cost_usd,
                start_time: optional_time(block, "startTime"),
                end_time: optional_time(block, "endTime"),
                is_gap: block.get("isGap").and_then(Value::as_bool).unwrap_or(false),
                token_counts: block
                    .get("tokenCounts")
                    .and_then(|v| serde_json::from_value(v.clone()).ok()),
                sent_messages_count: block
                    .get("sentMessagesCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            })
        }
        _ => Err(errors),
    }
}

fn optional_time(block: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    block
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
