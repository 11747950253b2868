//! Shared fixtures for tokenburn integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::PathBuf;
use tempfile::TempDir;
use tokenburn_core::{ModelName, TokenCounts, UsageEntry};

/// Models used across fixtures
pub const TEST_MODELS: &[&str] = &[
    "claude-3-opus-20240229",
    "claude-3-5-sonnet-20241022",
    "claude-3-haiku-20240307",
];

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Entry `minutes` after [`base_time`], with cache traffic and unique ids
pub fn entry_at(minutes: i64, input: u64, output: u64) -> UsageEntry {
    let model = TEST_MODELS[(minutes.unsigned_abs() as usize) % TEST_MODELS.len()];
    UsageEntry::new(
        base_time() + Duration::minutes(minutes),
        ModelName::new(model),
        TokenCounts::new(input, output, input / 10, input / 5),
    )
    .with_ids(format!("msg_{minutes}"), format!("req_{minutes}"))
}

/// Write entries as JSONL into a fresh temp dir
pub fn write_fixture(entries: &[UsageEntry]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usage.jsonl");
    let lines: Vec<String> = entries
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();
    (dir, path)
}
