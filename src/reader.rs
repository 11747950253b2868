//! JSONL usage reader
//!
//! Each non-empty line of the data file is one already-normalized usage
//! record:
//!
//! ```text
//! {"timestamp":"2024-01-01T10:00:00Z","model":"claude-3-5-sonnet-20241022",
//!  "input_tokens":1200,"output_tokens":300,"cache_read_tokens":5000,
//!  "cost_usd":0.012,"message_id":"msg_1","request_id":"req_1"}
//! ```
//!
//! Malformed lines are skipped with a warning so one bad write does not hide
//! the rest of the file.

use std::path::{Path, PathBuf};
use tokenburn_core::source::{EntryStream, UsageSource};
use tokenburn_core::{TokenburnError, UsageEntry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Usage source backed by a JSONL file
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
    name: String,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageSource for JsonlSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_entries(&self) -> EntryStream<'_> {
        Box::pin(async_stream::stream! {
            let file = match tokio::fs::File::open(&self.path).await {
                Ok(f) => f,
                Err(e) => {
                    yield Err(TokenburnError::from(e));
                    return;
                }
            };

            let mut lines = BufReader::new(file).lines();
            let mut line_number = 0usize;
            let mut skipped = 0usize;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(TokenburnError::Parse {
                            file: self.path.clone(),
                            line: line_number + 1,
                            message: e.to_string(),
                        });
                        return;
                    }
                };
                line_number += 1;

                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<UsageEntry>(&line) {
                    Ok(entry) => yield Ok(entry),
                    Err(e) => {
                        skipped += 1;
                        warn!(
                            "Skipping malformed record at line {} in {}: {}",
                            line_number,
                            self.path.display(),
                            e
                        );
                    }
                }
            }

            debug!(
                "Read {} lines from {} ({} skipped)",
                line_number,
                self.path.display(),
                skipped
            );
        })
    }
}
