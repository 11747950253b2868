//! Usage source abstraction
//!
//! The engine never parses raw log files. An external reader implements
//! [`UsageSource`] and yields already-parsed [`UsageEntry`] records.

use crate::error::Result;
use crate::types::UsageEntry;
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use tracing::{debug, trace};

/// Boxed stream of usage records
pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<UsageEntry>> + Send + 'a>>;

/// Producer of usage records
pub trait UsageSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Stream every currently available record
    fn load_entries(&self) -> EntryStream<'_>;
}

/// Drain a source into a timestamp-ordered, deduplicated vector.
///
/// Records sharing a message/request id pair keep only the first occurrence.
/// The first stream error aborts the load.
pub async fn load_sorted_entries<S: UsageSource + ?Sized>(source: &S) -> Result<Vec<UsageEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut duplicates = 0usize;

    let mut stream = source.load_entries();
    while let Some(result) = stream.next().await {
        let entry = result?;
        if let Some(key) = entry.dedup_key()
            && !seen.insert(key)
        {
            trace!("Skipping duplicate usage record");
            duplicates += 1;
            continue;
        }
        entries.push(entry);
    }

    entries.sort_by_key(|e| e.timestamp);
    debug!(
        "Loaded {} usage records from {} ({} duplicates skipped)",
        entries.len(),
        source.name(),
        duplicates
    );
    Ok(entries)
}

/// In-memory source, handy for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    entries: Vec<UsageEntry>,
}

impl VecSource {
    pub fn new(entries: Vec<UsageEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: UsageEntry) {
        self.entries.push(entry);
    }
}

impl UsageSource for VecSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_entries(&self) -> EntryStream<'_> {
        Box::pin(stream::iter(self.entries.iter().cloned().map(Ok)))
    }
}
