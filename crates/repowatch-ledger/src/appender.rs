//! Event Log Appender: turns extracted commits into hash-chained log entries.
//!
//! Chain hashes are computed in one sequential pass per batch; only the
//! resulting batch write touches the datastore.

use crate::store::Store;
use repowatch_core::clock::{format_rfc3339, now_rfc3339};
use repowatch_core::event::new_commit_entry;
use repowatch_core::types::{commit_event_id, CommitRecord, LogEntry};
use repowatch_core::{PipelineError, Result};
use std::collections::HashSet;
use time::UtcOffset;
use tracing::{debug, warn};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Outcome of one `append` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub appended: usize,
    pub skipped: usize,
    /// Commits whose date could not be parsed and was replaced by ingestion time.
    pub invalid_dates: usize,
    /// Hash of the chain tail after the call.
    pub tail_hash: Option<String>,
}

/// Sole writer of the per-watchlist hash chain.
pub struct LogAppender<'a> {
    store: &'a dyn Store,
    batch_size: usize,
}

impl<'a> LogAppender<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Append every commit not yet logged for `watchlist_id`, oldest first.
    ///
    /// Re-appending an already logged commit is a no-op.
    pub fn append(&self, watchlist_id: &str, commits: &[CommitRecord]) -> Result<AppendSummary> {
        let ordered = order_oldest_first(commits);
        let mut tail = self
            .store
            .find_last_log_entry(watchlist_id)
            .map_err(PipelineError::persistence)?
            .map(|e| e.event_hash);

        let mut summary = AppendSummary::default();
        for batch in ordered.chunks(self.batch_size) {
            let ids: Vec<String> = batch.iter().map(|c| commit_event_id(&c.sha)).collect();
            let existing = self
                .store
                .existing_event_ids(&ids, watchlist_id)
                .map_err(PipelineError::persistence)?;

            let (entries, invalid_dates) = chain_batch(watchlist_id, batch, &existing, &tail)?;
            summary.skipped += batch.len() - entries.len();
            summary.invalid_dates += invalid_dates;
            if entries.is_empty() {
                continue;
            }

            self.store
                .create_log_entries(&entries)
                .map_err(PipelineError::persistence)?;
            summary.appended += entries.len();
            tail = entries.last().map(|e| e.event_hash.clone());
            debug!(
                watchlist_id,
                appended = entries.len(),
                "log batch committed"
            );
        }
        summary.tail_hash = tail;
        Ok(summary)
    }
}

/// Hash a batch sequentially against the evolving chain tail, skipping
/// commits already present in the log.
fn chain_batch(
    watchlist_id: &str,
    batch: &[&CommitRecord],
    existing: &HashSet<String>,
    tail: &Option<String>,
) -> Result<(Vec<LogEntry>, usize)> {
    let mut prev = tail.clone();
    let mut entries = Vec::with_capacity(batch.len());
    let mut invalid_dates = 0;
    for commit in batch {
        if existing.contains(&commit_event_id(&commit.sha)) {
            continue;
        }
        let timestamp = match commit.parsed_date() {
            Some(ts) => format_rfc3339(ts.to_offset(UtcOffset::UTC)),
            None => {
                warn!(
                    watchlist_id,
                    sha = %commit.sha,
                    raw_date = %commit.date,
                    "unparseable commit date, substituting ingestion time"
                );
                invalid_dates += 1;
                now_rfc3339()
            }
        };
        let entry = new_commit_entry(watchlist_id, commit, &timestamp, prev.as_deref())
            .map_err(|e| PipelineError::Validation {
                field: format!("commit {}", commit.sha),
                reason: format!("{e:#}"),
            })?;
        prev = Some(entry.event_hash.clone());
        entries.push(entry);
    }
    Ok((entries, invalid_dates))
}

/// De-duplicate by sha and order oldest first.
///
/// Extraction yields newest first, so the input is reversed before a stable
/// sort by date; commits with equal (or unparseable) dates keep that reversed
/// order. Unparseable dates sort last.
fn order_oldest_first(commits: &[CommitRecord]) -> Vec<&CommitRecord> {
    let mut seen = HashSet::new();
    let mut ordered: Vec<&CommitRecord> = commits
        .iter()
        .rev()
        .filter(|c| seen.insert(c.sha.as_str()))
        .collect();
    ordered.sort_by_key(|c| match c.parsed_date() {
        Some(ts) => (0, ts.unix_timestamp_nanos()),
        None => (1, 0),
    });
    ordered
}
