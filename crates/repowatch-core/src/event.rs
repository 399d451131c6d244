use crate::hash::canonical_digest;
use crate::types::{commit_event_id, CommitRecord, LogEntry, EVENT_TYPE_COMMIT};

/// Compute the chain hash of an entry: canonical JSON of the hashed fields
/// (everything except `event_id` and `event_hash`), then SHA-256.
pub fn compute_entry_hash(
    watchlist_id: &str,
    event_type: &str,
    actor: &str,
    timestamp: &str,
    payload: &serde_json::Value,
    prev_event_hash: Option<&str>,
) -> anyhow::Result<String> {
    let hashed = serde_json::json!({
        "watchlist_id": watchlist_id,
        "event_type": event_type,
        "actor": actor,
        "timestamp": timestamp,
        "payload": payload,
        "prev_event_hash": prev_event_hash,
    });
    canonical_digest(&hashed)
}

/// Recompute the hash of a stored entry from its own fields.
pub fn recompute_hash(entry: &LogEntry) -> anyhow::Result<String> {
    compute_entry_hash(
        &entry.watchlist_id,
        &entry.event_type,
        &entry.actor,
        &entry.timestamp,
        &entry.payload,
        entry.prev_event_hash.as_deref(),
    )
}

/// Payload stored for a commit event.
pub fn commit_payload(commit: &CommitRecord) -> serde_json::Value {
    serde_json::json!({
        "sha": commit.sha,
        "author_name": commit.author_name,
        "author_email": commit.author_email,
        "date": commit.date,
        "message": commit.message,
        "files": commit.files,
        "files_changed": commit.files.len(),
        "lines_added": commit.lines_added,
        "lines_deleted": commit.lines_deleted,
    })
}

/// Build a `COMMIT` log entry chained onto `prev_event_hash`.
///
/// `timestamp` is passed separately so callers can substitute a value when the
/// commit's own date is unusable.
pub fn new_commit_entry(
    watchlist_id: &str,
    commit: &CommitRecord,
    timestamp: &str,
    prev_event_hash: Option<&str>,
) -> anyhow::Result<LogEntry> {
    let payload = commit_payload(commit);
    let event_hash = compute_entry_hash(
        watchlist_id,
        EVENT_TYPE_COMMIT,
        &commit.author_email,
        timestamp,
        &payload,
        prev_event_hash,
    )?;
    Ok(LogEntry {
        event_id: commit_event_id(&commit.sha),
        event_type: EVENT_TYPE_COMMIT.to_string(),
        actor: commit.author_email.clone(),
        timestamp: timestamp.to_string(),
        payload,
        event_hash,
        prev_event_hash: prev_event_hash.map(|s| s.to_string()),
        watchlist_id: watchlist_id.to_string(),
    })
}

/// Where and why a chain failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreak {
    /// The stored hash does not match the entry's content.
    HashMismatch { index: usize, event_id: String },
    /// The entry does not point at its predecessor's hash.
    LinkMismatch { index: usize, event_id: String },
}

impl std::fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainBreak::HashMismatch { index, event_id } => {
                write!(f, "entry #{index} ({event_id}): stored hash does not match content")
            }
            ChainBreak::LinkMismatch { index, event_id } => {
                write!(f, "entry #{index} ({event_id}): prev_event_hash does not match predecessor")
            }
        }
    }
}

/// Verify a chain given in insertion order. Returns the first break found.
pub fn verify_chain(entries: &[LogEntry]) -> anyhow::Result<Result<(), ChainBreak>> {
    let mut expected_prev: Option<&str> = None;
    for (index, entry) in entries.iter().enumerate() {
        if entry.prev_event_hash.as_deref() != expected_prev {
            return Ok(Err(ChainBreak::LinkMismatch {
                index,
                event_id: entry.event_id.clone(),
            }));
        }
        if recompute_hash(entry)? != entry.event_hash {
            return Ok(Err(ChainBreak::HashMismatch {
                index,
                event_id: entry.event_id.clone(),
            }));
        }
        expected_prev = Some(&entry.event_hash);
    }
    Ok(Ok(()))
}
