use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock::parse_rfc3339;

/// Event type recorded for every ingested commit.
pub const EVENT_TYPE_COMMIT: &str = "COMMIT";

/// Event ID format: `commit_<sha>`
pub fn commit_event_id(sha: &str) -> String {
    format!("commit_{sha}")
}

/// Readiness of a tracked repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    Ready,
    Pending,
    Disabled,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Ready => "ready",
            WatchStatus::Pending => "pending",
            WatchStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(WatchStatus::Ready),
            "pending" => Some(WatchStatus::Pending),
            "disabled" => Some(WatchStatus::Disabled),
            _ => None,
        }
    }
}

/// A tracked repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub status: WatchStatus,
}

impl WatchlistEntry {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Filter for watchlist queries. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct WatchlistFilter {
    pub status: Option<WatchStatus>,
    pub id: Option<String>,
}

impl WatchlistFilter {
    pub fn ready() -> Self {
        Self {
            status: Some(WatchStatus::Ready),
            id: None,
        }
    }

    pub fn by_id(id: &str) -> Self {
        Self {
            status: None,
            id: Some(id.to_string()),
        }
    }
}

/// One commit as extracted from a working copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitRecord {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    /// Author date exactly as git printed it (strict ISO 8601).
    pub date: String,
    pub message: String,
    pub files: Vec<String>,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

impl CommitRecord {
    pub fn parsed_date(&self) -> Option<OffsetDateTime> {
        parse_rfc3339(&self.date)
    }
}

/// A single hash-chained log entry, scoped to one watchlist entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub event_id: String,
    pub event_type: String,
    pub actor: String,
    pub timestamp: String,
    pub payload: serde_json::Value,
    pub event_hash: String,
    pub prev_event_hash: Option<String>,
    pub watchlist_id: String,
}

/// Mean and population standard deviation of one metric.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
}

/// Aggregates shared by contributor and repository statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommitAggregates {
    pub total_commits: u64,
    pub lines_added: Moments,
    pub lines_deleted: Moments,
    pub files_changed: Moments,
    /// Commit counts per UTC hour, index 0..24.
    pub commit_hours: Vec<u64>,
    /// Weekdays (e.g. "Monday") whose commit count reaches the activity threshold.
    pub typical_days_active: Vec<String>,
    pub last_commit_at: Option<String>,
}

/// Derived statistics for one author within one watchlist entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContributorStats {
    pub watchlist_id: String,
    pub author_email: String,
    pub author_name: String,
    pub aggregates: CommitAggregates,
    pub computed_at: String,
}

/// Derived statistics for one watchlist entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoStats {
    pub watchlist_id: String,
    pub total_contributors: u64,
    pub aggregates: CommitAggregates,
    pub computed_at: String,
}

/// A commit chosen to represent a point in a repository's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingPoint {
    pub sha: String,
    pub date: OffsetDateTime,
}

/// Where a persisted health score came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// The scoring tool produced a usable report.
    Tool,
    /// The tool failed and the configured fallback was substituted.
    Fallback,
    /// A prior result close enough in time was reused.
    Reused,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Tool => "tool",
            ScoreSource::Fallback => "fallback",
            ScoreSource::Reused => "reused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(ScoreSource::Tool),
            "fallback" => Some(ScoreSource::Fallback),
            "reused" => Some(ScoreSource::Reused),
            _ => None,
        }
    }
}

/// One persisted health score for one (watchlist entry, commit).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthAnalysisResult {
    pub watchlist_id: String,
    pub commit_sha: String,
    pub commit_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<serde_json::Value>,
    pub health_score: u8,
    pub analyzed_at: String,
    pub source: ScoreSource,
}

impl HealthAnalysisResult {
    pub fn parsed_commit_date(&self) -> Option<OffsetDateTime> {
        parse_rfc3339(&self.commit_date)
    }
}
