use repowatch_core::types::{
    ContributorStats, HealthAnalysisResult, LogEntry, RepoStats, WatchlistEntry, WatchlistFilter,
};
use std::collections::HashSet;

/// Datastore contract consumed by the pipeline.
///
/// Implementations must keep `log_entries` in insertion order and reject a
/// second entry with the same `(watchlist_id, event_id)`.
pub trait Store: Send + Sync {
    // ── Watchlist ───────────────────────────────────────────────────

    fn upsert_watchlist_entry(&self, entry: &WatchlistEntry) -> anyhow::Result<()>;

    fn find_watchlist_entries(&self, filter: &WatchlistFilter)
        -> anyhow::Result<Vec<WatchlistEntry>>;

    // ── Event log ───────────────────────────────────────────────────

    /// The most recently inserted entry for a watchlist, if any.
    fn find_last_log_entry(&self, watchlist_id: &str) -> anyhow::Result<Option<LogEntry>>;

    /// Which of `event_ids` are already logged for `watchlist_id`.
    fn existing_event_ids(
        &self,
        event_ids: &[String],
        watchlist_id: &str,
    ) -> anyhow::Result<HashSet<String>>;

    /// Insert entries atomically, in slice order.
    fn create_log_entries(&self, entries: &[LogEntry]) -> anyhow::Result<()>;

    fn create_log_entry(&self, entry: &LogEntry) -> anyhow::Result<()> {
        self.create_log_entries(std::slice::from_ref(entry))
    }

    /// All entries for a watchlist in insertion order, optionally by type.
    fn log_entries(
        &self,
        watchlist_id: &str,
        event_type: Option<&str>,
    ) -> anyhow::Result<Vec<LogEntry>>;

    // ── Derived statistics ──────────────────────────────────────────

    fn upsert_contributor_stats(&self, stats: &ContributorStats) -> anyhow::Result<()>;

    fn upsert_repo_stats(&self, stats: &RepoStats) -> anyhow::Result<()>;

    fn find_repo_stats(&self, watchlist_id: &str) -> anyhow::Result<Option<RepoStats>>;

    fn contributor_stats(&self, watchlist_id: &str) -> anyhow::Result<Vec<ContributorStats>>;

    // ── Health analyses ─────────────────────────────────────────────

    fn create_health_analysis(&self, result: &HealthAnalysisResult) -> anyhow::Result<()>;

    /// All results for a watchlist, oldest commit first.
    fn health_analyses(&self, watchlist_id: &str) -> anyhow::Result<Vec<HealthAnalysisResult>>;
}
