//! Statistics Aggregator: derives per-contributor and per-repository
//! statistics from the COMMIT entries of the event log.
//!
//! Statistics are always recomputed from scratch and upserted; they are never
//! patched incrementally.

use repowatch_core::clock::{format_rfc3339, now_rfc3339, parse_rfc3339};
use repowatch_core::types::{
    CommitAggregates, ContributorStats, LogEntry, Moments, RepoStats, EVENT_TYPE_COMMIT,
};
use repowatch_core::{PipelineError, Result};
use repowatch_ledger::Store;
use std::collections::BTreeMap;
use time::{OffsetDateTime, UtcOffset, Weekday};
use tracing::{debug, info, warn};

/// A weekday counts as typically active when its commit count reaches this
/// fraction of the busiest weekday.
pub const ACTIVE_DAY_THRESHOLD: f64 = 0.35;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
    Weekday::Saturday,
    Weekday::Sunday,
];

/// The per-commit facts statistics are computed from.
#[derive(Debug, Clone)]
pub struct CommitFacts {
    pub author_email: String,
    pub author_name: String,
    pub at: OffsetDateTime,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_changed: u64,
}

impl CommitFacts {
    /// Read facts back out of a COMMIT log entry. Returns `None` for entries
    /// whose timestamp is unusable.
    pub fn from_entry(entry: &LogEntry) -> Option<Self> {
        let at = parse_rfc3339(&entry.timestamp)?.to_offset(UtcOffset::UTC);
        let p = &entry.payload;
        let text = |key: &str| p.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let number = |key: &str| p.get(key).and_then(|v| v.as_u64());
        let files_changed = number("files_changed")
            .or_else(|| p.get("files").and_then(|v| v.as_array()).map(|a| a.len() as u64))
            .unwrap_or(0);
        Some(Self {
            author_email: text("author_email").unwrap_or_else(|| entry.actor.clone()),
            author_name: text("author_name").unwrap_or_default(),
            at,
            lines_added: number("lines_added").unwrap_or(0),
            lines_deleted: number("lines_deleted").unwrap_or(0),
            files_changed,
        })
    }
}

/// Mean and population standard deviation (divides by N).
pub fn moments(values: &[f64]) -> Moments {
    if values.is_empty() {
        return Moments::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Moments {
        mean,
        std_dev: variance.sqrt(),
    }
}

/// Weekdays whose commit count is at least [`ACTIVE_DAY_THRESHOLD`] of the
/// busiest weekday, Monday first.
pub fn typical_days_active(times: &[OffsetDateTime]) -> Vec<String> {
    let mut counts = [0u64; 7];
    for t in times {
        counts[t.weekday().number_days_from_monday() as usize] += 1;
    }
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    let threshold = ACTIVE_DAY_THRESHOLD * max as f64;
    WEEKDAYS
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0 && *count as f64 >= threshold)
        .map(|(day, _)| day.to_string())
        .collect()
}

/// Compute the shared aggregates over a set of commits.
pub fn aggregate(commits: &[&CommitFacts]) -> CommitAggregates {
    let added: Vec<f64> = commits.iter().map(|c| c.lines_added as f64).collect();
    let deleted: Vec<f64> = commits.iter().map(|c| c.lines_deleted as f64).collect();
    let files: Vec<f64> = commits.iter().map(|c| c.files_changed as f64).collect();
    let times: Vec<OffsetDateTime> = commits.iter().map(|c| c.at).collect();

    let mut commit_hours = vec![0u64; 24];
    for t in &times {
        commit_hours[t.hour() as usize] += 1;
    }

    CommitAggregates {
        total_commits: commits.len() as u64,
        lines_added: moments(&added),
        lines_deleted: moments(&deleted),
        files_changed: moments(&files),
        commit_hours,
        typical_days_active: typical_days_active(&times),
        last_commit_at: times.iter().max().map(|t| format_rfc3339(*t)),
    }
}

/// Result of a recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub commits: usize,
    pub contributors: usize,
    /// COMMIT entries skipped because their timestamp could not be parsed.
    pub skipped: usize,
}

/// Owner of the derived statistics for every watchlist entry.
pub struct Aggregator<'a> {
    store: &'a dyn Store,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Recompute and upsert all statistics for `watchlist_id`.
    pub fn recompute(&self, watchlist_id: &str) -> Result<RecomputeSummary> {
        let entries = self
            .store
            .log_entries(watchlist_id, Some(EVENT_TYPE_COMMIT))
            .map_err(PipelineError::persistence)?;

        let mut facts = Vec::with_capacity(entries.len());
        let mut skipped = 0;
        for entry in &entries {
            match CommitFacts::from_entry(entry) {
                Some(f) => facts.push(f),
                None => {
                    warn!(watchlist_id, event_id = %entry.event_id, "skipping entry with bad timestamp");
                    skipped += 1;
                }
            }
        }

        let mut by_author: BTreeMap<&str, Vec<&CommitFacts>> = BTreeMap::new();
        for f in &facts {
            by_author.entry(f.author_email.as_str()).or_default().push(f);
        }

        let computed_at = now_rfc3339();
        for (email, commits) in &by_author {
            // Latest non-empty name wins; authors rename themselves over time.
            let author_name = commits
                .iter()
                .filter(|c| !c.author_name.is_empty())
                .max_by_key(|c| c.at)
                .map(|c| c.author_name.clone())
                .unwrap_or_default();
            let stats = ContributorStats {
                watchlist_id: watchlist_id.to_string(),
                author_email: email.to_string(),
                author_name,
                aggregates: aggregate(commits),
                computed_at: computed_at.clone(),
            };
            self.store
                .upsert_contributor_stats(&stats)
                .map_err(PipelineError::persistence)?;
        }

        let all: Vec<&CommitFacts> = facts.iter().collect();
        let repo = RepoStats {
            watchlist_id: watchlist_id.to_string(),
            total_contributors: by_author.len() as u64,
            aggregates: aggregate(&all),
            computed_at,
        };
        self.store
            .upsert_repo_stats(&repo)
            .map_err(PipelineError::persistence)?;

        let summary = RecomputeSummary {
            commits: facts.len(),
            contributors: by_author.len(),
            skipped,
        };
        info!(
            watchlist_id,
            commits = summary.commits,
            contributors = summary.contributors,
            "statistics recomputed"
        );
        Ok(summary)
    }

    /// Recompute only when no repository statistics exist yet.
    /// Returns whether a recomputation ran.
    pub fn ensure_exists(&self, watchlist_id: &str) -> Result<bool> {
        let existing = self
            .store
            .find_repo_stats(watchlist_id)
            .map_err(PipelineError::persistence)?;
        if existing.is_some() {
            debug!(watchlist_id, "statistics already present");
            return Ok(false);
        }
        self.recompute(watchlist_id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repowatch_core::types::CommitRecord;
    use repowatch_ledger::{LogAppender, SqliteStore};

    fn commit(sha: &str, email: &str, date: &str, added: u64, deleted: u64, files: usize) -> CommitRecord {
        CommitRecord {
            sha: sha.into(),
            author_name: email.split('@').next().unwrap_or_default().into(),
            author_email: email.into(),
            date: date.into(),
            message: String::new(),
            files: (0..files).map(|i| format!("f{i}.rs")).collect(),
            lines_added: added,
            lines_deleted: deleted,
        }
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        // 2025-01-06 is a Monday.
        let commits = vec![
            commit("a1", "ann@x.io", "2025-01-06T09:00:00Z", 10, 0, 1),
            commit("a2", "ann@x.io", "2025-01-06T10:00:00Z", 20, 4, 2),
            commit("a3", "ann@x.io", "2025-01-07T09:30:00Z", 30, 8, 3),
            commit("b1", "bob@x.io", "2025-01-10T22:00:00Z", 5, 5, 1),
        ];
        LogAppender::new(&store).append("w1", &commits).unwrap();
        store
    }

    #[test]
    fn population_std_dev() {
        let m = moments(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((m.mean - 5.0).abs() < 1e-9);
        assert!((m.std_dev - 2.0).abs() < 1e-9);
        assert_eq!(moments(&[]), Moments::default());
        assert_eq!(moments(&[3.0]).std_dev, 0.0);
    }

    #[test]
    fn active_days_threshold_is_35_percent_of_busiest() {
        let monday = parse_rfc3339("2025-01-06T12:00:00Z").unwrap();
        let mut times = vec![monday; 20];
        // Tuesday: 8/20 = 40% -> active. Wednesday: 6/20 = 30% -> not.
        times.extend(vec![monday + time::Duration::days(1); 8]);
        times.extend(vec![monday + time::Duration::days(2); 6]);
        assert_eq!(typical_days_active(&times), vec!["Monday", "Tuesday"]);
        assert!(typical_days_active(&[]).is_empty());
    }

    #[test]
    fn recompute_builds_contributor_and_repo_stats() {
        let store = seeded_store();
        let summary = Aggregator::new(&store).recompute("w1").unwrap();
        assert_eq!(
            summary,
            RecomputeSummary {
                commits: 4,
                contributors: 2,
                skipped: 0
            }
        );

        let contributors = store.contributor_stats("w1").unwrap();
        assert_eq!(contributors.len(), 2);
        let ann = &contributors[0];
        assert_eq!(ann.author_email, "ann@x.io");
        assert_eq!(ann.author_name, "ann");
        assert_eq!(ann.aggregates.total_commits, 3);
        assert!((ann.aggregates.lines_added.mean - 20.0).abs() < 1e-9);
        let expected_sd = (200.0f64 / 3.0).sqrt();
        assert!((ann.aggregates.lines_added.std_dev - expected_sd).abs() < 1e-9);
        assert!((ann.aggregates.files_changed.mean - 2.0).abs() < 1e-9);
        assert_eq!(ann.aggregates.commit_hours[9], 2);
        assert_eq!(ann.aggregates.commit_hours[10], 1);
        // Monday 2, Tuesday 1 -> 1 >= 0.7.
        assert_eq!(ann.aggregates.typical_days_active, vec!["Monday", "Tuesday"]);
        assert_eq!(
            ann.aggregates.last_commit_at.as_deref(),
            Some("2025-01-07T09:30:00Z")
        );

        let repo = store.find_repo_stats("w1").unwrap().unwrap();
        assert_eq!(repo.total_contributors, 2);
        assert_eq!(repo.aggregates.total_commits, 4);
        assert_eq!(repo.aggregates.commit_hours.iter().sum::<u64>(), 4);
        assert_eq!(
            repo.aggregates.last_commit_at.as_deref(),
            Some("2025-01-10T22:00:00Z")
        );
    }

    #[test]
    fn recompute_is_idempotent_and_reflects_new_commits() {
        let store = seeded_store();
        let agg = Aggregator::new(&store);
        agg.recompute("w1").unwrap();
        let first = store.find_repo_stats("w1").unwrap().unwrap();
        agg.recompute("w1").unwrap();
        let second = store.find_repo_stats("w1").unwrap().unwrap();
        assert_eq!(first.aggregates, second.aggregates);

        LogAppender::new(&store)
            .append(
                "w1",
                &[commit("b2", "bob@x.io", "2025-01-11T08:00:00Z", 1, 1, 1)],
            )
            .unwrap();
        agg.recompute("w1").unwrap();
        let third = store.find_repo_stats("w1").unwrap().unwrap();
        assert_eq!(third.aggregates.total_commits, 5);
    }

    #[test]
    fn ensure_exists_only_recomputes_when_missing() {
        let store = seeded_store();
        let agg = Aggregator::new(&store);
        assert!(agg.ensure_exists("w1").unwrap());
        assert!(!agg.ensure_exists("w1").unwrap());
    }

    #[test]
    fn empty_log_yields_empty_repo_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        let summary = Aggregator::new(&store).recompute("nothing").unwrap();
        assert_eq!(summary.commits, 0);
        let repo = store.find_repo_stats("nothing").unwrap().unwrap();
        assert_eq!(repo.aggregates.total_commits, 0);
        assert_eq!(repo.aggregates.commit_hours, vec![0; 24]);
        assert!(repo.aggregates.last_commit_at.is_none());
    }
}
