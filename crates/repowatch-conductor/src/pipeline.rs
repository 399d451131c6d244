//! Per-repository pipeline: one watchlist entry from remote to persisted
//! statistics and health scores.

use async_trait::async_trait;
use repowatch_aggregate::Aggregator;
use repowatch_core::types::{CommitRecord, WatchlistEntry, EVENT_TYPE_COMMIT};
use repowatch_core::{Config, PipelineError, Result};
use repowatch_git::WorkingCopyManager;
use repowatch_health::{HealthAnalyzer, HealthRun};
use repowatch_ledger::{AppendSummary, LogAppender, Store};
use std::sync::Arc;
use tracing::{info, warn};

/// What one pipeline run did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub extracted: usize,
    pub append: AppendSummary,
    pub contributors: usize,
    pub health: HealthRun,
}

impl RunReport {
    pub fn current_score(&self) -> Option<u8> {
        self.health.current.as_ref().map(|r| r.health_score)
    }
}

/// Processes one watchlist entry end to end.
#[async_trait]
pub trait RepoRunner: Send + Sync {
    async fn run(&self, entry: &WatchlistEntry) -> Result<RunReport>;
}

pub struct RepoPipeline {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    copies: WorkingCopyManager,
    analyzer: HealthAnalyzer,
}

impl RepoPipeline {
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>, analyzer: HealthAnalyzer) -> Self {
        let copies = WorkingCopyManager::from_config(&config);
        Self {
            config,
            store,
            copies,
            analyzer,
        }
    }

    pub fn working_copies(&self) -> &WorkingCopyManager {
        &self.copies
    }

    /// Clone or refresh, deepen, extract and log new commits, then recompute
    /// statistics. Returns the extracted commits, newest first.
    pub async fn ingest(&self, entry: &WatchlistEntry) -> Result<(Vec<CommitRecord>, AppendSummary)> {
        let clone = &self.config.clone;
        self.copies
            .ensure(&entry.owner, &entry.name, &entry.branch)
            .await?;
        let available = self
            .copies
            .deepen(&entry.owner, &entry.name, &entry.branch, clone.deepen_target)
            .await?;
        info!(repo = %entry.full_name(), available, "history ready");

        let commits = self
            .copies
            .extract_commits(&entry.owner, &entry.name, clone.extract_limit)
            .await?;
        let append = LogAppender::new(self.store.as_ref())
            .with_batch_size(self.config.ledger.batch_size)
            .append(&entry.id, &commits)?;
        info!(
            repo = %entry.full_name(),
            appended = append.appended,
            skipped = append.skipped,
            "log updated"
        );
        Ok((commits, append))
    }

    /// What the scoring tool is pointed at for this entry.
    pub fn source_location(&self, entry: &WatchlistEntry) -> String {
        if self.config.scorer.score_local_clone {
            self.copies
                .path_for(&entry.owner, &entry.name)
                .to_string_lossy()
                .into_owned()
        } else {
            self.config.remote.repo_reference(&entry.owner, &entry.name)
        }
    }

    async fn run_locked(&self, entry: &WatchlistEntry) -> Result<RunReport> {
        let (commits, append) = self.ingest(entry).await?;
        let recompute = Aggregator::new(self.store.as_ref()).recompute(&entry.id)?;
        let timeline = oldest_first(commits.clone());
        let health = self
            .analyzer
            .analyze(entry, &timeline, &self.source_location(entry))
            .await?;
        Ok(RunReport {
            extracted: commits.len(),
            append,
            contributors: recompute.contributors,
            health,
        })
    }
}

#[async_trait]
impl RepoRunner for RepoPipeline {
    async fn run(&self, entry: &WatchlistEntry) -> Result<RunReport> {
        let _lock = self.copies.lock(&entry.owner, &entry.name)?;
        let result = self.run_locked(entry).await;
        if self.config.clone.cleanup_after_run {
            self.copies.cleanup(&entry.owner, &entry.name).await;
        }
        result
    }
}

/// Order extracted (newest first) commits oldest first by author date.
/// Commits without a usable date keep their relative position at the end.
pub fn oldest_first(mut commits: Vec<CommitRecord>) -> Vec<CommitRecord> {
    commits.reverse();
    commits.sort_by_key(date_key);
    commits
}

fn date_key(c: &CommitRecord) -> (u8, i128) {
    match c.parsed_date() {
        Some(ts) => (0, ts.unix_timestamp_nanos()),
        None => (1, 0),
    }
}

/// Rebuild the logged commits of a watchlist entry, oldest first by date.
///
/// Log order is insertion order, which is not chronological once a deeper
/// ingest has appended older history; ties keep their log order.
pub fn commits_from_log(store: &dyn Store, watchlist_id: &str) -> Result<Vec<CommitRecord>> {
    let entries = store
        .log_entries(watchlist_id, Some(EVENT_TYPE_COMMIT))
        .map_err(PipelineError::persistence)?;
    let mut commits = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<CommitRecord>(entry.payload) {
            Ok(commit) => commits.push(commit),
            Err(e) => warn!(watchlist_id, event_id = %entry.event_id, error = %e, "unreadable commit payload"),
        }
    }
    commits.sort_by_key(date_key);
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repowatch_core::config::RemoteConfig;
    use repowatch_core::types::WatchStatus;
    use repowatch_health::{MockScorer, SamplingPolicy};
    use repowatch_ledger::SqliteStore;
    use std::path::Path;
    use std::process::Command;
    use time::OffsetDateTime;

    fn git(dir: &Path, args: &[&str], date: Option<i64>) {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir)
            .args(["-c", "user.name=Test Dev", "-c", "user.email=dev@example.com"])
            .args(args);
        if let Some(ts) = date {
            cmd.env("GIT_AUTHOR_DATE", format!("@{ts} +0000"))
                .env("GIT_COMMITTER_DATE", format!("@{ts} +0000"));
        }
        assert!(cmd.output().unwrap().status.success(), "git {args:?}");
    }

    fn make_origin(tmp: &Path, n: usize) -> RemoteConfig {
        let src = tmp.join("src");
        std::fs::create_dir_all(&src).unwrap();
        git(&src, &["init", "-q", "-b", "main"], None);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        for i in 0..n {
            std::fs::write(src.join("notes.md"), "x\n".repeat(i + 1)).unwrap();
            git(&src, &["add", "."], None);
            git(
                &src,
                &["commit", "-q", "-m", &format!("change {i}")],
                Some(now - ((n - i) as i64) * 7200),
            );
        }
        let bare = tmp.join("remotes").join("acme").join("widgets.git");
        std::fs::create_dir_all(bare.parent().unwrap()).unwrap();
        git(
            tmp,
            &["clone", "-q", "--bare", src.to_str().unwrap(), bare.to_str().unwrap()],
            None,
        );
        RemoteConfig {
            git_base: format!("file://{}", tmp.join("remotes").display()),
            ..RemoteConfig::default()
        }
    }

    fn entry() -> WatchlistEntry {
        WatchlistEntry {
            id: "w1".into(),
            owner: "acme".into(),
            name: "widgets".into(),
            branch: "main".into(),
            status: WatchStatus::Ready,
        }
    }

    fn pipeline(tmp: &Path, cleanup: bool) -> (RepoPipeline, Arc<SqliteStore>, Arc<MockScorer>) {
        let mut config = Config::default().with_workdir(tmp.join("work"));
        config.remote = make_origin(tmp, 6);
        config.clone.cleanup_after_run = cleanup;
        let config = Arc::new(config);
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scorer = Arc::new(MockScorer::new());
        let analyzer = HealthAnalyzer::new(
            store.clone(),
            scorer.clone(),
            SamplingPolicy::from_config(&config.sampling),
            config.scorer.clone(),
        );
        (
            RepoPipeline::new(config, store.clone(), analyzer),
            store,
            scorer,
        )
    }

    #[tokio::test]
    async fn full_run_logs_aggregates_and_scores() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, store, scorer) = pipeline(tmp.path(), false);

        let report = pipeline.run(&entry()).await.unwrap();
        assert_eq!(report.extracted, 6);
        assert_eq!(report.append.appended, 6);
        assert_eq!(report.contributors, 1);
        assert_eq!(report.health.samples.len(), 3);
        assert_eq!(report.current_score(), Some(75));
        assert_eq!(scorer.calls(), 3);

        let log = store.log_entries("w1", None).unwrap();
        assert_eq!(log.len(), 6);
        assert_eq!(log[0].payload["message"], "change 0");
        let repo = store.find_repo_stats("w1").unwrap().unwrap();
        assert_eq!(repo.aggregates.total_commits, 6);

        // Second run appends nothing new.
        let again = pipeline.run(&entry()).await.unwrap();
        assert_eq!(again.append.appended, 0);
        assert_eq!(again.append.skipped, 6);
        assert!(pipeline
            .working_copies()
            .path_for("acme", "widgets")
            .exists());
    }

    #[tokio::test]
    async fn cleanup_after_run_removes_working_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, _store, _scorer) = pipeline(tmp.path(), true);
        pipeline.run(&entry()).await.unwrap();
        assert!(!pipeline
            .working_copies()
            .path_for("acme", "widgets")
            .exists());
    }

    #[tokio::test]
    async fn missing_repository_is_a_clone_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, store, _scorer) = pipeline(tmp.path(), false);
        let missing = WatchlistEntry {
            name: "nope".into(),
            ..entry()
        };
        let err = pipeline.run(&missing).await.unwrap_err();
        assert!(matches!(err, PipelineError::Clone { .. }));
        assert!(store.log_entries("w1", None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn commits_round_trip_through_the_log() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, store, _scorer) = pipeline(tmp.path(), false);
        let (extracted, _) = pipeline.ingest(&entry()).await.unwrap();
        let logged = commits_from_log(store.as_ref(), "w1").unwrap();
        assert_eq!(logged, oldest_first(extracted));
    }

    #[test]
    fn logged_commits_come_back_in_date_order_after_a_deeper_ingest() {
        let store = SqliteStore::open_in_memory().unwrap();
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        // Newest first, as extraction returns them.
        let history: Vec<CommitRecord> = (0..8)
            .rev()
            .map(|i| CommitRecord {
                sha: format!("c{i}"),
                author_name: "Dev".into(),
                author_email: "dev@example.com".into(),
                date: repowatch_core::clock::format_rfc3339(start + time::Duration::hours(i)),
                message: String::new(),
                files: Vec::new(),
                lines_added: 1,
                lines_deleted: 0,
            })
            .collect();
        let appender = LogAppender::new(&store);
        appender.append("w1", &history[..5]).unwrap();
        appender.append("w1", &history).unwrap();

        let logged: Vec<String> = store
            .log_entries("w1", None)
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(logged.first().map(String::as_str), Some("commit_c3"));

        let shas: Vec<String> = commits_from_log(&store, "w1")
            .unwrap()
            .into_iter()
            .map(|c| c.sha)
            .collect();
        assert_eq!(shas, (0..8).map(|i| format!("c{i}")).collect::<Vec<_>>());
    }

    #[test]
    fn source_location_defaults_to_remote_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let (pipeline, _store, _scorer) = pipeline(tmp.path(), false);
        assert!(pipeline.source_location(&entry()).ends_with("/acme/widgets"));
    }
}
