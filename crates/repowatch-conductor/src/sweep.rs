//! Schedule Coordinator: fleet-wide sweeps and single-repository checks.
//!
//! At most one sweep runs per coordinator; a second request while one is in
//! flight is dropped, not queued. Repositories are processed one at a time
//! with a fixed pause between them.

use crate::jobs::{EnqueueOptions, Job, JobQueue};
use crate::pipeline::{RepoRunner, RunReport};
use crate::sweep_log::{SweepEvent, SweepLog};
use repowatch_core::config::SweepConfig;
use repowatch_core::types::{WatchlistEntry, WatchlistFilter};
use repowatch_core::{PipelineError, Result};
use repowatch_ledger::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFailure {
    pub watchlist_id: String,
    pub repo: String,
    pub error: String,
    /// Whether the failure is worth retrying (clone, git or lock trouble).
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub sweep_id: String,
    pub passed: Vec<String>,
    pub failed: Vec<RepoFailure>,
    pub next_enqueued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepSummary),
    /// Another sweep held the token; this request was dropped.
    AlreadyRunning,
}

#[derive(Debug)]
pub enum JobOutcome {
    Sweep(SweepOutcome),
    Checked(RunReport),
}

pub struct SweepCoordinator {
    store: Arc<dyn Store>,
    runner: Arc<dyn RepoRunner>,
    queue: Arc<dyn JobQueue>,
    config: SweepConfig,
    sweeps_dir: Option<PathBuf>,
    token: Arc<Mutex<()>>,
}

impl SweepCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<dyn RepoRunner>,
        queue: Arc<dyn JobQueue>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            runner,
            queue,
            config,
            sweeps_dir: None,
            token: Arc::new(Mutex::new(())),
        }
    }

    /// Write a JSONL record of each sweep under `dir`.
    pub fn with_sweep_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sweeps_dir = Some(dir.into());
        self
    }

    /// Run a sweep over every Ready entry unless one is already running.
    ///
    /// Per-repository failures are collected, never fatal. The next sweep is
    /// enqueued whatever happened.
    pub async fn try_sweep(&self) -> Result<SweepOutcome> {
        let Ok(_token) = Arc::clone(&self.token).try_lock_owned() else {
            info!("sweep already in progress, request dropped");
            return Ok(SweepOutcome::AlreadyRunning);
        };

        let sweep_id = ulid::Ulid::new().to_string();
        let mut log = match &self.sweeps_dir {
            Some(dir) => SweepLog::new(dir, &sweep_id),
            None => SweepLog::disabled(),
        };

        let entries = self
            .store
            .find_watchlist_entries(&WatchlistFilter::ready())
            .map_err(PipelineError::persistence);
        let mut summary = SweepSummary {
            sweep_id: sweep_id.clone(),
            ..SweepSummary::default()
        };
        let listed = match entries {
            Ok(entries) => {
                self.process(&entries, &mut summary, &mut log).await;
                Ok(())
            }
            Err(e) => Err(e),
        };

        summary.next_enqueued = self.enqueue_next_sweep().await;
        log.record(SweepEvent::SweepCompleted {
            passed: summary.passed.len(),
            failed: summary.failed.len(),
            next_enqueued: summary.next_enqueued,
        });
        listed?;

        info!(
            sweep_id = %summary.sweep_id,
            passed = summary.passed.len(),
            failed = summary.failed.len(),
            "sweep complete"
        );
        Ok(SweepOutcome::Completed(summary))
    }

    async fn process(
        &self,
        entries: &[WatchlistEntry],
        summary: &mut SweepSummary,
        log: &mut SweepLog,
    ) {
        info!(sweep_id = %summary.sweep_id, repos = entries.len(), "sweep started");
        log.record(SweepEvent::SweepStart {
            sweep_id: summary.sweep_id.clone(),
            repo_count: entries.len(),
        });
        let delay = Duration::from_secs(self.config.inter_repo_delay_secs);

        for (i, entry) in entries.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let repo = entry.full_name();
            let started = Instant::now();
            match self.runner.run(entry).await {
                Ok(report) => {
                    log.record(SweepEvent::RepoPassed {
                        repo: repo.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        appended: report.append.appended,
                        current_score: report.current_score(),
                    });
                    summary.passed.push(entry.id.clone());
                }
                Err(e) => {
                    warn!(repo = %repo, error = %e, "repository failed during sweep");
                    log.record(SweepEvent::RepoFailed {
                        repo: repo.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: e.to_string(),
                    });
                    summary.failed.push(RepoFailure {
                        watchlist_id: entry.id.clone(),
                        repo,
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }
    }

    async fn enqueue_next_sweep(&self) -> bool {
        let delay = Duration::from_secs(self.config.interval_days.saturating_mul(SECS_PER_DAY));
        let options = EnqueueOptions::sweep(delay, self.config.retries);
        match self.queue.enqueue(Job::MonthlySweep, options).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not enqueue next sweep");
                false
            }
        }
    }

    /// Ask for a one-off check of a single entry.
    pub async fn request_single_check(&self, watchlist_id: &str) -> anyhow::Result<()> {
        self.queue
            .enqueue(
                Job::SingleCheck {
                    watchlist_id: watchlist_id.to_string(),
                },
                EnqueueOptions::single_check(),
            )
            .await
    }

    /// Run one single-repository check now.
    pub async fn check(&self, watchlist_id: &str) -> Result<RunReport> {
        let entry = self
            .store
            .find_watchlist_entries(&WatchlistFilter::by_id(watchlist_id))
            .map_err(PipelineError::persistence)?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Validation {
                field: "watchlist_id".into(),
                reason: format!("no watchlist entry {watchlist_id}"),
            })?;
        self.runner.run(&entry).await
    }

    pub async fn handle(&self, job: Job) -> Result<JobOutcome> {
        match job {
            Job::MonthlySweep => self.try_sweep().await.map(JobOutcome::Sweep),
            Job::SingleCheck { watchlist_id } => self.check(&watchlist_id).await.map(JobOutcome::Checked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::RecordingJobQueue;
    use async_trait::async_trait;
    use repowatch_core::types::WatchStatus;
    use repowatch_ledger::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails for the configured entry ids, succeeds otherwise.
    struct ScriptedRunner {
        fail: Vec<String>,
        delay: Duration,
        runs: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                delay: Duration::ZERO,
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RepoRunner for ScriptedRunner {
        async fn run(&self, entry: &WatchlistEntry) -> Result<RunReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.contains(&entry.id) {
                return Err(PipelineError::Clone {
                    repo: entry.full_name(),
                    reason: "exit 128: repository not found".into(),
                });
            }
            Ok(RunReport::default())
        }
    }

    fn store_with(n: usize) -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 1..=n {
            store
                .upsert_watchlist_entry(&WatchlistEntry {
                    id: format!("w{i}"),
                    owner: "acme".into(),
                    name: format!("repo{i}"),
                    branch: "main".into(),
                    status: WatchStatus::Ready,
                })
                .unwrap();
        }
        Arc::new(store)
    }

    fn fast_config() -> SweepConfig {
        SweepConfig {
            inter_repo_delay_secs: 0,
            ..SweepConfig::default()
        }
    }

    #[tokio::test]
    async fn sweep_collects_failures_and_enqueues_next() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with(5);
        let runner = Arc::new(ScriptedRunner::new(&["w3"]));
        let queue = Arc::new(RecordingJobQueue::new());
        let coordinator = SweepCoordinator::new(store, runner.clone(), queue.clone(), fast_config())
            .with_sweep_log(tmp.path().join("sweeps"));

        let SweepOutcome::Completed(summary) = coordinator.try_sweep().await.unwrap() else {
            panic!("sweep did not run");
        };
        assert_eq!(summary.passed.len(), 4);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].watchlist_id, "w3");
        assert!(summary.failed[0].error.contains("clone failed"));
        assert!(summary.failed[0].retryable);
        assert!(summary.next_enqueued);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 5);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, Job::MonthlySweep);
        assert_eq!(jobs[0].1.delay, Duration::from_secs(30 * 86_400));
        assert_eq!(jobs[0].1.retries, 1);

        let log = std::fs::read_to_string(
            tmp.path()
                .join("sweeps")
                .join(format!("{}.jsonl", summary.sweep_id)),
        )
        .unwrap();
        assert_eq!(log.lines().count(), 7);
        assert!(log.contains("\"repo_failed\""));
    }

    #[tokio::test]
    async fn only_ready_entries_are_swept() {
        let store = store_with(2);
        store
            .upsert_watchlist_entry(&WatchlistEntry {
                id: "off".into(),
                owner: "acme".into(),
                name: "archived".into(),
                branch: "main".into(),
                status: WatchStatus::Disabled,
            })
            .unwrap();
        let runner = Arc::new(ScriptedRunner::new(&[]));
        let coordinator = SweepCoordinator::new(
            store,
            runner.clone(),
            Arc::new(RecordingJobQueue::new()),
            fast_config(),
        );
        coordinator.try_sweep().await.unwrap();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_sweep_is_dropped() {
        let store = store_with(2);
        let mut runner = ScriptedRunner::new(&[]);
        runner.delay = Duration::from_millis(200);
        let queue = Arc::new(RecordingJobQueue::new());
        let coordinator = Arc::new(SweepCoordinator::new(
            store,
            Arc::new(runner),
            queue.clone(),
            fast_config(),
        ));

        let first = tokio::spawn({
            let c = Arc::clone(&coordinator);
            async move { c.try_sweep().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = coordinator.try_sweep().await.unwrap();
        assert_eq!(second, SweepOutcome::AlreadyRunning);

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SweepOutcome::Completed(_)));
        // Only the sweep that ran schedules a successor.
        assert_eq!(queue.jobs().len(), 1);

        // Token is released afterwards.
        assert!(matches!(
            coordinator.try_sweep().await.unwrap(),
            SweepOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn waits_between_repositories() {
        let store = store_with(3);
        let config = SweepConfig {
            inter_repo_delay_secs: 1,
            ..SweepConfig::default()
        };
        let coordinator = SweepCoordinator::new(
            store,
            Arc::new(ScriptedRunner::new(&[])),
            Arc::new(RecordingJobQueue::new()),
            config,
        );
        let started = Instant::now();
        coordinator.try_sweep().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn single_check_dispatch() {
        let store = store_with(2);
        let queue = Arc::new(RecordingJobQueue::new());
        let coordinator = SweepCoordinator::new(
            store,
            Arc::new(ScriptedRunner::new(&["w2"])),
            queue.clone(),
            fast_config(),
        );

        let ok = coordinator
            .handle(Job::SingleCheck {
                watchlist_id: "w1".into(),
            })
            .await
            .unwrap();
        assert!(matches!(ok, JobOutcome::Checked(_)));

        let failed = coordinator
            .handle(Job::SingleCheck {
                watchlist_id: "w2".into(),
            })
            .await;
        assert!(matches!(failed, Err(PipelineError::Clone { .. })));

        let missing = coordinator.check("nope").await;
        assert!(matches!(missing, Err(PipelineError::Validation { .. })));

        // Single checks never schedule a sweep.
        assert!(queue.jobs().is_empty());
        coordinator.request_single_check("w1").await.unwrap();
        assert_eq!(queue.jobs()[0].1, EnqueueOptions::single_check());
    }
}
