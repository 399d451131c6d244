//! Job surface: what the coordinator can be asked to do, and where
//! follow-up jobs are handed off.

use anyhow::Context;
use async_trait::async_trait;
use repowatch_core::clock::{format_rfc3339, now_rfc3339};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    MonthlySweep,
    SingleCheck { watchlist_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Duration,
    pub retries: u32,
}

impl EnqueueOptions {
    pub fn sweep(delay: Duration, retries: u32) -> Self {
        Self { delay, retries }
    }

    /// Single checks run once, immediately.
    pub fn single_check() -> Self {
        Self {
            delay: Duration::ZERO,
            retries: 0,
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> anyhow::Result<()>;
}

/// One line of the JSONL queue file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    #[serde(flatten)]
    pub job: Job,
    pub run_at: String,
    pub retries: u32,
    pub enqueued_at: String,
}

/// Appends jobs to a JSONL file for an external scheduler to pick up.
pub struct JsonlJobQueue {
    path: PathBuf,
}

impl JsonlJobQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Queue file at `<workdir>/jobs.jsonl`.
    pub fn in_workdir(workdir: &Path) -> Self {
        Self::new(workdir.join("jobs.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every job written so far, oldest first.
    pub fn pending(&self) -> anyhow::Result<Vec<QueuedJob>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str::<QueuedJob>(line)
                    .with_context(|| format!("{}: bad job on line {}", self.path.display(), i + 1))
            })
            .collect()
    }
}

#[async_trait]
impl JobQueue for JsonlJobQueue {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> anyhow::Result<()> {
        let delay = time::Duration::try_from(options.delay).context("job delay out of range")?;
        let queued = QueuedJob {
            job,
            run_at: format_rfc3339(OffsetDateTime::now_utc() + delay),
            retries: options.retries,
            enqueued_at: now_rfc3339(),
        };
        let line = serde_json::to_string(&queued)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Keeps enqueued jobs in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<(Job, EnqueueOptions)>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<(Job, EnqueueOptions)> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> anyhow::Result<()> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((job, options));
        Ok(())
    }
}
