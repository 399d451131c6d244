//! Append-only JSONL record of one sweep, written to
//! `<workdir>/sweeps/<sweep_id>.jsonl`.

use repowatch_core::clock::now_rfc3339;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A sweep event. Serialized as tagged JSON (`"type": "sweep_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SweepEvent {
    SweepStart {
        sweep_id: String,
        repo_count: usize,
    },
    RepoPassed {
        repo: String,
        duration_ms: u64,
        appended: usize,
        current_score: Option<u8>,
    },
    RepoFailed {
        repo: String,
        duration_ms: u64,
        error: String,
    },
    SweepCompleted {
        passed: usize,
        failed: usize,
        next_enqueued: bool,
    },
}

#[derive(Debug, Serialize)]
struct FullEvent<'a> {
    seq: u32,
    ts: String,
    #[serde(flatten)]
    event: &'a SweepEvent,
}

pub struct SweepLog {
    path: Option<PathBuf>,
    seq: u32,
}

impl SweepLog {
    pub fn new(sweeps_dir: &Path, sweep_id: &str) -> Self {
        Self {
            path: Some(sweeps_dir.join(format!("{sweep_id}.jsonl"))),
            seq: 0,
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self { path: None, seq: 0 }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an event. Best-effort: write failures are ignored.
    pub fn record(&mut self, event: SweepEvent) {
        let full = FullEvent {
            seq: self.seq,
            ts: now_rfc3339(),
            event: &event,
        };
        self.seq += 1;

        if let (Some(path), Ok(line)) = (&self.path, serde_json::to_string(&full)) {
            let _ = append_line(path, &line);
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
