//! Immutable runtime configuration.
//!
//! Built once (from YAML or defaults) and handed to each component at
//! construction. Nothing below reads the process environment; the binary
//! injects secrets through [`Config::with_token`].

use crate::error::PipelineError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Return the default working root: `<data dir>/repowatch`.
pub fn default_workdir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("repowatch")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".repowatch")
    } else {
        PathBuf::from(".repowatch")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for working copies, lock files, the job queue and sweep logs.
    pub workdir: PathBuf,
    /// SQLite database path. Defaults to `<workdir>/repowatch.db`.
    pub database: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub clone: CloneConfig,
    pub ledger: LedgerConfig,
    pub sampling: SamplingConfig,
    pub scorer: ScorerConfig,
    pub sweep: SweepConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            database: None,
            remote: RemoteConfig::default(),
            clone: CloneConfig::default(),
            ledger: LedgerConfig::default(),
            sampling: SamplingConfig::default(),
            scorer: ScorerConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach the remote access token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.remote.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.workdir.join("repowatch.db"))
    }

    pub fn clones_dir(&self) -> PathBuf {
        self.workdir.join("clones")
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ledger.batch_size == 0 {
            return Err(PipelineError::Config("ledger.batch_size must be > 0".into()));
        }
        if self.scorer.fallback_score > 100 {
            return Err(PipelineError::Config(
                "scorer.fallback_score must be within 0..=100".into(),
            ));
        }
        if self.sampling.max_samples == 0 {
            return Err(PipelineError::Config("sampling.max_samples must be > 0".into()));
        }
        if self
            .sampling
            .tiers
            .windows(2)
            .any(|w| w[0].below >= w[1].below || w[0].count > w[1].count)
        {
            return Err(PipelineError::Config(
                "sampling.tiers must be ordered by ascending `below` with non-decreasing `count`"
                    .into(),
            ));
        }
        if self.clone.max_dir_name_len < 8 {
            return Err(PipelineError::Config("clone.max_dir_name_len must be >= 8".into()));
        }
        if self.scorer.program.trim().is_empty() {
            return Err(PipelineError::Config("scorer.program must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL that `<owner>/<repo>.git` is appended to for clone/fetch.
    pub git_base: String,
    /// Base URL of the commit-metadata REST API.
    pub api_base: String,
    pub http_timeout_secs: u64,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            git_base: "https://github.com".into(),
            api_base: "https://api.github.com".into(),
            http_timeout_secs: 30,
            token: None,
        }
    }
}

impl RemoteConfig {
    /// Clone URL for a repository, with the token embedded for HTTPS remotes.
    pub fn clone_url(&self, owner: &str, repo: &str) -> String {
        let base = self.git_base.trim_end_matches('/');
        match (&self.token, base.strip_prefix("https://")) {
            (Some(token), Some(host)) => {
                format!("https://x-access-token:{token}@{host}/{owner}/{repo}.git")
            }
            _ => format!("{base}/{owner}/{repo}.git"),
        }
    }

    /// Repository reference handed to the scoring tool, e.g. `github.com/acme/widgets`.
    pub fn repo_reference(&self, owner: &str, repo: &str) -> String {
        let base = self.git_base.trim_end_matches('/');
        let host = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"))
            .unwrap_or(base);
        format!("{host}/{owner}/{repo}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneConfig {
    /// Hard ceiling on fetch depth while deepening.
    pub max_depth: u32,
    /// Wall-clock budget for one deepen call.
    pub deepen_budget_secs: u64,
    /// Commit count (within the history window) deepening aims for.
    pub deepen_target: usize,
    /// Only commits newer than this many days count towards the target.
    pub history_window_days: i64,
    /// Maximum commits extracted per run.
    pub extract_limit: usize,
    pub git_timeout_secs: u64,
    /// Concurrent `git show --numstat` calls during extraction.
    pub stats_concurrency: usize,
    pub max_dir_name_len: usize,
    /// Remove the working copy at the end of every pipeline run.
    pub cleanup_after_run: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            max_depth: 8192,
            deepen_budget_secs: 600,
            deepen_target: 2000,
            history_window_days: 730,
            extract_limit: 2000,
            git_timeout_secs: 300,
            stats_concurrency: 8,
            max_dir_name_len: 100,
            cleanup_after_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub batch_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// Timelines shorter than `below` commits get `count` samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SamplingTier {
    pub below: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub tiers: Vec<SamplingTier>,
    pub max_samples: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                SamplingTier { below: 1000, count: 3 },
                SamplingTier { below: 2000, count: 4 },
            ],
            max_samples: 4,
        }
    }
}

/// How the "current" score of an analysis run is chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurrentPolicy {
    /// Use the newest sampled commit.
    #[default]
    LatestSample,
    /// Ask the commit-metadata remote for the branch head and score it.
    RemoteHead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub program: String,
    /// Arguments; `{repo}` and `{commit}` are substituted per invocation.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub fallback_score: u8,
    pub current_policy: CurrentPolicy,
    /// Reuse a prior result dated within this many days of a sampling point.
    pub reuse_window_days: Option<i64>,
    /// Score the local working copy instead of the remote reference.
    pub score_local_clone: bool,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            program: "scorecard".into(),
            args: vec![
                "--repo={repo}".into(),
                "--commit={commit}".into(),
                "--format=json".into(),
                "--show-details".into(),
            ],
            timeout_secs: 600,
            fallback_score: 50,
            current_policy: CurrentPolicy::LatestSample,
            reuse_window_days: None,
            score_local_clone: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub inter_repo_delay_secs: u64,
    pub interval_days: u64,
    pub retries: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            inter_repo_delay_secs: 5,
            interval_days: 30,
            retries: 1,
        }
    }
}
