//! Shared wiring for every subcommand: config, store and components.

use anyhow::Context;
use repowatch_core::config::CurrentPolicy;
use repowatch_core::types::{WatchlistEntry, WatchlistFilter};
use repowatch_core::{Config, PipelineError};
use repowatch_conductor::{JsonlJobQueue, RepoPipeline, SweepCoordinator};
use repowatch_git::HttpCommitSource;
use repowatch_health::{CommandScorer, HealthAnalyzer, SamplingPolicy};
use repowatch_ledger::{SqliteStore, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
}

impl App {
    /// Load config (explicit path, else `<workdir>/config.yaml` when present),
    /// pick up `GITHUB_TOKEN`, and open the database.
    pub fn open(config_path: Option<&Path>, workdir: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => Config::load(path)?,
            None => {
                let default_path = workdir
                    .clone()
                    .unwrap_or_else(repowatch_core::config::default_workdir)
                    .join("config.yaml");
                if default_path.exists() {
                    Config::load(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        if let Some(dir) = workdir {
            config = config.with_workdir(dir);
        }
        let config = config.with_token(std::env::var("GITHUB_TOKEN").ok());

        std::fs::create_dir_all(&config.workdir)
            .with_context(|| format!("creating workdir {}", config.workdir.display()))?;
        let store = SqliteStore::open_or_create(&config.database_path())?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
        })
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Look up a registered entry by `owner/repo`.
    pub fn entry(&self, repo: &str) -> anyhow::Result<WatchlistEntry> {
        let (owner, name) = parse_repo(repo)?;
        let id = watchlist_id(&owner, &name);
        self.store
            .find_watchlist_entries(&WatchlistFilter::by_id(&id))?
            .into_iter()
            .next()
            .with_context(|| format!("{repo} is not on the watchlist (try `repowatch watch add {repo}`)"))
    }

    pub fn analyzer(&self) -> anyhow::Result<HealthAnalyzer> {
        let scorer = CommandScorer::from_config(&self.config.scorer, self.config.remote.token.clone());
        let analyzer = HealthAnalyzer::new(
            self.store.clone(),
            Arc::new(scorer),
            SamplingPolicy::from_config(&self.config.sampling),
            self.config.scorer.clone(),
        );
        if self.config.scorer.current_policy == CurrentPolicy::RemoteHead {
            let source = HttpCommitSource::new(&self.config.remote)?;
            return Ok(analyzer.with_commit_source(Arc::new(source)));
        }
        Ok(analyzer)
    }

    pub fn pipeline(&self) -> anyhow::Result<RepoPipeline> {
        Ok(RepoPipeline::new(
            self.config.clone(),
            self.store.clone(),
            self.analyzer()?,
        ))
    }

    pub fn coordinator(&self) -> anyhow::Result<SweepCoordinator> {
        Ok(SweepCoordinator::new(
            self.store.clone(),
            Arc::new(self.pipeline()?),
            Arc::new(JsonlJobQueue::in_workdir(&self.config.workdir)),
            self.config.sweep.clone(),
        )
        .with_sweep_log(self.config.workdir.join("sweeps")))
    }
}

/// Split `owner/repo`.
pub fn parse_repo(repo: &str) -> Result<(String, String), PipelineError> {
    match repo.trim().split_once('/') {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((owner.to_string(), name.trim_end_matches(".git").to_string()))
        }
        _ => Err(PipelineError::Validation {
            field: "repository".into(),
            reason: format!("expected <owner>/<repo>, got {repo:?}"),
        }),
    }
}

/// Watchlist ids are the lowercased `owner/repo`.
pub fn watchlist_id(owner: &str, name: &str) -> String {
    format!("{owner}/{name}").to_lowercase()
}
