//! Health Analysis Engine.
//!
//! One run walks `PLAN -> SAMPLE -> AGGREGATE -> PERSIST`: pick sampling
//! points from the commit timeline, score them in parallel, choose the
//! current score and write one result per sampled commit. A failed score
//! never leaves a gap; the configured fallback takes its place.

use crate::history::closest_within;
use crate::sampling::{points, SamplingPolicy};
use crate::scorer::{normalize, ScoreOutcome, ScoreRequest, Scorer};
use repowatch_core::clock::{format_rfc3339, now_rfc3339};
use repowatch_core::config::{CurrentPolicy, ScorerConfig};
use repowatch_core::types::{
    CommitRecord, HealthAnalysisResult, SamplingPoint, ScoreSource, WatchlistEntry,
};
use repowatch_core::{PipelineError, Result};
use repowatch_git::CommitSource;
use repowatch_ledger::Store;
use std::sync::Arc;
use time::{OffsetDateTime, UtcOffset};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Everything one analysis run produced.
#[derive(Debug, Clone, Default)]
pub struct HealthRun {
    pub watchlist_id: String,
    /// One result per sampling point, oldest commit first.
    pub samples: Vec<HealthAnalysisResult>,
    /// The score chosen as "current".
    pub current: Option<HealthAnalysisResult>,
    pub fallbacks: usize,
    pub reused: usize,
}

pub struct HealthAnalyzer {
    store: Arc<dyn Store>,
    scorer: Arc<dyn Scorer>,
    commit_source: Option<Arc<dyn CommitSource>>,
    policy: SamplingPolicy,
    config: ScorerConfig,
}

impl HealthAnalyzer {
    pub fn new(
        store: Arc<dyn Store>,
        scorer: Arc<dyn Scorer>,
        policy: SamplingPolicy,
        config: ScorerConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            commit_source: None,
            policy,
            config,
        }
    }

    /// Required for [`CurrentPolicy::RemoteHead`].
    pub fn with_commit_source(mut self, source: Arc<dyn CommitSource>) -> Self {
        self.commit_source = Some(source);
        self
    }

    /// Analyze a repository's timeline. Commits may arrive in any order; the
    /// timeline is sorted oldest first by date before sampling.
    /// `source_location` is what the scoring tool is pointed at (remote
    /// reference or local path).
    pub async fn analyze(
        &self,
        entry: &WatchlistEntry,
        commits: &[CommitRecord],
        source_location: &str,
    ) -> Result<HealthRun> {
        let mut run = HealthRun {
            watchlist_id: entry.id.clone(),
            ..HealthRun::default()
        };

        // PLAN
        let timeline = timeline(entry, commits);
        let count = self.policy.count(timeline.len());
        let planned = points(&timeline, count);
        if planned.is_empty() {
            info!(repo = %entry.full_name(), "no commits to analyze");
            return Ok(run);
        }
        debug!(repo = %entry.full_name(), commits = timeline.len(), samples = planned.len(), "sampling planned");

        // SAMPLE
        let mut slots: Vec<Option<HealthAnalysisResult>> = vec![None; planned.len()];
        let mut to_score = Vec::new();
        let prior = self.prior_results(entry)?;
        for (idx, point) in planned.iter().enumerate() {
            match self.reusable(entry, &prior, point) {
                Some(result) => {
                    run.reused += 1;
                    slots[idx] = Some(result);
                }
                None => to_score.push(idx),
            }
        }

        let mut tasks = JoinSet::new();
        for idx in to_score {
            let scorer = Arc::clone(&self.scorer);
            let request = ScoreRequest {
                repo: source_location.to_string(),
                commit: planned[idx].sha.clone(),
            };
            tasks.spawn(async move { (idx, scorer.score(&request).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    let result = self.to_result(entry, &planned[idx], outcome);
                    if result.source == ScoreSource::Fallback {
                        run.fallbacks += 1;
                    }
                    slots[idx] = Some(result);
                }
                Err(e) => warn!(repo = %entry.full_name(), error = %e, "scoring task aborted"),
            }
        }
        // A panicked task still gets a score.
        for (idx, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                run.fallbacks += 1;
                *slot = Some(self.fallback(entry, &planned[idx], None));
            }
        }
        run.samples = slots.into_iter().flatten().collect();

        // AGGREGATE
        let head = self.remote_head(entry, &run.samples, commits).await;
        let head_result = match head {
            Some(point) => {
                let outcome = self
                    .scorer
                    .score(&ScoreRequest {
                        repo: source_location.to_string(),
                        commit: point.sha.clone(),
                    })
                    .await;
                let result = self.to_result(entry, &point, outcome);
                if result.source == ScoreSource::Fallback {
                    run.fallbacks += 1;
                }
                Some(result)
            }
            None => None,
        };
        run.current = head_result.clone().or_else(|| run.samples.last().cloned());

        // PERSIST
        for result in run.samples.iter().chain(head_result.iter()) {
            self.store
                .create_health_analysis(result)
                .map_err(PipelineError::persistence)?;
        }

        info!(
            repo = %entry.full_name(),
            samples = run.samples.len(),
            fallbacks = run.fallbacks,
            reused = run.reused,
            current = run.current.as_ref().map(|r| r.health_score),
            "health analysis complete"
        );
        Ok(run)
    }

    /// Score a single commit and persist the result.
    pub async fn analyze_current(
        &self,
        entry: &WatchlistEntry,
        head: &SamplingPoint,
        source_location: &str,
    ) -> Result<HealthAnalysisResult> {
        let outcome = self
            .scorer
            .score(&ScoreRequest {
                repo: source_location.to_string(),
                commit: head.sha.clone(),
            })
            .await;
        let result = self.to_result(entry, head, outcome);
        self.store
            .create_health_analysis(&result)
            .map_err(PipelineError::persistence)?;
        info!(repo = %entry.full_name(), sha = %head.sha, score = result.health_score, "current health scored");
        Ok(result)
    }

    fn prior_results(&self, entry: &WatchlistEntry) -> Result<Vec<HealthAnalysisResult>> {
        if self.config.reuse_window_days.is_none() {
            return Ok(Vec::new());
        }
        let prior = self
            .store
            .health_analyses(&entry.id)
            .map_err(PipelineError::persistence)?;
        // Only real tool scores are carried forward; a reused score is not a source.
        Ok(prior
            .into_iter()
            .filter(|r| r.source == ScoreSource::Tool)
            .collect())
    }

    fn reusable(
        &self,
        entry: &WatchlistEntry,
        prior: &[HealthAnalysisResult],
        point: &SamplingPoint,
    ) -> Option<HealthAnalysisResult> {
        let days = self.config.reuse_window_days?;
        let hit = closest_within(prior, point.date, time::Duration::days(days))?;
        debug!(repo = %entry.full_name(), sha = %point.sha, from = %hit.commit_sha, "reusing prior score");
        Some(HealthAnalysisResult {
            watchlist_id: entry.id.clone(),
            commit_sha: point.sha.clone(),
            commit_date: format_rfc3339(point.date),
            raw_output: hit.raw_output.clone(),
            health_score: hit.health_score,
            analyzed_at: now_rfc3339(),
            source: ScoreSource::Reused,
        })
    }

    /// The branch head to score separately, when the policy asks for one and
    /// it differs from the newest sample.
    async fn remote_head(
        &self,
        entry: &WatchlistEntry,
        samples: &[HealthAnalysisResult],
        commits: &[CommitRecord],
    ) -> Option<SamplingPoint> {
        if self.config.current_policy != CurrentPolicy::RemoteHead {
            return None;
        }
        let Some(source) = &self.commit_source else {
            warn!(repo = %entry.full_name(), "remote head policy without a commit source");
            return None;
        };
        let sha = match source
            .latest_commit_sha(&entry.owner, &entry.name, &entry.branch)
            .await
        {
            Ok(sha) => sha,
            Err(e) => {
                warn!(repo = %entry.full_name(), error = %format!("{e:#}"), "head lookup failed, using newest sample");
                return None;
            }
        };
        if samples.last().is_some_and(|s| s.commit_sha == sha) {
            return None;
        }
        let date = commits
            .iter()
            .find(|c| c.sha == sha)
            .and_then(|c| c.parsed_date())
            .map(|d| d.to_offset(UtcOffset::UTC))
            .unwrap_or_else(OffsetDateTime::now_utc);
        Some(SamplingPoint { sha, date })
    }

    fn to_result(
        &self,
        entry: &WatchlistEntry,
        point: &SamplingPoint,
        outcome: ScoreOutcome,
    ) -> HealthAnalysisResult {
        match outcome {
            ScoreOutcome::Success(report) => HealthAnalysisResult {
                watchlist_id: entry.id.clone(),
                commit_sha: point.sha.clone(),
                commit_date: format_rfc3339(point.date),
                health_score: normalize(&report),
                raw_output: Some(report.raw),
                analyzed_at: now_rfc3339(),
                source: ScoreSource::Tool,
            },
            ScoreOutcome::SoftFailure {
                partial,
                diagnostic,
            } => {
                warn!(repo = %entry.full_name(), sha = %point.sha, %diagnostic, "scorer gave no usable report");
                self.fallback(entry, point, partial)
            }
            ScoreOutcome::HardFailure(reason) => {
                warn!(repo = %entry.full_name(), sha = %point.sha, %reason, "scorer failed");
                self.fallback(entry, point, None)
            }
        }
    }

    fn fallback(
        &self,
        entry: &WatchlistEntry,
        point: &SamplingPoint,
        partial: Option<serde_json::Value>,
    ) -> HealthAnalysisResult {
        HealthAnalysisResult {
            watchlist_id: entry.id.clone(),
            commit_sha: point.sha.clone(),
            commit_date: format_rfc3339(point.date),
            raw_output: partial,
            health_score: self.config.fallback_score,
            analyzed_at: now_rfc3339(),
            source: ScoreSource::Fallback,
        }
    }
}

/// Commits with usable dates, as UTC sampling candidates, oldest first.
fn timeline(entry: &WatchlistEntry, commits: &[CommitRecord]) -> Vec<SamplingPoint> {
    let mut points: Vec<SamplingPoint> = commits
        .iter()
        .filter_map(|c| match c.parsed_date() {
            Some(date) => Some(SamplingPoint {
                sha: c.sha.clone(),
                date: date.to_offset(UtcOffset::UTC),
            }),
            None => {
                warn!(repo = %entry.full_name(), sha = %c.sha, "commit without usable date left out of sampling");
                None
            }
        })
        .collect();
    points.sort_by_key(|p| p.date);
    points
}
