//! Scoring Invoker: runs the external health-scoring tool against one commit
//! and classifies what came back.

use async_trait::async_trait;
use repowatch_core::config::ScorerConfig;
use repowatch_git::mask_secrets;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// What to score: a repository reference (remote name or local path) and a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRequest {
    pub repo: String,
    pub commit: String,
}

/// One check in a tool report. `score` is 0..=10, or negative when the
/// check was inconclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    #[serde(default)]
    pub name: String,
    #[serde(default = "inconclusive")]
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

fn inconclusive() -> f64 {
    -1.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Checks {
    List(Vec<CheckResult>),
    Map(BTreeMap<String, CheckResult>),
}

/// A parsed tool report. `raw` keeps the original JSON for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub score: Option<f64>,
    pub checks: Vec<CheckResult>,
    pub raw: Value,
}

impl ScoreReport {
    /// Build a report from tool JSON. Fails when `checks` is missing or is
    /// neither a list nor a map of checks.
    pub fn from_value(raw: Value) -> Result<Self, String> {
        let checks = match raw.get("checks") {
            None | Some(Value::Null) => return Err("report has no checks".into()),
            Some(v) => match serde_json::from_value::<Checks>(v.clone()) {
                Ok(Checks::List(list)) => list,
                Ok(Checks::Map(map)) => map
                    .into_iter()
                    .map(|(name, mut check)| {
                        if check.name.is_empty() {
                            check.name = name;
                        }
                        check
                    })
                    .collect(),
                Err(e) => return Err(format!("malformed checks: {e}")),
            },
        };
        let score = raw.get("score").and_then(Value::as_f64);
        Ok(Self { score, checks, raw })
    }
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Success(ScoreReport),
    /// The tool ran but produced nothing usable.
    SoftFailure {
        partial: Option<Value>,
        diagnostic: String,
    },
    /// The tool could not be run to completion (spawn error, timeout).
    HardFailure(String),
}

impl ScoreOutcome {
    /// The parsed report, or `None` for either failure kind.
    pub fn report(&self) -> Option<&ScoreReport> {
        match self {
            ScoreOutcome::Success(report) => Some(report),
            _ => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            ScoreOutcome::Success(_) => None,
            ScoreOutcome::SoftFailure { diagnostic, .. } => Some(diagnostic),
            ScoreOutcome::HardFailure(reason) => Some(reason),
        }
    }
}

/// Map a report to 0..=100.
///
/// The aggregate score wins when present and non-negative; otherwise the
/// mean of conclusive checks is used. No usable score at all maps to 0.
pub fn normalize(report: &ScoreReport) -> u8 {
    let base = match report.score.filter(|s| *s >= 0.0) {
        Some(score) => score,
        None => {
            let valid: Vec<f64> = report
                .checks
                .iter()
                .map(|c| c.score)
                .filter(|s| *s >= 0.0)
                .collect();
            if valid.is_empty() {
                return 0;
            }
            valid.iter().sum::<f64>() / valid.len() as f64
        }
    };
    (base * 10.0).round().clamp(0.0, 100.0) as u8
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> ScoreOutcome;
}

/// Runs the configured scoring program as a subprocess.
pub struct CommandScorer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    token: Option<String>,
}

impl CommandScorer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            token: None,
        }
    }

    pub fn from_config(config: &ScorerConfig, token: Option<String>) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .with_token(token)
    }

    /// Forwarded to the tool as `GITHUB_AUTH_TOKEN`.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn render_args(&self, request: &ScoreRequest) -> Vec<String> {
        self.args
            .iter()
            .map(|a| {
                a.replace("{repo}", &request.repo)
                    .replace("{commit}", &request.commit)
            })
            .collect()
    }
}

#[async_trait]
impl Scorer for CommandScorer {
    async fn score(&self, request: &ScoreRequest) -> ScoreOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            cmd.env("GITHUB_AUTH_TOKEN", token);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ScoreOutcome::HardFailure(format!("spawn {}: {e}", self.program))
            }
            Err(_) => {
                return ScoreOutcome::HardFailure(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            }
        };

        let exit = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = mask_secrets(String::from_utf8_lossy(&output.stderr).trim());
        debug!(repo = %request.repo, commit = %request.commit, exit, "scorer finished");

        if stdout.trim().is_empty() {
            return ScoreOutcome::SoftFailure {
                partial: None,
                diagnostic: format!("exit {exit}, no output: {stderr}"),
            };
        }
        // A non-zero exit with a parseable report still counts as a result.
        let value: Value = match serde_json::from_str(stdout.trim()) {
            Ok(v) => v,
            Err(e) => {
                return ScoreOutcome::SoftFailure {
                    partial: None,
                    diagnostic: format!("exit {exit}, unparseable output: {e}"),
                }
            }
        };
        match ScoreReport::from_value(value.clone()) {
            Ok(report) => ScoreOutcome::Success(report),
            Err(reason) => ScoreOutcome::SoftFailure {
                partial: Some(value),
                diagnostic: format!("exit {exit}, {reason}"),
            },
        }
    }
}

/// Test double with per-commit scripted outcomes and an optional delay.
pub struct MockScorer {
    outcomes: Mutex<HashMap<String, ScoreOutcome>>,
    default_outcome: ScoreOutcome,
    delay: Duration,
    calls: AtomicUsize,
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScorer {
    /// Every commit scores 7.5 unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_default(ScoreOutcome::Success(report_with_score(7.5)))
    }

    pub fn with_default(default_outcome: ScoreOutcome) -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            default_outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_outcome(&self, commit: &str, outcome: ScoreOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(commit.to_string(), outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A minimal report carrying only an aggregate score.
pub fn report_with_score(score: f64) -> ScoreReport {
    let raw = serde_json::json!({ "score": score, "checks": [] });
    ScoreReport {
        score: Some(score),
        checks: Vec::new(),
        raw,
    }
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score(&self, request: &ScoreRequest) -> ScoreOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request.commit)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}
