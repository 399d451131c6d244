//! Commit-metadata remote: resolves the head commit of a branch without
//! touching the working copy.

use anyhow::Context;
use async_trait::async_trait;
use repowatch_core::config::RemoteConfig;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Sha of the newest commit on `branch`.
    async fn latest_commit_sha(&self, owner: &str, repo: &str, branch: &str)
        -> anyhow::Result<String>;
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

/// GitHub-style REST source: `GET <api_base>/repos/<owner>/<repo>/commits/<branch>`.
pub struct HttpCommitSource {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl HttpCommitSource {
    pub fn new(remote: &RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(remote.http_timeout_secs))
            .user_agent(concat!("repowatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            api_base: remote.api_base.trim_end_matches('/').to_string(),
            token: remote.token.clone(),
        })
    }

    fn commit_url(&self, owner: &str, repo: &str, branch: &str) -> String {
        format!("{}/repos/{owner}/{repo}/commits/{branch}", self.api_base)
    }
}

#[async_trait]
impl CommitSource for HttpCommitSource {
    async fn latest_commit_sha(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> anyhow::Result<String> {
        let url = self.commit_url(owner, repo, branch);
        let mut req = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("requesting head of {owner}/{repo}@{branch}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("head lookup for {owner}/{repo}@{branch} returned {status}");
        }
        let body: CommitResponse = resp
            .json()
            .await
            .with_context(|| format!("decoding head of {owner}/{repo}@{branch}"))?;
        Ok(body.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_commit_url() {
        let remote = RemoteConfig {
            api_base: "https://api.example.com/".into(),
            ..RemoteConfig::default()
        };
        let source = HttpCommitSource::new(&remote).unwrap();
        assert_eq!(
            source.commit_url("acme", "widgets", "main"),
            "https://api.example.com/repos/acme/widgets/commits/main"
        );
    }

    #[test]
    fn decodes_sha_ignoring_other_fields() {
        let body: CommitResponse =
            serde_json::from_str(r#"{"sha":"abc123","commit":{"message":"x"}}"#).unwrap();
        assert_eq!(body.sha, "abc123");
    }

    #[tokio::test]
    async fn unreachable_api_is_an_error() {
        let remote = RemoteConfig {
            api_base: "http://127.0.0.1:9".into(),
            http_timeout_secs: 2,
            ..RemoteConfig::default()
        };
        let source = HttpCommitSource::new(&remote).unwrap();
        assert!(source
            .latest_commit_sha("acme", "widgets", "main")
            .await
            .is_err());
    }
}
