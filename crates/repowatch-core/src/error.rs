use thiserror::Error;

/// Typed failures surfaced by the mining and scoring pipeline.
///
/// Scoring-tool failures are not errors: they are carried as values and
/// replaced by a fallback score.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Clone, fetch or deepen failed. Partial state has been removed.
    #[error("clone failed for {repo}: {reason}")]
    Clone { repo: String, reason: String },

    /// A git command other than clone failed.
    #[error("git {command} failed in {repo}: {reason}")]
    Git {
        repo: String,
        command: String,
        reason: String,
    },

    /// The datastore rejected a read or write.
    #[error("persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),

    /// Malformed input that could not be recovered locally.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Another run holds the working copy of this repository.
    #[error("working copy for {repo} is locked by another run")]
    Locked { repo: String },

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        PipelineError::Persistence(err.into())
    }

    /// Whether the caller may retry the same unit of work.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Clone { .. } | PipelineError::Git { .. } | PipelineError::Locked { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_failure_message() {
        let e = PipelineError::Clone {
            repo: "acme/widgets".into(),
            reason: "exit 128".into(),
        };
        assert_eq!(e.to_string(), "clone failed for acme/widgets: exit 128");
        assert!(e.is_retryable());
    }

    #[test]
    fn persistence_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("inserting log entries");
        let e = PipelineError::persistence(inner);
        let msg = e.to_string();
        assert!(msg.contains("inserting log entries"));
        assert!(msg.contains("disk full"));
        assert!(!e.is_retryable());
    }
}
