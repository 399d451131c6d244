//! Health scoring for repowatch: sampling, the external scoring tool, and
//! the analysis engine that ties them to the datastore.

pub mod engine;
pub mod history;
pub mod sampling;
pub mod scorer;

pub use engine::{HealthAnalyzer, HealthRun};
pub use sampling::SamplingPolicy;
pub use scorer::{normalize, CommandScorer, MockScorer, ScoreOutcome, ScoreReport, ScoreRequest, Scorer};
