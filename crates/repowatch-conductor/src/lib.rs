//! Orchestration for repowatch: the per-repository pipeline, fleet-wide
//! sweeps and the job surface they hand work off through.

pub mod jobs;
pub mod pipeline;
pub mod sweep;
pub mod sweep_log;

pub use jobs::{EnqueueOptions, Job, JobQueue, JsonlJobQueue, RecordingJobQueue};
pub use pipeline::{RepoPipeline, RepoRunner, RunReport};
pub use sweep::{JobOutcome, SweepCoordinator, SweepOutcome, SweepSummary};
