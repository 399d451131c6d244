//! Git plumbing for repowatch: working copies, commit extraction and the
//! commit-metadata remote.

pub mod lock;
pub mod remote;
pub mod runner;
pub mod working_copy;

pub use lock::WorkingCopyLock;
pub use remote::{CommitSource, HttpCommitSource};
pub use runner::mask_secrets;
pub use working_copy::WorkingCopyManager;
