pub mod canon;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod types;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use types::*;
