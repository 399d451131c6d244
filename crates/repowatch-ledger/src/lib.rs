pub mod appender;
pub mod sqlite_store;
pub mod store;

pub use appender::{AppendSummary, LogAppender};
pub use sqlite_store::SqliteStore;
pub use store::Store;
