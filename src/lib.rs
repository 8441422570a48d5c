pub mod cli;
pub mod config;
pub mod error;
pub mod got;
pub mod logging;

// Re-export commonly used types for convenience
pub use error::{AppError, AppResult, Diagnostic, GotError, GotResult};
pub use got::{
    FileStatus, GotExecutor, GotVersion, LogEntry, LogQuery, Repository, StageStatus, StatusEntry,
};
