pub mod executor;
pub mod log;
pub mod message;
pub mod parser;
pub mod remote;
pub mod repository;
pub mod stream;
pub mod version;

// Re-export commonly used types
pub use executor::{CommandOutput, GotCommand, GotExecutor, find_work_tree_root};
pub use log::{LogEntry, LogFilter, LogOutput, LogQuery, parse_log};
pub use message::CommitMessage;
pub use parser::{
    AnnotationLine, BranchEntry, CommitId, FileStatus, ReferenceTable, StageStatus, StatusEntry,
    WorkTreeInfo, parse_annotation_line, parse_blame, parse_branch_list, parse_reference_list,
    parse_stage_char, parse_status, parse_status_char,
};
pub use repository::{DiffQuery, Repository};
pub use stream::{OutputSink, ProgressBuffer, RemoteTask, StreamUpdate};
pub use version::GotVersion;
