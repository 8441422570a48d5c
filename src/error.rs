use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::settings::ConfigError;

/// Errors that can occur during got operations
#[derive(Debug, Error)]
pub enum GotError {
    #[error("Not a got work tree: {}", .0.display())]
    NotARepository(PathBuf),

    /// The tool exited non-zero. `diagnostic` holds the captured bytes, untouched.
    #[error("{operation}: {diagnostic}")]
    CommandFailed {
        operation: String,
        diagnostic: Diagnostic,
    },

    #[error("Operation not supported by got: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Failed to parse got output: {0}")]
    ParseError(String),

    #[error("Failed to detect got version: {0}")]
    VersionDetectionFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}: cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Output of a failed command, exactly as the tool wrote it
///
/// got prints file names as raw bytes, so the text need not be UTF-8.
/// `Display` decodes lossily; `as_bytes` gives the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostic(Vec<u8>);

impl Diagnostic {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<Vec<u8>> for Diagnostic {
    fn from(bytes: Vec<u8>) -> Self {
        Diagnostic(bytes)
    }
}

impl From<&str> for Diagnostic {
    fn from(text: &str) -> Self {
        Diagnostic(text.as_bytes().to_vec())
    }
}

impl From<String> for Diagnostic {
    fn from(text: String) -> Self {
        Diagnostic(text.into_bytes())
    }
}

impl PartialEq<str> for Diagnostic {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Diagnostic {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

/// Top-level application error that wraps all module-specific errors
///
/// The CLI works in terms of this type; library callers usually only see
/// `GotError`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("got error: {0}")]
    Got(#[from] GotError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for got operations
pub type GotResult<T> = std::result::Result<T, GotError>;

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;
