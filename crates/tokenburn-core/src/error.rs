//! Error type shared by every tokenburn crate
//!
//! Library code returns [`Result`] and lets callers decide whether a failure
//! skips a tick or ends the process.
//!
//! ```
//! use tokenburn_core::error::{Result, TokenburnError};
//!
//! fn read_usage(path: &str) -> Result<String> {
//!     Ok(std::fs::read_to_string(path)?)
//! }
//!
//! assert!(matches!(read_usage("/no/such/usage.jsonl"), Err(TokenburnError::Io(_))));
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tokenburn operations
///
/// Calculators and snapshot validation never produce these for well-formed
/// input. They surface from I/O, configuration and observer dispatch.
#[derive(Error, Debug)]
pub enum TokenburnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Not an IANA zone name
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Unknown subscription plan name
    #[error("Unknown plan type: {0}")]
    UnknownPlan(String),

    /// A usage line that could not be read
    #[error("Parse error in {file} at line {line}: {message}")]
    Parse {
        file: PathBuf,
        /// 1-based line number
        line: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A CLI value that parsed but makes no sense
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A session observer failed while handling an event
    #[error("Observer error: {0}")]
    Observer(String),

    /// Notification state could not be loaded or stored
    #[error("Notification state error: {0}")]
    NotificationState(String),
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, TokenburnError>;
