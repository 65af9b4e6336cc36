//! Error types for the DAQ simulator core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the acquisition core.
///
/// None of these are fatal: public operations degrade to "skip this cycle"
/// and report through their return value.
#[derive(Error, Debug)]
pub enum Error {
    /// The log file could not be created; the writer is inert.
    #[error("Log file unavailable at {}", .0.display())]
    LogUnavailable(PathBuf),

    /// I/O error while appending to the log file.
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize a record.
    #[error("Log record error: {0}")]
    Csv(#[from] csv::Error),

    /// The timer worker thread could not be started.
    #[error("Failed to spawn timer thread '{0}'")]
    TimerSpawn(String),
}
