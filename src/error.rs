//! Error types for caoba

use thiserror::Error;

/// Result type alias for caoba operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to end users when ffmpeg fails. The raw log stays in [`Error::Encoding`].
pub const ENCODING_FAILED_MESSAGE: &str =
    "Technical error in the video engine. Check the application log for details.";

/// Error types for caoba operations
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected before any work started
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Duration of a music track could not be determined
    #[error("error reading track {}: {reason}", .index + 1)]
    AudioProbe {
        index: usize,
        path: String,
        reason: String,
    },

    /// ffmpeg exited unsuccessfully without a cancellation
    #[error("{}", ENCODING_FAILED_MESSAGE)]
    Encoding {
        status: Option<i32>,
        /// Full diagnostic output accumulated from ffmpeg's stderr
        log: String,
    },

    /// Render cancelled by the user
    #[error("Render cancelled by the user")]
    Cancelled,

    /// ffmpeg could not be started
    #[error("Failed to start ffmpeg: {0}")]
    Spawn(String),

    /// A render is already in flight
    #[error("A render job is already running")]
    JobRunning,

    /// ffmpeg/ffprobe missing or lacking required support
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Error code for FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ErrorCode {
    /// Success
    Ok = 0,
    /// Request validation failed
    InvalidInput = 1,
    /// Music track could not be probed
    AudioProbeError = 2,
    /// ffmpeg returned a failure
    EncodeError = 3,
    /// Cancelled by the user
    Cancelled = 4,
    /// ffmpeg could not be launched or found
    SpawnError = 5,
    /// Another job is running
    JobRunning = 6,
    /// I/O error
    IoError = 7,
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Validation(_) => ErrorCode::InvalidInput,
            Error::AudioProbe { .. } => ErrorCode::AudioProbeError,
            Error::Encoding { .. } => ErrorCode::EncodeError,
            Error::Cancelled => ErrorCode::Cancelled,
            Error::Spawn(_) => ErrorCode::SpawnError,
            Error::ToolUnavailable(_) => ErrorCode::SpawnError,
            Error::JobRunning => ErrorCode::JobRunning,
            Error::Io(_) => ErrorCode::IoError,
        }
    }
}
