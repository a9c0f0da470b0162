//! Error types for the data link

use thiserror::Error;

use crate::LinkId;

/// Core link errors
#[derive(Error, Debug)]
pub enum LinkError {
    // Wire errors
    #[error("Truncated data: expected {expected} bytes, {actual} available")]
    TruncatedData { expected: usize, actual: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // Registry errors
    #[error("Unknown actor: {0}")]
    UnknownActor(LinkId),

    #[error("No template for actor: {0}")]
    MissingTemplate(LinkId),

    // Session errors
    #[error("Sequence already active")]
    SequenceActive,

    #[error("No active sequence")]
    NoSequence,

    #[error("Frame {frame} outside sequence range {start}..={end}")]
    FrameOutOfRange { frame: u32, start: u32, end: u32 },

    // Transport errors
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Errors after which the byte stream can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionLost(_) | LinkError::TruncatedData { .. } | LinkError::Io(_)
        )
    }
}

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;
