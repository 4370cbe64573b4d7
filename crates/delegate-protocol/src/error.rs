//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Errors produced while turning frames into messages and back.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame was not valid JSON or did not match any known message.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame was empty after trimming.
    #[error("empty frame")]
    Empty,
}

pub type FrameResult<T> = Result<T, FrameError>;
