//! Message payload codec.
//!
//! Each websocket message carries exactly one JSON-encoded [`Message`].
//! Empty payloads carry nothing and are reported as [`FrameError::Empty`]
//! so readers can skip them.

use crate::error::{FrameError, FrameResult};
use crate::message::Message;

/// Encode a message as one frame payload.
pub fn encode_frame(message: &Message) -> FrameResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a single frame payload. Surrounding whitespace is ignored.
pub fn decode_frame(payload: &[u8]) -> FrameResult<Message> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(FrameError::Empty);
    }
    Ok(serde_json::from_slice(payload)?)
}
