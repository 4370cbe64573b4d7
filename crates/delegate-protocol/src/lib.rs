//! Delegate Protocol Types
//!
//! Defines the messages exchanged between a coordinator and a build-farm
//! worker node, plus the JSON payload codec used to carry them over websocket
//! messages.

pub mod error;
pub mod frame;
pub mod message;
pub mod ops;

pub use error::{FrameError, FrameResult};
pub use frame::{decode_frame, encode_frame};
pub use message::Message;
pub use ops::{
    BootstrapCode, BootstrapRequest, BootstrapResponse, CompileRequest, CompileResponse,
    RegistrationRequest, RegistrationResponse,
};

/// Protocol version announced in every registration request.
pub const PROTOCOL_VERSION: i32 = 1;

/// Registration response code meaning "accepted".
pub const REGISTRATION_OK: i32 = 0;
