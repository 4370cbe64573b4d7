//! Node registration payloads.

use serde::{Deserialize, Serialize};

use crate::{PROTOCOL_VERSION, REGISTRATION_OK};

/// Sent by the worker immediately after the transport is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Protocol version spoken by the worker.
    pub version: i32,
}

impl Default for RegistrationRequest {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

/// Coordinator's answer to a registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// 0 on success, anything else is a rejection.
    pub code: i32,
    /// Optional human-readable reason for a rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RegistrationResponse {
    pub fn accepted() -> Self {
        Self {
            code: REGISTRATION_OK,
            message: None,
        }
    }

    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Whether the coordinator accepted the node.
    pub fn is_success(&self) -> bool {
        self.code == REGISTRATION_OK
    }
}
