//! Message envelope.

use serde::{Deserialize, Serialize};

use crate::ops::{
    BootstrapRequest, BootstrapResponse, CompileRequest, CompileResponse, RegistrationRequest,
    RegistrationResponse,
};

/// Any message that can travel over a session.
///
/// The `type` field selects the variant on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    RegistrationRequest(RegistrationRequest),
    RegistrationResponse(RegistrationResponse),
    BootstrapRequest(BootstrapRequest),
    BootstrapResponse(BootstrapResponse),
    CompileRequest(CompileRequest),
    CompileResponse(CompileResponse),
}

impl Message {
    /// Wire name of the message kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegistrationRequest(_) => "registration_request",
            Self::RegistrationResponse(_) => "registration_response",
            Self::BootstrapRequest(_) => "bootstrap_request",
            Self::BootstrapResponse(_) => "bootstrap_response",
            Self::CompileRequest(_) => "compile_request",
            Self::CompileResponse(_) => "compile_response",
        }
    }
}

impl From<RegistrationRequest> for Message {
    fn from(m: RegistrationRequest) -> Self {
        Self::RegistrationRequest(m)
    }
}

impl From<RegistrationResponse> for Message {
    fn from(m: RegistrationResponse) -> Self {
        Self::RegistrationResponse(m)
    }
}

impl From<BootstrapRequest> for Message {
    fn from(m: BootstrapRequest) -> Self {
        Self::BootstrapRequest(m)
    }
}

impl From<BootstrapResponse> for Message {
    fn from(m: BootstrapResponse) -> Self {
        Self::BootstrapResponse(m)
    }
}

impl From<CompileRequest> for Message {
    fn from(m: CompileRequest) -> Self {
        Self::CompileRequest(m)
    }
}

impl From<CompileResponse> for Message {
    fn from(m: CompileResponse) -> Self {
        Self::CompileResponse(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BootstrapCode;

    #[test]
    fn test_tagged_representation() {
        let message = Message::from(BootstrapResponse::new(BootstrapCode::BadRevision));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "bootstrap_response");
        assert_eq!(json["code"], "BAD_REVISION");
    }

    #[test]
    fn test_kind_matches_tag() {
        let message = Message::from(CompileRequest::new(["x.o"]));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], message.kind());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<Message, _> = serde_json::from_str(r#"{"type":"shutdown"}"#);
        assert!(result.is_err());
    }
}
