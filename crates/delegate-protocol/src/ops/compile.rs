//! Compile job payloads.

use serde::{Deserialize, Serialize};

/// Request to build one or more files of the bootstrapped project.
///
/// An empty `files` list marks the end of the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    #[serde(default)]
    pub files: Vec<String>,
}

impl CompileRequest {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this is the coordinator's end-of-project marker.
    pub fn is_end_of_project(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of building a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    /// File identifier, echoed from the request.
    pub file: String,
    /// Diagnostic text; empty on success.
    #[serde(default)]
    pub error: String,
    /// Artifact bytes; empty on failure.
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl CompileResponse {
    pub fn success(file: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file: file.into(),
            error: String::new(),
            data,
        }
    }

    pub fn failure(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            error: error.into(),
            data: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Serde adapter carrying raw bytes as standard base64 text.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_project_marker() {
        assert!(CompileRequest::default().is_end_of_project());
        assert!(!CompileRequest::new(["main.cpp.o"]).is_end_of_project());
    }

    #[test]
    fn test_data_is_base64_on_the_wire() {
        let response = CompileResponse::success("a.o", vec![0x7f, b'E', b'L', b'F']);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], "f0VMRg==");
        assert_eq!(json["error"], "");
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result: Result<CompileResponse, _> =
            serde_json::from_str(r#"{"file":"a.o","error":"","data":"!!"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_has_no_data() {
        let response = CompileResponse::failure("a.o", "make exited with status 2");
        assert!(!response.is_success());
        assert!(response.data.is_empty());
    }
}
