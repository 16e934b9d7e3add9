//! Shared response models
//!
//! Wire shapes used by more than one handler. The frontend contracts
//! (status strings, camelCase media fields) are fixed; everything here
//! mirrors what the clients already parse.

use crate::recorder::RecorderState;
use serde::{Deserialize, Serialize};

/// Plain status acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }

    pub fn with_message(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: Some(message.into()),
        }
    }
}

/// Upload result handed back to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: String,
    pub file_path: String,
    pub file_url: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub recorder: RecorderState,
    pub preview_clients: u64,
    pub event_clients: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_omits_empty_message() {
        let value = serde_json::to_value(StatusResponse::success()).unwrap();
        assert_eq!(value, serde_json::json!({"status": "success"}));
    }

    #[test]
    fn test_upload_response_uses_camel_case() {
        let response = UploadResponse {
            status: "success".to_string(),
            file_path: "uploaded_media/a.jpg".to_string(),
            file_url: "http://localhost:8000/uploaded_media/a.jpg".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("filePath").is_some());
        assert!(value.get("fileUrl").is_some());
    }
}
