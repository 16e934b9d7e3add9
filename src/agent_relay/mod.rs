//! AgentRelay - Vision Agent Boundary
//!
//! ## Responsibilities
//!
//! - Forward chat messages to the external vision agent service
//! - Reduce media references to local file paths for agent processing
//!
//! The agent itself is an external collaborator: it processes the
//! conversation in its own time and calls back into `/api/messages`,
//! which fans its updates out on the event hub. Nothing agent-shaped is
//! implemented here.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Media attachment carried by a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    /// Local file path for backend processing
    pub file_path: String,
    /// URL for frontend display
    pub file_url: String,
}

/// One chat message from the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaRef>>,
}

/// Forwards conversations to the agent service
pub struct AgentRelay {
    client: reqwest::Client,
    agent_url: String,
}

impl AgentRelay {
    pub fn new(agent_url: String) -> Self {
        // Agent runs can take a while; generous timeout
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, agent_url }
    }

    /// Forward a conversation to the agent
    ///
    /// Called from a background task; the HTTP response body is ignored,
    /// the agent reports progress through the message callback instead.
    pub async fn forward(&self, messages: Vec<ChatMessage>) -> Result<()> {
        let payload = agent_payload(&messages);
        self.client
            .post(&self.agent_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(
            agent_url = %self.agent_url,
            messages = messages.len(),
            "Conversation forwarded to agent"
        );
        Ok(())
    }
}

/// Agent-side message shape: media reduced to local paths
fn agent_payload(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut entry = json!({
                "role": message.role,
                "content": message.content,
            });
            if let Some(media) = &message.media {
                entry["media"] = media
                    .iter()
                    .map(|m| Value::String(m.file_path.clone()))
                    .collect();
            }
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_payload_reduces_media_to_paths() {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: "what is in this clip?".to_string(),
            media: Some(vec![MediaRef {
                file_path: "uploaded_media/clip.mp4".to_string(),
                file_url: "http://localhost:8000/uploaded_media/clip.mp4".to_string(),
            }]),
        }];

        let payload = agent_payload(&messages);
        assert_eq!(payload[0]["media"], json!(["uploaded_media/clip.mp4"]));
        assert_eq!(payload[0]["role"], "user");
    }

    #[test]
    fn test_agent_payload_omits_absent_media() {
        let messages = vec![ChatMessage {
            role: "assistant".to_string(),
            content: "done".to_string(),
            media: None,
        }];

        let payload = agent_payload(&messages);
        assert!(payload[0].get("media").is_none());
    }

    #[test]
    fn test_media_ref_wire_names() {
        let media = MediaRef {
            file_path: "a".to_string(),
            file_url: "b".to_string(),
        };
        let value = serde_json::to_value(&media).unwrap();
        assert_eq!(value, json!({"filePath": "a", "fileUrl": "b"}));
    }
}
