//! Application state
//!
//! Holds all shared components and configuration. Components are owned
//! here and injected into handlers/sessions; there are no process-wide
//! singletons.

use crate::agent_relay::AgentRelay;
use crate::camera_config::CameraConfigStore;
use crate::capture::CaptureSettings;
use crate::hub::{EventHub, PreviewHub};
use crate::media_store::MediaStore;
use crate::recorder::RecordingSupervisor;
use crate::stream_session::SessionSettings;
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory recordings are written to
    pub recordings_dir: PathBuf,
    /// Directory uploaded media is stored in
    pub upload_dir: PathBuf,
    /// Base URL uploads are served from
    pub public_base_url: String,
    /// Vision agent chat endpoint; chat relay is disabled when unset
    pub agent_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            recordings_dir: std::env::var("RECORDINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("recordings")),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploaded_media")),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            agent_url: std::env::var("AGENT_URL").ok(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Shared camera configuration
    pub camera: Arc<CameraConfigStore>,
    /// Preview frame fan-out
    pub preview: Arc<PreviewHub>,
    /// Structured event fan-out
    pub events: Arc<EventHub>,
    /// Recording supervisor
    pub recorder: Arc<RecordingSupervisor>,
    /// Upload storage
    pub media: Arc<MediaStore>,
    /// Chat relay to the vision agent, when configured
    pub agent: Option<Arc<AgentRelay>>,
    /// Preview acquisition parameters
    pub capture: CaptureSettings,
    /// Preview session pacing/retry policy
    pub session: SessionSettings,
}
