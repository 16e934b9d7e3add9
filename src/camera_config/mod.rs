//! CameraConfig - Shared Camera Connection Settings
//!
//! ## Responsibilities
//!
//! - Process-wide camera credentials/address/channel configuration
//! - Readiness check (all fields present) before stream or recording use
//! - Wholesale replacement on update, no partial merges
//!
//! Both the stream session and the recording supervisor read from this
//! store; a running session reads its snapshot once at start and never
//! hot-reloads mid-stream.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// RTSP port used by the supported cameras
const RTSP_PORT: u16 = 554;

/// Camera connection configuration
///
/// All fields are optional until set by the first configuration call.
/// No shape validation is performed here; a malformed host or channel
/// surfaces later as a connection failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub channel: Option<String>,
    pub sub_stream: Option<String>,
}

impl CameraConfig {
    /// True iff every field is set and non-empty
    pub fn is_ready(&self) -> bool {
        [
            &self.username,
            &self.password,
            &self.host,
            &self.channel,
            &self.sub_stream,
        ]
        .iter()
        .all(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
    }

    /// Build the RTSP connection URL for this configuration
    ///
    /// Returns `None` unless the configuration is ready. The URL is derived
    /// on every call and never stored. `for_recording` appends a marker query
    /// parameter so the camera sees a session distinct from the live preview.
    pub fn stream_url(&self, for_recording: bool) -> Option<String> {
        if !self.is_ready() {
            return None;
        }

        let mut url = format!(
            "rtsp://{}:{}@{}:{}/cam/realmonitor?channel={}&subtype={}",
            self.username.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
            self.host.as_deref().unwrap_or_default(),
            RTSP_PORT,
            self.channel.as_deref().unwrap_or_default(),
            self.sub_stream.as_deref().unwrap_or_default(),
        );
        if for_recording {
            url.push_str("&recording=1");
        }
        Some(url)
    }
}

/// Shared store for the active camera configuration
///
/// Created empty at process start; overwritten wholesale on each update.
/// Last writer wins, readers see complete snapshots only.
pub struct CameraConfigStore {
    inner: RwLock<CameraConfig>,
}

impl CameraConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CameraConfig::default()),
        }
    }

    /// Replace all five fields unconditionally
    pub async fn replace(&self, config: CameraConfig) {
        let mut inner = self.inner.write().await;
        *inner = config;
        tracing::info!(
            host = inner.host.as_deref().unwrap_or("<unset>"),
            channel = inner.channel.as_deref().unwrap_or("<unset>"),
            ready = inner.is_ready(),
            "Camera configuration replaced"
        );
    }

    /// Get a point-in-time copy of the configuration
    pub async fn snapshot(&self) -> CameraConfig {
        self.inner.read().await.clone()
    }

    /// True iff the current configuration is complete
    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.is_ready()
    }
}

impl Default for CameraConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> CameraConfig {
        CameraConfig {
            username: Some("a".to_string()),
            password: Some("b".to_string()),
            host: Some("1.2.3.4".to_string()),
            channel: Some("1".to_string()),
            sub_stream: Some("0".to_string()),
        }
    }

    #[test]
    fn test_full_config_is_ready() {
        assert!(full_config().is_ready());
    }

    #[test]
    fn test_missing_channel_not_ready() {
        let mut config = full_config();
        config.channel = None;
        assert!(!config.is_ready());
    }

    #[test]
    fn test_empty_field_not_ready() {
        let mut config = full_config();
        config.password = Some(String::new());
        assert!(!config.is_ready());
    }

    #[test]
    fn test_default_not_ready() {
        assert!(!CameraConfig::default().is_ready());
    }

    #[test]
    fn test_stream_url_format() {
        let url = full_config().stream_url(false).unwrap();
        assert_eq!(
            url,
            "rtsp://a:b@1.2.3.4:554/cam/realmonitor?channel=1&subtype=0"
        );
    }

    #[test]
    fn test_recording_url_has_marker() {
        let url = full_config().stream_url(true).unwrap();
        assert!(url.ends_with("&recording=1"));
    }

    #[test]
    fn test_incomplete_config_has_no_url() {
        let mut config = full_config();
        config.host = None;
        assert!(config.stream_url(false).is_none());
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let store = CameraConfigStore::new();
        store.replace(full_config()).await;
        assert!(store.is_ready().await);

        // A partial config replaces everything, it does not merge
        store
            .replace(CameraConfig {
                username: Some("x".to_string()),
                ..Default::default()
            })
            .await;
        let current = store.snapshot().await;
        assert_eq!(current.username.as_deref(), Some("x"));
        assert!(current.host.is_none());
        assert!(!store.is_ready().await);
    }
}
