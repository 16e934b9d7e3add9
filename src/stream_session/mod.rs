//! Stream Session - Live Preview Delivery
//!
//! ## Responsibilities
//!
//! - Own one decode handle per preview subscriber
//! - Forward frames to the subscriber through the hub at a bounded rate
//! - Reopen the handle after source failure, with a bounded retry policy
//!
//! One session per subscriber keeps the model simple; two concurrent
//! previews open the source twice, which is tolerated but wasteful.
//! TODO: share one decode handle across preview subscribers and fan out
//! through the hub instead of opening the source per session.

use crate::capture::{FrameSource, FrameSourceOpener};
use crate::hub::PreviewHub;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Error payload sent when the source cannot be opened
const OPEN_ERROR: &str = "Unable to open camera stream";

/// Session pacing and retry policy
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Outbound frame rate toward the subscriber, decoupled from the
    /// acquisition rate
    pub forward_fps: u32,
    /// Delay between reopen attempts after the handle dies
    pub reopen_delay: Duration,
    /// Delay after a failed frame read before retrying in place
    pub read_retry_delay: Duration,
    /// Consecutive reopen failures before the session gives up
    pub max_reopen_failures: u32,
    /// Consecutive read failures before the handle is treated as dead
    pub max_read_failures: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            forward_fps: 30,
            reopen_delay: Duration::from_secs(1),
            read_retry_delay: Duration::from_millis(100),
            max_reopen_failures: 30,
            max_read_failures: 50,
        }
    }
}

/// One preview delivery loop bound to one subscriber
pub struct StreamSession<O: FrameSourceOpener> {
    opener: O,
    hub: Arc<PreviewHub>,
    settings: SessionSettings,
}

impl<O: FrameSourceOpener> StreamSession<O> {
    pub fn new(opener: O, hub: Arc<PreviewHub>, settings: SessionSettings) -> Self {
        Self {
            opener,
            hub,
            settings,
        }
    }

    /// Run the delivery loop until the subscriber goes away or the source
    /// is lost for good
    ///
    /// The handle is released and the subscriber deregistered on every
    /// exit path.
    pub async fn run(self, subscriber: Uuid, url: String) {
        let mut source = match self.opener.open(&url).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(subscriber = %subscriber, error = %e, "Preview source failed to open");
                self.hub.send_to(&subscriber, error_payload(OPEN_ERROR)).await;
                self.hub.unregister(&subscriber).await;
                return;
            }
        };

        let forward_interval =
            Duration::from_millis(1000 / u64::from(self.settings.forward_fps.max(1)));
        let mut reopen_failures: u32 = 0;
        let mut read_failures: u32 = 0;

        loop {
            if !self.hub.is_subscribed(&subscriber).await {
                break;
            }

            if !source.is_open() {
                source.close().await;
                match self.opener.open(&url).await {
                    Ok(reopened) => {
                        tracing::info!(subscriber = %subscriber, "Preview source reopened");
                        source = reopened;
                        reopen_failures = 0;
                        read_failures = 0;
                    }
                    Err(e) => {
                        reopen_failures += 1;
                        if reopen_failures >= self.settings.max_reopen_failures {
                            tracing::error!(
                                subscriber = %subscriber,
                                attempts = reopen_failures,
                                error = %e,
                                "Preview source lost, giving up"
                            );
                            self.hub.send_to(&subscriber, error_payload(OPEN_ERROR)).await;
                            break;
                        }
                        tracing::debug!(
                            subscriber = %subscriber,
                            attempts = reopen_failures,
                            error = %e,
                            "Preview source reopen failed, retrying"
                        );
                        sleep(self.settings.reopen_delay).await;
                        continue;
                    }
                }
            }

            match source.read_frame().await {
                Ok(jpeg) => {
                    read_failures = 0;
                    let encoded = STANDARD.encode(&jpeg);
                    if !self.hub.send_to(&subscriber, encoded).await {
                        break;
                    }
                    sleep(forward_interval).await;
                }
                Err(e) => {
                    read_failures += 1;
                    tracing::debug!(
                        subscriber = %subscriber,
                        failures = read_failures,
                        error = %e,
                        "Frame read failed, retrying"
                    );
                    if read_failures >= self.settings.max_read_failures {
                        // Persistent read failure, force a reopen
                        source.close().await;
                        read_failures = 0;
                    }
                    sleep(self.settings.read_retry_delay).await;
                }
            }
        }

        source.close().await;
        self.hub.unregister(&subscriber).await;
        tracing::info!(subscriber = %subscriber, "Preview session ended");
    }
}

fn error_payload(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
