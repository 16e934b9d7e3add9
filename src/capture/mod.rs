//! Frame Capture - Preview Decode Handle
//!
//! ## Responsibilities
//!
//! - Open a live decode handle against an RTSP source
//! - Yield successive JPEG frames at the negotiated size/rate/quality
//! - Report handle death so the session can reopen
//!
//! Production capture delegates decode, resize, and JPEG encoding to an
//! ffmpeg child per handle, read as an MJPEG stream on stdout. The child
//! is spawned with `kill_on_drop` so no exit path leaks it. The traits
//! are the seam the stream session is generic over.

pub mod mjpeg;

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{ChildStdout, Command};
use tokio::time::timeout;

/// Acquisition parameters for the preview decode handle
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// Frame rate requested from the source pipeline
    pub source_fps: u32,
    /// MJPEG quantizer, 2 (best) to 31; 4 lands near JPEG quality 85
    pub jpeg_qscale: u8,
    /// How long to wait for the first frame before declaring the source
    /// unreachable
    pub open_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 960,
            height: 720,
            source_fps: 30,
            jpeg_qscale: 4,
            open_timeout: Duration::from_secs(10),
        }
    }
}

/// A live decode handle yielding successive frames
#[async_trait]
pub trait FrameSource: Send {
    /// True while the handle can still produce frames
    fn is_open(&mut self) -> bool;

    /// Read the next frame as encoded JPEG bytes
    async fn read_frame(&mut self) -> Result<Bytes>;

    /// Release the handle
    async fn close(&mut self);
}

/// Factory producing decode handles from a source URL
#[async_trait]
pub trait FrameSourceOpener: Send + Sync {
    type Source: FrameSource;

    async fn open(&self, url: &str) -> Result<Self::Source>;
}

/// ffmpeg-backed decode handle
pub struct FfmpegFrameSource {
    child: tokio::process::Child,
    stdout: BufReader<ChildStdout>,
    scratch: Vec<u8>,
    /// First frame read during open, handed back on the first read_frame
    pending: Option<Bytes>,
    open: bool,
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn is_open(&mut self) -> bool {
        if self.open {
            if let Ok(Some(status)) = self.child.try_wait() {
                tracing::debug!(exit = ?status.code(), "Preview decoder exited");
                self.open = false;
            }
        }
        self.open
    }

    async fn read_frame(&mut self) -> Result<Bytes> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match mjpeg::next_frame(&mut self.stdout, &mut self.scratch).await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.open = false;
                Err(e.into())
            }
        }
    }

    async fn close(&mut self) {
        self.open = false;
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Preview decoder already gone");
        }
    }
}

/// Opens ffmpeg-backed decode handles
pub struct FfmpegOpener {
    settings: CaptureSettings,
}

impl FfmpegOpener {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl FrameSourceOpener for FfmpegOpener {
    type Source = FfmpegFrameSource;

    /// Spawn the decoder and wait for its first frame
    ///
    /// ffmpeg exits quickly when the source is unreachable, so requiring
    /// one frame within the open timeout gives honest open/not-open
    /// semantics over a pipe.
    async fn open(&self, url: &str) -> Result<FfmpegFrameSource> {
        let mut child = Command::new("ffmpeg")
            .args(preview_args(url, &self.settings))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SourceUnavailable(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SourceUnavailable("ffmpeg stdout unavailable".to_string()))?;

        let mut source = FfmpegFrameSource {
            child,
            stdout: BufReader::new(stdout),
            scratch: Vec::new(),
            pending: None,
            open: true,
        };

        match timeout(self.settings.open_timeout, source.read_frame()).await {
            Ok(Ok(first)) => {
                tracing::info!(url = %url, size = first.len(), "Preview decoder opened");
                source.pending = Some(first);
                Ok(source)
            }
            Ok(Err(e)) => {
                source.close().await;
                Err(Error::SourceUnavailable(format!("no frames: {}", e)))
            }
            Err(_) => {
                source.close().await;
                Err(Error::SourceUnavailable(format!(
                    "no frame within {:?}",
                    self.settings.open_timeout
                )))
            }
        }
    }
}

/// ffmpeg invocation for the preview pipeline
///
/// Single-frame input buffering and low-delay flags keep preview latency
/// down; scale/fps/quality are fixed by the filter chain so the session
/// only ever sees finished JPEGs.
fn preview_args(url: &str, settings: &CaptureSettings) -> Vec<String> {
    vec![
        "-fflags".to_string(),
        "+nobuffer+discardcorrupt".to_string(),
        "-flags".to_string(),
        "low_delay".to_string(),
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-i".to_string(),
        url.to_string(),
        "-f".to_string(),
        "mjpeg".to_string(),
        "-q:v".to_string(),
        settings.jpeg_qscale.to_string(),
        "-vf".to_string(),
        format!(
            "scale={}:{},fps={}",
            settings.width, settings.height, settings.source_fps
        ),
        "-an".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-".to_string(),
    ]
}
