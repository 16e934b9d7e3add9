//! Recording Supervisor - External Encoder Lifecycle
//!
//! ## Responsibilities
//!
//! - Launch the external capture/encode process for the configured source
//! - Enforce the single-active-recording invariant
//! - Poll process liveness and report unexpected exits
//! - Terminate-then-kill shutdown with output finalization
//!
//! State machine: Idle -> Starting -> Running -> Stopping -> Idle.
//! The state and the process handle are guarded by one mutex, so a
//! concurrent start can never silently replace a live handle. `stop`
//! holds the guard until the process is confirmed exited; it never
//! reports success while the encoder is still writing.

use crate::camera_config::CameraConfig;
use crate::error::{Error, Result};
use crate::hub::EventHub;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Recording container extension
const CONTAINER_EXT: &str = "mp4";

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Supervision timing knobs
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// Grace period between the quit request and a force kill
    pub stop_grace: Duration,
    /// Liveness poll / status ping cadence
    pub ping_interval: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            ping_interval: Duration::from_secs(1),
        }
    }
}

/// One active recording
struct RecordingJob {
    output_path: PathBuf,
    child: Child,
    started_at: DateTime<Utc>,
}

struct Inner {
    state: RecorderState,
    job: Option<RecordingJob>,
}

/// Accepted start request
#[derive(Debug, Clone)]
pub struct RecordingStarted {
    pub output_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Outcome of one liveness poll
enum Liveness {
    Running,
    Exited,
    NotRecording,
}

/// Supervises the external recording process
pub struct RecordingSupervisor {
    inner: Mutex<Inner>,
    events: Arc<EventHub>,
    recordings_dir: PathBuf,
    settings: RecorderSettings,
}

impl RecordingSupervisor {
    pub fn new(events: Arc<EventHub>, recordings_dir: PathBuf) -> Self {
        Self::with_settings(events, recordings_dir, RecorderSettings::default())
    }

    pub fn with_settings(
        events: Arc<EventHub>,
        recordings_dir: PathBuf,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RecorderState::Idle,
                job: None,
            }),
            events,
            recordings_dir,
            settings,
        }
    }

    /// Current supervisor state
    pub async fn state(&self) -> RecorderState {
        self.inner.lock().await.state
    }

    /// Start recording the configured source
    ///
    /// Rejected with `ConfigIncomplete` before any resource acquisition
    /// if the configuration is not ready, and with `AlreadyRecording`
    /// unless the supervisor is idle.
    pub async fn start(self: &Arc<Self>, config: &CameraConfig) -> Result<RecordingStarted> {
        let url = config.stream_url(true).ok_or(Error::ConfigIncomplete)?;
        let output_path = self.next_output_path();
        let mut command = Command::new("ffmpeg");
        command.args(encoder_args(&url, &output_path));
        self.start_with_command(command, output_path).await
    }

    /// Core of `start`, with the encoder invocation injectable
    async fn start_with_command(
        self: &Arc<Self>,
        mut command: Command,
        output_path: PathBuf,
    ) -> Result<RecordingStarted> {
        let mut inner = self.inner.lock().await;
        if inner.state != RecorderState::Idle {
            return Err(Error::AlreadyRecording);
        }
        inner.state = RecorderState::Starting;

        if let Some(dir) = output_path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                inner.state = RecorderState::Idle;
                return Err(e.into());
            }
        }

        // stdin stays open for the graceful quit request; stderr is kept
        // for diagnostics at teardown
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                inner.state = RecorderState::Idle;
                return Err(Error::EncoderLaunch(e.to_string()));
            }
        };

        let started_at = Utc::now();
        inner.job = Some(RecordingJob {
            output_path: output_path.clone(),
            child,
            started_at,
        });
        inner.state = RecorderState::Running;
        drop(inner);

        tracing::info!(file = %output_path.display(), "Recording started");
        self.events
            .broadcast(json!({
                "status": "recording_started",
                "file": output_path.to_string_lossy(),
            }))
            .await;

        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.monitor().await });

        Ok(RecordingStarted {
            output_path,
            started_at,
        })
    }

    /// Stop the active recording
    ///
    /// No-op success when idle. Otherwise requests a graceful encoder
    /// shutdown (so the container index gets written), waits out the
    /// grace period, force-kills if needed, and returns only once the
    /// process is confirmed exited.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut job) = inner.job.take() else {
            inner.state = RecorderState::Idle;
            return Ok(());
        };
        inner.state = RecorderState::Stopping;
        tracing::info!(file = %job.output_path.display(), "Stopping recording");

        if let Some(mut stdin) = job.child.stdin.take() {
            // ffmpeg finalizes the output on `q`
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.shutdown().await;
        }

        let status = match timeout(self.settings.stop_grace, job.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to wait for encoder exit");
                force_kill(&mut job.child).await
            }
            Err(_) => {
                tracing::warn!(
                    grace = ?self.settings.stop_grace,
                    "Encoder ignored graceful stop, killing"
                );
                force_kill(&mut job.child).await
            }
        };

        let diagnostics = drain_stderr(&mut job.child).await;
        if !diagnostics.is_empty() {
            tracing::debug!(output = %diagnostics, "Encoder diagnostics");
        }

        inner.state = RecorderState::Idle;
        drop(inner);

        tracing::info!(
            file = %job.output_path.display(),
            exit = ?status.and_then(|s| s.code()),
            duration_sec = (Utc::now() - job.started_at).num_seconds(),
            "Recording stopped"
        );
        self.events
            .broadcast(json!({
                "status": "recording_stopped",
                "file": job.output_path.to_string_lossy(),
            }))
            .await;
        Ok(())
    }

    /// Liveness/ping loop, one per accepted start
    async fn monitor(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.ping_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.check_liveness().await {
                Liveness::Running => {
                    self.events.broadcast(json!({ "status": "recording" })).await;
                }
                Liveness::Exited | Liveness::NotRecording => break,
            }
        }
    }

    /// Poll the encoder without blocking; report an unexpected exit
    async fn check_liveness(&self) -> Liveness {
        let mut inner = self.inner.lock().await;
        if inner.state != RecorderState::Running {
            return Liveness::NotRecording;
        }

        let exit_status = match inner.job.as_mut() {
            None => {
                inner.state = RecorderState::Idle;
                return Liveness::NotRecording;
            }
            Some(job) => match job.child.try_wait() {
                Ok(Some(status)) => Some(status),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to poll recording process");
                    None
                }
            },
        };

        let Some(status) = exit_status else {
            return Liveness::Running;
        };

        let Some(mut job) = inner.job.take() else {
            return Liveness::Running;
        };
        inner.state = RecorderState::Idle;
        drop(inner);

        let diagnostics = drain_stderr(&mut job.child).await;
        tracing::warn!(
            file = %job.output_path.display(),
            exit = ?status.code(),
            duration_sec = (Utc::now() - job.started_at).num_seconds(),
            output = %diagnostics,
            "Recording process exited unexpectedly"
        );
        self.events
            .broadcast(json!({
                "status": "recording_failed",
                "file": job.output_path.to_string_lossy(),
                "exit_code": status.code(),
            }))
            .await;
        Liveness::Exited
    }

    /// Timestamped output path under the recordings directory
    fn next_output_path(&self) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        self.recordings_dir
            .join(format!("recording_{}.{}", timestamp, CONTAINER_EXT))
    }
}

async fn force_kill(child: &mut Child) -> Option<std::process::ExitStatus> {
    if let Err(e) = child.kill().await {
        tracing::error!(error = %e, "Failed to kill encoder");
    }
    child.try_wait().ok().flatten()
}

/// Read whatever diagnostic output the exited encoder left behind
async fn drain_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::new();
    };
    let mut buf = String::new();
    let _ = timeout(Duration::from_secs(2), stderr.read_to_string(&mut buf)).await;
    buf.trim().to_string()
}

/// Encoder invocation for one recording
///
/// RTSP over TCP in, H.264 with the fast lossy preset out, fixed scale
/// and frame rate. `-nostats` keeps the stderr pipe from filling up over
/// a long recording.
fn encoder_args(url: &str, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-f",
        "rtsp",
        "-rtsp_transport",
        "tcp",
        "-i",
        url,
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-crf",
        "23",
        "-vf",
        "scale=1200:720",
        "-r",
        "30",
        "-async",
        "1",
        "-nostats",
        "-loglevel",
        "error",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(output.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::sleep;

    async fn test_supervisor(
        dir: &Path,
    ) -> (Arc<RecordingSupervisor>, UnboundedReceiver<serde_json::Value>) {
        let events = Arc::new(EventHub::new("events"));
        let supervisor = Arc::new(RecordingSupervisor::with_settings(
            events.clone(),
            dir.to_path_buf(),
            RecorderSettings {
                stop_grace: Duration::from_millis(200),
                ping_interval: Duration::from_millis(20),
            },
        ));
        let (_id, rx) = events.register().await;
        (supervisor, rx)
    }

    fn long_running_command() -> Command {
        let mut command = Command::new("sleep");
        command.arg("30");
        command
    }

    async fn next_status(rx: &mut UnboundedReceiver<serde_json::Value>, wanted: &str) -> serde_json::Value {
        loop {
            let event = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event timeout")
                .expect("event channel closed");
            if event["status"] == wanted {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_start_requires_complete_config() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path()).await;

        let err = supervisor.start(&CameraConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::ConfigIncomplete));
        assert_eq!(supervisor.state().await, RecorderState::Idle);
        // No output directory or file was created for the rejected start
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_second_start_rejected_until_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path()).await;

        supervisor
            .start_with_command(long_running_command(), dir.path().join("one.mp4"))
            .await
            .unwrap();
        assert_eq!(supervisor.state().await, RecorderState::Running);

        let err = supervisor
            .start_with_command(long_running_command(), dir.path().join("two.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRecording));

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state().await, RecorderState::Idle);

        // Idle again, a new recording is accepted
        supervisor
            .start_with_command(long_running_command(), dir.path().join("three.mp4"))
            .await
            .unwrap();
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path()).await;

        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state().await, RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_stop_confirms_exit_and_emits_events() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, mut rx) = test_supervisor(dir.path()).await;

        // sleep ignores the quit request, so this exercises the kill path
        supervisor
            .start_with_command(long_running_command(), dir.path().join("out.mp4"))
            .await
            .unwrap();
        let started = next_status(&mut rx, "recording_started").await;
        assert!(started["file"].as_str().unwrap().ends_with("out.mp4"));

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state().await, RecorderState::Idle);
        next_status(&mut rx, "recording_stopped").await;
    }

    #[tokio::test]
    async fn test_unexpected_exit_forces_idle_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, mut rx) = test_supervisor(dir.path()).await;

        // Exits immediately, as a crashed encoder would
        supervisor
            .start_with_command(Command::new("true"), dir.path().join("out.mp4"))
            .await
            .unwrap();

        let failed = next_status(&mut rx, "recording_failed").await;
        assert!(failed["file"].as_str().unwrap().ends_with("out.mp4"));
        assert_eq!(supervisor.state().await, RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_liveness_pings_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, mut rx) = test_supervisor(dir.path()).await;

        supervisor
            .start_with_command(long_running_command(), dir.path().join("out.mp4"))
            .await
            .unwrap();
        next_status(&mut rx, "recording").await;
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_output_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path()).await;

        let path = supervisor.next_output_path();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".mp4"));

        let stamp = name
            .trim_start_matches("recording_")
            .trim_end_matches(".mp4");
        assert!(NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").is_ok());
    }

    #[test]
    fn test_encoder_args_shape() {
        let args = encoder_args("rtsp://cam/stream", Path::new("recordings/out.mp4"));

        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input_pos + 1], "rtsp://cam/stream");
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"ultrafast".to_string()));
        assert!(args.contains(&"scale=1200:720".to_string()));
        assert!(args.contains(&"tcp".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("recordings/out.mp4"));
    }

    #[tokio::test]
    async fn test_stop_waits_out_stuck_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = test_supervisor(dir.path()).await;

        supervisor
            .start_with_command(long_running_command(), dir.path().join("out.mp4"))
            .await
            .unwrap();

        let begun = std::time::Instant::now();
        supervisor.stop().await.unwrap();
        // The kill path only engages after the grace period
        assert!(begun.elapsed() >= Duration::from_millis(200));
        assert_eq!(supervisor.state().await, RecorderState::Idle);

        // Give the monitor task a tick to observe the idle state and wind down
        sleep(Duration::from_millis(50)).await;
    }
}
