//! Camera Relay Library
//!
//! Camera feed relay and recording supervisor for the vision assistant.
//!
//! ## Architecture (8 Components)
//!
//! 1. CameraConfigStore - shared camera connection settings
//! 2. Capture - ffmpeg-backed decode handles (MJPEG over a pipe)
//! 3. StreamSession - per-subscriber preview delivery loop
//! 4. BroadcastHub - subscriber fan-out per feed type
//! 5. RecordingSupervisor - external encoder lifecycle
//! 6. MediaStore - uploaded media storage
//! 7. AgentRelay - vision agent boundary
//! 8. WebAPI - HTTP/WebSocket endpoints
//!
//! ## Design Principles
//!
//! - One decode handle per preview session, released on every exit path
//! - Single active recording, terminate-then-kill shutdown
//! - Fan-out never blocks on one slow subscriber

pub mod agent_relay;
pub mod camera_config;
pub mod capture;
pub mod error;
pub mod hub;
pub mod media_store;
pub mod models;
pub mod recorder;
pub mod state;
pub mod stream_session;
pub mod web_api;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
