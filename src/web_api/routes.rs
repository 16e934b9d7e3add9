//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Multipart, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};

use crate::agent_relay::ChatMessage;
use crate::camera_config::CameraConfig;
use crate::capture::FfmpegOpener;
use crate::error::{Error, Result};
use crate::models::{StatusResponse, UploadResponse};
use crate::state::AppState;
use crate::stream_session::StreamSession;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Camera
        .route("/api/camera/config", post(set_camera_config))
        .route("/api/camera/feed", get(camera_feed_handler))
        // Recording
        .route("/api/recording/start", get(recording_start_handler))
        .route("/api/recording/stop", post(stop_recording))
        // Media
        .route("/api/media/upload", post(upload_media))
        // Chat relay
        .route("/api/chat", post(chat))
        .route("/api/messages", post(broadcast_message))
        // Event channel
        .route("/api/ws", get(events_ws_handler))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

/// Replace the camera configuration wholesale
async fn set_camera_config(
    State(state): State<AppState>,
    Json(config): Json<CameraConfig>,
) -> impl IntoResponse {
    state.camera.replace(config).await;
    Json(StatusResponse::with_message(
        "success",
        "Camera configuration set successfully",
    ))
}

/// WebSocket upgrade for the live preview feed
async fn camera_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_camera_feed(socket, state))
}

/// One preview subscriber: register with the hub, run a dedicated stream
/// session, forward frames until either side goes away
async fn handle_camera_feed(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let config = state.camera.snapshot().await;
    let Some(url) = config.stream_url(false) else {
        let _ = sender
            .send(Message::Text(
                json!({"error": "Camera configuration incomplete"}).to_string(),
            ))
            .await;
        return;
    };

    let (id, mut rx) = state.preview.register().await;

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let session = StreamSession::new(
        FfmpegOpener::new(state.capture.clone()),
        state.preview.clone(),
        state.session.clone(),
    );
    let mut session_task = tokio::spawn(session.run(id, url));

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    // First finisher wins: client close, delivery failure, or session end
    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut session_task => {}
        _ = &mut recv_task => {}
    }

    // The session loop observes the deregistration and releases its handle
    state.preview.unregister(&id).await;
}

// ========================================
// Recording Handlers
// ========================================

/// WebSocket upgrade for recording control + status stream
async fn recording_start_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_recording_start(socket, state))
}

/// Start a recording and stream status events to the observer
///
/// The recording itself outlives this socket: dropping the observer does
/// not stop the encoder, only `/api/recording/stop` does.
async fn handle_recording_start(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let config = state.camera.snapshot().await;
    let started = match state.recorder.start(&config).await {
        Ok(started) => started,
        Err(e) => {
            let _ = sender
                .send(Message::Text(json!({"error": e.to_string()}).to_string()))
                .await;
            return;
        }
    };

    let (id, mut rx) = state.events.register().await;
    let _ = sender
        .send(Message::Text(
            json!({
                "status": "recording_started",
                "file": started.output_path.to_string_lossy(),
            })
            .to_string(),
        ))
        .await;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(value) => {
                    if sender.send(Message::Text(value.to_string())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }

    state.events.unregister(&id).await;
}

/// Stop the active recording; success when already idle
async fn stop_recording(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    state.recorder.stop().await?;
    Ok(Json(StatusResponse::success()))
}

// ========================================
// Media Handlers
// ========================================

/// Store an uploaded file and return its path and public URL
async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("file field has no filename".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::Validation(e.to_string()))?;

        let stored = state.media.save(&file_name, &data).await?;
        return Ok(Json(UploadResponse {
            status: "success".to_string(),
            file_path: stored.file_path.to_string_lossy().into_owned(),
            file_url: stored.file_url,
        }));
    }

    Err(Error::Validation("missing file field".to_string()))
}

// ========================================
// Chat Relay Handlers
// ========================================

/// Hand the conversation to the vision agent in the background
async fn chat(
    State(state): State<AppState>,
    Json(messages): Json<Vec<ChatMessage>>,
) -> Result<Json<StatusResponse>> {
    let Some(agent) = state.agent.clone() else {
        return Err(Error::Internal("AGENT_URL is not configured".to_string()));
    };

    tokio::spawn(async move {
        if let Err(e) = agent.forward(messages).await {
            tracing::error!(error = %e, "Agent forward failed");
        }
    });

    Ok(Json(StatusResponse::with_message(
        "Processing started",
        "Your messages are being processed in the background",
    )))
}

/// Broadcast a structured payload to every event channel listener
///
/// This is the callback the agent (or any internal worker) uses to push
/// updates to connected frontends.
async fn broadcast_message(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.events.broadcast(payload).await;
    Json(StatusResponse::success())
}

// ========================================
// Event Channel Handler
// ========================================

/// WebSocket upgrade for the generic event channel
async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_ws(socket, state))
}

/// Handle one event channel connection
async fn handle_events_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut rx) = state.events.register().await;

    let mut send_task = tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if sender.send(Message::Text(value.to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
    }

    state.events.unregister(&id).await;
}
