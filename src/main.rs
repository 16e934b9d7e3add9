//! Camera Relay - entry point

use camrelay::agent_relay::AgentRelay;
use camrelay::camera_config::CameraConfigStore;
use camrelay::capture::CaptureSettings;
use camrelay::hub::{EventHub, PreviewHub};
use camrelay::media_store::{MediaStore, PUBLIC_MOUNT};
use camrelay::recorder::RecordingSupervisor;
use camrelay::state::{AppConfig, AppState};
use camrelay::stream_session::SessionSettings;
use camrelay::web_api;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camrelay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camera relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        recordings_dir = %config.recordings_dir.display(),
        upload_dir = %config.upload_dir.display(),
        agent_url = config.agent_url.as_deref().unwrap_or("<disabled>"),
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.recordings_dir).await?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    // Initialize components
    let camera = Arc::new(CameraConfigStore::new());
    let preview = Arc::new(PreviewHub::new("preview"));
    let events = Arc::new(EventHub::new("events"));

    let recorder = Arc::new(RecordingSupervisor::new(
        events.clone(),
        config.recordings_dir.clone(),
    ));
    tracing::info!("RecordingSupervisor initialized");

    let media = Arc::new(MediaStore::new(
        config.upload_dir.clone(),
        config.public_base_url.clone(),
    ));

    let agent = config.agent_url.clone().map(|url| {
        tracing::info!(agent_url = %url, "AgentRelay initialized");
        Arc::new(AgentRelay::new(url))
    });
    if agent.is_none() {
        tracing::info!("AgentRelay disabled (AGENT_URL not set)");
    }

    // Create application state
    let state = AppState {
        config: config.clone(),
        camera,
        preview,
        events,
        recorder,
        media,
        agent,
        capture: CaptureSettings::default(),
        session: SessionSettings::default(),
    };

    // Create router with upload serving
    let app = web_api::create_router(state)
        .nest_service(PUBLIC_MOUNT, ServeDir::new(&config.upload_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
