//! Control API server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::control::SharedControls;
use crate::error::Result;
use crate::events::Telemetry;
use crate::pipeline::StateCell;
use crate::ui::{handlers, websocket};

/// Shared state passed to all request handlers
pub struct AppState {
    pub controls: SharedControls,
    pub telemetry: Telemetry,
    pub session: StateCell,
    pub endpoint: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        controls: SharedControls,
        telemetry: Telemetry,
        session: StateCell,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            controls,
            telemetry,
            session,
            endpoint: endpoint.into(),
            started_at: Instant::now(),
        }
    }
}

pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/devices", get(handlers::get_devices))
            .route("/api/volume", post(handlers::set_volume))
            .route("/api/tone", post(handlers::set_tone))
            .route("/api/stop", post(handlers::stop))
            .route("/ws", get(websocket::ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until the listener fails
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self.config.socket_addr()?;
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Control API listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Spawn the server on the current tokio runtime
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Control API stopped: {}", e);
            }
        })
    }
}
