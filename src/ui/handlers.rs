//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audio::device::list_input_devices;
use crate::control::ToneSettings;
use crate::pipeline::PipelineState;
use crate::protocol::AudioDeviceInfo;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Session status
#[derive(Serialize)]
pub struct SessionStatus {
    pub state: PipelineState,
    pub endpoint: String,
    /// Same text the stats readout shows, e.g. `"Connected\n128 kbps"`
    pub status: String,
    pub kbps: Option<f64>,
    pub level: f32,
    pub settings: ToneSettings,
    pub uptime_seconds: u64,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SessionStatus>> {
    let telemetry = state.telemetry.snapshot();
    let status = SessionStatus {
        state: state.session.get(),
        endpoint: state.endpoint.clone(),
        status: telemetry.status,
        kbps: telemetry.kbps,
        level: telemetry.level,
        settings: state.controls.snapshot(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

/// Get available capture devices
pub async fn get_devices() -> (StatusCode, Json<ApiResponse<Vec<AudioDeviceInfo>>>) {
    // Device probing blocks on the audio host
    match tokio::task::spawn_blocking(list_input_devices).await {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::ok(devices))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

#[derive(Deserialize)]
pub struct VolumeRequest {
    pub volume: f32,
}

pub async fn set_volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolumeRequest>,
) -> (StatusCode, Json<ApiResponse<ToneSettings>>) {
    if state.controls.set_volume(req.volume) {
        (StatusCode::OK, Json(ApiResponse::ok(state.controls.snapshot())))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid volume: {}", req.volume))),
        )
    }
}

#[derive(Deserialize)]
pub struct ToneRequest {
    pub bass_db: f32,
    pub treble_db: f32,
}

pub async fn set_tone(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ToneRequest>,
) -> (StatusCode, Json<ApiResponse<ToneSettings>>) {
    if state.controls.set_tone(req.bass_db, req.treble_db) {
        (StatusCode::OK, Json(ApiResponse::ok(state.controls.snapshot())))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Tone gains must be finite")),
        )
    }
}

/// Stop the running session
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<ApiResponse<PipelineState>> {
    state.controls.request_stop();
    Json(ApiResponse::ok(state.session.get()))
}
