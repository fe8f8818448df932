//! WebSocket telemetry feed
//!
//! Pushes the latest [`TelemetrySnapshot`](crate::events::TelemetrySnapshot)
//! every 100 ms and accepts [`ControlMessage`] JSON from the client.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;

use crate::control::ToneSettings;
use crate::events::TelemetrySnapshot;
use crate::pipeline::PipelineState;
use crate::protocol::ControlMessage;
use crate::ui::server::AppState;

const PUSH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct TelemetryFrame {
    state: PipelineState,
    #[serde(flatten)]
    telemetry: TelemetrySnapshot,
    settings: ToneSettings,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let push_state = state.clone();
    let mut push = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PUSH_INTERVAL);
        loop {
            interval.tick().await;
            let frame = TelemetryFrame {
                state: push_state.session.get(),
                telemetry: push_state.telemetry.snapshot(),
                settings: push_state.controls.snapshot(),
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to serialize telemetry: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut inbox = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
                    Ok(control) => {
                        if !state.controls.apply(&control) {
                            tracing::warn!("Rejected control message: {:?}", control);
                        }
                    }
                    Err(e) => tracing::warn!("Invalid control message: {}", e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut push => inbox.abort(),
        _ = &mut inbox => push.abort(),
    }
    tracing::debug!("Telemetry client disconnected");
}
