//! Control API: HTTP endpoints and a WebSocket telemetry feed

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{AppState, WebServer};
