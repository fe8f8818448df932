//! Telemetry events
//!
//! The worker publishes connection status and per-frame loudness on an
//! [`EventBus`]. Any number of observers may subscribe; slow observers lose
//! events instead of stalling the stream.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// Events buffered per observer
const OBSERVER_QUEUE_DEPTH: usize = 256;

/// Connection state as shown to the user
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    /// Connected, with the throughput of the last stats window
    Throughput { kbps: f64 },
    Error(String),
    NotConnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Throughput { kbps } => write!(f, "Connected\n{} kbps", *kbps as u64),
            ConnectionStatus::Error(detail) => write!(f, "Error: {}", detail),
            ConnectionStatus::NotConnected => write!(f, "Not Connected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Status(ConnectionStatus),
    /// Normalized RMS of the last input frame
    Level(f32),
}

/// Fan-out of stream events to observers
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<Mutex<Vec<Sender<StreamEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = bounded(OBSERVER_QUEUE_DEPTH);
        self.observers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: StreamEvent) {
        let mut observers = self.observers.lock();
        observers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn status(&self, status: ConnectionStatus) {
        self.publish(StreamEvent::Status(status));
    }

    pub fn level(&self, level: f32) {
        self.publish(StreamEvent::Level(level));
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

/// Latest telemetry values, for pollers such as the control API
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub status: String,
    pub kbps: Option<f64>,
    pub level: f32,
    pub updated_at: DateTime<Utc>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::NotConnected.to_string(),
            kbps: None,
            level: 0.0,
            updated_at: Utc::now(),
        }
    }
}

/// Keeps the most recent telemetry from an event bus
#[derive(Clone, Default)]
pub struct Telemetry {
    latest: Arc<RwLock<TelemetrySnapshot>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.latest.read().clone()
    }

    pub fn record(&self, event: &StreamEvent) {
        let mut latest = self.latest.write();
        match event {
            StreamEvent::Status(status) => {
                let kbps = match status {
                    ConnectionStatus::Throughput { kbps } => Some(*kbps),
                    ConnectionStatus::Connected => latest.kbps,
                    _ => None,
                };
                latest.status = status.to_string();
                latest.kbps = kbps;
            }
            StreamEvent::Level(level) => latest.level = *level,
        }
        latest.updated_at = Utc::now();
    }

    /// Follow `bus` on a background thread until the bus is dropped
    pub fn follow(&self, bus: &EventBus) -> std::io::Result<JoinHandle<()>> {
        let rx = bus.subscribe();
        let telemetry = self.clone();
        thread::Builder::new()
            .name("telemetry".to_string())
            .spawn(move || {
                for event in rx.iter() {
                    telemetry.record(&event);
                }
            })
    }
}
