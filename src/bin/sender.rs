//! Stream Sender Application
//!
//! Captures audio from an input device (or a test tone), shapes it and
//! streams ADTS-framed units to the selected server profile over TCP.
//!
//! Usage: `sender [host:port] [--tone]`

use anyhow::{Context, Result};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adts_tone_streamer::{
    audio::{list_input_devices, CaptureSource, FrameSource, TestToneSource},
    codec::{BufferedEncoder, RawPcmEncoder},
    config::AppConfig,
    events::{EventBus, StreamEvent, Telemetry},
    pipeline::StreamSession,
    ui::{AppState, WebServer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ADTS Tone Streamer");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let use_tone = args.iter().any(|a| a == "--tone");
    let target = args.iter().find(|a| !a.starts_with("--"));

    let mut app_config = AppConfig::load_or_default();
    app_config.ensure_profile();
    let mut config = app_config.stream_config();

    if let Some(target) = target {
        let (host, port) = target
            .rsplit_once(':')
            .with_context(|| format!("Expected host:port, got {}", target))?;
        config.server_address = host.to_string();
        config.server_port = port
            .parse()
            .with_context(|| format!("Invalid port in {}", target))?;
    } else if let Some(profile) = app_config.selected() {
        tracing::info!("Using server profile '{}'", profile.name);
    }

    // List available devices
    println!("\n=== Available Input Devices ===");
    for device in list_input_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let source: Box<dyn FrameSource> = if use_tone {
        tracing::info!("Streaming a 440 Hz test tone");
        Box::new(TestToneSource::new(config.sample_rate, config.channels, 440.0, 0.5))
    } else {
        let capture = CaptureSource::start(
            app_config.input_device.as_deref(),
            config.sample_rate,
            config.channels,
        )
        .context("Failed to start audio capture")?;
        tracing::info!("Capturing from {}", capture.device_name());
        Box::new(capture)
    };

    let events = EventBus::new();
    let telemetry = Telemetry::new();
    telemetry.follow(&events)?;

    let status_rx = events.subscribe();
    std::thread::Builder::new()
        .name("status-log".to_string())
        .spawn(move || {
            for event in status_rx.iter() {
                if let StreamEvent::Status(status) = event {
                    tracing::info!("Status: {}", status.to_string().replace('\n', " "));
                }
            }
        })?;

    let endpoint = config.endpoint();
    let session = StreamSession::start(
        config,
        source,
        |settings| BufferedEncoder::new(*settings, RawPcmEncoder::for_settings(settings)),
        events,
    )?;

    if app_config.ui.enabled {
        let state = AppState::new(
            session.controls().clone(),
            telemetry,
            session.state_cell(),
            endpoint,
        );
        WebServer::new(app_config.ui.clone(), state).start_background();
        tracing::info!(
            "Control API available at http://{}:{}",
            app_config.ui.bind_address,
            app_config.ui.http_port
        );
    }

    tracing::info!("Streaming - press Ctrl+C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Stopping");
                session.stop();
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if session.is_finished() {
                    break;
                }
            }
        }
    }

    let settings = session.controls().snapshot();
    let outcome = tokio::task::spawn_blocking(move || session.wait()).await?;

    // Persist the last volume, and the tone on the profile it was set for
    app_config.store_settings(settings.volume, settings.bass_db, settings.treble_db);
    if let Err(e) = app_config.save() {
        tracing::warn!("Failed to save config: {}", e);
    }

    let state = outcome?;
    tracing::info!("Session ended ({:?})", state);
    Ok(())
}
