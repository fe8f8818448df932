//! Stream Receiver Application
//!
//! Accepts the sender's TCP stream, splits it into access units using the
//! ADTS frame length alone and reports what arrives. Optionally appends the
//! raw stream to a file.
//!
//! Usage: `receiver [port] [--out path.aac]`

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adts_tone_streamer::{
    constants::DEFAULT_SERVER_PORT,
    network::StreamStats,
    protocol::{adts, AdtsReader},
};

/// Per-connection receive statistics
#[derive(Debug, Default)]
struct ReceiverStats {
    frames: u64,
    bytes: u64,
    payload_bytes: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ADTS Stream Receiver");

    let mut port = DEFAULT_SERVER_PORT;
    let mut output: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--out" {
            output = Some(args.next().context("--out needs a path")?.into());
        } else {
            port = arg.parse().with_context(|| format!("Invalid port: {}", arg))?;
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);
    tracing::info!("Waiting for streams...");

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("Stream from {}", peer);
        let output = output.clone();
        tokio::spawn(async move {
            match receive(stream, output).await {
                Ok(stats) => tracing::info!(
                    "Stream from {} ended: {} frames, {} bytes ({} payload)",
                    peer,
                    stats.frames,
                    stats.bytes,
                    stats.payload_bytes
                ),
                Err(e) => tracing::warn!("Stream from {} aborted: {:#}", peer, e),
            }
        });
    }
}

async fn receive(mut stream: TcpStream, output: Option<PathBuf>) -> Result<ReceiverStats> {
    let mut file = match output {
        Some(path) => Some(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => None,
    };

    let mut reader = AdtsReader::new();
    let mut window = StreamStats::new(Instant::now());
    let mut stats = ReceiverStats::default();
    let mut buf = vec![0u8; 16 * 1024];
    let mut announced = false;

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        reader.push(&buf[..n]);

        while let Some((header, unit)) = reader.next_frame()? {
            if !announced {
                tracing::info!(
                    "Stream format: profile {}, {} Hz (index {}), {} channel(s)",
                    header.profile,
                    header
                        .sample_rate()
                        .map_or_else(|| "unknown".to_string(), |r| r.to_string()),
                    header.sample_rate_index,
                    header.channels
                );
                announced = true;
            }

            stats.frames += 1;
            stats.bytes += unit.len() as u64;
            stats.payload_bytes += (unit.len() - adts::HEADER_LEN) as u64;

            if let Some(file) = file.as_mut() {
                file.write_all(&unit).await?;
            }
            if let Some(kbps) = window.record(unit.len(), Instant::now()) {
                tracing::info!("{} frames, {:.1} kbps", stats.frames, kbps);
            }
        }
    }

    if reader.buffered() > 0 {
        tracing::warn!("{} trailing bytes did not form a frame", reader.buffered());
    }
    if let Some(file) = file.as_mut() {
        file.flush().await?;
    }
    Ok(stats)
}
