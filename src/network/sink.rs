//! Outbound stream connection

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::NetworkError;
use crate::events::{ConnectionStatus, EventBus};
use crate::network::stats::{Clock, StreamStats, SystemClock};

/// Owns the session's connection and its throughput window.
///
/// Writes block until the peer has taken all bytes, or until the socket's
/// write timeout (if any) expires.
pub struct NetworkSink<W: Write = TcpStream, C: Clock = SystemClock> {
    writer: Option<W>,
    peer: String,
    clock: C,
    stats: StreamStats,
    events: EventBus,
}

impl NetworkSink {
    /// Connect to `endpoint` (`host:port`), trying each resolved address
    pub fn connect(
        endpoint: &str,
        connect_timeout: Duration,
        write_timeout: Option<Duration>,
        events: EventBus,
    ) -> Result<Self, NetworkError> {
        let addrs: Vec<_> = endpoint
            .to_socket_addrs()
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", endpoint, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(NetworkError::InvalidAddress(endpoint.to_string()));
        }

        let mut last_error = None;
        for addr in addrs {
            let attempt = (|| -> std::io::Result<TcpStream> {
                let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
                socket.connect_timeout(&addr.into(), connect_timeout)?;
                socket.set_nodelay(true)?;
                socket.set_write_timeout(write_timeout)?;
                Ok(socket.into())
            })();

            match attempt {
                Ok(stream) => {
                    tracing::info!("Connected to {}", addr);
                    return Ok(Self::from_writer(stream, addr.to_string(), SystemClock, events));
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(NetworkError::ConnectionFailed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| endpoint.to_string()),
        ))
    }
}

impl<W: Write, C: Clock> NetworkSink<W, C> {
    /// Wrap an already-open writer and announce the connection
    pub fn from_writer(writer: W, peer: String, clock: C, events: EventBus) -> Self {
        let stats = StreamStats::new(clock.now());
        events.status(ConnectionStatus::Connected);
        Self {
            writer: Some(writer),
            peer,
            clock,
            stats,
            events,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Write one access unit and update the throughput window
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), NetworkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| NetworkError::SendFailed("connection closed".to_string()))?;
        writer
            .write_all(bytes)
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        if let Some(kbps) = self.stats.record(bytes.len(), self.clock.now()) {
            tracing::debug!("Streaming to {} at {:.1} kbps", self.peer, kbps);
            self.events.status(ConnectionStatus::Throughput { kbps });
        }
        Ok(())
    }

    /// Flush and drop the connection
    pub fn close(&mut self) -> Result<(), NetworkError> {
        match self.writer.take() {
            Some(mut writer) => writer
                .flush()
                .map_err(|e| NetworkError::SendFailed(e.to_string())),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}
