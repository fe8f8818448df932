//! Configuration types
//!
//! `StreamConfig` describes one streaming session. `AppConfig` is the
//! persisted application state (server profiles, last volume, control API
//! settings) stored as TOML in the platform config directory.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::adts;

/// Channel layout of the captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChannelLayout {
    Mono,
    #[default]
    Stereo,
}

impl ChannelLayout {
    pub fn channels(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Parameters for one streaming session.
///
/// Everything except `volume`, `bass_db` and `treble_db` is fixed once the
/// session starts; those three only seed the session's `SharedControls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub server_address: String,
    pub server_port: u16,
    pub sample_rate: u32,
    pub channels: u16,
    /// Target encoder bit rate in bits per second
    pub bit_rate: u32,
    pub volume: f32,
    pub bass_db: f32,
    pub treble_db: f32,
    pub bass_frequency: f32,
    pub treble_frequency: f32,
    /// Bytes of PCM pulled from the source per loop iteration
    pub frame_bytes: usize,
    pub connect_timeout_ms: u64,
    /// Zero disables the write timeout
    pub write_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bit_rate: DEFAULT_BITRATE,
            volume: 1.0,
            bass_db: 0.0,
            treble_db: 0.0,
            bass_frequency: BASS_CENTER_HZ,
            treble_frequency: TREBLE_CENTER_HZ,
            frame_bytes: DEFAULT_FRAME_BYTES,
            connect_timeout_ms: 5000,
            write_timeout_ms: 0,
        }
    }
}

impl StreamConfig {
    /// Check the fixed session parameters.
    ///
    /// An unlisted sample rate is accepted: the ADTS header falls back to the
    /// 44.1 kHz index while the encoder still runs at the requested rate.
    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.channels) {
            return Err(Error::Config(format!(
                "Unsupported channel count: {}",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("Sample rate must be non-zero".to_string()));
        }
        if self.frame_bytes == 0 || self.frame_bytes % 2 != 0 {
            return Err(Error::Config(format!(
                "Frame size must be a non-zero even byte count, got {}",
                self.frame_bytes
            )));
        }
        if self.server_address.is_empty() {
            return Err(Error::Config("Server address is empty".to_string()));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::Config(format!("Invalid volume: {}", self.volume)));
        }
        if !self.bass_db.is_finite() || !self.treble_db.is_finite() {
            return Err(Error::Config(format!(
                "Tone gains must be finite, got {} / {} dB",
                self.bass_db, self.treble_db
            )));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        for (band, freq) in [("Bass", self.bass_frequency), ("Treble", self.treble_frequency)] {
            if !(freq > 0.0 && freq < nyquist) {
                return Err(Error::Config(format!(
                    "{} frequency {} Hz must lie between 0 and {} Hz",
                    band, freq, nyquist
                )));
            }
        }
        if !adts::is_listed_sample_rate(self.sample_rate) {
            tracing::warn!(
                "Sample rate {} Hz has no ADTS index mapping; headers will advertise 44100 Hz",
                self.sample_rate
            );
        }
        Ok(())
    }

    /// `address:port` as given by the user
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server_address, self.server_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    /// Duration of one source frame
    pub fn frame_duration(&self) -> Duration {
        let samples = self.frame_bytes / 2 / self.channels.max(1) as usize;
        Duration::from_secs_f64(samples as f64 / self.sample_rate.max(1) as f64)
    }
}

/// A saved streaming destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    #[serde(default)]
    pub bass_db: f32,
    #[serde(default)]
    pub treble_db: f32,
}

impl Default for ServerProfile {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "Default".to_string(),
            address: "192.168.1.100".to_string(),
            port: DEFAULT_SERVER_PORT,
            bitrate: DEFAULT_BITRATE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_layout: ChannelLayout::Stereo,
            bass_db: 0.0,
            treble_db: 0.0,
        }
    }
}

/// Control API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl UiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid UI bind address: {}", e)))
    }
}

/// Persisted application state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub selected_profile: Option<Uuid>,
    pub stream_volume: f32,
    /// Capture device id as reported by `audio::device::list_input_devices`
    pub input_device: Option<String>,
    // Tables last so the TOML serializer never emits a value after a table
    pub ui: UiConfig,
    pub profiles: Vec<ServerProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let profile = ServerProfile::default();
        Self {
            selected_profile: Some(profile.id),
            profiles: vec![profile],
            stream_volume: 1.0,
            input_device: None,
            ui: UiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Location of the config file, if the platform has a config directory
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("net", "adts-tone-streamer", "adts-tone-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the config file, falling back to defaults when it is missing or
    /// unreadable.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(text) => match Self::from_toml(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring invalid config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.ensure_profile();
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path()
            .ok_or_else(|| Error::Config("No config directory available".to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.to_toml()?)?;
        Ok(())
    }

    /// Guarantee at least one profile and a valid selection
    pub fn ensure_profile(&mut self) {
        if self.profiles.is_empty() {
            self.profiles.push(ServerProfile::default());
        }
        let selected_exists = self
            .selected_profile
            .map(|id| self.profiles.iter().any(|p| p.id == id))
            .unwrap_or(false);
        if !selected_exists {
            self.selected_profile = self.profiles.first().map(|p| p.id);
        }
    }

    pub fn selected(&self) -> Option<&ServerProfile> {
        self.selected_profile
            .and_then(|id| self.profiles.iter().find(|p| p.id == id))
            .or_else(|| self.profiles.first())
    }

    pub fn selected_mut(&mut self) -> Option<&mut ServerProfile> {
        let index = self
            .selected_profile
            .and_then(|id| self.profiles.iter().position(|p| p.id == id))
            .unwrap_or(0);
        self.profiles.get_mut(index)
    }

    /// Remember the session's last volume, and its tone on the selected
    /// profile
    pub fn store_settings(&mut self, volume: f32, bass_db: f32, treble_db: f32) {
        self.stream_volume = volume;
        if let Some(profile) = self.selected_mut() {
            profile.bass_db = bass_db;
            profile.treble_db = treble_db;
        }
    }

    /// Replace the profile list, keeping the selection when the selected
    /// profile survives and otherwise selecting the first one.
    pub fn update_profiles(&mut self, profiles: Vec<ServerProfile>) {
        self.profiles = profiles;
        self.ensure_profile();
    }

    /// Build the session parameters for the selected profile
    pub fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig {
            volume: self.stream_volume,
            ..StreamConfig::default()
        };
        if let Some(profile) = self.selected() {
            config.server_address = profile.address.clone();
            config.server_port = profile.port;
            config.bit_rate = profile.bitrate;
            config.sample_rate = profile.sample_rate;
            config.channels = profile.channel_layout.channels();
            config.bass_db = profile.bass_db;
            config.treble_db = profile.treble_db;
        }
        config
    }
}
