//! Cross-thread control of a running session
//!
//! Volume, bass and treble may change at any moment from the host while the
//! streaming worker runs. Writers replace the whole [`ToneSettings`] under a
//! lock and bump a generation counter; the worker checks the counter once per
//! iteration and copies a fresh snapshot only when it moved, so it never sees
//! a half-applied update and never blocks on the hot path otherwise.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::StreamConfig;
use crate::protocol::ControlMessage;

/// The host-tunable part of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneSettings {
    pub volume: f32,
    pub bass_db: f32,
    pub treble_db: f32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            bass_db: 0.0,
            treble_db: 0.0,
        }
    }
}

impl From<&StreamConfig> for ToneSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            volume: config.volume,
            bass_db: config.bass_db,
            treble_db: config.treble_db,
        }
    }
}

struct Inner {
    settings: RwLock<ToneSettings>,
    generation: AtomicU64,
    stop_requested: AtomicBool,
}

/// Handle shared between the host and the streaming worker
#[derive(Clone)]
pub struct SharedControls {
    inner: Arc<Inner>,
}

impl SharedControls {
    pub fn new(settings: ToneSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: RwLock::new(settings),
                generation: AtomicU64::new(0),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_volume(&self, volume: f32) -> bool {
        if !volume.is_finite() || volume < 0.0 {
            tracing::warn!("Ignoring invalid volume {}", volume);
            return false;
        }
        self.update(|s| s.volume = volume);
        true
    }

    pub fn set_tone(&self, bass_db: f32, treble_db: f32) -> bool {
        if !bass_db.is_finite() || !treble_db.is_finite() {
            tracing::warn!("Ignoring invalid tone {} / {} dB", bass_db, treble_db);
            return false;
        }
        self.update(|s| {
            s.bass_db = bass_db;
            s.treble_db = treble_db;
        });
        true
    }

    fn update(&self, apply: impl FnOnce(&mut ToneSettings)) {
        let mut settings = self.inner.settings.write();
        apply(&mut settings);
        self.inner.generation.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> ToneSettings {
        *self.inner.settings.read()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// The current settings if anything changed since `seen`, which is
    /// advanced to the observed generation.
    pub fn changed_since(&self, seen: &mut u64) -> Option<ToneSettings> {
        let generation = self.generation();
        if generation == *seen {
            return None;
        }
        *seen = generation;
        Some(self.snapshot())
    }

    /// Ask the worker to stop at the end of its current iteration
    pub fn request_stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    /// Apply a control message. Returns false if it was rejected.
    pub fn apply(&self, message: &ControlMessage) -> bool {
        match *message {
            ControlMessage::SetVolume { volume } => self.set_volume(volume),
            ControlMessage::SetTone { bass_db, treble_db } => self.set_tone(bass_db, treble_db),
            ControlMessage::Stop => {
                self.request_stop();
                true
            }
        }
    }
}

impl Default for SharedControls {
    fn default() -> Self {
        Self::new(ToneSettings::default())
    }
}
