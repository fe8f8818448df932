//! Bass/treble tone control

use crate::constants::{BASS_CENTER_HZ, PCM_FULL_SCALE, TREBLE_CENTER_HZ};
use crate::dsp::biquad::{Coefficients, FilterState, ShelfKind};
use crate::dsp::volume;

/// Tone band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Bass,
    Treble,
}

/// Low shelf followed by high shelf.
///
/// Both shelves see the interleaved sample stream as a single sequence, so
/// in stereo the left and right channels share one filter history.
#[derive(Debug, Clone)]
pub struct ToneFilter {
    sample_rate: u32,
    bass_hz: f32,
    treble_hz: f32,
    bass_db: f32,
    treble_db: f32,
    bass: FilterState,
    treble: FilterState,
}

impl ToneFilter {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_frequencies(sample_rate, BASS_CENTER_HZ, TREBLE_CENTER_HZ)
    }

    pub fn with_frequencies(sample_rate: u32, bass_hz: f32, treble_hz: f32) -> Self {
        Self {
            sample_rate,
            bass_hz,
            treble_hz,
            bass_db: 0.0,
            treble_db: 0.0,
            bass: FilterState::shelf(ShelfKind::Low, 0.0, bass_hz, sample_rate),
            treble: FilterState::shelf(ShelfKind::High, 0.0, treble_hz, sample_rate),
        }
    }

    /// Redesign both shelves. Running history is kept.
    pub fn set_gains(&mut self, bass_db: f32, treble_db: f32) {
        self.set_gain(Band::Bass, bass_db);
        self.set_gain(Band::Treble, treble_db);
    }

    /// Redesign one shelf if its gain changed
    pub fn set_gain(&mut self, band: Band, gain_db: f32) {
        match band {
            Band::Bass => {
                if gain_db != self.bass_db {
                    self.bass_db = gain_db;
                    self.bass.set_coefficients(Coefficients::shelf(
                        ShelfKind::Low,
                        gain_db,
                        self.bass_hz,
                        self.sample_rate,
                    ));
                }
            }
            Band::Treble => {
                if gain_db != self.treble_db {
                    self.treble_db = gain_db;
                    self.treble.set_coefficients(Coefficients::shelf(
                        ShelfKind::High,
                        gain_db,
                        self.treble_hz,
                        self.sample_rate,
                    ));
                }
            }
        }
    }

    pub fn gain(&self, band: Band) -> f32 {
        match band {
            Band::Bass => self.bass_db,
            Band::Treble => self.treble_db,
        }
    }

    /// Run one sample through bass then treble
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let sample = self.bass.process(sample);
        self.treble.process(sample)
    }
}

/// Tone filter then volume over a block of i16 samples, in place
pub fn shape_block(samples: &mut [i16], tone: &mut ToneFilter, volume: f32) {
    let gain = volume::curve(volume);
    for sample in samples.iter_mut() {
        let x = *sample as f32 / PCM_FULL_SCALE;
        let y = volume::scale(tone.process(x), gain);
        *sample = (y * PCM_FULL_SCALE) as i16;
    }
}
