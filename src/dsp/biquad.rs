//! Biquad shelving filters
//!
//! Coefficients follow the RBJ audio-EQ cookbook shelf designs with a fixed
//! slope of Q = 0.707, normalized so that a0 = 1. The filter runs in direct
//! form I:
//!
//! ```text
//! y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
//! ```

use std::f64::consts::PI;

use crate::constants::SHELF_Q;

/// Shelf shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfKind {
    /// Boosts or cuts below the corner frequency
    Low,
    /// Boosts or cuts above the corner frequency
    High,
}

/// Normalized biquad coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Coefficients {
    /// Pass-through
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Shelf design for `gain_db` at `center_hz`.
    ///
    /// At 0 dB (A = 1) numerator and denominator coincide and the filter is
    /// the identity.
    pub fn shelf(kind: ShelfKind, gain_db: f32, center_hz: f32, sample_rate: u32) -> Self {
        let a = 10f64.powf(gain_db as f64 / 40.0);
        let w0 = 2.0 * PI * center_hz as f64 / sample_rate as f64;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * SHELF_Q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let (a0, a1, a2, b0, b1, b2) = match kind {
            ShelfKind::Low => (
                (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            ),
            ShelfKind::High => (
                (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            ),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f32, sample_rate: u32) -> f64 {
        let w = 2.0 * PI * freq_hz as f64 / sample_rate as f64;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}

/// One biquad section: coefficients plus two samples of input and output
/// history.
#[derive(Debug, Clone)]
pub struct FilterState {
    coeffs: Coefficients,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(Coefficients::IDENTITY)
    }
}

impl FilterState {
    pub fn new(coeffs: Coefficients) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn shelf(kind: ShelfKind, gain_db: f32, center_hz: f32, sample_rate: u32) -> Self {
        Self::new(Coefficients::shelf(kind, gain_db, center_hz, sample_rate))
    }

    /// Swap coefficients. History is kept, so the new response applies to
    /// the running signal from the next sample on.
    pub fn set_coefficients(&mut self, coeffs: Coefficients) {
        self.coeffs = coeffs;
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coeffs
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let x = input as f64;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn db(gain: f64) -> f64 {
        20.0 * gain.log10()
    }

    #[test]
    fn test_zero_gain_coefficients_are_identity_shaped() {
        for kind in [ShelfKind::Low, ShelfKind::High] {
            let c = Coefficients::shelf(kind, 0.0, 200.0, 44100);
            assert!((c.b0 - 1.0).abs() < 1e-12);
            assert!((c.b1 - c.a1).abs() < 1e-12);
            assert!((c.b2 - c.a2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_low_shelf_boosts_bass() {
        let c = Coefficients::shelf(ShelfKind::Low, 6.0, 200.0, 48000);
        assert!((db(c.magnitude_at(20.0, 48000)) - 6.0).abs() < 0.2);
        assert!(db(c.magnitude_at(10_000.0, 48000)).abs() < 0.2);
    }

    #[test]
    fn test_high_shelf_cuts_treble() {
        let c = Coefficients::shelf(ShelfKind::High, -9.0, 3000.0, 48000);
        assert!((db(c.magnitude_at(18_000.0, 48000)) + 9.0).abs() < 0.5);
        assert!(db(c.magnitude_at(50.0, 48000)).abs() < 0.2);
    }

    #[test]
    fn test_dc_gain_of_low_shelf() {
        let mut filter = FilterState::shelf(ShelfKind::Low, 12.0, 200.0, 44100);
        let mut out = 0.0;
        for _ in 0..20_000 {
            out = filter.process(0.1);
        }
        // 12 dB is a factor of ~3.98
        assert!((out - 0.398).abs() < 0.01, "settled at {}", out);
    }

    #[test]
    fn test_coefficient_swap_keeps_history() {
        let mut filter = FilterState::shelf(ShelfKind::Low, 6.0, 200.0, 44100);
        filter.process(0.5);
        filter.process(-0.25);
        filter.set_coefficients(Coefficients::IDENTITY);
        assert_eq!(filter.x1, -0.25);
        assert_eq!(filter.x2, 0.5);
        assert_eq!(filter.process(0.125), 0.125);
    }

    proptest! {
        #[test]
        fn zero_gain_shelf_is_identity(
            low in any::<bool>(),
            // Corner as a fraction of the sample rate, kept below Nyquist
            fraction in 0.0005f32..0.45,
            rate in prop::sample::select(vec![22050u32, 32000, 44100, 48000, 96000]),
            input in prop::collection::vec(-1.0f32..=1.0, 1..512),
        ) {
            let kind = if low { ShelfKind::Low } else { ShelfKind::High };
            let center = fraction * rate as f32;
            let mut filter = FilterState::shelf(kind, 0.0, center, rate);
            for &x in &input {
                let y = filter.process(x);
                prop_assert!((y - x).abs() < 1e-5, "{} -> {}", x, y);
            }
        }
    }
}
