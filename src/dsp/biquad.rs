//! Biquad Filter Implementation (IIR 2nd Order)
//!
//! RBJ cookbook designs for the shelving and pass filters used by the masking
//! chain. Coefficient updates never touch the delay state, so a shelf can be
//! re-tuned every sub-block while music is flowing through it.

use rustfft::num_complex::Complex;
use std::f32::consts::PI;

/// Biquad filter implementation (transposed direct form II)
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// Identity filter
    pub fn new() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;

        // Anti-denormal: tiny DC offset
        self.z1 = input * self.a1 + self.z2 - self.b1 * out + 1e-25;
        self.z2 = input * self.a2 - self.b2 * out + 1e-25;

        out
    }

    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    #[inline]
    fn set_identity(&mut self) {
        self.a0 = 1.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
    }

    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = -(1.0 + cw0) * inv_a0;
        self.a2 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    /// Low shelf with RBJ shelf slope `slope` (1.0 = steepest monotonic)
    pub fn update_low_shelf(&mut self, cutoff: f32, slope: f32, gain_db: f32, sr: f32) {
        // Bypass when effectively flat
        if gain_db.abs() < 0.01 {
            self.set_identity();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let cos_w0 = w0.cos();
        let alpha = shelf_alpha(w0.sin(), a, slope);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

        self.set_normalized(b0, b1, b2, a0, a1, a2);
    }

    /// High shelf with RBJ shelf slope `slope` (1.0 = steepest monotonic)
    pub fn update_high_shelf(&mut self, cutoff: f32, slope: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < 0.01 {
            self.set_identity();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let cos_w0 = w0.cos();
        let alpha = shelf_alpha(w0.sin(), a, slope);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

        self.set_normalized(b0, b1, b2, a0, a1, a2);
    }

    #[inline]
    fn set_normalized(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        let inv_a0 = 1.0 / a0;
        self.a0 = b0 * inv_a0;
        self.a1 = b1 * inv_a0;
        self.a2 = b2 * inv_a0;
        self.b1 = a1 * inv_a0;
        self.b2 = a2 * inv_a0;
    }

    /// Magnitude response in dB at `freq` Hz.
    ///
    /// Evaluated from the coefficients, not by running audio through the filter.
    pub fn response_db(&self, freq: f32, sr: f32) -> f32 {
        let w = 2.0 * PI * freq / sr;
        let z1 = Complex::new(w.cos(), -w.sin());
        let z2 = z1 * z1;
        let num = Complex::new(self.a0, 0.0) + z1 * self.a1 + z2 * self.a2;
        let den = Complex::new(1.0, 0.0) + z1 * self.b1 + z2 * self.b2;
        20.0 * (num.norm() / den.norm()).max(1e-20).log10()
    }
}

#[inline]
fn shelf_alpha(sin_w0: f32, a: f32, slope: f32) -> f32 {
    let s = slope.max(1e-6);
    sin_w0 * 0.5 * ((a + 1.0 / a) * (1.0 / s - 1.0) + 2.0).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_identity_passes_signal() {
        let mut bq = Biquad::new();
        for &x in &[0.5, -0.25, 1.0] {
            assert!((bq.process(x) - x).abs() < 1e-6);
        }
    }

    #[test]
    fn test_high_shelf_boosts_top_only() {
        let mut bq = Biquad::new();
        bq.update_high_shelf(8_000.0, 1.0, 15.0, SR);

        let low = bq.response_db(100.0, SR);
        let high = bq.response_db(20_000.0, SR);
        assert!(low.abs() < 0.5, "low band moved by {} dB", low);
        assert!((high - 15.0).abs() < 1.0, "top band at {} dB", high);
    }

    #[test]
    fn test_low_shelf_cuts_bottom_only() {
        let mut bq = Biquad::new();
        bq.update_low_shelf(250.0, 1.0, -20.0, SR);

        let low = bq.response_db(20.0, SR);
        let high = bq.response_db(10_000.0, SR);
        assert!((low + 20.0).abs() < 1.0, "bottom band at {} dB", low);
        assert!(high.abs() < 0.5, "top band moved by {} dB", high);
    }

    #[test]
    fn test_flat_shelf_is_identity() {
        let mut bq = Biquad::new();
        bq.update_high_shelf(8_000.0, 1.0, 12.0, SR);
        bq.update_high_shelf(8_000.0, 1.0, 0.0, SR);
        assert!(bq.response_db(15_000.0, SR).abs() < 1e-3);
    }

    #[test]
    fn test_hpf_rejects_lows() {
        let mut bq = Biquad::new();
        bq.update_hpf(6_000.0, 0.707, SR);
        assert!(bq.response_db(200.0, SR) < -40.0);
        assert!(bq.response_db(15_000.0, SR).abs() < 1.0);
    }
}
