//! Output Limiter
//!
//! # Perceptual Contract
//! - **Target Source**: Music after the boost/gain stages.
//! - **Intended Effect**: Keep peaks bounded no matter how hard the mask pushes.
//! - **Failure Modes**:
//!   - Audible pumping when the boost target is extreme and the knee is hard.
//! - **Will Not Do**:
//!   - Follow the controller. Settings are static for the life of the chain.
//!
//! Channel-linked feed-forward peak compressor with a soft knee, followed by a
//! hard ceiling at 0 dBFS.

use serde::{Deserialize, Serialize};

use crate::dsp::utils::{db_to_lin, lin_to_db, time_constant_coeff};

/// Absolute output bound after gain reduction
pub const CEILING: f32 = 1.0;

/// Static limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            threshold_db: -3.0,
            knee_db: 3.0,
            ratio: 20.0,
            attack_ms: 3.0,
            release_ms: 250.0,
        }
    }
}

pub struct Limiter {
    settings: LimiterSettings,
    attack: f32,
    release: f32,
    // Smoothed gain reduction, dB (<= 0)
    gain_db: f32,
}

impl Limiter {
    pub fn new(settings: LimiterSettings, sample_rate: f32) -> Self {
        Self {
            attack: time_constant_coeff(settings.attack_ms, sample_rate),
            release: time_constant_coeff(settings.release_ms, sample_rate),
            settings,
            gain_db: 0.0,
        }
    }

    /// Static gain computer: gain change in dB for an input level in dB
    pub fn gain_computer(&self, level_db: f32) -> f32 {
        let LimiterSettings {
            threshold_db,
            knee_db,
            ratio,
            ..
        } = self.settings;
        let slope = 1.0 / ratio.max(1.0) - 1.0;
        let over = level_db - threshold_db;

        if knee_db > 0.0 && 2.0 * over.abs() <= knee_db {
            let x = over + knee_db * 0.5;
            slope * x * x / (2.0 * knee_db)
        } else if over > 0.0 {
            slope * over
        } else {
            0.0
        }
    }

    /// Process one interleaved frame in place
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        let peak = frame.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let target_db = self.gain_computer(lin_to_db(peak));

        // Gain falling = attack, recovering = release
        let coeff = if target_db < self.gain_db {
            self.attack
        } else {
            self.release
        };
        self.gain_db = coeff * self.gain_db + (1.0 - coeff) * target_db;

        let gain = db_to_lin(self.gain_db);
        for sample in frame.iter_mut() {
            *sample = (*sample * gain).clamp(-CEILING, CEILING);
        }
    }

    /// Current gain reduction in dB (positive number, for metering)
    pub fn gain_reduction_db(&self) -> f32 {
        -self.gain_db
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_untouched() {
        let limiter = Limiter::new(LimiterSettings::default(), 48_000.0);
        assert_eq!(limiter.gain_computer(-20.0), 0.0);
    }

    #[test]
    fn test_above_threshold_reduced_by_ratio() {
        let settings = LimiterSettings {
            knee_db: 0.0,
            ..LimiterSettings::default()
        };
        let limiter = Limiter::new(settings, 48_000.0);
        // 10 dB over at 20:1 leaves 0.5 dB over
        let gain = limiter.gain_computer(settings.threshold_db + 10.0);
        assert!((gain + 9.5).abs() < 1e-4, "gain {}", gain);
    }

    #[test]
    fn test_knee_is_continuous() {
        let limiter = Limiter::new(LimiterSettings::default(), 48_000.0);
        let t = limiter.settings().threshold_db;
        let k = limiter.settings().knee_db;
        let below = limiter.gain_computer(t - k * 0.5 - 1e-3);
        let edge = limiter.gain_computer(t - k * 0.5);
        assert!((below - edge).abs() < 1e-3);
        let inside = limiter.gain_computer(t + k * 0.5);
        let outside = limiter.gain_computer(t + k * 0.5 + 1e-3);
        assert!((inside - outside).abs() < 1e-2);
    }

    #[test]
    fn test_output_never_exceeds_ceiling() {
        let mut limiter = Limiter::new(LimiterSettings::default(), 48_000.0);
        for i in 0..4_800 {
            let x = 8.0 * ((i as f32) * 0.05).sin();
            let mut frame = [x, -x];
            limiter.process_frame(&mut frame);
            assert!(frame[0].abs() <= CEILING && frame[1].abs() <= CEILING);
        }
        assert!(limiter.gain_reduction_db() > 6.0);
    }
}
