//! Configuration management for the masking pipeline
//!
//! Runtime configuration is loaded from JSON so thresholds, time constants and
//! the chain topology can be tuned without recompiling. Every section has a
//! default matching the shipped "shelf" preset; a partial JSON file only needs
//! the fields it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::track::TrackCatalog;
use crate::dsp::chain::{ChainSpec, StageKind, StageSpec};
use crate::dsp::limiter::LimiterSettings;
use crate::error::{check_tau, ConfigError};

/// Names accepted by [`AppConfig::preset`]
pub const PRESET_NAMES: &[&str] = &["shelf", "duck", "overdrive", "parallel"];

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub analyzer: AnalyzerConfig,
    pub detection: DetectionConfig,
    pub controller: ControllerConfig,
    pub chain: ChainSpec,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub tracks: TrackCatalog,
}

/// How smoothed magnitudes are presented to the detection metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpectrumScale {
    /// dB mapped linearly from [min_db, max_db] onto 0..255, clamped and floored
    Byte { min_db: f32, max_db: f32 },
    /// Raw smoothed magnitude
    Linear,
}

impl Default for SpectrumScale {
    fn default() -> Self {
        SpectrumScale::Byte {
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Frequency analyzer parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// FFT window size in samples (power of two); bin count is half of this
    pub fft_size: usize,
    /// Weight of the previous spectrum in temporal smoothing, 0..1
    pub smoothing: f32,
    pub scale: SpectrumScale,
    /// Refreshes without new microphone data before the spectrum is dropped
    pub max_held_refreshes: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            scale: SpectrumScale::default(),
            max_held_refreshes: 30,
        }
    }
}

impl AnalyzerConfig {
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Detection band, either as bin indices or in Hertz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandRange {
    /// Half-open bin range `start..end`
    Bins { start: usize, end: usize },
    /// Resolved to bins once the microphone sample rate is known
    Hertz { low_hz: f32, high_hz: f32 },
}

impl Default for BandRange {
    fn default() -> Self {
        BandRange::Bins { start: 40, end: 100 }
    }
}

/// How the band's bins collapse into one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetectionConfig {
    pub range: BandRange,
    pub reduction: Reduction,
}

/// Masking controller parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Reading at or above which the controller boosts
    pub threshold: f32,
    /// Release only once the reading drops below threshold - hysteresis
    pub hysteresis: f32,
    /// Minimum time in a state before the next transition
    pub min_dwell_secs: f32,
    /// Time constant toward BOOSTED targets, seconds
    pub attack_tau: f32,
    /// Time constant toward IDLE targets, seconds
    pub release_tau: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            hysteresis: 0.0,
            min_dwell_secs: 0.0,
            attack_tau: 0.1,
            release_tau: 0.5,
        }
    }
}

/// Microphone transfer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Size of buffer pool for real-time audio transfer
    pub buffer_pool_size: usize,
    /// Size of each audio buffer in samples
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 16,
            buffer_size: 2048,
        }
    }
}

/// Playback session behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Control loop period
    pub tick_interval_ms: u64,
    /// Restart the track from the top when it ends
    pub loop_track: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            loop_track: true,
        }
    }
}

impl AppConfig {
    /// Built-in configuration variant by name
    pub fn preset(name: &str) -> Option<Self> {
        let chain = match name {
            "shelf" => ChainSpec::default(),
            "duck" => ChainSpec {
                stages: vec![
                    StageSpec::modulated(
                        "air",
                        StageKind::HighShelf {
                            frequency_hz: 8_000.0,
                            slope: 1.0,
                        },
                        0.0,
                        30.0,
                    ),
                    StageSpec::modulated(
                        "body",
                        StageKind::LowShelf {
                            frequency_hz: 250.0,
                            slope: 1.0,
                        },
                        0.0,
                        -20.0,
                    ),
                ],
            },
            "overdrive" => ChainSpec {
                stages: vec![
                    StageSpec::modulated(
                        "air",
                        StageKind::HighShelf {
                            frequency_hz: 8_000.0,
                            slope: 1.0,
                        },
                        0.0,
                        45.0,
                    ),
                    StageSpec::modulated("drive", StageKind::Gain, 1.0, 10.0),
                    StageSpec::fixed("ceiling", StageKind::Limiter(LimiterSettings::default())),
                ],
            },
            "parallel" => ChainSpec {
                stages: vec![
                    StageSpec::modulated(
                        "sparkle",
                        StageKind::HighPassBlend {
                            frequency_hz: 6_000.0,
                            q: std::f32::consts::FRAC_1_SQRT_2,
                        },
                        0.0,
                        4.0,
                    ),
                    StageSpec::fixed("ceiling", StageKind::Limiter(LimiterSettings::default())),
                ],
            },
            _ => return None,
        };

        Some(Self {
            chain,
            ..Self::default()
        })
    }

    /// One-line summary for listings
    pub fn preset_description(name: &str) -> Option<&'static str> {
        match name {
            "shelf" => Some("8 kHz high shelf, 0 -> +15 dB"),
            "duck" => Some("8 kHz high shelf 0 -> +30 dB, 250 Hz low shelf 0 -> -20 dB"),
            "overdrive" => Some("8 kHz high shelf 0 -> +45 dB, gain 1 -> 10, limiter"),
            "parallel" => Some("6 kHz high-pass blend, wet 0 -> 4, limiter"),
            _ => None,
        }
    }

    /// Fail-fast checks that do not need an audio device
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analyzer;
        if !a.fft_size.is_power_of_two() || a.fft_size < 32 {
            return Err(invalid("analyzer.fft_size", "must be a power of two >= 32"));
        }
        if !(0.0..1.0).contains(&a.smoothing) {
            return Err(invalid("analyzer.smoothing", "must be in [0, 1)"));
        }
        if let SpectrumScale::Byte { min_db, max_db } = a.scale {
            if !(min_db.is_finite() && max_db.is_finite() && min_db < max_db) {
                return Err(invalid("analyzer.scale", "min_db must be below max_db"));
            }
        }

        match self.detection.range {
            BandRange::Bins { start, end } => {
                if end <= start || end > a.bin_count() {
                    return Err(ConfigError::InvalidBinRange {
                        start,
                        end,
                        bin_count: a.bin_count(),
                    });
                }
            }
            BandRange::Hertz { low_hz, high_hz } => {
                if !(low_hz.is_finite() && high_hz.is_finite() && low_hz >= 0.0 && high_hz > low_hz)
                {
                    return Err(invalid("detection.range", "need 0 <= low_hz < high_hz"));
                }
            }
        }

        let c = &self.controller;
        if !c.threshold.is_finite() {
            return Err(invalid("controller.threshold", "must be finite"));
        }
        if !(c.hysteresis.is_finite() && c.hysteresis >= 0.0) {
            return Err(invalid("controller.hysteresis", "must be >= 0"));
        }
        if !(c.min_dwell_secs.is_finite() && c.min_dwell_secs >= 0.0) {
            return Err(invalid("controller.min_dwell_secs", "must be >= 0"));
        }
        check_tau("controller.attack_tau", c.attack_tau)?;
        check_tau("controller.release_tau", c.release_tau)?;

        self.chain.validate()?;

        if self.audio.buffer_pool_size == 0 || self.audio.buffer_size == 0 {
            return Err(invalid("audio", "buffer pool and buffer size must be > 0"));
        }
        // The loop must run at 10 Hz or faster
        if self.session.tick_interval_ms == 0 || self.session.tick_interval_ms > 100 {
            return Err(invalid("session.tick_interval_ms", "must be in 1..=100"));
        }
        Ok(())
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_file(&path) {
            Ok(config) => {
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(err) => {
                log::warn!("[Config] {}. Using defaults.", err);
                Self::default()
            }
        }
    }

    /// Strict variant of [`AppConfig::load_from_file`] used by the CLI
    pub fn try_load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file {:?}: {}", path.as_ref(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path.as_ref(), e))
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/drill_shield.json")
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
