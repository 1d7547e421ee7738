// Signal chain: ordered, named processing stages applied to the music
//
// Topology is data (ChainSpec) so the same controller can drive a single high
// shelf, a duck-and-boost pair, or a parallel high-pass blend. Building a chain
// returns two halves:
//
//   SignalChain  - owned by the audio domain, processes interleaved blocks
//   ChainControl - cloneable handle for the control domain, writes targets
//
// The halves share only AtomicF32 cells. The audio side never locks and never
// allocates after build().

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::dsp::biquad::Biquad;
use crate::dsp::limiter::{Limiter, LimiterSettings, CEILING};
use crate::dsp::smoothing::{AtomicF32, SmoothedParam};
use crate::error::ConfigError;

/// Frames per parameter update inside process_block
pub const SUB_BLOCK_FRAMES: usize = 32;

/// Default time constant before the controller has issued anything
const SETTLE_TAU: f32 = 0.05;

/// Largest idle shelf gain still treated as pass-through, dB
const SHELF_IDLE_TOLERANCE_DB: f32 = 1.0;

/// Largest idle broadband gain still treated as pass-through, dB
const GAIN_IDLE_TOLERANCE_DB: f32 = 6.0;

fn default_slope() -> f32 {
    1.0
}

fn default_q() -> f32 {
    std::f32::consts::FRAC_1_SQRT_2
}

/// What a stage does to the audio, and what its modulated parameter means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageKind {
    /// Parameter: shelf gain in dB
    HighShelf {
        frequency_hz: f32,
        #[serde(default = "default_slope")]
        slope: f32,
    },
    /// Parameter: shelf gain in dB
    LowShelf {
        frequency_hz: f32,
        #[serde(default = "default_slope")]
        slope: f32,
    },
    /// Parameter: linear broadband gain
    Gain,
    /// Parameter: linear gain of the high-passed copy summed onto the dry signal
    HighPassBlend {
        frequency_hz: f32,
        #[serde(default = "default_q")]
        q: f32,
    },
    /// Not modulated
    Limiter(LimiterSettings),
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::HighShelf { .. } => "high_shelf",
            StageKind::LowShelf { .. } => "low_shelf",
            StageKind::Gain => "gain",
            StageKind::HighPassBlend { .. } => "high_pass_blend",
            StageKind::Limiter(_) => "limiter",
        }
    }

    pub fn is_modulated(&self) -> bool {
        !matches!(self, StageKind::Limiter(_))
    }

    /// Parameter value that leaves audio untouched
    pub fn neutral_value(&self) -> f32 {
        match self {
            StageKind::Gain => 1.0,
            _ => 0.0,
        }
    }

    fn frequency_hz(&self) -> Option<f32> {
        match self {
            StageKind::HighShelf { frequency_hz, .. }
            | StageKind::LowShelf { frequency_hz, .. }
            | StageKind::HighPassBlend { frequency_hz, .. } => Some(*frequency_hz),
            _ => None,
        }
    }
}

/// Parameter targets the controller selects between
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTargets {
    pub idle: f32,
    pub boosted: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub kind: StageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<StageTargets>,
}

impl StageSpec {
    pub fn modulated(name: &str, kind: StageKind, idle: f32, boosted: f32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            targets: Some(StageTargets { idle, boosted }),
        }
    }

    pub fn fixed(name: &str, kind: StageKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            targets: None,
        }
    }
}

/// Ordered list of stages; music flows first to last
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub stages: Vec<StageSpec>,
}

impl Default for ChainSpec {
    /// Single 8 kHz high shelf, 0 dB idle, +15 dB boosted
    fn default() -> Self {
        Self {
            stages: vec![StageSpec::modulated(
                "air",
                StageKind::HighShelf {
                    frequency_hz: 8_000.0,
                    slope: 1.0,
                },
                0.0,
                15.0,
            )],
        }
    }
}

impl ChainSpec {
    /// Structural checks that do not depend on the output device
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::InvalidTopology {
                reason: "chain has no stages".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut modulated = 0;
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::InvalidTopology {
                    reason: "stage name is empty".to_string(),
                });
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::InvalidTopology {
                    reason: format!("duplicate stage name '{}'", stage.name),
                });
            }

            if let Some(freq) = stage.kind.frequency_hz() {
                if !freq.is_finite() || freq <= 0.0 {
                    return Err(ConfigError::InvalidParameter {
                        name: format!("{}.frequency_hz", stage.name),
                        reason: format!("must be > 0 (got {})", freq),
                    });
                }
            }

            match (&stage.kind, stage.targets) {
                (StageKind::Limiter(settings), None) => validate_limiter(&stage.name, settings)?,
                (StageKind::Limiter(_), Some(_)) => {
                    return Err(ConfigError::InvalidTopology {
                        reason: format!("limiter stage '{}' cannot be modulated", stage.name),
                    })
                }
                (_, None) => {
                    return Err(ConfigError::InvalidTopology {
                        reason: format!("stage '{}' needs idle/boosted targets", stage.name),
                    })
                }
                (kind, Some(targets)) => {
                    validate_targets(&stage.name, kind, targets)?;
                    modulated += 1;
                }
            }
        }

        if modulated == 0 {
            return Err(ConfigError::InvalidTopology {
                reason: "chain has no modulated stage".to_string(),
            });
        }
        Ok(())
    }

    /// Full check against the output sample rate
    pub fn validate_for_rate(&self, sample_rate: u32) -> Result<(), ConfigError> {
        self.validate()?;
        let nyquist = sample_rate as f32 * 0.5;
        for stage in &self.stages {
            if let Some(freq) = stage.kind.frequency_hz() {
                if freq >= nyquist {
                    return Err(ConfigError::FrequencyOutOfRange {
                        stage: stage.name.clone(),
                        frequency_hz: freq,
                        sample_rate,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }
}

fn validate_targets(name: &str, kind: &StageKind, targets: StageTargets) -> Result<(), ConfigError> {
    let StageTargets { idle, boosted } = targets;
    if !idle.is_finite() || !boosted.is_finite() {
        return Err(ConfigError::InvalidParameter {
            name: format!("{}.targets", name),
            reason: "targets must be finite".to_string(),
        });
    }

    let passthrough = match kind {
        StageKind::HighShelf { .. } | StageKind::LowShelf { .. } => {
            idle.abs() <= SHELF_IDLE_TOLERANCE_DB
        }
        StageKind::Gain => {
            idle > 0.0 && (20.0 * idle.log10()).abs() <= GAIN_IDLE_TOLERANCE_DB
        }
        StageKind::HighPassBlend { .. } => idle >= 0.0,
        StageKind::Limiter(_) => true,
    };
    if !passthrough {
        return Err(ConfigError::IdleNotPassthrough {
            stage: name.to_string(),
            value: idle,
        });
    }

    let boosted_ok = match kind {
        StageKind::Gain | StageKind::HighPassBlend { .. } => boosted >= 0.0,
        _ => true,
    };
    if !boosted_ok {
        return Err(ConfigError::InvalidParameter {
            name: format!("{}.targets.boosted", name),
            reason: format!("must be >= 0 (got {})", boosted),
        });
    }
    Ok(())
}

fn validate_limiter(name: &str, settings: &LimiterSettings) -> Result<(), ConfigError> {
    let bad = |field: &str, reason: &str| ConfigError::InvalidParameter {
        name: format!("{}.{}", name, field),
        reason: reason.to_string(),
    };
    if !settings.threshold_db.is_finite() || settings.threshold_db > 0.0 {
        return Err(bad("threshold_db", "must be <= 0 dBFS"));
    }
    if !(settings.ratio >= 1.0) {
        return Err(bad("ratio", "must be >= 1"));
    }
    if !(settings.knee_db >= 0.0) {
        return Err(bad("knee_db", "must be >= 0"));
    }
    if !(settings.attack_ms >= 0.0) || !(settings.release_ms >= 0.0) {
        return Err(bad("attack_ms/release_ms", "must be >= 0"));
    }
    Ok(())
}

/// Shared per-stage cells written by the control domain
#[derive(Debug)]
struct StageCell {
    target: AtomicF32,
    tau: AtomicF32,
}

/// Control-domain handle onto a built chain
///
/// Cloning is cheap; every clone addresses the same cells.
#[derive(Debug, Clone)]
pub struct ChainControl {
    cells: Arc<[StageCell]>,
    names: Arc<[String]>,
}

impl ChainControl {
    /// Request that stage `index` relax toward `value` with time constant `tau`.
    ///
    /// Out-of-range indices are ignored.
    pub fn set_target(&self, index: usize, value: f32, tau: f32) {
        if let Some(cell) = self.cells.get(index) {
            // tau first so the renderer never pairs a new target with a stale tau
            // for longer than one read
            cell.tau.store(tau);
            cell.target.store(value);
        }
    }

    pub fn target(&self, index: usize) -> Option<f32> {
        self.cells.get(index).map(|c| c.target.load())
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn stage_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

enum StageProcessor {
    HighShelf {
        frequency_hz: f32,
        slope: f32,
        filters: Vec<Biquad>,
    },
    LowShelf {
        frequency_hz: f32,
        slope: f32,
        filters: Vec<Biquad>,
    },
    Gain,
    HighPassBlend {
        filters: Vec<Biquad>,
    },
    Limiter(Limiter),
}

struct StageRuntime {
    processor: StageProcessor,
    param: SmoothedParam,
    // Last value the filter coefficients were computed for
    applied: f32,
}

impl StageRuntime {
    fn refresh_coefficients(&mut self, sample_rate: f32) {
        let value = self.param.value();
        match &mut self.processor {
            StageProcessor::HighShelf {
                frequency_hz,
                slope,
                filters,
            } => {
                if (value - self.applied).abs() > 1e-4 {
                    for f in filters.iter_mut() {
                        f.update_high_shelf(*frequency_hz, *slope, value, sample_rate);
                    }
                    self.applied = value;
                }
            }
            StageProcessor::LowShelf {
                frequency_hz,
                slope,
                filters,
            } => {
                if (value - self.applied).abs() > 1e-4 {
                    for f in filters.iter_mut() {
                        f.update_low_shelf(*frequency_hz, *slope, value, sample_rate);
                    }
                    self.applied = value;
                }
            }
            _ => {}
        }
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        let value = self.param.value();
        match &mut self.processor {
            StageProcessor::HighShelf { filters, .. } | StageProcessor::LowShelf { filters, .. } => {
                for (sample, filter) in frame.iter_mut().zip(filters.iter_mut()) {
                    *sample = filter.process(*sample);
                }
            }
            StageProcessor::Gain => {
                for sample in frame.iter_mut() {
                    *sample *= value;
                }
            }
            StageProcessor::HighPassBlend { filters } => {
                for (sample, filter) in frame.iter_mut().zip(filters.iter_mut()) {
                    let wet = filter.process(*sample);
                    *sample += value * wet;
                }
            }
            StageProcessor::Limiter(limiter) => limiter.process_frame(frame),
        }
    }
}

/// Audio-domain half of a built chain
pub struct SignalChain {
    stages: Vec<StageRuntime>,
    control: ChainControl,
    sample_rate: f32,
    channels: usize,
}

impl SignalChain {
    /// Build a chain for the given output format.
    ///
    /// Every modulated stage starts settled at its idle target, so a freshly
    /// built chain passes music through unchanged (up to the idle tolerance).
    pub fn build(
        spec: &ChainSpec,
        sample_rate: u32,
        channels: usize,
    ) -> Result<(SignalChain, ChainControl), ConfigError> {
        spec.validate_for_rate(sample_rate)?;
        if channels == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "channels".to_string(),
                reason: "must be >= 1".to_string(),
            });
        }
        let sr = sample_rate as f32;

        let mut stages = Vec::with_capacity(spec.stages.len());
        let mut cells = Vec::with_capacity(spec.stages.len());
        for stage in &spec.stages {
            let initial = stage
                .targets
                .map(|t| t.idle)
                .unwrap_or_else(|| stage.kind.neutral_value());

            let processor = match &stage.kind {
                StageKind::HighShelf {
                    frequency_hz,
                    slope,
                } => {
                    let mut bq = Biquad::new();
                    bq.update_high_shelf(*frequency_hz, *slope, initial, sr);
                    StageProcessor::HighShelf {
                        frequency_hz: *frequency_hz,
                        slope: *slope,
                        filters: vec![bq; channels],
                    }
                }
                StageKind::LowShelf {
                    frequency_hz,
                    slope,
                } => {
                    let mut bq = Biquad::new();
                    bq.update_low_shelf(*frequency_hz, *slope, initial, sr);
                    StageProcessor::LowShelf {
                        frequency_hz: *frequency_hz,
                        slope: *slope,
                        filters: vec![bq; channels],
                    }
                }
                StageKind::Gain => StageProcessor::Gain,
                StageKind::HighPassBlend { frequency_hz, q } => {
                    let mut bq = Biquad::new();
                    bq.update_hpf(*frequency_hz, *q, sr);
                    StageProcessor::HighPassBlend {
                        filters: vec![bq; channels],
                    }
                }
                StageKind::Limiter(settings) => StageProcessor::Limiter(Limiter::new(*settings, sr)),
            };

            stages.push(StageRuntime {
                processor,
                param: SmoothedParam::new(initial, SETTLE_TAU),
                applied: initial,
            });
            cells.push(StageCell {
                target: AtomicF32::new(initial),
                tau: AtomicF32::new(SETTLE_TAU),
            });
        }

        let control = ChainControl {
            cells: cells.into(),
            names: spec
                .stages
                .iter()
                .map(|s| s.name.clone())
                .collect::<Vec<_>>()
                .into(),
        };

        tracing::debug!(
            "[SignalChain] Built {} stage(s) at {} Hz x {} ch: {:?}",
            spec.stages.len(),
            sample_rate,
            channels,
            control.stage_names()
        );

        Ok((
            SignalChain {
                stages,
                control: control.clone(),
                sample_rate: sr,
                channels,
            },
            control,
        ))
    }

    /// Process an interleaved block in place.
    ///
    /// Targets are re-read and live values advanced once per sub-block.
    /// Trailing samples that do not fill a whole frame are left untouched.
    /// Every processed sample ends within `[-CEILING, CEILING]`, limiter or not.
    pub fn process_block(&mut self, interleaved: &mut [f32]) {
        let channels = self.channels;
        let frames = interleaved.len() / channels;

        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(SUB_BLOCK_FRAMES);
            self.step_parameters(n as f32 / self.sample_rate);

            let block = &mut interleaved[offset * channels..(offset + n) * channels];
            for frame in block.chunks_exact_mut(channels) {
                for stage in self.stages.iter_mut() {
                    stage.process_frame(frame);
                }
                for sample in frame.iter_mut() {
                    *sample = (*sample).clamp(-CEILING, CEILING);
                }
            }
            offset += n;
        }
    }

    /// Advance live parameter values by `dt` seconds without rendering audio.
    pub fn advance_parameters(&mut self, dt: f32) {
        self.step_parameters(dt);
    }

    fn step_parameters(&mut self, dt: f32) {
        for (stage, cell) in self.stages.iter_mut().zip(self.control.cells.iter()) {
            stage.param.set_target(cell.target.load(), cell.tau.load());
            stage.param.advance(dt);
            stage.refresh_coefficients(self.sample_rate);
        }
    }

    /// Live (smoothed) parameter value of a stage
    pub fn live_value(&self, name: &str) -> Option<f32> {
        let index = self.control.stage_index(name)?;
        self.stages.get(index).map(|s| s.param.value())
    }

    pub fn live_value_at(&self, index: usize) -> Option<f32> {
        self.stages.get(index).map(|s| s.param.value())
    }

    pub fn control(&self) -> &ChainControl {
        &self.control
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    /// Clear filter state (e.g. after a track change)
    pub fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            match &mut stage.processor {
                StageProcessor::HighShelf { filters, .. }
                | StageProcessor::LowShelf { filters, .. }
                | StageProcessor::HighPassBlend { filters } => {
                    filters.iter_mut().for_each(Biquad::reset)
                }
                _ => {}
            }
        }
    }
}
