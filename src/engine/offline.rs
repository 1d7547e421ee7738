// Offline rendering: drive the controller from a reading schedule and run a
// decoded track through the chain without touching an audio device.

use std::path::Path;

use serde::Serialize;

use crate::audio::{MusicRenderer, TrackBuffer};
use crate::config::AppConfig;
use crate::control::{MaskingController, MaskingState};
use crate::dsp::chain::SignalChain;
use crate::error::AudioError;

/// One control tick of an offline render
#[derive(Debug, Clone, Serialize)]
pub struct RenderTick {
    pub tick: usize,
    pub time_secs: f32,
    pub reading: f32,
    pub state: MaskingState,
    /// Peak absolute sample written during this tick
    pub peak: f32,
}

/// Rendered interleaved audio plus the per-tick controller trace
#[derive(Debug, Clone)]
pub struct OfflineRender {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub ticks: Vec<RenderTick>,
}

impl OfflineRender {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

/// Render `readings.len()` ticks of `tick_secs` each. The track loops and is
/// rendered at its own rate and channel count.
pub fn render_offline(
    config: &AppConfig,
    track: TrackBuffer,
    readings: &[f32],
    tick_secs: f32,
) -> Result<OfflineRender, AudioError> {
    config.validate()?;
    if !(tick_secs.is_finite() && tick_secs > 0.0) {
        return Err(AudioError::InvalidConfig {
            reason: format!("tick length must be positive, got {}", tick_secs),
        });
    }

    let sample_rate = track.sample_rate();
    let channels = track.channels();
    let (chain, control) = SignalChain::build(&config.chain, sample_rate, channels)?;
    let mut controller = MaskingController::new(&config.controller, &config.chain)?;
    let mut renderer = MusicRenderer::new(track, chain, sample_rate, true);

    let frames_per_tick = ((tick_secs * sample_rate as f32).round() as usize).max(1);
    let mut block = vec![0.0f32; frames_per_tick * channels];
    let mut samples = Vec::with_capacity(block.len() * readings.len());
    let mut ticks = Vec::with_capacity(readings.len());

    for (tick, &reading) in readings.iter().enumerate() {
        let decision = controller.tick(reading, tick_secs);
        decision.apply(&control);

        renderer.render(&mut block);
        let peak = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        samples.extend_from_slice(&block);

        ticks.push(RenderTick {
            tick,
            time_secs: tick as f32 * tick_secs,
            reading,
            state: decision.state,
            peak,
        });
    }

    log::info!(
        "[Offline] Rendered {} ticks ({:.2}s) at {} Hz, {} ch",
        ticks.len(),
        samples.len() as f32 / (channels as f32 * sample_rate as f32),
        sample_rate,
        channels
    );

    Ok(OfflineRender {
        samples,
        channels: channels as u16,
        sample_rate,
        ticks,
    })
}

/// Write a render as 32-bit float WAV
pub fn write_wav(path: &Path, render: &OfflineRender) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: render.channels,
        sample_rate: render.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let wav_error = |e: hound::Error| AudioError::StreamFailure {
        reason: format!("Failed to write {}: {}", path.display(), e),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_error)?;
    for &sample in &render.samples {
        writer.write_sample(sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;
    Ok(())
}
