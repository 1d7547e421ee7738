// Spectrum module - rolling FFT analysis of the microphone signal
//
// Keeps the newest fft_size mono samples, and on each refresh produces a
// temporally smoothed magnitude spectrum of fft_size / 2 bins:
//
//   window (Blackman) -> FFT -> |X_k| / N -> smooth with previous -> scale
//
// The analyzer distinguishes fresh data from a held (stale) frame so the
// control loop can tell a quiet room from a dead microphone.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{AnalyzerConfig, SpectrumScale};
use crate::dsp::utils::lin_to_db;

/// One smoothed magnitude spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    bins: Vec<f32>,
    sequence: u64,
    held: bool,
}

impl SpectrumFrame {
    /// Frame from precomputed bin values (visualisers, tests)
    pub fn from_bins(bins: Vec<f32>) -> Self {
        Self {
            bins,
            sequence: 0,
            held: false,
        }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Count of live refreshes that produced this frame
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True when no new microphone data arrived since the frame was computed
    pub fn is_held(&self) -> bool {
        self.held
    }
}

/// Result of a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumStatus {
    /// New frame computed from fresh samples
    Live,
    /// No fresh samples; previous frame still served
    Held,
    /// Nothing usable (no full window yet, mic gone, or held too long)
    NoSignal,
}

pub struct FrequencyAnalyzer {
    config: AnalyzerConfig,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    /// Blackman window (pre-computed)
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    filled: usize,
    fresh_samples: usize,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    frame: SpectrumFrame,
    status: SpectrumStatus,
    held_refreshes: u32,
    disconnected: bool,
}

impl FrequencyAnalyzer {
    /// Create an analyzer for microphone audio at `sample_rate`
    pub fn new(config: AnalyzerConfig, sample_rate: u32) -> Self {
        let n = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(n);

        let window = (0..n)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        let bins = n / 2;
        Self {
            config,
            sample_rate,
            fft,
            window,
            history: vec![0.0; n],
            write_pos: 0,
            filled: 0,
            fresh_samples: 0,
            smoothed: vec![0.0; bins],
            scratch: vec![Complex::new(0.0, 0.0); n],
            frame: SpectrumFrame {
                bins: vec![0.0; bins],
                sequence: 0,
                held: false,
            },
            status: SpectrumStatus::NoSignal,
            held_refreshes: 0,
            disconnected: false,
        }
    }

    /// Append mono microphone samples
    pub fn ingest(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let n = self.history.len();
        // Only the newest window matters
        let tail = &samples[samples.len().saturating_sub(n)..];
        for &s in tail {
            self.history[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % n;
        }
        self.filled = (self.filled + tail.len()).min(n);
        self.fresh_samples += samples.len();
        self.disconnected = false;
    }

    /// Recompute the spectrum if fresh samples arrived
    pub fn refresh(&mut self) -> SpectrumStatus {
        self.status = if self.disconnected {
            SpectrumStatus::NoSignal
        } else if self.fresh_samples > 0 && self.filled == self.history.len() {
            self.compute();
            self.fresh_samples = 0;
            self.held_refreshes = 0;
            SpectrumStatus::Live
        } else if self.frame.sequence > 0 && self.held_refreshes < self.config.max_held_refreshes {
            self.held_refreshes += 1;
            self.frame.held = true;
            SpectrumStatus::Held
        } else {
            SpectrumStatus::NoSignal
        };
        self.status
    }

    /// Latest frame, or None while the status is NoSignal
    pub fn current_spectrum(&self) -> Option<&SpectrumFrame> {
        match self.status {
            SpectrumStatus::NoSignal => None,
            _ => Some(&self.frame),
        }
    }

    /// The microphone went away; report NoSignal until data flows again
    pub fn mark_disconnected(&mut self) {
        self.disconnected = true;
        self.status = SpectrumStatus::NoSignal;
    }

    pub fn status(&self) -> SpectrumStatus {
        self.status
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn compute(&mut self) {
        let n = self.history.len();
        // Oldest sample sits at write_pos
        for i in 0..n {
            let s = self.history[(self.write_pos + i) % n];
            self.scratch[i] = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let norm = 1.0 / n as f32;
        let k = self.config.smoothing;
        for (bin, (smoothed, out)) in self
            .smoothed
            .iter_mut()
            .zip(self.frame.bins.iter_mut())
            .enumerate()
        {
            let magnitude = self.scratch[bin].norm() * norm;
            *smoothed = k * *smoothed + (1.0 - k) * magnitude;
            *out = scale_value(self.config.scale, *smoothed);
        }
        self.frame.sequence += 1;
        self.frame.held = false;
    }
}

fn scale_value(scale: SpectrumScale, magnitude: f32) -> f32 {
    match scale {
        SpectrumScale::Byte { min_db, max_db } => {
            let db = lin_to_db(magnitude);
            (255.0 * (db - min_db) / (max_db - min_db))
                .clamp(0.0, 255.0)
                .floor()
        }
        SpectrumScale::Linear => magnitude,
    }
}

/// Centre frequency of `bin` for an FFT of `fft_size` at `sample_rate`
pub fn bin_frequency(bin: usize, fft_size: usize, sample_rate: u32) -> f32 {
    bin as f32 * sample_rate as f32 / fft_size as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    fn tone(bin: usize, amp: f32, len: usize) -> Vec<f32> {
        let freq = bin_frequency(bin, 256, SR);
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    #[test]
    fn test_no_signal_before_first_window() {
        let mut analyzer = FrequencyAnalyzer::new(AnalyzerConfig::default(), SR);
        assert_eq!(analyzer.refresh(), SpectrumStatus::NoSignal);
        assert!(analyzer.current_spectrum().is_none());

        analyzer.ingest(&[0.0; 100]);
        assert_eq!(analyzer.refresh(), SpectrumStatus::NoSignal);
    }

    #[test]
    fn test_silence_reads_zero() {
        let mut analyzer = FrequencyAnalyzer::new(AnalyzerConfig::default(), SR);
        analyzer.ingest(&[0.0; 256]);
        assert_eq!(analyzer.refresh(), SpectrumStatus::Live);
        let frame = analyzer.current_spectrum().unwrap();
        assert_eq!(frame.len(), 128);
        assert!(frame.bins().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_tone_lands_in_its_bin() {
        let mut analyzer = FrequencyAnalyzer::new(AnalyzerConfig::default(), SR);
        let signal = tone(60, 0.5, 256 * 20);
        for chunk in signal.chunks(256) {
            analyzer.ingest(chunk);
            analyzer.refresh();
        }
        let frame = analyzer.current_spectrum().unwrap();
        let bins = frame.bins();
        assert!(bins[60] > 200.0, "bin 60 = {}", bins[60]);
        assert!(bins[5] < bins[60] - 100.0, "bin 5 = {}", bins[5]);
        assert!(bins.iter().all(|&b| (0.0..=255.0).contains(&b)));
    }

    #[test]
    fn test_smoothing_rises_gradually() {
        let mut analyzer = FrequencyAnalyzer::new(
            AnalyzerConfig {
                scale: SpectrumScale::Linear,
                ..AnalyzerConfig::default()
            },
            SR,
        );
        let signal = tone(60, 0.5, 256);
        analyzer.ingest(&signal);
        analyzer.refresh();
        let first = analyzer.current_spectrum().unwrap().bins()[60];
        analyzer.ingest(&signal);
        analyzer.refresh();
        let second = analyzer.current_spectrum().unwrap().bins()[60];
        assert!(first > 0.0);
        assert!(second > first);
    }

    #[test]
    fn test_held_then_no_signal() {
        let config = AnalyzerConfig {
            max_held_refreshes: 2,
            ..AnalyzerConfig::default()
        };
        let mut analyzer = FrequencyAnalyzer::new(config, SR);
        analyzer.ingest(&tone(60, 0.5, 256));
        assert_eq!(analyzer.refresh(), SpectrumStatus::Live);
        let sequence = analyzer.current_spectrum().unwrap().sequence();

        assert_eq!(analyzer.refresh(), SpectrumStatus::Held);
        let held = analyzer.current_spectrum().unwrap();
        assert!(held.is_held());
        assert_eq!(held.sequence(), sequence);

        assert_eq!(analyzer.refresh(), SpectrumStatus::Held);
        assert_eq!(analyzer.refresh(), SpectrumStatus::NoSignal);
        assert!(analyzer.current_spectrum().is_none());

        analyzer.ingest(&[0.0; 32]);
        assert_eq!(analyzer.refresh(), SpectrumStatus::Live);
    }

    #[test]
    fn test_mark_disconnected() {
        let mut analyzer = FrequencyAnalyzer::new(AnalyzerConfig::default(), SR);
        analyzer.ingest(&[0.1; 512]);
        analyzer.refresh();
        analyzer.mark_disconnected();
        assert!(analyzer.current_spectrum().is_none());
        assert_eq!(analyzer.refresh(), SpectrumStatus::NoSignal);
    }

    #[test]
    fn test_bin_frequency() {
        assert_eq!(bin_frequency(0, 256, 48_000), 0.0);
        assert_eq!(bin_frequency(64, 256, 48_000), 12_000.0);
    }
}
