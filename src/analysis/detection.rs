// Detection metric - collapse a band of the spectrum into one scalar
//
// The band is fixed at construction. Out-of-range configurations fail here,
// before any audio flows, so the tick path never has to bounds-check.

use std::ops::Range;

use crate::analysis::spectrum::SpectrumFrame;
use crate::config::{BandRange, Reduction};
use crate::error::ConfigError;

/// Scalar "is the intrusive noise present" reading
pub type DetectionReading = f32;

impl BandRange {
    /// Resolve to a half-open bin range.
    ///
    /// Hertz bounds map with `floor(hz * fft_size / sample_rate)`; the upper
    /// bound is made exclusive by adding one bin.
    pub fn resolve(&self, sample_rate: u32, fft_size: usize) -> Range<usize> {
        match *self {
            BandRange::Bins { start, end } => start..end,
            BandRange::Hertz { low_hz, high_hz } => {
                let to_bin =
                    |hz: f32| (hz.max(0.0) * fft_size as f32 / sample_rate as f32).floor() as usize;
                to_bin(low_hz)..to_bin(high_hz) + 1
            }
        }
    }
}

/// Configured band + reduction
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionMetric {
    range: Range<usize>,
    reduction: Reduction,
}

impl DetectionMetric {
    /// Fails with `InvalidBinRange` unless `range` is a non-empty sub-range of
    /// `0..bin_count`
    pub fn new(
        range: Range<usize>,
        bin_count: usize,
        reduction: Reduction,
    ) -> Result<Self, ConfigError> {
        if range.end <= range.start || range.end > bin_count {
            return Err(ConfigError::InvalidBinRange {
                start: range.start,
                end: range.end,
                bin_count,
            });
        }
        Ok(Self { range, reduction })
    }

    /// Build from a band configuration for a given analyzer geometry
    pub fn from_band(
        band: &BandRange,
        reduction: Reduction,
        sample_rate: u32,
        fft_size: usize,
    ) -> Result<Self, ConfigError> {
        Self::new(band.resolve(sample_rate, fft_size), fft_size / 2, reduction)
    }

    /// Reading for one frame. Frames shorter than the band contribute only the
    /// bins they have.
    pub fn reading(&self, frame: &SpectrumFrame) -> DetectionReading {
        let bins = frame.bins();
        let end = self.range.end.min(bins.len());
        let start = self.range.start.min(end);
        let sum: f32 = bins[start..end].iter().sum();
        match self.reduction {
            Reduction::Sum => sum,
            Reduction::Mean => sum / self.range.len() as f32,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }
}
