// Analysis module - microphone spectrum and detection reading
//
// Pipeline (runs on the control thread, never on an audio callback):
//   mic buffers -> FrequencyAnalyzer -> SpectrumFrame -> DetectionMetric -> reading

pub mod detection;
pub mod spectrum;

pub use detection::{DetectionMetric, DetectionReading};
pub use spectrum::{FrequencyAnalyzer, SpectrumFrame, SpectrumStatus};
