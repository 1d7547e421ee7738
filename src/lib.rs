// Drill Shield Core - adaptive acoustic masking engine
// Microphone spectrum in, music shaped through a modulated signal chain out

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod control;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod managers;

// Re-exports for convenience
pub use analysis::{DetectionMetric, FrequencyAnalyzer, SpectrumFrame, SpectrumStatus};
pub use audio::{TrackBuffer, TrackLoader, TrackRef};
pub use config::AppConfig;
pub use control::{MaskingController, MaskingState, SessionStatus, StatusEvent};
pub use dsp::{ChainControl, ChainSpec, SignalChain};
pub use engine::{AudioBackend, PlaybackSession, SessionState};
pub use error::{AudioError, ConfigError, ErrorCode};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. Filter comes from `RUST_LOG`, default `info`.
///
/// `log` records from library code are forwarded to the same subscriber.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
    {
        log::debug!("Logging initialised");
    }
}
