//! Backend abstractions for audio device access.
//!
//! A backend hands out two kinds of stream: a microphone feeding a
//! [`MicrophoneSink`], and an output driven by a [`MusicRenderer`]. Dropping
//! the returned handle closes the stream and releases the device.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::{MicrophoneSink, MusicRenderer};
use crate::error::AudioError;

/// Format the output stream will run at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// An open device stream. Dropping it releases the device.
pub trait ActiveStream {
    fn describe(&self) -> &str;
}

/// An open microphone plus what the control loop needs to know about it
pub struct MicrophoneStream {
    pub stream: Box<dyn ActiveStream>,
    pub sample_rate: u32,
    /// Raised by the backend when the device goes away mid-session
    pub disconnected: Arc<AtomicBool>,
}

/// Trait implemented by platform-specific audio backends.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Format `open_output` will use
    fn output_format(&self) -> Result<OutputFormat, AudioError>;

    /// Acquire the microphone. Fails with `PermissionDenied` when access is refused.
    fn open_microphone(&self, sink: MicrophoneSink) -> Result<MicrophoneStream, AudioError>;

    /// Start rendering music through `renderer`
    fn open_output(&self, renderer: MusicRenderer) -> Result<Box<dyn ActiveStream>, AudioError>;
}

mod cpal;
pub use self::cpal::{list_devices, CpalBackend, DeviceInfo};

mod stub;
pub use stub::StubBackend;
