// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes carried by status events
/// and printed by the CLI.
///
/// Error code range: 1001-1009 (1004 unassigned)
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Microphone access was refused by the host
    pub const PERMISSION_DENIED: i32 = 1001;

    /// Track could not be decoded as audio
    pub const DECODE_FAILURE: i32 = 1002;

    /// Track identifier did not resolve to a loadable asset
    pub const TRACK_NOT_FOUND: i32 = 1003;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1005;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// Audio stream disconnected or channel closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1008;

    /// Session configuration rejected at start
    pub const INVALID_CONFIG: i32 = 1009;
}

/// Log an audio error with structured context
///
/// This function logs audio errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=PlaybackSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover session start (track decoding, microphone
/// acquisition), stream management, and hardware access.
///
/// Error code ranges: 1001-1009
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Microphone permission denied
    PermissionDenied,

    /// Track is not a valid audio asset
    DecodeFailure { reason: String },

    /// Track identifier could not be resolved
    TrackNotFound { track: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Stream channel disconnected unexpectedly
    StreamFailure { reason: String },

    /// Configuration was rejected while building the session
    InvalidConfig { reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::PermissionDenied => AudioErrorCodes::PERMISSION_DENIED,
            AudioError::DecodeFailure { .. } => AudioErrorCodes::DECODE_FAILURE,
            AudioError::TrackNotFound { .. } => AudioErrorCodes::TRACK_NOT_FOUND,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::InvalidConfig { .. } => AudioErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            AudioError::DecodeFailure { reason } => {
                format!("Could not decode track: {}", reason)
            }
            AudioError::TrackNotFound { track } => {
                format!("Track not found: {}", track)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::InvalidConfig { reason } => {
                format!("Invalid session configuration: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

impl From<crate::error::ConfigError> for AudioError {
    fn from(err: crate::error::ConfigError) -> Self {
        AudioError::InvalidConfig {
            reason: err.message(),
        }
    }
}
