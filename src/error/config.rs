// Configuration error types and constants
//
// Everything in here is raised at setup time. Nothing on the tick path or the
// audio path returns a ConfigError.

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 3001-3006
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// Detection bin range is empty or outside the spectrum
    pub const INVALID_BIN_RANGE: i32 = 3001;

    /// Time constant is zero, negative or not finite
    pub const INVALID_TIME_CONSTANT: i32 = 3002;

    /// Signal chain topology is malformed
    pub const INVALID_TOPOLOGY: i32 = 3003;

    /// A stage's idle target would not leave the music (approximately) untouched
    pub const IDLE_NOT_PASSTHROUGH: i32 = 3004;

    /// Filter frequency is at or above Nyquist for the output sample rate
    pub const FREQUENCY_OUT_OF_RANGE: i32 = 3005;

    /// Scalar parameter outside its allowed range
    pub const INVALID_PARAMETER: i32 = 3006;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=Config, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Configuration errors, raised once while building a session
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Bin range `start..end` is not a non-empty sub-range of `0..bin_count`
    InvalidBinRange {
        start: usize,
        end: usize,
        bin_count: usize,
    },

    /// Time constant for `name` is not a finite positive number of seconds
    InvalidTimeConstant { name: String, value: f32 },

    /// Chain topology problem (empty chain, duplicate or unknown stage)
    InvalidTopology { reason: String },

    /// Stage idle value would reshape or silence the music
    IdleNotPassthrough { stage: String, value: f32 },

    /// Filter frequency is not below Nyquist
    FrequencyOutOfRange {
        stage: String,
        frequency_hz: f32,
        sample_rate: u32,
    },

    /// Generic scalar parameter violation
    InvalidParameter { name: String, reason: String },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidBinRange { .. } => ConfigErrorCodes::INVALID_BIN_RANGE,
            ConfigError::InvalidTimeConstant { .. } => ConfigErrorCodes::INVALID_TIME_CONSTANT,
            ConfigError::InvalidTopology { .. } => ConfigErrorCodes::INVALID_TOPOLOGY,
            ConfigError::IdleNotPassthrough { .. } => ConfigErrorCodes::IDLE_NOT_PASSTHROUGH,
            ConfigError::FrequencyOutOfRange { .. } => ConfigErrorCodes::FREQUENCY_OUT_OF_RANGE,
            ConfigError::InvalidParameter { .. } => ConfigErrorCodes::INVALID_PARAMETER,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::InvalidBinRange {
                start,
                end,
                bin_count,
            } => format!(
                "Detection bin range {}..{} is invalid for a {}-bin spectrum",
                start, end, bin_count
            ),
            ConfigError::InvalidTimeConstant { name, value } => {
                format!("Time constant {} must be finite and > 0 (got {})", name, value)
            }
            ConfigError::InvalidTopology { reason } => {
                format!("Invalid signal chain: {}", reason)
            }
            ConfigError::IdleNotPassthrough { stage, value } => format!(
                "Stage '{}' idle value {} does not pass the music through unchanged",
                stage, value
            ),
            ConfigError::FrequencyOutOfRange {
                stage,
                frequency_hz,
                sample_rate,
            } => format!(
                "Stage '{}' frequency {} Hz is not below Nyquist at {} Hz",
                stage, frequency_hz, sample_rate
            ),
            ConfigError::InvalidParameter { name, reason } => {
                format!("Invalid parameter {}: {}", name, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}

/// Validate a time constant in seconds
pub(crate) fn check_tau(name: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeConstant {
            name: name.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        assert_eq!(
            ConfigError::InvalidBinRange {
                start: 0,
                end: 0,
                bin_count: 128
            }
            .code(),
            3001
        );
        assert_eq!(
            ConfigError::InvalidTimeConstant {
                name: "attack_tau".into(),
                value: 0.0
            }
            .code(),
            3002
        );
        assert_eq!(
            ConfigError::InvalidTopology {
                reason: "empty".into()
            }
            .code(),
            3003
        );
        assert_eq!(
            ConfigError::IdleNotPassthrough {
                stage: "gain".into(),
                value: 0.0
            }
            .code(),
            3004
        );
    }

    #[test]
    fn test_check_tau() {
        assert!(check_tau("attack_tau", 0.05).is_ok());
        assert!(check_tau("attack_tau", 0.0).is_err());
        assert!(check_tau("attack_tau", -1.0).is_err());
        assert!(check_tau("attack_tau", f32::NAN).is_err());
        assert!(check_tau("attack_tau", f32::INFINITY).is_err());
    }

    #[test]
    fn test_display_mentions_code() {
        let err = ConfigError::FrequencyOutOfRange {
            stage: "air".into(),
            frequency_hz: 30_000.0,
            sample_rate: 48_000,
        };
        let display = format!("{}", err);
        assert!(display.contains("3005"));
        assert!(display.contains("Nyquist"));
    }
}
