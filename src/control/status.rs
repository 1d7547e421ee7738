// Status events published to observers at tick cadence

use serde::{Deserialize, Serialize};

use crate::control::controller::MaskingState;
use crate::error::{AudioError, ErrorCode};

pub const LABEL_STARTING: &str = "Loading Audio...";
pub const LABEL_STOPPED: &str = "Stopped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Starting,
    Idle,
    Boosted,
    Stopped,
    Error,
}

impl From<MaskingState> for SessionStatus {
    fn from(state: MaskingState) -> Self {
        match state {
            MaskingState::Idle => SessionStatus::Idle,
            MaskingState::Boosted => SessionStatus::Boosted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: SessionStatus,
    pub label: String,
    /// Detection reading that produced this event (tick events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    /// Milliseconds since the session was created
    pub timestamp_ms: u64,
}

impl StatusEvent {
    pub fn starting(timestamp_ms: u64) -> Self {
        Self::plain(SessionStatus::Starting, LABEL_STARTING, timestamp_ms)
    }

    pub fn stopped(timestamp_ms: u64) -> Self {
        Self::plain(SessionStatus::Stopped, LABEL_STOPPED, timestamp_ms)
    }

    pub fn tick(state: MaskingState, reading: f32, timestamp_ms: u64) -> Self {
        Self {
            status: state.into(),
            label: state.label().to_string(),
            reading: Some(reading),
            error_code: None,
            timestamp_ms,
        }
    }

    pub fn error(err: &AudioError, timestamp_ms: u64) -> Self {
        Self {
            status: SessionStatus::Error,
            label: err.message(),
            reading: None,
            error_code: Some(err.code()),
            timestamp_ms,
        }
    }

    fn plain(status: SessionStatus, label: &str, timestamp_ms: u64) -> Self {
        Self {
            status,
            label: label.to_string(),
            reading: None,
            error_code: None,
            timestamp_ms,
        }
    }
}
