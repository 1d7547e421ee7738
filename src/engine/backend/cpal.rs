//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows)
//!
//! Streams are F32 only. When the default device config uses another sample
//! format, an F32 config at the same rate is looked up instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use serde::Serialize;

use crate::audio::{MicrophoneSink, MusicRenderer};
use crate::error::AudioError;

use super::{ActiveStream, AudioBackend, MicrophoneStream, OutputFormat};

struct CpalStream {
    _stream: cpal::Stream,
    label: String,
}

impl ActiveStream for CpalStream {
    fn describe(&self) -> &str {
        &self.label
    }
}

/// Default-device CPAL backend
#[derive(Default)]
pub struct CpalBackend {
    _unit: (),
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open_failed(context: &str, err: impl std::fmt::Debug) -> AudioError {
    AudioError::StreamOpenFailed {
        reason: format!("{}: {:?}", context, err),
    }
}

/// Hosts report refused microphone access as backend-specific errors
fn classify_input_error(err: cpal::BuildStreamError) -> AudioError {
    let text = err.to_string().to_lowercase();
    if text.contains("permission") || text.contains("denied") || text.contains("not authorized") {
        AudioError::PermissionDenied
    } else {
        open_failed("Failed to build input stream", err)
    }
}

fn output_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })
}

fn f32_output_config(device: &cpal::Device) -> Result<cpal::StreamConfig, AudioError> {
    let default = device
        .default_output_config()
        .map_err(|e| open_failed("Failed to get default output config", e))?;
    if default.sample_format() == cpal::SampleFormat::F32 {
        return Ok(default.into());
    }

    let rate = default.sample_rate();
    device
        .supported_output_configs()
        .map_err(|e| open_failed("Failed to list output configs", e))?
        .find(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .map(|range| range.with_sample_rate(rate).into())
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for output".to_string(),
        })
}

fn f32_input_config(device: &cpal::Device) -> Result<cpal::StreamConfig, AudioError> {
    let default = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::BackendSpecific { ref err }
            if err.description.to_lowercase().contains("permission") =>
        {
            AudioError::PermissionDenied
        }
        other => open_failed("Failed to get default input config", other),
    })?;
    if default.sample_format() == cpal::SampleFormat::F32 {
        return Ok(default.into());
    }

    let rate = default.sample_rate();
    device
        .supported_input_configs()
        .map_err(|e| open_failed("Failed to list input configs", e))?
        .find(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .map(|range| range.with_sample_rate(rate).into())
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for input".to_string(),
        })
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn output_format(&self) -> Result<OutputFormat, AudioError> {
        let config = f32_output_config(&output_device()?)?;
        Ok(OutputFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        })
    }

    fn open_microphone(&self, mut sink: MicrophoneSink) -> Result<MicrophoneStream, AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default input device found".to_string(),
            })?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let stream_config = f32_input_config(&device)?;
        let channels = stream_config.channels as usize;

        let disconnected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&disconnected);
        let err_fn = move |err: cpal::StreamError| {
            log::error!("[CpalBackend] Input stream error: {}", err);
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                flag.store(true, Ordering::Relaxed);
            }
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.push_interleaved(data, channels);
                },
                err_fn,
                None,
            )
            .map_err(classify_input_error)?;
        stream
            .play()
            .map_err(|e| open_failed("Failed to start input stream", e))?;

        log::info!(
            "[CpalBackend] Microphone '{}' open: {} Hz, {} ch",
            name,
            stream_config.sample_rate.0,
            channels
        );

        Ok(MicrophoneStream {
            stream: Box::new(CpalStream {
                _stream: stream,
                label: format!("input:{}", name),
            }),
            sample_rate: stream_config.sample_rate.0,
            disconnected,
        })
    }

    fn open_output(&self, mut renderer: MusicRenderer) -> Result<Box<dyn ActiveStream>, AudioError> {
        let device = output_device()?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let stream_config = f32_output_config(&device)?;

        let err_fn = |err: cpal::StreamError| log::error!("[CpalBackend] Output stream error: {}", err);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| open_failed("Failed to build output stream", e))?;
        stream
            .play()
            .map_err(|e| open_failed("Failed to start output stream", e))?;

        log::info!(
            "[CpalBackend] Output '{}' open: {} Hz, {} ch",
            name,
            stream_config.sample_rate.0,
            stream_config.channels
        );

        Ok(Box::new(CpalStream {
            _stream: stream,
            label: format!("output:{}", name),
        }))
    }
}

/// One audio device as seen by the default host
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Enumerate input and output devices on the default host
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let default_out = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();

    let inputs = host
        .input_devices()
        .map_err(|e| AudioError::HardwareError {
            details: format!("Failed to enumerate input devices: {}", e),
        })?;
    for device in inputs {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let config = device.default_input_config().ok();
        devices.push(DeviceInfo {
            is_default: default_in.as_deref() == Some(name.as_str()),
            name,
            is_input: true,
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
            channels: config.as_ref().map(|c| c.channels()),
        });
    }

    let outputs = host
        .output_devices()
        .map_err(|e| AudioError::HardwareError {
            details: format!("Failed to enumerate output devices: {}", e),
        })?;
    for device in outputs {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let config = device.default_output_config().ok();
        devices.push(DeviceInfo {
            is_default: default_out.as_deref() == Some(name.as_str()),
            name,
            is_input: false,
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
            channels: config.as_ref().map(|c| c.channels()),
        });
    }

    Ok(devices)
}
