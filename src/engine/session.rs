// PlaybackSession: lifecycle of one masking session
//
// STOPPED -> start(track) -> STARTING -> RUNNING -> stop() -> STOPPED
//
// A running session owns exactly one bundle of resources:
//   - the control loop thread (analyzer -> metric -> controller -> chain targets)
//   - the microphone stream
//   - the output stream (renderer + signal chain)
// start() while RUNNING tears the old bundle down before acquiring anything.
// Any failure during start drops what was acquired, publishes an ERROR status
// and leaves the session STOPPED.
//
// Device streams are not Send on every host, so a session lives on the thread
// that created it. Observers use the broadcast channels, which are.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::analysis::{DetectionMetric, FrequencyAnalyzer, SpectrumFrame};
use crate::audio::{BufferPool, MusicRenderer, TrackLoader, TrackRef};
use crate::config::AppConfig;
use crate::control::{MaskingController, StatusEvent};
use crate::dsp::chain::SignalChain;
use crate::error::{log_audio_error, log_config_error, AudioError};
use crate::managers::BroadcastChannelManager;

use super::backend::{ActiveStream, AudioBackend, MicrophoneStream};
use super::control_core::ControlCore;
use super::scheduler::ControlLoop;

const CONTROL_THREAD_NAME: &str = "drill-shield-control";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
}

/// Resources held while RUNNING. Field order is teardown order.
struct RunningSession {
    track: TrackRef,
    control_loop: ControlLoop,
    microphone: MicrophoneStream,
    output: Box<dyn ActiveStream>,
}

impl RunningSession {
    fn shutdown(mut self) {
        self.control_loop.stop();
        log::debug!("[PlaybackSession] Releasing {}", self.microphone.stream.describe());
        drop(self.microphone);
        log::debug!("[PlaybackSession] Releasing {}", self.output.describe());
        drop(self.output);
    }
}

pub struct PlaybackSession {
    config: AppConfig,
    backend: Arc<dyn AudioBackend>,
    loader: Arc<dyn TrackLoader>,
    broadcasts: BroadcastChannelManager,
    state: SessionState,
    running: Option<RunningSession>,
    epoch: Instant,
}

impl PlaybackSession {
    pub fn new(config: AppConfig, backend: Arc<dyn AudioBackend>, loader: Arc<dyn TrackLoader>) -> Self {
        Self {
            config,
            backend,
            loader,
            broadcasts: BroadcastChannelManager::new(),
            state: SessionState::Stopped,
            running: None,
            epoch: Instant::now(),
        }
    }

    /// Start masking with `track`.
    ///
    /// A running session is stopped first. On error the session is STOPPED,
    /// no device is held, and an ERROR status has been published.
    pub fn start(&mut self, track: &TrackRef) -> Result<(), AudioError> {
        if self.running.is_some() {
            log::info!(
                "[PlaybackSession] Start requested while running; stopping current session first"
            );
            self.stop()?;
        }

        self.state = SessionState::Starting;
        self.broadcasts
            .publish_status(StatusEvent::starting(self.elapsed_ms()));

        match self.acquire(track) {
            Ok(running) => {
                log::info!(
                    "[PlaybackSession] Running '{}' on {} backend",
                    track,
                    self.backend.name()
                );
                self.running = Some(running);
                self.state = SessionState::Running;
                Ok(())
            }
            Err(err) => {
                log_audio_error(&err, "start");
                self.state = SessionState::Stopped;
                self.broadcasts.clear_spectrum();
                self.broadcasts
                    .publish_status(StatusEvent::error(&err, self.elapsed_ms()));
                Err(err)
            }
        }
    }

    /// Stop the session. Stopping a stopped session is a no-op.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        let Some(running) = self.running.take() else {
            self.state = SessionState::Stopped;
            return Ok(());
        };

        let track = running.track.clone();
        running.shutdown();

        self.state = SessionState::Stopped;
        self.broadcasts.clear_spectrum();
        self.broadcasts
            .publish_status(StatusEvent::stopped(self.elapsed_ms()));
        log::info!("[PlaybackSession] Stopped '{}'", track);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Track of the running session
    pub fn current_track(&self) -> Option<&TrackRef> {
        self.running.as_ref().map(|r| &r.track)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.broadcasts.subscribe_status()
    }

    /// Status events as a stream. Lagged receivers skip what they missed.
    pub fn status_stream(&self) -> impl Stream<Item = StatusEvent> + Send + 'static {
        BroadcastStream::new(self.broadcasts.subscribe_status())
            .filter_map(|result| async move { result.ok() })
    }

    pub fn last_status(&self) -> Option<StatusEvent> {
        self.broadcasts.last_status()
    }

    pub fn subscribe_spectrum(&self) -> broadcast::Receiver<SpectrumFrame> {
        self.broadcasts.subscribe_spectrum()
    }

    pub fn latest_spectrum(&self) -> Option<SpectrumFrame> {
        self.broadcasts.latest_spectrum()
    }

    pub fn broadcasts(&self) -> &BroadcastChannelManager {
        &self.broadcasts
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Acquire everything a running session needs. Anything acquired before
    /// a failing step is dropped on the way out.
    fn acquire(&self, track: &TrackRef) -> Result<RunningSession, AudioError> {
        let config = &self.config;
        config.validate().map_err(|err| {
            log_config_error(&err, "session start");
            err
        })?;

        let format = self.backend.output_format()?;
        let buffer = self.loader.load(track)?;
        log::debug!(
            "[PlaybackSession] Loaded '{}': {:.1}s, {} ch @ {} Hz",
            track,
            buffer.duration_secs(),
            buffer.channels(),
            buffer.sample_rate()
        );

        let (sink, source) =
            BufferPool::new(config.audio.buffer_pool_size, config.audio.buffer_size)?
                .split_for_threads();
        let microphone = self.backend.open_microphone(sink)?;

        let analyzer = FrequencyAnalyzer::new(config.analyzer, microphone.sample_rate);
        let metric = DetectionMetric::from_band(
            &config.detection.range,
            config.detection.reduction,
            microphone.sample_rate,
            analyzer.fft_size(),
        )?;
        let controller = MaskingController::new(&config.controller, &config.chain)?;

        let (chain, control) =
            SignalChain::build(&config.chain, format.sample_rate, format.channels as usize)?;
        let renderer = MusicRenderer::new(buffer, chain, format.sample_rate, config.session.loop_track);
        let output = self.backend.open_output(renderer)?;

        let mut core = ControlCore::new(
            source,
            Arc::clone(&microphone.disconnected),
            analyzer,
            metric,
            controller,
            control,
            self.broadcasts.clone(),
            self.epoch,
        );
        let interval = Duration::from_millis(config.session.tick_interval_ms);
        let control_loop = ControlLoop::spawn(CONTROL_THREAD_NAME, interval, move |dt, _| {
            core.tick(dt);
        })?;

        Ok(RunningSession {
            track: track.clone(),
            control_loop,
            microphone,
            output,
        })
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MemoryTrackLoader, TrackBuffer};
    use crate::control::SessionStatus;
    use crate::engine::backend::StubBackend;

    fn session_with(backend: &StubBackend) -> PlaybackSession {
        let loader = MemoryTrackLoader::new();
        loader.insert(
            "tone",
            TrackBuffer::from_interleaved(vec![0.25; 4800], 1, 48_000).unwrap(),
        );
        PlaybackSession::new(
            AppConfig::default(),
            Arc::new(backend.clone()),
            Arc::new(loader),
        )
    }

    #[test]
    fn test_start_and_stop() {
        let backend = StubBackend::new();
        let mut session = session_with(&backend);
        assert_eq!(session.state(), SessionState::Stopped);

        session.start(&TrackRef::new("tone")).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.current_track().map(|t| t.as_str()), Some("tone"));
        assert_eq!(backend.open_microphones(), 1);
        assert_eq!(backend.open_outputs(), 1);

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(backend.open_microphones(), 0);
        assert_eq!(backend.open_outputs(), 0);
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let backend = StubBackend::new();
        let mut session = session_with(&backend);
        session.start(&TrackRef::new("tone")).unwrap();
        session.stop().unwrap();

        let mut rx = session.subscribe_status();
        session.stop().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_missing_track_reports_error() {
        let backend = StubBackend::new();
        let mut session = session_with(&backend);
        let mut rx = session.subscribe_status();

        let err = session.start(&TrackRef::new("nope")).unwrap_err();
        assert!(matches!(err, AudioError::TrackNotFound { .. }));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(backend.open_microphones(), 0);

        assert_eq!(rx.try_recv().unwrap().status, SessionStatus::Starting);
        assert_eq!(rx.try_recv().unwrap().status, SessionStatus::Error);
    }

    #[test]
    fn test_output_failure_releases_microphone() {
        let backend = StubBackend::new();
        backend.fail_output(true);
        let mut session = session_with(&backend);

        let err = session.start(&TrackRef::new("tone")).unwrap_err();
        assert!(matches!(err, AudioError::StreamOpenFailed { .. }));
        assert_eq!(backend.microphones_opened(), 1);
        assert_eq!(backend.open_microphones(), 0);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_devices() {
        let backend = StubBackend::new();
        let mut config = AppConfig::default();
        config.controller.attack_tau = 0.0;
        let mut session = PlaybackSession::new(
            config,
            Arc::new(backend.clone()),
            Arc::new(MemoryTrackLoader::new()),
        );

        assert!(session.start(&TrackRef::new("tone")).is_err());
        assert_eq!(backend.microphones_opened(), 0);
        assert_eq!(backend.outputs_opened(), 0);
    }

    #[test]
    fn test_drop_releases_devices() {
        let backend = StubBackend::new();
        {
            let mut session = session_with(&backend);
            session.start(&TrackRef::new("tone")).unwrap();
        }
        assert_eq!(backend.open_microphones(), 0);
        assert_eq!(backend.open_outputs(), 0);
    }
}
