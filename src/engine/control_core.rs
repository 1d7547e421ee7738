// ControlCore - everything one control tick does
//
//   drain mic buffers -> analyzer.refresh() -> metric.reading()
//     -> controller.tick() -> chain targets -> status/spectrum fan-out
//
// Owned by the control loop thread. Nothing here blocks on I/O; the only
// locks taken are the broadcast manager's snapshot mutexes, which the audio
// callbacks never touch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::{DetectionMetric, FrequencyAnalyzer, SpectrumStatus};
use crate::audio::MicrophoneSource;
use crate::control::{ControlDecision, MaskingController, StatusEvent};
use crate::dsp::chain::ChainControl;
use crate::managers::BroadcastChannelManager;

/// What a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// No usable spectrum; targets and status left as they were
    Skipped {
        status: SpectrumStatus,
        drained_samples: usize,
    },
    /// Controller ran and targets were written
    Applied {
        decision: ControlDecision,
        drained_samples: usize,
        held: bool,
    },
}

pub struct ControlCore {
    microphone: MicrophoneSource,
    disconnected: Arc<AtomicBool>,
    analyzer: FrequencyAnalyzer,
    metric: DetectionMetric,
    controller: MaskingController,
    chain: ChainControl,
    broadcasts: BroadcastChannelManager,
    epoch: Instant,
    ticks: u64,
}

impl ControlCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        microphone: MicrophoneSource,
        disconnected: Arc<AtomicBool>,
        analyzer: FrequencyAnalyzer,
        metric: DetectionMetric,
        controller: MaskingController,
        chain: ChainControl,
        broadcasts: BroadcastChannelManager,
        epoch: Instant,
    ) -> Self {
        Self {
            microphone,
            disconnected,
            analyzer,
            metric,
            controller,
            chain,
            broadcasts,
            epoch,
            ticks: 0,
        }
    }

    pub fn tick(&mut self, dt: f32) -> TickReport {
        self.ticks += 1;

        let analyzer = &mut self.analyzer;
        let drained_samples = self.microphone.drain(|samples| analyzer.ingest(samples));

        if self.disconnected.load(Ordering::Relaxed) {
            self.analyzer.mark_disconnected();
        }

        let status = self.analyzer.refresh();
        let frame = match self.analyzer.current_spectrum() {
            Some(frame) => frame,
            None => {
                if self.ticks % 60 == 1 {
                    tracing::debug!("[ControlCore] No microphone signal ({:?}); holding targets", status);
                }
                return TickReport::Skipped {
                    status,
                    drained_samples,
                };
            }
        };

        let reading = self.metric.reading(frame);
        if status == SpectrumStatus::Live {
            self.broadcasts.publish_spectrum(frame);
        }

        let decision = self.controller.tick(reading, dt);
        decision.apply(&self.chain);

        if decision.changed() {
            tracing::info!(
                "[ControlCore] {:?} -> {:?} (reading {:.1})",
                decision.previous,
                decision.state,
                reading
            );
        }

        self.broadcasts
            .publish_status(StatusEvent::tick(decision.state, reading, self.elapsed_ms()));

        TickReport::Applied {
            decision,
            drained_samples,
            held: status == SpectrumStatus::Held,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn controller(&self) -> &MaskingController {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferPool;
    use crate::config::{AnalyzerConfig, ControllerConfig, Reduction};
    use crate::control::{MaskingState, SessionStatus};
    use crate::dsp::chain::{ChainSpec, SignalChain};

    struct Rig {
        core: ControlCore,
        sink: crate::audio::MicrophoneSink,
        disconnected: Arc<AtomicBool>,
        control: ChainControl,
        broadcasts: BroadcastChannelManager,
    }

    fn rig() -> Rig {
        let (sink, source) = BufferPool::new(8, 1024).unwrap().split_for_threads();
        let spec = ChainSpec::default();
        let (_chain, control) = SignalChain::build(&spec, 48_000, 2).unwrap();
        let broadcasts = BroadcastChannelManager::new();
        let disconnected = Arc::new(AtomicBool::new(false));
        let core = ControlCore::new(
            source,
            Arc::clone(&disconnected),
            FrequencyAnalyzer::new(AnalyzerConfig::default(), 48_000),
            DetectionMetric::new(40..100, 128, Reduction::Mean).unwrap(),
            MaskingController::new(&ControllerConfig::default(), &spec).unwrap(),
            control.clone(),
            broadcasts.clone(),
            Instant::now(),
        );
        Rig {
            core,
            sink,
            disconnected,
            control,
            broadcasts,
        }
    }

    fn noise(len: usize) -> Vec<f32> {
        // Deterministic broadband signal
        let mut state = 0x1234_5678u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_skips_without_microphone_data() {
        let mut rig = rig();
        let mut rx = rig.broadcasts.subscribe_status();
        assert!(matches!(rig.core.tick(0.016), TickReport::Skipped { .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(rig.control.target(0), Some(0.0));
    }

    #[test]
    fn test_noise_boosts_and_silence_releases() {
        let mut rig = rig();
        let mut rx = rig.broadcasts.subscribe_status();

        for _ in 0..10 {
            rig.sink.push_interleaved(&noise(512), 1);
            rig.core.tick(0.016);
        }
        assert_eq!(rig.core.controller().state(), MaskingState::Boosted);
        assert_eq!(rig.control.target(0), Some(15.0));

        for _ in 0..40 {
            rig.sink.push_interleaved(&[0.0; 512], 1);
            rig.core.tick(0.016);
        }
        assert_eq!(rig.core.controller().state(), MaskingState::Idle);
        assert_eq!(rig.control.target(0), Some(0.0));

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            statuses.push(event.status);
        }
        assert!(statuses.contains(&SessionStatus::Boosted));
        assert_eq!(statuses.last(), Some(&SessionStatus::Idle));
        assert!(rig.broadcasts.latest_spectrum().is_some());
    }

    #[test]
    fn test_disconnect_skips_and_holds_targets() {
        let mut rig = rig();
        for _ in 0..10 {
            rig.sink.push_interleaved(&noise(512), 1);
            rig.core.tick(0.016);
        }
        assert_eq!(rig.control.target(0), Some(15.0));

        rig.disconnected.store(true, Ordering::Relaxed);
        let report = rig.core.tick(0.016);
        assert!(matches!(
            report,
            TickReport::Skipped {
                status: SpectrumStatus::NoSignal,
                ..
            }
        ));
        assert_eq!(rig.control.target(0), Some(15.0));
    }

    #[test]
    fn test_held_frame_still_drives_controller() {
        let mut rig = rig();
        rig.sink.push_interleaved(&noise(512), 1);
        rig.core.tick(0.016);
        match rig.core.tick(0.016) {
            TickReport::Applied { held, .. } => assert!(held),
            other => panic!("unexpected {:?}", other),
        }
    }
}
