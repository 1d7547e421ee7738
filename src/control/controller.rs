// Masking controller - two-state machine driving the chain targets
//
//   IDLE    --reading >= threshold-->              BOOSTED
//   BOOSTED --reading <  threshold - hysteresis--> IDLE
//
// Transitions are additionally held off until the current state has lasted
// min_dwell_secs. Every tick re-issues the full target set so a missed atomic
// write heals on the next tick.

use serde::{Deserialize, Serialize};

use crate::analysis::DetectionReading;
use crate::config::ControllerConfig;
use crate::dsp::chain::{ChainControl, ChainSpec, StageTargets};
use crate::error::{check_tau, ConfigError};

pub const LABEL_IDLE: &str = "Monitoring...";
pub const LABEL_BOOSTED: &str = "DRILL DETECTED - BOOSTING SHIELD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaskingState {
    Idle,
    Boosted,
}

impl MaskingState {
    /// Human-readable status line
    pub fn label(&self) -> &'static str {
        match self {
            MaskingState::Idle => LABEL_IDLE,
            MaskingState::Boosted => LABEL_BOOSTED,
        }
    }
}

/// Requested value for one chain stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTarget {
    pub index: usize,
    pub value: f32,
}

/// Output of one controller tick
#[derive(Debug, Clone, PartialEq)]
pub struct ControlDecision {
    pub state: MaskingState,
    pub previous: MaskingState,
    pub reading: DetectionReading,
    /// Time constant that accompanies every target in this decision
    pub tau: f32,
    pub targets: Vec<StageTarget>,
}

impl ControlDecision {
    pub fn changed(&self) -> bool {
        self.state != self.previous
    }

    /// Write every target into the chain's parameter cells
    pub fn apply(&self, chain: &ChainControl) {
        for target in &self.targets {
            chain.set_target(target.index, target.value, self.tau);
        }
    }
}

#[derive(Debug, Clone)]
struct ModulatedStage {
    index: usize,
    name: String,
    targets: StageTargets,
}

#[derive(Debug, Clone)]
pub struct MaskingController {
    config: ControllerConfig,
    stages: Vec<ModulatedStage>,
    state: MaskingState,
    time_in_state: f32,
}

impl MaskingController {
    /// Controller for the modulated stages of `chain`, starting IDLE
    pub fn new(config: &ControllerConfig, chain: &ChainSpec) -> Result<Self, ConfigError> {
        check_tau("controller.attack_tau", config.attack_tau)?;
        check_tau("controller.release_tau", config.release_tau)?;
        chain.validate()?;

        let stages = chain
            .stages
            .iter()
            .enumerate()
            .filter_map(|(index, stage)| {
                stage.targets.map(|targets| ModulatedStage {
                    index,
                    name: stage.name.clone(),
                    targets,
                })
            })
            .collect();

        Ok(Self {
            config: *config,
            stages,
            state: MaskingState::Idle,
            time_in_state: f32::INFINITY,
        })
    }

    /// Advance the state machine by one tick of `dt` seconds.
    ///
    /// A NaN reading counts as "no detection".
    pub fn tick(&mut self, reading: DetectionReading, dt: f32) -> ControlDecision {
        let previous = self.state;
        self.time_in_state += dt.max(0.0);

        let boost = match self.state {
            MaskingState::Idle => reading >= self.config.threshold,
            MaskingState::Boosted => reading >= self.config.threshold - self.config.hysteresis,
        };
        let candidate = if boost {
            MaskingState::Boosted
        } else {
            MaskingState::Idle
        };

        if candidate != self.state && self.time_in_state >= self.config.min_dwell_secs {
            log::debug!(
                "[Controller] {:?} -> {:?} (reading {:.1}, threshold {:.1})",
                self.state,
                candidate,
                reading,
                self.config.threshold
            );
            self.state = candidate;
            self.time_in_state = 0.0;
        }

        ControlDecision {
            state: self.state,
            previous,
            reading,
            tau: self.current_tau(),
            targets: self.targets(),
        }
    }

    /// Targets for the current state
    pub fn targets(&self) -> Vec<StageTarget> {
        self.stages
            .iter()
            .map(|stage| StageTarget {
                index: stage.index,
                value: match self.state {
                    MaskingState::Idle => stage.targets.idle,
                    MaskingState::Boosted => stage.targets.boosted,
                },
            })
            .collect()
    }

    pub fn current_tau(&self) -> f32 {
        match self.state {
            MaskingState::Idle => self.config.release_tau,
            MaskingState::Boosted => self.config.attack_tau,
        }
    }

    pub fn state(&self) -> MaskingState {
        self.state
    }

    /// Name of the chain stage at `index`, if it is modulated
    pub fn stage_name(&self, index: usize) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| s.index == index)
            .map(|s| s.name.as_str())
    }

    /// Back to IDLE, as if freshly constructed
    pub fn reset(&mut self) {
        self.state = MaskingState::Idle;
        self.time_in_state = f32::INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::chain::{SignalChain, StageKind, StageSpec};

    fn controller(config: ControllerConfig) -> MaskingController {
        MaskingController::new(&config, &ChainSpec::default()).unwrap()
    }

    #[test]
    fn test_starts_idle_with_idle_targets() {
        let c = controller(ControllerConfig::default());
        assert_eq!(c.state(), MaskingState::Idle);
        assert_eq!(c.targets(), vec![StageTarget { index: 0, value: 0.0 }]);
    }

    #[test]
    fn test_threshold_boundary_boosts() {
        let mut c = controller(ControllerConfig::default());
        let d = c.tick(49.99, 0.016);
        assert_eq!(d.state, MaskingState::Idle);
        let d = c.tick(50.0, 0.016);
        assert_eq!(d.state, MaskingState::Boosted);
        assert!(d.changed());
        assert_eq!(d.targets[0].value, 15.0);
    }

    #[test]
    fn test_tau_follows_state() {
        let config = ControllerConfig::default();
        let mut c = controller(config);
        assert_eq!(c.tick(80.0, 0.016).tau, config.attack_tau);
        assert_eq!(c.tick(80.0, 0.016).tau, config.attack_tau);
        assert_eq!(c.tick(10.0, 0.016).tau, config.release_tau);
    }

    #[test]
    fn test_same_reading_twice_keeps_state() {
        let mut c = controller(ControllerConfig::default());
        c.tick(70.0, 0.016);
        let d = c.tick(70.0, 0.016);
        assert_eq!(d.state, MaskingState::Boosted);
        assert!(!d.changed());
    }

    #[test]
    fn test_hysteresis_delays_release() {
        let mut c = controller(ControllerConfig {
            hysteresis: 5.0,
            ..ControllerConfig::default()
        });
        assert_eq!(c.tick(55.0, 0.016).state, MaskingState::Boosted);
        assert_eq!(c.tick(47.0, 0.016).state, MaskingState::Boosted);
        assert_eq!(c.tick(44.9, 0.016).state, MaskingState::Idle);
        // Re-entry still needs the full threshold
        assert_eq!(c.tick(47.0, 0.016).state, MaskingState::Idle);
    }

    #[test]
    fn test_min_dwell_suppresses_chatter() {
        let mut c = controller(ControllerConfig {
            min_dwell_secs: 0.1,
            ..ControllerConfig::default()
        });
        assert_eq!(c.tick(60.0, 0.05).state, MaskingState::Boosted);
        assert_eq!(c.tick(10.0, 0.05).state, MaskingState::Boosted);
        assert_eq!(c.tick(10.0, 0.05).state, MaskingState::Idle);
    }

    #[test]
    fn test_nan_reading_is_no_detection() {
        let mut c = controller(ControllerConfig::default());
        c.tick(90.0, 0.016);
        assert_eq!(c.tick(f32::NAN, 0.016).state, MaskingState::Idle);
    }

    #[test]
    fn test_invalid_tau_rejected() {
        let config = ControllerConfig {
            release_tau: -0.5,
            ..ControllerConfig::default()
        };
        assert!(matches!(
            MaskingController::new(&config, &ChainSpec::default()),
            Err(ConfigError::InvalidTimeConstant { .. })
        ));
    }

    #[test]
    fn test_limiter_stages_get_no_targets() {
        let chain = ChainSpec {
            stages: vec![
                StageSpec::modulated("drive", StageKind::Gain, 1.0, 10.0),
                StageSpec::fixed(
                    "ceiling",
                    StageKind::Limiter(crate::dsp::limiter::LimiterSettings::default()),
                ),
            ],
        };
        let mut c = MaskingController::new(&ControllerConfig::default(), &chain).unwrap();
        let d = c.tick(99.0, 0.016);
        assert_eq!(d.targets, vec![StageTarget { index: 0, value: 10.0 }]);
        assert_eq!(c.stage_name(0), Some("drive"));
        assert_eq!(c.stage_name(1), None);
    }

    #[test]
    fn test_apply_writes_chain_targets() {
        let spec = ChainSpec::default();
        let (_chain, control) = SignalChain::build(&spec, 48_000, 2).unwrap();
        let mut c = controller(ControllerConfig::default());

        c.tick(75.0, 0.016).apply(&control);
        assert_eq!(control.target(0), Some(15.0));

        c.tick(5.0, 0.016).apply(&control);
        assert_eq!(control.target(0), Some(0.0));
    }

    #[test]
    fn test_labels() {
        assert_eq!(MaskingState::Idle.label(), "Monitoring...");
        assert_eq!(
            MaskingState::Boosted.label(),
            "DRILL DETECTED - BOOSTING SHIELD"
        );
    }
}
