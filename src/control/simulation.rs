// Offline controller simulation
//
// Drives the controller with a scripted reading sequence at a fixed tick and
// advances a real SignalChain's parameters by the same dt, without audio I/O.
// Used by `drill_shield simulate` and by the scenario tests.

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::control::controller::{MaskingController, MaskingState};
use crate::dsp::chain::SignalChain;
use crate::error::ConfigError;

/// Per-stage parameter snapshot after one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub target: f32,
    pub live: f32,
}

/// Everything observable after one simulated tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStep {
    pub tick: usize,
    pub time_secs: f32,
    pub reading: f32,
    pub state: MaskingState,
    pub changed: bool,
    pub tau: f32,
    pub stages: Vec<StageReport>,
}

impl SimulationStep {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Run `readings` through a fresh controller, one tick of `dt` seconds each
pub fn simulate_readings(
    config: &AppConfig,
    readings: &[f32],
    dt: f32,
    sample_rate: u32,
) -> Result<Vec<SimulationStep>, ConfigError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "dt".to_string(),
            reason: format!("must be > 0 (got {})", dt),
        });
    }
    let mut controller = MaskingController::new(&config.controller, &config.chain)?;
    let (mut chain, control) = SignalChain::build(&config.chain, sample_rate, 1)?;

    let mut steps = Vec::with_capacity(readings.len());
    for (tick, &reading) in readings.iter().enumerate() {
        let decision = controller.tick(reading, dt);
        decision.apply(&control);
        chain.advance_parameters(dt);

        let stages = decision
            .targets
            .iter()
            .map(|t| StageReport {
                name: controller.stage_name(t.index).unwrap_or_default().to_string(),
                target: t.value,
                live: chain.live_value_at(t.index).unwrap_or(t.value),
            })
            .collect();

        steps.push(SimulationStep {
            tick,
            time_secs: (tick + 1) as f32 * dt,
            reading,
            state: decision.state,
            changed: decision.changed(),
            tau: decision.tau,
            stages,
        });
    }
    Ok(steps)
}
