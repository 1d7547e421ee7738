// DSP module - the signal chain the music runs through
//
// chain owns the stage list and the control -> audio parameter contract;
// biquad, limiter and smoothing are its building blocks.

pub mod biquad;
pub mod chain;
pub mod limiter;
pub mod smoothing;
pub mod utils;

pub use chain::{ChainControl, ChainSpec, SignalChain, StageKind, StageSpec, StageTargets};
pub use limiter::LimiterSettings;
