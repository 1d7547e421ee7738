// Parameter smoothing and lock-free parameter cells
//
// The control domain writes (target, tau) pairs into AtomicF32 cells; the
// audio domain reads them whenever it likes and relaxes its live value toward
// the target:
//
//   value_{n+1} = value_n + (target - value_n) * (1 - e^{-dt/tau})
//
// Advancing by N samples of 1/sr each composes to exactly one step of dt = N/sr,
// so per-sample rendering and tick-level simulation agree.

use std::sync::atomic::{AtomicU32, Ordering};

/// Relaxation fraction covered in `dt` seconds with time constant `tau`.
#[inline]
pub fn relaxation_coeff(dt: f32, tau: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    if tau <= 0.0 {
        return 1.0;
    }
    1.0 - (-dt / tau).exp()
}

/// f32 stored as raw bits in an AtomicU32.
///
/// Single-scalar writes are never torn; readers may see the previous value for
/// a while, which the relaxation absorbs.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Live value chasing a target with exponential relaxation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedParam {
    value: f32,
    target: f32,
    tau: f32,
}

impl SmoothedParam {
    /// Start settled at `initial`
    pub fn new(initial: f32, tau: f32) -> Self {
        Self {
            value: initial,
            target: initial,
            tau,
        }
    }

    pub fn set_target(&mut self, target: f32, tau: f32) {
        self.target = target;
        self.tau = tau;
    }

    /// Advance the live value by `dt` seconds and return it
    #[inline]
    pub fn advance(&mut self, dt: f32) -> f32 {
        let k = relaxation_coeff(dt, self.tau);
        self.value += (self.target - self.value) * k;
        self.value
    }

    /// Advance by `samples` samples at `sample_rate`
    #[inline]
    pub fn advance_samples(&mut self, samples: usize, sample_rate: f32) -> f32 {
        self.advance(samples as f32 / sample_rate)
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn tau(&self) -> f32 {
        self.tau
    }
}
