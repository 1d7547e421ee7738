//! Small numeric helpers shared by the DSP stages.

/// Floor used when converting linear amplitudes to dB
pub const DB_EPS: f32 = 1e-20;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole smoothing coefficient for a time constant given in milliseconds.
///
/// Returns the fraction of the previous state kept per sample.
#[inline]
pub fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    if ms <= 0.0 {
        return 0.0;
    }
    (-1.0 / (ms * 0.001 * sample_rate)).exp()
}
