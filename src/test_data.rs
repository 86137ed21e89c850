//! Deterministic synthetic elution traces shared by the unit tests
use crate::arrayops::linspace;
use crate::mixture::{ElutionTrace, MixtureParameters};

macro_rules! assert_is_close {
    ($t1:expr, $t2:expr, $tol:expr, $label:literal) => {
        assert!(
            ($t1 - $t2).abs() < $tol,
            "Observed {} {}, expected {}, difference {}",
            $label,
            $t1,
            $t2,
            $t1 - $t2,
        );
    };
}

pub(crate) use assert_is_close;

/// The two-component mixture used throughout the worked examples
pub fn reference_parameters() -> MixtureParameters {
    MixtureParameters::new(-1.2, 0.2, 2.0, -0.5, 0.2, 7.0)
}

/// Volumes sampled densely over `(0, 1.5]`
pub fn reference_volumes(n: usize) -> Vec<f64> {
    linspace(1.5 / n as f64, 1.5, n)
}

/// A noise-free trace drawn exactly from `params`
pub fn synthetic_trace(params: &MixtureParameters, n: usize) -> ElutionTrace<'static> {
    let volume = reference_volumes(n);
    let signal = params.predict(&volume);
    ElutionTrace::try_from((volume, signal)).unwrap()
}

/// The noise-free reference trace, built once and shared across tests
#[rstest::fixture]
#[once]
pub fn reference_trace() -> ElutionTrace<'static> {
    synthetic_trace(&reference_parameters(), 300)
}

/// Uniform noise in `[-1, 1]` from a xorshift generator, so every run sees the same values
pub fn noise(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

/// A trace drawn from `params` with additive noise of at most `amplitude`
pub fn noisy_signal(params: &MixtureParameters, volume: &[f64], amplitude: f64, seed: u64) -> Vec<f64> {
    params
        .predict(volume)
        .into_iter()
        .zip(noise(volume.len(), seed))
        .map(|(y, e)| y + amplitude * e)
        .collect()
}

pub fn noisy_trace(params: &MixtureParameters, n: usize, amplitude: f64, seed: u64) -> ElutionTrace<'static> {
    let volume = reference_volumes(n);
    let signal = noisy_signal(params, &volume, amplitude, seed);
    ElutionTrace::try_from((volume, signal)).unwrap()
}
