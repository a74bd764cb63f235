//! Error taxonomy shared by the simulator, the phase-plane analyzer and the
//! equilibrium solver.
//!
//! Every failure surfaces immediately to the caller. Simulations are pure, so
//! re-running a failed request with the same inputs reproduces the same error.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure raised while evaluating a rate function.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate function returned {got} components, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Malformed request, rejected before any integration work starts.
#[derive(Debug, Error)]
pub enum InvalidInput {
    #[error("time grid needs at least 2 points, got {count}")]
    TooFewTimePoints { count: usize },
    #[error("time grid is not strictly increasing at index {index}")]
    NonIncreasingTime { index: usize },
    #[error("time grid has a non-finite value at index {index}")]
    NonFiniteTime { index: usize },
    #[error("{what} has length {got}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("system dimension must be positive")]
    EmptySystem,
    #[error("rate constant `{name}` must be finite and non-negative, got {value}")]
    InvalidRate { name: &'static str, value: f64 },
    #[error("{0}")]
    Setting(String),
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("rate function failed at t = {t}: {source}")]
    Rate {
        t: f64,
        #[source]
        source: RateError,
    },
    #[error("non-finite value produced at t = {t}")]
    NonFinite { t: f64 },
    #[error("step size {step:e} fell below the minimum {min_step:e} at t = {t}")]
    StepSizeUnderflow { t: f64, step: f64, min_step: f64 },
    #[error("exceeded {max_steps} steps before reaching t = {target}")]
    TooManySteps { max_steps: usize, target: f64 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    /// The derivative vanishes in both slice dimensions, so the direction is undefined.
    #[error("direction undefined at {point:?}: derivative is zero in both dimensions")]
    DegenerateField { point: [f64; 2] },
    #[error("equilibrium solve failed: {0}")]
    Equilibrium(String),
}

impl Error {
    pub(crate) fn setting(message: impl Into<String>) -> Self {
        Error::InvalidInput(InvalidInput::Setting(message.into()))
    }
}
