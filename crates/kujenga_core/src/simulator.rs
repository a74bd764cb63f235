//! ODE simulator: integrates a rate function and reports the state at each
//! requested time point.
//!
//! The default method is the adaptive Tsit5 pair. Steps are clipped so the
//! integrator lands exactly on every requested time, so output points carry
//! no interpolation error. Values are never clamped: a proportion may leave
//! `[0, 1]` or a population go negative under pathological inputs, and it is
//! up to the caller to guard against that.

use crate::error::{Error, IntegrationError, InvalidInput, Result};
use crate::solvers::{Tsit5, RK4};
use crate::traits::{DynamicalSystem, Steppable};
use crate::trajectory::{IntegrationStats, Trajectory};
use crate::util::all_finite;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Method {
    /// Adaptive Tsitouras 5(4) with local error control.
    Tsit5,
    /// Classic RK4 with steps no larger than `step`.
    Rk4 { step: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    /// First trial step. Defaults to a thousandth of the time span.
    pub initial_step: Option<f64>,
    pub min_step: f64,
    /// Unbounded when `None`.
    pub max_step: Option<f64>,
    /// Attempted steps (accepted or rejected) before giving up.
    pub max_steps: usize,
    pub safety: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: Method::Tsit5,
            rtol: 1e-8,
            atol: 1e-10,
            initial_step: None,
            min_step: 1e-12,
            max_step: None,
            max_steps: 200_000,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(Error::setting("rtol must be finite and positive."));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(Error::setting("atol must be finite and positive."));
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return Err(Error::setting("min_step must be finite and positive."));
        }
        if let Some(max_step) = self.max_step {
            if max_step.is_nan() || max_step < self.min_step {
                return Err(Error::setting("max_step must be at least min_step."));
            }
        }
        if let Some(initial) = self.initial_step {
            if !initial.is_finite() || initial <= 0.0 {
                return Err(Error::setting("initial_step must be finite and positive."));
            }
        }
        if self.max_steps == 0 {
            return Err(Error::setting("max_steps must be greater than zero."));
        }
        if !(self.safety > 0.0 && self.safety <= 1.0) {
            return Err(Error::setting("safety must lie in (0, 1]."));
        }
        if !(self.min_factor > 0.0 && self.min_factor < 1.0 && self.max_factor > 1.0) {
            return Err(Error::setting(
                "step factors need 0 < min_factor < 1 < max_factor.",
            ));
        }
        if let Method::Rk4 { step } = self.method {
            if !step.is_finite() || step <= 0.0 {
                return Err(Error::setting("RK4 step must be finite and positive."));
            }
        }
        Ok(())
    }
}

/// Checks that `times` has at least two finite, strictly increasing entries.
pub fn validate_time_grid(times: &[f64]) -> Result<()> {
    if times.len() < 2 {
        return Err(InvalidInput::TooFewTimePoints { count: times.len() }.into());
    }
    for (index, t) in times.iter().enumerate() {
        if !t.is_finite() {
            return Err(InvalidInput::NonFiniteTime { index }.into());
        }
    }
    for (index, pair) in times.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(InvalidInput::NonIncreasingTime { index: index + 1 }.into());
        }
    }
    Ok(())
}

/// Integrates `system` from `initial` and samples it at every entry of `times`.
///
/// The first state of the result is `initial` itself, taken to hold at
/// `times[0]`. Initial values are not range checked.
pub fn simulate<S>(
    system: &S,
    initial: &[f64],
    times: &[f64],
    settings: &IntegratorSettings,
) -> Result<Trajectory>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = system.dimension();
    if dim == 0 {
        return Err(InvalidInput::EmptySystem.into());
    }
    if initial.len() != dim {
        return Err(InvalidInput::DimensionMismatch {
            what: "initial state",
            expected: dim,
            got: initial.len(),
        }
        .into());
    }
    validate_time_grid(times)?;
    settings.validate()?;

    let (states, stats) = match settings.method {
        Method::Tsit5 => integrate_adaptive(system, initial, times, settings)?,
        Method::Rk4 { step } => integrate_fixed(system, initial, times, step, settings.max_steps)?,
    };

    debug!(
        dimension = dim,
        points = times.len(),
        accepted = stats.accepted_steps,
        rejected = stats.rejected_steps,
        evaluations = stats.rate_evaluations,
        "simulation finished"
    );

    Ok(Trajectory::new(times.to_vec(), states, stats))
}

fn integrate_adaptive<S>(
    system: &S,
    initial: &[f64],
    times: &[f64],
    settings: &IntegratorSettings,
) -> Result<(Vec<Vec<f64>>, IntegrationStats), IntegrationError>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = initial.len();
    let mut stepper = Tsit5::new(dim);
    let mut state = initial.to_vec();
    let mut next = vec![0.0; dim];
    let mut error = vec![0.0; dim];
    let mut stats = IntegrationStats::default();
    let mut states = Vec::with_capacity(times.len());
    states.push(initial.to_vec());

    let span = times[times.len() - 1] - times[0];
    let max_step = settings.max_step.unwrap_or(f64::INFINITY);
    let mut h = settings
        .initial_step
        .unwrap_or(span * 1e-3)
        .clamp(settings.min_step, max_step);
    let mut t = times[0];
    let mut attempts = 0usize;

    for &target in &times[1..] {
        while t < target {
            if attempts >= settings.max_steps {
                return Err(IntegrationError::TooManySteps {
                    max_steps: settings.max_steps,
                    target,
                });
            }
            attempts += 1;

            let remaining = target - t;
            let mut dt = h.min(max_step);
            // Land on the output time rather than leave a sliver behind.
            let landing = dt >= remaining || remaining - dt < settings.min_step;
            if landing {
                dt = remaining;
            }

            stepper
                .try_step(&system, t, &state, dt, &mut next, &mut error)
                .map_err(|source| IntegrationError::Rate { t, source })?;

            let err = error_norm(&state, &next, &error, settings.rtol, settings.atol);
            if !err.is_finite() || !all_finite(&next) {
                stats.rejected_steps += 1;
                h = dt * settings.min_factor;
                if h < settings.min_step {
                    return Err(IntegrationError::NonFinite { t });
                }
                continue;
            }

            if err <= 1.0 {
                state.copy_from_slice(&next);
                stepper.accept();
                t = if landing { target } else { t + dt };
                stats.accepted_steps += 1;

                let factor = if err == 0.0 {
                    settings.max_factor
                } else {
                    (settings.safety * err.powf(-0.2)).clamp(settings.min_factor, settings.max_factor)
                };
                // A step shortened to hit an output time says little about
                // the natural step size.
                if !(landing && dt < h) {
                    h = dt * factor;
                }
            } else {
                stats.rejected_steps += 1;
                let factor = (settings.safety * err.powf(-0.2)).clamp(settings.min_factor, 1.0);
                h = dt * factor;
                trace!(t, dt, err, "step rejected");
                if h < settings.min_step {
                    return Err(IntegrationError::StepSizeUnderflow {
                        t,
                        step: h,
                        min_step: settings.min_step,
                    });
                }
            }
            h = h.clamp(settings.min_step, max_step);
        }
        states.push(state.clone());
    }

    stats.rate_evaluations = stepper.evaluations();
    Ok((states, stats))
}

fn integrate_fixed<S>(
    system: &S,
    initial: &[f64],
    times: &[f64],
    step: f64,
    max_steps: usize,
) -> Result<(Vec<Vec<f64>>, IntegrationStats), IntegrationError>
where
    S: DynamicalSystem + ?Sized,
{
    let mut stepper = RK4::new(initial.len());
    let mut state = initial.to_vec();
    let mut stats = IntegrationStats::default();
    let mut states = Vec::with_capacity(times.len());
    states.push(initial.to_vec());

    for pair in times.windows(2) {
        let (start, target) = (pair[0], pair[1]);
        let substeps = ((target - start) / step).ceil().max(1.0) as usize;
        let dt = (target - start) / substeps as f64;
        let mut t = start;
        for _ in 0..substeps {
            if stats.accepted_steps >= max_steps {
                return Err(IntegrationError::TooManySteps { max_steps, target });
            }
            let t0 = t;
            stepper
                .step(&system, &mut t, &mut state, dt)
                .map_err(|source| IntegrationError::Rate { t: t0, source })?;
            if !all_finite(&state) {
                return Err(IntegrationError::NonFinite { t });
            }
            stats.accepted_steps += 1;
        }
        states.push(state.clone());
    }

    stats.rate_evaluations = stepper.evaluations();
    Ok((states, stats))
}

/// RMS of the error scaled by the mixed absolute/relative tolerance.
fn error_norm(state: &[f64], next: &[f64], error: &[f64], rtol: f64, atol: f64) -> f64 {
    let sum: f64 = state
        .iter()
        .zip(next)
        .zip(error)
        .map(|((y0, y1), e)| {
            let scale = atol + rtol * y0.abs().max(y1.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / state.len() as f64).sqrt()
}
