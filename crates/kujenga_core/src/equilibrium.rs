//! Steady states of a flow and their linear stability.
//!
//! Nullclines of different components meet at equilibria. Given a guess near
//! one (for example the crossing of two closed-form nullclines), a damped
//! Newton iteration refines it and the Jacobian's eigenvalues classify it.

use crate::error::{Error, IntegrationError, InvalidInput, Result};
use crate::traits::DynamicalSystem;
use crate::util::l2_norm;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

/// Linear stability read off the Jacobian's eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    /// Every eigenvalue has negative real part.
    Stable,
    /// Every eigenvalue has positive real part.
    Unstable,
    /// Real parts of both signs.
    Saddle,
    /// Purely imaginary eigenvalues: closed orbits around the point.
    Center,
    /// Some zero eigenvalue; linearization is inconclusive.
    NonHyperbolic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumResult {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major `dim x dim` Jacobian at `state`.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex<f64>>,
    pub stability: Stability,
}

pub fn solve_equilibrium<S>(
    system: &S,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<EquilibriumResult>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = system.dimension();
    if dim == 0 {
        return Err(InvalidInput::EmptySystem.into());
    }
    if initial_guess.len() != dim {
        return Err(InvalidInput::DimensionMismatch {
            what: "initial guess",
            expected: dim,
            got: initial_guess.len(),
        }
        .into());
    }
    if settings.max_steps == 0 {
        return Err(Error::setting("max_steps must be greater than zero."));
    }
    if !settings.damping.is_finite() || settings.damping <= 0.0 {
        return Err(Error::setting("damping must be finite and positive."));
    }
    if !settings.tolerance.is_finite() || settings.tolerance <= 0.0 {
        return Err(Error::setting("tolerance must be finite and positive."));
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    evaluate(system, &state, &mut residual)?;
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    while residual_norm > settings.tolerance {
        if iterations >= settings.max_steps {
            return Err(Error::Equilibrium(format!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps, residual_norm
            )));
        }

        let jacobian = compute_jacobian(system, &state)?;
        let delta = solve_linear_system(dim, &jacobian, &residual)?;
        for i in 0..dim {
            state[i] -= settings.damping * delta[i];
        }

        iterations += 1;
        evaluate(system, &state, &mut residual)?;
        residual_norm = l2_norm(&residual);
        if !residual_norm.is_finite() {
            return Err(IntegrationError::NonFinite { t: 0.0 }.into());
        }
    }

    let jacobian = compute_jacobian(system, &state)?;
    let eigenvalues: Vec<Complex<f64>> = DMatrix::from_row_slice(dim, dim, &jacobian)
        .complex_eigenvalues()
        .iter()
        .copied()
        .collect();
    let stability = classify(&eigenvalues, &jacobian);

    debug!(iterations, residual_norm, ?stability, "equilibrium converged");

    Ok(EquilibriumResult {
        state,
        residual_norm,
        iterations,
        jacobian,
        eigenvalues,
        stability,
    })
}

fn evaluate<S>(system: &S, state: &[f64], out: &mut [f64]) -> Result<()>
where
    S: DynamicalSystem + ?Sized,
{
    system
        .apply(0.0, state, out)
        .map_err(|source| IntegrationError::Rate { t: 0.0, source })?;
    Ok(())
}

/// Central-difference Jacobian, row-major.
fn compute_jacobian<S>(system: &S, state: &[f64]) -> Result<Vec<f64>>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = state.len();
    let mut jacobian = vec![0.0; dim * dim];
    let mut probe = state.to_vec();
    let mut forward = vec![0.0; dim];
    let mut backward = vec![0.0; dim];

    for j in 0..dim {
        let h = f64::EPSILON.cbrt() * (1.0 + state[j].abs());
        probe[j] = state[j] + h;
        evaluate(system, &probe, &mut forward)?;
        probe[j] = state[j] - h;
        evaluate(system, &probe, &mut backward)?;
        probe[j] = state[j];
        for i in 0..dim {
            jacobian[i * dim + j] = (forward[i] - backward[i]) / (2.0 * h);
        }
    }

    Ok(jacobian)
}

fn solve_linear_system(dim: usize, jacobian: &[f64], residual: &[f64]) -> Result<Vec<f64>> {
    let j_matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let rhs = DVector::from_column_slice(residual);
    j_matrix
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().cloned().collect())
        .ok_or_else(|| Error::Equilibrium("Jacobian is singular.".to_string()))
}

fn classify(eigenvalues: &[Complex<f64>], jacobian: &[f64]) -> Stability {
    let scale = jacobian.iter().fold(1.0f64, |acc, v| acc.max(v.abs()));
    let tol = 1e-6 * scale;
    let negative = eigenvalues.iter().filter(|l| l.re < -tol).count();
    let positive = eigenvalues.iter().filter(|l| l.re > tol).count();
    let n = eigenvalues.len();

    if negative == n {
        Stability::Stable
    } else if positive == n {
        Stability::Unstable
    } else if negative > 0 && positive > 0 {
        Stability::Saddle
    } else if eigenvalues.iter().all(|l| l.re.abs() <= tol && l.im.abs() > tol) {
        Stability::Center
    } else {
        Stability::NonHyperbolic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredatorPrey, Sir};
    use crate::traits::RateFn;

    #[test]
    fn rejects_invalid_inputs() {
        let model = PredatorPrey::new(5.0, 1.0, 0.15, 1.0).expect("valid rates");
        assert!(matches!(
            solve_equilibrium(&model, &[1.0], NewtonSettings::default()),
            Err(Error::InvalidInput(_))
        ));
        let settings = NewtonSettings {
            damping: 0.0,
            ..NewtonSettings::default()
        };
        assert!(matches!(
            solve_equilibrium(&model, &[1.0, 1.0], settings),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn non_finite_settings_are_rejected() {
        let model = PredatorPrey::new(5.0, 1.0, 0.15, 1.0).expect("valid rates");
        for settings in [
            NewtonSettings {
                tolerance: f64::NAN,
                ..NewtonSettings::default()
            },
            NewtonSettings {
                damping: f64::NAN,
                ..NewtonSettings::default()
            },
            NewtonSettings {
                tolerance: f64::INFINITY,
                ..NewtonSettings::default()
            },
        ] {
            assert!(matches!(
                solve_equilibrium(&model, &[6.0, 4.0], settings),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn rabbits_and_foxes_coexist_on_a_center() {
        let model = PredatorPrey::new(5.0, 1.0, 0.15, 1.0).expect("valid rates");
        let result = solve_equilibrium(&model, &[6.0, 4.0], NewtonSettings::default())
            .expect("Newton should converge");
        assert!((result.state[0] - 1.0 / 0.15).abs() < 1e-8);
        assert!((result.state[1] - 5.0).abs() < 1e-8);
        assert_eq!(result.stability, Stability::Center);
        // Eigenvalues are +-i sqrt(a d).
        for lambda in &result.eigenvalues {
            assert!((lambda.im.abs() - 5.0f64.sqrt()).abs() < 1e-5, "lambda = {lambda}");
        }
    }

    #[test]
    fn extinction_is_a_saddle() {
        let model = PredatorPrey::new(5.0, 1.0, 0.15, 1.0).expect("valid rates");
        let result = solve_equilibrium(&model, &[0.1, 0.1], NewtonSettings::default())
            .expect("Newton should converge");
        assert!(l2_norm(&result.state) < 1e-8);
        assert_eq!(result.stability, Stability::Saddle);
    }

    #[test]
    fn damped_linear_system_is_stable() {
        let system = RateFn::new(2, |_t, x: &[f64]| {
            Ok(vec![-x[0] + 1.0, -2.0 * x[1] + x[0]])
        });
        let result = solve_equilibrium(&system, &[0.0, 0.0], NewtonSettings::default())
            .expect("Newton should converge");
        assert!((result.state[0] - 1.0).abs() < 1e-9);
        assert!((result.state[1] - 0.5).abs() < 1e-9);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.stability, Stability::Stable);
    }

    #[test]
    fn disease_free_states_are_non_hyperbolic() {
        // Every point with I = 0 is an equilibrium of the SIR model.
        let sir = Sir::new(0.5, 1.0 / 7.0).expect("valid rates");
        let result = solve_equilibrium(&sir, &[0.9, 0.0, 0.1], NewtonSettings::default())
            .expect("already at rest");
        assert_eq!(result.iterations, 0);
        assert_eq!(result.stability, Stability::NonHyperbolic);
    }

    #[test]
    fn singular_jacobian_is_reported() {
        let system = RateFn::new(1, |_t, _x: &[f64]| Ok(vec![1.0]));
        assert!(matches!(
            solve_equilibrium(&system, &[0.0], NewtonSettings::default()),
            Err(Error::Equilibrium(_))
        ));
    }
}
