//! Plot data for both lessons, collected into one serializable report.

use crate::config::{EpidemicConfig, LessonConfig, RabbitsAndFoxesConfig};
use anyhow::{Context, Result};
use kujenga_core::equilibrium::{solve_equilibrium, EquilibriumResult, NewtonSettings};
use kujenga_core::models::{PredatorPrey, Sir};
use kujenga_core::phase_plane::{analyze, PhasePortrait};
use kujenga_core::sweep::{sweep, SweepRun};
use kujenga_core::trajectory::Peak;
use kujenga_core::util::linspace;
use kujenga_core::{simulate, IntegratorSettings, Trajectory};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct LessonReport {
    pub epidemic: EpidemicReport,
    pub rabbits_and_foxes: RabbitsAndFoxesReport,
}

#[derive(Debug, Serialize)]
pub struct EpidemicReport {
    pub model: Sir,
    pub basic_reproduction_number: Option<f64>,
    /// Susceptible proportion at which infections peak.
    pub threshold: Option<f64>,
    pub trajectory: Trajectory,
    /// `(S, I)` pairs of the trajectory.
    pub orbit: Vec<[f64; 2]>,
    pub peak_infected: Option<Peak>,
    pub sweep: Vec<SweepRun<f64>>,
    pub portrait: PhasePortrait,
}

#[derive(Debug, Serialize)]
pub struct RabbitsAndFoxesReport {
    pub model: PredatorPrey,
    pub trajectory: Trajectory,
    /// `(rabbits, foxes)` pairs of the trajectory.
    pub orbit: Vec<[f64; 2]>,
    pub coexistence: Option<EquilibriumResult>,
    /// Largest relative change of the conserved quantity along the orbit.
    /// `None` when the quantity is undefined or zero somewhere on it, as it
    /// is once either population reaches zero.
    pub conserved_drift: Option<f64>,
    pub portrait: PhasePortrait,
}

pub fn build(config: &LessonConfig) -> Result<LessonReport> {
    let epidemic = epidemic(&config.epidemic, &config.integrator)
        .context("Failed to build the epidemic lesson")?;
    let rabbits_and_foxes =
        rabbits_and_foxes(&config.rabbits_and_foxes, &config.integrator, config.newton)
            .context("Failed to build the rabbits and foxes lesson")?;
    Ok(LessonReport {
        epidemic,
        rabbits_and_foxes,
    })
}

fn epidemic(config: &EpidemicConfig, settings: &IntegratorSettings) -> Result<EpidemicReport> {
    let model = Sir::new(config.beta, config.gamma)?;
    let times = linspace(0.0, config.horizon, config.points);
    let trajectory = simulate(&model, &config.initial, &times, settings)?;
    let peak_infected = trajectory.peak(Sir::INFECTED);
    let orbit = trajectory
        .phase_path(Sir::SUSCEPTIBLE, Sir::INFECTED)
        .context("SIR trajectory is missing a component")?;

    let gamma = config.gamma;
    let sweep = sweep(
        &config.sweep_betas,
        |&beta| Sir::new(beta, gamma),
        &config.initial,
        &times,
        settings,
    )
    .into_iter()
    .collect::<kujenga_core::Result<Vec<_>>>()
    .context("Transmission rate sweep failed")?;

    let slice = config.field.slice(Sir::SUSCEPTIBLE, Sir::INFECTED, 3);
    let portrait = analyze(&model, &slice)?;

    if let Some(peak) = peak_infected {
        info!(time = peak.time, infected = peak.value, "epidemic peak");
    }

    Ok(EpidemicReport {
        model,
        basic_reproduction_number: model.basic_reproduction_number(),
        threshold: model.threshold(),
        trajectory,
        orbit,
        peak_infected,
        sweep,
        portrait,
    })
}

fn rabbits_and_foxes(
    config: &RabbitsAndFoxesConfig,
    settings: &IntegratorSettings,
    newton: NewtonSettings,
) -> Result<RabbitsAndFoxesReport> {
    let model = PredatorPrey::new(config.a, config.b, config.c, config.d)?;
    let times = linspace(0.0, config.horizon, config.points);
    let trajectory = simulate(&model, &config.initial, &times, settings)?;
    let orbit = trajectory
        .phase_path(PredatorPrey::RABBITS, PredatorPrey::FOXES)
        .context("Predator-prey trajectory is missing a component")?;

    let coexistence = match model.coexistence() {
        Some(guess) => Some(solve_equilibrium(&model, &guess, newton)?),
        None => None,
    };

    let conserved_drift = conserved_drift(&model, &orbit);
    match conserved_drift {
        Some(drift) => info!(conserved_drift = drift, "rabbits and foxes simulated"),
        None => warn!("conserved quantity is undefined along the rabbits and foxes orbit"),
    }

    let slice = config
        .field
        .slice(PredatorPrey::RABBITS, PredatorPrey::FOXES, 2);
    let portrait = analyze(&model, &slice)?;

    Ok(RabbitsAndFoxesReport {
        model,
        trajectory,
        orbit,
        coexistence,
        conserved_drift,
        portrait,
    })
}

fn conserved_drift(model: &PredatorPrey, orbit: &[[f64; 2]]) -> Option<f64> {
    let [rabbits, foxes] = *orbit.first()?;
    let start = model.conserved_quantity(rabbits, foxes);
    if !start.is_finite() || start == 0.0 {
        return None;
    }
    orbit.iter().try_fold(0.0f64, |largest, &[rabbits, foxes]| {
        let drift = ((model.conserved_quantity(rabbits, foxes) - start) / start).abs();
        drift.is_finite().then(|| largest.max(drift))
    })
}
