//! Independent simulations across a list of parameter values.
//!
//! Each run builds its own system, so runs share nothing and are executed on
//! the rayon pool. Results come back in the order of `values`.

use crate::error::Result;
use crate::simulator::{simulate, IntegratorSettings};
use crate::traits::DynamicalSystem;
use crate::trajectory::Trajectory;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct SweepRun<P> {
    pub parameter: P,
    pub trajectory: Trajectory,
}

/// Simulates one system per parameter value. A failing run does not stop the
/// others; its error takes its slot in the output.
pub fn sweep<P, S, F>(
    values: &[P],
    build: F,
    initial: &[f64],
    times: &[f64],
    settings: &IntegratorSettings,
) -> Vec<Result<SweepRun<P>>>
where
    P: Clone + Send + Sync,
    S: DynamicalSystem,
    F: Fn(&P) -> Result<S> + Sync,
{
    debug!(runs = values.len(), "starting parameter sweep");
    values
        .par_iter()
        .map(|parameter| {
            let system = build(parameter)?;
            let trajectory = simulate(&system, initial, times, settings)?;
            Ok(SweepRun {
                parameter: parameter.clone(),
                trajectory,
            })
        })
        .collect()
}
