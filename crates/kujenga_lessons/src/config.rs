//! Lesson configuration: every rate constant, initial state and plotting grid
//! the two lessons use. Any field left out of a JSON file keeps its default.

use anyhow::{Context, Result};
use kujenga_core::equilibrium::NewtonSettings;
use kujenga_core::phase_plane::{AxisSpec, PlaneSlice};
use kujenga_core::IntegratorSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonConfig {
    pub integrator: IntegratorSettings,
    pub newton: NewtonSettings,
    pub epidemic: EpidemicConfig,
    pub rabbits_and_foxes: RabbitsAndFoxesConfig,
}

/// A direction-field grid over two state variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGrid {
    pub x_range: [f64; 2],
    pub columns: usize,
    pub y_range: [f64; 2],
    pub rows: usize,
}

impl FieldGrid {
    pub fn slice(&self, x_var: usize, y_var: usize, dimension: usize) -> PlaneSlice {
        PlaneSlice::new(
            AxisSpec::new(x_var, self.x_range[0], self.x_range[1], self.columns),
            AxisSpec::new(y_var, self.y_range[0], self.y_range[1], self.rows),
            vec![0.0; dimension],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpidemicConfig {
    pub beta: f64,
    pub gamma: f64,
    /// Proportions `(S, I, R)`.
    pub initial: [f64; 3],
    pub horizon: f64,
    pub points: usize,
    /// Transmission rates compared against each other at fixed `gamma`.
    pub sweep_betas: Vec<f64>,
    pub field: FieldGrid,
}

impl Default for EpidemicConfig {
    fn default() -> Self {
        Self {
            beta: 0.5,
            gamma: 1.0 / 7.0,
            initial: [0.9999, 0.0001, 0.0],
            horizon: 100.0,
            points: 1000,
            sweep_betas: vec![0.5, 1.0 / 6.0, 1.0 / 10.0],
            field: FieldGrid {
                x_range: [0.05, 1.0],
                columns: 6,
                y_range: [0.05, 1.0],
                rows: 6,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RabbitsAndFoxesConfig {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    /// Populations `(rabbits, foxes)`.
    pub initial: [f64; 2],
    pub horizon: f64,
    pub points: usize,
    pub field: FieldGrid,
}

impl Default for RabbitsAndFoxesConfig {
    fn default() -> Self {
        Self {
            a: 5.0,
            b: 1.0,
            c: 0.15,
            d: 1.0,
            initial: [10.0, 2.0],
            horizon: 20.0,
            points: 1000,
            field: FieldGrid {
                x_range: [1.0, 30.0],
                columns: 6,
                y_range: [1.0, 12.0],
                rows: 5,
            },
        }
    }
}

pub fn load(path: &Path) -> Result<LessonConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
