//! The two models of the differential equations lessons.
//!
//! Both have bilinear rates, so their nullclines are axes or lines at a
//! ratio of rate constants and are reported in closed form.

use crate::error::{InvalidInput, RateError, Result};
use crate::phase_plane::{bilinear_nullclines, line_on_slice, AnalyticNullclines, Nullcline, PlaneSlice};
use crate::traits::DynamicalSystem;
use serde::Serialize;

fn check_rate(name: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(InvalidInput::InvalidRate { name, value }.into());
    }
    Ok(value)
}

/// Susceptible-Infected-Recovered epidemic model, in population proportions.
///
/// ```text
/// dS/dt = -beta S I
/// dI/dt =  beta S I - gamma I
/// dR/dt =  gamma I
/// ```
///
/// The three rates sum to zero, so S + I + R is conserved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sir {
    beta: f64,
    gamma: f64,
}

impl Sir {
    pub const SUSCEPTIBLE: usize = 0;
    pub const INFECTED: usize = 1;
    pub const RECOVERED: usize = 2;

    /// `beta` is the transmission rate, `gamma` the recovery rate. Zero is
    /// allowed for either.
    pub fn new(beta: f64, gamma: f64) -> Result<Self> {
        Ok(Self {
            beta: check_rate("beta", beta)?,
            gamma: check_rate("gamma", gamma)?,
        })
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Susceptible proportion `gamma / beta` below which infections decline.
    pub fn threshold(&self) -> Option<f64> {
        (self.beta > 0.0).then(|| self.gamma / self.beta)
    }

    /// `R0 = beta / gamma`.
    pub fn basic_reproduction_number(&self) -> Option<f64> {
        (self.gamma > 0.0).then(|| self.beta / self.gamma)
    }
}

impl DynamicalSystem for Sir {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RateError> {
        let (s, i) = (x[Self::SUSCEPTIBLE], x[Self::INFECTED]);
        let infection = self.beta * s * i;
        let recovery = self.gamma * i;
        out[Self::SUSCEPTIBLE] = -infection;
        out[Self::INFECTED] = infection - recovery;
        out[Self::RECOVERED] = recovery;
        Ok(())
    }
}

impl AnalyticNullclines for Sir {
    fn closed_form_nullclines(&self, component: usize, slice: &PlaneSlice) -> Option<Vec<Nullcline>> {
        match component {
            Self::SUSCEPTIBLE if self.beta == 0.0 => Some(vec![Nullcline::Plane]),
            Self::SUSCEPTIBLE => Some(vec![
                line_on_slice(slice, Self::SUSCEPTIBLE, 0.0)?,
                line_on_slice(slice, Self::INFECTED, 0.0)?,
            ]),
            // I (beta S - gamma) = 0
            Self::INFECTED => {
                bilinear_nullclines(slice, Self::INFECTED, Self::SUSCEPTIBLE, self.beta, self.gamma)
            }
            Self::RECOVERED if self.gamma == 0.0 => Some(vec![Nullcline::Plane]),
            Self::RECOVERED => Some(vec![line_on_slice(slice, Self::INFECTED, 0.0)?]),
            _ => None,
        }
    }
}

/// Lotka's rabbits and foxes.
///
/// ```text
/// dR/dt = a R - b R F
/// dF/dt = c R F - d F
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredatorPrey {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl PredatorPrey {
    pub const RABBITS: usize = 0;
    pub const FOXES: usize = 1;

    /// `a` rabbit birth rate, `b` predation rate, `c` fox birth rate per
    /// rabbit eaten, `d` fox death rate.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Result<Self> {
        Ok(Self {
            a: check_rate("a", a)?,
            b: check_rate("b", b)?,
            c: check_rate("c", c)?,
            d: check_rate("d", d)?,
        })
    }

    pub fn rates(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// The point where both nullcline lines meet, `(d/c, a/b)`.
    pub fn coexistence(&self) -> Option<[f64; 2]> {
        (self.b > 0.0 && self.c > 0.0).then(|| [self.d / self.c, self.a / self.b])
    }

    /// `c R + b F - d ln R - a ln F`, constant along every orbit with
    /// positive populations.
    pub fn conserved_quantity(&self, rabbits: f64, foxes: f64) -> f64 {
        self.c * rabbits + self.b * foxes - self.d * rabbits.ln() - self.a * foxes.ln()
    }
}

impl DynamicalSystem for PredatorPrey {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RateError> {
        let (r, f) = (x[Self::RABBITS], x[Self::FOXES]);
        out[Self::RABBITS] = self.a * r - self.b * r * f;
        out[Self::FOXES] = self.c * r * f - self.d * f;
        Ok(())
    }
}

impl AnalyticNullclines for PredatorPrey {
    fn closed_form_nullclines(&self, component: usize, slice: &PlaneSlice) -> Option<Vec<Nullcline>> {
        match component {
            // R (a - b F) = 0
            Self::RABBITS => bilinear_nullclines(slice, Self::RABBITS, Self::FOXES, self.b, self.a),
            // F (c R - d) = 0
            Self::FOXES => bilinear_nullclines(slice, Self::FOXES, Self::RABBITS, self.c, self.d),
            _ => None,
        }
    }
}
