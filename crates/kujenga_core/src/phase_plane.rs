//! Phase-plane analysis on a two-dimensional slice of state space.
//!
//! Nullclines are the loci where one component of the rate function vanishes.
//! Models with bilinear rates report them in closed form through
//! [`AnalyticNullclines`]; any other system goes through marching squares on a
//! sampled grid, with each edge crossing refined by bisection on the rate
//! function itself.

use crate::error::{Error, IntegrationError, InvalidInput, Result};
use crate::traits::DynamicalSystem;
use crate::util::linspace;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

const BISECTION_ITERATIONS: usize = 60;
const BISECTION_TOLERANCE: f64 = 1e-13;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub var_index: usize,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl AxisSpec {
    pub fn new(var_index: usize, min: f64, max: f64, samples: usize) -> Self {
        Self {
            var_index,
            min,
            max,
            samples,
        }
    }

    /// Evenly spaced sample coordinates, endpoints included.
    pub fn values(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.samples)
    }

    fn validate(&self, dim: usize) -> Result<()> {
        if self.var_index >= dim {
            return Err(Error::setting(format!(
                "Axis variable index {} out of range.",
                self.var_index
            )));
        }
        if !self.min.is_finite() || !self.max.is_finite() || self.max <= self.min {
            return Err(Error::setting("Each axis range must be finite with max > min."));
        }
        if self.samples < 2 {
            return Err(Error::setting("Each axis needs at least 2 samples."));
        }
        Ok(())
    }
}

/// A rectangle in the plane spanned by two state variables. Coordinates not
/// on either axis are held at their value in `frozen`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneSlice {
    pub x: AxisSpec,
    pub y: AxisSpec,
    pub frozen: Vec<f64>,
}

impl PlaneSlice {
    pub fn new(x: AxisSpec, y: AxisSpec, frozen: Vec<f64>) -> Self {
        Self { x, y, frozen }
    }

    /// Full state vector at slice coordinates `(x, y)`.
    pub fn state_at(&self, x: f64, y: f64) -> Vec<f64> {
        let mut state = self.frozen.clone();
        state[self.x.var_index] = x;
        state[self.y.var_index] = y;
        state
    }

    fn validate(&self, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(InvalidInput::EmptySystem.into());
        }
        if self.frozen.len() != dim {
            return Err(InvalidInput::DimensionMismatch {
                what: "frozen state",
                expected: dim,
                got: self.frozen.len(),
            }
            .into());
        }
        self.x.validate(dim)?;
        self.y.validate(dim)?;
        if self.x.var_index == self.y.var_index {
            return Err(Error::setting("Axis variable indices must be unique."));
        }
        Ok(())
    }
}

/// A zero locus of one rate component, in slice coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Nullcline {
    /// The line `x = value`.
    Vertical { x: f64 },
    /// The line `y = value`.
    Horizontal { y: f64 },
    /// The component vanishes on the whole slice.
    Plane,
    /// Polyline pieces from marching squares.
    Segments { segments: Vec<[[f64; 2]; 2]> },
}

/// Systems whose nullclines are known in closed form.
pub trait AnalyticNullclines {
    /// Nullclines of `component` on `slice`, or `None` when the closed form
    /// does not apply to that slice.
    fn closed_form_nullclines(&self, component: usize, slice: &PlaneSlice) -> Option<Vec<Nullcline>>;
}

/// Nullclines of `x * (p * y - q)`: the axis `x = 0` and, when `p != 0`, the
/// line `y = q / p`. Indices refer to state variables; `None` if either
/// needed variable is not on the slice.
pub(crate) fn bilinear_nullclines(
    slice: &PlaneSlice,
    factor: usize,
    linear: usize,
    p: f64,
    q: f64,
) -> Option<Vec<Nullcline>> {
    if p == 0.0 && q == 0.0 {
        return Some(vec![Nullcline::Plane]);
    }
    let mut lines = vec![line_on_slice(slice, factor, 0.0)?];
    if p != 0.0 {
        lines.push(line_on_slice(slice, linear, q / p)?);
    }
    Some(lines)
}

/// The locus `state[var] = value` on the slice.
pub(crate) fn line_on_slice(slice: &PlaneSlice, var: usize, value: f64) -> Option<Nullcline> {
    if slice.x.var_index == var {
        Some(Nullcline::Vertical { x: value })
    } else if slice.y.var_index == var {
        Some(Nullcline::Horizontal { y: value })
    } else {
        None
    }
}

struct ComponentEvaluator<'a, S: ?Sized> {
    system: &'a S,
    component: usize,
    out: Vec<f64>,
}

impl<'a, S: DynamicalSystem + ?Sized> ComponentEvaluator<'a, S> {
    fn new(system: &'a S, component: usize) -> Self {
        Self {
            system,
            component,
            out: vec![0.0; system.dimension()],
        }
    }

    fn eval(&mut self, state: &[f64]) -> Result<f64> {
        self.system
            .apply(0.0, state, &mut self.out)
            .map_err(|source| IntegrationError::Rate { t: 0.0, source })?;
        Ok(self.out[self.component])
    }
}

fn check_component(dim: usize, component: usize) -> Result<()> {
    if component >= dim {
        return Err(Error::setting(format!(
            "Component index {component} out of range for dimension {dim}."
        )));
    }
    Ok(())
}

/// Roots of one rate component along a single axis, with all other
/// coordinates taken from `frozen`. Returns full state vectors.
pub fn roots_along_axis<S>(
    system: &S,
    component: usize,
    axis: &AxisSpec,
    frozen: &[f64],
) -> Result<Vec<Vec<f64>>>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = system.dimension();
    if frozen.len() != dim {
        return Err(InvalidInput::DimensionMismatch {
            what: "frozen state",
            expected: dim,
            got: frozen.len(),
        }
        .into());
    }
    axis.validate(dim)?;
    check_component(dim, component)?;

    let mut evaluator = ComponentEvaluator::new(system, component);
    let mut state = frozen.to_vec();
    let xs = axis.values();
    let mut values = Vec::with_capacity(xs.len());
    for &x in &xs {
        state[axis.var_index] = x;
        values.push(evaluator.eval(&state)?);
    }

    let mut roots = Vec::new();
    for i in 0..xs.len() - 1 {
        let (x0, x1) = (xs[i], xs[i + 1]);
        let (v0, v1) = (values[i], values[i + 1]);
        if v0 == 0.0 {
            roots.push(x0);
        }
        if v1 == 0.0 {
            roots.push(x1);
        }
        if (v0 < 0.0 && v1 > 0.0) || (v0 > 0.0 && v1 < 0.0) {
            let fraction = bisect(v0, v1, |s| {
                state[axis.var_index] = x0 + (x1 - x0) * s;
                evaluator.eval(&state)
            })?;
            roots.push(x0 + (x1 - x0) * fraction);
        }
    }

    roots.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-10 * (1.0 + a.abs().max(b.abs())));

    Ok(roots
        .into_iter()
        .map(|root| {
            let mut root_state = frozen.to_vec();
            root_state[axis.var_index] = root;
            root_state
        })
        .collect())
}

/// Zero level set of one rate component on the slice, by marching squares.
pub fn nullcline_segments<S>(system: &S, component: usize, slice: &PlaneSlice) -> Result<Nullcline>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = system.dimension();
    slice.validate(dim)?;
    check_component(dim, component)?;

    let xs = slice.x.values();
    let ys = slice.y.values();
    let nx = xs.len();
    let index = |ix: usize, iy: usize| -> usize { ix + iy * nx };

    let mut evaluator = ComponentEvaluator::new(system, component);
    let mut state = slice.frozen.clone();
    let mut values = vec![0.0; nx * ys.len()];
    for (iy, &y) in ys.iter().enumerate() {
        for (ix, &x) in xs.iter().enumerate() {
            state[slice.x.var_index] = x;
            state[slice.y.var_index] = y;
            values[index(ix, iy)] = evaluator.eval(&state)?;
        }
    }

    if values.iter().all(|v| *v == 0.0) {
        return Ok(Nullcline::Plane);
    }

    let mut segments = Vec::new();
    for iy in 0..ys.len() - 1 {
        for ix in 0..nx - 1 {
            // Corners counter-clockwise from the bottom left.
            let corners = [
                [xs[ix], ys[iy]],
                [xs[ix + 1], ys[iy]],
                [xs[ix + 1], ys[iy + 1]],
                [xs[ix], ys[iy + 1]],
            ];
            let corner_values = [
                values[index(ix, iy)],
                values[index(ix + 1, iy)],
                values[index(ix + 1, iy + 1)],
                values[index(ix, iy + 1)],
            ];

            let mut case_index = 0u8;
            for (corner, value) in corner_values.iter().enumerate() {
                if *value >= 0.0 {
                    case_index |= 1 << corner;
                }
            }

            for &(edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                let a = refine_square_edge(&mut evaluator, slice, &corners, &corner_values, edge_a)?;
                let b = refine_square_edge(&mut evaluator, slice, &corners, &corner_values, edge_b)?;
                segments.push([a, b]);
            }
        }
    }

    Ok(Nullcline::Segments { segments })
}

/// Closed-form nullclines when the system offers them for this slice,
/// otherwise the numerical level set.
pub fn nullclines_for<S>(system: &S, component: usize, slice: &PlaneSlice) -> Result<Vec<Nullcline>>
where
    S: DynamicalSystem + AnalyticNullclines + ?Sized,
{
    let dim = system.dimension();
    slice.validate(dim)?;
    check_component(dim, component)?;
    match system.closed_form_nullclines(component, slice) {
        Some(lines) => Ok(lines),
        None => Ok(vec![nullcline_segments(system, component, slice)?]),
    }
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        0 | 15 => &[],
        1 => &[(3, 0)],
        2 => &[(0, 1)],
        3 => &[(3, 1)],
        4 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 => &[(0, 2)],
        7 => &[(3, 2)],
        8 => &[(2, 3)],
        9 => &[(0, 2)],
        10 => &[(0, 3), (1, 2)],
        11 => &[(1, 2)],
        12 => &[(1, 3)],
        13 => &[(0, 1)],
        14 => &[(3, 0)],
        _ => &[],
    }
}

/// Locates the zero on square edge `edge` (edge k joins corner k and k+1).
fn refine_square_edge<S>(
    evaluator: &mut ComponentEvaluator<'_, S>,
    slice: &PlaneSlice,
    corners: &[[f64; 2]; 4],
    corner_values: &[f64; 4],
    edge: u8,
) -> Result<[f64; 2]>
where
    S: DynamicalSystem + ?Sized,
{
    let from = edge as usize;
    let to = (from + 1) % 4;
    let (p0, p1) = (corners[from], corners[to]);
    let mut state = slice.frozen.clone();
    let fraction = bisect(corner_values[from], corner_values[to], |s| {
        state[slice.x.var_index] = p0[0] + (p1[0] - p0[0]) * s;
        state[slice.y.var_index] = p0[1] + (p1[1] - p0[1]) * s;
        evaluator.eval(&state)
    })?;
    Ok([
        p0[0] + (p1[0] - p0[0]) * fraction,
        p0[1] + (p1[1] - p0[1]) * fraction,
    ])
}

/// Root of `f` on `[0, 1]` given its endpoint values. Falls back to the
/// linear estimate when the endpoints do not bracket a sign change.
fn bisect<F>(v0: f64, v1: f64, mut f: F) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    if v0 == 0.0 {
        return Ok(0.0);
    }
    if v1 == 0.0 {
        return Ok(1.0);
    }
    if (v0 < 0.0) == (v1 < 0.0) {
        return Ok(interpolate_factor(v0, v1));
    }
    let (mut lo, mut hi) = (0.0, 1.0);
    let mut f_lo = v0;
    for _ in 0..BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid)?;
        if f_mid == 0.0 {
            return Ok(mid);
        }
        if (f_mid < 0.0) == (f_lo < 0.0) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
        if hi - lo <= BISECTION_TOLERANCE {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}

/// Divides a 2D derivative by its Euclidean norm.
pub fn normalize_direction(point: [f64; 2], dx: f64, dy: f64) -> Result<[f64; 2]> {
    if dx == 0.0 && dy == 0.0 {
        return Err(Error::DegenerateField { point });
    }
    let norm = dx.hypot(dy);
    Ok([dx / norm, dy / norm])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub point: [f64; 2],
    /// Unit direction, `None` where the derivative vanishes in both dimensions.
    pub direction: Option<[f64; 2]>,
    /// Euclidean norm of the raw derivative.
    pub speed: f64,
}

/// Direction vectors on a regular grid, row by row with `x` varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionField {
    pub columns: usize,
    pub rows: usize,
    pub samples: Vec<FieldSample>,
}

impl DirectionField {
    pub fn degenerate_points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.samples
            .iter()
            .filter(|sample| sample.direction.is_none())
            .map(|sample| sample.point)
    }

    /// Fails on the first sample whose direction is undefined.
    pub fn require_regular(&self) -> Result<()> {
        match self.degenerate_points().next() {
            Some(point) => Err(Error::DegenerateField { point }),
            None => Ok(()),
        }
    }
}

/// Samples the unit-normalized vector field on the slice grid.
///
/// Degenerate samples are flagged rather than failing the whole field.
pub fn direction_field<S>(system: &S, slice: &PlaneSlice) -> Result<DirectionField>
where
    S: DynamicalSystem + ?Sized,
{
    let dim = system.dimension();
    slice.validate(dim)?;

    let xs = slice.x.values();
    let ys = slice.y.values();
    let mut out = vec![0.0; dim];
    let mut state = slice.frozen.clone();
    let mut samples = Vec::with_capacity(xs.len() * ys.len());

    for &y in &ys {
        for &x in &xs {
            state[slice.x.var_index] = x;
            state[slice.y.var_index] = y;
            system
                .apply(0.0, &state, &mut out)
                .map_err(|source| IntegrationError::Rate { t: 0.0, source })?;
            let (dx, dy) = (out[slice.x.var_index], out[slice.y.var_index]);
            if !dx.is_finite() || !dy.is_finite() {
                return Err(IntegrationError::NonFinite { t: 0.0 }.into());
            }
            let point = [x, y];
            let direction = match normalize_direction(point, dx, dy) {
                Ok(direction) => Some(direction),
                Err(err) => {
                    warn!(x, y, error = %err, "degenerate direction field sample");
                    None
                }
            };
            samples.push(FieldSample {
                point,
                direction,
                speed: dx.hypot(dy),
            });
        }
    }

    Ok(DirectionField {
        columns: xs.len(),
        rows: ys.len(),
        samples,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentNullclines {
    pub component: usize,
    pub curves: Vec<Nullcline>,
}

/// Everything a phase-plane figure needs apart from the trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePortrait {
    pub slice: PlaneSlice,
    pub nullclines: Vec<ComponentNullclines>,
    pub field: DirectionField,
}

/// Nullclines of both slice components plus the direction field.
pub fn analyze<S>(system: &S, slice: &PlaneSlice) -> Result<PhasePortrait>
where
    S: DynamicalSystem + AnalyticNullclines + ?Sized,
{
    let mut nullclines = Vec::with_capacity(2);
    for component in [slice.x.var_index, slice.y.var_index] {
        nullclines.push(ComponentNullclines {
            component,
            curves: nullclines_for(system, component, slice)?,
        });
    }
    let field = direction_field(system, slice)?;
    Ok(PhasePortrait {
        slice: slice.clone(),
        nullclines,
        field,
    })
}
