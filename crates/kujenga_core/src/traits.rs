use crate::error::RateError;

/// A system of first-order ODEs, `dx/dt = f(t, x)`.
///
/// Rate parameters are bound into the implementor, either as struct fields
/// (see [`crate::models`]) or captured by a closure wrapped in [`RateFn`].
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the rate function.
    /// t: current time
    /// x: current state
    /// out: buffer receiving dx/dt, same length as `x`
    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RateError>;
}

impl<S: DynamicalSystem + ?Sized> DynamicalSystem for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RateError> {
        (**self).apply(t, x, out)
    }
}

/// A trait for fixed-step solvers that can step a system forward.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) -> Result<(), RateError>;
}

/// Adapts a closure returning the derivative vector into a [`DynamicalSystem`].
///
/// ```ignore
/// let (beta, gamma) = (0.5, 1.0 / 7.0);
/// let sir = RateFn::new(3, move |_t, y: &[f64]| {
///     let (s, i) = (y[0], y[1]);
///     Ok(vec![-beta * s * i, beta * s * i - gamma * i, gamma * i])
/// });
/// ```
pub struct RateFn<F> {
    dimension: usize,
    rate: F,
}

impl<F> RateFn<F>
where
    F: Fn(f64, &[f64]) -> anyhow::Result<Vec<f64>>,
{
    pub fn new(dimension: usize, rate: F) -> Self {
        Self { dimension, rate }
    }
}

impl<F> DynamicalSystem for RateFn<F>
where
    F: Fn(f64, &[f64]) -> anyhow::Result<Vec<f64>>,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RateError> {
        let values = (self.rate)(t, x)?;
        if values.len() != out.len() {
            return Err(RateError::DimensionMismatch {
                expected: out.len(),
                got: values.len(),
            });
        }
        out.copy_from_slice(&values);
        Ok(())
    }
}
