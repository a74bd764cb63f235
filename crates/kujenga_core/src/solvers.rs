use crate::error::RateError;
use crate::traits::{DynamicalSystem, Steppable};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
    evaluations: usize,
}

impl RK4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: vec![0.0; dim],
            evaluations: 0,
        }
    }

    /// Number of rate function evaluations performed so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl Steppable for RK4 {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) -> Result<(), RateError> {
        let t0 = *t;
        let half = 0.5 * dt;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k1[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k2)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k2[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k3)?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4)?;
        self.evaluations += 4;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] += dt / 6.0 * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
        Ok(())
    }
}

// Tsitouras 5(4) tableau.
const C2: f64 = 0.161;
const C3: f64 = 0.327;
const C4: f64 = 0.9;
const C5: f64 = 0.9800255409045097;

const A21: f64 = 0.161;
const A31: f64 = -0.008480655492356989;
const A32: f64 = 0.335480655492357;
const A41: f64 = 2.897153057105493;
const A42: f64 = -6.359448489975075;
const A43: f64 = 4.3622954328695815;
const A51: f64 = 5.325864828439257;
const A52: f64 = -11.748883564062828;
const A53: f64 = 7.4955393428898365;
const A54: f64 = -0.09249506636175525;
const A61: f64 = 5.86145544294642;
const A62: f64 = -12.92096931784711;
const A63: f64 = 8.159367898576159;
const A64: f64 = -0.071584973281401;
const A65: f64 = -0.028269050394068383;

// 5th order weights, also the last row of A (FSAL).
const B1: f64 = 0.09646076681806523;
const B2: f64 = 0.01;
const B3: f64 = 0.4798896504144996;
const B4: f64 = 1.379008574103742;
const B5: f64 = -3.290069515436081;
const B6: f64 = 2.324710524099774;

// Difference between the 5th and embedded 4th order weights.
const E1: f64 = -0.00178001105222577714;
const E2: f64 = -0.0008164344596567469;
const E3: f64 = 0.007880878010261995;
const E4: f64 = -0.1447110071732629;
const E5: f64 = 0.5823571654525552;
const E6: f64 = -0.45808210592918697;
const E7: f64 = 0.015151515151515152;

/// Tsitouras 5/4 embedded pair.
///
/// `try_step` proposes a step and its local error estimate without committing
/// to it; the caller decides whether to `accept`. The derivative at the end of
/// an accepted step is reused as the first stage of the next one.
pub struct Tsit5 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    k5: Vec<f64>,
    k6: Vec<f64>,
    k7: Vec<f64>,
    tmp: Vec<f64>,
    first_stage_ready: bool,
    evaluations: usize,
}

impl Tsit5 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            k5: vec![0.0; dim],
            k6: vec![0.0; dim],
            k7: vec![0.0; dim],
            tmp: vec![0.0; dim],
            first_stage_ready: false,
            evaluations: 0,
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Computes a 5th order step from `(t, state)` into `next` and the local
    /// error estimate into `error`. `state` is left untouched.
    pub fn try_step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        dt: f64,
        next: &mut [f64],
        error: &mut [f64],
    ) -> Result<(), RateError> {
        let n = state.len();

        if !self.first_stage_ready {
            system.apply(t, state, &mut self.k1)?;
            self.evaluations += 1;
            self.first_stage_ready = true;
        }

        for i in 0..n {
            self.tmp[i] = state[i] + dt * (A21 * self.k1[i]);
        }
        system.apply(t + C2 * dt, &self.tmp, &mut self.k2)?;

        for i in 0..n {
            self.tmp[i] = state[i] + dt * (A31 * self.k1[i] + A32 * self.k2[i]);
        }
        system.apply(t + C3 * dt, &self.tmp, &mut self.k3)?;

        for i in 0..n {
            self.tmp[i] = state[i] + dt * (A41 * self.k1[i] + A42 * self.k2[i] + A43 * self.k3[i]);
        }
        system.apply(t + C4 * dt, &self.tmp, &mut self.k4)?;

        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (A51 * self.k1[i] + A52 * self.k2[i] + A53 * self.k3[i] + A54 * self.k4[i]);
        }
        system.apply(t + C5 * dt, &self.tmp, &mut self.k5)?;

        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (A61 * self.k1[i]
                    + A62 * self.k2[i]
                    + A63 * self.k3[i]
                    + A64 * self.k4[i]
                    + A65 * self.k5[i]);
        }
        system.apply(t + dt, &self.tmp, &mut self.k6)?;

        for i in 0..n {
            next[i] = state[i]
                + dt * (B1 * self.k1[i]
                    + B2 * self.k2[i]
                    + B3 * self.k3[i]
                    + B4 * self.k4[i]
                    + B5 * self.k5[i]
                    + B6 * self.k6[i]);
        }
        system.apply(t + dt, next, &mut self.k7)?;
        self.evaluations += 6;

        for i in 0..n {
            error[i] = dt
                * (E1 * self.k1[i]
                    + E2 * self.k2[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]
                    + E7 * self.k7[i]);
        }

        Ok(())
    }

    /// Commits the last proposed step.
    pub fn accept(&mut self) {
        std::mem::swap(&mut self.k1, &mut self.k7);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RateFn;

    fn decay() -> RateFn<impl Fn(f64, &[f64]) -> anyhow::Result<Vec<f64>>> {
        RateFn::new(1, |_t, x: &[f64]| Ok(vec![-x[0]]))
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let system = decay();
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..100 {
            solver.step(&system, &mut t, &mut state, 0.01).expect("step should succeed");
        }
        assert!((t - 1.0).abs() < 1e-12);
        assert!((state[0] - (-1.0f64).exp()).abs() < 1e-9, "got {}", state[0]);
        assert_eq!(solver.evaluations(), 400);
    }

    #[test]
    fn rk4_propagates_rate_failures() {
        let system = RateFn::new(1, |_t, _x: &[f64]| anyhow::bail!("boom"));
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let err = solver
            .step(&system, &mut t, &mut state, 0.1)
            .expect_err("failing rate function should fail the step");
        assert!(err.to_string().contains("boom"), "unexpected error: {err}");
        assert_eq!(t, 0.0);
    }

    #[test]
    fn tsit5_step_is_fifth_order_accurate() {
        let system = decay();
        let mut solver = Tsit5::new(1);
        let mut next = [0.0];
        let mut error = [0.0];
        solver
            .try_step(&system, 0.0, &[1.0], 0.1, &mut next, &mut error)
            .expect("step should succeed");
        assert!((next[0] - (-0.1f64).exp()).abs() < 1e-8, "got {}", next[0]);
        assert!(error[0].abs() < 1e-5, "error estimate too large: {}", error[0]);
    }

    #[test]
    fn tsit5_error_estimate_shrinks_with_step() {
        let system = decay();
        let mut coarse = Tsit5::new(1);
        let mut fine = Tsit5::new(1);
        let mut next = [0.0];
        let mut err_coarse = [0.0];
        let mut err_fine = [0.0];
        coarse
            .try_step(&system, 0.0, &[1.0], 0.5, &mut next, &mut err_coarse)
            .expect("step should succeed");
        fine.try_step(&system, 0.0, &[1.0], 0.05, &mut next, &mut err_fine)
            .expect("step should succeed");
        assert!(err_fine[0].abs() < err_coarse[0].abs());
    }

    fn forced_riccati() -> RateFn<impl Fn(f64, &[f64]) -> anyhow::Result<Vec<f64>>> {
        RateFn::new(1, |t, x: &[f64]| Ok(vec![x[0] * x[0] - t + (3.0 * t).sin()]))
    }

    fn fine_rk4(dt: f64) -> f64 {
        let system = forced_riccati();
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [0.5];
        let substeps = 4000;
        for _ in 0..substeps {
            solver
                .step(&system, &mut t, &mut state, dt / substeps as f64)
                .expect("step should succeed");
        }
        state[0]
    }

    fn tsit5_single_step(dt: f64) -> (f64, f64) {
        let system = forced_riccati();
        let mut solver = Tsit5::new(1);
        let mut next = [0.0];
        let mut error = [0.0];
        solver
            .try_step(&system, 0.0, &[0.5], dt, &mut next, &mut error)
            .expect("step should succeed");
        (next[0], error[0])
    }

    #[test]
    fn tsit5_local_error_is_fifth_order_on_a_nonlinear_rate() {
        let (coarse, coarse_estimate) = tsit5_single_step(0.2);
        let (fine, _) = tsit5_single_step(0.1);
        let coarse_error = (coarse - fine_rk4(0.2)).abs();
        let fine_error = (fine - fine_rk4(0.1)).abs();

        // Local error O(h^6): halving the step gains well over 2^5.
        assert!(
            coarse_error > 32.0 * fine_error,
            "errors {coarse_error:e} and {fine_error:e} do not drop fast enough"
        );
        assert!(coarse_error < 1e-5, "coarse error {coarse_error:e}");
        // The embedded 4th order estimate does not understate the real error.
        assert!(
            coarse_estimate.abs() >= 0.1 * coarse_error,
            "estimate {coarse_estimate:e} against error {coarse_error:e}"
        );
    }

    #[test]
    fn tsit5_reuses_last_stage_after_accept() {
        let system = decay();
        let mut solver = Tsit5::new(1);
        let mut next = [0.0];
        let mut error = [0.0];
        solver
            .try_step(&system, 0.0, &[1.0], 0.1, &mut next, &mut error)
            .expect("step should succeed");
        assert_eq!(solver.evaluations(), 7);
        solver.accept();
        let state = next;
        solver
            .try_step(&system, 0.1, &state, 0.1, &mut next, &mut error)
            .expect("step should succeed");
        assert_eq!(solver.evaluations(), 13);
    }
}
