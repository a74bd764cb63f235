use serde::{Deserialize, Serialize};

/// Counters describing the work done to produce a trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub rate_evaluations: usize,
}

/// Location of the largest value of one state component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub index: usize,
    pub time: f64,
    pub value: f64,
}

/// Simulated states, one per requested time point.
///
/// The first state is the initial state exactly. A trajectory never holds
/// fewer than two points. Only the simulator builds one, so there is no
/// `Deserialize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
    stats: IntegrationStats,
}

impl Trajectory {
    pub(crate) fn new(times: Vec<f64>, states: Vec<Vec<f64>>, stats: IntegrationStats) -> Self {
        debug_assert_eq!(times.len(), states.len());
        Self {
            times,
            states,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.states.first().map_or(0, Vec::len)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.iter().map(Vec::as_slice))
    }

    pub fn final_state(&self) -> &[f64] {
        self.states.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Time series of one state component, or `None` if out of range.
    pub fn component(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.dimension() {
            return None;
        }
        Some(self.states.iter().map(|state| state[index]).collect())
    }

    /// Pairs of two components, the orbit drawn on a phase plane.
    pub fn phase_path(&self, x: usize, y: usize) -> Option<Vec<[f64; 2]>> {
        let dim = self.dimension();
        if x >= dim || y >= dim {
            return None;
        }
        Some(self.states.iter().map(|state| [state[x], state[y]]).collect())
    }

    /// First occurrence of the maximum value of a component.
    pub fn peak(&self, index: usize) -> Option<Peak> {
        let series = self.component(index)?;
        let mut best: Option<Peak> = None;
        for (i, value) in series.into_iter().enumerate() {
            if best.map_or(true, |peak| value > peak.value) {
                best = Some(Peak {
                    index: i,
                    time: self.times[i],
                    value,
                });
            }
        }
        best
    }

    /// Times at which a component crosses `level`, linearly interpolated
    /// between output points. Touching the level without changing side is
    /// not a crossing.
    pub fn crossings(&self, index: usize, level: f64) -> Vec<f64> {
        let Some(series) = self.component(index) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut previous: Option<(f64, f64)> = None;
        for (&t, &value) in self.times.iter().zip(series.iter()) {
            let offset = value - level;
            if offset == 0.0 {
                continue;
            }
            if let Some((t0, o0)) = previous {
                if (o0 < 0.0) != (offset < 0.0) {
                    let fraction = o0 / (o0 - offset);
                    result.push(t0 + (t - t0) * fraction);
                }
            }
            previous = Some((t, offset));
        }
        result
    }
}
