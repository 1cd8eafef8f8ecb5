use crate::error::{CoreError, Result};
use crate::pendulum::{initial_state, DoublePendulum, PhysicalParameters, State};
use crate::solvers::{Rkf78, SolverSettings};
use serde::{Deserialize, Serialize};

/// Raw time evolution over a fixed evaluation grid. Append-only; external
/// consumers pull (time, state) pairs from `iter` instead of holding
/// callbacks into the integration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<State>,
}

impl Trajectory {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, time: f64, state: State) {
        self.times.push(time);
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Finite, restartable view of the sampled evolution.
    pub fn iter(&self) -> impl Iterator<Item = (f64, State)> + '_ {
        self.times.iter().copied().zip(self.states.iter().copied())
    }
}

/// Integrates a dense trajectory for the given target energy over
/// `time_span`, sampled on a fixed grid of `sample_count` points
/// (endpoints included).
pub fn simulate_trajectory(
    params: &PhysicalParameters,
    energy: f64,
    time_span: (f64, f64),
    sample_count: usize,
    settings: &SolverSettings,
) -> Result<Trajectory> {
    if sample_count < 2 {
        return Err(CoreError::InvalidInput(format!(
            "sample_count must be at least 2, got {}",
            sample_count
        )));
    }
    let (t_start, t_end) = time_span;
    if !(t_end > t_start) {
        return Err(CoreError::InvalidInput(format!(
            "time span must be increasing, got ({}, {})",
            t_start, t_end
        )));
    }

    let state = initial_state(params, energy)?;
    let system = DoublePendulum::new(*params);
    let mut solver = Rkf78::new(4, *settings);

    let mut trajectory = Trajectory::with_capacity(sample_count);
    trajectory.push(t_start, state);

    let grid_step = (t_end - t_start) / (sample_count - 1) as f64;
    let mut t = t_start;
    let mut y = state.to_vec();
    for i in 1..sample_count {
        // Land each segment on the grid point exactly; accumulated
        // rounding from repeated += would drift over long spans.
        let target = if i == sample_count - 1 {
            t_end
        } else {
            t_start + grid_step * i as f64
        };
        let (t_new, y_new) = solver.integrate(&system, t, &y, target)?;
        t = t_new;
        y = y_new;
        trajectory.push(t, [y[0], y[1], y[2], y[3]]);
    }

    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::simulate_trajectory;
    use crate::error::CoreError;
    use crate::observables::total_energy;
    use crate::pendulum::PhysicalParameters;
    use crate::solvers::SolverSettings;

    #[test]
    fn grid_spans_the_requested_interval() {
        let params = PhysicalParameters::default();
        let trajectory =
            simulate_trajectory(&params, 15.0, (0.0, 2.0), 21, &SolverSettings::default())
                .expect("simulation should succeed");
        assert_eq!(trajectory.len(), 21);
        assert_eq!(trajectory.times()[0], 0.0);
        assert!((trajectory.times()[20] - 2.0).abs() < 1e-12);
        let (t, state) = trajectory.iter().next().expect("non-empty");
        assert_eq!(t, 0.0);
        assert_eq!(state[0], 0.0);
    }

    #[test]
    fn energy_is_conserved_at_tight_tolerances() {
        let params = PhysicalParameters::default();
        let trajectory =
            simulate_trajectory(&params, 75.0, (0.0, 20.0), 401, &SolverSettings::default())
                .expect("simulation should succeed");

        let initial = total_energy(&params, &trajectory.states()[0]);
        for (t, state) in trajectory.iter() {
            let drift = (total_energy(&params, &state) - initial).abs();
            assert!(drift < 1e-6, "energy drift {} at t = {}", drift, t);
        }
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        let params = PhysicalParameters::default();
        let settings = SolverSettings::default();
        assert!(matches!(
            simulate_trajectory(&params, 15.0, (0.0, 2.0), 1, &settings),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            simulate_trajectory(&params, 15.0, (2.0, 2.0), 10, &settings),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn invalid_energy_propagates() {
        let params = PhysicalParameters::default();
        let err = simulate_trajectory(&params, -5.0, (0.0, 1.0), 10, &SolverSettings::default())
            .expect_err("expected rejection");
        assert!(matches!(err, CoreError::InvalidEnergy { .. }));
    }
}
