use crate::error::{CoreError, Result};
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};

/// Runge-Kutta-Fehlberg 7(8) tableau (NASA TR R-287). Thirteen stages,
/// eighth-order solution with an embedded seventh-order error estimate.
const STAGES: usize = 13;

const C: [f64; STAGES] = [
    0.0,
    2.0 / 27.0,
    1.0 / 9.0,
    1.0 / 6.0,
    5.0 / 12.0,
    1.0 / 2.0,
    5.0 / 6.0,
    1.0 / 6.0,
    2.0 / 3.0,
    1.0 / 3.0,
    1.0,
    0.0,
    1.0,
];

#[rustfmt::skip]
const A: [[f64; STAGES - 1]; STAGES] = [
    [0.0; STAGES - 1],
    [2.0 / 27.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 36.0, 1.0 / 12.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 24.0, 0.0, 1.0 / 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [5.0 / 12.0, 0.0, -25.0 / 16.0, 25.0 / 16.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 20.0, 0.0, 0.0, 1.0 / 4.0, 1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-25.0 / 108.0, 0.0, 0.0, 125.0 / 108.0, -65.0 / 27.0, 125.0 / 54.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [31.0 / 300.0, 0.0, 0.0, 0.0, 61.0 / 225.0, -2.0 / 9.0, 13.0 / 900.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [2.0, 0.0, 0.0, -53.0 / 6.0, 704.0 / 45.0, -107.0 / 9.0, 67.0 / 90.0, 3.0, 0.0, 0.0, 0.0, 0.0],
    [-91.0 / 108.0, 0.0, 0.0, 23.0 / 108.0, -976.0 / 135.0, 311.0 / 54.0, -19.0 / 60.0, 17.0 / 6.0, -1.0 / 12.0, 0.0, 0.0, 0.0],
    [2383.0 / 4100.0, 0.0, 0.0, -341.0 / 164.0, 4496.0 / 1025.0, -301.0 / 82.0, 2133.0 / 4100.0, 45.0 / 82.0, 45.0 / 164.0, 18.0 / 41.0, 0.0, 0.0],
    [3.0 / 205.0, 0.0, 0.0, 0.0, 0.0, -6.0 / 41.0, -3.0 / 205.0, -3.0 / 41.0, 3.0 / 41.0, 6.0 / 41.0, 0.0, 0.0],
    [-1777.0 / 4100.0, 0.0, 0.0, -341.0 / 164.0, 4496.0 / 1025.0, -289.0 / 82.0, 2193.0 / 4100.0, 51.0 / 82.0, 33.0 / 164.0, 12.0 / 41.0, 0.0, 1.0],
];

#[rustfmt::skip]
const B: [f64; STAGES] = [
    0.0, 0.0, 0.0, 0.0, 0.0,
    34.0 / 105.0, 9.0 / 35.0, 9.0 / 35.0, 9.0 / 280.0, 9.0 / 280.0,
    0.0, 41.0 / 840.0, 41.0 / 840.0,
];

/// Difference between the eighth- and seventh-order weights.
#[rustfmt::skip]
const B_ERR: [f64; STAGES] = [
    -41.0 / 840.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    -41.0 / 840.0, 41.0 / 840.0, 41.0 / 840.0,
];

/// Step-size controller: h_new = safety * h * error^(-1/8), clamped.
const SAFETY: f64 = 0.9;
const MAX_FACTOR: f64 = 5.0;
const MIN_FACTOR: f64 = 0.2;
const ERROR_EXPONENT: f64 = 1.0 / 8.0;

/// Error-control and step-limit settings for the adaptive integrator.
/// The defaults are Poincare-grade; looser tolerances are acceptable for
/// visualization-grade dense trajectories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverSettings {
    pub atol: f64,
    pub rtol: f64,
    pub h_min: f64,
    pub h_max: f64,
    pub max_steps: u64,
    pub initial_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            atol: 1e-10,
            rtol: 1e-10,
            h_min: 1e-14,
            h_max: f64::INFINITY,
            max_steps: 10_000_000,
            initial_step: 1e-3,
        }
    }
}

impl SolverSettings {
    fn validate(&self) -> Result<()> {
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "atol must be positive and finite, got {}",
                self.atol
            )));
        }
        if !self.rtol.is_finite() || self.rtol < 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "rtol must be non-negative and finite, got {}",
                self.rtol
            )));
        }
        if !(self.h_min > 0.0) || !(self.h_max > self.h_min) {
            return Err(CoreError::InvalidInput(format!(
                "step limits must satisfy 0 < h_min < h_max, got {} and {}",
                self.h_min, self.h_max
            )));
        }
        if self.max_steps == 0 {
            return Err(CoreError::InvalidInput(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if !(self.initial_step > 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "initial_step must be positive, got {}",
                self.initial_step
            )));
        }
        Ok(())
    }
}

/// Evaluation and acceptance counters, useful when tuning tolerances.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub fn_evals: u64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// Adaptive Runge-Kutta-Fehlberg 7(8) integrator.
///
/// One instance owns its stage buffers (sized at construction for one
/// system dimension) and is reused across calls; `integrate` blocks until
/// the requested interval is solved or fails with a typed error. There is
/// no automatic tolerance relaxation.
pub struct Rkf78 {
    settings: SolverSettings,
    k: Vec<Vec<f64>>,
    y_stage: Vec<f64>,
    y_next: Vec<f64>,
    pub stats: Stats,
}

struct StepOutcome {
    h_next: f64,
    accepted: bool,
}

impl Rkf78 {
    pub fn new(dim: usize, settings: SolverSettings) -> Self {
        Self {
            settings,
            k: vec![vec![0.0; dim]; STAGES],
            y_stage: vec![0.0; dim],
            y_next: vec![0.0; dim],
            stats: Stats::default(),
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Solves the system from (t0, y0) to tf. Returns the end time and
    /// end state; the direction of integration follows the sign of
    /// tf - t0.
    pub fn integrate(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t0: f64,
        y0: &[f64],
        tf: f64,
    ) -> Result<(f64, Vec<f64>)> {
        self.validate_inputs(system, t0, y0, tf)?;
        if t0 == tf {
            return Ok((t0, y0.to_vec()));
        }

        let direction = (tf - t0).signum();
        let mut t = t0;
        let mut y = y0.to_vec();
        let mut h = self
            .settings
            .initial_step
            .min((tf - t0).abs())
            .clamp(self.settings.h_min, self.settings.h_max)
            * direction;

        let mut step_count = 0u64;
        while (tf - t) * direction > self.settings.h_min {
            // Do not overshoot the endpoint.
            if (t + h - tf) * direction > 0.0 {
                h = tf - t;
            }

            let outcome = self.attempt_step(system, t, &y, h);

            if outcome.accepted {
                t += h;
                y.copy_from_slice(&self.y_next);
                if !y.iter().all(|v| v.is_finite()) {
                    return Err(CoreError::NonFiniteState { t });
                }
            } else if outcome.h_next <= self.settings.h_min {
                return Err(CoreError::StepSizeTooSmall {
                    t,
                    h: outcome.h_next,
                });
            }

            h = outcome.h_next * direction;

            step_count += 1;
            if step_count > self.settings.max_steps {
                return Err(CoreError::MaxStepsExceeded {
                    max_steps: self.settings.max_steps,
                });
            }
        }

        Ok((t, y))
    }

    /// One trial step of signed size h. Writes the eighth-order solution
    /// into `self.y_next` and reports the scaled error, the suggested next
    /// step magnitude, and whether the step met tolerance.
    fn attempt_step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: f64,
        y: &[f64],
        h: f64,
    ) -> StepOutcome {
        let dim = y.len();

        system.apply(t, y, &mut self.k[0]);
        for i in 1..STAGES {
            for n in 0..dim {
                let mut sum = 0.0;
                for j in 0..i {
                    sum += A[i][j] * self.k[j][n];
                }
                self.y_stage[n] = y[n] + h * sum;
            }
            system.apply(t + C[i] * h, &self.y_stage, &mut self.k[i]);
        }
        self.stats.fn_evals += STAGES as u64;

        // Eighth-order solution and scaled max-norm error estimate.
        let mut error: f64 = 0.0;
        for n in 0..dim {
            let mut sum = 0.0;
            let mut err_n = 0.0;
            for i in 0..STAGES {
                sum += B[i] * self.k[i][n];
                err_n += B_ERR[i] * self.k[i][n];
            }
            self.y_next[n] = y[n] + h * sum;

            let scale = self.settings.atol + self.settings.rtol * self.y_next[n].abs();
            error = error.max((h * err_n).abs() / scale);
        }

        let accepted = error <= 1.0;
        if accepted {
            self.stats.accepted_steps += 1;
        } else {
            self.stats.rejected_steps += 1;
        }

        // A non-finite error estimate (poisoned derivative) forces the
        // maximum reduction so the failure surfaces as StepSizeTooSmall.
        let factor = if error == 0.0 {
            MAX_FACTOR
        } else if !error.is_finite() {
            MIN_FACTOR
        } else {
            (SAFETY * error.powf(-ERROR_EXPONENT)).clamp(MIN_FACTOR, MAX_FACTOR)
        };
        let h_next = (h.abs() * factor).clamp(self.settings.h_min, self.settings.h_max);

        StepOutcome { h_next, accepted }
    }

    fn validate_inputs(
        &self,
        system: &impl DynamicalSystem<f64>,
        t0: f64,
        y0: &[f64],
        tf: f64,
    ) -> Result<()> {
        self.settings.validate()?;
        if y0.len() != system.dimension() || y0.len() != self.y_next.len() {
            return Err(CoreError::InvalidInput(format!(
                "state dimension mismatch: solver sized for {}, system reports {}, state has {}",
                self.y_next.len(),
                system.dimension(),
                y0.len()
            )));
        }
        if !t0.is_finite() || !tf.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "integration bounds must be finite, got t0 = {}, tf = {}",
                t0, tf
            )));
        }
        for (i, value) in y0.iter().enumerate() {
            if !value.is_finite() {
                return Err(CoreError::InvalidInput(format!(
                    "initial state component {} is not finite",
                    i
                )));
            }
        }
        Ok(())
    }
}
