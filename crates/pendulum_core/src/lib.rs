//! The `pendulum_core` crate is the computational engine for double-pendulum
//! chaos analysis. It simulates the chaotic flow and extracts quantitative
//! structure from it: dense trajectories, derived observables, Poincare
//! sections and a box-counting fractal-dimension estimate of the section's
//! point cloud.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction) and `DynamicalSystem`
//!   (vector fields).
//! - **Pendulum**: the Lagrangian vector field and the closed-form
//!   energy-to-initial-state solver.
//! - **Solvers**: the adaptive Runge-Kutta-Fehlberg 7(8) integrator.
//! - **Observables**: momenta, energy and angle normalization.
//! - **Section**: crossing interpolation and the Poincare sampling loop.
//! - **Fractal**: box counting, the log-log regression, and the persisted
//!   data format.
//!
//! Rendering, animation and command-line dispatch are external consumers
//! of these results and live outside this crate.

pub mod error;
pub mod fractal;
pub mod observables;
pub mod pendulum;
pub mod section;
pub mod solvers;
pub mod traits;
pub mod trajectory;

pub use error::{CoreError, Result};
pub use fractal::{estimate_fractal_dimension, BoundingBox, BoxCountSample, BoxCountSeries};
pub use observables::{observe, observe_all, ObservableVector};
pub use pendulum::{initial_state, DoublePendulum, PhysicalParameters, State};
pub use section::{
    interpolate_crossing, simulate_poincare_section, PoincareSet, SamplerSettings,
};
pub use solvers::{Rkf78, SolverSettings};
pub use trajectory::{simulate_trajectory, Trajectory};
