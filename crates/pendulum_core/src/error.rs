use thiserror::Error;

/// Failure modes surfaced by the core. Callers are expected to match on
/// these rather than parse messages: a Poincare run aborted by an
/// integration failure is distinguishable from one that merely ran out of
/// its step budget.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The requested total energy is below the rest configuration.
    #[error("target energy must be non-negative, got {energy}")]
    InvalidEnergy { energy: f64 },

    /// A call argument was malformed (zero counts, non-positive step
    /// sizes, out-of-range component indices, bad tolerances).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The crossing detector was handed a bracket whose section component
    /// did not strictly change sign.
    #[error(
        "section component {component} did not change sign across the step \
         ({old} -> {new}); the section was not crossed"
    )]
    NonCrossingSection {
        component: usize,
        old: f64,
        new: f64,
    },

    /// The adaptive integrator could not meet tolerance within its
    /// internal step-size limits.
    #[error("step size {h:.3e} fell below the minimum at t = {t}")]
    StepSizeTooSmall { t: f64, h: f64 },

    /// The adaptive integrator exceeded its internal step count.
    #[error("exceeded {max_steps} integration steps before reaching the end of the interval")]
    MaxStepsExceeded { max_steps: u64 },

    /// The state left the finite floats during integration.
    #[error("state became non-finite at t = {t}")]
    NonFiniteState { t: f64 },

    /// The Lagrangian reduction denominator 1 - a1*a2 vanished. Does not
    /// occur for physically sensible mass/length ratios.
    #[error("inertia coupling is singular (1 - a1*a2 = {denominator:.3e})")]
    SingularCoupling { denominator: f64 },

    /// The Poincare loop hit its micro-step budget before filling the
    /// section. The budget bounds an otherwise open-ended loop.
    #[error(
        "collected {collected} of {target} section points within the micro-step budget of {budget}"
    )]
    StepBudgetExhausted {
        collected: usize,
        target: usize,
        budget: u64,
    },

    /// A persisted box-counting data file could not be re-read.
    #[error("malformed box-counting data: {0}")]
    MalformedData(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
