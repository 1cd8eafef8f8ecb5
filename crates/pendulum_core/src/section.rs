use crate::error::{CoreError, Result};
use crate::observables::{normalize_angle, observe, ObservableVector};
use crate::pendulum::{initial_state, DoublePendulum, PhysicalParameters};
use crate::solvers::{Rkf78, SolverSettings};
use serde::{Deserialize, Serialize};

/// Accumulated section crossings, in the temporal order they occurred.
/// Capacity is fixed at construction; the fill cursor only moves forward
/// and pushes past capacity are a hard error, so a complete set has
/// exactly the requested length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoincareSet {
    points: Vec<ObservableVector>,
    capacity: usize,
}

impl PoincareSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.points.len() == self.capacity
    }

    pub fn points(&self) -> &[ObservableVector] {
        &self.points
    }

    pub fn push(&mut self, point: ObservableVector) -> Result<()> {
        if self.points.len() >= self.capacity {
            return Err(CoreError::InvalidInput(format!(
                "Poincare set is full ({} points)",
                self.capacity
            )));
        }
        self.points.push(point);
        Ok(())
    }

    /// Projects the set onto two observable components, yielding the 2-D
    /// point cloud the fractal-dimension estimator consumes.
    pub fn projection(&self, i1: usize, i2: usize) -> Result<Vec<[f64; 2]>> {
        if i1 >= ObservableVector::COMPONENTS || i2 >= ObservableVector::COMPONENTS {
            return Err(CoreError::InvalidInput(format!(
                "projection components must be below {}, got {} and {}",
                ObservableVector::COMPONENTS,
                i1,
                i2
            )));
        }
        Ok(self.points.iter().map(|p| [p.0[i1], p.0[i2]]).collect())
    }
}

/// Estimates the section-crossing state between two observable samples
/// that bracket one integration micro-step.
///
/// The section component must strictly change sign across the bracket;
/// a shared sign (zero included) means the section was not crossed and
/// the caller must not proceed. The crossing is one secant step: every
/// component is blended linearly at the fraction that zeroes the section
/// component, trading root-refinement precision for a single extra
/// integrator call per candidate. Angle components are re-wrapped after
/// blending.
pub fn interpolate_crossing(
    old: &ObservableVector,
    new: &ObservableVector,
    component: usize,
) -> Result<ObservableVector> {
    if component >= ObservableVector::COMPONENTS {
        return Err(CoreError::InvalidInput(format!(
            "section component must be below {}, got {}",
            ObservableVector::COMPONENTS,
            component
        )));
    }

    let a_old = old.0[component];
    let a_new = new.0[component];
    if !(a_old * a_new < 0.0) {
        return Err(CoreError::NonCrossingSection {
            component,
            old: a_old,
            new: a_new,
        });
    }

    // Strictly inside (0, 1) because the signs are strictly opposite.
    let fraction = -a_old / (a_new - a_old);

    let mut blended = [0.0; ObservableVector::COMPONENTS];
    for (i, value) in blended.iter_mut().enumerate() {
        *value = old.0[i] + fraction * (new.0[i] - old.0[i]);
    }
    blended[ObservableVector::Q1] = normalize_angle(blended[ObservableVector::Q1]);
    blended[ObservableVector::Q2] = normalize_angle(blended[ObservableVector::Q2]);

    Ok(ObservableVector(blended))
}

/// Budget and tolerance settings for the Poincare sampling loop. The
/// micro-step budget bounds the loop's runtime: crossings of a poorly
/// chosen section may be arbitrarily rare, and elapsed simulated time has
/// no intrinsic upper bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerSettings {
    pub solver: SolverSettings,
    pub max_micro_steps: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            solver: SolverSettings::default(),
            max_micro_steps: 10_000_000,
        }
    }
}

/// Collects `target_points` section crossings of the chosen observable
/// component, advancing the pendulum in fixed micro-steps of `step_size`
/// and interpolating each detected crossing.
///
/// The loop is inherently sequential: each micro-step starts from the
/// previous end state. On success the returned set is exactly full.
pub fn simulate_poincare_section(
    params: &PhysicalParameters,
    energy: f64,
    target_points: usize,
    step_size: f64,
    section_component: usize,
    settings: &SamplerSettings,
) -> Result<PoincareSet> {
    if target_points == 0 {
        return Err(CoreError::InvalidInput(
            "target_points must be at least 1".to_string(),
        ));
    }
    if !(step_size > 0.0) || !step_size.is_finite() {
        return Err(CoreError::InvalidInput(format!(
            "step_size must be positive and finite, got {}",
            step_size
        )));
    }
    if section_component >= ObservableVector::COMPONENTS {
        return Err(CoreError::InvalidInput(format!(
            "section component must be below {}, got {}",
            ObservableVector::COMPONENTS,
            section_component
        )));
    }

    let state = initial_state(params, energy)?;
    let system = DoublePendulum::new(*params);
    let mut solver = Rkf78::new(4, settings.solver);

    let mut set = PoincareSet::with_capacity(target_points);
    let mut t = 0.0;
    let mut y = state.to_vec();
    let mut previous = observe(params, &state);

    let mut micro_steps = 0u64;
    while !set.is_complete() {
        if micro_steps >= settings.max_micro_steps {
            return Err(CoreError::StepBudgetExhausted {
                collected: set.len(),
                target: target_points,
                budget: settings.max_micro_steps,
            });
        }

        let (t_new, y_new) = solver.integrate(&system, t, &y, t + step_size)?;
        t = t_new;
        y = y_new;
        micro_steps += 1;

        let current = observe(params, &[y[0], y[1], y[2], y[3]]);
        if previous.0[section_component] * current.0[section_component] < 0.0 {
            let crossing = interpolate_crossing(&previous, &current, section_component)?;
            set.push(crossing)?;
        }
        previous = current;
    }

    Ok(set)
}
