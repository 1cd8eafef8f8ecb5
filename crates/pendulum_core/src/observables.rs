use crate::pendulum::{PhysicalParameters, State};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Derived observables at one instant: angles, angular velocities,
/// conjugate momenta and total energy, in component order
/// (q1, q2, omega1, omega2, p1, p2, E).
///
/// Angle and velocity components are wrapped into (-pi, pi]; momenta and
/// energy are unrestricted and computed from the raw state before
/// wrapping. A fresh vector is produced per step, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservableVector(pub [f64; 7]);

impl ObservableVector {
    pub const Q1: usize = 0;
    pub const Q2: usize = 1;
    pub const OMEGA1: usize = 2;
    pub const OMEGA2: usize = 3;
    pub const P1: usize = 4;
    pub const P2: usize = 5;
    pub const ENERGY: usize = 6;

    pub const COMPONENTS: usize = 7;

    pub fn q1(&self) -> f64 {
        self.0[Self::Q1]
    }

    pub fn q2(&self) -> f64 {
        self.0[Self::Q2]
    }

    pub fn omega1(&self) -> f64 {
        self.0[Self::OMEGA1]
    }

    pub fn omega2(&self) -> f64 {
        self.0[Self::OMEGA2]
    }

    pub fn p1(&self) -> f64 {
        self.0[Self::P1]
    }

    pub fn p2(&self) -> f64 {
        self.0[Self::P2]
    }

    pub fn energy(&self) -> f64 {
        self.0[Self::ENERGY]
    }
}

/// Reduces an angle modulo 2pi into (-pi, pi]: subtract 2pi if the
/// reduced value exceeds pi, add 2pi if it is below -pi.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut reduced = angle % (2.0 * PI);
    if reduced > PI {
        reduced -= 2.0 * PI;
    } else if reduced < -PI {
        reduced += 2.0 * PI;
    }
    reduced
}

/// Kinetic energy of the raw state.
pub fn kinetic_energy(params: &PhysicalParameters, state: &State) -> f64 {
    let [q1, q2, omega1, omega2] = *state;
    0.5 * (params.m1 + params.m2) * params.l1 * params.l1 * omega1 * omega1
        + 0.5 * params.m2 * params.l2 * params.l2 * omega2 * omega2
        + params.m2 * params.l1 * params.l2 * omega1 * omega2 * (q1 - q2).cos()
}

/// Potential energy of the raw state, measured from the pivot.
pub fn potential_energy(params: &PhysicalParameters, state: &State) -> f64 {
    let [q1, q2, _, _] = *state;
    -(params.m1 + params.m2) * params.g * params.l1 * q1.cos()
        - params.m2 * params.g * params.l2 * q2.cos()
}

/// Total mechanical energy of the raw state.
pub fn total_energy(params: &PhysicalParameters, state: &State) -> f64 {
    kinetic_energy(params, state) + potential_energy(params, state)
}

/// Derives the full observable vector from a raw state. Pure function.
pub fn observe(params: &PhysicalParameters, state: &State) -> ObservableVector {
    let [q1, q2, omega1, omega2] = *state;
    let cos_delta = (q1 - q2).cos();

    let p1 = (params.m1 + params.m2) * params.l1 * params.l1 * omega1
        + params.m2 * params.l1 * params.l2 * omega2 * cos_delta;
    let p2 = params.m2 * params.l2 * params.l2 * omega2
        + params.m2 * params.l1 * params.l2 * omega1 * cos_delta;
    let energy = total_energy(params, state);

    ObservableVector([
        normalize_angle(q1),
        normalize_angle(q2),
        normalize_angle(omega1),
        normalize_angle(omega2),
        p1,
        p2,
        energy,
    ])
}

/// Derives observables for a whole state array.
pub fn observe_all(params: &PhysicalParameters, states: &[State]) -> Vec<ObservableVector> {
    states.iter().map(|state| observe(params, state)).collect()
}
