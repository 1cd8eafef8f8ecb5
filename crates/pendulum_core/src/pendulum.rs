use crate::error::{CoreError, Result};
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};

/// Raw state of the system: (q1, q2, omega1, omega2).
pub type State = [f64; 4];

/// Reduction denominators at or below this magnitude are treated as
/// singular rather than divided through.
const COUPLING_EPSILON: f64 = 1e-12;

/// Masses, arm lengths and gravitational acceleration for one run.
/// Immutable; every component that needs the physics takes this by
/// reference instead of reading ambient constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhysicalParameters {
    pub m1: f64,
    pub m2: f64,
    pub l1: f64,
    pub l2: f64,
    pub g: f64,
}

impl Default for PhysicalParameters {
    fn default() -> Self {
        Self {
            m1: 1.0,
            m2: 1.0,
            l1: 1.0,
            l2: 1.0,
            g: 10.0,
        }
    }
}

impl PhysicalParameters {
    pub fn validate(&self) -> Result<()> {
        if self.m1 <= 0.0 || self.m2 <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "masses must be positive, got m1 = {}, m2 = {}",
                self.m1, self.m2
            )));
        }
        if self.l1 <= 0.0 || self.l2 <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "arm lengths must be positive, got l1 = {}, l2 = {}",
                self.l1, self.l2
            )));
        }
        if self.g <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "gravitational acceleration must be positive, got g = {}",
                self.g
            )));
        }
        Ok(())
    }

    /// Energy (above the double-downward rest state) at which the lower
    /// arm reaches the inverted position: 2 m2 g L2.
    pub fn lower_inversion_energy(&self) -> f64 {
        2.0 * self.m2 * self.g * self.l2
    }

    /// Energy at which both arms reach the inverted position:
    /// 2 (m1 + m2) g L1 + 2 m2 g L2.
    pub fn full_inversion_energy(&self) -> f64 {
        2.0 * (self.m1 + self.m2) * self.g * self.l1 + self.lower_inversion_energy()
    }
}

/// The double-pendulum vector field in Lagrangian form.
///
/// The angular accelerations come from the reduced 2x2 system
///
///   omega1_dot = (f1 - a1 f2) / (1 - a1 a2)
///   omega2_dot = (f2 - a2 f1) / (1 - a1 a2)
///
/// with coupling coefficients a1, a2 and forcing terms f1, f2 carrying the
/// centrifugal coupling and the gravity torque of each arm.
#[derive(Debug, Clone, Copy)]
pub struct DoublePendulum {
    params: PhysicalParameters,
}

impl DoublePendulum {
    pub fn new(params: PhysicalParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PhysicalParameters {
        &self.params
    }

    /// Angular accelerations (omega1_dot, omega2_dot) at the given state.
    /// Fails if the reduction denominator 1 - a1*a2 vanishes.
    pub fn accelerations(&self, state: &State) -> Result<(f64, f64)> {
        let p = &self.params;
        let [q1, q2, omega1, omega2] = *state;

        let delta = q1 - q2;
        let alpha1 = p.l2 / p.l1 * p.m2 / (p.m1 + p.m2) * delta.cos();
        let alpha2 = p.l1 / p.l2 * delta.cos();
        let f1 = -p.l2 / p.l1 * p.m2 / (p.m1 + p.m2) * omega2 * omega2 * delta.sin()
            - p.g / p.l1 * q1.sin();
        let f2 = p.l1 / p.l2 * omega1 * omega1 * delta.sin() - p.g / p.l2 * q2.sin();

        let denominator = 1.0 - alpha1 * alpha2;
        if denominator.abs() <= COUPLING_EPSILON {
            return Err(CoreError::SingularCoupling { denominator });
        }

        Ok((
            (f1 - alpha1 * f2) / denominator,
            (f2 - alpha2 * f1) / denominator,
        ))
    }
}

impl DynamicalSystem<f64> for DoublePendulum {
    fn dimension(&self) -> usize {
        4
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let state = [x[0], x[1], x[2], x[3]];
        out[0] = x[2];
        out[1] = x[3];
        match self.accelerations(&state) {
            Ok((omega1_dot, omega2_dot)) => {
                out[2] = omega1_dot;
                out[3] = omega2_dot;
            }
            // Poison the derivative so the adaptive loop rejects the step
            // and surfaces a typed integration failure instead of dividing
            // by zero here.
            Err(_) => {
                out[2] = f64::NAN;
                out[3] = f64::NAN;
            }
        }
    }
}

/// Maps a target total energy (relative to the double-downward rest
/// configuration) to a starting state, in closed form.
///
/// The three valid energy bands place the system at rest with the lower
/// arm tilted, at rest with the lower arm inverted and the upper arm
/// tilted, or fully inverted with the residual energy converted into
/// angular velocity of the lower arm. The branch boundaries are the
/// equilibrium transition energies and must not drift.
pub fn initial_state(params: &PhysicalParameters, delta_e: f64) -> Result<State> {
    params.validate()?;
    if delta_e < 0.0 {
        return Err(CoreError::InvalidEnergy { energy: delta_e });
    }

    let lower_bound = params.lower_inversion_energy();
    let full_bound = params.full_inversion_energy();

    if delta_e < lower_bound {
        // Only the lower arm is tilted.
        let q2 = (1.0 - delta_e / (params.m2 * params.g * params.l2)).acos();
        Ok([0.0, q2, 0.0, 0.0])
    } else if delta_e < full_bound {
        // Lower arm fully inverted; the remaining energy tilts the upper arm.
        let q1 = ((lower_bound - delta_e) / (2.0 * (params.m1 + params.m2) * params.g * params.l1))
            .acos();
        Ok([q1, std::f64::consts::PI, 0.0, 0.0])
    } else {
        // Both arms inverted; the excess spins the lower arm.
        let omega2 = (2.0 * (delta_e - full_bound) / (params.m2 * params.l2 * params.l2)).sqrt();
        Ok([std::f64::consts::PI, std::f64::consts::PI, 0.0, omega2])
    }
}

#[cfg(test)]
mod tests {
    use super::{initial_state, DoublePendulum, PhysicalParameters};
    use crate::error::CoreError;
    use crate::traits::DynamicalSystem;
    use std::f64::consts::PI;

    #[test]
    fn default_parameters_match_reference_constants() {
        let params = PhysicalParameters::default();
        assert_eq!(params.g, 10.0);
        assert_eq!(params.lower_inversion_energy(), 20.0);
        assert_eq!(params.full_inversion_energy(), 60.0);
    }

    #[test]
    fn negative_energy_is_rejected() {
        let params = PhysicalParameters::default();
        let err = initial_state(&params, -1.0).expect_err("expected rejection");
        assert!(matches!(err, CoreError::InvalidEnergy { energy } if energy == -1.0));
    }

    #[test]
    fn non_physical_parameters_are_rejected() {
        let params = PhysicalParameters {
            m2: 0.0,
            ..Default::default()
        };
        let err = initial_state(&params, 10.0).expect_err("expected rejection");
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn low_energy_tilts_only_the_lower_arm() {
        let params = PhysicalParameters::default();
        let state = initial_state(&params, 15.0).expect("band 2 state");
        assert_eq!(state[0], 0.0);
        // cos(q2) = 1 - 15 / (m2 g L2) = -0.5
        assert!((state[1] - (-0.5_f64).acos()).abs() < 1e-15);
        assert_eq!(state[2], 0.0);
        assert_eq!(state[3], 0.0);
    }

    #[test]
    fn mid_energy_inverts_the_lower_arm() {
        let params = PhysicalParameters::default();
        let state = initial_state(&params, 40.0).expect("band 3 state");
        // cos(q1) = (20 - 40) / 40 = -0.5
        assert!((state[0] - (-0.5_f64).acos()).abs() < 1e-15);
        assert_eq!(state[1], PI);
        assert_eq!(state[2], 0.0);
        assert_eq!(state[3], 0.0);
    }

    #[test]
    fn high_energy_spins_the_lower_arm() {
        let params = PhysicalParameters::default();
        let state = initial_state(&params, 75.0).expect("band 4 state");
        assert_eq!(state[0], PI);
        assert_eq!(state[1], PI);
        assert_eq!(state[2], 0.0);
        // omega2 = sqrt(2 * (75 - 60) / (m2 * L2^2)) = sqrt(30)
        assert!((state[3] - 30.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn band_boundary_routes_to_the_upper_branch() {
        let params = PhysicalParameters::default();
        let at_lower = initial_state(&params, 20.0).expect("boundary state");
        assert_eq!(at_lower[1], PI, "lower-inversion boundary belongs to band 3");
        let at_full = initial_state(&params, 60.0).expect("boundary state");
        assert_eq!(at_full[0], PI, "full-inversion boundary belongs to band 4");
        assert_eq!(at_full[3], 0.0);
    }

    #[test]
    fn vector_field_matches_hand_computed_accelerations() {
        let params = PhysicalParameters::default();
        let pendulum = DoublePendulum::new(params);
        // At (q1, q2, w1, w2) = (pi/2, 0, 0, 0): a1 = 0, a2 = 0,
        // f1 = -g, f2 = 0, so w1_dot = -10 and w2_dot = 0.
        let state = [std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0];
        let (w1_dot, w2_dot) = pendulum.accelerations(&state).expect("regular state");
        assert!((w1_dot + 10.0).abs() < 1e-12);
        assert!(w2_dot.abs() < 1e-12);

        let mut out = [0.0; 4];
        pendulum.apply(0.0, &state, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] + 10.0).abs() < 1e-12);
        assert!(out[3].abs() < 1e-12);
    }

    #[test]
    fn rest_state_has_zero_accelerations() {
        let pendulum = DoublePendulum::new(PhysicalParameters::default());
        let (w1_dot, w2_dot) = pendulum.accelerations(&[0.0; 4]).expect("rest state");
        assert_eq!(w1_dot, 0.0);
        assert_eq!(w2_dot, 0.0);
    }
}
