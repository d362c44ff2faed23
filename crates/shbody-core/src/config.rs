use crate::math::Vec3;

/// Time integration scheme used by `_integrate` (§4.6).
///
/// `Rk4` is an accepted configuration value but falls back to the `Euler`
/// integration path -- a full RK4 stepper is not part of this solver.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntegrationMethod {
    Verlet,
    Euler,
    Rk4,
}

/// Every tunable the Solver's constructor accepts (§4.6).
pub struct SolverConfig {
    pub gravity: Vec3,
    pub gravity_enabled: bool,
    /// Air drag applied as a force proportional to velocity.
    pub air_damping: f64,
    pub ground_y: f64,
    pub ground_restitution: f64,
    /// Full frame time step; substeps divide this into `sub_dt`.
    pub time_step: f64,
    pub substeps: u32,
    pub constraint_iterations: u32,
    /// Over/under-relaxation for pure-PBD (`compliance == 0`) constraints.
    /// XPBD constraints (`compliance > 0`) always use `1.0` -- over-relaxing
    /// a compliant constraint would fight its own Lagrange multiplier.
    pub constraint_relaxation: f64,
    pub collision_enabled: bool,
    pub self_collision_enabled: bool,
    pub collision_margin: f64,
    pub method: IntegrationMethod,
    /// A Structural/Shear Distance constraint tears when its current length
    /// exceeds `rest_length * tear_threshold_factor`.
    pub tear_threshold_factor: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            gravity_enabled: true,
            air_damping: 0.01,
            ground_y: -10.0,
            ground_restitution: 0.3,
            time_step: 1.0 / 60.0,
            substeps: 5,
            constraint_iterations: 10,
            constraint_relaxation: 1.0,
            collision_enabled: true,
            self_collision_enabled: false,
            collision_margin: 0.01,
            method: IntegrationMethod::Verlet,
            tear_threshold_factor: 2.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.gravity, Vec3::new(0.0, -9.8, 0.0));
        assert_eq!(cfg.substeps, 5);
        assert_eq!(cfg.constraint_iterations, 10);
        assert!((cfg.time_step - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(cfg.method, IntegrationMethod::Verlet);
    }
}
