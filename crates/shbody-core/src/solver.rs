use crate::bridge::PhysicsView;
use crate::config::{IntegrationMethod, SolverConfig};
use crate::constraint::{Constraint, EdgeTag, ShapeMatchingStrength};
use crate::math::{clamp01, Mat3, Vec3};
use crate::particle::Particle;

/// The PBD/XPBD time stepper (§4.6). Single-threaded and synchronous within
/// a `step`; holds no reference to any object and mutates only through the
/// `PhysicsView`s it is handed (§5).
pub struct Solver {
    pub config: SolverConfig,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Splits `dt` into `substeps` equal slices and runs `_substep` on each
    /// view that many times. Returns the mean velocity each view published
    /// on its last substep's commit, parallel to `views` (§4.6, §6
    /// "Solver → Object").
    pub fn step(&self, views: &mut [PhysicsView], dt: f64) -> Vec<Vec3> {
        let sub_dt = dt / self.config.substeps as f64;
        let mut mean_velocities = vec![Vec3::ZERO; views.len()];
        for _ in 0..self.config.substeps {
            for (view, mean_velocity) in views.iter_mut().zip(mean_velocities.iter_mut()) {
                *mean_velocity = self.substep(view, sub_dt);
            }
        }
        mean_velocities
    }

    fn substep(&self, view: &mut PhysicsView, sub_dt: f64) -> Vec3 {
        self.apply_forces(view, sub_dt);
        self.integrate(view, sub_dt);
        self.reset_lambdas(view);

        let old_positions: Vec<Vec3> = view.particles.iter().map(|p| p.position).collect();
        for _ in 0..self.config.constraint_iterations {
            self.project_constraints(view, sub_dt);
        }
        self.update_velocities(view, &old_positions, sub_dt);

        if self.config.collision_enabled {
            self.apply_ground_collision(view);
            if self.config.self_collision_enabled && is_cloth_like(view) {
                self.apply_self_collision(view);
            }
        }
        self.tear_constraints(view);

        view.commit()
    }

    /// Step 2: reset `force`, add gravity, apply every Spring, subtract air
    /// drag -- all skipping fixed particles.
    fn apply_forces(&self, view: &mut PhysicsView, _sub_dt: f64) {
        for p in view.particles.iter_mut() {
            p.force = Vec3::ZERO;
            if !p.fixed && self.config.gravity_enabled {
                p.force += self.config.gravity * p.mass;
            }
        }

        for c in view.constraints.iter() {
            if let Constraint::Spring {
                i,
                j,
                rest_length,
                stiffness,
                damping,
                ..
            } = c
            {
                apply_spring_force(view.particles, *i, *j, *rest_length, *stiffness, *damping);
            }
        }

        for p in view.particles.iter_mut() {
            if !p.fixed {
                p.force -= p.velocity * self.config.air_damping;
            }
        }
    }

    /// Step 3: Verlet (position only) or Euler (velocity then position);
    /// `Rk4` falls back to Euler (§4.6).
    fn integrate(&self, view: &mut PhysicsView, dt: f64) {
        match self.config.method {
            IntegrationMethod::Verlet => {
                for p in view.particles.iter_mut() {
                    if p.fixed {
                        continue;
                    }
                    let acceleration = p.force * p.inv_mass;
                    let new_position = p.position * 2.0 - p.prev_position + acceleration * dt * dt;
                    p.prev_position = p.position;
                    p.position = new_position;
                }
            }
            IntegrationMethod::Euler | IntegrationMethod::Rk4 => {
                for p in view.particles.iter_mut() {
                    if p.fixed {
                        continue;
                    }
                    let acceleration = p.force * p.inv_mass;
                    p.velocity += acceleration * dt;
                    p.prev_position = p.position;
                    p.position += p.velocity * dt;
                }
            }
        }
    }

    /// Step 4: PBD-compatible XPBD -- every Distance constraint with
    /// `compliance > 0` starts the substep at `lambda = 0`.
    fn reset_lambdas(&self, view: &mut PhysicsView) {
        for c in view.constraints.iter_mut() {
            if let Constraint::Distance { compliance, lambda, .. } = c {
                if *compliance > 0.0 {
                    *lambda = 0.0;
                }
            }
        }
    }

    /// Step 6: Gauss-Seidel -- constraint `i` sees the positional updates
    /// constraints `0..i-1` made in this same pass (§5).
    fn project_constraints(&self, view: &mut PhysicsView, sub_dt: f64) {
        for c in view.constraints.iter_mut() {
            match c {
                Constraint::Distance {
                    i,
                    j,
                    rest_length,
                    compliance,
                    lambda,
                    ..
                } => solve_distance(
                    view.particles,
                    *i,
                    *j,
                    *rest_length,
                    *compliance,
                    lambda,
                    sub_dt,
                    self.config.constraint_relaxation,
                ),
                Constraint::Bending {
                    a,
                    b,
                    c: corner_c,
                    d: corner_d,
                    rest_angle,
                    compliance,
                    lambda,
                } => solve_bending(view.particles, *a, *b, *corner_c, *corner_d, *rest_angle, *compliance, lambda),
                Constraint::LineBending {
                    i,
                    j,
                    k,
                    rest_angle,
                    compliance,
                    lambda,
                } => solve_line_bending(view.particles, *i, *j, *k, *rest_angle, *compliance, lambda),
                Constraint::ShapeMatching {
                    indices,
                    rest_offsets,
                    strength,
                } => solve_shape_matching(view.particles, indices, rest_offsets, *strength),
                Constraint::Spring { .. } => {}
            }
        }
    }

    /// Step 7: the sole place velocity is set after integration.
    fn update_velocities(&self, view: &mut PhysicsView, old_positions: &[Vec3], sub_dt: f64) {
        for (p, old_position) in view.particles.iter_mut().zip(old_positions.iter()) {
            if p.fixed {
                continue;
            }
            p.velocity = (p.position - *old_position) / sub_dt;
        }
    }

    fn apply_ground_collision(&self, view: &mut PhysicsView) {
        for p in view.particles.iter_mut() {
            if p.fixed {
                continue;
            }
            if p.position.y < self.config.ground_y {
                p.position.y = self.config.ground_y;
                p.velocity.y = -p.velocity.y * self.config.ground_restitution;
                p.velocity.x *= 0.95;
                p.velocity.z *= 0.95;
            }
        }
    }

    /// Brute-force O(n^2) self-collision; acceptable only for small cloths
    /// (§9 design notes).
    fn apply_self_collision(&self, view: &mut PhysicsView) {
        let min_dist = 2.0 * self.config.collision_margin;
        let n = view.particles.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if view.particles[i].fixed && view.particles[j].fixed {
                    continue;
                }
                let delta = view.particles[j].position - view.particles[i].position;
                let dist = delta.length();
                if dist < 1e-10 || dist >= min_dist {
                    continue;
                }
                let n_dir = delta / dist;
                let push = (min_dist - dist) * 0.5;
                if !view.particles[i].fixed {
                    view.particles[i].position -= n_dir * push;
                }
                if !view.particles[j].fixed {
                    view.particles[j].position += n_dir * push;
                }
            }
        }
    }

    /// Step 9: Structural/Shear Distance constraints that have stretched
    /// past `rest_length * tear_threshold_factor` are removed, back to
    /// front so in-place removal is safe. One-way: once torn, a constraint
    /// never reappears (§4.6 state machine).
    fn tear_constraints(&self, view: &mut PhysicsView) {
        let factor = self.config.tear_threshold_factor;
        let mut idx = view.constraints.len();
        while idx > 0 {
            idx -= 1;
            let should_tear = match &view.constraints[idx] {
                Constraint::Distance {
                    i,
                    j,
                    rest_length,
                    edge_tag,
                    ..
                } if matches!(edge_tag, EdgeTag::Structural | EdgeTag::Shear) => {
                    let current_length = (view.particles[*j as usize].position - view.particles[*i as usize].position).length();
                    current_length > rest_length * factor
                }
                _ => false,
            };
            if should_tear {
                view.constraints.remove(idx);
            }
        }
    }
}

fn is_cloth_like(view: &PhysicsView) -> bool {
    let particle_count = view.particles.len();
    let distance_count = view
        .constraints
        .iter()
        .filter(|c| matches!(c, Constraint::Distance { .. }))
        .count();
    particle_count > 50 && distance_count > 100
}

/// `F = k(L - L0)` along the axis, plus damping `c * (v_rel . n̂)` along
/// the same axis. Skips a near-zero-length edge or an out-of-range
/// endpoint; applies symmetric forces, each endpoint individually skipped
/// if fixed (§4.6 "Spring force").
fn apply_spring_force(particles: &mut [Particle], i: u32, j: u32, rest_length: f64, stiffness: f64, damping: f64) {
    let (i, j) = (i as usize, j as usize);
    if i >= particles.len() || j >= particles.len() || i == j {
        return;
    }
    let delta = particles[j].position - particles[i].position;
    let current_length = delta.length();
    if current_length < 1e-6 {
        return;
    }
    let axis = delta / current_length;
    let spring_force = stiffness * (current_length - rest_length);
    let relative_velocity = particles[j].velocity - particles[i].velocity;
    let damping_force = damping * relative_velocity.dot(axis);
    let total = axis * (spring_force + damping_force);
    if !particles[i].fixed {
        particles[i].force += total;
    }
    if !particles[j].fixed {
        particles[j].force -= total;
    }
}

/// XPBD projection: `alpha = compliance / dt^2`, `denom = w_i + w_j +
/// alpha`, `delta_lambda = -C / denom`; relaxation only applies to pure
/// PBD constraints (`compliance == 0`), never to XPBD ones (§4.6
/// "Distance constraint").
fn solve_distance(
    particles: &mut [Particle],
    i: u32,
    j: u32,
    rest_length: f64,
    compliance: f64,
    lambda: &mut f64,
    sub_dt: f64,
    relaxation: f64,
) {
    let (i, j) = (i as usize, j as usize);
    let delta = particles[j].position - particles[i].position;
    let current_length = delta.length();
    if current_length < 1e-6 {
        return;
    }
    let c_val = current_length - rest_length;
    let alpha = if compliance > 0.0 { compliance / (sub_dt * sub_dt) } else { 0.0 };
    let w_sum = particles[i].inv_mass + particles[j].inv_mass;
    let denom = w_sum + alpha;
    if denom < 1e-10 {
        return;
    }
    let delta_lambda = -c_val / denom;
    *lambda += delta_lambda;
    let axis = delta / current_length;
    let relax = if compliance == 0.0 { relaxation } else { 1.0 };
    particles[i].position -= axis * (delta_lambda * particles[i].inv_mass * relax);
    particles[j].position += axis * (delta_lambda * particles[j].inv_mass * relax);
}

/// Axis-of-shared-edge approximation, not the gradient-exact
/// Bridson/Müller formulation (§9 "Bending simplification"). Moves `c`
/// along `n1` and `d` along `-n2`, split by inverse mass.
fn solve_bending(particles: &mut [Particle], a: u32, b: u32, c: u32, d: u32, rest_angle: f64, compliance: f64, lambda: &mut f64) {
    let (ai, bi, ci, di) = (a as usize, b as usize, c as usize, d as usize);
    let (pa, pb, pc, pd) = (particles[ai].position, particles[bi].position, particles[ci].position, particles[di].position);
    let ab = pb - pa;
    let n1_raw = ab.cross(pc - pa);
    let n2_raw = ab.cross(pd - pa);
    let (len1, len2) = (n1_raw.length(), n2_raw.length());
    if len1 < 1e-10 || len2 < 1e-10 {
        return;
    }
    let n1 = n1_raw / len1;
    let n2 = n2_raw / len2;
    let current_angle = n1.dot(n2).clamp(-1.0, 1.0).acos();
    let c_val = current_angle - rest_angle;
    let correction = -c_val * compliance * 0.1;
    if correction.abs() < 1e-6 {
        return;
    }
    let w_c = particles[ci].inv_mass;
    let w_d = particles[di].inv_mass;
    let w_sum = w_c + w_d;
    if w_sum < 1e-10 {
        return;
    }
    particles[ci].position += n1 * (correction * w_c / w_sum);
    particles[di].position -= n2 * (correction * w_d / w_sum);
    *lambda += correction;
}

/// Three-point angle constraint; correction axis is `v1 x v2` normalized,
/// applied mostly to the middle particle with opposite half-corrections on
/// the endpoints (§4.6 "LineBending").
fn solve_line_bending(particles: &mut [Particle], i: u32, j: u32, k: u32, rest_angle: f64, compliance: f64, lambda: &mut f64) {
    let (ii, ji, ki) = (i as usize, j as usize, k as usize);
    let (pi, pj, pk) = (particles[ii].position, particles[ji].position, particles[ki].position);
    let v1 = pj - pi;
    let v2 = pk - pj;
    let (l1, l2) = (v1.length(), v2.length());
    if l1 < 1e-6 || l2 < 1e-6 {
        return;
    }
    let current_angle = (v1.dot(v2) / (l1 * l2)).clamp(-1.0, 1.0).acos();
    let c_val = current_angle - rest_angle;
    let axis_raw = v1.cross(v2);
    let axis_len = axis_raw.length();
    if axis_len < 1e-10 {
        return;
    }
    let axis = axis_raw / axis_len;
    let w_sum = particles[ii].inv_mass + particles[ji].inv_mass + particles[ki].inv_mass;
    if w_sum < 1e-10 {
        return;
    }
    let mid_magnitude = -c_val * compliance * 0.5 * (particles[ji].inv_mass / w_sum);
    let mid_delta = axis * mid_magnitude;
    particles[ji].position += mid_delta;
    particles[ii].position -= mid_delta * 0.5;
    particles[ki].position -= mid_delta * 0.5;
    *lambda += mid_magnitude;
}

/// Cluster-wise rigid restoration via mass-weighted cross-covariance and
/// iterative polar decomposition, grounded on the same algorithm as the
/// rigid-body shape matching used elsewhere in this codebase: `A_pq`
/// accumulates `mass * (q) * restᵀ`, `R` is extracted by 10 iterations of
/// `R_{k+1} = 0.5(R_k + R_k^{-T})`.
fn solve_shape_matching(particles: &mut [Particle], indices: &[u32], rest_offsets: &[Vec3], strength: ShapeMatchingStrength) {
    if indices.is_empty() {
        return;
    }

    let mut com = Vec3::ZERO;
    let mut total_mass = 0.0;
    for &idx in indices {
        let p = &particles[idx as usize];
        if p.inv_mass == 0.0 {
            continue;
        }
        com += p.position * p.mass;
        total_mass += p.mass;
    }
    if total_mass < 1e-10 {
        return;
    }
    com /= total_mass;

    let mut a_pq = Mat3::ZERO;
    for (k, &idx) in indices.iter().enumerate() {
        let p = &particles[idx as usize];
        if p.inv_mass == 0.0 {
            continue;
        }
        let q = (p.position - com) * p.mass;
        a_pq += mat3_outer(q, rest_offsets[k]);
    }
    let a_pq = a_pq + Mat3::IDENTITY * 1e-6;
    let r = polar_decomposition_iterative(a_pq);

    let blend = match strength {
        ShapeMatchingStrength::Stiffness(s) => clamp01(s),
        ShapeMatchingStrength::Compliance(c) => {
            if c > 0.0 {
                clamp01(1.0 / (1.0 + c))
            } else {
                1.0
            }
        }
    };

    for (k, &idx) in indices.iter().enumerate() {
        let p = &mut particles[idx as usize];
        if p.inv_mass == 0.0 {
            continue;
        }
        let goal = r * rest_offsets[k] + com;
        p.position += (goal - p.position) * blend;
    }
}

fn mat3_outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// 10 iterations of `R_{k+1} = 0.5(R_k + R_k^{-T})`; returns identity on a
/// singular matrix.
fn polar_decomposition_iterative(a: Mat3) -> Mat3 {
    let mut r = a;
    for _ in 0..10 {
        let det = r.determinant();
        if det.abs() < 1e-10 {
            return Mat3::IDENTITY;
        }
        let r_inv_t = r.inverse().transpose();
        r = (r + r_inv_t) * 0.5;
    }
    r
}
