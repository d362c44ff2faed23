use super::basis::SHBasis;
use crate::error::{Error, Result};
use crate::math::Vec3;
use rand::Rng;
use std::f64::consts::{PI, TAU};

pub const DEFAULT_VOLUME_THETA_STEPS: usize = 100;
pub const DEFAULT_VOLUME_PHI_STEPS: usize = 200;
pub const DEFAULT_SAMPLE_THETA_STEPS: usize = 20;
pub const DEFAULT_SAMPLE_PHI_STEPS: usize = 40;
const DEFAULT_CROSS_SECTION_SAMPLES: usize = 360;
const GRADIENT_EPSILON: f64 = 1e-5;

/// Result of `project_to_surface`.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceProjection {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f64,
    /// Negative iff the query point is inside the body.
    pub penetration: f64,
    pub theta: f64,
    pub phi: f64,
}

/// One polygon of the planar cross-section of an SH body.
pub struct CrossSection {
    pub points: Vec<Vec3>,
    pub perimeter: f64,
    pub area: f64,
}

/// A triangulated discretization of the SH surface.
pub struct SurfaceMesh {
    pub points: Vec<Vec3>,
    pub triangles: Vec<(u32, u32, u32)>,
    pub edges: Vec<(u32, u32)>,
    pub normals: Option<Vec<Vec3>>,
}

/// Volume, area, cross-section, signed distance, and projection queries
/// over a star-shaped body whose boundary is `r(theta, phi)` in spherical
/// coordinates about `center` (§4.2). `theta` is the polar angle from the
/// +y axis, `phi` the azimuth around it, matching the rest of this crate's
/// y-up convention.
pub struct SHGeometry {
    basis: SHBasis,
    coeffs: Vec<f64>,
    center: Vec3,
}

impl SHGeometry {
    pub fn new(max_order: usize, coeffs: Vec<f64>, center: Vec3) -> Result<Self> {
        let basis = SHBasis::new(max_order);
        basis.evaluate(PI / 2.0, 0.0, &coeffs)?; // validates coeffs length/emptiness
        Ok(Self {
            basis,
            coeffs,
            center,
        })
    }

    pub fn basis(&self) -> &SHBasis {
        &self.basis
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// `r(theta, phi)`.
    pub fn radius_at(&self, theta: f64, phi: f64) -> f64 {
        self.basis.evaluate(theta, phi, &self.coeffs).expect("coeffs validated at construction")
    }

    /// `(dr/dtheta, dr/dphi)` at `(theta, phi)`.
    pub fn gradient_at(&self, theta: f64, phi: f64) -> (f64, f64) {
        self.basis
            .gradient(theta, phi, &self.coeffs)
            .expect("coeffs validated at construction")
    }

    fn cartesian_at(&self, theta: f64, phi: f64) -> Vec3 {
        let r = self.radius_at(theta, phi);
        self.center + spherical_to_cartesian(r, theta, phi)
    }

    /// `∂r⃗/∂theta`, `∂r⃗/∂phi` via central differences with step
    /// `GRADIENT_EPSILON`, clipped at the poles.
    fn surface_partials(&self, theta: f64, phi: f64) -> (Vec3, Vec3) {
        let eps = GRADIENT_EPSILON;
        let theta_lo = (theta - eps).max(eps);
        let theta_hi = (theta + eps).min(PI - eps);
        let d_theta = theta_hi - theta_lo;
        let dr_dtheta = if d_theta > 0.0 {
            (self.cartesian_at(theta_hi, phi) - self.cartesian_at(theta_lo, phi)) / d_theta
        } else {
            Vec3::ZERO
        };

        let dr_dphi =
            (self.cartesian_at(theta, phi + eps) - self.cartesian_at(theta, phi - eps)) / (2.0 * eps);

        (dr_dtheta, dr_dphi)
    }

    /// `Σ (r³/3) sin(theta) Δθ Δφ` over a midpoint grid.
    pub fn volume(&self) -> f64 {
        self.volume_with_resolution(DEFAULT_VOLUME_THETA_STEPS, DEFAULT_VOLUME_PHI_STEPS)
    }

    pub fn volume_with_resolution(&self, theta_steps: usize, phi_steps: usize) -> f64 {
        let d_theta = PI / theta_steps as f64;
        let d_phi = TAU / phi_steps as f64;
        let mut sum = 0.0;
        for it in 0..theta_steps {
            let theta = (it as f64 + 0.5) * d_theta;
            let sin_t = theta.sin();
            for ip in 0..phi_steps {
                let phi = (ip as f64 + 0.5) * d_phi;
                let r = self.radius_at(theta, phi);
                sum += (r * r * r / 3.0) * sin_t;
            }
        }
        sum * d_theta * d_phi
    }

    /// `Σ ‖∂r⃗/∂θ × ∂r⃗/∂φ‖ Δθ Δφ`, falling back to `r² |sinθ| ΔθΔφ` when a
    /// sample lands too close to a pole for the cross product to be
    /// reliable.
    pub fn surface_area(&self) -> f64 {
        self.surface_area_with_resolution(DEFAULT_VOLUME_THETA_STEPS, DEFAULT_VOLUME_PHI_STEPS)
    }

    pub fn surface_area_with_resolution(&self, theta_steps: usize, phi_steps: usize) -> f64 {
        let d_theta = PI / theta_steps as f64;
        let d_phi = TAU / phi_steps as f64;
        let mut sum = 0.0;
        for it in 0..theta_steps {
            let theta = (it as f64 + 0.5) * d_theta;
            let sin_t = theta.sin();
            for ip in 0..phi_steps {
                let phi = (ip as f64 + 0.5) * d_phi;
                if sin_t.abs() < 1e-6 {
                    let r = self.radius_at(theta, phi);
                    sum += r * r * sin_t.abs();
                } else {
                    let (dr_dtheta, dr_dphi) = self.surface_partials(theta, phi);
                    sum += dr_dtheta.cross(dr_dphi).length();
                }
            }
        }
        sum * d_theta * d_phi
    }

    /// 500 random `(theta, phi)` draws plus the two poles and 8 equatorial
    /// points, scaled by `1.5`.
    pub fn bounding_radius(&self) -> f64 {
        let mut max_r: f64 = self.radius_at(1e-9, 0.0).max(self.radius_at(PI - 1e-9, 0.0));
        for k in 0..8 {
            let phi = TAU * k as f64 / 8.0;
            max_r = max_r.max(self.radius_at(PI / 2.0, phi));
        }
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let u: f64 = rng.gen_range(0.0..1.0);
            let theta = (2.0 * u - 1.0).acos();
            let phi = rng.gen_range(0.0..TAU);
            max_r = max_r.max(self.radius_at(theta, phi));
        }
        max_r * 1.5
    }

    fn value_at_ray(&self, origin: Vec3, dir: Vec3, t: f64) -> f64 {
        let point = origin + dir * t;
        let rel = point - self.center;
        let (r_cart, theta, phi) = cartesian_to_spherical(rel);
        r_cart - self.radius_at(theta, phi)
    }

    /// Intersect the SH surface with `plane {normal n, point p}`, per
    /// §4.2. Returns the polygon of intersection points, its perimeter,
    /// and the fan-triangulated area about the centroid.
    pub fn cross_section(&self, normal: Vec3, point: Vec3) -> CrossSection {
        self.cross_section_with_samples(normal, point, DEFAULT_CROSS_SECTION_SAMPLES)
    }

    pub fn cross_section_with_samples(&self, normal: Vec3, point: Vec3, num_samples: usize) -> CrossSection {
        let n = normal.normalize_or_zero();
        let u_seed = if n.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
        let u = u_seed.cross(n).normalize_or_zero();
        let v = n.cross(u);

        let max_radius = self.bounding_radius();
        let mut points = Vec::with_capacity(num_samples);

        for s in 0..num_samples {
            let alpha = TAU * s as f64 / num_samples as f64;
            let dir = (u * alpha.cos() + v * alpha.sin()).normalize_or_zero();
            if let Some(hit) = self.march_to_surface(point, dir, max_radius) {
                points.push(hit);
            }
        }

        let perimeter = if points.len() >= 2 {
            let mut total = 0.0;
            for w in points.windows(2) {
                total += (w[1] - w[0]).length();
            }
            total += (points[0] - points[points.len() - 1]).length();
            total
        } else {
            0.0
        };

        let area = if points.len() >= 3 {
            let centroid = points.iter().fold(Vec3::ZERO, |acc, p| acc + *p) / points.len() as f64;
            let mut total = 0.0;
            for i in 0..points.len() {
                let a = points[i] - centroid;
                let b = points[(i + 1) % points.len()] - centroid;
                total += a.cross(b).length() * 0.5;
            }
            total
        } else {
            0.0
        };

        CrossSection {
            points,
            perimeter,
            area,
        }
    }

    /// March `t` from 0 to `2 * max_radius` over 200 steps looking for a
    /// sign change in `f(t) = ‖ray(t) - center‖ - r(theta(t), phi(t))`,
    /// then bisect (≤50 iterations, tolerance `1e-6`) to the surface point.
    fn march_to_surface(&self, origin: Vec3, dir: Vec3, max_radius: f64) -> Option<Vec3> {
        const STEPS: usize = 200;
        let t_max = 2.0 * max_radius;
        let dt = t_max / STEPS as f64;

        let mut t_prev = 0.0;
        let mut f_prev = self.value_at_ray(origin, dir, 0.0);
        for step in 1..=STEPS {
            let t_cur = step as f64 * dt;
            let f_cur = self.value_at_ray(origin, dir, t_cur);
            if f_prev.signum() != f_cur.signum() {
                let mut lo = t_prev;
                let mut hi = t_cur;
                let mut f_lo = f_prev;
                for _ in 0..50 {
                    let mid = 0.5 * (lo + hi);
                    let f_mid = self.value_at_ray(origin, dir, mid);
                    if (hi - lo) < 1e-6 {
                        return Some(origin + dir * mid);
                    }
                    if f_lo.signum() == f_mid.signum() {
                        lo = mid;
                        f_lo = f_mid;
                    } else {
                        hi = mid;
                    }
                }
                return Some(origin + dir * (0.5 * (lo + hi)));
            }
            t_prev = t_cur;
            f_prev = f_cur;
        }
        None
    }

    /// `r_cart - r(theta, phi)` for `p`'s spherical coordinates relative to
    /// `center`. An approximation valid for star-shaped bodies.
    pub fn signed_distance(&self, p: Vec3) -> f64 {
        let rel = p - self.center;
        let (r_cart, theta, phi) = cartesian_to_spherical(rel);
        if r_cart < 1e-10 {
            return -self.radius_at(0.0, 0.0);
        }
        r_cart - self.radius_at(theta, phi)
    }

    /// Outward unit normal at `(theta, phi)`. Falls back to the radial
    /// direction at the poles or when the cross product degenerates.
    pub fn compute_surface_normal(&self, theta: f64, phi: f64) -> Vec3 {
        let radial = spherical_direction(theta, phi);
        if theta.sin().abs() < 1e-6 {
            return radial;
        }
        let (dr_dtheta, dr_dphi) = self.surface_partials(theta, phi);
        // dr_dtheta x dr_dphi points inward under this crate's y-up
        // parametrization (theta from +y swaps the y/z roles relative to
        // the standard theta-from-+z convention, flipping handedness).
        let n = dr_dphi.cross(dr_dtheta);
        let len = n.length();
        if len < 1e-10 {
            radial
        } else {
            n / len
        }
    }

    /// Gradient descent in `(theta, phi)` minimizing `‖p - r⃗(theta,
    /// phi)‖²`, starting from the radial projection of `p`, step
    /// `0.1/(1+0.2*iter)`, ≤20 iterations, tolerance `1e-6`. Tracks and
    /// returns the best-so-far candidate if it never converges.
    pub fn project_to_surface(&self, p: Vec3) -> SurfaceProjection {
        let rel = p - self.center;
        let (r_cart, mut theta, mut phi) = cartesian_to_spherical(rel);

        if theta.sin().abs() < 1e-6 {
            let point = self.cartesian_at(theta, phi);
            let normal = self.compute_surface_normal(theta, phi);
            let distance = (p - point).length();
            let penetration = if r_cart < self.radius_at(theta, phi) {
                -distance
            } else {
                distance
            };
            return SurfaceProjection {
                point,
                normal,
                distance,
                penetration,
                theta,
                phi,
            };
        }

        let eps = 1e-9;
        theta = theta.clamp(eps, PI - eps);
        phi = wrap_phi(phi);

        let mut best_point = self.cartesian_at(theta, phi);
        let mut best_dist_sq = (p - best_point).length_squared();
        let mut best_theta = theta;
        let mut best_phi = phi;

        for iter in 0..20 {
            let point = self.cartesian_at(theta, phi);
            let diff = point - p;
            let dist_sq = diff.length_squared();
            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                best_point = point;
                best_theta = theta;
                best_phi = phi;
            }
            if dist_sq.sqrt() < 1e-6 {
                break;
            }

            let (dr_dtheta, dr_dphi) = self.surface_partials(theta, phi);
            let grad_theta = 2.0 * diff.dot(dr_dtheta);
            let grad_phi = 2.0 * diff.dot(dr_dphi);

            let step = 0.1 / (1.0 + 0.2 * iter as f64);
            theta = (theta - step * grad_theta).clamp(eps, PI - eps);
            phi = wrap_phi(phi - step * grad_phi);
        }

        let point = best_point;
        let normal = self.compute_surface_normal(best_theta, best_phi);
        let distance = best_dist_sq.sqrt();
        let penetration = if r_cart < self.radius_at(best_theta, best_phi) {
            -distance
        } else {
            distance
        };

        SurfaceProjection {
            point,
            normal,
            distance,
            penetration,
            theta: best_theta,
            phi: best_phi,
        }
    }

    /// A `(theta_steps+1) x phi_steps` quad grid (phi closed, theta's open
    /// endpoint included), triangulated `(i,j)-(i,j+1)-(i+1,j+1)-(i+1,j)`
    /// per quad; edges emit only the "north" and "west" sides of each quad
    /// to avoid duplication.
    pub fn sample_surface(&self, theta_steps: usize, phi_steps: usize, with_normals: bool) -> SurfaceMesh {
        let rows = theta_steps + 1;
        let mut points = Vec::with_capacity(rows * phi_steps);
        let mut normals = if with_normals {
            Some(Vec::with_capacity(rows * phi_steps))
        } else {
            None
        };

        for i in 0..rows {
            let theta = PI * i as f64 / theta_steps as f64;
            for j in 0..phi_steps {
                let phi = TAU * j as f64 / phi_steps as f64;
                points.push(self.cartesian_at(theta, phi));
                if let Some(ns) = normals.as_mut() {
                    ns.push(self.compute_surface_normal(theta, phi));
                }
            }
        }

        let vert = |i: usize, j: usize| -> u32 { (i * phi_steps + j % phi_steps) as u32 };

        let mut triangles = Vec::new();
        let mut edges = Vec::new();
        for i in 0..theta_steps {
            for j in 0..phi_steps {
                let v00 = vert(i, j);
                let v01 = vert(i, j + 1);
                let v11 = vert(i + 1, j + 1);
                let v10 = vert(i + 1, j);
                triangles.push((v00, v01, v11));
                triangles.push((v00, v11, v10));
                edges.push((v00, v01)); // north
                edges.push((v00, v10)); // west
            }
        }

        SurfaceMesh {
            points,
            triangles,
            edges,
            normals,
        }
    }
}

fn spherical_direction(theta: f64, phi: f64) -> Vec3 {
    Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
}

fn spherical_to_cartesian(r: f64, theta: f64, phi: f64) -> Vec3 {
    spherical_direction(theta, phi) * r
}

/// `(r, theta, phi)` for a Cartesian vector relative to the body's center,
/// using the y-up convention: `theta` from `+y`, `phi` azimuth around `y`
/// in `[0, 2*pi)`.
fn cartesian_to_spherical(v: Vec3) -> (f64, f64, f64) {
    let r = v.length();
    if r < 1e-12 {
        return (0.0, 0.0, 0.0);
    }
    let theta = (v.y / r).clamp(-1.0, 1.0).acos();
    let mut phi = v.z.atan2(v.x);
    if phi < 0.0 {
        phi += TAU;
    }
    (r, theta, phi)
}

fn wrap_phi(phi: f64) -> f64 {
    let mut p = phi % TAU;
    if p < 0.0 {
        p += TAU;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_sphere(max_order: usize) -> SHGeometry {
        let mut coeffs = vec![0.0; (max_order + 1) * (max_order + 1)];
        coeffs[0] = 2.0 * PI.sqrt();
        SHGeometry::new(max_order, coeffs, Vec3::ZERO).unwrap()
    }

    #[test]
    fn evaluate_is_one_for_unit_sphere() {
        let g = unit_sphere(2);
        for &theta in &[0.1, PI / 2.0, 2.5] {
            for &phi in &[0.0, 1.0, 4.0] {
                assert!((g.radius_at(theta, phi) - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn unit_sphere_volume_and_area() {
        let g = unit_sphere(2);
        let vol = g.volume();
        let expected_vol = 4.0 / 3.0 * PI;
        assert!((vol - expected_vol).abs() / expected_vol < 0.01);

        let area = g.surface_area();
        let expected_area = 4.0 * PI;
        assert!((area - expected_area).abs() / expected_area < 0.02);
    }

    #[test]
    fn unit_sphere_signed_distance() {
        let g = unit_sphere(2);
        let d = g.signed_distance(Vec3::new(2.0, 0.0, 0.0));
        assert!((d - 1.0).abs() < 1e-6);
        let inside = g.signed_distance(Vec3::new(0.5, 0.0, 0.0));
        assert!((inside - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn unit_sphere_projection_outside() {
        let g = unit_sphere(2);
        let proj = g.project_to_surface(Vec3::new(2.0, 0.0, 0.0));
        assert!((proj.point - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-3);
        assert!((proj.normal - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-2);
        assert!((proj.distance - 1.0).abs() < 1e-3);
        assert!((proj.penetration - 1.0).abs() < 1e-3);
    }

    #[test]
    fn unit_sphere_projection_inside() {
        let g = unit_sphere(2);
        let proj = g.project_to_surface(Vec3::new(0.5, 0.0, 0.0));
        assert!((proj.penetration - (-0.5)).abs() < 1e-2);
    }

    #[test]
    fn normal_unitarity_or_fallback() {
        let g = unit_sphere(3);
        for &theta in &[1e-9, 0.3, PI / 2.0, PI - 1e-9] {
            for &phi in &[0.0, 1.5, 4.0] {
                let n = g.compute_surface_normal(theta, phi);
                let len = n.length();
                let is_unit = (len - 1.0).abs() < 1e-6;
                let is_fallback = (n - Vec3::Y).length() < 1e-9;
                assert!(is_unit || is_fallback, "theta={theta} phi={phi} n={n:?}");
            }
        }
    }

    #[test]
    fn cross_section_through_equator_is_a_circle() {
        let g = unit_sphere(2);
        let cs = g.cross_section_with_samples(Vec3::Y, Vec3::ZERO, 72);
        assert!(cs.points.len() > 60);
        assert!((cs.perimeter - TAU).abs() / TAU < 0.02);
        assert!((cs.area - PI).abs() / PI < 0.02);
    }

    #[test]
    fn sample_surface_produces_closed_quads() {
        let g = unit_sphere(2);
        let mesh = g.sample_surface(DEFAULT_SAMPLE_THETA_STEPS, DEFAULT_SAMPLE_PHI_STEPS, true);
        assert_eq!(
            mesh.points.len(),
            (DEFAULT_SAMPLE_THETA_STEPS + 1) * DEFAULT_SAMPLE_PHI_STEPS
        );
        assert_eq!(
            mesh.triangles.len(),
            DEFAULT_SAMPLE_THETA_STEPS * DEFAULT_SAMPLE_PHI_STEPS * 2
        );
        assert!(mesh.normals.is_some());
        for p in &mesh.points {
            assert!((p.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_coefficients_rejected_at_construction() {
        let err = SHGeometry::new(2, vec![], Vec3::ZERO).unwrap_err();
        assert_eq!(err, Error::EmptyCoefficients);
    }
}
