use crate::error::{Error, Result};
use std::cell::RefCell;

/// `idx(l, m) = l(l+1)/2 + m` for `0 <= m <= l <= max_order`.
#[inline]
fn idx(l: usize, m: usize) -> usize {
    l * (l + 1) / 2 + m
}

/// `k = l^2 + l + m` for coefficients laid out `(l` ascending, `m` from
/// `-l` to `+l)`.
#[inline]
fn coeff_index(l: i64, m: i64) -> usize {
    (l * l + l + m) as usize
}

/// Real spherical harmonic evaluator, precomputed for a fixed `max_order`.
///
/// Stateless after construction except for a reusable associated-Legendre
/// scratch buffer (`legendre_scratch`), sized once so that `evaluate` and
/// `gradient` never allocate in their hot path.
pub struct SHBasis {
    max_order: usize,
    log_factorials: Vec<f64>,
    schmidt_factors: Vec<f64>,
    legendre_scratch: RefCell<Vec<f64>>,
}

impl SHBasis {
    /// Precompute `log_factorials`, Schmidt semi-normalization factors, and
    /// the associated-Legendre scratch buffer for `max_order = l`.
    pub fn new(max_order: usize) -> Self {
        let l = max_order;

        let mut log_factorials = vec![0.0_f64; 2 * l + 2];
        for k in 1..log_factorials.len() {
            log_factorials[k] = log_factorials[k - 1] + (k as f64).ln();
        }

        let buf_len = (l + 1) * (l + 2) / 2;
        let mut schmidt_factors = vec![0.0_f64; buf_len];
        for ll in 0..=l {
            for mm in 0..=ll {
                schmidt_factors[idx(ll, mm)] =
                    (0.5 * (log_factorials[ll - mm] - log_factorials[ll + mm])).exp();
            }
        }

        Self {
            max_order: l,
            log_factorials,
            schmidt_factors,
            legendre_scratch: RefCell::new(vec![0.0_f64; buf_len]),
        }
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Coefficient vectors passed to `evaluate`/`gradient` must have exactly
    /// this many entries: `(max_order + 1)^2`.
    pub fn coefficient_count(&self) -> usize {
        (self.max_order + 1) * (self.max_order + 1)
    }

    fn check_coeffs(&self, coeffs: &[f64]) -> Result<()> {
        if coeffs.is_empty() {
            return Err(Error::EmptyCoefficients);
        }
        let expected = self.coefficient_count();
        if coeffs.len() != expected {
            return Err(Error::InvalidCoefficientLength {
                expected,
                actual: coeffs.len(),
            });
        }
        Ok(())
    }

    /// Fill `buf[idx(l,m)]` with `P_l^m(cos_theta)` for all `0 <= m <= l <=
    /// max_order`, using the standard three-term recurrence:
    ///
    /// `P_0^0 = 1`; `P_l^l = sin(theta) P_{l-1}^{l-1}`;
    /// `P_l^{l-1} = cos(theta)(2l-1) P_{l-1}^{l-1}`;
    /// `(l-m) P_l^m = (2l-1) cos(theta) P_{l-1}^m - (l+m-1) P_{l-2}^m`
    /// otherwise.
    fn fill_legendre(&self, cos_t: f64, sin_t: f64, buf: &mut [f64]) {
        let l_max = self.max_order;
        buf[idx(0, 0)] = 1.0;
        for l in 1..=l_max {
            buf[idx(l, l)] = sin_t * buf[idx(l - 1, l - 1)];
            buf[idx(l, l - 1)] = cos_t * (2.0 * l as f64 - 1.0) * buf[idx(l - 1, l - 1)];
        }
        for l in 2..=l_max {
            for m in 0..=(l - 2) {
                let num = (2.0 * l as f64 - 1.0) * cos_t * buf[idx(l - 1, m)]
                    - (l as f64 + m as f64 - 1.0) * buf[idx(l - 2, m)];
                buf[idx(l, m)] = num / (l as f64 - m as f64);
            }
        }
    }

    /// `dP_l^m/dtheta`, given `buf` already filled by `fill_legendre` for the
    /// same `(cos_theta, sin_theta)`.
    ///
    /// Away from the poles this is the standard identity
    /// `(1 - x^2) dP_l^m/dx = (l+m) P_{l-1}^m - l x P_l^m` for `m < l`, and
    /// the sectoral-harmonic identity `dP_l^l/dx = -l x / (1-x^2) P_l^l` for
    /// `m == l`, converted to `d/dtheta` via `dx/dtheta = -sin(theta)`.
    ///
    /// Near a pole (`|sin_theta| < 1e-8`) the `(1-x^2)` denominator
    /// vanishes; `m == 0` uses the pole-limit value `l(l+1)/2`, `m > 0`
    /// derivatives are taken to be zero there.
    fn dlegendre_dtheta(&self, l: usize, m: usize, cos_t: f64, sin_t: f64, buf: &[f64]) -> f64 {
        if sin_t.abs() < 1e-8 {
            return if m == 0 {
                0.5 * (l * (l + 1)) as f64 * cos_t.signum() * (-sin_t)
            } else {
                0.0
            };
        }
        let one_minus_x2 = 1.0 - cos_t * cos_t;
        let dp_dx = if m == l {
            -(l as f64) * cos_t / one_minus_x2 * buf[idx(l, m)]
        } else {
            ((l + m) as f64 * buf[idx(l - 1, m)] - l as f64 * cos_t * buf[idx(l, m)])
                / one_minus_x2
        };
        dp_dx * (-sin_t)
    }

    /// `r(theta, phi) = Σ coeffs[k] Y_k(theta, phi)`.
    pub fn evaluate(&self, theta: f64, phi: f64, coeffs: &[f64]) -> Result<f64> {
        self.check_coeffs(coeffs)?;
        let cos_t = theta.cos();
        let sin_t = theta.sin();
        let mut buf = self.legendre_scratch.borrow_mut();
        self.fill_legendre(cos_t, sin_t, &mut buf);

        let mut sum = 0.0_f64;
        for l in 0..=self.max_order {
            for m in -(l as i64)..=(l as i64) {
                let c = coeffs[coeff_index(l as i64, m)];
                if c == 0.0 {
                    continue;
                }
                let am = m.unsigned_abs() as usize;
                let p = buf[idx(l, am)];
                let n = self.schmidt_factors[idx(l, am)];
                let y = if m == 0 {
                    n * p
                } else if m > 0 {
                    std::f64::consts::SQRT_2 * n * p * (m as f64 * phi).cos()
                } else {
                    std::f64::consts::SQRT_2 * n * p * (am as f64 * phi).sin()
                };
                sum += c * y;
            }
        }
        Ok(sum)
    }

    /// `(dr/dtheta, dr/dphi)` at `(theta, phi)`.
    pub fn gradient(&self, theta: f64, phi: f64, coeffs: &[f64]) -> Result<(f64, f64)> {
        self.check_coeffs(coeffs)?;
        let cos_t = theta.cos();
        let sin_t = theta.sin();
        let mut buf = self.legendre_scratch.borrow_mut();
        self.fill_legendre(cos_t, sin_t, &mut buf);

        let mut dtheta = 0.0_f64;
        let mut dphi = 0.0_f64;
        for l in 0..=self.max_order {
            for m in -(l as i64)..=(l as i64) {
                let c = coeffs[coeff_index(l as i64, m)];
                if c == 0.0 {
                    continue;
                }
                let am = m.unsigned_abs() as usize;
                let p = buf[idx(l, am)];
                let n = self.schmidt_factors[idx(l, am)];
                let dp_dtheta = self.dlegendre_dtheta(l, am, cos_t, sin_t, &buf);

                let (y_theta, y_phi) = if m == 0 {
                    (n * dp_dtheta, 0.0)
                } else if m > 0 {
                    let mf = m as f64;
                    (
                        std::f64::consts::SQRT_2 * n * dp_dtheta * (mf * phi).cos(),
                        -std::f64::consts::SQRT_2 * n * p * mf * (mf * phi).sin(),
                    )
                } else {
                    let mf = am as f64;
                    (
                        std::f64::consts::SQRT_2 * n * dp_dtheta * (mf * phi).sin(),
                        std::f64::consts::SQRT_2 * n * p * mf * (mf * phi).cos(),
                    )
                };
                dtheta += c * y_theta;
                dphi += c * y_phi;
            }
        }
        Ok((dtheta, dphi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn unit_sphere_coeffs(max_order: usize) -> Vec<f64> {
        let mut c = vec![0.0; (max_order + 1) * (max_order + 1)];
        c[0] = 2.0 * PI.sqrt();
        c
    }

    #[test]
    fn unit_sphere_evaluates_to_one_everywhere() {
        let basis = SHBasis::new(2);
        let coeffs = unit_sphere_coeffs(2);
        for &theta in &[0.01, PI / 4.0, PI / 2.0, 3.0 * PI / 4.0, PI - 0.01] {
            for &phi in &[0.0, 1.0, 3.0, 5.5] {
                let r = basis.evaluate(theta, phi, &coeffs).unwrap();
                assert!((r - 1.0).abs() < 1e-9, "theta={theta} phi={phi} r={r}");
            }
        }
    }

    #[test]
    fn unit_sphere_gradient_is_zero() {
        let basis = SHBasis::new(2);
        let coeffs = unit_sphere_coeffs(2);
        let (dtheta, dphi) = basis.gradient(PI / 3.0, 1.2, &coeffs).unwrap();
        assert!(dtheta.abs() < 1e-9);
        assert!(dphi.abs() < 1e-9);
    }

    #[test]
    fn rejects_wrong_length_coefficients() {
        let basis = SHBasis::new(2);
        let err = basis.evaluate(0.5, 0.5, &[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidCoefficientLength {
                expected: 9,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_empty_coefficients() {
        let basis = SHBasis::new(2);
        assert_eq!(
            basis.evaluate(0.5, 0.5, &[]).unwrap_err(),
            Error::EmptyCoefficients
        );
    }

    #[test]
    fn evaluate_near_poles_is_finite() {
        let basis = SHBasis::new(4);
        let mut coeffs = vec![0.0; 25];
        coeffs[0] = 1.0;
        coeffs[3] = 0.5; // l=1, m=0
        coeffs[8] = 0.3; // l=2, m=0
        for &theta in &[1e-9, PI - 1e-9] {
            let r = basis.evaluate(theta, 0.3, &coeffs).unwrap();
            assert!(r.is_finite());
            let (dtheta, dphi) = basis.gradient(theta, 0.3, &coeffs).unwrap();
            assert!(dtheta.is_finite());
            assert!(dphi.is_finite());
        }
    }

    #[test]
    fn orthogonality_on_a_grid() {
        // Schmidt semi-normalized real SH are orthogonal but not unit-norm:
        // the diagonal Gram entry for order l is 4*pi/(2l+1), not 1. This
        // test checks orthogonality (off-diagonal ~ 0) and the expected
        // diagonal scale, on a 200x400-equivalent grid.
        let max_order = 2;
        let basis = SHBasis::new(max_order);
        let n_theta = 200;
        let n_phi = 400;
        let d_theta = PI / n_theta as f64;
        let d_phi = 2.0 * PI / n_phi as f64;
        let count = (max_order + 1) * (max_order + 1);

        let mut gram = vec![0.0_f64; count * count];
        for it in 0..n_theta {
            let theta = (it as f64 + 0.5) * d_theta;
            let weight = theta.sin() * d_theta * d_phi;
            for ip in 0..n_phi {
                let phi = (ip as f64 + 0.5) * d_phi;
                let mut ys = vec![0.0_f64; count];
                for k in 0..count {
                    let mut coeffs = vec![0.0; count];
                    coeffs[k] = 1.0;
                    ys[k] = basis.evaluate(theta, phi, &coeffs).unwrap();
                }
                for a in 0..count {
                    for b in a..count {
                        let v = weight * ys[a] * ys[b];
                        gram[a * count + b] += v;
                        if a != b {
                            gram[b * count + a] += v;
                        }
                    }
                }
            }
        }
        for l in 0..=max_order {
            let expected_diag = 4.0 * PI / (2 * l + 1) as f64;
            for m in -(l as i64)..=(l as i64) {
                let a = coeff_index(l as i64, m);
                assert!(
                    (gram[a * count + a] - expected_diag).abs() / expected_diag < 0.02,
                    "l={l} m={m} got={} expected={expected_diag}",
                    gram[a * count + a]
                );
            }
        }
        for a in 0..count {
            for b in 0..count {
                if a == b {
                    continue;
                }
                assert!(
                    gram[a * count + b].abs() < 0.05,
                    "a={a} b={b} got={}",
                    gram[a * count + b]
                );
            }
        }
    }
}
