//! Discrete-ordinates direction sets and their moment operators.

use crate::sweep_error::SweepError;
use crate::topology::cell::{Vec3, dot, norm};
use std::f64::consts::PI;

const UNIT_TOL: f64 = 1e-8;
const MIRROR_TOL: f64 = 1e-8;

/// One discrete direction with its quadrature weight.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Direction {
    pub omega: Vec3,
    pub weight: f64,
}

impl Direction {
    /// Octant index: bit `k` is set when component `k` is negative.
    pub fn octant(&self) -> u8 {
        (0..3).fold(0u8, |acc, k| acc | (u8::from(self.omega[k] < 0.0) << k))
    }
}

/// A fixed, validated set of directions.
///
/// Moment operators are normalised by the total weight `W`, so an isotropic
/// source `q` in an infinite medium of total cross-section `σ` gives a
/// scalar flux of `q / σ` whatever convention the weights follow.
#[derive(Clone, Debug, PartialEq)]
pub struct Quadrature {
    directions: Vec<Direction>,
    total_weight: f64,
}

impl Quadrature {
    pub fn new(directions: Vec<Direction>) -> Result<Self, SweepError> {
        if directions.is_empty() {
            return Err(SweepError::InvalidDirection("empty quadrature".into()));
        }
        for (i, d) in directions.iter().enumerate() {
            if !d.omega.iter().all(|c| c.is_finite()) || (norm(d.omega) - 1.0).abs() > UNIT_TOL {
                return Err(SweepError::InvalidDirection(format!(
                    "direction {i} is not a unit vector: {:?}",
                    d.omega
                )));
            }
            if !(d.weight > 0.0) || !d.weight.is_finite() {
                return Err(SweepError::InvalidDirection(format!(
                    "direction {i} has weight {}",
                    d.weight
                )));
            }
        }
        let total_weight = directions.iter().map(|d| d.weight).sum();
        Ok(Self {
            directions,
            total_weight,
        })
    }

    /// Gauss-Legendre directions for slab geometry: `ω = (μ, sqrt(1-μ²), 0)`.
    pub fn gauss_legendre_slab(n: usize) -> Result<Self, SweepError> {
        let (mus, ws) = gauss_legendre(n)?;
        let dirs = mus
            .into_iter()
            .zip(ws)
            .map(|(mu, w)| Direction {
                omega: [mu, (1.0 - mu * mu).max(0.0).sqrt(), 0.0],
                weight: w,
            })
            .collect();
        Self::new(dirs)
    }

    /// Product set: `n_polar` Gauss-Legendre polar cosines (in z) times
    /// `n_azimuthal` equally spaced azimuths. `n_azimuthal` must be a multiple
    /// of four so the set is closed under x- and y-reflection.
    pub fn product(n_azimuthal: usize, n_polar: usize) -> Result<Self, SweepError> {
        if n_azimuthal == 0 || n_azimuthal % 4 != 0 {
            return Err(SweepError::InvalidDirection(format!(
                "azimuthal count {n_azimuthal} must be a positive multiple of 4"
            )));
        }
        let (xis, ws) = gauss_legendre(n_polar)?;
        let dphi = 2.0 * PI / n_azimuthal as f64;
        let mut dirs = Vec::with_capacity(n_azimuthal * n_polar);
        for (xi, w) in xis.into_iter().zip(ws) {
            let s = (1.0 - xi * xi).max(0.0).sqrt();
            for k in 0..n_azimuthal {
                let phi = (k as f64 + 0.5) * dphi;
                dirs.push(Direction {
                    omega: [s * phi.cos(), s * phi.sin(), xi],
                    weight: w * dphi,
                });
            }
        }
        Self::new(dirs)
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    pub fn direction(&self, d: usize) -> &Direction {
        &self.directions[d]
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Index of the direction obtained by reflecting `d` on a surface with
    /// unit normal `normal`.
    pub fn mirror(&self, d: usize, normal: Vec3) -> Option<usize> {
        let w = self.directions[d].omega;
        let c = 2.0 * dot(w, normal);
        let r = [w[0] - c * normal[0], w[1] - c * normal[1], w[2] - c * normal[2]];
        self.directions
            .iter()
            .enumerate()
            .map(|(j, o)| {
                let e = [o.omega[0] - r[0], o.omega[1] - r[1], o.omega[2] - r[2]];
                (j, norm(e))
            })
            .filter(|&(_, dist)| dist < MIRROR_TOL)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(j, _)| j)
    }

    /// Discrete-to-moment coefficient for direction `d`, moment `m`
    /// (0 = scalar flux, 1..=3 = current components).
    #[inline]
    pub fn d2m(&self, d: usize, m: usize) -> f64 {
        let dir = &self.directions[d];
        match m {
            0 => dir.weight,
            _ => dir.weight * dir.omega[m - 1],
        }
    }

    /// Moment-to-discrete coefficient; the inverse expansion of [`Self::d2m`].
    #[inline]
    pub fn m2d(&self, d: usize, m: usize) -> f64 {
        let dir = &self.directions[d];
        match m {
            0 => 1.0 / self.total_weight,
            _ => 3.0 * dir.omega[m - 1] / self.total_weight,
        }
    }
}

/// Gauss-Legendre nodes (ascending) and weights on `[-1, 1]`.
pub fn gauss_legendre(n: usize) -> Result<(Vec<f64>, Vec<f64>), SweepError> {
    if n == 0 {
        return Err(SweepError::InvalidDirection("zero-point Gauss-Legendre rule".into()));
    }
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let m = n.div_ceil(2);
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 0.0;
        for _ in 0..100 {
            let (p, d) = legendre(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    Ok((nodes, weights))
}

/// `P_n(x)` and its derivative by the three-term recurrence.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let p2 = ((2 * k - 1) as f64 * x * p1 - (k - 1) as f64 * p0) / k as f64;
        p0 = p1;
        p1 = p2;
    }
    let d = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_legendre_integrates_polynomials() {
        let (x, w) = gauss_legendre(4).unwrap();
        let sum_w: f64 = w.iter().sum();
        let x2: f64 = x.iter().zip(&w).map(|(x, w)| x * x * w).sum();
        assert!((sum_w - 2.0).abs() < 1e-13);
        assert!((x2 - 2.0 / 3.0).abs() < 1e-13);
        assert!(x.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn slab_mirror_flips_mu() {
        let q = Quadrature::gauss_legendre_slab(4).unwrap();
        let m = q.mirror(0, [-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(m, 3);
        assert!((q.direction(0).omega[0] + q.direction(m).omega[0]).abs() < 1e-14);
    }

    #[test]
    fn product_set_is_closed_under_axis_reflection() {
        let q = Quadrature::product(8, 2).unwrap();
        assert_eq!(q.len(), 16);
        for d in 0..q.len() {
            assert!(q.mirror(d, [1.0, 0.0, 0.0]).is_some());
            assert!(q.mirror(d, [0.0, -1.0, 0.0]).is_some());
        }
        assert!(Quadrature::product(6, 2).is_err());
    }

    #[test]
    fn moment_operators_are_inverse_on_isotropic_flux() {
        let q = Quadrature::product(4, 2).unwrap();
        // Expand an isotropic moment to directions and back.
        let phi: f64 = (0..q.len()).map(|d| q.d2m(d, 0) * q.m2d(d, 0) * 2.0).sum();
        assert!((phi - 2.0).abs() < 1e-12);
    }

    #[test]
    fn octant_bits_follow_sign() {
        let d = Direction {
            omega: [-0.6, 0.0, -0.8],
            weight: 1.0,
        };
        assert_eq!(d.octant(), 0b101);
    }

    #[test]
    fn rejects_non_unit_direction() {
        let bad = Direction {
            omega: [1.0, 1.0, 0.0],
            weight: 1.0,
        };
        assert!(Quadrature::new(vec![bad]).is_err());
    }
}
