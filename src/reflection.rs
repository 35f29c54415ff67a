//! Reduction of a composed transfer matrix to reflection coefficients, and
//! the quantities derived from them.

use nalgebra::{Complex, Matrix2, Matrix4};
use serde::Serialize;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambient;

    fn fresnel(n1: f64, n2: f64, theta: f64) -> ReflectionMatrix {
        let t = ambient::incident(n1 * n1, theta)
            * ambient::exit(Complex::new(n1, 0.0), Complex::new(n2, 0.0), theta);
        ReflectionMatrix::from_transfer(&t)
    }

    #[test]
    fn normal_incidence_matches_fresnel() {
        let (n1, n2) = (5.5f64.sqrt(), 1.5);
        let r = fresnel(n1, n2, 0.0);
        let expected = (n1 - n2) / (n1 + n2);
        assert!((r.r_pp - Complex::new(expected, 0.0)).norm() < 1e-6);
        assert!((r.r_ss - Complex::new(expected, 0.0)).norm() < 1e-6);
        assert!(r.r_ps.norm() < 1e-12);
        assert!(r.r_sp.norm() < 1e-12);
    }

    #[test]
    fn oblique_isotropic_interface_matches_fresnel() {
        let (n1, n2, theta) = (1.0f64, 1.5f64, 0.5f64);
        let r = fresnel(n1, n2, theta);
        let ci = theta.cos();
        let ct = (1.0 - (n1 / n2 * theta.sin()).powi(2)).sqrt();
        let rs = (n1 * ci - n2 * ct) / (n1 * ci + n2 * ct);
        let rp = (n2 * ci - n1 * ct) / (n2 * ci + n1 * ct);
        assert!((r.r_ss.norm() - rs.abs()).abs() < 1e-9);
        assert!((r.r_pp.norm() - rp.abs()).abs() < 1e-9);
    }

    #[test]
    fn total_internal_reflection_is_complete() {
        let r = fresnel(5.5f64.sqrt(), 1.0, 1.0);
        let reflectance = r.reflectance();
        assert!((reflectance.p_total - 1.0).abs() < 1e-9);
        assert!((reflectance.s_total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn singular_transfer_matrix_is_non_finite() {
        let r = ReflectionMatrix::from_transfer(&Matrix4::zeros());
        assert!(!r.is_finite());
    }

    #[test]
    fn identity_jones_gives_identity_mueller() {
        let one = Complex::new(1.0, 0.0);
        let zero = Complex::new(0.0, 0.0);
        let r = ReflectionMatrix::new(one, zero, zero, one);
        assert!((r.mueller() - Matrix4::identity()).norm() < 1e-12);

        let r = ReflectionMatrix::new(one * 0.5, zero, zero, one * 0.5);
        assert!((r.mueller() - Matrix4::identity() * 0.25).norm() < 1e-12);
    }

    #[test]
    fn horizontal_polariser_mueller() {
        let one = Complex::new(1.0, 0.0);
        let zero = Complex::new(0.0, 0.0);
        let m = ReflectionMatrix::new(one, zero, zero, zero).mueller();
        let expected = Matrix4::new(
            0.5, 0.5, 0.0, 0.0, //
            0.5, 0.5, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0,
        );
        assert!((m - expected).norm() < 1e-12);
    }
}

/// Reflection coefficients of a stack. The first subscript is the reflected
/// polarisation and the second the incident one, so `r_sp` is s reflected
/// from p incidence, and `R = [[r_pp, r_ps], [r_sp, r_ss]]` maps incident `(p, s)`
/// amplitudes to reflected ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReflectionMatrix {
    pub r_pp: Complex<f64>,
    pub r_ps: Complex<f64>,
    pub r_sp: Complex<f64>,
    pub r_ss: Complex<f64>,
}

/// Power reflection coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reflectance {
    pub pp: f64,
    pub ps: f64,
    pub sp: f64,
    pub ss: f64,
    /// Total reflected power for p incidence.
    pub p_total: f64,
    /// Total reflected power for s incidence.
    pub s_total: f64,
}

impl ReflectionMatrix {
    pub fn new(
        r_pp: Complex<f64>,
        r_ps: Complex<f64>,
        r_sp: Complex<f64>,
        r_ss: Complex<f64>,
    ) -> Self {
        Self {
            r_pp,
            r_ps,
            r_sp,
            r_ss,
        }
    }

    /// Solves the 2x2 incident/reflected relation encoded in the top
    /// boundary rows of the transfer matrix. A vanishing determinant gives
    /// non-finite coefficients rather than an error.
    pub fn from_transfer(t: &Matrix4<Complex<f64>>) -> Self {
        let det = t[(0, 0)] * t[(2, 2)] - t[(0, 2)] * t[(2, 0)];

        Self {
            r_pp: (t[(1, 0)] * t[(2, 2)] - t[(1, 2)] * t[(2, 0)]) / det,
            r_sp: (t[(3, 0)] * t[(2, 2)] - t[(3, 2)] * t[(2, 0)]) / det,
            r_ps: (t[(1, 2)] * t[(0, 0)] - t[(1, 0)] * t[(0, 2)]) / det,
            r_ss: (t[(3, 2)] * t[(0, 0)] - t[(3, 0)] * t[(0, 2)]) / det,
        }
    }

    pub fn undefined() -> Self {
        let nan = Complex::new(f64::NAN, f64::NAN);
        Self::new(nan, nan, nan, nan)
    }

    pub fn is_finite(&self) -> bool {
        [self.r_pp, self.r_ps, self.r_sp, self.r_ss]
            .iter()
            .all(|r| r.is_finite())
    }

    pub fn jones(&self) -> Matrix2<Complex<f64>> {
        Matrix2::new(self.r_pp, self.r_ps, self.r_sp, self.r_ss)
    }

    pub fn reflectance(&self) -> Reflectance {
        let pp = self.r_pp.norm_sqr();
        let ps = self.r_ps.norm_sqr();
        let sp = self.r_sp.norm_sqr();
        let ss = self.r_ss.norm_sqr();
        Reflectance {
            pp,
            ps,
            sp,
            ss,
            p_total: pp + sp,
            s_total: ss + ps,
        }
    }

    /// Mueller matrix of the Jones matrix, `A (J kron J*) A^-1`.
    pub fn mueller(&self) -> Matrix4<f64> {
        let j = self.jones();
        let kron = Matrix4::from_fn(|row, col| {
            let (i, k) = (row / 2, row % 2);
            let (jj, l) = (col / 2, col % 2);
            j[(i, jj)] * j[(k, l)].conj()
        });

        let one = Complex::new(1.0, 0.0);
        let zero = Complex::new(0.0, 0.0);
        let im = Complex::new(0.0, 1.0);

        let a = Matrix4::new(
            one, zero, zero, one, //
            one, zero, zero, -one, //
            zero, one, one, zero, //
            zero, im, -im, zero,
        );
        let a_inv = Matrix4::new(
            one, one, zero, zero, //
            zero, zero, one, -im, //
            zero, zero, one, im, //
            one, -one, zero, zero,
        ) * Complex::new(0.5, 0.0);

        (a * kron * a_inv).map(|z| z.re)
    }
}
