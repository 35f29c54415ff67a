//! Complex eigendecomposition of the 4x4 dispersion matrix.
//!
//! The dispersion matrix is neither Hermitian nor normal, and isotropic
//! media make its eigenvalues exactly two-fold degenerate (the matrix then
//! squares to a multiple of the identity). The default solver reduces the
//! matrix to Hessenberg form, drives it to complex Schur form `M = Z T Z*`
//! with a Wilkinson-shifted single-shift QR iteration, and recovers
//! eigenvectors from the triangular factor by back-substitution. Where two
//! diagonal entries of `T` coincide the gap is replaced by a small floor, so
//! a degenerate but diagonalisable matrix still yields four independent
//! eigenvectors.
//!
//! Eigenvectors are returned with unit Euclidean norm. Only the ratios of
//! their components carry meaning downstream.

use anyhow::{anyhow, Result};
use nalgebra::linalg::Hessenberg;
use nalgebra::{Complex, Matrix4, Vector4};

use crate::config;


/// An eigenvalue (normalised out-of-plane wavevector) and its tangential
/// field vector `[Ex, Ey, Hx, Hy]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenPair {
    pub value: Complex<f64>,
    pub vector: Vector4<Complex<f64>>,
}

impl EigenPair {
    pub fn new(value: Complex<f64>, vector: Vector4<Complex<f64>>) -> Self {
        Self { value, vector }
    }

    fn undefined() -> Self {
        let nan = Complex::new(f64::NAN, f64::NAN);
        Self::new(nan, Vector4::from_element(nan))
    }
}

/// Generic 4x4 complex eigensolver. Pairs come back in no particular order.
pub trait EigenSolver: Send + Sync {
    fn solve(&self, matrix: &Matrix4<Complex<f64>>) -> Result<[EigenPair; 4]>;
}

/// Shifted complex QR to Schur form followed by triangular back-substitution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchurSolver {
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl Default for SchurSolver {
    fn default() -> Self {
        Self {
            epsilon: config::SCHUR_EPSILON,
            max_iterations: config::SCHUR_MAX_ITERATIONS,
        }
    }
}

impl EigenSolver for SchurSolver {
    fn solve(&self, matrix: &Matrix4<Complex<f64>>) -> Result<[EigenPair; 4]> {
        // a non-finite matrix only poisons its own context
        if matrix.iter().any(|z| !z.is_finite()) {
            return Ok([EigenPair::undefined(); 4]);
        }

        let (z, t) = self.schur(matrix)?;

        let floor = config::EIGEN_GAP_FLOOR * t.norm().max(f64::MIN_POSITIVE);
        let mut pairs = [EigenPair::undefined(); 4];

        for k in 0..4 {
            let value = t[(k, k)];
            let mut y = Vector4::<Complex<f64>>::zeros();
            y[k] = Complex::new(1.0, 0.0);

            for i in (0..k).rev() {
                let mut sum = Complex::new(0.0, 0.0);
                for j in (i + 1)..=k {
                    sum += t[(i, j)] * y[j];
                }
                let mut gap = t[(i, i)] - value;
                if gap.norm() < floor {
                    gap = Complex::new(floor, 0.0);
                }
                y[i] = -sum / gap;
            }

            let vector = z * y;
            let norm = vector.norm();
            pairs[k] = EigenPair::new(value, vector.unscale(norm));
        }

        Ok(pairs)
    }
}

type Matrix4c = Matrix4<Complex<f64>>;

impl SchurSolver {
    /// Returns `(Z, T)` with `M = Z T Z*`, `Z` unitary and `T` upper triangular.
    fn schur(&self, matrix: &Matrix4c) -> Result<(Matrix4c, Matrix4c)> {
        let (mut z, mut h) = Hessenberg::new(*matrix).unpack();
        let scale = h.norm().max(f64::MIN_POSITIVE);

        let mut hi = 3;
        let mut iterations = 0;
        let mut since_deflation = 0;

        while hi > 0 {
            // find the start of the unreduced block ending at `hi`
            let mut lo = hi;
            while lo > 0 {
                let sub = h[(lo, lo - 1)].norm();
                let mut diag = h[(lo - 1, lo - 1)].norm() + h[(lo, lo)].norm();
                if diag == 0.0 {
                    diag = scale;
                }
                if sub <= self.epsilon * diag {
                    h[(lo, lo - 1)] = Complex::new(0.0, 0.0);
                    break;
                }
                lo -= 1;
            }

            if lo == hi {
                hi -= 1;
                since_deflation = 0;
                continue;
            }

            iterations += 1;
            since_deflation += 1;
            if iterations > self.max_iterations {
                return Err(anyhow!(
                    "eigensolver did not converge within {} iterations for matrix {}",
                    self.max_iterations,
                    matrix
                ));
            }

            let shift = if since_deflation % 10 == 0 {
                // exceptional shift to break cycles
                h[(hi, hi)] + Complex::new(0.75 * h[(hi, hi - 1)].norm(), 0.0)
            } else {
                wilkinson_shift(
                    h[(hi - 1, hi - 1)],
                    h[(hi - 1, hi)],
                    h[(hi, hi - 1)],
                    h[(hi, hi)],
                )
            };

            qr_sweep(&mut h, &mut z, lo, hi, shift);
        }

        Ok((z, h))
    }
}

/// Eigenvalue of `[[a, b], [c, d]]` closest to `d`.
fn wilkinson_shift(
    a: Complex<f64>,
    b: Complex<f64>,
    c: Complex<f64>,
    d: Complex<f64>,
) -> Complex<f64> {
    let p = (a - d) * 0.5;
    let disc = (p * p + b * c).sqrt();
    let plus = p + disc;
    let minus = p - disc;
    if plus.norm() < minus.norm() {
        d + plus
    } else {
        d + minus
    }
}

/// One implicit single-shift QR sweep over the block `lo..=hi`, chasing the
/// bulge with Givens rotations applied to the whole of `h` and accumulated
/// into `z`.
fn qr_sweep(h: &mut Matrix4c, z: &mut Matrix4c, lo: usize, hi: usize, shift: Complex<f64>) {
    for k in lo..hi {
        let (x, y) = if k == lo {
            (h[(lo, lo)] - shift, h[(lo + 1, lo)])
        } else {
            (h[(k, k - 1)], h[(k + 1, k - 1)])
        };

        let Some((c, s)) = givens(x, y) else {
            continue;
        };

        for j in 0..4 {
            let a = h[(k, j)];
            let b = h[(k + 1, j)];
            h[(k, j)] = a * c + s * b;
            h[(k + 1, j)] = b * c - s.conj() * a;
        }
        for i in 0..4 {
            let a = h[(i, k)];
            let b = h[(i, k + 1)];
            h[(i, k)] = a * c + b * s.conj();
            h[(i, k + 1)] = b * c - a * s;

            let a = z[(i, k)];
            let b = z[(i, k + 1)];
            z[(i, k)] = a * c + b * s.conj();
            z[(i, k + 1)] = b * c - a * s;
        }

        if k > lo {
            h[(k + 1, k - 1)] = Complex::new(0.0, 0.0);
        }
    }
}

/// Rotation `[[c, s], [-s*, c]]` with real `c` that maps `[x, y]` onto `[r, 0]`.
fn givens(x: Complex<f64>, y: Complex<f64>) -> Option<(f64, Complex<f64>)> {
    let ax = x.norm();
    let ay = y.norm();
    if ay == 0.0 {
        return None;
    }
    if ax == 0.0 {
        return Some((0.0, y.conj() / ay));
    }
    let norm = ax.hypot(ay);
    let phase = x / ax;
    Some((ax / norm, phase * y.conj() / norm))
}
