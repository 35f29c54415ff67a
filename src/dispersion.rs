//! The 4x4 Berreman dispersion matrix of a homogeneous layer.
//!
//! For a plane wave with fixed in-plane wavevector `kx` (normalised to the
//! free-space wavenumber), Maxwell's equations in a stratified medium
//! reduce to a first order system for the tangential fields
//! `[Ex, Ey, Hx, Hy]`. Its matrix has closed-form entries built from the
//! permittivity and permeability tensors; its eigenvalues are the
//! normalised out-of-plane wavevector components of the four partial waves.
//!
//! The z-z entries of both tensors appear as divisors. A zero entry yields
//! non-finite matrix elements for that context only.

use nalgebra::{Complex, Matrix4};

use crate::tensor::Tensor3;


/// Builds the Berreman matrix for in-plane wavevector `kx`, permittivity
/// `eps` and permeability `mu` (all in the lab frame).
pub fn berreman_matrix(kx: Complex<f64>, eps: &Tensor3, mu: &Tensor3) -> Matrix4<Complex<f64>> {
    let zero = Complex::new(0.0, 0.0);
    let kx2 = kx * kx;

    let e = |r: usize, c: usize| eps[(r, c)];
    let u = |r: usize, c: usize| mu[(r, c)];
    let e22 = e(2, 2);
    let u22 = u(2, 2);

    Matrix4::new(
        // row 0
        -kx * e(2, 0) / e22,
        kx * (u(1, 2) / u22 - e(2, 1) / e22),
        u(1, 0) - u(1, 2) * u(2, 0) / u22,
        u(1, 1) - u(1, 2) * u(2, 1) / u22 - kx2 / e22,
        // row 1
        zero,
        -kx * u(0, 2) / u22,
        u(0, 2) * u(2, 0) / u22 - u(0, 0),
        u(0, 2) * u(2, 1) / u22 - u(0, 1),
        // row 2
        e(1, 2) * e(2, 0) / e22 - e(1, 0),
        kx2 / u22 - e(1, 1) + e(1, 2) * e(2, 1) / e22,
        -kx * u(2, 0) / u22,
        kx * (e(1, 2) / e22 - u(2, 1) / u22),
        // row 3
        e(0, 0) - e(0, 2) * e(2, 0) / e22,
        e(0, 1) - e(0, 2) * e(2, 1) / e22,
        zero,
        -kx * e(0, 2) / e22,
    )
}
