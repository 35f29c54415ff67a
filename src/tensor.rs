//! Constitutive tensors and their orientation in the lab frame.
//!
//! Every layer is described by a pair of 3x3 complex tensors, the relative
//! permittivity and the relative permeability. The solver only ever reads
//! them in the lab frame, where z is the stack normal and x lies in the
//! plane of incidence. Materials are specified in their principal frame and
//! rotated into the lab frame here.

use nalgebra::{Complex, Matrix3};

use crate::config;

/// A 3x3 complex constitutive tensor (permittivity or permeability).
pub type Tensor3 = Matrix3<Complex<f64>>;


/// Isotropic tensor `value * I`.
pub fn isotropic(value: Complex<f64>) -> Tensor3 {
    Tensor3::identity() * value
}

/// Tensor with the given principal values along x, y and z.
pub fn diagonal(xx: Complex<f64>, yy: Complex<f64>, zz: Complex<f64>) -> Tensor3 {
    Tensor3::from_diagonal(&nalgebra::Vector3::new(xx, yy, zz))
}

/// The non-magnetic permeability tensor.
pub fn vacuum() -> Tensor3 {
    Tensor3::identity()
}

/// Rotation matrix `Rz * Ry * Rx` for the given angles in radians.
pub fn rotation_matrix(x: f64, y: f64, z: f64) -> Matrix3<f64> {
    let (sx, cx) = x.sin_cos();
    let (sy, cy) = y.sin_cos();
    let (sz, cz) = z.sin_cos();

    let rx = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
    let ry = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
    let rz = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);

    rz * ry * rx
}

/// Rotates a principal-frame tensor into the lab frame, `R * t * R^T`.
pub fn rotate(tensor: &Tensor3, x: f64, y: f64, z: f64) -> Tensor3 {
    let r = rotation_matrix(x, y, z).map(|v| Complex::new(v, 0.0));
    r * tensor * r.transpose()
}

/// Rotates a crystal tensor, applying the fixed y offset that keeps
/// axis-aligned orientations away from exact mode degeneracy.
pub fn orient(tensor: &Tensor3, x: f64, y: f64, z: f64) -> Tensor3 {
    rotate(tensor, x, y + config::ROTATION_Y_OFFSET, z)
}
