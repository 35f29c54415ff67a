//! Layer matrices built from canonical eigenmodes.

use nalgebra::{Complex, Matrix4, Vector4};

use crate::config;
use crate::eigen::EigenPair;
use crate::modes::CanonicalModes;


/// Propagator `V exp(-i k0 d L) V^-1` of a layer of thickness `thickness`
/// (cm) at free-space wavenumber `k0` (rad/cm).
///
/// Maps the tangential field at the exit face back to the entry face. A
/// singular eigenbasis gives a NaN matrix for this context, as does a layer
/// so thick or lossy that its phase spread exceeds
/// [`config::MAX_PHASE_SPREAD`]: the decaying modes would be lost to
/// round-off against the growing ones.
pub fn finite(modes: &CanonicalModes, k0: f64, thickness: f64) -> Matrix4<Complex<f64>> {
    if phase_spread(modes, k0, thickness) > config::MAX_PHASE_SPREAD {
        return undefined();
    }
    let v = modes.eigenvectors();
    let Some(v_inv) = v.try_inverse() else {
        return undefined();
    };

    let factor = Complex::new(0.0, -k0 * thickness);
    let phases: Vector4<Complex<f64>> = modes.eigenvalues().map(|value| (factor * value).exp());

    v * Matrix4::from_diagonal(&phases) * v_inv
}

/// Natural-log ratio between the largest and smallest phase factor
/// magnitudes of a layer.
pub fn phase_spread(modes: &CanonicalModes, k0: f64, thickness: f64) -> f64 {
    let imag = modes.eigenvalues().map(|value| value.im);
    k0 * thickness.abs() * (imag.max() - imag.min())
}

/// Terminator of a semi-infinite medium: the admissible modes fill the
/// forward columns, the backward columns stay empty.
pub fn semi_infinite(admissible: &[EigenPair; 2]) -> Matrix4<Complex<f64>> {
    let zero = Vector4::zeros();
    Matrix4::from_columns(&[admissible[0].vector, zero, admissible[1].vector, zero])
}

fn undefined() -> Matrix4<Complex<f64>> {
    Matrix4::from_element(Complex::new(f64::NAN, f64::NAN))
}
