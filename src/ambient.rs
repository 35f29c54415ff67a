//! Boundary matrices for the isotropic half-spaces bounding the stack.
//!
//! Both ambient media are isotropic, so their p and s plane-wave bases are
//! known in closed form and no eigendecomposition is needed. Amplitudes are
//! ordered `[p forward, p backward, s forward, s backward]`.

use nalgebra::{Complex, Matrix4};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_incidence_exit_angle_is_zero() {
        let c = exit_cosine(Complex::new(2.0, 0.0), Complex::new(1.5, 0.0), 0.0);
        assert!((c - Complex::new(1.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn total_internal_reflection_decays() {
        let n1 = Complex::new(5.5f64.sqrt(), 0.0);
        let n2 = Complex::new(1.0, 0.0);
        for theta in [0.6f64, 1.0, 1.4, -1.4] {
            let c = exit_cosine(n1, n2, theta);
            assert!(c.im >= 0.0, "theta {}: {}", theta, c);
            assert!(c.re.abs() < 1e-12);
        }
    }

    #[test]
    fn lossy_exit_medium_takes_decaying_branch() {
        let c = exit_cosine(Complex::new(2.0, 0.0), Complex::new(1.2, 0.3), 0.9);
        assert!(c.im >= 0.0);
    }

    #[test]
    fn incident_coupling_inverts_matched_exit_coupling() {
        let eps: f64 = 2.25;
        let n = Complex::new(eps.sqrt(), 0.0);
        let theta = 0.4;
        let product = incident(eps, theta) * exit(n, n, theta);
        let expected = Matrix4::from_diagonal(&nalgebra::Vector4::new(
            Complex::new(1.0, 0.0),
            Complex::new(-1.0, 0.0),
            Complex::new(1.0, 0.0),
            Complex::new(1.0, 0.0),
        ));
        assert!((product - expected).norm() < 1e-12);
    }
}

/// Couples incident and reflected plane-wave amplitudes in the prism of
/// permittivity `permittivity` to the tangential field, for incidence angle
/// `theta` (radians).
pub fn incident(permittivity: f64, theta: f64) -> Matrix4<Complex<f64>> {
    let n = permittivity.sqrt();
    let c = theta.cos();

    let m = Matrix4::new(
        1.0 / c,
        0.0,
        0.0,
        1.0 / n,
        1.0 / c,
        0.0,
        0.0,
        -1.0 / n,
        0.0,
        1.0,
        -1.0 / (n * c),
        0.0,
        0.0,
        1.0,
        1.0 / (n * c),
        0.0,
    );
    m.map(|v| Complex::new(0.5 * v, 0.0))
}

/// Cosine of the refraction angle in the exit medium from the complex form
/// of Snell's law, on the branch with non-negative imaginary part.
pub fn exit_cosine(n_incident: Complex<f64>, n_exit: Complex<f64>, theta: f64) -> Complex<f64> {
    let sine = n_incident / n_exit * theta.sin();
    let one = Complex::new(1.0, 0.0);
    let cosine = (one - sine * sine).sqrt();
    if cosine.im < 0.0 {
        -cosine
    } else {
        cosine
    }
}

/// Maps plane-wave amplitudes of an isotropic exit medium of index `n_exit`
/// to the tangential field at its boundary.
pub fn exit(n_incident: Complex<f64>, n_exit: Complex<f64>, theta: f64) -> Matrix4<Complex<f64>> {
    let c = exit_cosine(n_incident, n_exit, theta);
    let zero = Complex::new(0.0, 0.0);
    let one = Complex::new(1.0, 0.0);

    Matrix4::new(
        c,
        -c,
        zero,
        zero,
        zero,
        zero,
        one,
        one,
        zero,
        zero,
        -n_exit * c,
        n_exit * c,
        n_exit,
        n_exit,
        zero,
        zero,
    )
}
