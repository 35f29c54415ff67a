//! Classification of the four raw eigenpairs of a layer into physical modes.
//!
//! The eigensolver returns its pairs in no particular order. Propagation
//! needs them as `(transmitted p, transmitted s, reflected p, reflected s)`.
//! Two passes produce that ordering:
//! 1. a direction split, which puts the two forward propagating or forward
//!    decaying modes first
//! 2. a polarisation split within each half, ordering by the transverse
//!    Poynting cross-polarisation fraction so the p-like mode comes first
//!
//! Semi-infinite media only use the direction split: the two forward modes
//! are the only admissible solutions in a half-space.

use nalgebra::{Complex, Matrix4, Vector4};
use tracing::trace;

use crate::config;
use crate::eigen::EigenPair;
use crate::tensor::Tensor3;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::berreman_matrix;
    use crate::eigen::{EigenSolver, SchurSolver};
    use crate::tensor;
    use rand::Rng;

    fn random_tensor(rng: &mut impl Rng) -> Tensor3 {
        let principal = tensor::diagonal(
            Complex::new(rng.random_range(1.0..6.0), rng.random_range(0.0..0.5)),
            Complex::new(rng.random_range(1.0..6.0), rng.random_range(0.0..0.5)),
            Complex::new(rng.random_range(1.0..6.0), rng.random_range(0.0..0.5)),
        );
        tensor::rotate(
            &principal,
            rng.random_range(0.0..3.0),
            rng.random_range(0.0..3.0),
            rng.random_range(0.0..3.0),
        )
    }

    fn pair(value: Complex<f64>, vector: [f64; 4]) -> EigenPair {
        EigenPair::new(
            value,
            Vector4::new(
                Complex::new(vector[0], 0.0),
                Complex::new(vector[1], 0.0),
                Complex::new(vector[2], 0.0),
                Complex::new(vector[3], 0.0),
            ),
        )
    }

    #[test]
    fn classification_is_a_permutation() {
        let mut rng = rand::rng();
        let solver = SchurSolver::default();
        let mu = tensor::vacuum();

        for _ in 0..50 {
            let eps = random_tensor(&mut rng);
            let kx = Complex::new(rng.random_range(0.0..2.0), 0.0);
            let pairs = solver.solve(&berreman_matrix(kx, &eps, &mu)).unwrap();
            let modes = classify(&pairs, kx, &eps, &mu);

            let mut used = [false; 4];
            for canonical in modes.pairs().iter() {
                let index = pairs
                    .iter()
                    .enumerate()
                    .position(|(i, p)| !used[i] && p == canonical)
                    .expect("canonical mode missing from input");
                used[index] = true;
            }
            assert!(used.iter().all(|u| *u));
        }
    }

    #[test]
    fn direction_split_orders_lossy_modes_by_imaginary_part() {
        let pairs = [
            pair(Complex::new(1.0, -0.5), [1.0, 0.0, 0.0, 0.0]),
            pair(Complex::new(-1.0, 0.5), [0.0, 1.0, 0.0, 0.0]),
            pair(Complex::new(2.0, 0.0), [0.0, 0.0, 1.0, 0.0]),
            pair(Complex::new(-2.0, 0.0), [0.0, 0.0, 0.0, 1.0]),
        ];
        let ordered = direction_split(&pairs);
        assert_eq!(ordered[0].value, Complex::new(-1.0, 0.5));
        assert_eq!(ordered[1].value, Complex::new(2.0, 0.0));
        assert_eq!(ordered[2].value, Complex::new(-2.0, 0.0));
        assert_eq!(ordered[3].value, Complex::new(1.0, -0.5));
    }

    #[test]
    fn direction_split_ignores_round_off_imaginary_parts() {
        let pairs = [
            pair(Complex::new(-1.5, 1e-15), [1.0, 0.0, 0.0, 0.0]),
            pair(Complex::new(1.5, -1e-15), [0.0, 1.0, 0.0, 0.0]),
            pair(Complex::new(-1.5, -1e-15), [0.0, 0.0, 1.0, 0.0]),
            pair(Complex::new(1.5, 1e-15), [0.0, 0.0, 0.0, 1.0]),
        ];
        let admissible = admissible(&pairs);
        assert!(admissible.iter().all(|p| p.value.re > 0.0));
    }

    #[test]
    fn isotropic_modes_split_by_direction() {
        let eps = tensor::isotropic(Complex::new(2.25, 0.0));
        let mu = tensor::vacuum();
        let kx = Complex::new(0.6, 0.0);
        let pairs = SchurSolver::default()
            .solve(&berreman_matrix(kx, &eps, &mu))
            .unwrap();
        let modes = classify(&pairs, kx, &eps, &mu);

        let q = (2.25f64 - 0.36).sqrt();
        assert!((modes.transmitted_p.pair.value.re - q).abs() < 1e-9);
        assert!((modes.transmitted_s.pair.value.re - q).abs() < 1e-9);
        assert!((modes.reflected_p.pair.value.re + q).abs() < 1e-9);
        assert!((modes.reflected_s.pair.value.re + q).abs() < 1e-9);
        assert!(modes.eigenvectors().determinant().norm() > 1e-6);
        assert!(
            modes.transmitted_p.profile.poynting_cross_polarisation()
                >= modes.transmitted_s.profile.poynting_cross_polarisation()
        );
    }

    #[test]
    fn cross_polarisation_is_nan_safe() {
        let zero = pair(Complex::new(1.0, 0.0), [0.0, 0.0, 0.0, 0.0]);
        let profile = WaveProfile::new(
            &zero,
            Complex::new(0.0, 0.0),
            &tensor::vacuum(),
            &tensor::vacuum(),
        );
        assert_eq!(profile.field_cross_polarisation(), 0.0);
        assert_eq!(profile.poynting_cross_polarisation(), 0.0);
    }
}

/// Full field and energy-flux profile of a single eigenmode.
///
/// `ez` and `hz` follow from the tangential components and the tensors. The
/// Poynting components are the plain products `E x H` of the complex fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveProfile {
    pub ex: Complex<f64>,
    pub ey: Complex<f64>,
    pub ez: Complex<f64>,
    pub hx: Complex<f64>,
    pub hy: Complex<f64>,
    pub hz: Complex<f64>,
    pub px: Complex<f64>,
    pub py: Complex<f64>,
    pub pz: Complex<f64>,
    pub propagation: Complex<f64>,
}

impl WaveProfile {
    pub fn new(pair: &EigenPair, kx: Complex<f64>, eps: &Tensor3, mu: &Tensor3) -> Self {
        let v = &pair.vector;
        let (ex, ey, hx, hy) = (v[0], v[1], v[2], v[3]);

        let ez = -(kx * hy + eps[(2, 0)] * ex + eps[(2, 1)] * ey) / eps[(2, 2)];
        let hz = (kx * ey - mu[(2, 0)] * hx - mu[(2, 1)] * hy) / mu[(2, 2)];

        Self {
            ex,
            ey,
            ez,
            hx,
            hy,
            hz,
            px: ey * hz - ez * hy,
            py: ez * hx - ex * hz,
            pz: ex * hy - ey * hx,
            propagation: pair.value,
        }
    }

    /// `|Ex|^2 / (|Ex|^2 + |Ey|^2)`, zero when both vanish.
    pub fn field_cross_polarisation(&self) -> f64 {
        fraction(self.ex.norm_sqr(), self.ey.norm_sqr())
    }

    /// `|Px|^2 / (|Px|^2 + |Py|^2)`, zero when both vanish.
    pub fn poynting_cross_polarisation(&self) -> f64 {
        fraction(self.px.norm_sqr(), self.py.norm_sqr())
    }
}

fn fraction(a: f64, b: f64) -> f64 {
    let value = a / (a + b);
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// An eigenpair together with its derived wave profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mode {
    pub pair: EigenPair,
    pub profile: WaveProfile,
}

impl Mode {
    fn new(pair: EigenPair, kx: Complex<f64>, eps: &Tensor3, mu: &Tensor3) -> Self {
        Self {
            pair,
            profile: WaveProfile::new(&pair, kx, eps, mu),
        }
    }
}

/// The four modes of a layer in canonical order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalModes {
    pub transmitted_p: Mode,
    pub transmitted_s: Mode,
    pub reflected_p: Mode,
    pub reflected_s: Mode,
}

impl CanonicalModes {
    pub fn modes(&self) -> [&Mode; 4] {
        [
            &self.transmitted_p,
            &self.transmitted_s,
            &self.reflected_p,
            &self.reflected_s,
        ]
    }

    pub fn pairs(&self) -> [EigenPair; 4] {
        self.modes().map(|m| m.pair)
    }

    /// Diagonal of the propagation constants, `diag(Tp, Ts, Rp, Rs)`.
    pub fn eigenvalues(&self) -> Vector4<Complex<f64>> {
        Vector4::from_iterator(self.modes().iter().map(|m| m.pair.value))
    }

    /// Eigenvectors as columns, in canonical order.
    pub fn eigenvectors(&self) -> Matrix4<Complex<f64>> {
        let [a, b, c, d] = self.pairs();
        Matrix4::from_columns(&[a.vector, b.vector, c.vector, d.vector])
    }

    pub fn profiles(&self) -> [WaveProfile; 4] {
        self.modes().map(|m| m.profile)
    }
}

/// Sort key for the direction split: imaginary part (snapped to zero below
/// the tolerance) then real part.
fn direction_key(value: &Complex<f64>) -> (f64, f64) {
    let im = if value.im.abs() > config::IMAG_TOLERANCE {
        value.im
    } else {
        0.0
    };
    (im, value.re)
}

/// Orders the pairs forward modes first. Always a permutation of the input.
pub fn direction_split(pairs: &[EigenPair; 4]) -> [EigenPair; 4] {
    let mut ordered = *pairs;
    ordered.sort_by(|a, b| {
        let (a_im, a_re) = direction_key(&a.value);
        let (b_im, b_re) = direction_key(&b.value);
        b_im.total_cmp(&a_im).then(b_re.total_cmp(&a_re))
    });
    ordered
}

/// The two modes admissible in a semi-infinite medium.
pub fn admissible(pairs: &[EigenPair; 4]) -> [EigenPair; 2] {
    let ordered = direction_split(pairs);
    [ordered[0], ordered[1]]
}

/// Orders two modes of the same direction p-like first.
fn polarisation_split(first: Mode, second: Mode) -> (Mode, Mode) {
    let a = first.profile.poynting_cross_polarisation();
    let b = second.profile.poynting_cross_polarisation();

    if (a - b).abs() < config::POLARISATION_THRESHOLD {
        trace!(
            "ambiguous polarisation split: poynting {:.3e} vs {:.3e}, field {:.3e} vs {:.3e}",
            a,
            b,
            first.profile.field_cross_polarisation(),
            second.profile.field_cross_polarisation()
        );
    }

    if b > a {
        (second, first)
    } else {
        (first, second)
    }
}

/// Puts the raw eigenpairs of a finite layer into canonical order.
pub fn classify(
    pairs: &[EigenPair; 4],
    kx: Complex<f64>,
    eps: &Tensor3,
    mu: &Tensor3,
) -> CanonicalModes {
    let [t1, t2, r1, r2] = direction_split(pairs).map(|p| Mode::new(p, kx, eps, mu));
    let (transmitted_p, transmitted_s) = polarisation_split(t1, t2);
    let (reflected_p, reflected_s) = polarisation_split(r1, r2);

    CanonicalModes {
        transmitted_p,
        transmitted_s,
        reflected_p,
        reflected_s,
    }
}
