//! Numerical tolerances and fixed physical offsets shared across the solver.

/// Imaginary parts smaller than this are treated as zero when splitting
/// eigenmodes into transmitted and reflected branches.
pub const IMAG_TOLERANCE: f64 = 1e-12;
/// Two modes of a branch whose Poynting cross-polarisation fractions differ
/// by less than this are reported as an ambiguous polarisation split. The
/// Poynting ordering is used either way.
pub const POLARISATION_THRESHOLD: f64 = 1e-6;
/// Convergence tolerance for the complex Schur iteration.
pub const SCHUR_EPSILON: f64 = 1e-14;
/// Maximum number of Schur iterations before the eigensolver gives up.
pub const SCHUR_MAX_ITERATIONS: usize = 10_000;
/// Relative floor used in place of a vanishing eigenvalue gap during
/// back-substitution.
pub const EIGEN_GAP_FLOOR: f64 = 1e-13;
/// Offset (radians) added to every y rotation to lift exact degeneracy at
/// axis-aligned orientations.
pub const ROTATION_Y_OFFSET: f64 = 1e-8;
/// Largest spread `k0 d (max Im q - min Im q)` between the growing and
/// decaying phase factors of a finite layer. Beyond it the propagator no
/// longer fits in double precision and the context is left undefined.
pub const MAX_PHASE_SPREAD: f64 = 30.0;
/// Conversion from microns (configuration unit) to centimetres (solver unit).
pub const MICRON_TO_CM: f64 = 1e-4;
/// Default permittivity of the coupling prism.
pub const DEFAULT_PRISM_PERMITTIVITY: f64 = 5.5;
