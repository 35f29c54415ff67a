//! Frequency-dependent optical response of layer media.
//!
//! The solver treats the dispersive model of a crystal as an external
//! collaborator: something that turns a frequency into a permittivity
//! tensor in the crystal's principal frame. This module defines that seam
//! and a small set of generic models that can be parameterised from the
//! configuration file:
//! - constant isotropic, uniaxial and biaxial media
//! - uniaxial media whose principal values follow a sum of Lorentz
//!   oscillators
//!
//! Frequencies are wavenumbers in cm^-1 throughout.

use nalgebra::Complex;
use serde::{Deserialize, Serialize};

use crate::tensor::{self, Tensor3};


/// Source of the constitutive tensors of a medium, in its principal frame.
pub trait Material: Send + Sync {
    /// Relative permittivity at the given wavenumber (cm^-1).
    fn permittivity(&self, frequency: f64) -> Tensor3;

    /// Relative permeability at the given wavenumber (cm^-1).
    fn permeability(&self, _frequency: f64) -> Tensor3 {
        tensor::vacuum()
    }
}

/// A single damped Lorentz oscillator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    pub strength: f64,
    /// Transverse optical phonon frequency (cm^-1).
    pub frequency: f64,
    /// Damping rate (cm^-1).
    pub damping: f64,
}

/// `eps(v) = eps_inf + sum_j s_j v_j^2 / (v_j^2 - v^2 - i g_j v)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorentzModel {
    pub eps_inf: f64,
    #[serde(default)]
    pub oscillators: Vec<Oscillator>,
}

impl LorentzModel {
    pub fn evaluate(&self, frequency: f64) -> Complex<f64> {
        self.oscillators
            .iter()
            .fold(Complex::new(self.eps_inf, 0.0), |eps, osc| {
                let resonance = osc.frequency * osc.frequency;
                let denominator = Complex::new(
                    resonance - frequency * frequency,
                    -osc.damping * frequency,
                );
                eps + osc.strength * resonance / denominator
            })
    }
}

/// Material models that can be described in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum MaterialSpec {
    Isotropic {
        permittivity: Complex<f64>,
    },
    Uniaxial {
        ordinary: Complex<f64>,
        extraordinary: Complex<f64>,
    },
    Biaxial {
        xx: Complex<f64>,
        yy: Complex<f64>,
        zz: Complex<f64>,
    },
    /// Optic axis along z, each principal value its own oscillator sum.
    LorentzUniaxial {
        ordinary: LorentzModel,
        extraordinary: LorentzModel,
    },
}

impl Material for MaterialSpec {
    fn permittivity(&self, frequency: f64) -> Tensor3 {
        match self {
            MaterialSpec::Isotropic { permittivity } => tensor::isotropic(*permittivity),
            MaterialSpec::Uniaxial {
                ordinary,
                extraordinary,
            } => tensor::diagonal(*ordinary, *ordinary, *extraordinary),
            MaterialSpec::Biaxial { xx, yy, zz } => tensor::diagonal(*xx, *yy, *zz),
            MaterialSpec::LorentzUniaxial {
                ordinary,
                extraordinary,
            } => {
                let o = ordinary.evaluate(frequency);
                tensor::diagonal(o, o, extraordinary.evaluate(frequency))
            }
        }
    }
}
