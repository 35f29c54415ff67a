//! The kinds of layer a stack is built from.
//!
//! Each layer knows which sweep axes it depends on and how to turn one
//! context into its 4x4 layer matrix. Layers never look at their neighbours;
//! the prism permittivity is the only piece of shared state, since it fixes
//! the in-plane wavevector for the whole stack.

use std::fmt;

use anyhow::{anyhow, bail, Result};
use nalgebra::{Complex, Matrix4};
use serde::{Deserialize, Serialize};

use crate::ambient;
use crate::config;
use crate::dispersion::berreman_matrix;
use crate::eigen::EigenSolver;
use crate::material::{Material, MaterialSpec};
use crate::modes::{self, CanonicalModes};
use crate::propagation;
use crate::sweep::{AxisSet, Context, SweepAxis};
use crate::tensor::{self, Tensor3};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eigen::SchurSolver;

    #[derive(Deserialize)]
    struct Stack {
        layers: Vec<Layer>,
    }

    const STACK: &str = r#"
        [[layers]]
        type = "prism"

        [[layers]]
        type = "air_gap"
        thickness = 1.5

        [[layers]]
        type = "crystal"
        thickness = "swept"
        rotation = { x = 0.0, y = 90.0, z = 45.0, z_mode = "static" }
        material = { model = "uniaxial", ordinary = [2.38, 0.0], extraordinary = [2.26, 0.0] }

        [[layers]]
        type = "isotropic_semi_infinite"
        permittivity = [2.25, 0.0]
    "#;

    fn context(thickness: f64) -> Context {
        Context {
            frequency: 500.0,
            incident_angle: 0.5,
            azimuthal_angle: 0.3,
            rotation_x: 0.0,
            rotation_y: 0.0,
            rotation_z: 0.0,
            thickness,
        }
    }

    #[test]
    fn parses_layer_list() {
        let stack: Stack = toml::from_str(STACK).unwrap();
        assert_eq!(stack.layers.len(), 4);
        assert_eq!(
            stack.layers[0],
            Layer::Prism {
                permittivity: config::DEFAULT_PRISM_PERMITTIVITY
            }
        );
        match &stack.layers[2] {
            Layer::Crystal {
                thickness,
                rotation,
                ..
            } => {
                assert_eq!(*thickness, Thickness::Swept);
                assert_eq!(rotation.z_mode, ZMode::Static);
                assert_eq!(rotation.y, 90.0);
            }
            other => panic!("unexpected layer {}", other),
        }
    }

    #[test]
    fn rejects_unknown_thickness_keyword() {
        let result: Result<Stack, _> = toml::from_str(
            r#"
            [[layers]]
            type = "air_gap"
            thickness = "thick"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn dependencies_follow_parameters() {
        let stack: Stack = toml::from_str(STACK).unwrap();
        let prism = stack.layers[0].dependencies();
        assert_eq!(prism, AxisSet::empty().with(SweepAxis::IncidentAngle));

        let gap = stack.layers[1].dependencies();
        assert!(gap.contains(SweepAxis::Frequency));
        assert!(!gap.contains(SweepAxis::Thickness));

        let crystal = stack.layers[2].dependencies();
        assert!(crystal.contains(SweepAxis::Thickness));
        assert!(crystal.contains(SweepAxis::RotationY));
        assert!(!crystal.contains(SweepAxis::AzimuthalAngle));
    }

    #[test]
    fn zero_thickness_gap_is_transparent() {
        let gap = Layer::AirGap {
            permittivity: Complex::new(1.0, 0.0),
            thickness: Thickness::Swept,
        };
        let m = gap
            .matrix(&context(0.0), 5.5, &SchurSolver::default())
            .unwrap();
        assert!((m - Matrix4::identity()).norm() < 1e-9);
    }

    #[test]
    fn prism_matrix_is_incident_coupling() {
        let prism = Layer::Prism { permittivity: 5.5 };
        let m = prism
            .matrix(&context(0.0), 5.5, &SchurSolver::default())
            .unwrap();
        assert_eq!(m, ambient::incident(5.5, 0.5));
    }

    #[test]
    fn exit_without_permittivity_is_an_error() {
        let exit = Layer::IsotropicSemiInfinite { permittivity: None };
        assert!(exit
            .matrix(&context(0.0), 5.5, &SchurSolver::default())
            .is_err());
    }
}

/// Layer thickness, fixed in microns or taken from the thickness axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThicknessRepr", into = "ThicknessRepr")]
pub enum Thickness {
    Fixed(f64),
    Swept,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ThicknessRepr {
    Value(f64),
    Keyword(String),
}

impl TryFrom<ThicknessRepr> for Thickness {
    type Error = String;

    fn try_from(repr: ThicknessRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ThicknessRepr::Value(value) if value >= 0.0 => Ok(Thickness::Fixed(value)),
            ThicknessRepr::Value(value) => Err(format!("thickness must be >= 0, got {}", value)),
            ThicknessRepr::Keyword(word) if word == "swept" => Ok(Thickness::Swept),
            ThicknessRepr::Keyword(word) => Err(format!(
                "thickness must be a number of microns or \"swept\", got \"{}\"",
                word
            )),
        }
    }
}

impl From<Thickness> for ThicknessRepr {
    fn from(thickness: Thickness) -> Self {
        match thickness {
            Thickness::Fixed(value) => ThicknessRepr::Value(value),
            Thickness::Swept => ThicknessRepr::Keyword("swept".to_string()),
        }
    }
}

impl Thickness {
    /// Thickness in microns at the given context.
    pub fn resolve(&self, context: &Context) -> f64 {
        match self {
            Thickness::Fixed(value) => *value,
            Thickness::Swept => context.thickness,
        }
    }
}

/// How the azimuthal sweep angle acts on a crystal's z rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZMode {
    /// The azimuthal angle is added to the z rotation.
    #[default]
    Relative,
    /// The crystal keeps its own z rotation.
    Static,
}

/// Orientation of a crystal's principal axes, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub z_mode: ZMode,
}

impl Rotation {
    /// Total rotation in radians once the sweep's rotation axes are added.
    fn angles(&self, context: &Context) -> (f64, f64, f64) {
        let azimuth = match self.z_mode {
            ZMode::Relative => context.azimuthal_angle,
            ZMode::Static => 0.0,
        };
        (
            self.x.to_radians() + context.rotation_x,
            self.y.to_radians() + context.rotation_y,
            self.z.to_radians() + context.rotation_z + azimuth,
        )
    }

    fn dependencies(&self) -> AxisSet {
        let axes = AxisSet::empty()
            .with(SweepAxis::RotationX)
            .with(SweepAxis::RotationY)
            .with(SweepAxis::RotationZ);
        match self.z_mode {
            ZMode::Relative => axes.with(SweepAxis::AzimuthalAngle),
            ZMode::Static => axes,
        }
    }
}

fn default_prism_permittivity() -> f64 {
    config::DEFAULT_PRISM_PERMITTIVITY
}

fn default_gap_permittivity() -> Complex<f64> {
    Complex::new(1.0, 0.0)
}

/// One layer of the stack, top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// Isotropic coupling prism the light is incident from.
    Prism {
        #[serde(default = "default_prism_permittivity")]
        permittivity: f64,
    },
    /// Isotropic spacer of finite thickness.
    AirGap {
        #[serde(default = "default_gap_permittivity")]
        permittivity: Complex<f64>,
        thickness: Thickness,
    },
    /// Anisotropic layer of finite thickness.
    Crystal {
        material: MaterialSpec,
        #[serde(default)]
        rotation: Rotation,
        thickness: Thickness,
    },
    /// Anisotropic substrate.
    SemiInfiniteCrystal {
        material: MaterialSpec,
        #[serde(default)]
        rotation: Rotation,
    },
    /// Isotropic substrate with a known permittivity.
    IsotropicSemiInfinite {
        #[serde(default)]
        permittivity: Option<Complex<f64>>,
    },
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Prism { .. } => "prism",
            Layer::AirGap { .. } => "air_gap",
            Layer::Crystal { .. } => "crystal",
            Layer::SemiInfiniteCrystal { .. } => "semi_infinite_crystal",
            Layer::IsotropicSemiInfinite { .. } => "isotropic_semi_infinite",
        }
    }

    pub fn is_semi_infinite(&self) -> bool {
        matches!(
            self,
            Layer::SemiInfiniteCrystal { .. } | Layer::IsotropicSemiInfinite { .. }
        )
    }

    pub fn thickness(&self) -> Option<Thickness> {
        match self {
            Layer::AirGap { thickness, .. } | Layer::Crystal { thickness, .. } => Some(*thickness),
            _ => None,
        }
    }

    /// Sweep axes the layer matrix varies along. Every layer except the
    /// prism depends on the angle of incidence through `kx`.
    pub fn dependencies(&self) -> AxisSet {
        let base = AxisSet::empty().with(SweepAxis::IncidentAngle);
        let with_thickness = |axes: AxisSet, thickness: &Thickness| match thickness {
            Thickness::Swept => axes.with(SweepAxis::Thickness),
            Thickness::Fixed(_) => axes,
        };

        match self {
            Layer::Prism { .. } | Layer::IsotropicSemiInfinite { .. } => base,
            Layer::AirGap { thickness, .. } => {
                with_thickness(base.with(SweepAxis::Frequency), thickness)
            }
            Layer::Crystal {
                rotation,
                thickness,
                ..
            } => with_thickness(
                base.with(SweepAxis::Frequency).union(rotation.dependencies()),
                thickness,
            ),
            Layer::SemiInfiniteCrystal { rotation, .. } => base
                .with(SweepAxis::Frequency)
                .union(rotation.dependencies()),
        }
    }

    /// Lab-frame permittivity and permeability at a context.
    pub fn tensors(&self, context: &Context, prism_permittivity: f64) -> Result<(Tensor3, Tensor3)> {
        let oriented = |material: &MaterialSpec, rotation: &Rotation| {
            let (x, y, z) = rotation.angles(context);
            (
                tensor::orient(&material.permittivity(context.frequency), x, y, z),
                tensor::orient(&material.permeability(context.frequency), x, y, z),
            )
        };

        Ok(match self {
            Layer::Prism { .. } => (
                tensor::isotropic(Complex::new(prism_permittivity, 0.0)),
                tensor::vacuum(),
            ),
            Layer::AirGap { permittivity, .. } => {
                (tensor::isotropic(*permittivity), tensor::vacuum())
            }
            Layer::Crystal {
                material, rotation, ..
            }
            | Layer::SemiInfiniteCrystal { material, rotation } => oriented(material, rotation),
            Layer::IsotropicSemiInfinite { permittivity } => (
                tensor::isotropic(exit_permittivity(permittivity)?),
                tensor::vacuum(),
            ),
        })
    }

    /// Canonical eigenmodes of the layer medium at a context.
    pub fn modes(
        &self,
        context: &Context,
        prism_permittivity: f64,
        solver: &dyn EigenSolver,
    ) -> Result<CanonicalModes> {
        let kx = in_plane_wavevector(context, prism_permittivity);
        let (eps, mu) = self.tensors(context, prism_permittivity)?;
        let pairs = solver.solve(&berreman_matrix(kx, &eps, &mu))?;
        Ok(modes::classify(&pairs, kx, &eps, &mu))
    }

    /// The layer's 4x4 matrix at a context.
    pub fn matrix(
        &self,
        context: &Context,
        prism_permittivity: f64,
        solver: &dyn EigenSolver,
    ) -> Result<Matrix4<Complex<f64>>> {
        match self {
            Layer::Prism { permittivity } => {
                Ok(ambient::incident(*permittivity, context.incident_angle))
            }
            Layer::AirGap { thickness, .. } | Layer::Crystal { thickness, .. } => {
                let modes = self.modes(context, prism_permittivity, solver)?;
                let d = thickness.resolve(context) * config::MICRON_TO_CM;
                Ok(propagation::finite(&modes, context.k0(), d))
            }
            Layer::SemiInfiniteCrystal { .. } => {
                let kx = in_plane_wavevector(context, prism_permittivity);
                let (eps, mu) = self.tensors(context, prism_permittivity)?;
                let pairs = solver.solve(&berreman_matrix(kx, &eps, &mu))?;
                Ok(propagation::semi_infinite(&modes::admissible(&pairs)))
            }
            Layer::IsotropicSemiInfinite { permittivity } => {
                let n_exit = exit_permittivity(permittivity)?.sqrt();
                let n_prism = Complex::new(prism_permittivity.sqrt(), 0.0);
                Ok(ambient::exit(n_prism, n_exit, context.incident_angle))
            }
        }
    }
}

fn exit_permittivity(permittivity: &Option<Complex<f64>>) -> Result<Complex<f64>> {
    permittivity.ok_or_else(|| anyhow!("isotropic semi-infinite exit layer needs a permittivity"))
}

/// `kx = sqrt(eps_prism) sin(theta)`, normalised to the free-space wavenumber.
pub fn in_plane_wavevector(context: &Context, prism_permittivity: f64) -> Complex<f64> {
    Complex::new(prism_permittivity.sqrt() * context.incident_angle.sin(), 0.0)
}

/// Rejects a stack whose layers are not in physical order.
pub fn validate_order(layers: &[Layer]) -> Result<()> {
    let Some((first, rest)) = layers.split_first() else {
        bail!("layer list is empty");
    };
    let Some((last, middle)) = rest.split_last() else {
        bail!("layer list needs at least a prism and a semi-infinite exit layer");
    };

    if !matches!(first, Layer::Prism { .. }) {
        bail!("first layer must be a prism, found {}", first);
    }
    if !last.is_semi_infinite() {
        bail!("last layer must be semi-infinite, found {}", last);
    }
    if let Layer::IsotropicSemiInfinite { permittivity: None } = last {
        bail!("isotropic semi-infinite exit layer needs a permittivity");
    }
    for (i, layer) in middle.iter().enumerate() {
        if !matches!(layer, Layer::AirGap { .. } | Layer::Crystal { .. }) {
            bail!(
                "layer {} must be an air gap or crystal, found {}",
                i + 1,
                layer
            );
        }
    }
    Ok(())
}
