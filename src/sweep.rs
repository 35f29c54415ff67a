//! Sweep axes, scenarios and the broadcast grid of evaluation contexts.
//!
//! An evaluation is a Cartesian product over up to seven axes. Every axis
//! always exists in the grid; an inactive axis simply has extent 1. Layers
//! only depend on a subset of the axes and are evaluated on a grid with
//! extent 1 on the others, then broadcast during composition.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};


/// Number of sweep axes.
pub const NUM_AXES: usize = 7;

/// Grid index or extent over all sweep axes, in [`SweepAxis::ALL`] order.
pub type GridIndex = [usize; NUM_AXES];

/// A dimension an evaluation can be swept over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    /// Wavenumber, cm^-1.
    Frequency,
    /// Angle of incidence in the prism, degrees.
    IncidentAngle,
    /// Azimuthal rotation of the sample about the stack normal, degrees.
    AzimuthalAngle,
    /// Extra rotation about x applied to every crystal, degrees.
    RotationX,
    RotationY,
    RotationZ,
    /// Thickness of layers marked as swept, microns.
    Thickness,
}

impl SweepAxis {
    pub const ALL: [SweepAxis; NUM_AXES] = [
        SweepAxis::Frequency,
        SweepAxis::IncidentAngle,
        SweepAxis::AzimuthalAngle,
        SweepAxis::RotationX,
        SweepAxis::RotationY,
        SweepAxis::RotationZ,
        SweepAxis::Thickness,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SweepAxis::Frequency => "frequency",
            SweepAxis::IncidentAngle => "incident_angle",
            SweepAxis::AzimuthalAngle => "azimuthal_angle",
            SweepAxis::RotationX => "rotation_x",
            SweepAxis::RotationY => "rotation_y",
            SweepAxis::RotationZ => "rotation_z",
            SweepAxis::Thickness => "thickness",
        }
    }

    /// Value used when an inactive axis is not given one.
    fn default_value(self) -> Option<f64> {
        match self {
            SweepAxis::Frequency | SweepAxis::IncidentAngle => None,
            _ => Some(0.0),
        }
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of sweep axes, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisSet(u8);

impl AxisSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, axis: SweepAxis) -> bool {
        self.0 & axis.bit() != 0
    }

    pub fn insert(&mut self, axis: SweepAxis) {
        self.0 |= axis.bit();
    }

    pub fn with(mut self, axis: SweepAxis) -> Self {
        self.insert(axis);
        self
    }

    pub fn union(self, other: AxisSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = SweepAxis> {
        SweepAxis::ALL
            .into_iter()
            .filter(move |axis| self.contains(*axis))
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<SweepAxis> for AxisSet {
    fn from_iter<I: IntoIterator<Item = SweepAxis>>(iter: I) -> Self {
        iter.into_iter().fold(AxisSet::empty(), AxisSet::with)
    }
}

impl fmt::Display for AxisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(SweepAxis::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Named selection of the active sweep axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Frequency against angle of incidence.
    Incident,
    /// Frequency against azimuthal rotation.
    Azimuthal,
    /// Angle of incidence against azimuthal rotation at one frequency.
    Dispersion,
    Custom(AxisSet),
}

impl Scenario {
    /// Resolves a scenario name. `custom` takes its axes from `axes`, which
    /// must not be empty; the presets ignore it.
    pub fn from_name(name: &str, axes: &[SweepAxis]) -> Result<Self> {
        match name {
            "incident" => Ok(Scenario::Incident),
            "azimuthal" => Ok(Scenario::Azimuthal),
            "dispersion" => Ok(Scenario::Dispersion),
            "custom" => {
                if axes.is_empty() {
                    bail!("custom scenario requires at least one sweep axis");
                }
                Ok(Scenario::Custom(axes.iter().copied().collect()))
            }
            other => Err(anyhow!(
                "unknown scenario '{}', expected one of incident, azimuthal, dispersion, custom",
                other
            )),
        }
    }

    pub fn axes(&self) -> AxisSet {
        match self {
            Scenario::Incident => AxisSet::empty()
                .with(SweepAxis::Frequency)
                .with(SweepAxis::IncidentAngle),
            Scenario::Azimuthal => AxisSet::empty()
                .with(SweepAxis::Frequency)
                .with(SweepAxis::AzimuthalAngle),
            Scenario::Dispersion => AxisSet::empty()
                .with(SweepAxis::IncidentAngle)
                .with(SweepAxis::AzimuthalAngle),
            Scenario::Custom(axes) => *axes,
        }
    }
}

/// Values of every sweep axis. Inactive axes hold exactly one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    active: AxisSet,
    values: [Array1<f64>; NUM_AXES],
}

impl Sweep {
    /// Builds a sweep from per-axis values in configuration units. Active
    /// axes need at least one value; inactive axes take at most one and
    /// fall back to zero where that is meaningful.
    pub fn new(active: AxisSet, mut values: BTreeMap<SweepAxis, Vec<f64>>) -> Result<Self> {
        let mut arrays: [Array1<f64>; NUM_AXES] = Default::default();

        for axis in SweepAxis::ALL {
            let axis_values = match values.remove(&axis) {
                Some(v) => v,
                None => match axis.default_value() {
                    Some(default) if !active.contains(axis) => vec![default],
                    _ => bail!("no values given for sweep axis '{}'", axis),
                },
            };

            if axis_values.is_empty() {
                bail!("sweep axis '{}' has no values", axis);
            }
            if !active.contains(axis) && axis_values.len() > 1 {
                bail!(
                    "sweep axis '{}' is not active in this scenario but has {} values",
                    axis,
                    axis_values.len()
                );
            }
            if let Some(bad) = axis_values.iter().find(|v| !v.is_finite()) {
                bail!("sweep axis '{}' has non-finite value {}", axis, bad);
            }

            arrays[axis.index()] = Array1::from(axis_values);
        }

        Ok(Self {
            active,
            values: arrays,
        })
    }

    pub fn active(&self) -> AxisSet {
        self.active
    }

    pub fn values(&self, axis: SweepAxis) -> &Array1<f64> {
        &self.values[axis.index()]
    }

    /// Extent of the full grid.
    pub fn shape(&self) -> GridIndex {
        SweepAxis::ALL.map(|axis| self.values(axis).len())
    }

    /// Extent of the grid of a layer that depends only on `dependencies`.
    pub fn layer_shape(&self, dependencies: AxisSet) -> GridIndex {
        SweepAxis::ALL.map(|axis| {
            if dependencies.contains(axis) {
                self.values(axis).len()
            } else {
                1
            }
        })
    }

    /// Number of contexts in the full grid.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The context at a grid index. Axes with extent 1 accept any index.
    pub fn context(&self, index: GridIndex) -> Context {
        let value = |axis: SweepAxis| {
            let values = self.values(axis);
            values[index[axis.index()].min(values.len() - 1)]
        };

        Context {
            frequency: value(SweepAxis::Frequency),
            incident_angle: value(SweepAxis::IncidentAngle).to_radians(),
            azimuthal_angle: value(SweepAxis::AzimuthalAngle).to_radians(),
            rotation_x: value(SweepAxis::RotationX).to_radians(),
            rotation_y: value(SweepAxis::RotationY).to_radians(),
            rotation_z: value(SweepAxis::RotationZ).to_radians(),
            thickness: value(SweepAxis::Thickness),
        }
    }
}

/// One point of the sweep, in solver units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Context {
    /// Wavenumber, cm^-1.
    pub frequency: f64,
    /// Radians.
    pub incident_angle: f64,
    pub azimuthal_angle: f64,
    pub rotation_x: f64,
    pub rotation_y: f64,
    pub rotation_z: f64,
    /// Microns.
    pub thickness: f64,
}

impl Context {
    /// Free-space wavenumber in rad/cm.
    pub fn k0(&self) -> f64 {
        2.0 * PI * self.frequency
    }
}

/// Common shape of a set of grids. Each axis must either agree or be 1.
pub fn broadcast_shape<I>(shapes: I) -> Result<GridIndex>
where
    I: IntoIterator<Item = GridIndex>,
{
    let mut target = [1; NUM_AXES];
    for shape in shapes {
        for (axis, (t, s)) in target.iter_mut().zip(shape.iter()).enumerate() {
            if *t == 1 {
                *t = *s;
            } else if *s != 1 && *s != *t {
                bail!(
                    "cannot broadcast extent {} against {} on axis '{}'",
                    s,
                    t,
                    SweepAxis::ALL[axis]
                );
            }
        }
    }
    Ok(target)
}

/// Row-major multi-index of flat position `flat` in a grid of `shape`.
pub fn unravel(mut flat: usize, shape: &GridIndex) -> GridIndex {
    let mut index = [0; NUM_AXES];
    for axis in (0..NUM_AXES).rev() {
        let extent = shape[axis].max(1);
        index[axis] = flat % extent;
        flat /= extent;
    }
    index
}
