//! A validated multilayer stack and its evaluation over a sweep.

use std::fmt;
use std::time::Instant;

use anyhow::{anyhow, bail, Context as _, Result};
use indicatif::ProgressBar;
use nalgebra::{Complex, Matrix4};
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::eigen::{EigenSolver, SchurSolver};
use crate::layer::{self, Layer, Thickness};
use crate::modes::WaveProfile;
use crate::reflection::ReflectionMatrix;
use crate::sweep::{self, GridIndex, Sweep, SweepAxis, NUM_AXES};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialSpec;
    use crate::sweep::Scenario;
    use std::collections::BTreeMap;

    fn quartz_like() -> Layer {
        Layer::SemiInfiniteCrystal {
            material: MaterialSpec::Uniaxial {
                ordinary: Complex::new(2.38, 0.0),
                extraordinary: Complex::new(2.26, 0.0),
            },
            rotation: Default::default(),
        }
    }

    fn sweep(frequencies: Vec<f64>, angles: Vec<f64>) -> Sweep {
        let mut values = BTreeMap::new();
        values.insert(SweepAxis::Frequency, frequencies);
        values.insert(SweepAxis::IncidentAngle, angles);
        Sweep::new(Scenario::Incident.axes(), values).unwrap()
    }

    #[test]
    fn rejects_misordered_stacks() {
        assert!(Structure::new(vec![quartz_like()]).is_err());
        assert!(Structure::new(vec![
            Layer::Prism { permittivity: 5.5 },
            Layer::AirGap {
                permittivity: Complex::new(1.0, 0.0),
                thickness: Thickness::Fixed(1.0),
            },
        ])
        .is_err());
        assert!(Structure::new(vec![
            Layer::Prism { permittivity: 5.5 },
            Layer::IsotropicSemiInfinite { permittivity: None },
        ])
        .is_err());
        assert!(Structure::new(vec![Layer::Prism { permittivity: 5.5 }, quartz_like()]).is_ok());
    }

    #[test]
    fn swept_thickness_needs_thickness_axis() {
        let structure = Structure::new(vec![
            Layer::Prism { permittivity: 5.5 },
            Layer::AirGap {
                permittivity: Complex::new(1.0, 0.0),
                thickness: Thickness::Swept,
            },
            quartz_like(),
        ])
        .unwrap();
        let result = structure.evaluate(&sweep(vec![500.0], vec![30.0]), Backend::Serial);
        assert!(result.is_err());
    }

    #[test]
    fn grid_has_sweep_shape() {
        let structure = Structure::new(vec![
            Layer::Prism { permittivity: 5.5 },
            Layer::AirGap {
                permittivity: Complex::new(1.0, 0.0),
                thickness: Thickness::Fixed(1.5),
            },
            quartz_like(),
        ])
        .unwrap();
        let sweep = sweep(vec![400.0, 500.0, 600.0], vec![10.0, 20.0]);
        let grid = structure.evaluate(&sweep, Backend::Serial).unwrap();
        assert_eq!(grid.shape(), [3, 2, 1, 1, 1, 1, 1]);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.non_finite(), 0);
    }

    #[test]
    fn grid_spans_axes_no_layer_depends_on() {
        let structure = Structure::new(vec![
            Layer::Prism { permittivity: 5.5 },
            Layer::IsotropicSemiInfinite {
                permittivity: Some(Complex::new(2.25, 0.0)),
            },
        ])
        .unwrap();
        let sweep = sweep(vec![400.0, 500.0, 600.0], vec![10.0, 20.0]);
        let grid = structure.evaluate(&sweep, Backend::Serial).unwrap();
        assert_eq!(grid.shape(), sweep.shape());
        assert_eq!(grid.len(), 6);
        // frequency-independent stack repeats along the frequency axis
        for (index, r) in grid.iter() {
            let first = grid.get([0, index[1], 0, 0, 0, 0, 0]).unwrap();
            assert_eq!(r, first);
        }
    }

    #[test]
    fn static_crystal_keeps_azimuthal_axis() {
        let structure = Structure::new(vec![
            Layer::Prism { permittivity: 5.5 },
            Layer::AirGap {
                permittivity: Complex::new(1.0, 0.0),
                thickness: Thickness::Fixed(1.0),
            },
            Layer::SemiInfiniteCrystal {
                material: MaterialSpec::Uniaxial {
                    ordinary: Complex::new(2.38, 0.0),
                    extraordinary: Complex::new(2.26, 0.0),
                },
                rotation: crate::layer::Rotation {
                    y: 90.0,
                    z_mode: crate::layer::ZMode::Static,
                    ..Default::default()
                },
            },
        ])
        .unwrap();
        let mut values = BTreeMap::new();
        values.insert(SweepAxis::Frequency, vec![450.0, 550.0]);
        values.insert(SweepAxis::IncidentAngle, vec![30.0]);
        values.insert(SweepAxis::AzimuthalAngle, vec![0.0, 45.0, 90.0]);
        let sweep = Sweep::new(Scenario::Azimuthal.axes(), values).unwrap();

        let grid = structure.evaluate(&sweep, Backend::Parallel).unwrap();
        assert_eq!(grid.shape(), [2, 1, 3, 1, 1, 1, 1]);
        assert_eq!(grid.len(), sweep.len());
    }

    #[test]
    fn wave_profiles_of_the_exit_layer() {
        let structure = Structure::new(vec![Layer::Prism { permittivity: 5.5 }, quartz_like()])
            .unwrap();
        let sweep = sweep(vec![500.0], vec![20.0]);
        let profiles = structure.wave_profiles(1, &sweep, [0; NUM_AXES]).unwrap();
        assert!(profiles[0].propagation.re > 0.0);
        assert!(profiles[3].propagation.re < 0.0);
        assert!(structure.wave_profiles(5, &sweep, [0; NUM_AXES]).is_err());
    }
}

/// How contexts are mapped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Serial,
    /// Data-parallel over contexts with rayon.
    #[default]
    Parallel,
}

impl Backend {
    /// Evaluates `f` at `0..len`, keeping the results in order. The first
    /// error aborts the batch.
    pub fn map<T, F>(&self, len: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        match self {
            Backend::Serial => (0..len).map(f).collect(),
            Backend::Parallel => (0..len).into_par_iter().map(f).collect(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Serial => write!(f, "serial"),
            Backend::Parallel => write!(f, "parallel ({} threads)", rayon::current_num_threads()),
        }
    }
}

/// Reflection matrices over the full sweep grid, in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionGrid {
    values: ArrayD<ReflectionMatrix>,
}

impl ReflectionGrid {
    pub fn from_shape_vec(shape: GridIndex, values: Vec<ReflectionMatrix>) -> Result<Self> {
        Ok(Self {
            values: ArrayD::from_shape_vec(IxDyn(&shape), values)?,
        })
    }

    pub fn shape(&self) -> GridIndex {
        let mut shape = [1; NUM_AXES];
        shape.copy_from_slice(self.values.shape());
        shape
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: GridIndex) -> Option<&ReflectionMatrix> {
        self.values.get(&index[..])
    }

    /// Every grid point with its index, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (GridIndex, &ReflectionMatrix)> + '_ {
        let shape = self.shape();
        self.values
            .iter()
            .enumerate()
            .map(move |(flat, r)| (sweep::unravel(flat, &shape), r))
    }

    /// Number of contexts whose coefficients are NaN or infinite.
    pub fn non_finite(&self) -> usize {
        self.values.iter().filter(|r| !r.is_finite()).count()
    }
}

/// A multilayer stack, prism first and semi-infinite exit medium last.
pub struct Structure {
    layers: Vec<Layer>,
    solver: Box<dyn EigenSolver>,
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Structure")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

impl Structure {
    /// Validates the layer order and uses the default eigensolver.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        Self::with_solver(layers, Box::new(SchurSolver::default()))
    }

    pub fn with_solver(layers: Vec<Layer>, solver: Box<dyn EigenSolver>) -> Result<Self> {
        layer::validate_order(&layers)?;
        Ok(Self { layers, solver })
    }

    /// Permittivity of the incident prism, which fixes `kx` for the stack.
    pub fn prism_permittivity(&self) -> f64 {
        match self.layers.first() {
            Some(Layer::Prism { permittivity }) => *permittivity,
            // validated at construction
            _ => f64::NAN,
        }
    }

    /// Checks that every swept quantity has an axis to take values from.
    fn check_sweep(&self, sweep: &Sweep) -> Result<()> {
        let swept = self
            .layers
            .iter()
            .position(|layer| layer.thickness() == Some(Thickness::Swept));
        if let Some(i) = swept {
            if !sweep.active().contains(SweepAxis::Thickness) {
                bail!(
                    "layer {} has a swept thickness but the thickness axis is not active",
                    i
                );
            }
        }
        Ok(())
    }

    /// Layer matrices of one layer over its own dependency grid.
    fn layer_grid(
        &self,
        layer: &Layer,
        sweep: &Sweep,
        backend: Backend,
    ) -> Result<ArrayD<Matrix4<Complex<f64>>>> {
        let shape = sweep.layer_shape(layer.dependencies());
        let len = shape.iter().product();
        let prism = self.prism_permittivity();
        let solver = self.solver.as_ref();

        let matrices = backend.map(len, |flat| {
            let context = sweep.context(sweep::unravel(flat, &shape));
            layer.matrix(&context, prism, solver)
        })?;

        debug!(
            "{} depends on {} -> grid {:?}",
            layer,
            layer.dependencies(),
            shape
        );

        Ok(ArrayD::from_shape_vec(IxDyn(&shape), matrices)?)
    }

    /// Reflection matrices at every context of the sweep.
    pub fn evaluate(&self, sweep: &Sweep, backend: Backend) -> Result<ReflectionGrid> {
        self.evaluate_with_progress(sweep, backend, &ProgressBar::hidden())
    }

    /// As [`Structure::evaluate`], advancing `progress` once per context.
    pub fn evaluate_with_progress(
        &self,
        sweep: &Sweep,
        backend: Backend,
        progress: &ProgressBar,
    ) -> Result<ReflectionGrid> {
        let start = Instant::now();
        self.check_sweep(sweep)?;

        info!(
            "evaluating {} layers over {} contexts, active axes {}, backend {}",
            self.layers.len(),
            sweep.len(),
            sweep.active(),
            backend
        );

        let grids = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                self.layer_grid(layer, sweep, backend)
                    .with_context(|| format!("failed to build layer {} ({})", i, layer))
            })
            .collect::<Result<Vec<_>>>()?;

        let shapes = grids.iter().map(|g| {
            let mut shape = [1; NUM_AXES];
            shape.copy_from_slice(g.shape());
            shape
        });
        // axes no layer depends on still span the grid
        let target = sweep::broadcast_shape(std::iter::once(sweep.shape()).chain(shapes))?;

        let views = grids
            .iter()
            .map(|g| {
                g.broadcast(IxDyn(&target))
                    .ok_or_else(|| anyhow!("cannot broadcast {:?} to {:?}", g.shape(), target))
            })
            .collect::<Result<Vec<_>>>()?;

        let len = target.iter().product();
        progress.set_length(len as u64);

        // the product order is the physical layer order
        let reflections = backend.map(len, |flat| {
            let index = sweep::unravel(flat, &target);
            let transfer = views
                .iter()
                .fold(Matrix4::<Complex<f64>>::identity(), |acc, view| {
                    acc * view[&index[..]]
                });
            progress.inc(1);
            Ok(ReflectionMatrix::from_transfer(&transfer))
        })?;

        let grid = ReflectionGrid::from_shape_vec(target, reflections)?;

        info!(
            "evaluated {} contexts in {:.2?} ({} non-finite)",
            grid.len(),
            start.elapsed(),
            grid.non_finite()
        );

        Ok(grid)
    }

    /// Field and Poynting profiles of the four canonical modes of layer
    /// `layer` at grid point `index`.
    pub fn wave_profiles(
        &self,
        layer: usize,
        sweep: &Sweep,
        index: GridIndex,
    ) -> Result<[WaveProfile; 4]> {
        let target = self
            .layers
            .get(layer)
            .ok_or_else(|| anyhow!("no layer {} in a stack of {}", layer, self.layers.len()))?;
        let context = sweep.context(index);
        let modes = target.modes(&context, self.prism_permittivity(), self.solver.as_ref())?;
        Ok(modes.profiles())
    }
}
