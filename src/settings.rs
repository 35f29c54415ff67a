use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::layer::{self, Layer};
use crate::structure::{Backend, Structure};
use crate::sweep::{Scenario, Sweep, SweepAxis};

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        scenario = "incident"
        frequency = { start = 410.0, stop = 600.0, steps = 20 }
        incident_angle = { start = -80.0, stop = 80.0, steps = 9 }
        azimuthal_angle = 15.0
        backend = "serial"

        [[layers]]
        type = "prism"
        permittivity = 5.5

        [[layers]]
        type = "air_gap"
        thickness = 1.5

        [[layers]]
        type = "semi_infinite_crystal"
        material = { model = "uniaxial", ordinary = [2.38, 0.0], extraordinary = [2.26, 0.0] }
    "#;

    #[test]
    fn parses_and_builds_sweep() {
        let settings = Settings::from_toml_str(CONFIG).unwrap();
        assert_eq!(settings.backend, Backend::Serial);
        assert_eq!(settings.layers.len(), 3);

        let sweep = settings.sweep().unwrap();
        assert_eq!(sweep.shape(), [20, 9, 1, 1, 1, 1, 1]);
        assert_eq!(sweep.values(SweepAxis::AzimuthalAngle)[0], 15.0);
        assert_eq!(sweep.values(SweepAxis::IncidentAngle)[4], 0.0);
        assert!(settings.structure().is_ok());
    }

    #[test]
    fn unknown_scenario_is_a_configuration_error() {
        let config = CONFIG.replace("\"incident\"", "\"spectral\"");
        assert!(Settings::from_toml_str(&config).is_err());
    }

    #[test]
    fn missing_exit_permittivity_is_a_configuration_error() {
        let config = CONFIG.replace(
            "type = \"semi_infinite_crystal\"\n        material = { model = \"uniaxial\", ordinary = [2.38, 0.0], extraordinary = [2.26, 0.0] }",
            "type = \"isotropic_semi_infinite\"",
        );
        assert!(config.contains("isotropic_semi_infinite"));
        assert!(Settings::from_toml_str(&config).is_err());
    }

    #[test]
    fn inactive_axis_with_many_values_is_rejected() {
        let config = CONFIG.replace("azimuthal_angle = 15.0", "azimuthal_angle = [0.0, 45.0]");
        let settings = Settings::from_toml_str(&config).unwrap();
        assert!(settings.sweep().is_err());
    }

    #[test]
    fn command_line_overrides_rotation_axes() {
        let mut settings = Settings::from_toml_str(CONFIG).unwrap();
        let args = CliArgs::try_parse_from([
            "berreman",
            "--scenario",
            "custom",
            "--axes",
            "frequency rotation_y",
            "--incident-angle",
            "20",
            "--rotation-y",
            "0:90:4",
            "--rotation-z",
            "30",
        ])
        .unwrap();
        settings.apply_args(&args);

        assert_eq!(settings.rotation_z, Some(AxisValues::Fixed(30.0)));
        assert_eq!(settings.rotation_x, None);
        let sweep = settings.sweep().unwrap();
        assert_eq!(sweep.shape(), [20, 1, 1, 1, 4, 1, 1]);
        assert_eq!(sweep.values(SweepAxis::RotationY)[3], 90.0);
    }

    #[test]
    fn axis_values_from_command_line() {
        assert_eq!(parse_axis_values("500").unwrap(), AxisValues::Fixed(500.0));
        assert_eq!(
            parse_axis_values("410:600:5").unwrap(),
            AxisValues::Linspace {
                start: 410.0,
                stop: 600.0,
                steps: 5
            }
        );
        assert_eq!(
            parse_axis_values("0,30,60").unwrap(),
            AxisValues::List(vec![0.0, 30.0, 60.0])
        );
        assert!(parse_axis_values("1:2").is_err());
        assert!(parse_axis_values("a").is_err());
        assert!(AxisValues::Linspace {
            start: 0.0,
            stop: 1.0,
            steps: 0
        }
        .values()
        .is_err());
    }
}

/// Values of one sweep axis in a configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AxisValues {
    Fixed(f64),
    List(Vec<f64>),
    /// `steps` evenly spaced values, both ends included.
    Linspace { start: f64, stop: f64, steps: usize },
}

impl AxisValues {
    pub fn values(&self) -> Result<Vec<f64>> {
        match self {
            AxisValues::Fixed(value) => Ok(vec![*value]),
            AxisValues::List(values) if values.is_empty() => bail!("axis value list is empty"),
            AxisValues::List(values) => Ok(values.clone()),
            AxisValues::Linspace { steps: 0, .. } => bail!("linspace needs at least one step"),
            AxisValues::Linspace { start, stop, steps } => {
                Ok(Array1::linspace(*start, *stop, *steps).to_vec())
            }
        }
    }
}

impl fmt::Display for AxisValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValues::Fixed(value) => write!(f, "{}", value),
            AxisValues::List(values) => write!(f, "{:?}", values),
            AxisValues::Linspace { start, stop, steps } => {
                write!(f, "{} to {} in {} steps", start, stop, steps)
            }
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("output")
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// `incident`, `azimuthal`, `dispersion` or `custom`.
    pub scenario: String,
    /// Active axes of a `custom` scenario.
    #[serde(default)]
    pub axes: Vec<SweepAxis>,
    /// Wavenumber, cm^-1.
    pub frequency: AxisValues,
    /// Degrees.
    pub incident_angle: AxisValues,
    pub azimuthal_angle: Option<AxisValues>,
    pub rotation_x: Option<AxisValues>,
    pub rotation_y: Option<AxisValues>,
    pub rotation_z: Option<AxisValues>,
    /// Microns, for layers with a swept thickness.
    pub thickness: Option<AxisValues>,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub backend: Backend,
    /// Output directory.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

impl Settings {
    /// Parses settings from a TOML string and validates them.
    pub fn from_toml_str(contents: &str) -> Result<Settings> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn scenario(&self) -> Result<Scenario> {
        Scenario::from_name(&self.scenario, &self.axes)
    }

    fn axis_values(&self) -> Vec<(SweepAxis, &AxisValues)> {
        let optional = [
            (SweepAxis::AzimuthalAngle, &self.azimuthal_angle),
            (SweepAxis::RotationX, &self.rotation_x),
            (SweepAxis::RotationY, &self.rotation_y),
            (SweepAxis::RotationZ, &self.rotation_z),
            (SweepAxis::Thickness, &self.thickness),
        ];

        let mut values = vec![
            (SweepAxis::Frequency, &self.frequency),
            (SweepAxis::IncidentAngle, &self.incident_angle),
        ];
        values.extend(
            optional
                .into_iter()
                .filter_map(|(axis, v)| v.as_ref().map(|v| (axis, v))),
        );
        values
    }

    /// The sweep grid described by the scenario and axis values.
    pub fn sweep(&self) -> Result<Sweep> {
        let scenario = self.scenario()?;
        let mut values = BTreeMap::new();
        for (axis, axis_values) in self.axis_values() {
            let v = axis_values
                .values()
                .with_context(|| format!("invalid values for sweep axis '{}'", axis))?;
            values.insert(axis, v);
        }
        Sweep::new(scenario.axes(), values)
    }

    pub fn structure(&self) -> Result<Structure> {
        Structure::new(self.layers.clone())
    }

    /// Command-line arguments override the file.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(scenario) = &args.scenario {
            self.scenario = scenario.clone();
        }
        if let Some(axes) = &args.axes {
            self.axes = axes.clone();
        }
        if let Some(frequency) = &args.frequency {
            self.frequency = frequency.clone();
        }
        if let Some(angle) = &args.incident_angle {
            self.incident_angle = angle.clone();
        }

        let optional = [
            (&mut self.azimuthal_angle, &args.azimuthal_angle),
            (&mut self.rotation_x, &args.rotation_x),
            (&mut self.rotation_y, &args.rotation_y),
            (&mut self.rotation_z, &args.rotation_z),
            (&mut self.thickness, &args.thickness),
        ];
        for (field, arg) in optional {
            if arg.is_some() {
                *field = arg.clone();
            }
        }

        if let Some(backend) = args.backend {
            self.backend = backend;
        }
        if let Some(dir) = &args.dir {
            self.directory = dir.clone();
        }
    }

    /// Rejects configurations that cannot be evaluated, before any numeric
    /// work is done.
    pub fn validate(&self) -> Result<()> {
        self.scenario()?;
        layer::validate_order(&self.layers)?;
        for (axis, axis_values) in self.axis_values() {
            axis_values
                .values()
                .with_context(|| format!("invalid values for sweep axis '{}'", axis))?;
        }
        Ok(())
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("failed to load default configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("failed to deserialize default configuration")?;

    config.validate()?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    load_config_with_args(&CliArgs::parse())
}

pub fn load_config_with_args(args: &CliArgs) -> Result<Settings> {
    let config_file = match &args.config {
        Some(path) => path.clone(),
        None => {
            let root = retrieve_project_root()?;
            let default_config_file = root.join("config/default.toml");
            let local_config = root.join("config/local.toml");

            // prefer local config over default
            if local_config.exists() {
                local_config
            } else {
                default_config_file
            }
        }
    };
    info!("using configuration {:?}", config_file);

    let settings: Config = Config::builder()
        .add_source(File::from(config_file.clone()).required(true))
        .add_source(Environment::with_prefix("berreman").separator("__"))
        .build()
        .with_context(|| format!("failed to load configuration {:?}", config_file))?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("failed to deserialize configuration")?;

    config.apply_args(args);
    config.validate()?;

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the BERREMAN_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
pub fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("BERREMAN_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("could not find project root directory"))
}

#[derive(Parser, Debug, Default)]
#[command(
    version,
    about = "Berreman 4x4 transfer-matrix reflectance of anisotropic multilayers"
)]
pub struct CliArgs {
    /// Path to a TOML configuration file. Defaults to config/local.toml if
    /// present, otherwise config/default.toml.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Scenario: incident, azimuthal, dispersion or custom.
    #[arg(short, long)]
    pub scenario: Option<String>,

    /// Active axes for the custom scenario, separated by spaces.
    #[arg(long, value_parser = parse_sweep_axis, num_args = 1.., value_delimiter = ' ')]
    pub axes: Option<Vec<SweepAxis>>,

    /// Frequency in cm^-1. Format: value, start:stop:steps or v1,v2,...
    #[arg(short, long, value_parser = parse_axis_values)]
    pub frequency: Option<AxisValues>,

    /// Angle of incidence in degrees. Same format as --frequency.
    #[arg(short, long, value_parser = parse_axis_values)]
    pub incident_angle: Option<AxisValues>,

    /// Azimuthal angle in degrees. Same format as --frequency.
    #[arg(long, value_parser = parse_axis_values)]
    pub azimuthal_angle: Option<AxisValues>,

    /// Extra rotation about x in degrees. Same format as --frequency.
    #[arg(long, value_parser = parse_axis_values)]
    pub rotation_x: Option<AxisValues>,

    /// Extra rotation about y in degrees. Same format as --frequency.
    #[arg(long, value_parser = parse_axis_values)]
    pub rotation_y: Option<AxisValues>,

    /// Extra rotation about z in degrees. Same format as --frequency.
    #[arg(long, value_parser = parse_axis_values)]
    pub rotation_z: Option<AxisValues>,

    /// Thickness of swept layers in microns. Same format as --frequency.
    #[arg(long, value_parser = parse_axis_values)]
    pub thickness: Option<AxisValues>,

    /// Compute backend: serial or parallel.
    #[arg(short, long, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    /// Output directory.
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

/// Parse an axis specification: `value`, `start:stop:steps` or `v1,v2,...`.
fn parse_axis_values(s: &str) -> Result<AxisValues, String> {
    let number = |part: &str| {
        part.trim()
            .parse::<f64>()
            .map_err(|_| format!("failed to parse '{}' as a number", part))
    };

    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(format!(
                "invalid range '{}', expected 'start:stop:steps'",
                s
            ));
        }
        let steps = parts[2]
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("failed to parse step count '{}'", parts[2]))?;
        Ok(AxisValues::Linspace {
            start: number(parts[0])?,
            stop: number(parts[1])?,
            steps,
        })
    } else if s.contains(',') {
        let values = s.split(',').map(number).collect::<Result<Vec<_>, _>>()?;
        Ok(AxisValues::List(values))
    } else {
        Ok(AxisValues::Fixed(number(s)?))
    }
}

fn parse_sweep_axis(s: &str) -> Result<SweepAxis, String> {
    SweepAxis::ALL
        .into_iter()
        .find(|axis| axis.name() == s)
        .ok_or_else(|| format!("unknown sweep axis '{}'", s))
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    match s {
        "serial" => Ok(Backend::Serial),
        "parallel" => Ok(Backend::Parallel),
        other => Err(format!(
            "unknown backend '{}', expected serial or parallel",
            other
        )),
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Scenario: {}
  - Frequency (cm^-1): {}
  - Incident Angle (deg): {}
  - Layers: {}
  - Backend: {}
  - Output Directory: {:?}
  ",
            self.scenario,
            self.frequency,
            self.incident_angle,
            self.layers
                .iter()
                .map(|l| l.name())
                .collect::<Vec<_>>()
                .join(" / "),
            self.backend,
            self.directory,
        )
    }
}
