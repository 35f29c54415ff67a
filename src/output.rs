use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use itertools::Itertools;
use serde::Serialize;
use tracing::info;

use crate::reflection::{ReflectionMatrix, Reflectance};
use crate::settings::Settings;
use crate::structure::ReflectionGrid;
use crate::sweep::{GridIndex, Sweep, SweepAxis};


const REFLECTANCE_COLUMNS: [&str; 6] = ["r_pp", "r_ps", "r_sp", "r_ss", "p_total", "s_total"];

const MUELLER_COLUMNS: [&str; 16] = [
    "s11", "s12", "s13", "s14", "s21", "s22", "s23", "s24", "s31", "s32", "s33", "s34", "s41",
    "s42", "s43", "s44",
];

/// Column header: active axis names followed by `columns`.
fn header(sweep: &Sweep, columns: &[&'static str]) -> String {
    let axes = sweep.active().iter().map(SweepAxis::name);
    format!("# {}", axes.chain(columns.iter().copied()).join(" "))
}

/// Values of the active axes at `index`, in configuration units.
fn axis_columns(sweep: &Sweep, index: GridIndex) -> Vec<f64> {
    sweep
        .active()
        .iter()
        .map(|axis| sweep.values(axis)[index[axis.index()]])
        .collect()
}

/// Axis values as given, followed by `values` in fixed scientific notation.
fn row(sweep: &Sweep, index: GridIndex, values: impl IntoIterator<Item = f64>) -> String {
    axis_columns(sweep, index)
        .into_iter()
        .map(|v| v.to_string())
        .chain(values.into_iter().map(|v| format!("{:.8e}", v)))
        .join(" ")
}

fn reflectance_row(sweep: &Sweep, index: GridIndex, r: &ReflectionMatrix) -> String {
    let reflectance = r.reflectance();
    let values = [
        reflectance.pp,
        reflectance.ps,
        reflectance.sp,
        reflectance.ss,
        reflectance.p_total,
        reflectance.s_total,
    ];
    row(sweep, index, values)
}

/// Write power reflectances against the active sweep axes.
pub fn write_reflectance(sweep: &Sweep, grid: &ReflectionGrid, dir: &Path) -> Result<()> {
    let path = dir.join("reflectance.dat");
    let file = File::create(&path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", header(sweep, &REFLECTANCE_COLUMNS))?;
    for (index, r) in grid.iter() {
        writeln!(writer, "{}", reflectance_row(sweep, index, r))?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the 16 Mueller matrix elements of the reflection against the
/// active sweep axes, row by row.
pub fn write_mueller(sweep: &Sweep, grid: &ReflectionGrid, dir: &Path) -> Result<()> {
    let path = dir.join("mueller.dat");
    let file = File::create(&path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", header(sweep, &MUELLER_COLUMNS))?;
    for (index, r) in grid.iter() {
        let mueller = r.mueller();
        // nalgebra iterates column-major
        let elements = mueller.transpose();
        writeln!(writer, "{}", row(sweep, index, elements.iter().copied()))?;
    }

    writer.flush()?;
    Ok(())
}

/// Run summary written alongside the tables.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub timestamp: String,
    pub scenario: String,
    pub active_axes: Vec<&'static str>,
    pub shape: GridIndex,
    pub contexts: usize,
    pub non_finite: usize,
    pub max_p_total: f64,
    pub max_s_total: f64,
}

impl Summary {
    pub fn new(scenario: &str, sweep: &Sweep, grid: &ReflectionGrid) -> Self {
        let finite_max = |f: fn(&Reflectance) -> f64| {
            grid.iter()
                .map(|(_, r)| f(&r.reflectance()))
                .filter(|v| v.is_finite())
                .fold(0.0, f64::max)
        };

        Self {
            timestamp: Local::now().to_rfc3339(),
            scenario: scenario.to_string(),
            active_axes: sweep.active().iter().map(SweepAxis::name).collect(),
            shape: grid.shape(),
            contexts: grid.len(),
            non_finite: grid.non_finite(),
            max_p_total: finite_max(|r| r.p_total),
            max_s_total: finite_max(|r| r.s_total),
        }
    }
}

pub fn write_summary(summary: &Summary, dir: &Path) -> Result<()> {
    let path = dir.join("summary.json");
    let file = File::create(&path).with_context(|| format!("failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)?;
    Ok(())
}

/// Write the effective settings so a run can be reproduced.
pub fn write_settings(settings: &Settings, dir: &Path) -> Result<()> {
    let path = dir.join("settings.toml");
    let contents = toml::to_string_pretty(settings).context("failed to serialise settings")?;
    fs::write(&path, contents).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

/// Write every output file into the settings' output directory.
pub fn write_all(settings: &Settings, sweep: &Sweep, grid: &ReflectionGrid) -> Result<()> {
    let dir = settings.directory.as_path();
    fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;

    write_reflectance(sweep, grid, dir)?;
    write_mueller(sweep, grid, dir)?;
    write_summary(&Summary::new(&settings.scenario, sweep, grid), dir)?;
    write_settings(settings, dir)?;

    info!("wrote output to {:?}", dir);
    Ok(())
}
