use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use berreman::output;
use berreman::settings;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = settings::load_config()?;
    info!("{}", settings);

    let sweep = settings.sweep()?;
    let structure = settings.structure()?;

    let pb = ProgressBar::new(sweep.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg} ETA: {eta_precise}",
        )?
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message("contexts".to_string());

    let grid = structure.evaluate_with_progress(&sweep, settings.backend, &pb)?;
    pb.finish();

    output::write_all(&settings, &sweep, &grid)?;

    Ok(())
}
