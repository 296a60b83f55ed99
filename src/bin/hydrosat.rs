use anyhow::{Context, Result};
use clap::Parser;
use hydrosat::io::write_record;
use hydrosat::PipelineConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Water-body and climate acquisition for an area of interest")]
struct Cli {
    /// Pipeline settings (TOML)
    #[arg(long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `output.path` from the config
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str()))
        .init();

    let run = hydrosat::run_from_config(&config, chrono::Utc::now()).context("acquisition run failed")?;

    let output = cli.output.unwrap_or_else(|| config.output.path.clone());
    write_record(&output, &run.record).with_context(|| format!("writing {}", output.display()))?;

    for tile in &run.tiles {
        log::info!("Tile {}: {:?}, {} water bodies", tile.tile_id, tile.outcome, tile.water_bodies);
    }
    if run.valid {
        log::info!("All domains valid");
    } else {
        log::warn!("Record is incomplete: {:?}", run.record.validity);
    }
    Ok(())
}
