// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};

mod cli;

use crate::cli::{Cli, Commands};
use spectral_composite::batch::{process_batch, run_job, CompositeJob, GlobalParams};
use spectral_composite::config::SensorProfile;
use spectral_composite::processing::algebra::DegeneratePolicy;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let threads = cli.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("configuring the thread pool")?;
    log::debug!("spectral-composite {} using {} threads", spectral_composite::VERSION, threads);

    match &cli.command {
        Commands::Composite {
            sensor,
            sensor_file,
            manifest,
            aoi,
            start,
            end,
            max_cloud,
            min_observations,
            scale,
            fail_on_degenerate,
            output,
        } => {
            let global = GlobalParams {
                compress: cli.compress.clone(),
                compress_level: cli.compress_level,
                tiled: !cli.no_tiled,
                max_cloud: *max_cloud,
                min_observations: *min_observations,
                degenerate_policy: if *fail_on_degenerate {
                    DegeneratePolicy::Fail
                } else {
                    DegeneratePolicy::Mask
                },
                io_threads: cli.io_threads,
                ..GlobalParams::default()
            };
            let job = CompositeJob {
                sensor: sensor.clone(),
                sensor_file: sensor_file.clone(),
                manifest: manifest.clone(),
                aoi: aoi.clone(),
                start: *start,
                end: *end,
                output: output.clone(),
                max_cloud: None,
                min_observations: None,
                scale: *scale,
                compress: None,
                compress_level: None,
                tiled: None,
            };

            let composite = run_job(&job, &global)?;
            println!(
                "Composite of {} scenes ({} .. {}) written to {}",
                composite.source_ids().len(),
                composite.time_start().date_naive(),
                composite.time_end().date_naive(),
                output.display()
            );
        }
        Commands::Batch { config } => {
            process_batch(config)?;
            println!("Batch processing complete");
        }
        Commands::Catalog {
            sensor,
            sensor_file,
        } => {
            let profile = match sensor_file {
                Some(path) => SensorProfile::from_json_file(path)?,
                None => SensorProfile::by_name(sensor)?,
            };
            println!("{} ({})", profile.name, profile.dataset);
            for (i, band) in profile.catalog().iter().enumerate() {
                println!("{:>2} {}", i + 1, band);
            }
        }
    }

    Ok(())
}
