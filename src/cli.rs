// src/cli.rs
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spectral-composite")]
#[command(about = "Cloud-masked median composites with spectral indices for Landsat-8 and Sentinel-2")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads for pixel processing (default: number of CPUs)
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Threads used to read scenes (default: number of CPUs)
    #[arg(long, global = true)]
    pub io_threads: Option<usize>,

    /// Output compression (DEFLATE, ZSTD, LZW or NONE)
    #[arg(long, default_value = "DEFLATE", global = true)]
    pub compress: String,

    /// Compression level
    #[arg(long, default_value = "6", global = true)]
    pub compress_level: u8,

    /// Write striped instead of tiled GeoTIFFs
    #[arg(long, global = true)]
    pub no_tiled: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build one median composite from a scene manifest
    Composite {
        /// Built-in sensor (landsat8 or sentinel2)
        #[arg(short, long, default_value = "sentinel2")]
        sensor: String,

        /// JSON sensor profile, overrides --sensor
        #[arg(long)]
        sensor_file: Option<PathBuf>,

        /// JSON manifest listing the scenes and their band files
        #[arg(short, long)]
        manifest: PathBuf,

        /// GeoJSON area of interest, in the scenes' coordinate system
        #[arg(short, long)]
        aoi: PathBuf,

        /// First acquisition date (inclusive)
        #[arg(long)]
        start: NaiveDate,

        /// Last acquisition date (exclusive)
        #[arg(long)]
        end: NaiveDate,

        /// Maximum scene cloud cover in percent (exclusive)
        #[arg(long, default_value = "20")]
        max_cloud: f64,

        /// Valid samples a pixel needs to be composited
        #[arg(long, default_value = "1")]
        min_observations: usize,

        /// Output pixel size; must match the native resolution
        #[arg(long)]
        scale: Option<f64>,

        /// Abort instead of masking pixels with a zero index denominator
        #[arg(long)]
        fail_on_degenerate: bool,

        /// Output file path
        #[arg(short, long, default_value = "composite.tif")]
        output: PathBuf,
    },

    /// Run composites described in a JSON batch file
    Batch {
        /// Batch configuration file
        config: PathBuf,
    },

    /// Print the exported band list of a sensor
    Catalog {
        /// Built-in sensor (landsat8 or sentinel2)
        #[arg(short, long, default_value = "sentinel2")]
        sensor: String,

        /// JSON sensor profile, overrides --sensor
        #[arg(long)]
        sensor_file: Option<PathBuf>,
    },
}
