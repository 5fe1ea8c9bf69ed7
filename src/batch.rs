// src/batch.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, SensorProfile};
use crate::io::ExportOptions;
use crate::processing::algebra::DegeneratePolicy;

#[derive(Deserialize, Serialize, Debug)]
pub struct BatchConfig {
    #[serde(default)]
    pub global: GlobalParams,
    pub jobs: Vec<CompositeJob>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GlobalParams {
    #[serde(default = "default_compress")]
    pub compress: String,
    #[serde(default = "default_compress_level")]
    pub compress_level: u8,
    #[serde(default = "default_true")]
    pub tiled: bool,
    #[serde(default = "default_max_cloud")]
    pub max_cloud: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
    #[serde(default)]
    pub io_threads: Option<usize>,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            compress: default_compress(),
            compress_level: default_compress_level(),
            tiled: default_true(),
            max_cloud: default_max_cloud(),
            epsilon: default_epsilon(),
            min_observations: default_min_observations(),
            degenerate_policy: DegeneratePolicy::default(),
            io_threads: None,
        }
    }
}

fn default_compress() -> String {
    "DEFLATE".to_string()
}

fn default_compress_level() -> u8 {
    6
}

fn default_true() -> bool {
    true
}

fn default_max_cloud() -> f64 {
    20.0
}

fn default_epsilon() -> f64 {
    0.001
}

fn default_min_observations() -> usize {
    1
}

/// One composite to produce. Optional fields override `GlobalParams`.
///
/// `sensor_file`, when set, takes precedence over the built-in `sensor` name.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CompositeJob {
    #[serde(default)]
    pub sensor: String,
    pub sensor_file: Option<PathBuf>,
    pub manifest: PathBuf,
    pub aoi: PathBuf,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output: PathBuf,
    pub max_cloud: Option<f64>,
    pub min_observations: Option<usize>,
    pub scale: Option<f64>,
    pub compress: Option<String>,
    pub compress_level: Option<u8>,
    pub tiled: Option<bool>,
}

impl BatchConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading batch file {}", path.display()))?;
        let config: BatchConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing batch file {}", path.display()))?;
        Ok(config)
    }
}

impl CompositeJob {
    pub fn sensor_profile(&self) -> Result<SensorProfile> {
        Ok(match &self.sensor_file {
            Some(path) => SensorProfile::from_json_file(path)
                .with_context(|| format!("loading sensor profile {}", path.display()))?,
            None => SensorProfile::by_name(&self.sensor)?,
        })
    }

    pub fn pipeline_config(&self, global: &GlobalParams) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            sensor: self.sensor_profile()?,
            epsilon: global.epsilon,
            degenerate_policy: global.degenerate_policy,
            min_observations: self.min_observations.unwrap_or(global.min_observations),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn max_cloud(&self, global: &GlobalParams) -> f64 {
        self.max_cloud.unwrap_or(global.max_cloud)
    }

    /// Label for log lines: the sensor file if given, else the sensor name.
    pub fn sensor_label(&self) -> String {
        match &self.sensor_file {
            Some(path) => path.display().to_string(),
            None => self.sensor.clone(),
        }
    }

    /// Without an explicit `scale`, exports are checked against the sensor's
    /// native pixel size.
    pub fn export_options(&self, global: &GlobalParams, sensor: &SensorProfile) -> ExportOptions {
        ExportOptions {
            scale: self.scale.or(Some(sensor.pixel_scale)),
            compress: self.compress.clone().unwrap_or_else(|| global.compress.clone()),
            compress_level: self.compress_level.unwrap_or(global.compress_level),
            tiled: self.tiled.unwrap_or(global.tiled),
            ..ExportOptions::default()
        }
    }
}

#[cfg(feature = "gdal")]
pub use runner::{process_batch, run_job};

#[cfg(feature = "gdal")]
mod runner {
    use std::path::Path;
    use std::time::Instant;

    use anyhow::{bail, Context, Result};

    use super::{BatchConfig, CompositeJob, GlobalParams};
    use crate::io::{load_scenes, write_composite, SceneManifest};
    use crate::processing::stats::{min_max, validate_composite};
    use crate::processing::{ExportedComposite, Pipeline};
    use crate::raster::{AreaOfInterest, CollectionFilter};

    /// Load, composite, check and write one job.
    pub fn run_job(job: &CompositeJob, global: &GlobalParams) -> Result<ExportedComposite> {
        let pipeline = Pipeline::new(job.pipeline_config(global)?)?;
        let sensor = pipeline.sensor();
        let aoi = AreaOfInterest::from_geojson_file(&job.aoi)
            .with_context(|| format!("loading area of interest {}", job.aoi.display()))?;
        let filter = CollectionFilter::new(aoi.clone(), job.start, job.end, job.max_cloud(global));

        let mut manifest = SceneManifest::from_json_file(&job.manifest)
            .with_context(|| format!("loading manifest {}", job.manifest.display()))?;
        log::info!(
            "{} ({}): {} candidate scenes, AOI of {:.1} ha",
            sensor.name,
            sensor.dataset,
            manifest.scenes.len(),
            aoi.area_hectares()
        );
        manifest.retain_matching(&filter);

        let (images, projection) = load_scenes(&manifest, global.io_threads)?;
        let composite = pipeline.run(images, &filter)?;

        let report = validate_composite(&composite, sensor)?;
        if !report.is_valid() {
            bail!("composite failed checks: {}", report.issues.join("; "));
        }
        for range in min_max(composite.image(), sensor.physical_bands.as_slice(), Some(&aoi))? {
            log::info!(
                "AOI {}: min {:?} max {:?} ({} px)",
                range.band,
                range.min,
                range.max,
                range.count
            );
        }

        let options = job.export_options(global, sensor);
        write_composite(&composite, &aoi, &projection, &job.output, &options)
            .with_context(|| format!("writing {}", job.output.display()))?;
        Ok(composite)
    }

    pub fn process_batch(config_path: &Path) -> Result<()> {
        let config = BatchConfig::from_json_file(config_path)?;
        let started = Instant::now();

        log::info!("Starting batch processing with {} jobs...", config.jobs.len());

        for (i, job) in config.jobs.iter().enumerate() {
            log::info!(
                "[{}/{}] {} -> {}",
                i + 1,
                config.jobs.len(),
                job.sensor_label(),
                job.output.display()
            );
            let composite = run_job(job, &config.global)
                .with_context(|| format!("job {} ({})", i + 1, job.output.display()))?;
            log::info!(
                "[{}/{}] composited {} scenes",
                i + 1,
                config.jobs.len(),
                composite.source_ids().len()
            );
        }

        log::info!("Batch finished in {:.2?}", started.elapsed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"{
        "global": { "compress": "ZSTD", "compress_level": 9, "max_cloud": 10 },
        "jobs": [
            {
                "sensor": "landsat8",
                "manifest": "scenes.json",
                "aoi": "aoi.geojson",
                "start": "2023-07-01",
                "end": "2023-09-30",
                "output": "l8.tif",
                "tiled": false
            },
            {
                "sensor": "sentinel2",
                "manifest": "s2.json",
                "aoi": "aoi.geojson",
                "start": "2023-07-01",
                "end": "2023-09-30",
                "output": "s2.tif",
                "max_cloud": 20,
                "min_observations": 3
            }
        ]
    }"#;

    #[test]
    fn test_batch_overrides() {
        let config: BatchConfig = serde_json::from_str(BATCH).unwrap();
        assert_eq!(config.jobs.len(), 2);
        assert!(config.global.tiled);
        assert_eq!(config.global.epsilon, 0.001);

        let l8 = &config.jobs[0];
        assert_eq!(l8.max_cloud(&config.global), 10.0);
        let options = l8.export_options(&config.global, &SensorProfile::landsat8());
        assert_eq!(options.compress, "ZSTD");
        assert_eq!(options.scale, Some(30.0));
        assert!(!options.tiled);
        assert_eq!(options.max_pixels, 1e13);

        let s2 = &config.jobs[1];
        assert_eq!(s2.max_cloud(&config.global), 20.0);
        let pipeline = s2.pipeline_config(&config.global).unwrap();
        assert_eq!(pipeline.min_observations, 3);
        assert_eq!(pipeline.sensor.qa_band, "QA60");
    }

    #[test]
    fn test_export_defaults_to_native_scale() {
        use crate::io::prepare_export;
        use crate::processing::CollectionCompositor;
        use crate::raster::{AreaOfInterest, BandData, GridSpec, Image, ImageCollection};
        use crate::Error;
        use chrono::{TimeZone, Utc};
        use geo::Rect;
        use ndarray::Array2;

        let config: BatchConfig = serde_json::from_str(BATCH).unwrap();
        let aoi = AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (120.0, 120.0)));
        let landsat_grid = Image::new(
            "LC08_20230712",
            Utc.with_ymd_and_hms(2023, 7, 12, 10, 0, 0).unwrap(),
            GridSpec::north_up(0.0, 120.0, 30.0, 4, 4),
        )
        .with_band("B4", BandData::F32(Array2::from_elem((4, 4), Some(0.08))))
        .unwrap();
        let composite = CollectionCompositor::new(vec!["B4".to_string()], aoi.clone())
            .composite(&ImageCollection::from_images(vec![landsat_grid]))
            .unwrap();

        let s2 = &config.jobs[1];
        let s2_options = s2.export_options(&config.global, &s2.sensor_profile().unwrap());
        assert_eq!(s2_options.scale, Some(10.0));
        assert!(matches!(
            prepare_export(&composite, &aoi, &s2_options),
            Err(Error::Export(_))
        ));

        let l8 = &config.jobs[0];
        let l8_options = l8.export_options(&config.global, &l8.sensor_profile().unwrap());
        assert!(prepare_export(&composite, &aoi, &l8_options).is_ok());

        let explicit = CompositeJob {
            scale: Some(30.0),
            ..s2.clone()
        };
        let options = explicit.export_options(&config.global, &SensorProfile::sentinel2());
        assert!(prepare_export(&composite, &aoi, &options).is_ok());
    }

    #[test]
    fn test_sensor_file_without_sensor_name() {
        let profile_path = std::env::temp_dir().join("spectral_composite_batch_profile.json");
        let mut profile = SensorProfile::sentinel2();
        profile.name = "sentinel2_custom".to_string();
        fs::write(&profile_path, serde_json::to_string(&profile).unwrap()).unwrap();

        let batch = format!(
            r#"{{
                "jobs": [{{
                    "sensor_file": {},
                    "manifest": "s2.json",
                    "aoi": "aoi.geojson",
                    "start": "2023-07-01",
                    "end": "2023-09-30",
                    "output": "custom.tif"
                }}]
            }}"#,
            serde_json::to_string(&profile_path).unwrap()
        );
        let config: BatchConfig = serde_json::from_str(&batch).unwrap();
        let job = &config.jobs[0];
        assert!(job.sensor.is_empty());
        assert_eq!(job.sensor_label(), profile_path.display().to_string());

        let pipeline = job.pipeline_config(&config.global).unwrap();
        assert_eq!(pipeline.sensor.name, "sentinel2_custom");
        fs::remove_file(&profile_path).unwrap();
    }

    #[test]
    fn test_unknown_sensor() {
        let mut config: BatchConfig = serde_json::from_str(BATCH).unwrap();
        config.jobs[0].sensor = "modis".to_string();
        assert!(config.jobs[0].pipeline_config(&config.global).is_err());
    }
}
