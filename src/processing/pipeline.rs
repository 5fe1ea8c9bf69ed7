// src/processing/pipeline.rs
use std::time::Instant;

use rayon::prelude::*;

use crate::config::{PipelineConfig, SensorProfile};
use crate::error::{Error, Result};
use crate::processing::cloud_mask::CloudMask;
use crate::processing::composite::{CollectionCompositor, ExportedComposite};
use crate::processing::indices::IndexEngine;
use crate::processing::radiometric::RadiometricCorrector;
use crate::raster::{CollectionFilter, Image, ImageCollection};

/// Filter, mask, correct, index and composite a set of scenes for one sensor.
pub struct Pipeline {
    config: PipelineConfig,
    cloud_mask: CloudMask,
    corrector: RadiometricCorrector,
    indices: IndexEngine,
}

impl Pipeline {
    /// Validates the whole configuration before any image is touched.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let indices = IndexEngine::new(
            &config.sensor.roles,
            config.epsilon,
            config.degenerate_policy,
        )?;

        Ok(Self {
            cloud_mask: CloudMask::from_profile(&config.sensor),
            corrector: RadiometricCorrector::from_profile(&config.sensor),
            indices,
            config,
        })
    }

    pub fn sensor(&self) -> &SensorProfile {
        &self.config.sensor
    }

    /// Mask, then correct, then append the indices.
    pub fn transform(&self, image: &Image) -> Result<Image> {
        let masked = self.cloud_mask.apply(image)?;
        let corrected = self.corrector.apply(&masked)?;
        self.indices.apply(&corrected)
    }

    pub fn run(&self, images: Vec<Image>, filter: &CollectionFilter) -> Result<ExportedComposite> {
        let started = Instant::now();
        let sensor = &self.config.sensor;

        let collection = ImageCollection::filter(images, filter);
        if collection.is_empty() {
            return Err(Error::EmptyCollection(format!(
                "no {} scenes ({}) intersect the area of interest between {} and {} with {} < {}",
                sensor.name,
                sensor.dataset,
                filter.start().date_naive(),
                filter.end().date_naive(),
                sensor.cloud_cover_property,
                filter.max_cloud_cover()
            )));
        }

        let processed = collection
            .images()
            .par_iter()
            .map(|image| self.transform(image))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "Processed {} {} scenes in {:.2?}",
            processed.len(),
            sensor.name,
            started.elapsed()
        );

        let compositor = CollectionCompositor::new(sensor.catalog(), filter.aoi().clone())
            .with_min_observations(self.config.min_observations);
        let composite = compositor.composite(&ImageCollection::from_images(processed))?;

        log::info!("Pipeline finished in {:.2?}", started.elapsed());
        Ok(composite)
    }
}
