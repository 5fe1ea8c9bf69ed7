// src/processing/composite.rs
use chrono::{DateTime, Utc};
use ndarray::{Array2, Zip};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::raster::{AreaOfInterest, Band, BandData, Image, ImageCollection};

/// Median composite ready for export, with its temporal provenance.
#[derive(Debug, Clone)]
pub struct ExportedComposite {
    image: Image,
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    source_ids: Vec<String>,
    observation_count: Array2<u16>,
}

impl ExportedComposite {
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Earliest acquisition that went into the composite
    pub fn time_start(&self) -> DateTime<Utc> {
        self.time_start
    }

    /// Latest acquisition that went into the composite
    pub fn time_end(&self) -> DateTime<Utc> {
        self.time_end
    }

    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    /// Per pixel, the largest number of valid samples any band had.
    pub fn observation_count(&self) -> &Array2<u16> {
        &self.observation_count
    }
}

/// Reduces a processed collection to one image by per-pixel median.
#[derive(Debug, Clone)]
pub struct CollectionCompositor {
    bands: Vec<String>,
    aoi: AreaOfInterest,
    min_observations: usize,
}

impl CollectionCompositor {
    pub fn new(bands: Vec<String>, aoi: AreaOfInterest) -> Self {
        Self {
            bands,
            aoi,
            min_observations: 1,
        }
    }

    /// Pixels with fewer valid samples than `min_observations` become no-data.
    pub fn with_min_observations(mut self, min_observations: usize) -> Self {
        self.min_observations = min_observations.max(1);
        self
    }

    pub fn composite(&self, collection: &ImageCollection) -> Result<ExportedComposite> {
        let (time_start, time_end) = collection.time_range().ok_or_else(|| {
            Error::EmptyCollection("the collection has no images to composite".to_string())
        })?;

        let images = collection.images();
        let grid = *images[0].grid();
        if let Some(other) = images.iter().find(|img| !img.grid().is_aligned_with(&grid)) {
            return Err(Error::GridMismatch {
                expected: grid.to_string(),
                actual: format!("{} in image '{}'", other.grid(), other.id()),
            });
        }

        let shape = grid.shape();
        let mut observation_count = Array2::<u16>::zeros(shape);
        let mut bands = Vec::with_capacity(self.bands.len());

        for name in &self.bands {
            let samples = images
                .iter()
                .map(|img| img.band(name))
                .collect::<Result<Vec<_>>>()?;

            let (values, counts) = median_reduce(&samples, shape, self.min_observations);
            Zip::from(&mut observation_count)
                .and(&counts)
                .for_each(|total, &n| *total = (*total).max(n));
            bands.push(Band::new(name.as_str(), BandData::F32(values)));
        }

        let id = format!(
            "composite_{}_{}",
            time_start.format("%Y%m%d"),
            time_end.format("%Y%m%d")
        );
        let image = Image::new(id, time_start, grid).add_bands(bands, false)?;
        let clip = self.aoi.clip_mask(&grid);
        let image = image.update_mask(&clip)?;
        Zip::from(&mut observation_count)
            .and(&clip)
            .for_each(|n, &inside| {
                if !inside {
                    *n = 0;
                }
            });

        log::info!(
            "Composited {} images into {} bands ({} .. {})",
            images.len(),
            self.bands.len(),
            time_start,
            time_end
        );

        Ok(ExportedComposite {
            image,
            time_start,
            time_end,
            source_ids: collection.ids(),
            observation_count,
        })
    }
}

/// Median of the valid samples at every pixel, with the sample count.
///
/// Even counts average the two middle values.
pub fn median_reduce(
    samples: &[&BandData],
    shape: (usize, usize),
    min_observations: usize,
) -> (Array2<Option<f32>>, Array2<u16>) {
    let (rows, cols) = shape;
    let mut values = vec![None; rows * cols];
    let mut counts = vec![0u16; rows * cols];

    if !values.is_empty() {
        values
            .par_chunks_mut(cols)
            .zip(counts.par_chunks_mut(cols))
            .enumerate()
            .for_each(|(row, (value_line, count_line))| {
                let mut stack: Vec<f64> = Vec::with_capacity(samples.len());
                for col in 0..cols {
                    stack.clear();
                    stack.extend(samples.iter().filter_map(|s| s.get_f64(row, col)));
                    count_line[col] = stack.len().min(u16::MAX as usize) as u16;
                    if stack.is_empty() || stack.len() < min_observations {
                        continue;
                    }

                    stack.sort_unstable_by(f64::total_cmp);
                    let mid = stack.len() / 2;
                    let median = if stack.len() % 2 == 1 {
                        stack[mid]
                    } else {
                        (stack[mid - 1] + stack[mid]) / 2.0
                    };
                    value_line[col] = Some(median as f32);
                }
            });
    }

    (
        Array2::from_shape_vec(shape, values).unwrap_or_else(|_| Array2::from_elem(shape, None)),
        Array2::from_shape_vec(shape, counts).unwrap_or_else(|_| Array2::zeros(shape)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;
    use chrono::{Datelike, TimeZone};
    use geo::Rect;
    use ndarray::array;

    fn scene(day: u32, values: Array2<Option<f32>>) -> Image {
        let grid = GridSpec::north_up(0.0, 20.0, 10.0, 2, 2);
        Image::new(
            format!("d{}", day),
            Utc.with_ymd_and_hms(2023, 8, day, 0, 0, 0).unwrap(),
            grid,
        )
        .with_band("X", BandData::F32(values))
        .unwrap()
    }

    fn compositor() -> CollectionCompositor {
        CollectionCompositor::new(
            vec!["X".to_string()],
            AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (20.0, 20.0))),
        )
    }

    #[test]
    fn test_median_skips_masked_samples() {
        let collection = ImageCollection::from_images(vec![
            scene(3, array![[Some(1.0), None], [Some(4.0), None]]),
            scene(1, array![[Some(3.0), None], [Some(1.0), Some(7.0)]]),
            scene(2, array![[Some(2.0), None], [None, None]]),
        ]);

        let composite = compositor().composite(&collection).unwrap();
        let x = composite.image().band("X").unwrap().as_f32().unwrap();

        assert_eq!(x[[0, 0]], Some(2.0));
        assert_eq!(x[[0, 1]], None);
        assert_eq!(x[[1, 0]], Some(2.5));
        assert_eq!(x[[1, 1]], Some(7.0));
        assert_eq!(composite.observation_count(), &array![[3u16, 0], [2, 1]]);
        assert_eq!(composite.source_ids(), &["d1", "d2", "d3"]);
        assert_eq!(composite.time_start().day0(), 0);
    }

    #[test]
    fn test_min_observations() {
        let collection = ImageCollection::from_images(vec![
            scene(1, array![[Some(1.0), Some(1.0)], [None, None]]),
            scene(2, array![[Some(5.0), None], [None, None]]),
        ]);

        let composite = compositor()
            .with_min_observations(2)
            .composite(&collection)
            .unwrap();
        let x = composite.image().band("X").unwrap().as_f32().unwrap();
        assert_eq!(x[[0, 0]], Some(3.0));
        assert_eq!(x[[0, 1]], None);
    }

    #[test]
    fn test_clip_to_aoi() {
        let collection = ImageCollection::from_images(vec![scene(
            1,
            Array2::from_elem((2, 2), Some(0.5)),
        )]);
        let half = CollectionCompositor::new(
            vec!["X".to_string()],
            AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (10.0, 20.0))),
        );
        let composite = half.composite(&collection).unwrap();
        let x = composite.image().band("X").unwrap().as_f32().unwrap();
        assert_eq!(x, &array![[Some(0.5), None], [Some(0.5), None]]);
        assert_eq!(composite.observation_count(), &array![[1u16, 0], [1, 0]]);
    }

    #[test]
    fn test_empty_and_misaligned_collections() {
        assert!(matches!(
            compositor().composite(&ImageCollection::default()),
            Err(Error::EmptyCollection(_))
        ));

        let shifted = Image::new(
            "shifted",
            Utc.with_ymd_and_hms(2023, 8, 5, 0, 0, 0).unwrap(),
            GridSpec::north_up(10.0, 20.0, 10.0, 2, 2),
        )
        .with_band("X", BandData::F32(Array2::from_elem((2, 2), Some(1.0))))
        .unwrap();
        let collection = ImageCollection::from_images(vec![
            scene(1, Array2::from_elem((2, 2), Some(1.0))),
            shifted,
        ]);
        assert!(matches!(
            compositor().composite(&collection),
            Err(Error::GridMismatch { .. })
        ));
    }
}
