// src/io/mod.rs
//! Scene loading and GeoTIFF export.
//!
//! Scene manifests and export preparation are plain Rust; the readers and writers
//! need the `gdal` feature.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processing::ExportedComposite;
use crate::raster::{AreaOfInterest, Image};

pub mod manifest;
#[cfg(feature = "gdal")]
pub mod reader;
#[cfg(feature = "gdal")]
pub mod writer;

pub use manifest::{SceneEntry, SceneManifest};
#[cfg(feature = "gdal")]
pub use reader::{load_scenes, read_scene};
#[cfg(feature = "gdal")]
pub use writer::write_composite;

/// Written to every masked pixel of an exported band.
pub const NODATA_VALUE: f32 = -999.0;

fn default_max_pixels() -> f64 {
    1e13
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

/// Output settings for a composite GeoTIFF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Output pixel size; must equal the grid's native size when set
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: f64,
    #[serde(default = "default_compress")]
    pub compress: String,
    #[serde(default = "default_compress_level")]
    pub compress_level: u8,
    #[serde(default = "default_true")]
    pub tiled: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            scale: None,
            max_pixels: default_max_pixels(),
            compress: default_compress(),
            compress_level: default_compress_level(),
            tiled: default_true(),
        }
    }
}

/// Crop the composite to the AOI bounding window and check the export limits.
pub fn prepare_export(
    composite: &ExportedComposite,
    aoi: &AreaOfInterest,
    options: &ExportOptions,
) -> Result<Image> {
    let image = composite.image();
    let grid = image.grid();

    if let Some(scale) = options.scale {
        let (px, py) = grid.pixel_size();
        let tolerance = scale.abs() * 1e-6;
        if (px - scale).abs() > tolerance || (py - scale).abs() > tolerance {
            return Err(Error::Export(format!(
                "requested scale {} differs from the native pixel size {}x{}; resampling is not supported",
                scale, px, py
            )));
        }
    }

    let window = grid.window(&aoi.bbox()).ok_or_else(|| {
        Error::Export(format!("area of interest does not overlap grid {}", grid))
    })?;
    let pixels = (window.rows * window.cols) as f64;
    if pixels > options.max_pixels {
        return Err(Error::Export(format!(
            "{} pixels exceed the limit of {}",
            pixels, options.max_pixels
        )));
    }

    Ok(image.crop(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::CollectionCompositor;
    use crate::raster::{BandData, GridSpec, ImageCollection};
    use chrono::{TimeZone, Utc};
    use geo::Rect;
    use ndarray::Array2;

    fn composite(aoi: &AreaOfInterest) -> ExportedComposite {
        let image = Image::new(
            "s",
            Utc.with_ymd_and_hms(2023, 8, 1, 0, 0, 0).unwrap(),
            GridSpec::north_up(0.0, 40.0, 10.0, 4, 4),
        )
        .with_band("B", BandData::F32(Array2::from_elem((4, 4), Some(0.3))))
        .unwrap();
        CollectionCompositor::new(vec!["B".to_string()], aoi.clone())
            .composite(&ImageCollection::from_images(vec![image]))
            .unwrap()
    }

    #[test]
    fn test_crop_to_aoi_window() {
        let aoi = AreaOfInterest::from_rect(Rect::new((10.0, 10.0), (30.0, 30.0)));
        let cropped = prepare_export(&composite(&aoi), &aoi, &ExportOptions::default()).unwrap();
        assert_eq!(cropped.grid().shape(), (2, 2));
        assert_eq!(cropped.grid().geo_transform[0], 10.0);
        assert_eq!(cropped.grid().geo_transform[3], 30.0);
        assert_eq!(cropped.band("B").unwrap().valid_count(), 4);
    }

    #[test]
    fn test_export_limits() {
        let aoi = AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (40.0, 40.0)));
        let composite = composite(&aoi);

        let resampled = ExportOptions {
            scale: Some(30.0),
            ..ExportOptions::default()
        };
        assert!(matches!(
            prepare_export(&composite, &aoi, &resampled),
            Err(Error::Export(_))
        ));

        let native = ExportOptions {
            scale: Some(10.0),
            ..ExportOptions::default()
        };
        assert!(prepare_export(&composite, &aoi, &native).is_ok());

        let tiny = ExportOptions {
            max_pixels: 15.0,
            ..ExportOptions::default()
        };
        assert!(matches!(
            prepare_export(&composite, &aoi, &tiny),
            Err(Error::Export(_))
        ));
    }
}
