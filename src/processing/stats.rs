// src/processing/stats.rs
//! Region statistics and pre-export checks.

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::SensorProfile;
use crate::error::Result;
use crate::processing::composite::ExportedComposite;
use crate::processing::indices::SpectralIndex;
use crate::raster::{AreaOfInterest, BandData, Image, PixelType};

/// Valid-pixel range of one band
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandRange {
    pub band: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

fn band_range(name: &str, data: &BandData, region: Option<&Array2<bool>>) -> BandRange {
    let (rows, cols) = data.shape();
    let (min, max, count) = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut acc = (f64::INFINITY, f64::NEG_INFINITY, 0usize);
            for col in 0..cols {
                if region.is_some_and(|r| !r[[row, col]]) {
                    continue;
                }
                if let Some(v) = data.get_f64(row, col) {
                    acc = (acc.0.min(v), acc.1.max(v), acc.2 + 1);
                }
            }
            acc
        })
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY, 0),
            |a, b| (a.0.min(b.0), a.1.max(b.1), a.2 + b.2),
        );

    BandRange {
        band: name.to_string(),
        min: (count > 0).then_some(min),
        max: (count > 0).then_some(max),
        count,
    }
}

/// Minimum and maximum of each band over the valid pixels inside `aoi`.
pub fn min_max<S: AsRef<str>>(
    image: &Image,
    bands: &[S],
    aoi: Option<&AreaOfInterest>,
) -> Result<Vec<BandRange>> {
    let region = aoi.map(|a| a.clip_mask(image.grid()));
    bands
        .iter()
        .map(|name| {
            let data = image.band(name.as_ref())?;
            Ok(band_range(name.as_ref(), data, region.as_ref()))
        })
        .collect()
}

pub fn band_types(image: &Image) -> Vec<(String, PixelType)> {
    image
        .bands()
        .iter()
        .map(|b| (b.name().to_string(), b.data().pixel_type()))
        .collect()
}

/// Findings of [`validate_composite`]; empty `issues` means export-ready.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub ranges: Vec<BandRange>,
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

const RANGE_TOLERANCE: f64 = 1e-6;

/// Checks band order and types, non-negative reflectance and
/// normalized-difference indices within [-1, 1].
pub fn validate_composite(
    composite: &ExportedComposite,
    profile: &SensorProfile,
) -> Result<ValidationReport> {
    let image = composite.image();
    let catalog = profile.catalog();
    let mut issues = Vec::new();

    if image.band_names() != catalog {
        issues.push(format!(
            "band order {:?} differs from catalog {:?}",
            image.band_names(),
            catalog
        ));
    }

    for (name, pixel_type) in band_types(image) {
        if pixel_type != PixelType::F32 {
            issues.push(format!("band {} is {}, expected float", name, pixel_type));
        }
    }

    let present: Vec<&str> = catalog
        .iter()
        .map(String::as_str)
        .filter(|name| image.get(name).is_some())
        .collect();
    let ranges = min_max(image, &present, None)?;

    for range in &ranges {
        let is_physical = profile.physical_bands.iter().any(|b| *b == range.band);
        let is_normalized = SpectralIndex::ALL
            .iter()
            .any(|i| i.normalized_pair().is_some() && i.name() == range.band);

        if let Some(min) = range.min {
            if is_physical && min < 0.0 {
                issues.push(format!("{} has negative reflectance {}", range.band, min));
            }
            if is_normalized && min < -1.0 - RANGE_TOLERANCE {
                issues.push(format!("{} below -1: {}", range.band, min));
            }
        }
        if let Some(max) = range.max {
            if is_normalized && max > 1.0 + RANGE_TOLERANCE {
                issues.push(format!("{} above 1: {}", range.band, max));
            }
        }
    }

    for issue in &issues {
        log::warn!("Composite check: {}", issue);
    }

    Ok(ValidationReport { ranges, issues })
}
