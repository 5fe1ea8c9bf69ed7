// src/processing/radiometric.rs
use rayon::prelude::*;

use crate::config::SensorProfile;
use crate::error::Result;
use crate::raster::{Band, BandData, Image};

/// Converts digital numbers to reflectance: `max(value * scale + offset, 0)`.
#[derive(Debug, Clone)]
pub struct RadiometricCorrector {
    scale: f64,
    offset: f64,
    bands: Vec<String>,
}

impl RadiometricCorrector {
    pub fn new(scale: f64, offset: f64, bands: Vec<String>) -> Self {
        Self {
            scale,
            offset,
            bands,
        }
    }

    pub fn from_profile(profile: &SensorProfile) -> Self {
        Self::new(profile.scale, profile.offset, profile.physical_bands.clone())
    }

    /// Scaled and clamped copy of one band. Masked pixels stay masked.
    pub fn correct(&self, data: &BandData) -> BandData {
        let (scale, offset) = (self.scale, self.offset);
        let apply = move |v: f64| -> Option<f32> {
            let scaled = v * scale + offset;
            if scaled.is_finite() {
                Some(scaled.max(0.0) as f32)
            } else {
                None
            }
        };

        BandData::F32(match data {
            BandData::U16(a) => a.mapv(|v| v.and_then(|dn| apply(f64::from(dn)))),
            BandData::F32(a) => a.mapv(|v| {
                v.filter(|x| x.is_finite())
                    .and_then(|x| apply(f64::from(x)))
            }),
        })
    }

    /// New image with every configured band replaced by its reflectance.
    pub fn apply(&self, image: &Image) -> Result<Image> {
        let corrected = self
            .bands
            .par_iter()
            .map(|name| Ok(Band::new(name.as_str(), self.correct(image.band(name)?))))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "{}: scaled {} bands by {} with offset {}",
            image.id(),
            corrected.len(),
            self.scale,
            self.offset
        );
        image.add_bands(corrected, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::array;

    #[test]
    fn test_landsat_scaling_and_clamp() {
        let corrector = RadiometricCorrector::from_profile(&SensorProfile::landsat8());
        // 7000 * 0.0000275 - 0.2 = -0.0075, clamped to zero
        let raw = BandData::U16(array![[Some(7000), Some(20000)], [None, Some(0)]]);
        let out = corrector.correct(&raw);
        let values = out.as_f32().unwrap();

        assert_eq!(values[[0, 0]], Some(0.0));
        assert_relative_eq!(values[[0, 1]].unwrap(), 0.35, epsilon = 1e-6);
        assert_eq!(values[[1, 0]], None);
        assert_eq!(values[[1, 1]], Some(0.0));
    }

    #[test]
    fn test_negative_reflectance_becomes_exact_zero() {
        let corrector = RadiometricCorrector::new(1.0, 0.0, vec!["B1".to_string()]);
        let out = corrector.correct(&BandData::F32(array![[Some(-0.01), Some(f32::NAN)]]));
        assert_eq!(out.as_f32().unwrap()[[0, 0]], Some(0.0));
        assert_eq!(out.as_f32().unwrap()[[0, 1]], None);
    }

    #[test]
    fn test_apply_replaces_only_listed_bands() {
        let grid = GridSpec::north_up(0.0, 1.0, 10.0, 2, 1);
        let image = Image::new("s2", Utc.with_ymd_and_hms(2023, 7, 10, 0, 0, 0).unwrap(), grid)
            .with_band("B2", BandData::U16(array![[Some(1500), Some(12000)]]))
            .unwrap()
            .with_band("QA60", BandData::U16(array![[Some(0), Some(1024)]]))
            .unwrap();

        let corrector = RadiometricCorrector::from_profile(&SensorProfile::sentinel2());
        assert!(corrector.apply(&image).is_err());

        let corrector = RadiometricCorrector::new(0.0001, 0.0, vec!["B2".to_string()]);
        let corrected = corrector.apply(&image).unwrap();
        assert_eq!(corrected.band_names(), vec!["B2", "QA60"]);
        assert_relative_eq!(
            corrected.band("B2").unwrap().get_f64(0, 0).unwrap(),
            0.15,
            epsilon = 1e-6
        );
        assert_eq!(corrected.band("QA60").unwrap().get_f64(0, 1), Some(1024.0));
    }
}
