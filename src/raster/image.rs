// src/raster/image.rs
use chrono::{DateTime, Utc};
use itertools::Itertools;
use ndarray::Array2;

use super::band::{Band, BandData};
use super::grid::{GridSpec, PixelWindow};
use crate::error::{Error, Result};

/// One acquisition: an ordered list of bands on a shared grid.
///
/// Images are never modified in place. Every transform returns a new image
/// that shares the untouched bands with its source.
#[derive(Debug, Clone)]
pub struct Image {
    id: String,
    acquired: DateTime<Utc>,
    cloud_cover: Option<f64>,
    grid: GridSpec,
    bands: Vec<Band>,
}

impl Image {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, grid: GridSpec) -> Self {
        Self {
            id: id.into(),
            acquired,
            cloud_cover: None,
            grid,
            bands: Vec::new(),
        }
    }

    pub fn with_cloud_cover(mut self, cloud_cover: f64) -> Self {
        self.cloud_cover = Some(cloud_cover);
        self
    }

    /// Builder variant of [`Image::add_bands`] for assembling source images.
    pub fn with_band(self, name: impl Into<String>, data: BandData) -> Result<Self> {
        self.add_bands(vec![Band::new(name, data)], false)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn acquired(&self) -> DateTime<Utc> {
        self.acquired
    }

    pub fn cloud_cover(&self) -> Option<f64> {
        self.cloud_cover
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(Band::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name() == name)
    }

    pub fn band(&self, name: &str) -> Result<&BandData> {
        self.get(name)
            .map(Band::data)
            .ok_or_else(|| Error::MissingBand {
                band: name.to_string(),
                image: self.id.clone(),
            })
    }

    fn check_shape(&self, name: &str, data: &BandData) -> Result<()> {
        if data.shape() != self.grid.shape() {
            let (rows, cols) = data.shape();
            return Err(Error::GridMismatch {
                expected: self.grid.to_string(),
                actual: format!("band '{}' of {}x{} pixels", name, cols, rows),
            });
        }
        Ok(())
    }

    /// New image with `bands` appended.
    ///
    /// A band whose name already exists replaces the old one in place when
    /// `overwrite` is set; otherwise it is a configuration error.
    pub fn add_bands(&self, bands: Vec<Band>, overwrite: bool) -> Result<Image> {
        let mut out = self.clone();
        for band in bands {
            out.check_shape(band.name(), band.data())?;
            match out.bands.iter().position(|b| b.name() == band.name()) {
                Some(idx) if overwrite => out.bands[idx] = band,
                Some(_) => {
                    return Err(Error::Configuration(format!(
                        "band '{}' already exists in image '{}'",
                        band.name(),
                        self.id
                    )))
                }
                None => out.bands.push(band),
            }
        }
        Ok(out)
    }

    /// New image holding exactly `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Image> {
        let duplicates: Vec<&str> = names.iter().map(|n| n.as_ref()).duplicates().collect();
        if !duplicates.is_empty() {
            return Err(Error::Configuration(format!(
                "duplicate band names in selection: {}",
                duplicates.iter().join(", ")
            )));
        }

        let bands = names
            .iter()
            .map(|name| {
                self.get(name.as_ref()).cloned().ok_or_else(|| Error::MissingBand {
                    band: name.as_ref().to_string(),
                    image: self.id.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Image {
            bands,
            ..self.clone_meta()
        })
    }

    /// New image where every band is no-data wherever `mask` is false.
    pub fn update_mask(&self, mask: &Array2<bool>) -> Result<Image> {
        if mask.dim() != self.grid.shape() {
            let (rows, cols) = mask.dim();
            return Err(Error::GridMismatch {
                expected: self.grid.to_string(),
                actual: format!("mask of {}x{} pixels", cols, rows),
            });
        }

        let bands = self
            .bands
            .iter()
            .map(|b| Band::new(b.name(), b.data().masked(mask)))
            .collect();

        Ok(Image {
            bands,
            ..self.clone_meta()
        })
    }

    /// Sub-image covering `window` only.
    pub fn crop(&self, window: PixelWindow) -> Image {
        let bands = self
            .bands
            .iter()
            .map(|b| Band::new(b.name(), b.data().window(window)))
            .collect();

        Image {
            grid: self.grid.subgrid(window),
            bands,
            ..self.clone_meta()
        }
    }

    fn clone_meta(&self) -> Image {
        Image {
            id: self.id.clone(),
            acquired: self.acquired,
            cloud_cover: self.cloud_cover,
            grid: self.grid,
            bands: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn test_image() -> Image {
        let grid = GridSpec::north_up(0.0, 20.0, 10.0, 2, 2);
        Image::new("scene", Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap(), grid)
            .with_band("A", BandData::U16(array![[Some(1), Some(2)], [Some(3), Some(4)]]))
            .unwrap()
            .with_band("B", BandData::F32(array![[Some(0.1), None], [Some(0.3), Some(0.4)]]))
            .unwrap()
    }

    #[test]
    fn test_add_bands_shares_untouched_bands() {
        let image = test_image();
        let extra = Band::new("C", BandData::F32(Array2::from_elem((2, 2), Some(1.0))));
        let derived = image.add_bands(vec![extra], false).unwrap();

        assert_eq!(derived.band_names(), vec!["A", "B", "C"]);
        // Unchanged bands are shared, not copied.
        assert!(std::ptr::eq(derived.band("A").unwrap(), image.band("A").unwrap()));
        assert_eq!(image.band_names(), vec!["A", "B"]);
    }

    #[test]
    fn test_add_bands_overwrite_keeps_position() {
        let image = test_image();
        let replacement = Band::new("A", BandData::F32(Array2::from_elem((2, 2), Some(9.0))));

        assert!(image.add_bands(vec![replacement.clone()], false).is_err());

        let replaced = image.add_bands(vec![replacement], true).unwrap();
        assert_eq!(replaced.band_names(), vec!["A", "B"]);
        assert_eq!(replaced.band("A").unwrap().get_f64(0, 0), Some(9.0));
    }

    #[test]
    fn test_band_shape_is_checked() {
        let image = test_image();
        let wrong = Band::new("C", BandData::F32(Array2::from_elem((3, 2), None)));
        assert!(matches!(
            image.add_bands(vec![wrong], false),
            Err(Error::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_select_order_and_missing() {
        let image = test_image();
        let selected = image.select(&["B", "A"]).unwrap();
        assert_eq!(selected.band_names(), vec!["B", "A"]);

        assert!(matches!(
            image.select(&["A", "Z"]),
            Err(Error::MissingBand { .. })
        ));
        assert!(matches!(
            image.select(&["A", "A"]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_update_mask_and_crop() {
        let image = test_image();
        let masked = image.update_mask(&array![[true, false], [true, true]]).unwrap();
        assert_eq!(masked.band("A").unwrap().get_f64(0, 1), None);
        assert_eq!(masked.band("A").unwrap().get_f64(1, 1), Some(4.0));

        let cropped = image.crop(PixelWindow {
            row: 1,
            col: 0,
            rows: 1,
            cols: 2,
        });
        assert_eq!(cropped.grid().shape(), (1, 2));
        assert_eq!(cropped.band("A").unwrap().get_f64(0, 1), Some(4.0));
        assert_eq!(cropped.grid().geo_transform[3], 10.0);
    }
}
