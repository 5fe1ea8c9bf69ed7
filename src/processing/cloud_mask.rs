// src/processing/cloud_mask.rs
use ndarray::Array2;

use crate::config::SensorProfile;
use crate::error::Result;
use crate::raster::Image;

/// Clear-sky mask from packed QA bits.
#[derive(Debug, Clone)]
pub struct CloudMask {
    qa_band: String,
    bits: Vec<u8>,
}

impl CloudMask {
    pub fn new(qa_band: impl Into<String>, bits: Vec<u8>) -> Self {
        Self {
            qa_band: qa_band.into(),
            bits,
        }
    }

    pub fn from_profile(profile: &SensorProfile) -> Self {
        Self::new(profile.qa_band.clone(), profile.cloud_bits.clone())
    }

    fn bitmask(&self) -> u32 {
        self.bits.iter().fold(0u32, |mask, bit| mask | (1u32 << bit))
    }

    /// True where none of the flagged bits are set.
    ///
    /// Pixels without a QA value are never considered clear.
    pub fn compute(&self, image: &Image) -> Result<Array2<bool>> {
        let qa = image.band(&self.qa_band)?;
        let flags = self.bitmask();
        Ok(Array2::from_shape_fn(qa.shape(), |(row, col)| {
            qa.get_bits(row, col).is_some_and(|value| value & flags == 0)
        }))
    }

    /// The image with every contaminated pixel masked in all bands.
    pub fn apply(&self, image: &Image) -> Result<Image> {
        let mask = self.compute(image)?;
        let clear = mask.iter().filter(|v| **v).count();
        log::debug!(
            "{}: {} of {} pixels clear of bits {:?} in {}",
            image.id(),
            clear,
            mask.len(),
            self.bits,
            self.qa_band
        );
        image.update_mask(&mask)
    }
}
