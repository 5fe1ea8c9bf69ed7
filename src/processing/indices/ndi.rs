// src/processing/indices/ndi.rs
use crate::error::Result;
use crate::processing::algebra::{normalized_difference, DegeneratePolicy};
use crate::processing::indices::IndexCalculator;
use crate::raster::{Band, Image};

/// Normalized Difference Index (NDI) calculator: `(A - B) / (A + B)`
pub struct NDI {
    band_a: String,
    band_b: String,
    name: String,
}

impl NDI {
    pub fn new(band_a: impl Into<String>, band_b: impl Into<String>, name: Option<String>) -> Self {
        Self {
            band_a: band_a.into(),
            band_b: band_b.into(),
            name: name.unwrap_or_else(|| "NDI".to_string()),
        }
    }
}

impl IndexCalculator for NDI {
    fn calculate(&self, image: &Image, policy: DegeneratePolicy) -> Result<Band> {
        normalized_difference(image, &self.band_a, &self.band_b, &self.name, policy)
    }

    fn input_bands(&self) -> Vec<&str> {
        vec![self.band_a.as_str(), self.band_b.as_str()]
    }

    fn name(&self) -> &str {
        &self.name
    }
}
