// src/raster/band.rs
use std::fmt;
use std::sync::Arc;

use ndarray::{s, Array2, Zip};
use serde::Serialize;

use super::grid::PixelWindow;

/// Storage type of a band's pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    /// Raw digital numbers and QA bitfields
    U16,
    /// Reflectance and derived indices
    F32,
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelType::U16 => write!(f, "uint16"),
            PixelType::F32 => write!(f, "float"),
        }
    }
}

/// Pixel grid of one band. `None` marks a masked (no-data) pixel.
#[derive(Debug, Clone, PartialEq)]
pub enum BandData {
    U16(Array2<Option<u16>>),
    F32(Array2<Option<f32>>),
}

impl BandData {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            BandData::U16(_) => PixelType::U16,
            BandData::F32(_) => PixelType::F32,
        }
    }

    /// Shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            BandData::U16(a) => a.dim(),
            BandData::F32(a) => a.dim(),
        }
    }

    /// Numeric value of a pixel; non-finite floats count as no-data.
    pub fn get_f64(&self, row: usize, col: usize) -> Option<f64> {
        match self {
            BandData::U16(a) => a[[row, col]].map(f64::from),
            BandData::F32(a) => a[[row, col]].filter(|v| v.is_finite()).map(f64::from),
        }
    }

    /// Pixel interpreted as an integer bitfield.
    ///
    /// Float pixels qualify only when they hold a non-negative whole number.
    pub fn get_bits(&self, row: usize, col: usize) -> Option<u32> {
        match self {
            BandData::U16(a) => a[[row, col]].map(u32::from),
            BandData::F32(a) => a[[row, col]]
                .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f32)
                .map(|v| v as u32),
        }
    }

    pub fn as_f32(&self) -> Option<&Array2<Option<f32>>> {
        match self {
            BandData::F32(a) => Some(a),
            BandData::U16(_) => None,
        }
    }

    /// Cast to floating point, dropping non-finite values.
    pub fn to_f32(&self) -> Array2<Option<f32>> {
        match self {
            BandData::U16(a) => a.mapv(|v| v.map(f32::from)),
            BandData::F32(a) => a.mapv(|v| v.filter(|x| x.is_finite())),
        }
    }

    pub fn valid_count(&self) -> usize {
        match self {
            BandData::U16(a) => a.iter().filter(|v| v.is_some()).count(),
            BandData::F32(a) => a.iter().filter(|v| v.is_some()).count(),
        }
    }

    /// Copy with every pixel where `mask` is false set to no-data.
    pub fn masked(&self, mask: &Array2<bool>) -> BandData {
        match self {
            BandData::U16(a) => BandData::U16(
                Zip::from(a)
                    .and(mask)
                    .map_collect(|v, &keep| if keep { *v } else { None }),
            ),
            BandData::F32(a) => BandData::F32(
                Zip::from(a)
                    .and(mask)
                    .map_collect(|v, &keep| if keep { *v } else { None }),
            ),
        }
    }

    pub fn window(&self, window: PixelWindow) -> BandData {
        let rows = window.row..window.row + window.rows;
        let cols = window.col..window.col + window.cols;
        match self {
            BandData::U16(a) => BandData::U16(a.slice(s![rows, cols]).to_owned()),
            BandData::F32(a) => BandData::F32(a.slice(s![rows, cols]).to_owned()),
        }
    }
}

/// Named band. The pixel grid is shared between images derived from one another.
#[derive(Debug, Clone)]
pub struct Band {
    name: String,
    data: Arc<BandData>,
}

impl Band {
    pub fn new(name: impl Into<String>, data: BandData) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &BandData {
        &self.data
    }

    /// Same pixels under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Band {
        Band {
            name: name.into(),
            data: Arc::clone(&self.data),
        }
    }
}
