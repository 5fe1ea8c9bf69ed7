// src/raster/mod.rs
pub mod aoi;
pub mod band;
pub mod collection;
pub mod grid;
pub mod image;

pub use aoi::AreaOfInterest;
pub use band::{Band, BandData, PixelType};
pub use collection::{CollectionFilter, ImageCollection};
pub use grid::{GridSpec, PixelWindow};
pub use image::Image;
