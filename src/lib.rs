// src/lib.rs
//! Cloud-masked median composites of Landsat-8 and Sentinel-2 surface
//! reflectance, with spectral indices computed per scene.

pub mod batch;
pub mod config;
pub mod error;
pub mod io;
pub mod processing;
pub mod raster;

pub use error::{Error, Result};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
