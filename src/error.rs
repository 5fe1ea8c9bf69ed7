// src/error.rs
use thiserror::Error;

/// Errors raised while building or running a compositing pipeline.
///
/// `Configuration`, `EmptyCollection` and `DegenerateExpression` are fatal to a
/// pipeline run: nothing is exported once one of them is returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no valid imagery: {0}")]
    EmptyCollection(String),

    #[error("degenerate expression in band {band}: {pixels} pixel(s) with a zero denominator")]
    DegenerateExpression { band: String, pixels: usize },

    #[error("band '{band}' not found in image '{image}'")]
    MissingBand { band: String, image: String },

    #[error("grid mismatch: expected {expected}, got {actual}")]
    GridMismatch { expected: String, actual: String },

    #[error("invalid expression '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    #[error("export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

pub type Result<T> = std::result::Result<T, Error>;
