// src/processing/mod.rs
pub mod algebra;
pub mod cloud_mask;
pub mod composite;
pub mod indices;
pub mod pipeline;
pub mod radiometric;
pub mod stats;

// Re-export main components
pub use cloud_mask::CloudMask;
pub use composite::{CollectionCompositor, ExportedComposite};
pub use indices::IndexEngine;
pub use pipeline::Pipeline;
pub use radiometric::RadiometricCorrector;
