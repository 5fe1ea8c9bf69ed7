// src/io/manifest.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::CollectionFilter;

/// JSON list of scenes and the GeoTIFF holding each of their bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneManifest {
    pub scenes: Vec<SceneEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub acquired: DateTime<Utc>,
    #[serde(default)]
    pub cloud_cover: Option<f64>,
    /// Band name to single-band raster path, relative to the manifest
    pub bands: BTreeMap<String, PathBuf>,
}

impl SceneManifest {
    pub fn from_json(text: &str, base: Option<&Path>) -> Result<Self> {
        let mut manifest: SceneManifest = serde_json::from_str(text)?;
        if let Some(base) = base {
            for scene in &mut manifest.scenes {
                for band_path in scene.bands.values_mut() {
                    if band_path.is_relative() {
                        *band_path = base.join(&*band_path);
                    }
                }
            }
        }
        Ok(manifest)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?, path.parent())
    }

    /// Drop scenes whose date or cloud cover fail the filter.
    ///
    /// The footprint is only known once a scene is read, so it is checked later.
    pub fn retain_matching(&mut self, filter: &CollectionFilter) {
        let total = self.scenes.len();
        self.scenes
            .retain(|scene| filter.accepts_metadata(scene.acquired, scene.cloud_cover));
        log::info!(
            "Manifest prefilter kept {} of {} scenes",
            self.scenes.len(),
            total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::AreaOfInterest;
    use chrono::NaiveDate;
    use geo::Rect;

    const MANIFEST: &str = r#"{
        "scenes": [
            {
                "id": "S2A_20230704",
                "acquired": "2023-07-04T10:20:00Z",
                "cloud_cover": 3.5,
                "bands": { "B4": "S2A_20230704/B4.tif", "B8": "/data/S2A_20230704/B8.tif" }
            },
            {
                "id": "S2B_20230709",
                "acquired": "2023-07-09T10:20:00Z",
                "cloud_cover": 64.0,
                "bands": { "B4": "S2B_20230709/B4.tif" }
            },
            {
                "id": "S2A_20230714",
                "acquired": "2023-07-14T10:20:00Z",
                "bands": { "B4": "S2A_20230714/B4.tif" }
            },
            {
                "id": "S2A_20231002",
                "acquired": "2023-10-02T10:20:00Z",
                "cloud_cover": 1.0,
                "bands": { "B4": "S2A_20231002/B4.tif" }
            }
        ]
    }"#;

    #[test]
    fn test_relative_band_paths() {
        let manifest = SceneManifest::from_json(MANIFEST, Some(Path::new("/scenes"))).unwrap();
        let bands = &manifest.scenes[0].bands;
        assert_eq!(bands["B4"], PathBuf::from("/scenes/S2A_20230704/B4.tif"));
        assert_eq!(bands["B8"], PathBuf::from("/data/S2A_20230704/B8.tif"));
    }

    #[test]
    fn test_retain_matching() {
        let mut manifest = SceneManifest::from_json(MANIFEST, None).unwrap();
        let filter = CollectionFilter::new(
            AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (10.0, 10.0))),
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
            20.0,
        );
        manifest.retain_matching(&filter);

        let ids: Vec<&str> = manifest.scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S2A_20230704"]);
    }
}
