// src/config.rs
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processing::algebra::DegeneratePolicy;
use crate::processing::indices::SpectralIndex;

/// Symbolic spectral role a physical band plays in index formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Nir,
    Red,
    Blue,
    Green,
    Swir1,
    Swir2,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Nir,
        Role::Red,
        Role::Blue,
        Role::Green,
        Role::Swir1,
        Role::Swir2,
    ];

    /// Identifier used for this role inside formulas
    pub fn symbol(self) -> &'static str {
        match self {
            Role::Nir => "NIR",
            Role::Red => "RED",
            Role::Blue => "BLUE",
            Role::Green => "GREEN",
            Role::Swir1 => "SWIR1",
            Role::Swir2 => "SWIR2",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Physical band assigned to each role for one sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct BandRoles {
    #[serde(default)]
    pub nir: Option<String>,
    #[serde(default)]
    pub red: Option<String>,
    #[serde(default)]
    pub blue: Option<String>,
    #[serde(default)]
    pub green: Option<String>,
    #[serde(default)]
    pub swir1: Option<String>,
    #[serde(default)]
    pub swir2: Option<String>,
}

impl BandRoles {
    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Nir => self.nir.as_deref(),
            Role::Red => self.red.as_deref(),
            Role::Blue => self.blue.as_deref(),
            Role::Green => self.green.as_deref(),
            Role::Swir1 => self.swir1.as_deref(),
            Role::Swir2 => self.swir2.as_deref(),
        }
    }

    /// Band for `role`, or a configuration error naming the role.
    pub fn require(&self, role: Role) -> Result<&str> {
        self.get(role).ok_or_else(|| {
            Error::Configuration(format!("no band is mapped to role {}", role))
        })
    }
}

/// Everything that differs between sensors: band names, QA bits, scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub name: String,
    /// Catalog identifier of the source dataset
    pub dataset: String,
    pub qa_band: String,
    /// QA bit positions that mark a pixel as contaminated
    pub cloud_bits: Vec<u8>,
    pub scale: f64,
    pub offset: f64,
    /// Sensor bands that get scaled and exported, in export order
    pub physical_bands: Vec<String>,
    pub roles: BandRoles,
    /// Scene property holding the cloud-cover percentage
    pub cloud_cover_property: String,
    /// Native pixel size in metres
    pub pixel_scale: f64,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl SensorProfile {
    /// Landsat-8 Collection 2 Level-2 surface reflectance
    pub fn landsat8() -> Self {
        Self {
            name: "landsat8".to_string(),
            dataset: "LANDSAT/LC08/C02/T1_L2".to_string(),
            qa_band: "QA_PIXEL".to_string(),
            cloud_bits: vec![3, 4],
            scale: 0.0000275,
            offset: -0.2,
            physical_bands: names(&[
                "SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7",
            ]),
            roles: BandRoles {
                nir: Some("SR_B5".to_string()),
                red: Some("SR_B4".to_string()),
                blue: Some("SR_B2".to_string()),
                green: Some("SR_B3".to_string()),
                swir1: Some("SR_B6".to_string()),
                swir2: Some("SR_B7".to_string()),
            },
            cloud_cover_property: "CLOUD_COVER".to_string(),
            pixel_scale: 30.0,
        }
    }

    /// Sentinel-2 harmonized surface reflectance
    pub fn sentinel2() -> Self {
        Self {
            name: "sentinel2".to_string(),
            dataset: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            qa_band: "QA60".to_string(),
            cloud_bits: vec![10, 11],
            scale: 0.0001,
            offset: 0.0,
            physical_bands: names(&[
                "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B9", "B11", "B12",
            ]),
            roles: BandRoles {
                nir: Some("B8".to_string()),
                red: Some("B4".to_string()),
                blue: Some("B2".to_string()),
                green: Some("B3".to_string()),
                swir1: Some("B11".to_string()),
                swir2: Some("B12".to_string()),
            },
            cloud_cover_property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
            pixel_scale: 10.0,
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "landsat8" | "l8" => Ok(Self::landsat8()),
            "sentinel2" | "s2" => Ok(Self::sentinel2()),
            other => Err(Error::Configuration(format!("unknown sensor '{}'", other))),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let profile: SensorProfile = serde_json::from_str(&fs::read_to_string(path)?)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Export band order: physical bands, then the index bands.
    pub fn catalog(&self) -> Vec<String> {
        self.physical_bands
            .iter()
            .cloned()
            .chain(SpectralIndex::ALL.iter().map(|i| i.name().to_string()))
            .collect()
    }

    /// Structural checks that must pass before any imagery is read.
    pub fn validate(&self) -> Result<()> {
        if self.physical_bands.is_empty() {
            return Err(Error::Configuration(format!(
                "sensor '{}' lists no physical bands",
                self.name
            )));
        }

        let catalog = self.catalog();
        let duplicates: Vec<&String> = catalog.iter().duplicates().collect();
        if !duplicates.is_empty() {
            return Err(Error::Configuration(format!(
                "sensor '{}' has duplicate catalog bands: {}",
                self.name,
                duplicates.iter().join(", ")
            )));
        }

        if !self.scale.is_finite() || self.scale == 0.0 || !self.offset.is_finite() {
            return Err(Error::Configuration(format!(
                "sensor '{}' has an invalid scale/offset ({}, {})",
                self.name, self.scale, self.offset
            )));
        }

        if let Some(bit) = self.cloud_bits.iter().find(|b| **b >= 32) {
            return Err(Error::Configuration(format!(
                "sensor '{}' uses QA bit {} which does not fit a 32-bit field",
                self.name, bit
            )));
        }

        let physical: HashSet<&str> = self.physical_bands.iter().map(String::as_str).collect();
        for role in Role::ALL {
            if let Some(band) = self.roles.get(role) {
                if !physical.contains(band) {
                    return Err(Error::Configuration(format!(
                        "role {} of sensor '{}' maps to '{}', which is not a physical band",
                        role, self.name, band
                    )));
                }
            }
        }

        Ok(())
    }
}

fn default_epsilon() -> f64 {
    0.001
}

fn default_min_observations() -> usize {
    1
}

/// Parameters of one compositing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sensor: SensorProfile,
    /// Added to denominators that can legitimately reach zero
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
    /// Valid samples a composite pixel needs; fewer yields no-data
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
}

impl PipelineConfig {
    pub fn new(sensor: SensorProfile) -> Self {
        Self {
            sensor,
            epsilon: default_epsilon(),
            degenerate_policy: DegeneratePolicy::default(),
            min_observations: default_min_observations(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sensor.validate()?;
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(Error::Configuration(format!(
                "epsilon must be a non-negative number, got {}",
                self.epsilon
            )));
        }
        if self.min_observations == 0 {
            return Err(Error::Configuration(
                "min_observations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_sizes() {
        let s2 = SensorProfile::sentinel2().catalog();
        assert_eq!(s2.len(), 21);
        assert_eq!(s2[8], "B8A");
        assert_eq!(s2[12], "NDVI");
        assert_eq!(s2[20], "BATHYMETRY");

        let l8 = SensorProfile::landsat8().catalog();
        assert_eq!(l8.len(), 16);
        assert_eq!(l8[6], "SR_B7");
        assert_eq!(l8[7], "NDVI");
    }

    #[test]
    fn test_builtin_profiles_validate() {
        SensorProfile::landsat8().validate().unwrap();
        SensorProfile::sentinel2().validate().unwrap();
        assert_eq!(SensorProfile::by_name("Sentinel-2").unwrap().qa_band, "QA60");
        assert!(SensorProfile::by_name("modis").is_err());
    }

    #[test]
    fn test_role_outside_physical_bands() {
        let mut profile = SensorProfile::sentinel2();
        profile.roles.swir2 = Some("B10".to_string());
        assert!(matches!(profile.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_pipeline_config_defaults_from_json() {
        let json = r#"{
            "sensor": {
                "name": "custom",
                "dataset": "local",
                "qa_band": "QA",
                "cloud_bits": [1],
                "scale": 0.0001,
                "offset": 0.0,
                "physical_bands": ["BLUE", "GREEN"],
                "roles": { "BLUE": "BLUE", "GREEN": "GREEN" },
                "cloud_cover_property": "CLOUDS",
                "pixel_scale": 20.0
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.epsilon, 0.001);
        assert_eq!(config.min_observations, 1);
        assert_eq!(config.degenerate_policy, DegeneratePolicy::Mask);
        assert_eq!(config.sensor.roles.get(Role::Green), Some("GREEN"));
        assert_eq!(config.sensor.roles.get(Role::Nir), None);
        config.validate().unwrap();
    }
}
