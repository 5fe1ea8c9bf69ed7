// src/processing/indices/mod.rs
pub mod expression;
pub mod ndi;

use std::collections::BTreeSet;

use itertools::Itertools;
use rayon::prelude::*;

use crate::config::{BandRoles, Role};
use crate::error::{Error, Result};
use crate::processing::algebra::DegeneratePolicy;
use crate::raster::{Band, Image};

// Re-export calculators
pub use expression::ExpressionIndex;
pub use ndi::NDI;

/// Trait for spectral index calculators
pub trait IndexCalculator: Send + Sync {
    /// Calculate the index band from the image
    fn calculate(&self, image: &Image, policy: DegeneratePolicy) -> Result<Band>;

    /// Physical bands the calculator reads
    fn input_bands(&self) -> Vec<&str>;

    /// Return the name of the index
    fn name(&self) -> &str;
}

/// The fixed catalog of derived bands appended to every image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralIndex {
    Ndvi,
    Mndwi,
    Ndwi,
    Evi,
    Sabi,
    Gndvi,
    Ndavi,
    Awei,
    Bathymetry,
}

impl SpectralIndex {
    /// Catalog order, which is also the export order.
    pub const ALL: [SpectralIndex; 9] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Mndwi,
        SpectralIndex::Ndwi,
        SpectralIndex::Evi,
        SpectralIndex::Sabi,
        SpectralIndex::Gndvi,
        SpectralIndex::Ndavi,
        SpectralIndex::Awei,
        SpectralIndex::Bathymetry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Mndwi => "MNDWI",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Evi => "EVI",
            SpectralIndex::Sabi => "SABI",
            SpectralIndex::Gndvi => "GNDVI",
            SpectralIndex::Ndavi => "NDAVI",
            SpectralIndex::Awei => "AWEI",
            SpectralIndex::Bathymetry => "BATHYMETRY",
        }
    }

    pub fn formula(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "(NIR - RED) / (NIR + RED)",
            SpectralIndex::Mndwi => "(GREEN - SWIR1) / (GREEN + SWIR1)",
            SpectralIndex::Ndwi => "(GREEN - NIR) / (GREEN + NIR)",
            SpectralIndex::Evi => "2.5 * ((NIR - RED) / (NIR + 6 * RED - 7.5 * BLUE + 1))",
            SpectralIndex::Sabi => "(NIR - RED) / (BLUE + GREEN + eps)",
            SpectralIndex::Gndvi => "(NIR - GREEN) / (NIR + GREEN)",
            SpectralIndex::Ndavi => "(NIR - BLUE) / (NIR + BLUE)",
            SpectralIndex::Awei => "4 * (GREEN - SWIR1) - (0.25 * NIR + 2.75 * SWIR2)",
            SpectralIndex::Bathymetry => "BLUE / (GREEN + eps)",
        }
    }

    /// The two roles of a normalized difference index, first minus second.
    pub fn normalized_pair(self) -> Option<(Role, Role)> {
        match self {
            SpectralIndex::Ndvi => Some((Role::Nir, Role::Red)),
            SpectralIndex::Mndwi => Some((Role::Green, Role::Swir1)),
            SpectralIndex::Ndwi => Some((Role::Green, Role::Nir)),
            SpectralIndex::Gndvi => Some((Role::Nir, Role::Green)),
            SpectralIndex::Ndavi => Some((Role::Nir, Role::Blue)),
            _ => None,
        }
    }

    pub fn required_roles(self) -> &'static [Role] {
        match self {
            SpectralIndex::Ndvi => &[Role::Nir, Role::Red],
            SpectralIndex::Mndwi => &[Role::Green, Role::Swir1],
            SpectralIndex::Ndwi => &[Role::Green, Role::Nir],
            SpectralIndex::Evi => &[Role::Nir, Role::Red, Role::Blue],
            SpectralIndex::Sabi => &[Role::Nir, Role::Red, Role::Blue, Role::Green],
            SpectralIndex::Gndvi => &[Role::Nir, Role::Green],
            SpectralIndex::Ndavi => &[Role::Nir, Role::Blue],
            SpectralIndex::Awei => &[Role::Green, Role::Swir1, Role::Nir, Role::Swir2],
            SpectralIndex::Bathymetry => &[Role::Blue, Role::Green],
        }
    }

    fn calculator(
        self,
        roles: &BandRoles,
        epsilon: f64,
    ) -> Result<Box<dyn IndexCalculator>> {
        let name = self.name().to_string();
        match self.normalized_pair() {
            Some((a, b)) => Ok(Box::new(NDI::new(
                roles.require(a)?,
                roles.require(b)?,
                Some(name),
            ))),
            None => Ok(Box::new(ExpressionIndex::new(
                self.formula(),
                roles,
                epsilon,
                &name,
            )?)),
        }
    }
}

/// Appends the nine catalog indices to corrected images.
pub struct IndexEngine {
    calculators: Vec<Box<dyn IndexCalculator>>,
    policy: DegeneratePolicy,
}

impl IndexEngine {
    /// Checks the role mapping and prepares every calculator up front, so a
    /// bad configuration fails before any image is processed.
    pub fn new(roles: &BandRoles, epsilon: f64, policy: DegeneratePolicy) -> Result<Self> {
        let missing: BTreeSet<Role> = SpectralIndex::ALL
            .iter()
            .flat_map(|index| index.required_roles().iter().copied())
            .filter(|role| roles.get(*role).is_none())
            .collect();

        if !missing.is_empty() {
            let affected = SpectralIndex::ALL
                .iter()
                .filter(|index| index.required_roles().iter().any(|r| missing.contains(r)))
                .map(|index| index.name())
                .join(", ");
            return Err(Error::Configuration(format!(
                "missing band role mapping for {} (needed by {})",
                missing.iter().join(", "),
                affected
            )));
        }

        let calculators = SpectralIndex::ALL
            .iter()
            .map(|index| index.calculator(roles, epsilon))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            calculators,
            policy,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.calculators.iter().map(|c| c.name()).collect()
    }

    /// Union of the bands read by all calculators, sorted by name.
    pub fn input_bands(&self) -> BTreeSet<&str> {
        self.calculators
            .iter()
            .flat_map(|c| c.input_bands())
            .collect()
    }

    /// New image with every index band appended (replacing same-named bands).
    ///
    /// The first absent input band, by name, is reported before any index runs.
    pub fn apply(&self, image: &Image) -> Result<Image> {
        if let Some(band) = self
            .input_bands()
            .into_iter()
            .find(|band| image.get(band).is_none())
        {
            return Err(Error::MissingBand {
                band: band.to_string(),
                image: image.id().to_string(),
            });
        }

        let bands = self
            .calculators
            .par_iter()
            .map(|calculator| calculator.calculate(image, self.policy))
            .collect::<Result<Vec<_>>>()?;

        log::debug!("{}: computed {} index bands", image.id(), bands.len());
        image.add_bands(bands, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorProfile;

    #[test]
    fn test_formulas_parse_and_match_roles() {
        use crate::processing::algebra::Expression;

        for index in SpectralIndex::ALL {
            let expr = Expression::parse(index.formula()).unwrap();
            let mut from_formula: Vec<&str> =
                expr.symbols().into_iter().filter(|s| *s != "eps").collect();
            let mut declared: Vec<&str> = index.required_roles().iter().map(|r| r.symbol()).collect();
            from_formula.sort_unstable();
            declared.sort_unstable();
            assert_eq!(from_formula, declared, "{}", index.name());
        }
    }

    #[test]
    fn test_engine_orders_indices() {
        let engine = IndexEngine::new(
            &SensorProfile::landsat8().roles,
            0.001,
            DegeneratePolicy::Mask,
        )
        .unwrap();
        assert_eq!(
            engine.names(),
            vec!["NDVI", "MNDWI", "NDWI", "EVI", "SABI", "GNDVI", "NDAVI", "AWEI", "BATHYMETRY"]
        );
    }

    #[test]
    fn test_missing_role_fails_fast() {
        let mut roles = SensorProfile::sentinel2().roles;
        roles.swir2 = None;
        let err = IndexEngine::new(&roles, 0.001, DegeneratePolicy::Mask)
            .err()
            .unwrap();
        match err {
            Error::Configuration(msg) => {
                assert!(msg.contains("SWIR2"), "{}", msg);
                assert!(msg.contains("AWEI"), "{}", msg);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_calculator_inputs_follow_roles() {
        let roles = SensorProfile::sentinel2().roles;
        let evi = SpectralIndex::Evi.calculator(&roles, 0.001).unwrap();
        assert_eq!(evi.input_bands(), vec!["B2", "B4", "B8"]);

        let ndwi = SpectralIndex::Ndwi.calculator(&roles, 0.001).unwrap();
        assert_eq!(ndwi.input_bands(), vec!["B3", "B8"]);

        let engine = IndexEngine::new(&roles, 0.001, DegeneratePolicy::Mask).unwrap();
        assert_eq!(
            engine.input_bands().into_iter().collect::<Vec<_>>(),
            vec!["B11", "B12", "B2", "B3", "B4", "B8"]
        );
    }

    #[test]
    fn test_first_missing_input_is_reported() {
        use crate::raster::{BandData, GridSpec};
        use chrono::{TimeZone, Utc};
        use ndarray::Array2;

        let roles = SensorProfile::sentinel2().roles;
        let engine = IndexEngine::new(&roles, 0.001, DegeneratePolicy::Mask).unwrap();
        let mut image = Image::new(
            "S2_partial",
            Utc.with_ymd_and_hms(2023, 7, 4, 10, 0, 0).unwrap(),
            GridSpec::north_up(0.0, 20.0, 10.0, 2, 2),
        );
        for band in ["B2", "B3", "B4", "B8"] {
            let values = Array2::from_elem((2, 2), Some(0.1_f32));
            image = image.with_band(band, BandData::F32(values)).unwrap();
        }

        for _ in 0..4 {
            match engine.apply(&image) {
                Err(Error::MissingBand { band, image: id }) => {
                    assert_eq!(band, "B11");
                    assert_eq!(id, "S2_partial");
                }
                other => panic!("unexpected result {:?}", other.map(|img| img.id().to_string())),
            }
        }
    }
}
