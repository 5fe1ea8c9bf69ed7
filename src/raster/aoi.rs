// src/raster/aoi.rs
use std::fs;
use std::path::Path;

use geo::{
    Area, BoundingRect, Contains, GeodesicArea, Geometry, Intersects, MultiPolygon, Point,
    Polygon, Rect,
};
use geojson::GeoJson;
use ndarray::Array2;

use super::grid::GridSpec;
use crate::error::{Error, Result};

/// Analysis region, in the same coordinate system as the image grids.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    geometry: MultiPolygon<f64>,
    bbox: Rect<f64>,
}

/// Polygons of one geometry; other geometry types carry no area and are skipped.
fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => out.push(polygon),
        Geometry::MultiPolygon(multi) => out.extend(multi),
        Geometry::Rect(rect) => out.push(rect.to_polygon()),
        Geometry::Triangle(triangle) => out.push(triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => {
            for inner in collection {
                collect_polygons(inner, out);
            }
        }
        other => log::warn!("Ignoring non-areal AOI geometry {:?}", other),
    }
}

fn geojson_geometries(doc: GeoJson) -> Vec<geojson::Geometry> {
    match doc {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|feature| feature.geometry)
            .collect(),
    }
}

impl AreaOfInterest {
    pub fn new(geometry: MultiPolygon<f64>) -> Result<Self> {
        let bbox = geometry.bounding_rect().ok_or_else(|| {
            Error::Configuration("area of interest has no coordinates".to_string())
        })?;
        Ok(Self { geometry, bbox })
    }

    pub fn from_polygon(polygon: Polygon<f64>) -> Result<Self> {
        Self::new(MultiPolygon::new(vec![polygon]))
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            geometry: MultiPolygon::new(vec![rect.to_polygon()]),
            bbox: rect,
        }
    }

    /// Parse the polygons of a GeoJSON geometry, feature or feature collection.
    ///
    /// Features without a geometry are skipped and altitudes are dropped.
    pub fn from_geojson(text: &str) -> Result<Self> {
        let doc: GeoJson = text.parse()?;
        let mut polygons = Vec::new();
        for geometry in geojson_geometries(doc) {
            collect_polygons(Geometry::<f64>::try_from(geometry.value)?, &mut polygons);
        }
        Self::new(MultiPolygon::new(polygons))
    }

    pub fn from_geojson_file(path: &Path) -> Result<Self> {
        Self::from_geojson(&fs::read_to_string(path)?)
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bbox(&self) -> Rect<f64> {
        self.bbox
    }

    /// True if the grid's footprint touches the region.
    pub fn intersects_grid(&self, grid: &GridSpec) -> bool {
        let footprint = grid.footprint();
        self.bbox.intersects(&footprint) && self.geometry.intersects(&footprint.to_polygon())
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&Point::new(x, y))
    }

    /// Per-pixel mask, true where the pixel centre lies inside the region.
    pub fn clip_mask(&self, grid: &GridSpec) -> Array2<bool> {
        Array2::from_shape_fn(grid.shape(), |(row, col)| {
            let (x, y) = grid.pixel_center(row, col);
            x >= self.bbox.min().x
                && x <= self.bbox.max().x
                && y >= self.bbox.min().y
                && y <= self.bbox.max().y
                && self.contains_point(x, y)
        })
    }

    /// Area in hectares for lon/lat coordinates, on the WGS84 ellipsoid.
    pub fn geodesic_area_hectares(&self) -> f64 {
        self.geometry.geodesic_area_unsigned() / 10_000.0
    }

    /// Area in hectares for projected coordinates in metres.
    pub fn planar_area_hectares(&self) -> f64 {
        self.geometry.unsigned_area() / 10_000.0
    }

    /// Geodesic area when the coordinates fit lon/lat bounds, planar otherwise.
    pub fn area_hectares(&self) -> f64 {
        let (min, max) = (self.bbox.min(), self.bbox.max());
        let geographic = min.x >= -180.0 && max.x <= 180.0 && min.y >= -90.0 && max.y <= 90.0;
        if geographic {
            self.geodesic_area_hectares()
        } else {
            self.planar_area_hectares()
        }
    }
}
