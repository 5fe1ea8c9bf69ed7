// src/raster/grid.rs
use std::fmt;

use geo::Rect;
use serde::{Deserialize, Serialize};

/// Affine pixel grid shared by every band of an image.
///
/// `geo_transform` uses the GDAL layout:
/// `x = gt[0] + col * gt[1] + row * gt[2]`, `y = gt[3] + col * gt[4] + row * gt[5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub geo_transform: [f64; 6],
    pub width: usize,
    pub height: usize,
}

/// A rectangular block of pixels inside a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn new(geo_transform: [f64; 6], width: usize, height: usize) -> Self {
        Self {
            geo_transform,
            width,
            height,
        }
    }

    /// North-up grid with square pixels, origin at the top-left corner.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64, width: usize, height: usize) -> Self {
        Self::new(
            [origin_x, pixel_size, 0.0, origin_y, 0.0, -pixel_size],
            width,
            height,
        )
    }

    /// Array shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.geo_transform[1].abs(), self.geo_transform[5].abs())
    }

    fn is_rotated(&self) -> bool {
        self.geo_transform[2] != 0.0 || self.geo_transform[4] != 0.0
    }

    fn to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let gt = &self.geo_transform;
        (
            gt[0] + col * gt[1] + row * gt[2],
            gt[3] + col * gt[4] + row * gt[5],
        )
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Bounding rectangle of the whole grid in world coordinates.
    pub fn footprint(&self) -> Rect<f64> {
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [
            self.to_world(0.0, 0.0),
            self.to_world(w, 0.0),
            self.to_world(0.0, h),
            self.to_world(w, h),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        Rect::new((min_x, min_y), (max_x, max_y))
    }

    /// Pixel window covering `rect`, clamped to the grid.
    ///
    /// Rotated grids always yield the full grid. Returns `None` when the
    /// rectangle does not overlap the grid.
    pub fn window(&self, rect: &Rect<f64>) -> Option<PixelWindow> {
        if self.is_empty() {
            return None;
        }
        if self.is_rotated() {
            return Some(self.full_window());
        }

        let gt = &self.geo_transform;
        let cols_at = |x: f64| (x - gt[0]) / gt[1];
        let rows_at = |y: f64| (y - gt[3]) / gt[5];

        let (c0, c1) = (cols_at(rect.min().x), cols_at(rect.max().x));
        let (r0, r1) = (rows_at(rect.min().y), rows_at(rect.max().y));

        let col_start = c0.min(c1).floor().max(0.0) as usize;
        let col_end = (c0.max(c1).ceil().max(0.0) as usize).min(self.width);
        let row_start = r0.min(r1).floor().max(0.0) as usize;
        let row_end = (r0.max(r1).ceil().max(0.0) as usize).min(self.height);

        if col_start >= col_end || row_start >= row_end {
            return None;
        }

        Some(PixelWindow {
            row: row_start,
            col: col_start,
            rows: row_end - row_start,
            cols: col_end - col_start,
        })
    }

    pub fn full_window(&self) -> PixelWindow {
        PixelWindow {
            row: 0,
            col: 0,
            rows: self.height,
            cols: self.width,
        }
    }

    /// Grid describing only the pixels of `window`.
    pub fn subgrid(&self, window: PixelWindow) -> GridSpec {
        let (x, y) = self.to_world(window.col as f64, window.row as f64);
        let gt = &self.geo_transform;
        GridSpec::new([x, gt[1], gt[2], y, gt[4], gt[5]], window.cols, window.rows)
    }

    /// Same dimensions and a geotransform equal within a small fraction of a pixel.
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        let (px, py) = self.pixel_size();
        let tolerance = px.max(py) * 1e-6;
        self.geo_transform
            .iter()
            .zip(other.geo_transform.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance.max(f64::EPSILON))
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} grid at ({}, {}) with {}x{} pixels",
            self.width,
            self.height,
            self.geo_transform[0],
            self.geo_transform[3],
            self.geo_transform[1],
            self.geo_transform[5]
        )
    }
}
