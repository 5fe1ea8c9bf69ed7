// src/io/writer.rs
use std::path::Path;

use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::{DriverManager, Metadata};
use itertools::Itertools;

use super::{prepare_export, ExportOptions, NODATA_VALUE};
use crate::error::Result;
use crate::processing::ExportedComposite;
use crate::raster::AreaOfInterest;

fn creation_options(options: &ExportOptions) -> RasterCreationOptions {
    let mut list = Vec::new();
    let compress = options.compress.to_uppercase();

    if compress != "NONE" {
        list.push(format!("COMPRESS={}", compress));
        match compress.as_str() {
            "DEFLATE" => list.push(format!("ZLEVEL={}", options.compress_level.min(9))),
            "ZSTD" => list.push(format!("ZSTD_LEVEL={}", options.compress_level.min(22))),
            _ => {}
        }
    }

    if options.tiled {
        list.push("TILED=YES".to_string());
    }
    list.push("NUM_THREADS=ALL_CPUS".to_string());
    list.push("INTERLEAVE=BAND".to_string());

    RasterCreationOptions::from_iter(list)
}

/// Write the composite as a multi-band Float32 GeoTIFF cropped to the AOI.
///
/// Band descriptions carry the band names; the acquisition range and the
/// source scene ids go into the dataset metadata.
pub fn write_composite(
    composite: &ExportedComposite,
    aoi: &AreaOfInterest,
    projection: &str,
    output_path: &Path,
    options: &ExportOptions,
) -> Result<()> {
    let image = prepare_export(composite, aoi, options)?;
    let grid = *image.grid();
    let (rows, cols) = grid.shape();

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut output = driver.create_with_band_type_with_options::<f32, _>(
        output_path,
        cols,
        rows,
        image.bands().len(),
        &creation_options(options),
    )?;

    if !projection.is_empty() {
        output.set_projection(projection)?;
    }
    output.set_geo_transform(&grid.geo_transform)?;
    output.set_metadata_item("TIME_START", &composite.time_start().to_rfc3339(), "")?;
    output.set_metadata_item("TIME_END", &composite.time_end().to_rfc3339(), "")?;
    output.set_metadata_item("SOURCE_IDS", &composite.source_ids().iter().join(","), "")?;

    for (i, band) in image.bands().iter().enumerate() {
        let mut raster_band = output.rasterband(i + 1)?;
        raster_band.set_no_data_value(Some(f64::from(NODATA_VALUE)))?;
        raster_band.set_description(band.name())?;

        let values = band
            .data()
            .to_f32()
            .iter()
            .map(|v| v.unwrap_or(NODATA_VALUE))
            .collect::<Vec<f32>>();
        let mut buffer = Buffer::new((cols, rows), values);
        raster_band.write((0, 0), (cols, rows), &mut buffer)?;
    }

    output.flush_cache()?;
    log::info!(
        "Wrote {} bands ({}x{}) to {}",
        image.bands().len(),
        cols,
        rows,
        output_path.display()
    );
    Ok(())
}
