// src/io/reader.rs
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use flume::{Receiver, Sender};
use gdal::raster::GdalDataType;
use gdal::Dataset;
use ndarray::Array2;

use super::manifest::{SceneEntry, SceneManifest};
use crate::error::{Error, Result};
use crate::raster::{BandData, GridSpec, Image};

fn shape_error(path: &Path, e: ndarray::ShapeError) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}: {}", path.display(), e),
    ))
}

/// First band of a raster file, with its grid and projection.
fn read_band(path: &Path) -> Result<(BandData, GridSpec, String)> {
    let dataset = Dataset::open(path)?;
    let (width, height) = dataset.raster_size();
    let grid = GridSpec::new(dataset.geo_transform()?, width, height);
    let band = dataset.rasterband(1)?;
    let nodata = band.no_data_value();
    let shape = (height, width);

    let data = match band.band_type() {
        GdalDataType::UInt8 | GdalDataType::UInt16 => {
            let buffer = band.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
            let values = buffer
                .data()
                .iter()
                .map(|&v| (nodata != Some(f64::from(v))).then_some(v))
                .collect();
            BandData::U16(Array2::from_shape_vec(shape, values).map_err(|e| shape_error(path, e))?)
        }
        _ => {
            let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let values = buffer
                .data()
                .iter()
                .map(|&v| (v.is_finite() && nodata != Some(f64::from(v))).then_some(v))
                .collect();
            BandData::F32(Array2::from_shape_vec(shape, values).map_err(|e| shape_error(path, e))?)
        }
    };

    Ok((data, grid, dataset.projection()))
}

/// Read every band of one scene. All bands must share a grid.
pub fn read_scene(entry: &SceneEntry) -> Result<(Image, String)> {
    let mut bands = entry.bands.iter();
    let (first_name, first_path) = bands.next().ok_or_else(|| {
        Error::Configuration(format!("scene '{}' lists no bands", entry.id))
    })?;

    let (data, grid, projection) = read_band(first_path)?;
    let mut image = Image::new(entry.id.as_str(), entry.acquired, grid)
        .with_band(first_name.as_str(), data)?;
    if let Some(cover) = entry.cloud_cover {
        image = image.with_cloud_cover(cover);
    }

    for (name, path) in bands {
        let (data, band_grid, _) = read_band(path)?;
        if !band_grid.is_aligned_with(&grid) {
            return Err(Error::GridMismatch {
                expected: grid.to_string(),
                actual: format!("{} in {}", band_grid, path.display()),
            });
        }
        image = image.with_band(name.as_str(), data)?;
    }

    log::debug!("Read scene {} ({} bands)", entry.id, image.bands().len());
    Ok((image, projection))
}

type SceneResult = (usize, Result<(Image, String)>);

/// Loads scenes on a pool of reader threads.
struct SceneLoader {
    workers: Vec<JoinHandle<()>>,
    req_tx: Sender<(usize, SceneEntry)>,
}

impl SceneLoader {
    fn new(threads: usize, result_tx: Sender<SceneResult>) -> Self {
        let (req_tx, req_rx) = flume::unbounded();

        let workers = (0..threads)
            .map(|_| {
                let req_rx: Receiver<(usize, SceneEntry)> = req_rx.clone();
                let result_tx = result_tx.clone();
                thread::spawn(move || {
                    for (index, entry) in req_rx {
                        if result_tx.send((index, read_scene(&entry))).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Self { workers, req_tx }
    }

    fn join(self) {
        drop(self.req_tx);
        for worker in self.workers {
            if worker.join().is_err() {
                log::error!("Scene reader thread panicked");
            }
        }
    }
}

/// Read all scenes of a manifest, keeping manifest order.
///
/// Returns the images and the projection of the first scene.
pub fn load_scenes(manifest: &SceneManifest, io_threads: Option<usize>) -> Result<(Vec<Image>, String)> {
    let started = Instant::now();
    let threads = io_threads
        .unwrap_or_else(num_cpus::get)
        .clamp(1, manifest.scenes.len().max(1));

    let (result_tx, result_rx) = flume::unbounded();
    let loader = SceneLoader::new(threads, result_tx);
    for (index, entry) in manifest.scenes.iter().cloned().enumerate() {
        loader
            .req_tx
            .send((index, entry))
            .map_err(|e| Error::Configuration(format!("scene loader stopped: {}", e)))?;
    }
    loader.join();

    let mut loaded: Vec<SceneResult> = result_rx.drain().collect();
    loaded.sort_by_key(|(index, _)| *index);

    let mut images = Vec::with_capacity(loaded.len());
    let mut projection = None;
    for (_, result) in loaded {
        let (image, wkt) = result?;
        match &projection {
            None => projection = Some(wkt),
            Some(first) if *first != wkt => {
                log::warn!("Scene {} uses a different projection than the first scene", image.id());
            }
            Some(_) => {}
        }
        images.push(image);
    }
    let projection = projection.unwrap_or_default();

    log::info!(
        "Loaded {} scenes with {} reader threads in {:.2?}",
        images.len(),
        threads,
        started.elapsed()
    );
    Ok((images, projection))
}
