use crate::types::{BoundingBox, GeoTransform, PipelineError, PipelineResult};
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Pixel window (column offset, row offset, width, height)
pub type PixelWindow = (usize, usize, usize, usize);

/// Single-band GeoTIFF reader/writer
pub struct RasterIo;

impl RasterIo {
    /// Read band 1 of a raster in full
    pub fn read_band<T, P>(path: P) -> PipelineResult<(Array2<T>, GeoTransform)>
    where
        T: GdalType + Copy,
        P: AsRef<Path>,
    {
        log::debug!("Reading raster: {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<T>((0, 0), (width, height), (width, height), None)?;
        let grid = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| PipelineError::InvalidRaster(format!("Failed to reshape raster: {}", e)))?;
        Ok((grid, transform))
    }

    /// Decode an in-memory GeoTIFF through the VSI memory filesystem.
    /// `name` must be unique among concurrent callers.
    pub fn read_band_from_bytes<T: GdalType + Copy>(
        name: &str,
        bytes: Vec<u8>,
    ) -> PipelineResult<(Array2<T>, GeoTransform)> {
        let vsi_path = format!("/vsimem/hydrosat_{}.tif", name);
        gdal::vsi::create_mem_file(vsi_path.as_str(), bytes)?;
        let result = Self::read_band::<T, _>(vsi_path.as_str());
        if let Err(e) = gdal::vsi::unlink_mem_file(vsi_path.as_str()) {
            log::warn!("Failed to release {}: {}", vsi_path, e);
        }
        result
    }

    /// Read the part of band 1 covering `bbox`. Also returns the band's
    /// nodata value, if any.
    pub fn read_window_f32<P: AsRef<Path>>(
        path: P,
        bbox: &BoundingBox,
    ) -> PipelineResult<(Array2<f32>, Option<f64>)> {
        let dataset = Dataset::open(path.as_ref())?;
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let size = dataset.raster_size();

        let (col, row, width, height) = pixel_window(&transform, size, bbox).ok_or_else(|| {
            PipelineError::Processing(format!(
                "Requested bounding box {:?} does not overlap raster {}",
                bbox,
                path.as_ref().display()
            ))
        })?;
        log::debug!("Clipping raster to pixel window x={}+{}, y={}+{}", col, width, row, height);

        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value();
        let buffer = band.read_as::<f32>(
            (col as isize, row as isize),
            (width, height),
            (width, height),
            None,
        )?;
        let grid = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| PipelineError::InvalidRaster(format!("Failed to reshape raster: {}", e)))?;
        Ok((grid, nodata))
    }

    /// Write a grid as a single-band EPSG:4326 GeoTIFF
    pub fn write_band<T, P>(path: P, grid: &Array2<T>, transform: &GeoTransform) -> PipelineResult<()>
    where
        T: GdalType + Copy,
        P: AsRef<Path>,
    {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (height, width) = grid.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<T, _>(path.as_ref(), width as _, height as _, 1)?;
        dataset.set_geo_transform(&transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;

        let data: Vec<T> = grid.as_standard_layout().iter().copied().collect();
        let buffer = Buffer::new((width, height), data);
        let mut band = dataset.rasterband(1)?;
        band.write((0, 0), (width, height), &buffer)?;
        log::debug!("Wrote {}x{} raster to {}", width, height, path.as_ref().display());
        Ok(())
    }
}

/// Pixel window of a north-up raster that covers `bbox`, clamped to the
/// raster extent. `None` when the box does not overlap the raster.
pub fn pixel_window(transform: &GeoTransform, size: (usize, usize), bbox: &BoundingBox) -> Option<PixelWindow> {
    let (width, height) = size;
    if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
        return None;
    }

    let col_min = ((bbox.min_lon - transform.top_left_x) / transform.pixel_width).floor().max(0.0);
    let col_max = ((bbox.max_lon - transform.top_left_x) / transform.pixel_width).ceil().min(width as f64);
    let row_min = ((bbox.max_lat - transform.top_left_y) / transform.pixel_height).floor().max(0.0);
    let row_max = ((bbox.min_lat - transform.top_left_y) / transform.pixel_height).ceil().min(height as f64);

    if !(col_min < col_max) || !(row_min < row_max) {
        return None;
    }
    Some((
        col_min as usize,
        row_min as usize,
        (col_max - col_min) as usize,
        (row_max - row_min) as usize,
    ))
}
