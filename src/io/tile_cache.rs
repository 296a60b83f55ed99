//! On-disk cache of per-tile raster outputs.
//!
//! Layout: `<root>/tile_<id>/{water_mask,turbidity,chlorophyll}.tif`. Each
//! tile folder is owned by exactly one worker during a run, so no locking is
//! done. Cached files are re-validated on every load and never trusted by
//! presence alone.

use crate::io::raster::RasterIo;
use crate::types::{
    GeoTransform, PipelineError, PipelineResult, RasterKind, RasterSet, Tile, CHLOROPHYLL_RANGE,
    TURBIDITY_RANGE,
};
use ndarray::Array2;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TileCache {
    root: PathBuf,
    grid_size: usize,
}

impl TileCache {
    pub fn new<P: AsRef<Path>>(root: P, grid_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            grid_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn tile_dir(&self, tile_id: u8) -> PathBuf {
        self.root.join(format!("tile_{}", tile_id))
    }

    pub fn raster_path(&self, tile_id: u8, kind: RasterKind) -> PathBuf {
        self.tile_dir(tile_id).join(kind.file_name())
    }

    /// All three raster files exist for this tile
    pub fn is_present(&self, tile_id: u8) -> bool {
        RasterKind::ALL.iter().all(|k| self.raster_path(tile_id, *k).is_file())
    }

    /// Load and validate the cached rasters for a tile
    pub fn load(&self, tile: &Tile) -> PipelineResult<RasterSet> {
        if !self.is_present(tile.id) {
            return Err(PipelineError::InvalidRaster(format!(
                "Tile {}: cache incomplete in {}",
                tile.id,
                self.tile_dir(tile.id).display()
            )));
        }

        let (water_mask, mask_transform) =
            RasterIo::read_band::<u8, _>(self.raster_path(tile.id, RasterKind::WaterMask))?;
        let (turbidity, turbidity_transform) =
            RasterIo::read_band::<f32, _>(self.raster_path(tile.id, RasterKind::Turbidity))?;
        let (chlorophyll, chlorophyll_transform) =
            RasterIo::read_band::<f32, _>(self.raster_path(tile.id, RasterKind::Chlorophyll))?;

        if !same_transform(&mask_transform, &turbidity_transform)
            || !same_transform(&mask_transform, &chlorophyll_transform)
        {
            return Err(PipelineError::InvalidRaster(format!(
                "Tile {}: cached rasters have different geo-transforms",
                tile.id
            )));
        }

        let set = RasterSet {
            tile_id: tile.id,
            water_mask,
            turbidity,
            chlorophyll,
            transform: mask_transform,
        };
        validate_raster_set(&set, self.grid_size)?;
        Ok(set)
    }

    /// Persist a raster set for reuse by later runs
    pub fn store(&self, set: &RasterSet) -> PipelineResult<()> {
        let dir = self.tile_dir(set.tile_id);
        std::fs::create_dir_all(&dir)?;
        RasterIo::write_band(self.raster_path(set.tile_id, RasterKind::WaterMask), &set.water_mask, &set.transform)?;
        RasterIo::write_band(self.raster_path(set.tile_id, RasterKind::Turbidity), &set.turbidity, &set.transform)?;
        RasterIo::write_band(
            self.raster_path(set.tile_id, RasterKind::Chlorophyll),
            &set.chlorophyll,
            &set.transform,
        )?;
        log::info!("Tile {}: cached rasters in {}", set.tile_id, dir.display());
        Ok(())
    }

    /// Drop a tile's cached files, used when they fail validation
    pub fn evict(&self, tile_id: u8) {
        for kind in RasterKind::ALL {
            let path = self.raster_path(tile_id, kind);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

fn same_transform(a: &GeoTransform, b: &GeoTransform) -> bool {
    let (a, b) = (a.to_gdal(), b.to_gdal());
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(1.0))
}

/// Check shape and value domain of all three grids of a tile.
///
/// NaN is treated as nodata in the index grids; every finite value must lie
/// in its range. A grid with no non-zero value is rejected.
pub fn validate_raster_set(set: &RasterSet, grid_size: usize) -> PipelineResult<()> {
    let expected = (grid_size, grid_size);
    validate_mask(set.tile_id, &set.water_mask, expected)?;
    validate_index(set.tile_id, RasterKind::Turbidity, &set.turbidity, expected, TURBIDITY_RANGE)?;
    validate_index(set.tile_id, RasterKind::Chlorophyll, &set.chlorophyll, expected, CHLOROPHYLL_RANGE)?;
    Ok(())
}

fn check_shape(tile_id: u8, kind: RasterKind, dim: (usize, usize), expected: (usize, usize)) -> PipelineResult<()> {
    if dim != expected {
        return Err(PipelineError::InvalidRaster(format!(
            "Tile {}: {} has shape {:?}, expected {:?}",
            tile_id, kind, dim, expected
        )));
    }
    Ok(())
}

fn validate_mask(tile_id: u8, mask: &Array2<u8>, expected: (usize, usize)) -> PipelineResult<()> {
    check_shape(tile_id, RasterKind::WaterMask, mask.dim(), expected)?;
    if let Some(bad) = mask.iter().find(|&&v| v > 1) {
        return Err(PipelineError::InvalidRaster(format!(
            "Tile {}: water_mask contains non-binary value {}",
            tile_id, bad
        )));
    }
    if mask.iter().all(|&v| v == 0) {
        return Err(PipelineError::InvalidRaster(format!("Tile {}: water_mask is all zero", tile_id)));
    }
    Ok(())
}

fn validate_index(
    tile_id: u8,
    kind: RasterKind,
    grid: &Array2<f32>,
    expected: (usize, usize),
    (lo, hi): (f32, f32),
) -> PipelineResult<()> {
    check_shape(tile_id, kind, grid.dim(), expected)?;
    if let Some(bad) = grid.iter().find(|v| v.is_finite() && (**v < lo || **v > hi)) {
        return Err(PipelineError::InvalidRaster(format!(
            "Tile {}: {} value {} outside [{}, {}]",
            tile_id, kind, bad, lo, hi
        )));
    }
    if !grid.iter().any(|v| v.is_finite() && *v != 0.0) {
        return Err(PipelineError::InvalidRaster(format!("Tile {}: {} is all zero", tile_id, kind)));
    }
    Ok(())
}
