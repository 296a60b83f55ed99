use crate::core::polygonize::polygonize_component;
use crate::types::{
    MaskGrid, PipelineError, PipelineResult, RasterSet, ValueGrid, WaterBody, CHLOROPHYLL_RANGE,
    PIXEL_AREA_M2, TURBIDITY_RANGE,
};
use ndarray::Array2;
use std::collections::VecDeque;

/// Water-body extraction parameters
#[derive(Debug, Clone)]
pub struct ExtractorParams {
    /// Ground area of one pixel in square metres
    pub pixel_area_m2: f64,
    /// Vectorise each component's boundary
    pub polygonize: bool,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            pixel_area_m2: PIXEL_AREA_M2,
            polygonize: true,
        }
    }
}

/// 8-connected components of a binary mask.
///
/// Labels start at 1 and follow the row-major position of each component's
/// first pixel; 0 marks background.
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    pub labels: Array2<u32>,
    /// Pixels of component `i + 1`, seed pixel first
    pub components: Vec<Vec<(usize, usize)>>,
}

impl ComponentLabels {
    pub fn count(&self) -> usize {
        self.components.len()
    }
}

/// Label the water pixels (value 1) of `mask` with a full 3x3 structuring
/// element.
pub fn label_components(mask: &MaskGrid) -> ComponentLabels {
    let (height, width) = mask.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for row in 0..height {
        for col in 0..width {
            if mask[[row, col]] != 1 || labels[[row, col]] != 0 {
                continue;
            }

            let label = components.len() as u32 + 1;
            let mut pixels = Vec::new();
            labels[[row, col]] = label;
            queue.push_back((row, col));

            while let Some((r, c)) = queue.pop_front() {
                pixels.push((r, c));
                for nr in r.saturating_sub(1)..=(r + 1).min(height - 1) {
                    for nc in c.saturating_sub(1)..=(c + 1).min(width - 1) {
                        if mask[[nr, nc]] == 1 && labels[[nr, nc]] == 0 {
                            labels[[nr, nc]] = label;
                            queue.push_back((nr, nc));
                        }
                    }
                }
            }
            components.push(pixels);
        }
    }

    ComponentLabels { labels, components }
}

/// Mean of the finite grid values under `pixels`, clamped to `range`.
/// 0 when no pixel carries a finite value.
pub fn zonal_mean(grid: &ValueGrid, pixels: &[(usize, usize)], (lo, hi): (f32, f32)) -> f64 {
    let (sum, count) = pixels
        .iter()
        .map(|&(r, c)| grid[[r, c]])
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(sum, n), v| (sum + v as f64, n + 1));

    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).clamp(lo as f64, hi as f64)
}

/// Result of extracting one tile
#[derive(Debug, Clone, Default)]
pub struct TileExtraction {
    pub tile_id: u8,
    pub bodies: Vec<WaterBody>,
}

impl TileExtraction {
    pub fn empty(tile_id: u8) -> Self {
        Self { tile_id, bodies: Vec::new() }
    }

    pub fn count(&self) -> usize {
        self.bodies.len()
    }
}

/// Water-body extractor
pub struct WaterBodyExtractor {
    params: ExtractorParams,
}

impl Default for WaterBodyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl WaterBodyExtractor {
    pub fn new() -> Self {
        Self { params: ExtractorParams::default() }
    }

    pub fn with_params(params: ExtractorParams) -> Self {
        Self { params }
    }

    /// Turn one tile's rasters into water bodies with per-feature statistics
    pub fn extract(&self, set: &RasterSet) -> PipelineResult<TileExtraction> {
        let dim = set.water_mask.dim();
        if set.turbidity.dim() != dim || set.chlorophyll.dim() != dim {
            return Err(PipelineError::InvalidRaster(format!(
                "Tile {}: raster shapes differ (mask {:?}, turbidity {:?}, chlorophyll {:?})",
                set.tile_id,
                dim,
                set.turbidity.dim(),
                set.chlorophyll.dim()
            )));
        }

        let labelled = label_components(&set.water_mask);
        log::debug!("Tile {}: {} connected water components", set.tile_id, labelled.count());

        let bodies = labelled
            .components
            .iter()
            .enumerate()
            .map(|(i, pixels)| {
                let label = i as u32 + 1;
                let geometry = if self.params.polygonize {
                    polygonize_component(&labelled.labels, label, pixels, pixels[0], &set.transform)
                } else {
                    crate::types::Polygon::new(Vec::new())
                };
                WaterBody {
                    id: format!("{}_{}", set.tile_id, label),
                    area_m2: pixels.len() as f64 * self.params.pixel_area_m2,
                    geometry,
                    turbidity: zonal_mean(&set.turbidity, pixels, TURBIDITY_RANGE),
                    chlorophyll: zonal_mean(&set.chlorophyll, pixels, CHLOROPHYLL_RANGE),
                }
            })
            .collect();

        Ok(TileExtraction { tile_id: set.tile_id, bodies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GeoTransform};

    fn raster_set(mask: MaskGrid, turbidity: f32, chlorophyll: f32) -> RasterSet {
        let dim = mask.dim();
        let bbox = BoundingBox::new(36.0, -1.0, 37.0, 0.0).unwrap();
        RasterSet {
            tile_id: 2,
            turbidity: Array2::from_elem(dim, turbidity),
            chlorophyll: Array2::from_elem(dim, chlorophyll),
            water_mask: mask,
            transform: GeoTransform::from_bounds(&bbox, dim.1, dim.0),
        }
    }

    #[test]
    fn test_eight_connectivity() {
        // Diagonal neighbours join; a separate blob stays separate
        let mut mask = MaskGrid::zeros((6, 6));
        mask[[0, 0]] = 1;
        mask[[1, 1]] = 1;
        mask[[2, 2]] = 1;
        mask[[4, 4]] = 1;
        mask[[4, 5]] = 1;

        let labelled = label_components(&mask);
        assert_eq!(labelled.count(), 2);
        assert_eq!(labelled.labels[[2, 2]], 1);
        assert_eq!(labelled.labels[[4, 5]], 2);
        assert_eq!(labelled.components[0][0], (0, 0));
    }

    #[test]
    fn test_labels_follow_scan_order() {
        let mut mask = MaskGrid::zeros((4, 4));
        mask[[0, 3]] = 1;
        mask[[2, 0]] = 1;
        mask[[3, 3]] = 1;

        let labelled = label_components(&mask);
        assert_eq!(labelled.labels[[0, 3]], 1);
        assert_eq!(labelled.labels[[2, 0]], 2);
        assert_eq!(labelled.labels[[3, 3]], 3);
    }

    #[test]
    fn test_area_and_ids() {
        let mut mask = MaskGrid::zeros((20, 20));
        for r in 2..12 {
            for c in 2..12 {
                mask[[r, c]] = 1;
            }
        }
        mask[[18, 18]] = 1;

        let extraction = WaterBodyExtractor::new().extract(&raster_set(mask, 0.3, 40.0)).unwrap();
        assert_eq!(extraction.count(), 2);
        assert_eq!(extraction.bodies[0].id, "2_1");
        assert_eq!(extraction.bodies[1].id, "2_2");
        assert_eq!(extraction.bodies[0].area_m2, 10_000.0);
        assert_eq!(extraction.bodies[1].area_m2, 100.0);
        assert!((extraction.bodies[0].turbidity - 0.3).abs() < 1e-6);
        assert!((extraction.bodies[0].chlorophyll - 40.0).abs() < 1e-4);
        assert_eq!(extraction.bodies[0].geometry.exterior().unwrap().len(), 5);
    }

    #[test]
    fn test_means_are_clamped() {
        let mut mask = MaskGrid::zeros((4, 4));
        mask[[1, 1]] = 1;
        let extraction = WaterBodyExtractor::new().extract(&raster_set(mask.clone(), 3.5, 250.0)).unwrap();
        assert_eq!(extraction.bodies[0].turbidity, 1.0);
        assert_eq!(extraction.bodies[0].chlorophyll, 100.0);

        let extraction = WaterBodyExtractor::new().extract(&raster_set(mask, -7.0, -3.0)).unwrap();
        assert_eq!(extraction.bodies[0].turbidity, -1.0);
        assert_eq!(extraction.bodies[0].chlorophyll, 0.0);
    }

    #[test]
    fn test_nodata_pixels_excluded_from_mean() {
        let mut mask = MaskGrid::zeros((3, 3));
        mask[[0, 0]] = 1;
        mask[[0, 1]] = 1;
        let mut set = raster_set(mask, 0.5, 10.0);
        set.turbidity[[0, 1]] = f32::NAN;
        set.chlorophyll[[0, 0]] = f32::NAN;
        set.chlorophyll[[0, 1]] = f32::NAN;

        let body = &WaterBodyExtractor::new().extract(&set).unwrap().bodies[0];
        assert!((body.turbidity - 0.5).abs() < 1e-9);
        assert_eq!(body.chlorophyll, 0.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut set = raster_set(MaskGrid::ones((4, 4)), 0.1, 1.0);
        set.turbidity = Array2::zeros((4, 5));
        assert!(WaterBodyExtractor::new().extract(&set).is_err());
    }
}
