use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Binary water/land mask (1 = water)
pub type MaskGrid = Array2<u8>;

/// Real-valued per-pixel index grid (turbidity, chlorophyll, precipitation)
pub type ValueGrid = Array2<f32>;

/// Ground area covered by one pixel at the processing resolution (10 m x 10 m)
pub const PIXEL_AREA_M2: f64 = 100.0;

/// Valid range for the turbidity index
pub const TURBIDITY_RANGE: (f32, f32) = (-1.0, 1.0);

/// Valid range for the chlorophyll index
pub const CHLOROPHYLL_RANGE: (f32, f32) = (0.0, 100.0);

/// Geospatial bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Build an area of interest from west/south/east/north edges
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> PipelineResult<Self> {
        if !(west < east) || !(south < north) {
            return Err(PipelineError::Config(format!(
                "Invalid area of interest: west={}, south={}, east={}, north={}",
                west, south, east, north
            )));
        }
        Ok(Self {
            min_lon: west,
            max_lon: east,
            min_lat: south,
            max_lat: north,
        })
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Centre point as (lat, lon)
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min_lon = self.min_lon.max(other.min_lon);
        let max_lon = self.max_lon.min(other.max_lon);
        let min_lat = self.min_lat.max(other.min_lat);
        let max_lat = self.max_lat.min(other.max_lat);
        if min_lon < max_lon && min_lat < max_lat {
            Some(BoundingBox { min_lon, max_lon, min_lat, max_lat })
        } else {
            None
        }
    }

    /// Split into four equal quadrants.
    ///
    /// Tile ids run 1..=4 in the order south-west, south-east, north-west,
    /// north-east. The quadrants share their inner edges exactly, so they
    /// cover the box with no gaps or overlaps.
    pub fn split_quadrants(&self) -> [Tile; 4] {
        let mid_lon = (self.min_lon + self.max_lon) / 2.0;
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let quad = |min_lon, min_lat, max_lon, max_lat| BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        };
        [
            Tile { id: 1, bbox: quad(self.min_lon, self.min_lat, mid_lon, mid_lat) },
            Tile { id: 2, bbox: quad(mid_lon, self.min_lat, self.max_lon, mid_lat) },
            Tile { id: 3, bbox: quad(self.min_lon, mid_lat, mid_lon, self.max_lat) },
            Tile { id: 4, bbox: quad(mid_lon, mid_lat, self.max_lon, self.max_lat) },
        ]
    }
}

/// One quadrant of the area of interest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: u8,
    pub bbox: BoundingBox,
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform mapping a `width` x `height` grid onto `bbox`
    pub fn from_bounds(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self {
            top_left_x: bbox.min_lon,
            pixel_width: bbox.width() / width as f64,
            rotation_x: 0.0,
            top_left_y: bbox.max_lat,
            rotation_y: 0.0,
            pixel_height: -bbox.height() / height as f64,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map a pixel-corner coordinate (column, row) to (lon, lat)
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }
}

/// The three named outputs of the imagery processing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterKind {
    WaterMask,
    Turbidity,
    Chlorophyll,
}

impl RasterKind {
    pub const ALL: [RasterKind; 3] = [
        RasterKind::WaterMask,
        RasterKind::Turbidity,
        RasterKind::Chlorophyll,
    ];

    /// Output identifier used by the processing service
    pub fn identifier(&self) -> &'static str {
        match self {
            RasterKind::WaterMask => "water_mask",
            RasterKind::Turbidity => "turbidity",
            RasterKind::Chlorophyll => "chlorophyll",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.tif", self.identifier())
    }
}

impl std::fmt::Display for RasterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// One tile's raw raster outputs. All grids share shape and transform.
#[derive(Debug, Clone)]
pub struct RasterSet {
    pub tile_id: u8,
    pub water_mask: MaskGrid,
    pub turbidity: ValueGrid,
    pub chlorophyll: ValueGrid,
    pub transform: GeoTransform,
}

impl RasterSet {
    pub fn dim(&self) -> (usize, usize) {
        self.water_mask.dim()
    }
}

/// GeoJSON polygon: exterior ring followed by any holes, each ring closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    pub fn new(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self {
            kind: "Polygon".to_string(),
            coordinates: rings,
        }
    }

    pub fn exterior(&self) -> Option<&[[f64; 2]]> {
        self.coordinates.first().map(|r| r.as_slice())
    }

    pub fn holes(&self) -> &[Vec<[f64; 2]>] {
        if self.coordinates.is_empty() {
            &[]
        } else {
            &self.coordinates[1..]
        }
    }
}

/// One connected water feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterBody {
    /// `<tile id>_<component label>`
    pub id: String,
    pub area_m2: f64,
    pub geometry: Polygon,
    pub turbidity: f64,
    pub chlorophyll: f64,
}

/// Aggregate statistics over every water body in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WaterSummary {
    pub total_water_bodies: usize,
    pub total_area_m2: f64,
    pub avg_turbidity: f64,
    pub avg_chlorophyll: f64,
}

impl WaterSummary {
    pub fn from_bodies(bodies: &[WaterBody]) -> Self {
        if bodies.is_empty() {
            return Self::default();
        }
        let n = bodies.len() as f64;
        Self {
            total_water_bodies: bodies.len(),
            total_area_m2: bodies.iter().map(|b| b.area_m2).sum(),
            avg_turbidity: bodies.iter().map(|b| b.turbidity).sum::<f64>() / n,
            avg_chlorophyll: bodies.iter().map(|b| b.chlorophyll).sum::<f64>() / n,
        }
    }

    /// All four summary fields carry finite numbers
    pub fn is_complete(&self) -> bool {
        self.total_area_m2.is_finite()
            && self.avg_turbidity.is_finite()
            && self.avg_chlorophyll.is_finite()
    }
}

/// A domain value or the explicit "unavailable" marker.
///
/// Serialises as the inner value or as the string `"unavailable"`, so the
/// record keeps the same keys whether or not a domain succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum Reported<T> {
    Available(T),
    Unavailable,
}

impl<T> Reported<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Reported::Available(_))
    }

    pub fn as_ref(&self) -> Reported<&T> {
        match self {
            Reported::Available(v) => Reported::Available(v),
            Reported::Unavailable => Reported::Unavailable,
        }
    }

    pub fn available(self) -> Option<T> {
        match self {
            Reported::Available(v) => Some(v),
            Reported::Unavailable => None,
        }
    }
}

impl<T> From<Option<T>> for Reported<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Reported::Unavailable, Reported::Available)
    }
}

impl<T: Serialize> Serialize for Reported<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reported::Available(v) => v.serialize(serializer),
            Reported::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

/// Marker written in place of a missing domain
pub const UNAVAILABLE: &str = "unavailable";

/// Error types for the acquisition pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credentials(String),
}

impl PipelineError {
    /// Errors that must abort the run instead of degrading one domain
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(_) | PipelineError::Credentials(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => PipelineError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => PipelineError::Http(e.to_string()),
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrants_partition_area() {
        let aoi = BoundingBox::new(34.0, -4.0, 42.0, 4.0).unwrap();
        let tiles = aoi.split_quadrants();

        assert_eq!(tiles.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        let area: f64 = tiles.iter().map(|t| t.bbox.width() * t.bbox.height()).sum();
        assert!((area - aoi.width() * aoi.height()).abs() < 1e-9);

        // Shared inner edges, no overlap
        assert_eq!(tiles[0].bbox.max_lon, tiles[1].bbox.min_lon);
        assert_eq!(tiles[0].bbox.max_lat, tiles[2].bbox.min_lat);
        assert!(tiles[0].bbox.intersection(&tiles[3].bbox).is_none());
    }

    #[test]
    fn test_invalid_area_rejected() {
        assert!(BoundingBox::new(42.0, -4.0, 34.0, 4.0).is_err());
        assert!(BoundingBox::new(34.0, 4.0, 42.0, 4.0).is_err());
    }

    #[test]
    fn test_summary_defaults_on_empty() {
        let summary = WaterSummary::from_bodies(&[]);
        assert_eq!(summary.total_water_bodies, 0);
        assert_eq!(summary.avg_turbidity, 0.0);
        assert_eq!(summary.avg_chlorophyll, 0.0);
    }

    #[test]
    fn test_geo_transform_corners() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let gt = GeoTransform::from_bounds(&bbox, 10, 10);
        assert_eq!(gt.pixel_to_geo(0.0, 0.0), (0.0, 1.0));
        let (lon, lat) = gt.pixel_to_geo(10.0, 10.0);
        assert!((lon - 1.0).abs() < 1e-12 && lat.abs() < 1e-12);
    }
}
