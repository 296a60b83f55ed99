//! Client for the Sentinel Hub catalog and processing APIs.
//!
//! The catalog search finds the most recent sufficiently cloud-free
//! Sentinel-2 L2A scene over a tile. The processing API is then asked for
//! each named output (`water_mask`, `turbidity`, `chlorophyll`) as a
//! single-band GeoTIFF at the configured grid size.

use crate::config::SentinelHubConfig;
use crate::io::raster::RasterIo;
use crate::types::{
    BoundingBox, GeoTransform, PipelineError, PipelineResult, RasterKind, RasterSet, Tile,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;

const COLLECTION: &str = "sentinel-2-l2a";

/// A catalog hit
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInfo {
    pub id: String,
    pub datetime: DateTime<Utc>,
    pub cloud_cover: Option<f64>,
}

/// Remote imagery catalog and processing service
pub trait ImageryService: Send + Sync {
    /// Most recent scene over `bbox` in `[from, to]` with cloud cover below
    /// `max_cloud` percent, or `None` when the window has no such scene
    fn search_scene(
        &self,
        bbox: &BoundingBox,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max_cloud: f64,
    ) -> PipelineResult<Option<SceneInfo>>;

    /// Run the processing request for one tile and return its three rasters
    fn process_tile(&self, tile: &Tile, scene: &SceneInfo, grid_size: usize) -> PipelineResult<RasterSet>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    features: Vec<CatalogFeature>,
}

#[derive(Debug, Deserialize)]
struct CatalogFeature {
    id: String,
    properties: CatalogProperties,
}

#[derive(Debug, Deserialize)]
struct CatalogProperties {
    datetime: DateTime<Utc>,
    #[serde(rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
}

pub struct SentinelHubClient {
    config: SentinelHubConfig,
    http: reqwest::blocking::Client,
    token: Mutex<Option<String>>,
}

impl SentinelHubClient {
    pub fn new(config: SentinelHubConfig) -> PipelineResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("hydrosat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    /// OAuth client-credentials token, fetched once and shared by all workers
    fn access_token(&self) -> PipelineResult<String> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| PipelineError::Processing("token lock poisoned".to_string()))?;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let (client_id, client_secret) = self.config.credentials()?;
        log::debug!("Requesting Sentinel Hub access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PipelineError::Credentials(format!(
                "Sentinel Hub rejected the client credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::Status {
                status: status.as_u16(),
                url: self.config.token_url.clone(),
            });
        }

        let token: TokenResponse = response.json()?;
        *guard = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    fn post_json(&self, url: &str, body: &serde_json::Value, accept: &str) -> PipelineResult<reqwest::blocking::Response> {
        let token = self.access_token()?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, accept)
            .json(body)
            .send()?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PipelineError::Credentials(format!("Sentinel Hub returned {} for {}", status, url)));
        }
        if !status.is_success() {
            return Err(PipelineError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn fetch_output(
        &self,
        tile: &Tile,
        scene: &SceneInfo,
        kind: RasterKind,
        grid_size: usize,
    ) -> PipelineResult<Vec<u8>> {
        let url = format!("{}/api/v1/process", self.config.base_url);
        let body = process_request_body(&tile.bbox, scene, kind, grid_size, self.config.max_cloud);
        log::debug!("Tile {}: requesting {} for scene {}", tile.id, kind, scene.id);
        let bytes = self.post_json(&url, &body, "image/tiff")?.bytes()?;
        if bytes.is_empty() {
            return Err(PipelineError::InvalidRaster(format!("Tile {}: empty {} response", tile.id, kind)));
        }
        Ok(bytes.to_vec())
    }
}

impl ImageryService for SentinelHubClient {
    fn search_scene(
        &self,
        bbox: &BoundingBox,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max_cloud: f64,
    ) -> PipelineResult<Option<SceneInfo>> {
        let url = format!("{}/api/v1/catalog/1.0.0/search", self.config.base_url);
        let body = catalog_request_body(bbox, from, to, max_cloud);
        let catalog: CatalogResponse = self.post_json(&url, &body, "application/json")?.json()?;
        log::debug!("Catalog returned {} scene(s) for {:?}", catalog.features.len(), bbox);
        Ok(most_recent(catalog.features))
    }

    fn process_tile(&self, tile: &Tile, scene: &SceneInfo, grid_size: usize) -> PipelineResult<RasterSet> {
        let name = |kind: RasterKind| format!("tile{}_{}", tile.id, kind);

        let mask_bytes = self.fetch_output(tile, scene, RasterKind::WaterMask, grid_size)?;
        let (water_mask, transform) = RasterIo::read_band_from_bytes::<u8>(&name(RasterKind::WaterMask), mask_bytes)?;

        let turbidity_bytes = self.fetch_output(tile, scene, RasterKind::Turbidity, grid_size)?;
        let (turbidity, _) = RasterIo::read_band_from_bytes::<f32>(&name(RasterKind::Turbidity), turbidity_bytes)?;

        let chlorophyll_bytes = self.fetch_output(tile, scene, RasterKind::Chlorophyll, grid_size)?;
        let (chlorophyll, _) =
            RasterIo::read_band_from_bytes::<f32>(&name(RasterKind::Chlorophyll), chlorophyll_bytes)?;

        // Responses without georeferencing fall back to the tile bounds
        let transform = if transform.pixel_width == 0.0 || transform == GeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]) {
            GeoTransform::from_bounds(&tile.bbox, grid_size, grid_size)
        } else {
            transform
        };

        Ok(RasterSet {
            tile_id: tile.id,
            water_mask,
            turbidity,
            chlorophyll,
            transform,
        })
    }
}

fn most_recent(features: Vec<CatalogFeature>) -> Option<SceneInfo> {
    features
        .into_iter()
        .max_by_key(|f| f.properties.datetime)
        .map(|f| SceneInfo {
            id: f.id,
            datetime: f.properties.datetime,
            cloud_cover: f.properties.cloud_cover,
        })
}

fn catalog_request_body(bbox: &BoundingBox, from: DateTime<Utc>, to: DateTime<Utc>, max_cloud: f64) -> serde_json::Value {
    json!({
        "bbox": [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat],
        "datetime": format!("{}/{}", from.to_rfc3339(), to.to_rfc3339()),
        "collections": [COLLECTION],
        "limit": 10,
        "filter": format!("eo:cloud_cover < {}", max_cloud),
        "filter-lang": "cql2-text",
    })
}

fn process_request_body(
    bbox: &BoundingBox,
    scene: &SceneInfo,
    kind: RasterKind,
    grid_size: usize,
    max_cloud: f64,
) -> serde_json::Value {
    // One day either side of the scene so the mosaic resolves to that pass
    let from = scene.datetime - chrono::Duration::days(1);
    let to = scene.datetime + chrono::Duration::days(1);
    json!({
        "input": {
            "bounds": {
                "bbox": [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat],
                "properties": { "crs": "http://www.opengis.net/def/crs/EPSG/0/4326" }
            },
            "data": [{
                "type": COLLECTION,
                "dataFilter": {
                    "timeRange": { "from": from.to_rfc3339(), "to": to.to_rfc3339() },
                    "maxCloudCoverage": max_cloud,
                    "mosaickingOrder": "mostRecent"
                }
            }]
        },
        "output": {
            "width": grid_size,
            "height": grid_size,
            "responses": [{ "identifier": kind.identifier(), "format": { "type": "image/tiff" } }]
        },
        "evalscript": evalscript_for(kind),
    })
}

/// Evalscript producing a single named output.
///
/// water_mask: NDWI > 0 (UINT8 0/1). turbidity: NDTI from red/green, in
/// [-1, 1]. chlorophyll: NDCI from red-edge/red scaled to [0, 100].
pub fn evalscript_for(kind: RasterKind) -> String {
    let (sample_type, body) = match kind {
        RasterKind::WaterMask => (
            "UINT8",
            "let ndwi = (s.B03 - s.B08) / (s.B03 + s.B08 + 1e-6);\n  return [ndwi > 0 ? 1 : 0];",
        ),
        RasterKind::Turbidity => (
            "FLOAT32",
            "let ndti = (s.B04 - s.B03) / (s.B04 + s.B03 + 1e-6);\n  return [Math.max(-1, Math.min(1, ndti))];",
        ),
        RasterKind::Chlorophyll => (
            "FLOAT32",
            "let ndci = (s.B05 - s.B04) / (s.B05 + s.B04 + 1e-6);\n  return [Math.max(0, Math.min(100, (ndci + 1) * 50))];",
        ),
    };
    format!(
        "//VERSION=3\nfunction setup() {{\n  return {{\n    input: [\"B03\", \"B04\", \"B05\", \"B08\"],\n    output: {{ id: \"{}\", bands: 1, sampleType: \"{}\" }}\n  }};\n}}\nfunction evaluatePixel(s) {{\n  {}\n}}\n",
        kind.identifier(),
        sample_type,
        body
    )
}
