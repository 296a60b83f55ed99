//! TOML-backed pipeline settings.
//!
//! Every section except `[area]` is optional and falls back to the defaults
//! below. Imagery credentials can be given in the file or through the
//! `SH_CLIENT_ID` / `SH_CLIENT_SECRET` environment variables; they are only
//! checked when a remote imagery call is actually made.

use crate::types::{BoundingBox, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub area: AreaConfig,
    #[serde(default)]
    pub sentinelhub: SentinelHubConfig,
    #[serde(default)]
    pub open_meteo: OpenMeteoConfig,
    #[serde(default)]
    pub chirps: ChirpsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct AreaConfig {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SentinelHubConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Maximum scene cloud cover, percent
    pub max_cloud: f64,
    pub lookback_days: i64,
    /// Output grid edge length in pixels
    pub grid_size: usize,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SentinelHubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://services.sentinel-hub.com".to_string(),
            token_url: "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token"
                .to_string(),
            client_id: None,
            client_secret: None,
            max_cloud: 20.0,
            lookback_days: 7,
            grid_size: 1024,
            retry_attempts: 3,
            retry_delay_secs: 5,
            timeout_secs: 120,
        }
    }
}

impl SentinelHubConfig {
    /// Resolve (client id, client secret) from the file or environment
    pub fn credentials(&self) -> PipelineResult<(String, String)> {
        let id = self
            .client_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| std::env::var("SH_CLIENT_ID").ok());
        let secret = self
            .client_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| std::env::var("SH_CLIENT_SECRET").ok());
        match (id, secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(PipelineError::Credentials(
                "Sentinel Hub client_id/client_secret not configured".to_string(),
            )),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenMeteoConfig {
    pub base_url: String,
    pub archive_url: String,
    /// Defaults to the AOI centroid when unset
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub hourly_variables: Vec<String>,
    pub forecast_days: u32,
    pub past_days: u32,
    pub timeout_secs: u64,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            latitude: None,
            longitude: None,
            hourly_variables: [
                "precipitation",
                "temperature_2m",
                "relative_humidity_2m",
                "soil_moisture_0_to_1cm",
                "wind_speed_10m",
                "et0_fao_evapotranspiration",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            forecast_days: 7,
            past_days: 7,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChirpsConfig {
    pub base_url: String,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for ChirpsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.chc.ucsb.edu/products/CHIRPS-2.0/africa_daily/tifs/p05".to_string(),
            max_attempts: 30,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub data_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl CacheConfig {
    pub fn sentinel_dir(&self) -> PathBuf {
        self.data_dir.join("sentinel")
    }

    pub fn chirps_dir(&self) -> PathBuf {
        self.data_dir.join("chirps")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("output/latest_water.json") }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl PipelineConfig {
    /// Parse and validate settings from a TOML string
    pub fn from_toml_str(s: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = toml::from_str(s)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        log::info!("Loading configuration from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::Config(format!("Cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        self.area_of_interest()?;
        if self.sentinelhub.grid_size == 0 {
            return Err(PipelineError::Config("sentinelhub.grid_size must be positive".to_string()));
        }
        if self.sentinelhub.retry_attempts == 0 || self.chirps.max_attempts == 0 {
            return Err(PipelineError::Config("attempt bounds must be at least 1".to_string()));
        }
        if self.open_meteo.forecast_days == 0 {
            return Err(PipelineError::Config("open_meteo.forecast_days must be positive".to_string()));
        }
        Ok(())
    }

    pub fn area_of_interest(&self) -> PipelineResult<BoundingBox> {
        BoundingBox::new(self.area.west, self.area.south, self.area.east, self.area.north)
    }

    /// Point used for the weather queries as (lat, lon)
    pub fn weather_point(&self) -> PipelineResult<(f64, f64)> {
        let (lat, lon) = self.area_of_interest()?.centroid();
        Ok((
            self.open_meteo.latitude.unwrap_or(lat),
            self.open_meteo.longitude.unwrap_or(lon),
        ))
    }
}

/// Default cache location when no config is given
pub fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("hydrosat"))
        .unwrap_or_else(|| PathBuf::from("data"))
}
