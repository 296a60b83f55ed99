//! Open-Meteo point forecast and reanalysis archive client.
//!
//! Both endpoints are queried with `timeformat=unixtime` so every series block
//! is a `time` array of epoch seconds plus one array per requested variable.
//! Variables can be absent and entries can be `null`; nothing is defaulted
//! here, that is left to the weather normaliser.

use crate::config::OpenMeteoConfig;
use crate::types::{PipelineError, PipelineResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// The six weather variables tracked per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeatherField {
    Precipitation,
    Temperature,
    RelativeHumidity,
    SoilMoisture,
    WindSpeed,
    Evapotranspiration,
}

impl WeatherField {
    pub const ALL: [WeatherField; 6] = [
        WeatherField::Precipitation,
        WeatherField::Temperature,
        WeatherField::RelativeHumidity,
        WeatherField::SoilMoisture,
        WeatherField::WindSpeed,
        WeatherField::Evapotranspiration,
    ];

    /// Variable name in the Open-Meteo API
    pub fn api_name(&self) -> &'static str {
        match self {
            WeatherField::Precipitation => "precipitation",
            WeatherField::Temperature => "temperature_2m",
            WeatherField::RelativeHumidity => "relative_humidity_2m",
            WeatherField::SoilMoisture => "soil_moisture_0_to_1cm",
            WeatherField::WindSpeed => "wind_speed_10m",
            WeatherField::Evapotranspiration => "et0_fao_evapotranspiration",
        }
    }
}

impl std::fmt::Display for WeatherField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

/// One time-series block (`hourly` or `minutely_15`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesBlock {
    #[serde(default)]
    pub time: Vec<i64>,
    #[serde(flatten)]
    pub variables: BTreeMap<String, Vec<Option<f64>>>,
}

impl SeriesBlock {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        self.time.get(index).and_then(|t| Utc.timestamp_opt(*t, 0).single())
    }

    pub fn series(&self, field: WeatherField) -> Option<&[Option<f64>]> {
        self.variables.get(field.api_name()).map(|v| v.as_slice())
    }

    /// Finite value of `field` at `index`; `None` for missing variable,
    /// short array, `null` or NaN.
    pub fn value(&self, field: WeatherField, index: usize) -> Option<f64> {
        self.series(field)
            .and_then(|s| s.get(index).copied().flatten())
            .filter(|v| v.is_finite())
    }
}

/// Parsed Open-Meteo response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherResponse {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub hourly: Option<SeriesBlock>,
    pub minutely_15: Option<SeriesBlock>,
}

/// Days to request from the forecast endpoint for a horizon of `days`.
///
/// The response starts at today 00:00 UTC while the daily buckets start at
/// the next midnight, so the last bucket needs one extra day of samples.
pub fn requested_forecast_days(days: u32) -> u32 {
    days + 1
}

/// Point weather source
pub trait WeatherProvider: Send + Sync {
    /// Hourly (and 15-minute) series covering the configured past days and
    /// forecast horizon
    fn forecast(&self) -> PipelineResult<WeatherResponse>;

    /// Reanalysis hourly series for `[start, end]`
    fn archive(&self, start: NaiveDate, end: NaiveDate) -> PipelineResult<WeatherResponse>;

    /// Number of daily forecast buckets to build
    fn forecast_days(&self) -> u32;

    /// Length of the reanalysis window in days
    fn past_days(&self) -> u32;
}

pub struct OpenMeteoClient {
    config: OpenMeteoConfig,
    latitude: f64,
    longitude: f64,
    http: reqwest::blocking::Client,
}

impl OpenMeteoClient {
    pub fn new(config: OpenMeteoConfig, latitude: f64, longitude: f64) -> PipelineResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hydrosat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, latitude, longitude, http })
    }

    fn base_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("hourly", self.config.hourly_variables.join(",")),
            ("timezone", "UTC".to_string()),
            ("timeformat", "unixtime".to_string()),
        ]
    }

    fn forecast_query(&self) -> Vec<(&'static str, String)> {
        let mut query = self.base_query();
        query.push(("minutely_15", self.config.hourly_variables.join(",")));
        query.push(("past_days", self.config.past_days.to_string()));
        query.push((
            "forecast_days",
            requested_forecast_days(self.config.forecast_days).to_string(),
        ));
        query
    }

    fn get(&self, url: &str, query: &[(&'static str, String)]) -> PipelineResult<WeatherResponse> {
        log::debug!("Open-Meteo request: {} {:?}", url, query);
        let response = self.http.get(url).query(query).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let text = response.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl WeatherProvider for OpenMeteoClient {
    fn forecast(&self) -> PipelineResult<WeatherResponse> {
        self.get(&self.config.base_url, &self.forecast_query())
    }

    fn archive(&self, start: NaiveDate, end: NaiveDate) -> PipelineResult<WeatherResponse> {
        let mut query = self.base_query();
        query.push(("start_date", start.format("%Y-%m-%d").to_string()));
        query.push(("end_date", end.format("%Y-%m-%d").to_string()));
        self.get(&self.config.archive_url, &query)
    }

    fn forecast_days(&self) -> u32 {
        self.config.forecast_days
    }

    fn past_days(&self) -> u32 {
        self.config.past_days
    }
}
