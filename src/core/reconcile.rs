//! Merge the satellite, precipitation and weather domains into one record.
//!
//! Every domain appears in the record whether or not it succeeded: a failed
//! or inconsistent satellite domain becomes the zero-body summary and a
//! failed climate domain becomes `"unavailable"`. The overall flag is true only when every
//! domain is present and complete.

use crate::core::aggregate::TileAggregate;
use crate::core::precipitation::{PrecipitationEstimate, PrecipitationSource};
use crate::core::weather::{CurrentWeather, ForecastDay, WeatherReport};
use crate::types::{Reported, WaterBody, WaterSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SatelliteWaterData {
    pub summary: WaterSummary,
    pub water_bodies: Vec<WaterBody>,
}

impl From<TileAggregate> for SatelliteWaterData {
    fn from(aggregate: TileAggregate) -> Self {
        Self {
            summary: aggregate.summary,
            water_bodies: aggregate.bodies,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateData {
    pub precipitation_mm_per_hr: Reported<f64>,
    pub precipitation_source: Reported<PrecipitationSource>,
    pub current: Reported<CurrentWeather>,
    pub forecast: Reported<Vec<ForecastDay>>,
}

/// Per-domain validity behind the overall flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DomainValidity {
    pub satellite: bool,
    pub precipitation: bool,
    pub current: bool,
    pub forecast: bool,
}

impl DomainValidity {
    pub fn all(&self) -> bool {
        self.satellite && self.precipitation && self.current && self.forecast
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciledRecord {
    pub timestamp: DateTime<Utc>,
    pub satellite_water_data: SatelliteWaterData,
    pub climate: ClimateData,
    pub valid: bool,
    pub validity: DomainValidity,
}

/// Everything the reconciler needs from one pipeline run
#[derive(Debug, Clone)]
pub struct DomainInputs {
    /// `None` when the satellite stage failed outright
    pub satellite: Option<SatelliteWaterData>,
    /// `None` when the precipitation stage produced nothing at all
    pub precipitation: Option<PrecipitationEstimate>,
    pub weather: WeatherReport,
}

fn satellite_is_valid(data: &SatelliteWaterData) -> bool {
    let summary = &data.summary;
    let area: f64 = data.water_bodies.iter().map(|b| b.area_m2).sum();
    summary.is_complete()
        && !data.water_bodies.is_empty()
        && summary.total_water_bodies == data.water_bodies.len()
        && (summary.total_area_m2 - area).abs() <= 1e-6 * area.max(1.0)
}

/// Build the record and the overall validity flag
pub fn reconcile(inputs: DomainInputs, now: DateTime<Utc>) -> (ReconciledRecord, bool) {
    let mut validity = DomainValidity::default();

    let satellite_water_data = match inputs.satellite {
        Some(data) if satellite_is_valid(&data) => {
            validity.satellite = true;
            data
        }
        Some(data) => {
            log::warn!(
                "Satellite data incomplete ({} bodies, summary {:?}); reporting zero water bodies",
                data.water_bodies.len(),
                data.summary
            );
            SatelliteWaterData::default()
        }
        None => {
            log::warn!("Satellite data missing; reporting zero water bodies");
            SatelliteWaterData::default()
        }
    };

    let (precipitation_mm_per_hr, precipitation_source) = match inputs.precipitation {
        Some(estimate) => {
            validity.precipitation = estimate.mm_per_hr.is_finite();
            if !estimate.is_measurement() {
                log::warn!("Precipitation is the fallback value {}", estimate.mm_per_hr);
            }
            (Reported::Available(estimate.mm_per_hr), Reported::Available(estimate.source))
        }
        None => {
            log::warn!("Precipitation missing");
            (Reported::Unavailable, Reported::Unavailable)
        }
    };

    let timestamp = match &inputs.weather.current {
        Reported::Available(current) => current.time,
        Reported::Unavailable => now,
    };

    validity.current = matches!(&inputs.weather.current, Reported::Available(c) if c.is_complete());
    let current = if validity.current {
        inputs.weather.current
    } else {
        log::warn!("Current weather missing or incomplete");
        Reported::Unavailable
    };

    validity.forecast = matches!(
        &inputs.weather.forecast,
        Reported::Available(days) if days.iter().all(ForecastDay::is_complete)
    );
    let forecast = if validity.forecast {
        inputs.weather.forecast
    } else {
        log::warn!("Forecast missing or incomplete");
        Reported::Unavailable
    };

    let valid = validity.all();
    let record = ReconciledRecord {
        timestamp,
        satellite_water_data,
        climate: ClimateData {
            precipitation_mm_per_hr,
            precipitation_source,
            current,
            forecast,
        },
        valid,
        validity,
    };
    (record, valid)
}
