//! Weather normaliser: turns raw Open-Meteo series into one current sample
//! and a fixed number of daily forecast aggregates.
//!
//! Missing or non-finite values default to 0 and are recorded in
//! `defaulted`, which the reconciler uses to judge completeness.

use crate::io::open_meteo::{SeriesBlock, WeatherField, WeatherProvider, WeatherResponse};
use crate::types::Reported;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

/// Most recent observation at the weather point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWeather {
    pub time: DateTime<Utc>,
    pub precipitation: f64,
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub soil_moisture_0_to_1cm: f64,
    pub wind_speed_10m: f64,
    pub evapotranspiration: f64,
    #[serde(skip)]
    pub defaulted: Vec<WeatherField>,
}

impl CurrentWeather {
    fn empty(time: DateTime<Utc>) -> Self {
        Self {
            time,
            precipitation: 0.0,
            temperature_2m: 0.0,
            relative_humidity_2m: 0.0,
            soil_moisture_0_to_1cm: 0.0,
            wind_speed_10m: 0.0,
            evapotranspiration: 0.0,
            defaulted: Vec::new(),
        }
    }

    fn slot(&mut self, field: WeatherField) -> &mut f64 {
        match field {
            WeatherField::Precipitation => &mut self.precipitation,
            WeatherField::Temperature => &mut self.temperature_2m,
            WeatherField::RelativeHumidity => &mut self.relative_humidity_2m,
            WeatherField::SoilMoisture => &mut self.soil_moisture_0_to_1cm,
            WeatherField::WindSpeed => &mut self.wind_speed_10m,
            WeatherField::Evapotranspiration => &mut self.evapotranspiration,
        }
    }

    /// All six fields came from the source
    pub fn is_complete(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Aggregate of one UTC calendar day of hourly forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub precipitation_total_mm: f64,
    pub temperature_mean_c: f64,
    pub relative_humidity_mean_percent: f64,
    pub soil_moisture_mean_m3_m3: f64,
    pub wind_speed_mean_kmh: f64,
    pub evapotranspiration_mean_mm: f64,
    #[serde(skip)]
    pub defaulted: Vec<WeatherField>,
}

impl ForecastDay {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            precipitation_total_mm: 0.0,
            temperature_mean_c: 0.0,
            relative_humidity_mean_percent: 0.0,
            soil_moisture_mean_m3_m3: 0.0,
            wind_speed_mean_kmh: 0.0,
            evapotranspiration_mean_mm: 0.0,
            defaulted: Vec::new(),
        }
    }

    fn slot(&mut self, field: WeatherField) -> &mut f64 {
        match field {
            WeatherField::Precipitation => &mut self.precipitation_total_mm,
            WeatherField::Temperature => &mut self.temperature_mean_c,
            WeatherField::RelativeHumidity => &mut self.relative_humidity_mean_percent,
            WeatherField::SoilMoisture => &mut self.soil_moisture_mean_m3_m3,
            WeatherField::WindSpeed => &mut self.wind_speed_mean_kmh,
            WeatherField::Evapotranspiration => &mut self.evapotranspiration_mean_mm,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Index of the latest sample not after `now`.
///
/// When every sample lies in the future the earliest one is used, so a
/// non-empty block always yields a sample.
pub fn select_current_index(block: &SeriesBlock, now: DateTime<Utc>) -> Option<usize> {
    let cutoff = now.timestamp();
    let past = block
        .time
        .iter()
        .enumerate()
        .filter(|(_, t)| **t <= cutoff)
        .max_by_key(|(_, t)| **t)
        .map(|(i, _)| i);

    past.or_else(|| block.time.iter().enumerate().min_by_key(|(_, t)| **t).map(|(i, _)| i))
}

fn has_tracked_series(block: &SeriesBlock) -> bool {
    !block.is_empty() && WeatherField::ALL.iter().any(|f| block.series(*f).is_some())
}

/// Current conditions, preferring the 15-minute block over the hourly one.
///
/// A field the 15-minute block lacks at the selected sample is taken from
/// the hourly sample chosen by the same rule before it is defaulted.
pub fn current_weather(response: &WeatherResponse, now: DateTime<Utc>) -> Reported<CurrentWeather> {
    let hourly = response.hourly.as_ref().filter(|h| !h.is_empty());
    let (block, fallback) = match (&response.minutely_15, hourly) {
        (Some(minutely), hourly) if has_tracked_series(minutely) => (minutely, hourly),
        (_, Some(hourly)) => (hourly, None),
        _ => {
            log::warn!("Weather response has no usable series for current conditions");
            return Reported::Unavailable;
        }
    };

    let index = match select_current_index(block, now) {
        Some(i) => i,
        None => return Reported::Unavailable,
    };
    let time = match block.timestamp(index) {
        Some(t) => t,
        None => return Reported::Unavailable,
    };
    let fallback = fallback.and_then(|h| select_current_index(h, now).map(|i| (h, i)));

    let mut current = CurrentWeather::empty(time);
    for field in WeatherField::ALL {
        let value = block
            .value(field, index)
            .or_else(|| fallback.and_then(|(h, i)| h.value(field, i)));
        match value {
            Some(v) => *current.slot(field) = v,
            None => current.defaulted.push(field),
        }
    }
    if !current.is_complete() {
        log::warn!("Current weather at {}: defaulted {:?}", time, current.defaulted);
    }
    Reported::Available(current)
}

/// Next UTC midnight strictly after `now`
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Daily aggregates for `days` UTC days starting at the next midnight.
/// Precipitation is summed, every other field averaged.
pub fn daily_forecast(response: &WeatherResponse, now: DateTime<Utc>, days: u32) -> Reported<Vec<ForecastDay>> {
    let hourly = match &response.hourly {
        Some(h) if !h.is_empty() => h,
        _ => {
            log::warn!("Weather response has no hourly series for the forecast");
            return Reported::Unavailable;
        }
    };

    let first = next_utc_midnight(now);
    let forecast = (0..i64::from(days))
        .map(|d| {
            let start = first + Duration::days(d);
            let end = start + Duration::days(1);
            let indices: Vec<usize> = hourly
                .time
                .iter()
                .enumerate()
                .filter(|(_, t)| **t >= start.timestamp() && **t < end.timestamp())
                .map(|(i, _)| i)
                .collect();

            let mut day = ForecastDay::empty(start.date_naive());
            for field in WeatherField::ALL {
                let values: Vec<f64> = indices.iter().filter_map(|i| hourly.value(field, *i)).collect();
                if values.is_empty() {
                    day.defaulted.push(field);
                    continue;
                }
                let total: f64 = values.iter().sum();
                *day.slot(field) = match field {
                    WeatherField::Precipitation => total,
                    _ => total / values.len() as f64,
                };
            }
            if !day.is_complete() {
                log::warn!("Forecast {}: defaulted {:?}", day.date, day.defaulted);
            }
            day
        })
        .collect();

    Reported::Available(forecast)
}

/// Current conditions plus daily forecast from one provider call
#[derive(Debug, Clone)]
pub struct WeatherReport {
    pub current: Reported<CurrentWeather>,
    pub forecast: Reported<Vec<ForecastDay>>,
}

pub struct WeatherNormalizer<'a> {
    provider: &'a dyn WeatherProvider,
}

impl<'a> WeatherNormalizer<'a> {
    pub fn new(provider: &'a dyn WeatherProvider) -> Self {
        Self { provider }
    }

    /// Fetch and normalise. A failed request makes both parts unavailable.
    pub fn report(&self, now: DateTime<Utc>) -> WeatherReport {
        match self.provider.forecast() {
            Ok(response) => WeatherReport {
                current: current_weather(&response, now),
                forecast: daily_forecast(&response, now, self.provider.forecast_days()),
            },
            Err(e) => {
                log::error!("Weather request failed: {}", e);
                WeatherReport {
                    current: Reported::Unavailable,
                    forecast: Reported::Unavailable,
                }
            }
        }
    }
}
