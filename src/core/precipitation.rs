//! Precipitation fallback chain.
//!
//! Tier 1: mean of the reanalysis archive's hourly precipitation over the
//! last `past_days` days (ending yesterday). An empty or all-zero series is
//! a tier failure, not a zero measurement.
//!
//! Tier 2: daily precipitation rasters, walking back one day at a time from
//! yesterday for at most `max_attempts` days. The first day that downloads
//! yields the AOI mean divided by 24 (mm/day to mm/hr).
//!
//! When both tiers fail the estimate is the sentinel 0 with source
//! [`PrecipitationSource::Sentinel`].

use crate::core::retry::{RetryError, RetryPolicy};
use crate::io::chirps::{DailyRaster, DailyRasterArchive};
use crate::io::open_meteo::{WeatherField, WeatherProvider};
use crate::types::{BoundingBox, PipelineError, PipelineResult};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipitationSource {
    Reanalysis,
    DailyRaster,
    /// Both tiers failed; the value is a placeholder
    Sentinel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecipitationEstimate {
    pub mm_per_hr: f64,
    pub source: PrecipitationSource,
    /// Day of the daily raster used, for the second tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raster_date: Option<NaiveDate>,
}

impl PrecipitationEstimate {
    pub fn sentinel() -> Self {
        Self {
            mm_per_hr: 0.0,
            source: PrecipitationSource::Sentinel,
            raster_date: None,
        }
    }

    /// True when the value comes from an actual data source
    pub fn is_measurement(&self) -> bool {
        self.source != PrecipitationSource::Sentinel
    }
}

/// Mean of the finite entries of a precipitation series, or `None` when the
/// series is degenerate (no finite entry, or all zero).
pub fn series_mean(series: &[Option<f64>]) -> Option<f64> {
    let values: Vec<f64> = series.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() || values.iter().all(|v| *v == 0.0) {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean daily total over the valid pixels of a clipped raster.
/// Nodata, negative and non-finite pixels are excluded.
pub fn daily_area_mean(raster: &DailyRaster) -> Option<f64> {
    let nodata = raster.nodata;
    let (sum, count) = raster
        .grid
        .iter()
        .map(|v| *v as f64)
        .filter(|v| v.is_finite() && *v >= 0.0 && nodata.map_or(true, |nd| *v != nd))
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

pub struct PrecipitationChain<'a> {
    reanalysis: &'a dyn WeatherProvider,
    archive: &'a dyn DailyRasterArchive,
    aoi: BoundingBox,
    walk: RetryPolicy,
}

impl<'a> PrecipitationChain<'a> {
    pub fn new(
        reanalysis: &'a dyn WeatherProvider,
        archive: &'a dyn DailyRasterArchive,
        aoi: BoundingBox,
        max_days: u32,
    ) -> Self {
        Self {
            reanalysis,
            archive,
            aoi,
            walk: RetryPolicy::new(max_days, std::time::Duration::ZERO),
        }
    }

    /// Best-effort precipitation estimate for the day before `today`
    pub fn estimate(&self, today: NaiveDate) -> PrecipitationEstimate {
        match self.reanalysis_mean(today) {
            Ok(mm_per_hr) => {
                log::info!("Reanalysis precipitation: {:.4} mm/hr", mm_per_hr);
                return PrecipitationEstimate {
                    mm_per_hr,
                    source: PrecipitationSource::Reanalysis,
                    raster_date: None,
                };
            }
            Err(e) => log::warn!("Reanalysis precipitation unavailable, trying daily rasters: {}", e),
        }

        match self.daily_raster_mean(today) {
            Ok((date, mm_per_hr)) => {
                log::info!("Daily raster precipitation for {}: {:.4} mm/hr", date, mm_per_hr);
                PrecipitationEstimate {
                    mm_per_hr,
                    source: PrecipitationSource::DailyRaster,
                    raster_date: Some(date),
                }
            }
            Err(e) => {
                log::warn!("No precipitation data available ({}); using fallback value 0", e);
                PrecipitationEstimate::sentinel()
            }
        }
    }

    fn reanalysis_mean(&self, today: NaiveDate) -> PipelineResult<f64> {
        let days = i64::from(self.reanalysis.past_days().max(1));
        let end = today - Duration::days(1);
        let start = end - Duration::days(days - 1);
        let response = self.reanalysis.archive(start, end)?;

        let series = response
            .hourly
            .as_ref()
            .and_then(|h| h.series(WeatherField::Precipitation))
            .ok_or_else(|| PipelineError::Processing("no hourly precipitation series".to_string()))?;
        series_mean(series).ok_or_else(|| {
            PipelineError::Processing(format!("degenerate precipitation series ({} samples)", series.len()))
        })
    }

    fn daily_raster_mean(&self, today: NaiveDate) -> PipelineResult<(NaiveDate, f64)> {
        let first = today - Duration::days(1);
        self.walk
            .run(
                "daily precipitation archive",
                |days_back| {
                    let date = first - Duration::days(i64::from(days_back));
                    let raster = self.archive.fetch_day(date, &self.aoi)?;
                    let daily = daily_area_mean(&raster).ok_or_else(|| {
                        PipelineError::InvalidRaster(format!("no valid pixels over the AOI for {}", date))
                    })?;
                    Ok::<_, PipelineError>((date, daily / 24.0))
                },
                |_| true,
            )
            .map_err(RetryError::into_inner)
    }
}
