//! One on-demand acquisition run: satellite tiles, precipitation and weather
//! are gathered independently and merged into a single record.

use crate::config::PipelineConfig;
use crate::core::aggregate::{TileAggregator, TileReport};
use crate::core::precipitation::PrecipitationChain;
use crate::core::reconcile::{reconcile, DomainInputs, ReconciledRecord, SatelliteWaterData};
use crate::core::retry::RetryPolicy;
use crate::core::tile_fetch::{TileFetchParams, TileFetcher};
use crate::core::water_bodies::WaterBodyExtractor;
use crate::core::weather::WeatherNormalizer;
use crate::io::chirps::{ChirpsArchive, DailyRasterArchive};
use crate::io::open_meteo::{OpenMeteoClient, WeatherProvider};
use crate::io::sentinel_hub::{ImageryService, SentinelHubClient};
use crate::io::tile_cache::TileCache;
use crate::types::{BoundingBox, PipelineResult};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Instant;

/// Run parameters derived from the configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub aoi: BoundingBox,
    pub fetch: TileFetchParams,
    pub tile_cache_dir: PathBuf,
    /// Days the daily precipitation archive walks back
    pub precipitation_max_days: u32,
    pub workers: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<Self> {
        let sh = &config.sentinelhub;
        Ok(Self {
            aoi: config.area_of_interest()?,
            fetch: TileFetchParams {
                lookback_days: sh.lookback_days,
                max_cloud: sh.max_cloud,
                grid_size: sh.grid_size,
                retry: RetryPolicy::new(sh.retry_attempts, sh.retry_delay()),
            },
            tile_cache_dir: config.cache.sentinel_dir(),
            precipitation_max_days: config.chirps.max_attempts,
            workers: 4,
        })
    }
}

/// Output of one run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub record: ReconciledRecord,
    pub valid: bool,
    pub tiles: Vec<TileReport>,
}

pub struct Pipeline<'a> {
    settings: PipelineSettings,
    imagery: &'a dyn ImageryService,
    weather: &'a dyn WeatherProvider,
    archive: &'a dyn DailyRasterArchive,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        settings: PipelineSettings,
        imagery: &'a dyn ImageryService,
        weather: &'a dyn WeatherProvider,
        archive: &'a dyn DailyRasterArchive,
    ) -> Self {
        Self { settings, imagery, weather, archive }
    }

    /// Execute every stage and reconcile.
    ///
    /// Only fatal errors (configuration, credentials) are returned; any
    /// other failure shows up as a degraded domain in the record.
    pub fn run(&self, now: DateTime<Utc>) -> PipelineResult<PipelineRun> {
        let start = Instant::now();
        log::info!("Starting acquisition run for {:?}", self.settings.aoi);

        let (satellite, tiles) = self.satellite_stage(now)?;

        let (precipitation, weather) = rayon::join(
            || {
                let chain = PrecipitationChain::new(
                    self.weather,
                    self.archive,
                    self.settings.aoi,
                    self.settings.precipitation_max_days,
                );
                chain.estimate(now.date_naive())
            },
            || WeatherNormalizer::new(self.weather).report(now),
        );

        let (record, valid) = reconcile(
            DomainInputs {
                satellite,
                precipitation: Some(precipitation),
                weather,
            },
            now,
        );

        log::info!(
            "Run finished in {:.2}s, valid = {} ({:?})",
            start.elapsed().as_secs_f64(),
            valid,
            record.validity
        );
        Ok(PipelineRun { record, valid, tiles })
    }

    fn satellite_stage(
        &self,
        now: DateTime<Utc>,
    ) -> PipelineResult<(Option<SatelliteWaterData>, Vec<TileReport>)> {
        let tiles = self.settings.aoi.split_quadrants();
        let cache = TileCache::new(&self.settings.tile_cache_dir, self.settings.fetch.grid_size);
        let fetcher = TileFetcher::new(self.imagery, cache, self.settings.fetch.clone());
        let aggregator =
            TileAggregator::new(fetcher, WaterBodyExtractor::new()).with_workers(self.settings.workers);

        match aggregator.run(&tiles, now) {
            Ok(aggregate) => {
                let reports = aggregate.tiles.clone();
                Ok((Some(aggregate.into()), reports))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::error!("Satellite stage failed: {}", e);
                Ok((None, Vec::new()))
            }
        }
    }
}

/// Production clients built from the configuration
pub struct RemoteServices {
    pub imagery: SentinelHubClient,
    pub weather: OpenMeteoClient,
    pub archive: ChirpsArchive,
}

impl RemoteServices {
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<Self> {
        let (lat, lon) = config.weather_point()?;
        Ok(Self {
            imagery: SentinelHubClient::new(config.sentinelhub.clone())?,
            weather: OpenMeteoClient::new(config.open_meteo.clone(), lat, lon)?,
            archive: ChirpsArchive::new(config.chirps.clone(), config.cache.chirps_dir())?,
        })
    }
}

/// Build the production clients and run once
pub fn run_from_config(config: &PipelineConfig, now: DateTime<Utc>) -> PipelineResult<PipelineRun> {
    let settings = PipelineSettings::from_config(config)?;
    let services = RemoteServices::from_config(config)?;
    Pipeline::new(settings, &services.imagery, &services.weather, &services.archive).run(now)
}
