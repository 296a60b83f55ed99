use crate::core::retry::{RetryError, RetryPolicy};
use crate::io::sentinel_hub::ImageryService;
use crate::io::tile_cache::{validate_raster_set, TileCache};
use crate::types::{PipelineError, PipelineResult, RasterSet, Tile};
use chrono::{DateTime, Duration, Utc};

/// Imagery search and retry settings for one tile
#[derive(Debug, Clone)]
pub struct TileFetchParams {
    pub lookback_days: i64,
    pub max_cloud: f64,
    pub grid_size: usize,
    pub retry: RetryPolicy,
}

impl Default for TileFetchParams {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            max_cloud: 20.0,
            grid_size: 1024,
            retry: RetryPolicy::new(3, std::time::Duration::from_secs(5)),
        }
    }
}

/// Where a tile's rasters came from, or why it has none
#[derive(Debug, Clone)]
pub enum TileFetch {
    Cached(RasterSet),
    Fetched(RasterSet),
    /// Catalog had no scene in the lookback window
    NoImagery,
    /// Every processing attempt failed
    RetriesExhausted { attempts: u32, last_error: String },
}

impl TileFetch {
    pub fn rasters(&self) -> Option<&RasterSet> {
        match self {
            TileFetch::Cached(set) | TileFetch::Fetched(set) => Some(set),
            _ => None,
        }
    }
}

/// Raster tile fetcher: local cache first, imagery service second
pub struct TileFetcher<'a> {
    imagery: &'a dyn ImageryService,
    cache: TileCache,
    params: TileFetchParams,
}

impl<'a> TileFetcher<'a> {
    pub fn new(imagery: &'a dyn ImageryService, cache: TileCache, params: TileFetchParams) -> Self {
        Self { imagery, cache, params }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Obtain the rasters for `tile`.
    ///
    /// Only fatal errors (credentials, configuration) and catalog failures
    /// are returned as `Err`; a missing scene or exhausted retries are
    /// ordinary outcomes.
    pub fn fetch(&self, tile: &Tile, now: DateTime<Utc>) -> PipelineResult<TileFetch> {
        if self.cache.is_present(tile.id) {
            match self.cache.load(tile) {
                Ok(set) => {
                    log::info!("Tile {}: using cached rasters", tile.id);
                    return Ok(TileFetch::Cached(set));
                }
                Err(e) => {
                    log::warn!("Tile {}: cached rasters rejected, refetching: {}", tile.id, e);
                    self.cache.evict(tile.id);
                }
            }
        }

        let from = now - Duration::days(self.params.lookback_days);
        let scene = match self.imagery.search_scene(&tile.bbox, from, now, self.params.max_cloud)? {
            Some(scene) => scene,
            None => {
                log::warn!(
                    "Tile {}: no imagery with cloud cover < {}% since {}",
                    tile.id,
                    self.params.max_cloud,
                    from.format("%Y-%m-%d")
                );
                return Ok(TileFetch::NoImagery);
            }
        };
        log::info!("Tile {}: processing scene {} ({})", tile.id, scene.id, scene.datetime);

        let label = format!("tile {} imagery request", tile.id);
        let result = self.params.retry.run(
            &label,
            |_| {
                let set = self.imagery.process_tile(tile, &scene, self.params.grid_size)?;
                validate_raster_set(&set, self.params.grid_size)?;
                Ok::<_, PipelineError>(set)
            },
            |e| !e.is_fatal(),
        );

        match result {
            Ok(set) => {
                if let Err(e) = self.cache.store(&set) {
                    log::warn!("Tile {}: failed to cache rasters: {}", tile.id, e);
                }
                Ok(TileFetch::Fetched(set))
            }
            Err(RetryError::Aborted { error, .. }) => Err(error),
            Err(RetryError::Exhausted { attempts, last }) => Ok(TileFetch::RetriesExhausted {
                attempts,
                last_error: last.to_string(),
            }),
        }
    }
}
