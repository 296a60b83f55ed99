use crate::core::tile_fetch::{TileFetch, TileFetcher};
use crate::core::water_bodies::WaterBodyExtractor;
use crate::types::{PipelineError, PipelineResult, Tile, WaterBody, WaterSummary};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;

/// How a tile ended up in the aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum TileOutcome {
    Cached,
    Fetched,
    NoImagery,
    RetriesExhausted(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TileReport {
    pub tile_id: u8,
    pub outcome: TileOutcome,
    pub water_bodies: usize,
}

/// Merged satellite result over all tiles
#[derive(Debug, Clone)]
pub struct TileAggregate {
    pub summary: WaterSummary,
    pub bodies: Vec<WaterBody>,
    pub tiles: Vec<TileReport>,
}

/// Runs fetch + extraction for every tile on a fixed-size worker pool
pub struct TileAggregator<'a> {
    fetcher: TileFetcher<'a>,
    extractor: WaterBodyExtractor,
    workers: usize,
}

impl<'a> TileAggregator<'a> {
    pub fn new(fetcher: TileFetcher<'a>, extractor: WaterBodyExtractor) -> Self {
        Self { fetcher, extractor, workers: 4 }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Process all tiles. A failing tile contributes zero bodies; only a
    /// fatal error aborts the whole aggregate.
    pub fn run(&self, tiles: &[Tile], now: DateTime<Utc>) -> PipelineResult<TileAggregate> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| PipelineError::Processing(format!("Failed to build tile worker pool: {}", e)))?;

        let results: Vec<PipelineResult<(TileReport, Vec<WaterBody>)>> =
            pool.install(|| tiles.par_iter().map(|tile| self.process_tile(tile, now)).collect());

        let mut bodies = Vec::new();
        let mut reports = Vec::with_capacity(tiles.len());
        for result in results {
            let (report, tile_bodies) = result?;
            bodies.extend(tile_bodies);
            reports.push(report);
        }

        let summary = WaterSummary::from_bodies(&bodies);
        log::info!(
            "Processed {} tiles in {:.2}s: {} water bodies, {:.0} m2",
            tiles.len(),
            start.elapsed().as_secs_f64(),
            summary.total_water_bodies,
            summary.total_area_m2
        );
        Ok(TileAggregate { summary, bodies, tiles: reports })
    }

    fn process_tile(&self, tile: &Tile, now: DateTime<Utc>) -> PipelineResult<(TileReport, Vec<WaterBody>)> {
        let start = Instant::now();
        let report = |outcome, water_bodies| TileReport { tile_id: tile.id, outcome, water_bodies };

        let fetched = match self.fetcher.fetch(tile, now) {
            Ok(fetched) => fetched,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::error!("Tile {}: fetch failed: {}", tile.id, e);
                return Ok((report(TileOutcome::Failed(e.to_string()), 0), Vec::new()));
            }
        };

        let (outcome, set) = match fetched {
            TileFetch::Cached(set) => (TileOutcome::Cached, set),
            TileFetch::Fetched(set) => (TileOutcome::Fetched, set),
            TileFetch::NoImagery => return Ok((report(TileOutcome::NoImagery, 0), Vec::new())),
            TileFetch::RetriesExhausted { attempts, last_error } => {
                log::error!("Tile {}: giving up after {} attempts: {}", tile.id, attempts, last_error);
                return Ok((report(TileOutcome::RetriesExhausted(last_error), 0), Vec::new()));
            }
        };

        match self.extractor.extract(&set) {
            Ok(extraction) => {
                log::info!(
                    "Tile {} processed in {:.2}s: {} water bodies",
                    tile.id,
                    start.elapsed().as_secs_f64(),
                    extraction.count()
                );
                Ok((report(outcome, extraction.count()), extraction.bodies))
            }
            Err(e) => {
                log::error!("Tile {}: extraction failed: {}", tile.id, e);
                Ok((report(TileOutcome::Failed(e.to_string()), 0), Vec::new()))
            }
        }
    }
}
