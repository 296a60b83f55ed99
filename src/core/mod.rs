//! Core acquisition and reconciliation modules

pub mod retry;
pub mod polygonize;
pub mod water_bodies;
pub mod tile_fetch;
pub mod aggregate;
pub mod precipitation;
pub mod weather;
pub mod reconcile;

// Re-export main types
pub use retry::{RetryError, RetryPolicy};
pub use water_bodies::{ExtractorParams, TileExtraction, WaterBodyExtractor};
pub use tile_fetch::{TileFetch, TileFetchParams, TileFetcher};
pub use aggregate::{TileAggregate, TileAggregator, TileOutcome, TileReport};
pub use precipitation::{PrecipitationChain, PrecipitationEstimate, PrecipitationSource};
pub use weather::{CurrentWeather, ForecastDay, WeatherNormalizer, WeatherReport};
pub use reconcile::{reconcile, DomainInputs, ReconciledRecord, SatelliteWaterData};
