//! Remote services, raster files and output records

pub mod raster;
pub mod tile_cache;
pub mod sentinel_hub;
pub mod open_meteo;
pub mod chirps;
pub mod record_writer;

// Re-export main types
pub use raster::RasterIo;
pub use tile_cache::TileCache;
pub use sentinel_hub::{ImageryService, SceneInfo, SentinelHubClient};
pub use open_meteo::{OpenMeteoClient, WeatherField, WeatherProvider, WeatherResponse};
pub use chirps::{ChirpsArchive, DailyRaster, DailyRasterArchive};
pub use record_writer::write_record;
