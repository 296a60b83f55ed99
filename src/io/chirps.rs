use crate::config::ChirpsConfig;
use crate::io::raster::RasterIo;
use crate::types::{BoundingBox, PipelineError, PipelineResult, ValueGrid};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// One day of gridded precipitation clipped to the area of interest
#[derive(Debug, Clone)]
pub struct DailyRaster {
    pub date: NaiveDate,
    /// Daily total, mm
    pub grid: ValueGrid,
    pub nodata: Option<f64>,
}

/// Archive of daily gridded precipitation rasters
pub trait DailyRasterArchive: Send + Sync {
    /// Raster for `date` clipped to `aoi`
    fn fetch_day(&self, date: NaiveDate, aoi: &BoundingBox) -> PipelineResult<DailyRaster>;
}

/// CHIRPS v2.0 daily GeoTIFF archive
pub struct ChirpsArchive {
    config: ChirpsConfig,
    cache_dir: PathBuf,
    http: reqwest::blocking::Client,
}

impl ChirpsArchive {
    pub fn new<P: AsRef<Path>>(config: ChirpsConfig, cache_dir: P) -> PipelineResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hydrosat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            cache_dir: cache_dir.as_ref().to_path_buf(),
            http,
        })
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}/chirps-v2.0.{}.tif",
            self.config.base_url.trim_end_matches('/'),
            date.format("%Y"),
            date.format("%Y.%m.%d")
        )
    }

    pub fn local_path(&self, date: NaiveDate) -> PathBuf {
        self.cache_dir.join(format!("chirps_{}.tif", date.format("%Y%m%d")))
    }

    fn download(&self, url: &str, output_path: &Path) -> PipelineResult<()> {
        log::debug!("Downloading daily precipitation raster: {}", url);
        let response = self.http.get(url).send()?;
        if !response.status().is_success() {
            return Err(PipelineError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content = response.bytes()?;
        // A real GeoTIFF is far larger than an error page
        if content.len() < 1024 {
            return Err(PipelineError::InvalidRaster(format!(
                "Downloaded file too small ({} bytes), likely an error page",
                content.len()
            )));
        }

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, &content)?;
        log::debug!("Saved {} bytes to {}", content.len(), output_path.display());
        Ok(())
    }
}

impl DailyRasterArchive for ChirpsArchive {
    fn fetch_day(&self, date: NaiveDate, aoi: &BoundingBox) -> PipelineResult<DailyRaster> {
        let path = self.local_path(date);
        if !path.is_file() {
            self.download(&self.url_for(date), &path)?;
        } else {
            log::debug!("Using local daily raster {}", path.display());
        }

        let (grid, nodata) = match RasterIo::read_window_f32(&path, aoi) {
            Ok(read) => read,
            Err(e) => {
                // A corrupt local copy must not block later runs
                if let Err(remove_err) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove unreadable raster {}: {}", path.display(), remove_err);
                }
                return Err(e);
            }
        };
        Ok(DailyRaster { date, grid, nodata })
    }
}
