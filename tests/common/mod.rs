//! In-memory stand-ins for the remote services, shared by the integration
//! tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hydrosat::io::{DailyRaster, DailyRasterArchive, ImageryService, SceneInfo, WeatherProvider, WeatherResponse};
use hydrosat::{BoundingBox, GeoTransform, PipelineError, PipelineResult, RasterSet, Tile};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 8, 10, 30, 0).unwrap()
}

pub fn aoi() -> BoundingBox {
    BoundingBox::new(36.0, -2.0, 38.0, 0.0).unwrap()
}

/// Raster set for `tile` with one `side` x `side` water body at (2, 2)
pub fn square_body_set(tile: &Tile, grid: usize, side: usize, turbidity: f32, chlorophyll: f32) -> RasterSet {
    let mut water_mask = Array2::<u8>::zeros((grid, grid));
    for r in 2..2 + side {
        for c in 2..2 + side {
            water_mask[[r, c]] = 1;
        }
    }
    RasterSet {
        tile_id: tile.id,
        water_mask,
        turbidity: Array2::from_elem((grid, grid), turbidity),
        chlorophyll: Array2::from_elem((grid, grid), chlorophyll),
        transform: GeoTransform::from_bounds(&tile.bbox, grid, grid),
    }
}

pub type ProcessFn = Box<dyn Fn(&Tile, usize) -> PipelineResult<RasterSet> + Send + Sync>;

/// Imagery service with a fixed catalog answer and a scripted processor
pub struct FakeImagery {
    pub has_scene: bool,
    pub process: ProcessFn,
    pub search_calls: AtomicUsize,
    pub process_calls: AtomicUsize,
}

impl FakeImagery {
    pub fn new<F>(has_scene: bool, process: F) -> Self
    where
        F: Fn(&Tile, usize) -> PipelineResult<RasterSet> + Send + Sync + 'static,
    {
        Self {
            has_scene,
            process: Box::new(process),
            search_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_imagery() -> Self {
        Self::new(false, |tile, _| {
            Err(PipelineError::Processing(format!("unexpected call for tile {}", tile.id)))
        })
    }

    pub fn remote_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst) + self.process_calls.load(Ordering::SeqCst)
    }
}

impl ImageryService for FakeImagery {
    fn search_scene(
        &self,
        _bbox: &BoundingBox,
        _from: DateTime<Utc>,
        to: DateTime<Utc>,
        _max_cloud: f64,
    ) -> PipelineResult<Option<SceneInfo>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_scene.then(|| SceneInfo {
            id: "S2A_TEST".to_string(),
            datetime: to,
            cloud_cover: Some(3.0),
        }))
    }

    fn process_tile(&self, tile: &Tile, _scene: &SceneInfo, grid_size: usize) -> PipelineResult<RasterSet> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        (self.process)(tile, grid_size)
    }
}

/// Weather provider answering from canned responses; `None` means the
/// request fails
pub struct FakeWeather {
    pub forecast: Option<WeatherResponse>,
    pub archive: Option<WeatherResponse>,
    pub forecast_days: u32,
    pub past_days: u32,
    pub archive_calls: AtomicUsize,
}

impl FakeWeather {
    pub fn new(forecast: Option<WeatherResponse>, archive: Option<WeatherResponse>) -> Self {
        Self {
            forecast,
            archive,
            forecast_days: 7,
            past_days: 7,
            archive_calls: AtomicUsize::new(0),
        }
    }
}

impl WeatherProvider for FakeWeather {
    fn forecast(&self) -> PipelineResult<WeatherResponse> {
        self.forecast
            .clone()
            .ok_or_else(|| PipelineError::Http("connection refused".to_string()))
    }

    fn archive(&self, _start: NaiveDate, _end: NaiveDate) -> PipelineResult<WeatherResponse> {
        self.archive_calls.fetch_add(1, Ordering::SeqCst);
        self.archive
            .clone()
            .ok_or_else(|| PipelineError::Http("connection refused".to_string()))
    }

    fn forecast_days(&self) -> u32 {
        self.forecast_days
    }

    fn past_days(&self) -> u32 {
        self.past_days
    }
}

/// Daily raster archive holding a uniform daily total for some dates
#[derive(Default)]
pub struct FakeArchive {
    pub days: HashMap<NaiveDate, f32>,
    pub requested: std::sync::Mutex<Vec<NaiveDate>>,
}

impl FakeArchive {
    pub fn with_day(date: NaiveDate, mm_per_day: f32) -> Self {
        let mut archive = Self::default();
        archive.days.insert(date, mm_per_day);
        archive
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }
}

impl DailyRasterArchive for FakeArchive {
    fn fetch_day(&self, date: NaiveDate, _aoi: &BoundingBox) -> PipelineResult<DailyRaster> {
        self.requested.lock().unwrap().push(date);
        match self.days.get(&date) {
            Some(value) => Ok(DailyRaster {
                date,
                grid: Array2::from_elem((4, 4), *value),
                nodata: Some(-9999.0),
            }),
            None => Err(PipelineError::Status {
                status: 404,
                url: format!("chirps/{}", date),
            }),
        }
    }
}

/// Hourly block of `hours` samples from `start` with every tracked variable
/// set to `value`
pub fn hourly_response(start: DateTime<Utc>, hours: i64, value: f64) -> WeatherResponse {
    use hydrosat::io::open_meteo::SeriesBlock;
    use hydrosat::io::WeatherField;

    let time: Vec<i64> = (0..hours).map(|h| start.timestamp() + h * 3600).collect();
    let variables = WeatherField::ALL
        .iter()
        .map(|f| (f.api_name().to_string(), vec![Some(value); hours as usize]))
        .collect();
    WeatherResponse {
        hourly: Some(SeriesBlock { time, variables }),
        ..Default::default()
    }
}

/// Hourly block shaped like a real forecast answer: it starts at 00:00 UTC
/// `past_days` before `now` and covers `past_days + requested_days` days
pub fn forecast_window_response(now: DateTime<Utc>, past_days: u32, requested_days: u32, value: f64) -> WeatherResponse {
    let today = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
    let start = today - chrono::Duration::days(i64::from(past_days));
    hourly_response(start, i64::from(past_days + requested_days) * 24, value)
}
