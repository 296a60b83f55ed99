//! hydrosat: water-body and climate acquisition for an area of interest
//!
//! One run splits the area into four tiles, extracts water bodies with
//! turbidity and chlorophyll statistics from Sentinel-2 derived rasters,
//! estimates recent precipitation through a two-tier fallback chain,
//! normalises current and forecast weather, and reconciles everything into a
//! single JSON record with a validity flag.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, GeoTransform, PipelineError, PipelineResult, Polygon, RasterKind, RasterSet,
    Reported, Tile, WaterBody, WaterSummary,
};
pub use config::PipelineConfig;
pub use pipeline::{run_from_config, Pipeline, PipelineRun, PipelineSettings, RemoteServices};
pub use crate::core::reconcile::ReconciledRecord;
