//! Core PhenoCam processing modules

pub mod roi;
pub mod solar;
pub mod stats;
pub mod extract;
pub mod aggregate;
pub mod quality;
pub mod calendar;
pub mod time_filter;
pub mod composite;

// Re-export main types
pub use roi::{build_mask, Roi};
pub use solar::{solar_elevation, SolarGeometry};
pub use extract::{apply_mask, channel_means, chromatic_coordinates, IndexExtractor};
pub use aggregate::{aggregate, AggregationState, DailyAggregator};
pub use quality::{CountClass, ImageCountThresholds, QualityFlag, QualityFlagAssigner};
pub use calendar::complete;
pub use time_filter::TimeWindow;
pub use composite::DailyComposite;
