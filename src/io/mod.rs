//! I/O modules for image folders, file names, station tables and CSV output

pub mod filename;
pub mod image_reader;
pub mod station;
pub mod export;

pub use filename::{normalize_legacy_name, plan_renames, AcquisitionName};
pub use image_reader::{discover_images, read_rgb, SourceImage};
pub use station::{Station, StationTable};
pub use export::{read_daily_table, read_image_table, write_daily_table, write_image_table, ExportOptions};
