//! End-to-end processing of one camera's image folder

use crate::core::aggregate::DailyAggregator;
use crate::core::calendar::complete;
use crate::core::composite::{chromatic_coordinates, DailyComposite};
use crate::core::extract::IndexExtractor;
use crate::core::quality::{ImageCountThresholds, QualityFlagAssigner};
use crate::core::roi::Roi;
use crate::core::solar::SolarGeometry;
use crate::core::time_filter::TimeWindow;
use crate::io::export::{daily_table_path, image_table_path, write_daily_table, write_image_table, ExportOptions};
use crate::io::filename::AcquisitionName;
use crate::io::image_reader::{
    discover_images, image_dimensions, read_rgb, write_index_raster, write_rgb, SourceImage, SNOW_FOLDER,
};
use crate::types::{
    DailyRecord, ImageRecord, Mask, PhenoError, PhenoResult, SnowEncoding, SnowTag,
};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What to do with an image that cannot be processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the file and carry on
    #[default]
    Skip,
    /// Stop the run at the first bad file
    Abort,
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Region of interest; `None` uses the whole image
    pub roi: Option<Roi>,
    pub snow_encoding: SnowEncoding,
    /// Station geometry for solar angles and quality flags
    pub solar: Option<SolarGeometry>,
    pub thresholds: ImageCountThresholds,
    /// Only use images acquired inside this window
    pub time_window: Option<TimeWindow>,
    pub error_policy: ErrorPolicy,
    pub parallel: bool,
    pub include_units_row: bool,
    /// Year of the series; taken from the first image when unset
    pub year: Option<i32>,
    /// Camera id for output names; taken from the first image when unset
    pub station_id: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roi: None,
            snow_encoding: SnowEncoding::default(),
            solar: None,
            thresholds: ImageCountThresholds::default(),
            time_window: None,
            error_policy: ErrorPolicy::default(),
            parallel: true,
            include_units_row: true,
            year: None,
            station_id: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> PhenoResult<()> {
        self.thresholds.validate()?;
        if let Some(window) = &self.time_window {
            window.validate()?;
        }
        if let Some(solar) = &self.solar {
            SolarGeometry::new(solar.latitude, solar.longitude, solar.utc_offset_hours)?;
        }
        if let Some(year) = self.year {
            if !(1900..=9999).contains(&year) {
                return Err(PhenoError::Config(format!("Year {} out of range", year)));
            }
        }
        Ok(())
    }
}

/// An image left out of the series and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub file_name: String,
    pub reason: String,
}

/// Tables produced by one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub station_id: String,
    pub year: i32,
    /// Per-image records sorted by file name
    pub images: Vec<ImageRecord>,
    /// One record per calendar day of `year`
    pub daily: Vec<DailyRecord>,
    pub skipped: Vec<SkippedImage>,
}

#[derive(Debug, Clone)]
struct Candidate {
    source: SourceImage,
    name: AcquisitionName,
}

/// Daily GCC/RCC time series for one camera
pub struct PhenoCamPipeline {
    config: PipelineConfig,
    assigner: QualityFlagAssigner,
}

impl PhenoCamPipeline {
    pub fn new(config: PipelineConfig) -> PhenoResult<Self> {
        config.validate()?;
        let assigner = QualityFlagAssigner::new(config.thresholds)?;
        Ok(Self { config, assigner })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            include_solar: self.config.solar.is_some(),
            include_units_row: self.config.include_units_row,
            snow_encoding: self.config.snow_encoding,
        }
    }

    fn reject(&self, file_name: &str, err: PhenoError, skipped: &mut Vec<SkippedImage>) -> PhenoResult<()> {
        if !err.is_per_file() || self.config.error_policy == ErrorPolicy::Abort {
            log::error!("{}: {}", file_name, err);
            return Err(err);
        }
        log::warn!("Skipping {}: {}", file_name, err);
        skipped.push(SkippedImage {
            file_name: file_name.to_string(),
            reason: err.to_string(),
        });
        Ok(())
    }

    fn mask_for(&self, width: usize, height: usize) -> Mask {
        match &self.config.roi {
            Some(roi) => roi.build_mask(width, height),
            None => Array2::from_elem((height, width), 1u8),
        }
    }

    fn extract_one(candidate: &Candidate, mask: &Mask, extractor: &IndexExtractor) -> PhenoResult<ImageRecord> {
        let image = read_rgb(&candidate.source.path)?;
        extractor.extract(&image, mask, &candidate.name, candidate.source.snow)
    }

    fn extract_all(
        &self,
        candidates: &[Candidate],
        mask: &Mask,
        extractor: &IndexExtractor,
    ) -> Vec<PhenoResult<ImageRecord>> {
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                use rayon::prelude::*;
                return candidates
                    .par_iter()
                    .map(|c| Self::extract_one(c, mask, extractor))
                    .collect();
            }
        }
        candidates
            .iter()
            .map(|c| Self::extract_one(c, mask, extractor))
            .collect()
    }

    /// Process every image under `dir` into per-image and daily tables
    pub fn run(&self, dir: &Path) -> PhenoResult<PipelineOutput> {
        let sources = discover_images(dir)?;
        let mut skipped = Vec::new();

        let mut candidates = Vec::with_capacity(sources.len());
        for source in sources {
            match AcquisitionName::from_path(&source.path) {
                Ok(name) => candidates.push(Candidate { source, name }),
                Err(e) => self.reject(&source.file_name(), e, &mut skipped)?,
            }
        }
        candidates.sort_by(|a, b| a.name.file_name.cmp(&b.name.file_name));

        let first = candidates.first();
        let year = match (self.config.year, first) {
            (Some(year), _) => year,
            (None, Some(c)) => c.name.year(),
            (None, None) => {
                return Err(PhenoError::Config(format!(
                    "No usable images in {} and no year configured",
                    dir.display()
                )))
            }
        };
        let station_id = match (&self.config.station_id, first) {
            (Some(id), _) => id.clone(),
            (None, Some(c)) => c.name.station_id.clone(),
            (None, None) => "unknown".to_string(),
        };
        log::info!("Processing {} for {} from {}", station_id, year, dir.display());

        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let file_name = candidate.name.file_name.clone();
            if candidate.name.year() != year {
                let err = PhenoError::invalid_filename(
                    &file_name,
                    format!("acquired in {}, run year is {}", candidate.name.year(), year),
                );
                self.reject(&file_name, err, &mut skipped)?;
                continue;
            }
            if candidate.name.station_id != station_id {
                let err = PhenoError::invalid_filename(
                    &file_name,
                    format!("belongs to camera {}, not {}", candidate.name.station_id, station_id),
                );
                self.reject(&file_name, err, &mut skipped)?;
                continue;
            }
            if let Some(window) = &self.config.time_window {
                if !window.contains(candidate.name.hour()) {
                    log::debug!("{} is outside {}", file_name, window);
                    continue;
                }
            }
            kept.push(candidate);
        }

        let (width, height) = kept
            .iter()
            .find_map(|c| image_dimensions(&c.source.path).ok())
            .unwrap_or((0, 0));
        let mask = self.mask_for(width, height);
        let extractor = IndexExtractor::new(self.config.solar);

        log::info!("Extracting ROI statistics from {} images", kept.len());
        let results = self.extract_all(&kept, &mask, &extractor);

        let mut images = Vec::with_capacity(results.len());
        for (candidate, result) in kept.iter().zip(results) {
            match result {
                Ok(record) => images.push(record),
                Err(e) => self.reject(&candidate.name.file_name, e, &mut skipped)?,
            }
        }
        images.sort_by(|a, b| a.filename.cmp(&b.filename));

        let mut aggregator = DailyAggregator::new();
        aggregator.extend(&images);
        let daily = complete(&aggregator.finish(year, &self.assigner), year);

        log::info!(
            "{} {}: {} images used, {} skipped, {} days with data",
            station_id,
            year,
            images.len(),
            skipped.len(),
            daily.iter().filter(|d| !d.is_missing()).count()
        );

        Ok(PipelineOutput {
            station_id,
            year,
            images,
            daily,
            skipped,
        })
    }

    /// Write both tables below `dir/CSV`, returning their paths
    pub fn write_outputs(&self, output: &PipelineOutput, dir: &Path) -> PhenoResult<(PathBuf, PathBuf)> {
        let options = self.export_options();
        let images_path = image_table_path(dir, &output.station_id, output.year);
        let daily_path = daily_table_path(dir, &output.station_id, output.year);
        write_image_table(&images_path, &output.images, &options)?;
        write_daily_table(&daily_path, &output.daily, &options)?;
        Ok((images_path, daily_path))
    }
}

/// Copy images acquired inside `window` into `<out_dir>/<year>`
///
/// Snowy images keep their own sub-folder. Returns the number copied.
pub fn copy_time_window(dir: &Path, out_dir: &Path, window: &TimeWindow) -> PhenoResult<usize> {
    window.validate()?;
    let mut copied = 0;
    for source in discover_images(dir)? {
        let name = match AcquisitionName::from_path(&source.path) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Skipping {}: {}", source.file_name(), e);
                continue;
            }
        };
        if !window.contains(name.hour()) {
            continue;
        }
        let mut target_dir = out_dir.join(name.year().to_string());
        if source.snow == SnowTag::Snow {
            target_dir = target_dir.join(SNOW_FOLDER);
        }
        std::fs::create_dir_all(&target_dir)?;
        std::fs::copy(&source.path, target_dir.join(&name.file_name))?;
        copied += 1;
    }
    log::info!("Copied {} images inside {} to {}", copied, window, out_dir.display());
    Ok(copied)
}

/// Write the mean RGB image and per-pixel GCC/RCC rasters of every day
///
/// Returns the number of days written.
pub fn write_daily_composites(dir: &Path, out_dir: &Path) -> PhenoResult<usize> {
    let mut days: BTreeMap<String, Vec<SourceImage>> = BTreeMap::new();
    for source in discover_images(dir)? {
        match AcquisitionName::from_path(&source.path) {
            Ok(name) => days.entry(name.day_stem()).or_default().push(source),
            Err(e) => log::warn!("Skipping {}: {}", source.file_name(), e),
        }
    }
    std::fs::create_dir_all(out_dir)?;

    let mut written = 0;
    for (stem, sources) in &days {
        let mut composite = DailyComposite::new();
        for source in sources {
            let added = read_rgb(&source.path).and_then(|image| composite.accumulate(&image));
            if let Err(e) = added {
                if !e.is_per_file() {
                    return Err(e);
                }
                log::warn!("Leaving {} out of {}: {}", source.file_name(), stem, e);
            }
        }
        if composite.image_count() == 0 {
            continue;
        }

        let mean = composite.mean()?;
        let (gcc, rcc) = chromatic_coordinates(&mean)?;
        write_rgb(&out_dir.join(format!("{}_RGB_L2_daily.jpg", stem)), &mean)?;
        write_index_raster(&out_dir.join(format!("{}_GCC_L2_daily.tif", stem)), &gcc)?;
        write_index_raster(&out_dir.join(format!("{}_RCC_L2_daily.tif", stem)), &rcc)?;
        log::debug!("{}: composite of {} images", stem, composite.image_count());
        written += 1;
    }
    log::info!("Wrote {} daily composites to {}", written, out_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(PhenoCamPipeline::new(PipelineConfig::default()).is_ok());

        let config = PipelineConfig {
            thresholds: ImageCountThresholds { low: 6, high: 3 },
            ..PipelineConfig::default()
        };
        assert!(matches!(PhenoCamPipeline::new(config), Err(PhenoError::Config(_))));

        let config = PipelineConfig {
            time_window: Some(TimeWindow { start_hour: 14, end_hour: 10 }),
            ..PipelineConfig::default()
        };
        assert!(PhenoCamPipeline::new(config).is_err());

        let config = PipelineConfig {
            solar: Some(SolarGeometry {
                latitude: 95.0,
                longitude: 0.0,
                utc_offset_hours: 0.0,
            }),
            ..PipelineConfig::default()
        };
        assert!(PhenoCamPipeline::new(config).is_err());
    }

    #[test]
    fn test_export_options_follow_config() {
        let pipeline = PhenoCamPipeline::new(PipelineConfig {
            solar: SolarGeometry::new(64.18, 19.56, 0.0).ok(),
            include_units_row: false,
            snow_encoding: SnowEncoding::Legacy,
            ..PipelineConfig::default()
        })
        .unwrap();
        let options = pipeline.export_options();
        assert!(options.include_solar);
        assert!(!options.include_units_row);
        assert_eq!(options.snow_encoding, SnowEncoding::Legacy);
    }

    #[test]
    fn test_empty_directory_needs_year() {
        let dir = tempfile::TempDir::new().unwrap();
        let pipeline = PhenoCamPipeline::new(PipelineConfig::default()).unwrap();
        assert!(matches!(pipeline.run(dir.path()), Err(PhenoError::Config(_))));

        let pipeline = PhenoCamPipeline::new(PipelineConfig {
            year: Some(2024),
            ..PipelineConfig::default()
        })
        .unwrap();
        let output = pipeline.run(dir.path()).unwrap();
        assert_eq!(output.daily.len(), 366);
        assert!(output.images.is_empty());
    }
}
