use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::core::quality::QualityFlag;

/// Digital number of a single 8-bit channel sample
pub type Dn = u8;

/// RGB image as (row, column, channel) with channels in R, G, B order
pub type RgbImage = Array3<Dn>;

/// Binary ROI mask (1 = inside, 0 = outside)
pub type Mask = Array2<u8>;

/// Single-band floating point raster (per-pixel GCC or RCC)
pub type IndexRaster = Array2<f32>;

/// Day of year, 1-based
pub type DayOfYear = u16;

/// Snow presence, assigned from the folder an image was sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnowTag {
    Snow,
    NoSnow,
}

impl SnowTag {
    /// Integer code of the tag in the given encoding
    pub fn code(self, encoding: SnowEncoding) -> u16 {
        match (encoding, self) {
            (SnowEncoding::Level3, SnowTag::Snow) => 1,
            (SnowEncoding::Level3, SnowTag::NoSnow) => 2,
            (SnowEncoding::Legacy, SnowTag::Snow) => 100,
            (SnowEncoding::Legacy, SnowTag::NoSnow) => 200,
        }
    }

    pub fn from_code(code: u16, encoding: SnowEncoding) -> PhenoResult<Self> {
        [SnowTag::Snow, SnowTag::NoSnow]
            .into_iter()
            .find(|tag| tag.code(encoding) == code)
            .ok_or_else(|| {
                PhenoError::InvalidFormat(format!(
                    "Snow code {} is not valid for {:?} encoding",
                    code, encoding
                ))
            })
    }

    pub fn is_snow(self) -> bool {
        matches!(self, SnowTag::Snow)
    }
}

impl std::fmt::Display for SnowTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnowTag::Snow => write!(f, "snow"),
            SnowTag::NoSnow => write!(f, "no snow"),
        }
    }
}

/// Integer encoding used for snow tags in the exported tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnowEncoding {
    /// 1 = snow, 2 = no snow (Level-3 products)
    #[default]
    Level3,
    /// 100 = snow, 200 = no snow (earlier ROI scripts)
    Legacy,
}

/// Discretized solar elevation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SolarClass {
    /// Below 20 degrees
    Low = 1,
    /// 20 to 30 degrees inclusive
    Medium = 2,
    /// Above 30 degrees
    High = 3,
}

impl SolarClass {
    pub fn from_elevation(elevation_deg: f64) -> Self {
        if elevation_deg < 20.0 {
            SolarClass::Low
        } else if elevation_deg <= 30.0 {
            SolarClass::Medium
        } else {
            SolarClass::High
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> PhenoResult<Self> {
        match code {
            1 => Ok(SolarClass::Low),
            2 => Ok(SolarClass::Medium),
            3 => Ok(SolarClass::High),
            _ => Err(PhenoError::InvalidFormat(format!(
                "Solar class {} is outside 1..=3",
                code
            ))),
        }
    }
}

/// Per-image observation inside the ROI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    pub doy: DayOfYear,
    pub timestamp: NaiveDateTime,
    pub mean_red: f64,
    pub mean_green: f64,
    pub mean_blue: f64,
    pub gcc: f64,
    pub rcc: f64,
    pub snow: SnowTag,
    /// Solar elevation in degrees, rounded to 2 decimals
    pub solar_elevation: Option<f64>,
    pub solar_class: Option<SolarClass>,
}

impl ImageRecord {
    /// Blue chromatic coordinate, not rounded
    pub fn bcc(&self) -> f64 {
        self.mean_blue / (self.mean_red + self.mean_green + self.mean_blue)
    }
}

/// Daily composite for one calendar day
///
/// Days without images keep NaN in every numeric field and `None` in the
/// discrete ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub doy: DayOfYear,
    pub mean_red: f64,
    pub mean_green: f64,
    pub mean_blue: f64,
    pub mean_gcc: f64,
    pub std_gcc: f64,
    pub mean_rcc: f64,
    pub std_rcc: f64,
    pub image_count: Option<usize>,
    pub snow: Option<SnowTag>,
    pub max_solar_elevation: f64,
    pub max_solar_class: Option<SolarClass>,
    pub quality_flag: Option<QualityFlag>,
}

impl DailyRecord {
    /// Record for a day with no images
    pub fn missing(date: NaiveDate, doy: DayOfYear) -> Self {
        Self {
            date,
            doy,
            mean_red: f64::NAN,
            mean_green: f64::NAN,
            mean_blue: f64::NAN,
            mean_gcc: f64::NAN,
            std_gcc: f64::NAN,
            mean_rcc: f64::NAN,
            std_rcc: f64::NAN,
            image_count: None,
            snow: None,
            max_solar_elevation: f64::NAN,
            max_solar_class: None,
            quality_flag: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.image_count.is_none()
    }
}

/// Error types for PhenoCam processing
#[derive(Debug, thiserror::Error)]
pub enum PhenoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid file name '{name}': {reason}")]
    InvalidFilename { name: String, reason: String },

    #[error("Cannot read image {path}: {reason}")]
    ImageRead { path: String, reason: String },

    #[error("Image is {actual:?} but ROI mask is {expected:?} (height, width)")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Unknown quality flag code: {0}")]
    UnknownQualityFlag(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl PhenoError {
    pub(crate) fn invalid_filename(name: &str, reason: impl Into<String>) -> Self {
        PhenoError::InvalidFilename {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that concern a single input file rather than the run
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            PhenoError::InvalidFilename { .. }
                | PhenoError::ImageRead { .. }
                | PhenoError::ShapeMismatch { .. }
        )
    }
}

/// Result type for PhenoCam operations
pub type PhenoResult<T> = Result<T, PhenoError>;

/// Round half away from zero to the given number of decimals, keeping NaN
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
