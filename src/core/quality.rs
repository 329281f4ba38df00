use crate::types::{PhenoError, PhenoResult, SnowTag, SolarClass};
use serde::{Deserialize, Serialize};

/// Code assigned to every snow-covered day
pub const SNOW_FLAG: u16 = 100;

/// Image-count class of a snow-free day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CountClass {
    Few = 1,
    Moderate = 2,
    Many = 3,
}

/// Daily quality flag
///
/// Snow takes priority over everything else (100). Snow-free days encode
/// `2 C S` with C the image-count class and S the solar-elevation class,
/// e.g. 233 for many images under a high sun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityFlag {
    Snow,
    Clear { count: CountClass, solar: SolarClass },
}

impl QualityFlag {
    pub fn code(&self) -> u16 {
        match self {
            QualityFlag::Snow => SNOW_FLAG,
            QualityFlag::Clear { count, solar } => 200 + 10 * (*count as u16) + solar.code(),
        }
    }

    /// Decode a flag; anything outside the table is an error
    pub fn from_code(code: u16) -> PhenoResult<Self> {
        if code == SNOW_FLAG {
            return Ok(QualityFlag::Snow);
        }
        let count = match (code / 10) % 10 {
            1 => CountClass::Few,
            2 => CountClass::Moderate,
            3 => CountClass::Many,
            _ => return Err(PhenoError::UnknownQualityFlag(code.to_string())),
        };
        let solar = match code % 10 {
            1 => SolarClass::Low,
            2 => SolarClass::Medium,
            3 => SolarClass::High,
            _ => return Err(PhenoError::UnknownQualityFlag(code.to_string())),
        };
        if code / 100 != 2 {
            return Err(PhenoError::UnknownQualityFlag(code.to_string()));
        }
        Ok(QualityFlag::Clear { count, solar })
    }

    pub fn is_snow(&self) -> bool {
        matches!(self, QualityFlag::Snow)
    }
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for QualityFlag {
    type Err = PhenoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Tables written through float columns carry "233.0"
        let code = trimmed
            .strip_suffix(".0")
            .unwrap_or(trimmed)
            .parse::<u16>()
            .map_err(|_| PhenoError::UnknownQualityFlag(trimmed.to_string()))?;
        Self::from_code(code)
    }
}

/// Image-count limits separating the count classes
///
/// `count < low` is few, `low <= count < high` moderate, `count >= high` many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCountThresholds {
    pub low: usize,
    pub high: usize,
}

impl ImageCountThresholds {
    /// Images every 30 minutes
    pub fn half_hourly() -> Self {
        Self { low: 3, high: 6 }
    }

    /// Images every hour
    pub fn hourly() -> Self {
        Self { low: 2, high: 4 }
    }

    pub fn new(low: usize, high: usize) -> PhenoResult<Self> {
        let thresholds = Self { low, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> PhenoResult<()> {
        if self.low == 0 || self.low >= self.high {
            return Err(PhenoError::Config(format!(
                "Image count thresholds must satisfy 0 < low < high, got {} and {}",
                self.low, self.high
            )));
        }
        Ok(())
    }

    pub fn classify(&self, image_count: usize) -> CountClass {
        if image_count < self.low {
            CountClass::Few
        } else if image_count < self.high {
            CountClass::Moderate
        } else {
            CountClass::Many
        }
    }
}

impl Default for ImageCountThresholds {
    fn default() -> Self {
        Self::half_hourly()
    }
}

/// Maps a day's (snow, count, solar class) to its quality flag
#[derive(Debug, Clone, Default)]
pub struct QualityFlagAssigner {
    thresholds: ImageCountThresholds,
}

impl QualityFlagAssigner {
    pub fn new(thresholds: ImageCountThresholds) -> PhenoResult<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> ImageCountThresholds {
        self.thresholds
    }

    pub fn assign(&self, snow: SnowTag, image_count: usize, solar: SolarClass) -> QualityFlag {
        if snow.is_snow() {
            return QualityFlag::Snow;
        }
        QualityFlag::Clear {
            count: self.thresholds.classify(image_count),
            solar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_hourly_table() {
        let assigner = QualityFlagAssigner::default();
        let cases = [
            (2, SolarClass::Low, 211),
            (2, SolarClass::Medium, 212),
            (0, SolarClass::High, 213),
            (3, SolarClass::Low, 221),
            (4, SolarClass::Medium, 222),
            (5, SolarClass::High, 223),
            (6, SolarClass::Low, 231),
            (10, SolarClass::Medium, 232),
            (48, SolarClass::High, 233),
        ];
        for (count, solar, expected) in cases {
            let flag = assigner.assign(SnowTag::NoSnow, count, solar);
            assert_eq!(flag.code(), expected, "count {} solar {:?}", count, solar);
        }
    }

    #[test]
    fn test_snow_has_priority() {
        let assigner = QualityFlagAssigner::default();
        for count in [0, 1, 3, 6, 100] {
            for solar in [SolarClass::Low, SolarClass::Medium, SolarClass::High] {
                assert_eq!(assigner.assign(SnowTag::Snow, count, solar).code(), 100);
            }
        }
    }

    #[test]
    fn test_hourly_table() {
        let assigner = QualityFlagAssigner::new(ImageCountThresholds::hourly()).unwrap();
        assert_eq!(assigner.assign(SnowTag::NoSnow, 1, SolarClass::High).code(), 213);
        assert_eq!(assigner.assign(SnowTag::NoSnow, 2, SolarClass::High).code(), 223);
        assert_eq!(assigner.assign(SnowTag::NoSnow, 3, SolarClass::Low).code(), 221);
        assert_eq!(assigner.assign(SnowTag::NoSnow, 4, SolarClass::Low).code(), 231);
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(ImageCountThresholds::new(0, 3).is_err());
        assert!(ImageCountThresholds::new(4, 4).is_err());
        assert!(ImageCountThresholds::new(2, 8).is_ok());
    }

    #[test]
    fn test_flag_codes_round_trip() {
        for code in [100, 211, 212, 213, 221, 222, 223, 231, 232, 233] {
            assert_eq!(QualityFlag::from_code(code).unwrap().code(), code);
        }
        assert_eq!("233.0".parse::<QualityFlag>().unwrap().code(), 233);
    }

    #[test]
    fn test_unknown_codes_rejected() {
        for code in [0, 101, 200, 210, 214, 241, 311, 333] {
            assert!(QualityFlag::from_code(code).is_err(), "code {}", code);
        }
        assert!("NaN".parse::<QualityFlag>().is_err());
    }
}
