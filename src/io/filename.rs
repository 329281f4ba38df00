//! SITES PhenoCam file-name convention: `<ID>_<YYYYMMDD>_<DOY>_<HHMM>.<ext>`

use crate::types::{DayOfYear, PhenoError, PhenoResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const STANDARD_PATTERN: &str =
    r"^(?P<id>[^_]+)_(?P<date>\d{8})_(?P<doy>\d{3})_(?P<hhmm>\d{4})\.(?P<ext>[A-Za-z0-9]+)$";

/// Parsed components of a standard image file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionName {
    pub file_name: String,
    pub station_id: String,
    pub date: NaiveDate,
    pub doy: DayOfYear,
    pub time: NaiveTime,
    pub extension: String,
}

impl AcquisitionName {
    /// Parse and validate a file name
    ///
    /// The date must exist, the 3-digit DOY must equal the date's ordinal
    /// day and HHMM must be a valid clock time.
    pub fn parse(file_name: &str) -> PhenoResult<Self> {
        let caps = standard_regex()?.captures(file_name).ok_or_else(|| {
            PhenoError::invalid_filename(file_name, "expected <ID>_<YYYYMMDD>_<DOY>_<HHMM>.<ext>")
        })?;

        let date = NaiveDate::parse_from_str(&caps["date"], "%Y%m%d").map_err(|e| {
            PhenoError::invalid_filename(file_name, format!("bad date {}: {}", &caps["date"], e))
        })?;

        let doy: DayOfYear = caps["doy"]
            .parse()
            .map_err(|_| PhenoError::invalid_filename(file_name, "bad day of year"))?;
        if doy as u32 != date.ordinal() {
            return Err(PhenoError::invalid_filename(
                file_name,
                format!("day of year {:03} does not match date {}", doy, date),
            ));
        }

        let hhmm = &caps["hhmm"];
        let time = NaiveTime::parse_from_str(hhmm, "%H%M").map_err(|e| {
            PhenoError::invalid_filename(file_name, format!("bad time {}: {}", hhmm, e))
        })?;

        Ok(Self {
            file_name: file_name.to_string(),
            station_id: caps["id"].to_string(),
            date,
            doy,
            time,
            extension: caps["ext"].to_string(),
        })
    }

    /// Parse the file-name component of a path
    pub fn from_path(path: &Path) -> PhenoResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PhenoError::invalid_filename(&path.display().to_string(), "no file name"))?;
        Self::parse(name)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    /// `<ID>_<YYYYMMDD>_<DOY>` shared by all images of one day
    pub fn day_stem(&self) -> String {
        format!("{}_{}_{:03}", self.station_id, self.date.format("%Y%m%d"), self.doy)
    }

    /// Canonical name rebuilt from the parsed fields
    pub fn standard_name(&self) -> String {
        standard_name(&self.station_id, self.timestamp(), &self.extension)
    }
}

/// Render the canonical file name for an acquisition
pub fn standard_name(station_id: &str, timestamp: NaiveDateTime, extension: &str) -> String {
    format!(
        "{}_{}_{:03}_{}.{}",
        station_id,
        timestamp.format("%Y%m%d"),
        timestamp.ordinal(),
        timestamp.format("%H%M"),
        extension
    )
}

fn compile(pattern: &str) -> PhenoResult<Regex> {
    Regex::new(pattern).map_err(|e| PhenoError::Processing(format!("Regex error: {}", e)))
}

fn standard_regex() -> PhenoResult<&'static Regex> {
    static RE: OnceLock<Result<Regex, String>> = OnceLock::new();
    RE.get_or_init(|| compile(STANDARD_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| PhenoError::Processing(e.clone()))
}

/// A station-specific naming variant
struct LegacyPattern {
    regex: &'static str,
    /// Camera id for variants whose names do not carry one
    station_id: Option<&'static str>,
}

/// Naming variants used by the stations before central renaming
///
/// Tried in order. Two-digit years are in the 2000s.
const LEGACY_PATTERNS: &[LegacyPattern] = &[
    // 20180320_1603_SWE-LON-SFA-P01.jpg
    LegacyPattern {
        regex: r"^(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})_(?P<hh>\d{2})(?P<mi>\d{2})_(?P<id>[^_]+)\.(?P<ext>jpe?g)$",
        station_id: None,
    },
    // SWE-LON-SFA-AGR-P02_2019-04-08_09-00-01.jpg
    LegacyPattern {
        regex: r"^(?P<id>[^_]+)_(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})_(?P<hh>\d{2})-(?P<mi>\d{2})-\d{2}\.(?P<ext>jpe?g)$",
        station_id: None,
    },
    // Svartberget forest: SVB01_2019-05-01T1200.jpg
    LegacyPattern {
        regex: r"^[^_\-]{5}[_\-](?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})T(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: Some("SWE-SVB-SVB-FOR-P01"),
    },
    // Grimsö: GRIMSO1-2020-03-03T0900.jpg
    LegacyPattern {
        regex: r"^GRIMSO\d*-(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})T(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: Some("SWE-GRI-GRI-FOR-P01"),
    },
    // SWE-LON-SFA-AGR-P02_2020-01-28T1000.jpg
    LegacyPattern {
        regex: r"^(?P<id>[^_]+)_(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})T(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: None,
    },
    // SWE-LON-SFA-AGR-P02_2020-01-28_T10-00.jpg
    LegacyPattern {
        regex: r"^(?P<id>[^_]+)_(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})_T(?P<hh>\d{2})-(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: None,
    },
    // Skogaryd_2019-05-01_1200.jpg
    LegacyPattern {
        regex: r"^(?P<id>[^_]+)_(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})_(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: None,
    },
    // Tarfala: SWE-TRS-LAE-GRA-P01_20210615-1200.jpg
    LegacyPattern {
        regex: r"^[^_]+_(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})-(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: Some("SWE-TRS-LAE-GRA-P01"),
    },
    // Degerö: SVB_DEG_202106151200.jpg
    LegacyPattern {
        regex: r"^[^_]+_[^_]+_(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: Some("SWE-SVB-DEG-MIR-P01"),
    },
    // Röbäcksdalen: SWE-RBD-RBD-AGR-P01_2206130700.jpg
    LegacyPattern {
        regex: r"^(?P<id>[^_]+)_(?P<y>\d{2})(?P<m>\d{2})(?P<d>\d{2})(?P<hh>\d{2})(?P<mi>\d{2})\.(?P<ext>jpe?g)$",
        station_id: None,
    },
];

fn legacy_regexes() -> PhenoResult<&'static [(Regex, Option<&'static str>)]> {
    static RES: OnceLock<Result<Vec<(Regex, Option<&'static str>)>, String>> = OnceLock::new();
    RES.get_or_init(|| {
        LEGACY_PATTERNS
            .iter()
            .map(|p| Ok((compile(p.regex)?, p.station_id)))
            .collect::<PhenoResult<Vec<_>>>()
            .map_err(|e| e.to_string())
    })
    .as_ref()
    .map(Vec::as_slice)
    .map_err(|e| PhenoError::Processing(e.clone()))
}

/// Convert a station-specific file name into the canonical convention
///
/// `station_id` replaces the identifier found in (or implied by) the name
/// when given. Names already in the canonical form are returned re-rendered.
pub fn normalize_legacy_name(file_name: &str, station_id: Option<&str>) -> PhenoResult<String> {
    if let Ok(parsed) = AcquisitionName::parse(file_name) {
        let id = station_id.unwrap_or(&parsed.station_id);
        return Ok(standard_name(id, parsed.timestamp(), &parsed.extension));
    }

    for (re, fixed_id) in legacy_regexes()? {
        let Some(caps) = re.captures(file_name) else {
            continue;
        };

        let field = |key: &str| -> PhenoResult<u32> {
            caps[key]
                .parse::<u32>()
                .map_err(|_| PhenoError::invalid_filename(file_name, format!("bad {}", key)))
        };
        let mut year = field("y")? as i32;
        if caps["y"].len() == 2 {
            year += 2000;
        }
        let date = NaiveDate::from_ymd_opt(year, field("m")?, field("d")?)
            .ok_or_else(|| PhenoError::invalid_filename(file_name, "date does not exist"))?;
        let time = NaiveTime::from_hms_opt(field("hh")?, field("mi")?, 0)
            .ok_or_else(|| PhenoError::invalid_filename(file_name, "time does not exist"))?;

        let id = station_id
            .or(*fixed_id)
            .or_else(|| caps.name("id").map(|m| m.as_str()))
            .ok_or_else(|| PhenoError::invalid_filename(file_name, "no camera id"))?;
        return Ok(standard_name(id, date.and_time(time), &caps["ext"].to_lowercase()));
    }

    Err(PhenoError::invalid_filename(
        file_name,
        "no known station naming convention matches",
    ))
}

/// Work out (old, new) paths for every JPEG in `dir` that needs renaming
pub fn plan_renames(dir: &Path, station_id: Option<&str>) -> PhenoResult<Vec<(PathBuf, PathBuf)>> {
    let mut plan = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = name.to_lowercase();
        if !(lower.ends_with(".jpg") || lower.ends_with(".jpeg")) {
            continue;
        }
        match normalize_legacy_name(name, station_id) {
            Ok(new_name) if new_name != name => plan.push((path.clone(), dir.join(new_name))),
            Ok(_) => log::debug!("{} already follows the naming convention", name),
            Err(e) => log::warn!("Not renaming {}: {}", name, e),
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_name() {
        let name = AcquisitionName::parse("SWE-LON-SFA-P01_20220101_001_1020.jpg").unwrap();
        assert_eq!(name.station_id, "SWE-LON-SFA-P01");
        assert_eq!(name.date, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
        assert_eq!(name.doy, 1);
        assert_eq!(name.hour(), 10);
        assert_eq!(name.day_stem(), "SWE-LON-SFA-P01_20220101_001");
        assert_eq!(name.standard_name(), "SWE-LON-SFA-P01_20220101_001_1020.jpg");
    }

    #[test]
    fn test_patterns_compiled_once() {
        assert!(std::ptr::eq(standard_regex().unwrap(), standard_regex().unwrap()));
        let legacy = legacy_regexes().unwrap();
        assert_eq!(legacy.len(), LEGACY_PATTERNS.len());
        assert!(std::ptr::eq(legacy, legacy_regexes().unwrap()));
    }

    #[test]
    fn test_leap_year_doy() {
        let name = AcquisitionName::parse("SWE-ANS-ANS-FOR-P01_20201231_366_1200.jpg").unwrap();
        assert_eq!(name.doy, 366);
    }

    #[test]
    fn test_rejects_malformed_names() {
        for bad in [
            "IMG_0001.jpg",
            "SWE-ASA_20220101_1_1020.jpg",
            "SWE-ASA_20220230_061_1020.jpg",
            "SWE-ASA_20220101_002_1020.jpg",
            "SWE-ASA_20220101_001_2560.jpg",
            "SWE-ASA_20220101_001_1020",
        ] {
            let err = AcquisitionName::parse(bad).unwrap_err();
            assert!(err.is_per_file(), "{} gave {}", bad, err);
        }
    }

    #[test]
    fn test_normalize_legacy_names() {
        assert_eq!(
            normalize_legacy_name("20180320_1603_SWE-LON-SFA-P01.jpg", None).unwrap(),
            "SWE-LON-SFA-P01_20180320_079_1603.jpg"
        );
        assert_eq!(
            normalize_legacy_name("SWE-LON-SFA-AGR-P02_2019-04-08_09-00-01.jpg", None).unwrap(),
            "SWE-LON-SFA-AGR-P02_20190408_098_0900.jpg"
        );
        assert_eq!(
            normalize_legacy_name("SWE-LON-SFA-AGR-P02_2020-01-28T1000.jpg", None).unwrap(),
            "SWE-LON-SFA-AGR-P02_20200128_028_1000.jpg"
        );
        assert_eq!(
            normalize_legacy_name("SWE-LON-SFA-AGR-P02_2020-01-28_T10-00.jpg", None).unwrap(),
            "SWE-LON-SFA-AGR-P02_20200128_028_1000.jpg"
        );
        assert_eq!(
            normalize_legacy_name("Skogaryd_2019-05-01_1200.jpg", Some("SWE-SRC-CEN-FOR-P01"))
                .unwrap(),
            "SWE-SRC-CEN-FOR-P01_20190501_121_1200.jpg"
        );
        assert!(normalize_legacy_name("holiday.jpg", None).is_err());
    }

    #[test]
    fn test_normalize_station_specific_names() {
        let cases = [
            ("SVB01_2019-05-01T1200.jpg", "SWE-SVB-SVB-FOR-P01_20190501_121_1200.jpg"),
            ("GRIMSO1-2020-03-03T0900.jpg", "SWE-GRI-GRI-FOR-P01_20200303_063_0900.jpg"),
            (
                "SWE-TRS-LAE-GRA-P01_20210615-1200.jpg",
                "SWE-TRS-LAE-GRA-P01_20210615_166_1200.jpg",
            ),
            ("SVB_DEG_202106151200.jpg", "SWE-SVB-DEG-MIR-P01_20210615_166_1200.jpg"),
            (
                "SWE-RBD-RBD-AGR-P01_2206130700.jpg",
                "SWE-RBD-RBD-AGR-P01_20220613_164_0700.jpg",
            ),
            (
                "SWE-RBD-RBD-AGR-P01_2019-04-11T1430.jpg",
                "SWE-RBD-RBD-AGR-P01_20190411_101_1430.jpg",
            ),
        ];
        for (old, new) in cases {
            assert_eq!(normalize_legacy_name(old, None).unwrap(), new, "renaming {}", old);
        }

        // An explicit id wins over the one a variant implies
        assert_eq!(
            normalize_legacy_name("GRIMSO1-2020-03-03T0900.jpg", Some("SWE-GRI-GRI-FOR-P02"))
                .unwrap(),
            "SWE-GRI-GRI-FOR-P02_20200303_063_0900.jpg"
        );
        assert!(normalize_legacy_name("SVB_DEG_202102301200.jpg", None).is_err());
    }
}
