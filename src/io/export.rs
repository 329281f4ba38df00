//! CSV time series: the per-image table and the daily L3 table

use crate::core::quality::QualityFlag;
use crate::io::filename::AcquisitionName;
use crate::types::{
    DailyRecord, DayOfYear, ImageRecord, PhenoError, PhenoResult, SnowEncoding, SnowTag,
    SolarClass,
};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::path::{Path, PathBuf};

/// Token written for missing values
pub const NAN_TOKEN: &str = "NaN";

/// Folder the tables are written into, below the output directory
pub const CSV_FOLDER: &str = "CSV";

const IMAGE_COLUMNS: [&str; 8] = [
    "Image", "DOY", "Red_ROI1", "Green_ROI1", "Blue_ROI1", "GCC_ROI1", "RCC_ROI1", "Snow",
];
const IMAGE_SOLAR_COLUMNS: [&str; 2] = ["Solar_Angle", "Solar_Angle_Class"];

const DAILY_COLUMNS: [&str; 10] = [
    "TIMESTAMP", "DOY", "RED_ROI_1", "GREEN_ROI_1", "BLUE_ROI_1", "GCC_ROI_1", "GCC_STD_1",
    "RCC_ROI_1", "RCC_STD_1", "NO._IMG_AVG",
];
const DAILY_SOLAR_COLUMNS: [&str; 2] = ["AGL_SUN_MAX", "QFLAG_ROI_1"];

const DAILY_UNITS: [&str; 10] = [
    "YYYY-MM-DD", "None", "DN", "DN", "DN", "Fraction", "None", "Fraction", "None", "Count",
];
const DAILY_SOLAR_UNITS: [&str; 2] = ["Degree", "Class"];

/// Layout options shared by both tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Write the solar angle and quality flag columns
    pub include_solar: bool,
    /// Write a units row directly below the daily header
    pub include_units_row: bool,
    pub snow_encoding: SnowEncoding,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_solar: true,
            include_units_row: true,
            snow_encoding: SnowEncoding::default(),
        }
    }
}

/// `<dir>/CSV/<station>_<year>_allImages.csv`
pub fn image_table_path(dir: &Path, station_id: &str, year: i32) -> PathBuf {
    dir.join(CSV_FOLDER)
        .join(format!("{}_{}_allImages.csv", station_id, year))
}

/// `<dir>/CSV/<station>_<year>_L3_daily.csv`
pub fn daily_table_path(dir: &Path, station_id: &str, year: i32) -> PathBuf {
    dir.join(CSV_FOLDER)
        .join(format!("{}_{}_L3_daily.csv", station_id, year))
}

fn float_field(value: f64) -> String {
    if value.is_nan() {
        NAN_TOKEN.to_string()
    } else {
        value.to_string()
    }
}

fn optional_field<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NAN_TOKEN.to_string())
}

fn ensure_parent(path: &Path) -> PhenoResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write the per-image table, rows sorted by file name
pub fn write_image_table(
    path: &Path,
    records: &[ImageRecord],
    options: &ExportOptions,
) -> PhenoResult<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;

    let mut header: Vec<&str> = IMAGE_COLUMNS.to_vec();
    if options.include_solar {
        header.extend(IMAGE_SOLAR_COLUMNS);
    }
    writer.write_record(&header)?;

    let mut sorted: Vec<&ImageRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.filename.cmp(&b.filename));

    for record in sorted {
        let mut row = vec![
            record.filename.clone(),
            record.doy.to_string(),
            float_field(record.mean_red),
            float_field(record.mean_green),
            float_field(record.mean_blue),
            float_field(record.gcc),
            float_field(record.rcc),
            record.snow.code(options.snow_encoding).to_string(),
        ];
        if options.include_solar {
            row.push(optional_field(record.solar_elevation));
            row.push(optional_field(record.solar_class.map(SolarClass::code)));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    log::info!("Wrote {} image records to {}", records.len(), path.display());
    Ok(())
}

/// Write the daily table, rows sorted by date below the optional units row
pub fn write_daily_table(
    path: &Path,
    records: &[DailyRecord],
    options: &ExportOptions,
) -> PhenoResult<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;

    let mut header: Vec<&str> = DAILY_COLUMNS.to_vec();
    if options.include_solar {
        header.extend(DAILY_SOLAR_COLUMNS);
    }
    writer.write_record(&header)?;

    if options.include_units_row {
        let mut units: Vec<&str> = DAILY_UNITS.to_vec();
        if options.include_solar {
            units.extend(DAILY_SOLAR_UNITS);
        }
        writer.write_record(&units)?;
    }

    let mut sorted: Vec<&DailyRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    for record in sorted {
        let mut row = vec![
            record.date.format("%Y-%m-%d").to_string(),
            record.doy.to_string(),
            float_field(record.mean_red),
            float_field(record.mean_green),
            float_field(record.mean_blue),
            float_field(record.mean_gcc),
            float_field(record.std_gcc),
            float_field(record.mean_rcc),
            float_field(record.std_rcc),
            optional_field(record.image_count),
        ];
        if options.include_solar {
            row.push(float_field(record.max_solar_elevation));
            row.push(optional_field(record.quality_flag));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    log::info!("Wrote {} daily records to {}", records.len(), path.display());
    Ok(())
}

/// Column positions resolved from a header row
struct Columns {
    header: StringRecord,
}

impl Columns {
    fn index(&self, name: &str) -> PhenoResult<usize> {
        self.header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PhenoError::InvalidFormat(format!("Missing column {}", name)))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.trim() == name)
    }
}

fn field<'r>(row: &'r StringRecord, index: usize, line: usize) -> PhenoResult<&'r str> {
    row.get(index)
        .map(str::trim)
        .ok_or_else(|| PhenoError::InvalidFormat(format!("Row {} is missing column {}", line, index)))
}

fn parse_float(text: &str, line: usize) -> PhenoResult<f64> {
    if text.is_empty() || text.eq_ignore_ascii_case(NAN_TOKEN) {
        return Ok(f64::NAN);
    }
    text.parse::<f64>()
        .map_err(|_| PhenoError::InvalidFormat(format!("Row {}: '{}' is not a number", line, text)))
}

fn parse_optional_int(text: &str, line: usize) -> PhenoResult<Option<u16>> {
    let value = parse_float(text, line)?;
    if value.is_nan() {
        return Ok(None);
    }
    if value.fract() != 0.0 || value < 0.0 || value > u16::MAX as f64 {
        return Err(PhenoError::InvalidFormat(format!(
            "Row {}: '{}' is not a count or code",
            line, text
        )));
    }
    Ok(Some(value as u16))
}

fn parse_doy(text: &str, line: usize) -> PhenoResult<DayOfYear> {
    parse_optional_int(text, line)?
        .ok_or_else(|| PhenoError::InvalidFormat(format!("Row {}: missing DOY", line)))
}

/// Read a per-image table written by [`write_image_table`]
pub fn read_image_table(path: &Path, encoding: SnowEncoding) -> PhenoResult<Vec<ImageRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let columns = Columns {
        header: reader.headers()?.clone(),
    };
    let image = columns.index("Image")?;
    let doy = columns.index("DOY")?;
    let red = columns.index("Red_ROI1")?;
    let green = columns.index("Green_ROI1")?;
    let blue = columns.index("Blue_ROI1")?;
    let gcc = columns.index("GCC_ROI1")?;
    let rcc = columns.index("RCC_ROI1")?;
    let snow = columns.index("Snow")?;
    let angle = columns.optional("Solar_Angle");
    let angle_class = columns.optional("Solar_Angle_Class");

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let line = i + 2;
        let filename = field(&row, image, line)?.to_string();
        let name = AcquisitionName::parse(&filename)?;

        let snow_code = parse_optional_int(field(&row, snow, line)?, line)?
            .ok_or_else(|| PhenoError::InvalidFormat(format!("Row {}: missing snow code", line)))?;
        let solar_elevation = match angle {
            Some(index) => Some(parse_float(field(&row, index, line)?, line)?).filter(|v| !v.is_nan()),
            None => None,
        };
        let solar_class = match angle_class {
            Some(index) => parse_optional_int(field(&row, index, line)?, line)?
                .map(SolarClass::from_code)
                .transpose()?,
            None => None,
        };

        records.push(ImageRecord {
            filename,
            doy: parse_doy(field(&row, doy, line)?, line)?,
            timestamp: name.timestamp(),
            mean_red: parse_float(field(&row, red, line)?, line)?,
            mean_green: parse_float(field(&row, green, line)?, line)?,
            mean_blue: parse_float(field(&row, blue, line)?, line)?,
            gcc: parse_float(field(&row, gcc, line)?, line)?,
            rcc: parse_float(field(&row, rcc, line)?, line)?,
            snow: SnowTag::from_code(snow_code, encoding)?,
            solar_elevation,
            solar_class,
        });
    }
    log::debug!("Read {} image records from {}", records.len(), path.display());
    Ok(records)
}

/// Read a daily table written by [`write_daily_table`]
///
/// The snow tag is only recoverable from a snow quality flag, and the
/// maximum solar class is derived from the maximum solar elevation.
pub fn read_daily_table(path: &Path) -> PhenoResult<Vec<DailyRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let columns = Columns {
        header: reader.headers()?.clone(),
    };
    let timestamp = columns.index("TIMESTAMP")?;
    let doy = columns.index("DOY")?;
    let red = columns.index("RED_ROI_1")?;
    let green = columns.index("GREEN_ROI_1")?;
    let blue = columns.index("BLUE_ROI_1")?;
    let gcc = columns.index("GCC_ROI_1")?;
    let gcc_std = columns.index("GCC_STD_1")?;
    let rcc = columns.index("RCC_ROI_1")?;
    let rcc_std = columns.index("RCC_STD_1")?;
    let count = columns.index("NO._IMG_AVG")?;
    let sun_max = columns.optional("AGL_SUN_MAX");
    let flag = columns.optional("QFLAG_ROI_1");

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let line = i + 2;
        let date_text = field(&row, timestamp, line)?;
        if date_text == DAILY_UNITS[0] {
            continue;
        }
        let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d").map_err(|e| {
            PhenoError::InvalidFormat(format!("Row {}: bad date '{}': {}", line, date_text, e))
        })?;

        let max_solar_elevation = match sun_max {
            Some(index) => parse_float(field(&row, index, line)?, line)?,
            None => f64::NAN,
        };
        let quality_flag = match flag {
            Some(index) => {
                let text = field(&row, index, line)?;
                if text.is_empty() || text.eq_ignore_ascii_case(NAN_TOKEN) {
                    None
                } else {
                    Some(text.parse::<QualityFlag>()?)
                }
            }
            None => None,
        };
        let snow = quality_flag.map(|f| {
            if f.is_snow() {
                SnowTag::Snow
            } else {
                SnowTag::NoSnow
            }
        });

        records.push(DailyRecord {
            date,
            doy: parse_doy(field(&row, doy, line)?, line)?,
            mean_red: parse_float(field(&row, red, line)?, line)?,
            mean_green: parse_float(field(&row, green, line)?, line)?,
            mean_blue: parse_float(field(&row, blue, line)?, line)?,
            mean_gcc: parse_float(field(&row, gcc, line)?, line)?,
            std_gcc: parse_float(field(&row, gcc_std, line)?, line)?,
            mean_rcc: parse_float(field(&row, rcc, line)?, line)?,
            std_rcc: parse_float(field(&row, rcc_std, line)?, line)?,
            image_count: parse_optional_int(field(&row, count, line)?, line)?.map(usize::from),
            snow,
            max_solar_elevation,
            max_solar_class: Some(max_solar_elevation)
                .filter(|e| !e.is_nan())
                .map(SolarClass::from_elevation),
            quality_flag,
        });
    }
    log::debug!("Read {} daily records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::complete;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn image_record(name: &str, snow: SnowTag) -> ImageRecord {
        let parsed = AcquisitionName::parse(name).unwrap();
        ImageRecord {
            filename: name.to_string(),
            doy: parsed.doy,
            timestamp: parsed.timestamp(),
            mean_red: 80.25,
            mean_green: 120.5,
            mean_blue: 99.125,
            gcc: 0.40179,
            rcc: 0.26756,
            snow,
            solar_elevation: Some(44.87),
            solar_class: Some(SolarClass::High),
        }
    }

    #[test]
    fn test_table_paths() {
        let dir = Path::new("/out");
        assert_eq!(
            image_table_path(dir, "SWE-LON-SFA-AGR-P01", 2023),
            PathBuf::from("/out/CSV/SWE-LON-SFA-AGR-P01_2023_allImages.csv")
        );
        assert_eq!(
            daily_table_path(dir, "SWE-LON-SFA-AGR-P01", 2023),
            PathBuf::from("/out/CSV/SWE-LON-SFA-AGR-P01_2023_L3_daily.csv")
        );
    }

    #[test]
    fn test_image_table_sorted_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = image_table_path(dir.path(), "SWE-LON-SFA-AGR-P01", 2023);
        let mut later = image_record("SWE-LON-SFA-AGR-P01_20230530_150_1100.jpg", SnowTag::NoSnow);
        later.gcc = f64::NAN;
        later.solar_elevation = None;
        later.solar_class = None;
        let earlier = image_record("SWE-LON-SFA-AGR-P01_20230530_150_1000.jpg", SnowTag::Snow);

        let options = ExportOptions::default();
        write_image_table(&path, &[later.clone(), earlier.clone()], &options).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Image,DOY,Red_ROI1,Green_ROI1,Blue_ROI1,GCC_ROI1,RCC_ROI1,Snow,Solar_Angle,Solar_Angle_Class"
        );
        assert_eq!(
            lines.next().unwrap(),
            "SWE-LON-SFA-AGR-P01_20230530_150_1000.jpg,150,80.25,120.5,99.125,0.40179,0.26756,1,44.87,3"
        );
        assert!(lines.next().unwrap().contains(",NaN,0.26756,2,NaN,NaN"));

        let back = read_image_table(&path, options.snow_encoding).unwrap();
        assert_eq!(back[0], earlier);
        assert_eq!(back[1].filename, later.filename);
        assert!(back[1].gcc.is_nan());
        assert_eq!(back[1].solar_class, None);
    }

    #[test]
    fn test_legacy_snow_codes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("images.csv");
        let options = ExportOptions {
            include_solar: false,
            include_units_row: false,
            snow_encoding: SnowEncoding::Legacy,
        };
        let record = image_record("SWE-ANS-ANS-FOR-P01_20230105_005_1200.jpg", SnowTag::Snow);
        write_image_table(&path, &[record], &options).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",100"));
        let back = read_image_table(&path, SnowEncoding::Legacy).unwrap();
        assert_eq!(back[0].snow, SnowTag::Snow);
        assert_eq!(back[0].solar_elevation, None);
    }

    #[test]
    fn test_daily_table_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = daily_table_path(dir.path(), "SWE-LON-SFA-AGR-P01", 2023);

        let mut day = DailyRecord::missing(NaiveDate::from_ymd_opt(2023, 5, 30).unwrap(), 150);
        day.mean_red = 80.0;
        day.mean_green = 120.0;
        day.mean_blue = 100.0;
        day.mean_gcc = 0.4;
        day.std_gcc = 0.00544;
        day.mean_rcc = 0.26667;
        day.std_rcc = 0.00272;
        day.image_count = Some(3);
        day.snow = Some(SnowTag::NoSnow);
        day.max_solar_elevation = 56.33;
        day.max_solar_class = Some(SolarClass::High);
        day.quality_flag = QualityFlag::from_code(233).ok();

        let mut daily = BTreeMap::new();
        daily.insert(150, day.clone());
        let series = complete(&daily, 2023);
        write_daily_table(&path, &series, &ExportOptions::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2 + 365);
        assert_eq!(
            lines[1],
            "YYYY-MM-DD,None,DN,DN,DN,Fraction,None,Fraction,None,Count,Degree,Class"
        );
        assert_eq!(lines[2], "2023-01-01,1,NaN,NaN,NaN,NaN,NaN,NaN,NaN,NaN,NaN,NaN");
        assert_eq!(
            lines[151],
            "2023-05-30,150,80,120,100,0.4,0.00544,0.26667,0.00272,3,56.33,233"
        );

        let back = read_daily_table(&path).unwrap();
        assert_eq!(back.len(), 365);
        assert_eq!(back[149], day);
        assert!(back[44].is_missing());
        assert!(back[44].mean_gcc.is_nan());
        assert_eq!(back[44].date, NaiveDate::from_ymd_opt(2023, 2, 14).unwrap());
    }

    #[test]
    fn test_unknown_flag_fails_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daily.csv");
        std::fs::write(
            &path,
            "TIMESTAMP,DOY,RED_ROI_1,GREEN_ROI_1,BLUE_ROI_1,GCC_ROI_1,GCC_STD_1,RCC_ROI_1,RCC_STD_1,NO._IMG_AVG,AGL_SUN_MAX,QFLAG_ROI_1\n\
             2023-05-30,150,80,120,100,0.4,0,0.26667,0,3,56.33,250\n",
        )
        .unwrap();
        assert!(matches!(
            read_daily_table(&path),
            Err(PhenoError::UnknownQualityFlag(_))
        ));
    }

    #[test]
    fn test_daily_without_solar_or_units() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daily.csv");
        let options = ExportOptions {
            include_solar: false,
            include_units_row: false,
            ..ExportOptions::default()
        };
        write_daily_table(&path, &complete(&BTreeMap::new(), 2024), &options).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1 + 366);
        assert!(text.lines().nth(1).unwrap().starts_with("2024-01-01,1,"));
        assert_eq!(read_daily_table(&path).unwrap().len(), 366);
    }
}
