use crate::core::quality::{QualityFlag, QualityFlagAssigner};
use crate::core::stats::{nan_max, nan_mean, nan_pstdev};
use crate::types::{round_to, DailyRecord, DayOfYear, ImageRecord, SnowTag};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Decimals kept for daily mean DN values
pub const DN_DECIMALS: i32 = 3;
/// Decimals kept for daily index means and standard deviations
pub const DAILY_INDEX_DECIMALS: i32 = 5;

/// Images collected for one day of year
#[derive(Debug, Clone, Default)]
pub struct AggregationState {
    records: Vec<ImageRecord>,
}

impl AggregationState {
    pub fn image_count(&self) -> usize {
        self.records.len()
    }

    /// Most frequent snow tag; a tie goes to the lower code (snow)
    pub fn majority_snow(&self) -> SnowTag {
        let snowy = self.records.iter().filter(|r| r.snow.is_snow()).count();
        if snowy * 2 >= self.records.len() {
            SnowTag::Snow
        } else {
            SnowTag::NoSnow
        }
    }

    fn column(&self, value: impl Fn(&ImageRecord) -> f64) -> Vec<f64> {
        self.records.iter().map(value).collect()
    }

    fn summarize(
        &mut self,
        date: NaiveDate,
        doy: DayOfYear,
        assigner: &QualityFlagAssigner,
    ) -> DailyRecord {
        // Fixed summation order regardless of how records arrived
        self.records.sort_by(|a, b| a.filename.cmp(&b.filename));

        let gcc = self.column(|r| r.gcc);
        let rcc = self.column(|r| r.rcc);
        let solar = self.column(|r| r.solar_elevation.unwrap_or(f64::NAN));

        let image_count = self.image_count();
        let snow = self.majority_snow();
        let max_solar_class = self.records.iter().filter_map(|r| r.solar_class).max();

        let quality_flag = match (snow, max_solar_class) {
            (SnowTag::Snow, _) => Some(QualityFlag::Snow),
            (SnowTag::NoSnow, Some(class)) => Some(assigner.assign(snow, image_count, class)),
            (SnowTag::NoSnow, None) => None,
        };

        DailyRecord {
            date,
            doy,
            mean_red: round_to(nan_mean(&self.column(|r| r.mean_red)), DN_DECIMALS),
            mean_green: round_to(nan_mean(&self.column(|r| r.mean_green)), DN_DECIMALS),
            mean_blue: round_to(nan_mean(&self.column(|r| r.mean_blue)), DN_DECIMALS),
            mean_gcc: round_to(nan_mean(&gcc), DAILY_INDEX_DECIMALS),
            std_gcc: round_to(nan_pstdev(&gcc), DAILY_INDEX_DECIMALS),
            mean_rcc: round_to(nan_mean(&rcc), DAILY_INDEX_DECIMALS),
            std_rcc: round_to(nan_pstdev(&rcc), DAILY_INDEX_DECIMALS),
            image_count: Some(image_count),
            snow: Some(snow),
            max_solar_elevation: nan_max(&solar),
            max_solar_class,
            quality_flag,
        }
    }
}

/// Groups image records by day of year and reduces them to daily records
///
/// One aggregator serves one run; its state is never shared.
#[derive(Debug, Default)]
pub struct DailyAggregator {
    days: BTreeMap<DayOfYear, AggregationState>,
}

impl DailyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &ImageRecord) {
        self.days
            .entry(record.doy)
            .or_default()
            .records
            .push(record.clone());
    }

    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a ImageRecord>) {
        for record in records {
            self.add(record);
        }
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Daily records for every day that has at least one image
    ///
    /// Days that do not exist in `year` are dropped with a warning.
    pub fn finish(
        mut self,
        year: i32,
        assigner: &QualityFlagAssigner,
    ) -> BTreeMap<DayOfYear, DailyRecord> {
        let mut daily = BTreeMap::new();
        for (doy, state) in self.days.iter_mut() {
            let Some(date) = NaiveDate::from_yo_opt(year, *doy as u32) else {
                log::warn!(
                    "Dropping {} images for day {} which does not exist in {}",
                    state.image_count(),
                    doy,
                    year
                );
                continue;
            };
            daily.insert(*doy, state.summarize(date, *doy, assigner));
        }
        log::info!("Aggregated images into {} daily records for {}", daily.len(), year);
        daily
    }
}

/// Aggregate a batch of records in one call
pub fn aggregate(
    records: &[ImageRecord],
    year: i32,
    assigner: &QualityFlagAssigner,
) -> BTreeMap<DayOfYear, DailyRecord> {
    let mut aggregator = DailyAggregator::new();
    aggregator.extend(records);
    aggregator.finish(year, assigner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extract::chromatic_coordinates;
    use crate::types::SolarClass;
    use approx::assert_abs_diff_eq;

    fn record(name: &str, doy: DayOfYear, rgb: (f64, f64, f64), snow: SnowTag) -> ImageRecord {
        let (gcc, rcc) = chromatic_coordinates(rgb.0, rgb.1, rgb.2);
        let date = NaiveDate::from_yo_opt(2023, doy as u32).unwrap();
        ImageRecord {
            filename: name.to_string(),
            doy,
            timestamp: date.and_hms_opt(11, 0, 0).unwrap(),
            mean_red: rgb.0,
            mean_green: rgb.1,
            mean_blue: rgb.2,
            gcc,
            rcc,
            snow,
            solar_elevation: Some(45.0),
            solar_class: Some(SolarClass::High),
        }
    }

    #[test]
    fn test_three_images_one_day() {
        let records = vec![
            record("a_1000.jpg", 150, (80.0, 120.0, 100.0), SnowTag::NoSnow),
            record("a_1030.jpg", 150, (82.0, 118.0, 102.0), SnowTag::NoSnow),
            record("a_1100.jpg", 150, (78.0, 122.0, 98.0), SnowTag::NoSnow),
        ];
        assert_eq!(records[1].gcc, 0.39333);
        assert_eq!(records[2].gcc, 0.40667);

        let daily = aggregate(&records, 2023, &QualityFlagAssigner::default());
        let day = &daily[&150];
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2023, 5, 30).unwrap());
        assert_abs_diff_eq!(day.mean_gcc, 0.4, epsilon = 1e-5);
        assert_eq!(day.image_count, Some(3));
        // 3 <= count < 6 is the moderate class
        assert_eq!(day.quality_flag.unwrap().code(), 223);
        assert_abs_diff_eq!(day.mean_red, 80.0);
        assert!(day.std_gcc > 0.0);
    }

    #[test]
    fn test_image_count_per_day() {
        let mut records = Vec::new();
        for doy in [10u16, 10, 11, 12, 12, 12, 12] {
            records.push(record(
                &format!("img_{}_{}.jpg", doy, records.len()),
                doy,
                (80.0, 120.0, 100.0),
                SnowTag::NoSnow,
            ));
        }
        let daily = aggregate(&records, 2023, &QualityFlagAssigner::default());
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[&10].image_count, Some(2));
        assert_eq!(daily[&11].image_count, Some(1));
        assert_eq!(daily[&12].image_count, Some(4));
        assert_eq!(daily[&12].quality_flag.unwrap().code(), 223);
    }

    #[test]
    fn test_snow_tie_goes_to_snow() {
        let records = vec![
            record("a.jpg", 40, (80.0, 120.0, 100.0), SnowTag::NoSnow),
            record("b.jpg", 40, (80.0, 120.0, 100.0), SnowTag::Snow),
        ];
        let daily = aggregate(&records, 2023, &QualityFlagAssigner::default());
        assert_eq!(daily[&40].snow, Some(SnowTag::Snow));
        assert_eq!(daily[&40].quality_flag.unwrap().code(), 100);

        let records = vec![
            record("a.jpg", 40, (80.0, 120.0, 100.0), SnowTag::NoSnow),
            record("b.jpg", 40, (80.0, 120.0, 100.0), SnowTag::Snow),
            record("c.jpg", 40, (80.0, 120.0, 100.0), SnowTag::NoSnow),
        ];
        let daily = aggregate(&records, 2023, &QualityFlagAssigner::default());
        assert_eq!(daily[&40].snow, Some(SnowTag::NoSnow));
        assert_eq!(daily[&40].quality_flag.unwrap().code(), 223);
    }

    #[test]
    fn test_nan_image_excluded_but_counted() {
        let records = vec![
            record("a.jpg", 5, (80.0, 120.0, 100.0), SnowTag::NoSnow),
            record("b.jpg", 5, (0.0, 0.0, 0.0), SnowTag::NoSnow),
        ];
        assert!(records[1].gcc.is_nan());
        let daily = aggregate(&records, 2023, &QualityFlagAssigner::default());
        assert_eq!(daily[&5].mean_gcc, 0.4);
        assert_eq!(daily[&5].std_gcc, 0.0);
        assert_eq!(daily[&5].image_count, Some(2));
    }

    #[test]
    fn test_max_solar_values() {
        let mut low = record("a.jpg", 20, (80.0, 120.0, 100.0), SnowTag::NoSnow);
        low.solar_elevation = Some(12.5);
        low.solar_class = Some(SolarClass::Low);
        let mut mid = record("b.jpg", 20, (80.0, 120.0, 100.0), SnowTag::NoSnow);
        mid.solar_elevation = Some(24.75);
        mid.solar_class = Some(SolarClass::Medium);

        let daily = aggregate(&[low, mid], 2023, &QualityFlagAssigner::default());
        assert_eq!(daily[&20].max_solar_elevation, 24.75);
        assert_eq!(daily[&20].max_solar_class, Some(SolarClass::Medium));
        assert_eq!(daily[&20].quality_flag.unwrap().code(), 212);
    }

    #[test]
    fn test_no_solar_means_no_flag_unless_snow() {
        let mut clear = record("a.jpg", 30, (80.0, 120.0, 100.0), SnowTag::NoSnow);
        clear.solar_elevation = None;
        clear.solar_class = None;
        let mut snowy = record("b.jpg", 31, (80.0, 120.0, 100.0), SnowTag::Snow);
        snowy.solar_elevation = None;
        snowy.solar_class = None;

        let daily = aggregate(&[clear, snowy], 2023, &QualityFlagAssigner::default());
        assert!(daily[&30].quality_flag.is_none());
        assert!(daily[&30].max_solar_elevation.is_nan());
        assert_eq!(daily[&31].quality_flag.unwrap().code(), 100);
    }

    #[test]
    fn test_order_invariance() {
        let mut records = Vec::new();
        for i in 0..12u16 {
            let doy = 100 + i % 3;
            let shade = (i * 7 % 11) as f64;
            records.push(record(
                &format!("img_{:02}.jpg", i),
                doy,
                (70.0 + shade, 110.0 + shade * 0.7, 95.0 - shade * 0.3),
                if i % 5 == 0 { SnowTag::Snow } else { SnowTag::NoSnow },
            ));
        }
        let forward = aggregate(&records, 2023, &QualityFlagAssigner::default());
        records.reverse();
        records.swap(2, 7);
        let shuffled = aggregate(&records, 2023, &QualityFlagAssigner::default());
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_day_366_dropped_in_common_year() {
        let mut late = record("a.jpg", 365, (80.0, 120.0, 100.0), SnowTag::NoSnow);
        late.doy = 366;
        let daily = aggregate(&[late], 2023, &QualityFlagAssigner::default());
        assert!(daily.is_empty());
    }
}
