use crate::types::{DailyRecord, DayOfYear};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 1, 1).is_some_and(|d| d.leap_year())
}

pub fn days_in_year(year: i32) -> u16 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

/// One record per calendar day of `year`, in date order
///
/// Days without a daily record get a missing record (NaN values, no flag).
/// Records whose day of year falls outside the year are dropped.
pub fn complete(daily: &BTreeMap<DayOfYear, DailyRecord>, year: i32) -> Vec<DailyRecord> {
    let day_count = days_in_year(year);

    for doy in daily.keys().filter(|&&doy| doy == 0 || doy > day_count) {
        log::warn!("Ignoring daily record for day {} outside {}", doy, year);
    }

    let mut filled = 0usize;
    let mut series: Vec<DailyRecord> = (1..=day_count)
        .filter_map(|doy| {
            let date = NaiveDate::from_yo_opt(year, doy as u32)?;
            Some(match daily.get(&doy) {
                Some(record) => record.clone(),
                None => {
                    filled += 1;
                    DailyRecord::missing(date, doy)
                }
            })
        })
        .collect();
    series.sort_by_key(|record| record.date);

    log::info!(
        "Calendar for {} has {} days, {} filled as missing",
        year,
        series.len(),
        filled
    );
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quality::QualityFlag;

    #[test]
    fn test_empty_leap_and_common_years() {
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2024));
        let empty = BTreeMap::new();
        let leap = complete(&empty, 2024);
        assert_eq!(leap.len(), 366);
        assert!(leap.iter().all(|r| r.is_missing() && r.quality_flag.is_none()));

        let common = complete(&empty, 2023);
        assert_eq!(common.len(), 365);
        assert_eq!(complete(&empty, 1900).len(), 365);
        assert_eq!(complete(&empty, 2000).len(), 366);
    }

    #[test]
    fn test_missing_day_45() {
        let series = complete(&BTreeMap::new(), 2023);
        let day = &series[44];
        assert_eq!(day.doy, 45);
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2023, 2, 14).unwrap());
        assert!(day.mean_gcc.is_nan());
        assert!(day.mean_red.is_nan());
        assert!(day.max_solar_elevation.is_nan());
        assert!(day.image_count.is_none());
    }

    #[test]
    fn test_existing_days_kept_in_order() {
        let mut daily = BTreeMap::new();
        let mut record = DailyRecord::missing(NaiveDate::from_yo_opt(2023, 200).unwrap(), 200);
        record.mean_gcc = 0.41;
        record.image_count = Some(8);
        record.quality_flag = Some(QualityFlag::Snow);
        daily.insert(200, record.clone());
        daily.insert(366, DailyRecord::missing(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(), 366));

        let series = complete(&daily, 2023);
        assert_eq!(series.len(), 365);
        assert_eq!(series[199], record);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(series.iter().filter(|r| !r.is_missing()).count(), 1);
    }
}
