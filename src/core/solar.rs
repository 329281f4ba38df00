use crate::types::{round_to, PhenoError, PhenoResult, SolarClass};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Station position and the clock the image file names were stamped with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarGeometry {
    /// Latitude in degrees, north positive
    pub latitude: f64,
    /// Longitude in degrees, east positive
    pub longitude: f64,
    /// Offset of the file-name clock from UTC in hours (0 = file names in UTC)
    pub utc_offset_hours: f64,
}

impl SolarGeometry {
    pub fn new(latitude: f64, longitude: f64, utc_offset_hours: f64) -> PhenoResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(PhenoError::Config(format!("Latitude {} out of range", latitude)));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(PhenoError::Config(format!("Longitude {} out of range", longitude)));
        }
        if !(-14.0..=14.0).contains(&utc_offset_hours) {
            return Err(PhenoError::Config(format!(
                "UTC offset {} h out of range",
                utc_offset_hours
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            utc_offset_hours,
        })
    }

    /// Interpret a file-name timestamp in the configured clock
    pub fn to_utc(&self, local: NaiveDateTime) -> PhenoResult<DateTime<Utc>> {
        let offset_secs = (self.utc_offset_hours * 3600.0).round() as i32;
        let offset = FixedOffset::east_opt(offset_secs).ok_or_else(|| {
            PhenoError::Config(format!("Invalid UTC offset {} h", self.utc_offset_hours))
        })?;
        offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| PhenoError::Processing(format!("Ambiguous local time {}", local)))
    }

    /// Solar elevation in degrees (2 decimals) and its class
    pub fn classify(&self, local: NaiveDateTime) -> PhenoResult<(f64, SolarClass)> {
        let utc = self.to_utc(local)?;
        let elevation = round_to(solar_elevation(utc, self.latitude, self.longitude), 2);
        Ok((elevation, SolarClass::from_elevation(elevation)))
    }
}

/// Apparent solar elevation (degrees, refraction corrected) after the NOAA
/// solar position equations
pub fn solar_elevation(time: DateTime<Utc>, latitude: f64, longitude: f64) -> f64 {
    let julian_day = time.timestamp() as f64 / 86_400.0
        + time.timestamp_subsec_nanos() as f64 / 86_400e9
        + 2_440_587.5;
    let jc = (julian_day - 2_451_545.0) / 36_525.0;

    let mean_long = (280.46646 + jc * (36_000.76983 + jc * 0.0003032)).rem_euclid(360.0);
    let mean_anom = 357.52911 + jc * (35_999.05029 - 0.0001537 * jc);
    let eccentricity = 0.016708634 - jc * (0.000042037 + 0.0000001267 * jc);

    let anom_rad = mean_anom.to_radians();
    let center = anom_rad.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
        + (2.0 * anom_rad).sin() * (0.019993 - 0.000101 * jc)
        + (3.0 * anom_rad).sin() * 0.000289;
    let true_long = mean_long + center;
    let omega = (125.04 - 1934.136 * jc).to_radians();
    let apparent_long = true_long - 0.00569 - 0.00478 * omega.sin();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.00256 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.to_radians().sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let long_rad = mean_long.to_radians();
    // Equation of time, minutes
    let eq_time = 4.0
        * (y * (2.0 * long_rad).sin() - 2.0 * eccentricity * anom_rad.sin()
            + 4.0 * eccentricity * y * anom_rad.sin() * (2.0 * long_rad).cos()
            - 0.5 * y * y * (4.0 * long_rad).sin()
            - 1.25 * eccentricity * eccentricity * (2.0 * anom_rad).sin())
        .to_degrees();

    let minutes_utc = (time.timestamp().rem_euclid(86_400)) as f64 / 60.0
        + time.timestamp_subsec_nanos() as f64 / 60e9;
    let true_solar_time = (minutes_utc + eq_time + 4.0 * longitude).rem_euclid(1440.0);
    let hour_angle = true_solar_time / 4.0 - 180.0;

    let lat_rad = latitude.to_radians();
    let cos_zenith = (lat_rad.sin() * declination.sin()
        + lat_rad.cos() * declination.cos() * hour_angle.to_radians().cos())
    .clamp(-1.0, 1.0);
    let elevation = 90.0 - cos_zenith.acos().to_degrees();

    elevation + atmospheric_refraction(elevation)
}

/// Refraction correction in degrees for a geometric elevation
fn atmospheric_refraction(elevation: f64) -> f64 {
    let arcsec = if elevation > 85.0 {
        0.0
    } else if elevation > 5.0 {
        let t = elevation.to_radians().tan();
        58.1 / t - 0.07 / t.powi(3) + 0.000086 / t.powi(5)
    } else if elevation > -0.575 {
        1735.0 + elevation * (-518.2 + elevation * (103.4 + elevation * (-12.79 + elevation * 0.711)))
    } else {
        -20.772 / elevation.to_radians().tan()
    };
    arcsec / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_solar_noon_at_solstice() {
        // Lönnstorp, local solar noon is close to 11:10 UTC in late June
        let elevation = solar_elevation(utc(2022, 6, 21, 11, 10), 55.668106, 13.108658);
        assert_abs_diff_eq!(elevation, 90.0 - 55.668106 + 23.44, epsilon = 0.5);
    }

    #[test]
    fn test_equinox_equator_zenith() {
        let elevation = solar_elevation(utc(2023, 3, 20, 12, 7), 0.0, 0.0);
        assert!(elevation > 88.0, "elevation was {}", elevation);
    }

    #[test]
    fn test_polar_night_below_horizon() {
        // Abisko in mid December never sees the sun
        let elevation = solar_elevation(utc(2021, 12, 15, 11, 0), 68.353729, 18.816522);
        assert!(elevation < 0.0);
    }

    #[test]
    fn test_utc_offset_shifts_time() {
        let geometry = SolarGeometry::new(55.668106, 13.108658, 2.0).unwrap();
        let local = NaiveDate::from_ymd_opt(2022, 6, 21)
            .unwrap()
            .and_hms_opt(13, 10, 0)
            .unwrap();
        assert_eq!(geometry.to_utc(local).unwrap(), utc(2022, 6, 21, 11, 10));

        let (elevation, class) = geometry.classify(local).unwrap();
        assert!(elevation > 50.0);
        assert_eq!(class, SolarClass::High);
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(SolarGeometry::new(91.0, 0.0, 0.0).is_err());
        assert!(SolarGeometry::new(0.0, 181.0, 0.0).is_err());
        assert!(SolarGeometry::new(0.0, 0.0, 20.0).is_err());
    }
}
