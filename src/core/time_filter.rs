use crate::io::filename::AcquisitionName;
use crate::types::{PhenoError, PhenoResult};

/// Hours of the day (inclusive) whose images are kept for the L1 set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start_hour: 10,
            end_hour: 14,
        }
    }
}

impl TimeWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> PhenoResult<Self> {
        let window = Self {
            start_hour,
            end_hour,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> PhenoResult<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(PhenoError::Config(format!(
                "Time window hours must be 0-23, got {}-{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.start_hour > self.end_hour {
            return Err(PhenoError::Config(format!(
                "Time window starts after it ends ({} > {})",
                self.start_hour, self.end_hour
            )));
        }
        Ok(())
    }

    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }

    /// Keep the acquisitions whose hour falls inside the window
    pub fn filter_by_hour<'a>(
        &self,
        names: impl IntoIterator<Item = &'a AcquisitionName>,
    ) -> Vec<&'a AcquisitionName> {
        let mut seen = 0usize;
        let kept: Vec<&AcquisitionName> = names
            .into_iter()
            .inspect(|_| seen += 1)
            .filter(|name| self.contains(name.hour()))
            .collect();
        log::debug!(
            "Time window {:02}-{:02}h kept {} of {} images",
            self.start_hour,
            self.end_hour,
            kept.len(),
            seen
        );
        kept
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:59", self.start_hour, self.end_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(times: &[&str]) -> Vec<AcquisitionName> {
        times
            .iter()
            .map(|t| AcquisitionName::parse(&format!("SWE-LON-SFA-AGR-P01_20230530_150_{}.jpg", t)).unwrap())
            .collect()
    }

    #[test]
    fn test_default_window_inclusive() {
        let window = TimeWindow::default();
        let all = names(&["0930", "1000", "1230", "1459", "1500"]);
        let kept: Vec<&str> = window
            .filter_by_hour(&all)
            .iter()
            .map(|n| n.file_name.as_str())
            .collect();
        assert_eq!(
            kept,
            vec![
                "SWE-LON-SFA-AGR-P01_20230530_150_1000.jpg",
                "SWE-LON-SFA-AGR-P01_20230530_150_1230.jpg",
                "SWE-LON-SFA-AGR-P01_20230530_150_1459.jpg",
            ]
        );
    }

    #[test]
    fn test_invalid_windows() {
        assert!(TimeWindow::new(15, 10).is_err());
        assert!(TimeWindow::new(0, 24).is_err());
        assert!(TimeWindow::new(12, 12).unwrap().contains(12));
    }
}
