//! Camera locations used for solar geometry

use crate::core::solar::SolarGeometry;
use crate::types::{PhenoError, PhenoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Location of one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub utc_offset_hours: f64,
}

impl Station {
    fn new(id: &str, name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            latitude,
            longitude,
            utc_offset_hours: 0.0,
        }
    }

    pub fn geometry(&self) -> PhenoResult<SolarGeometry> {
        SolarGeometry::new(self.latitude, self.longitude, self.utc_offset_hours)
    }
}

/// `SWE-LON` from `SWE-LON-SFA-AGR-P01`
fn station_prefix(camera_id: &str) -> Option<String> {
    let mut parts = camera_id.splitn(3, '-');
    let country = parts.next()?;
    let site = parts.next()?;
    Some(format!("{}-{}", country, site))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationTable {
    stations: Vec<Station>,
}

impl StationTable {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// SITES PhenoCam network cameras
    pub fn builtin() -> Self {
        Self::new(vec![
            Station::new("SWE-ANS-ANS-FOR-P01", "Abisko", 68.353729, 18.816522),
            Station::new("SWE-ASA-NYB-FOR-P01", "Asa", 57.149750, 14.738164),
            Station::new("SWE-SVB-DEG-MIR-P01", "Degero", 64.182032, 19.556545),
            Station::new("SWE-SVB-SVB-FOR-P01", "Svartberget", 64.256110, 19.774500),
            Station::new("SWE-RBD-RBD-AGR-P01", "Robacksdalen", 63.806340, 20.232638),
            Station::new("SWE-RBD-RBD-AGR-P02", "Robacksdalen", 63.809446, 20.241503),
            Station::new("SWE-LON-SFA-AGR-P01", "Lonnstorp", 55.668106, 13.108658),
            Station::new("SWE-LON-SFA-AGR-P02", "Lonnstorp", 55.668106, 13.108658),
            Station::new("SWE-LON-SFA-AGR-P03", "Lonnstorp", 55.668106, 13.108658),
            Station::new("SWE-LON-SFA-P01", "Lonnstorp", 55.668106, 13.108658),
            Station::new("SWE-TRS-LAE-GRA-P01", "Tarfala", 68.041889, 18.959309),
            Station::new("SWE-SRC-CEN-FOR-P01", "Skogaryd", 58.363846, 12.149787),
            Station::new("SWE-SRC-CEN-FOR-P02", "Skogaryd", 58.363718, 12.149494),
            Station::new("SWE-SRC-CEN-FOR-P03", "Skogaryd", 58.363555, 12.149921),
            Station::new("SWE-SRC-STD-FOR-P01", "Skogaryd", 58.381368, 12.146208),
            Station::new("SWE-GRI-GRI-FOR-P01", "Grimso", 59.72868, 15.47249),
        ])
    }

    /// Load a table from a JSON array of stations
    pub fn from_json_file(path: &Path) -> PhenoResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let stations: Vec<Station> = serde_json::from_str(&json)?;
        log::info!("Loaded {} stations from {}", stations.len(), path.display());
        Ok(Self::new(stations))
    }

    pub fn save_to_file(&self, path: &Path) -> PhenoResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(&self.stations)?)?;
        Ok(())
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Find a camera by id, falling back to another camera of the same station
    pub fn lookup(&self, camera_id: &str) -> Option<&Station> {
        if let Some(station) = self.stations.iter().find(|s| s.id == camera_id) {
            return Some(station);
        }
        let prefix = station_prefix(camera_id)?;
        let fallback = self
            .stations
            .iter()
            .find(|s| station_prefix(&s.id).as_deref() == Some(prefix.as_str()))?;
        log::warn!(
            "No coordinates for camera {}, using those of {} at the same station",
            camera_id,
            fallback.id
        );
        Some(fallback)
    }

    /// Solar geometry for a camera, a config error when it is unknown
    pub fn geometry(&self, camera_id: &str) -> PhenoResult<SolarGeometry> {
        self.lookup(camera_id)
            .ok_or_else(|| {
                PhenoError::Config(format!("No coordinates known for camera {}", camera_id))
            })?
            .geometry()
    }
}
