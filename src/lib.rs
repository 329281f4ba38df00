//! phenocam: daily GCC/RCC time series and quality flags for SITES PhenoCams
//!
//! Turns a folder of timestamped camera images into per-image region-of-interest
//! statistics, daily composites covering the whole calendar year and a quality
//! flag per day derived from snow cover, image count and solar elevation.

pub mod types;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types
pub use types::{
    DailyRecord, DayOfYear, ImageRecord, Mask, PhenoError, PhenoResult, RgbImage, SnowEncoding,
    SnowTag, SolarClass,
};
pub use crate::core::{QualityFlag, QualityFlagAssigner, Roi, SolarGeometry};
pub use pipeline::{ErrorPolicy, PhenoCamPipeline, PipelineConfig, PipelineOutput};

#[cfg(feature = "python")]
mod python {
    use crate::core::quality::{ImageCountThresholds, QualityFlagAssigner};
    use crate::core::roi::Roi;
    use crate::core::solar::SolarGeometry;
    use crate::pipeline::{PhenoCamPipeline, PipelineConfig};
    use crate::types::{PhenoError, SnowTag, SolarClass};
    use numpy::ToPyArray;
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::{PyDict, PyList};
    use std::path::Path;

    fn to_py_err(e: PhenoError) -> PyErr {
        match e {
            PhenoError::Config(_) | PhenoError::UnknownQualityFlag(_) => {
                PyValueError::new_err(e.to_string())
            }
            _ => PyRuntimeError::new_err(e.to_string()),
        }
    }

    /// Rasterize ROI polygon vertices into a (height, width) uint8 mask
    #[pyfunction]
    fn build_mask(
        py: Python,
        vertices: Vec<(i64, i64)>,
        width: usize,
        height: usize,
    ) -> PyResult<PyObject> {
        let mask = crate::core::roi::build_mask(&vertices, width, height).map_err(to_py_err)?;
        Ok(mask.to_pyarray(py).into())
    }

    /// Quality flag code of a day
    #[pyfunction]
    #[pyo3(signature = (snow, image_count, solar_class, low=3, high=6))]
    fn assign_flag(
        snow: bool,
        image_count: usize,
        solar_class: u16,
        low: usize,
        high: usize,
    ) -> PyResult<u16> {
        let thresholds = ImageCountThresholds::new(low, high).map_err(to_py_err)?;
        let assigner = QualityFlagAssigner::new(thresholds).map_err(to_py_err)?;
        let solar = SolarClass::from_code(solar_class).map_err(to_py_err)?;
        let tag = if snow { SnowTag::Snow } else { SnowTag::NoSnow };
        Ok(assigner.assign(tag, image_count, solar).code())
    }

    /// Run the daily pipeline on an image folder
    #[pyfunction]
    #[pyo3(signature = (directory, roi=None, latitude=None, longitude=None, utc_offset_hours=0.0, year=None, output_dir=None))]
    #[allow(clippy::too_many_arguments)]
    fn process_directory(
        py: Python,
        directory: String,
        roi: Option<Vec<(i64, i64)>>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        utc_offset_hours: f64,
        year: Option<i32>,
        output_dir: Option<String>,
    ) -> PyResult<PyObject> {
        let roi = roi.map(|v| Roi::new(&v)).transpose().map_err(to_py_err)?;
        let solar = match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                Some(SolarGeometry::new(lat, lon, utc_offset_hours).map_err(to_py_err)?)
            }
            (None, None) => None,
            _ => {
                return Err(PyValueError::new_err(
                    "latitude and longitude must be given together",
                ))
            }
        };
        let config = PipelineConfig {
            roi,
            solar,
            year,
            ..PipelineConfig::default()
        };
        let pipeline = PhenoCamPipeline::new(config).map_err(to_py_err)?;

        let output = py
            .allow_threads(|| pipeline.run(Path::new(&directory)))
            .map_err(to_py_err)?;

        let result = PyDict::new(py);
        result.set_item("station_id", &output.station_id)?;
        result.set_item("year", output.year)?;
        result.set_item("image_count", output.images.len())?;
        let skipped: Vec<&str> = output.skipped.iter().map(|s| s.file_name.as_str()).collect();
        result.set_item("skipped", skipped)?;

        let daily = PyList::empty(py);
        for day in &output.daily {
            let row = PyDict::new(py);
            row.set_item("date", day.date.format("%Y-%m-%d").to_string())?;
            row.set_item("doy", day.doy)?;
            row.set_item("gcc", day.mean_gcc)?;
            row.set_item("gcc_std", day.std_gcc)?;
            row.set_item("rcc", day.mean_rcc)?;
            row.set_item("rcc_std", day.std_rcc)?;
            row.set_item("image_count", day.image_count)?;
            row.set_item("quality_flag", day.quality_flag.map(|f| f.code()))?;
            daily.append(row)?;
        }
        result.set_item("daily", daily)?;

        if let Some(dir) = output_dir {
            let (images_path, daily_path) = pipeline
                .write_outputs(&output, Path::new(&dir))
                .map_err(to_py_err)?;
            result.set_item("image_table", images_path.display().to_string())?;
            result.set_item("daily_table", daily_path.display().to_string())?;
        }

        Ok(result.into())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(build_mask, m)?)?;
        m.add_function(wrap_pyfunction!(assign_flag, m)?)?;
        m.add_function(wrap_pyfunction!(process_directory, m)?)?;
        Ok(())
    }
}
