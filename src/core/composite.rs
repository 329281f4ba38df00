use crate::core::stats::nan_mean;
use crate::types::{IndexRaster, PhenoError, PhenoResult, RgbImage};
use ndarray::{Array2, Array3, Axis, Zip};

/// Pixel-wise mean of all images taken on one day
#[derive(Debug, Clone, Default)]
pub struct DailyComposite {
    sum: Option<Array3<u32>>,
    count: u32,
}

impl DailyComposite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_count(&self) -> u32 {
        self.count
    }

    /// Add one image; every image of a day must have the same shape
    pub fn accumulate(&mut self, image: &RgbImage) -> PhenoResult<()> {
        let sum = self
            .sum
            .get_or_insert_with(|| Array3::zeros(image.raw_dim()));
        if sum.dim() != image.dim() {
            let (h, w, _) = sum.dim();
            let (ih, iw, _) = image.dim();
            return Err(PhenoError::ShapeMismatch {
                expected: (h, w),
                actual: (ih, iw),
            });
        }
        Zip::from(sum).and(image).for_each(|acc, &v| *acc += v as u32);
        self.count += 1;
        Ok(())
    }

    /// Mean image rounded to the nearest DN, ties to even
    pub fn mean(&self) -> PhenoResult<RgbImage> {
        let sum = self
            .sum
            .as_ref()
            .filter(|_| self.count > 0)
            .ok_or_else(|| PhenoError::Processing("Composite has no images".to_string()))?;
        let count = self.count as f64;
        Ok(sum.mapv(|v| (v as f64 / count).round_ties_even().min(255.0) as u8))
    }
}

fn pixel_coordinates(pixel: ndarray::ArrayView1<u8>) -> (f32, f32) {
    let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
    let total = r + g + b;
    if total == 0.0 {
        (f32::NAN, f32::NAN)
    } else {
        (g / total, r / total)
    }
}

/// Per-pixel (GCC, RCC) rasters; NaN where R+G+B is zero
pub fn chromatic_coordinates(image: &RgbImage) -> PhenoResult<(IndexRaster, IndexRaster)> {
    let (height, width, channels) = image.dim();
    if channels != 3 {
        return Err(PhenoError::InvalidFormat(format!(
            "Expected an RGB image, got {} channels",
            channels
        )));
    }
    let mut gcc = Array2::<f32>::zeros((height, width));
    let mut rcc = Array2::<f32>::zeros((height, width));

    let zip = Zip::from(&mut gcc).and(&mut rcc).and(image.lanes(Axis(2)));

    #[cfg(feature = "parallel")]
    zip.par_for_each(|g, r, pixel| {
        (*g, *r) = pixel_coordinates(pixel);
    });

    #[cfg(not(feature = "parallel"))]
    zip.for_each(|g, r, pixel| {
        (*g, *r) = pixel_coordinates(pixel);
    });

    let values: Vec<f32> = gcc.iter().copied().collect();
    log::debug!(
        "Composite {}x{}: mean pixel GCC {:.4}",
        width,
        height,
        nan_mean(&values)
    );
    Ok((gcc, rcc))
}
