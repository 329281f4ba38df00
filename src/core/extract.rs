use crate::core::solar::SolarGeometry;
use crate::io::filename::AcquisitionName;
use crate::types::{round_to, ImageRecord, Mask, PhenoError, PhenoResult, RgbImage, SnowTag};
use ndarray::{Axis, Zip};

/// Decimals kept for per-image GCC and RCC
pub const INDEX_DECIMALS: i32 = 5;

/// Zero every pixel outside the mask
pub fn apply_mask(image: &RgbImage, mask: &Mask) -> PhenoResult<RgbImage> {
    check_shape(image, mask)?;
    let mut masked = image.clone();
    Zip::from(masked.lanes_mut(Axis(2)))
        .and(mask)
        .for_each(|mut pixel, &inside| {
            if inside == 0 {
                pixel.fill(0);
            }
        });
    Ok(masked)
}

fn check_shape(image: &RgbImage, mask: &Mask) -> PhenoResult<()> {
    let (height, width, channels) = image.dim();
    if channels != 3 {
        return Err(PhenoError::InvalidFormat(format!(
            "Expected an RGB image, got {} channels",
            channels
        )));
    }
    if (height, width) != mask.dim() {
        return Err(PhenoError::ShapeMismatch {
            expected: mask.dim(),
            actual: (height, width),
        });
    }
    Ok(())
}

/// Mean R, G, B of a masked image, ignoring zero samples
///
/// Zero is the masked-out value, so a channel with no nonzero samples has
/// a NaN mean.
pub fn channel_means(masked: &RgbImage) -> [f64; 3] {
    let mut sums = [0u64; 3];
    let mut counts = [0u64; 3];
    for pixel in masked.lanes(Axis(2)) {
        for (c, &value) in pixel.iter().enumerate() {
            if value != 0 {
                sums[c] += value as u64;
                counts[c] += 1;
            }
        }
    }
    let mut means = [f64::NAN; 3];
    for c in 0..3 {
        if counts[c] > 0 {
            means[c] = sums[c] as f64 / counts[c] as f64;
        }
    }
    means
}

/// GCC and RCC (rounded) from channel means; NaN when the total is zero
pub fn chromatic_coordinates(red: f64, green: f64, blue: f64) -> (f64, f64) {
    let total = red + green + blue;
    if total == 0.0 || !total.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    (
        round_to(green / total, INDEX_DECIMALS),
        round_to(red / total, INDEX_DECIMALS),
    )
}

/// Per-image ROI statistics
#[derive(Debug, Clone, Default)]
pub struct IndexExtractor {
    solar: Option<SolarGeometry>,
}

impl IndexExtractor {
    pub fn new(solar: Option<SolarGeometry>) -> Self {
        Self { solar }
    }

    pub fn solar(&self) -> Option<&SolarGeometry> {
        self.solar.as_ref()
    }

    /// Compute the record of one image
    pub fn extract(
        &self,
        image: &RgbImage,
        mask: &Mask,
        name: &AcquisitionName,
        snow: SnowTag,
    ) -> PhenoResult<ImageRecord> {
        let masked = apply_mask(image, mask)?;
        let [mean_red, mean_green, mean_blue] = channel_means(&masked);
        let (gcc, rcc) = chromatic_coordinates(mean_red, mean_green, mean_blue);

        let (solar_elevation, solar_class) = match &self.solar {
            Some(geometry) => {
                let (elevation, class) = geometry.classify(name.timestamp())?;
                (Some(elevation), Some(class))
            }
            None => (None, None),
        };

        if gcc.is_nan() {
            log::warn!("{}: no valid pixels inside the ROI, indices are NaN", name.file_name);
        }
        log::debug!(
            "{}: R={:.3} G={:.3} B={:.3} GCC={} RCC={} solar={:?}",
            name.file_name,
            mean_red,
            mean_green,
            mean_blue,
            gcc,
            rcc,
            solar_elevation
        );

        Ok(ImageRecord {
            filename: name.file_name.clone(),
            doy: name.doy,
            timestamp: name.timestamp(),
            mean_red,
            mean_green,
            mean_blue,
            gcc,
            rcc,
            snow,
            solar_elevation,
            solar_class,
        })
    }
}
