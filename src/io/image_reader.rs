use crate::types::{IndexRaster, PhenoError, PhenoResult, RgbImage, SnowTag};
use ndarray::{Array2, Array3};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

/// Sub-folder that snow-covered images are moved into by the operator
pub const SNOW_FOLDER: &str = "SnowyImage";

/// One input image and the snow tag implied by its folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub snow: SnowTag,
}

impl SourceImage {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// List JPEG files directly inside `dir`, sorted by name
pub fn list_jpegs(dir: &Path) -> PhenoResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_jpeg(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Find the images of a run
///
/// Images directly in `dir` are snow free; images in `dir/SnowyImage` are
/// snow covered. A missing snow folder just means no snowy images.
pub fn discover_images(dir: &Path) -> PhenoResult<Vec<SourceImage>> {
    if !dir.is_dir() {
        return Err(PhenoError::Config(format!(
            "Image directory {} does not exist",
            dir.display()
        )));
    }

    let mut images: Vec<SourceImage> = list_jpegs(dir)?
        .into_iter()
        .map(|path| SourceImage { path, snow: SnowTag::NoSnow })
        .collect();
    let primary = images.len();

    let snow_dir = dir.join(SNOW_FOLDER);
    if snow_dir.is_dir() {
        images.extend(
            list_jpegs(&snow_dir)?
                .into_iter()
                .map(|path| SourceImage { path, snow: SnowTag::Snow }),
        );
    }

    log::info!(
        "Found {} images in {} ({} snow free, {} snowy)",
        images.len(),
        dir.display(),
        primary,
        images.len() - primary
    );
    Ok(images)
}

/// Decode an image file into an (height, width, 3) RGB array
pub fn read_rgb(path: &Path) -> PhenoResult<RgbImage> {
    let decoded = image::open(path).map_err(|e| PhenoError::ImageRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw()).map_err(|e| {
        PhenoError::ImageRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

/// Read only the (width, height) of an image
pub fn image_dimensions(path: &Path) -> PhenoResult<(usize, usize)> {
    let (width, height) = image::image_dimensions(path).map_err(|e| PhenoError::ImageRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok((width as usize, height as usize))
}

/// Encode an RGB array; the format follows the file extension
pub fn write_rgb(path: &Path, data: &RgbImage) -> PhenoResult<()> {
    let (height, width, channels) = data.dim();
    if channels != 3 {
        return Err(PhenoError::InvalidFormat(format!(
            "Expected 3 channels, got {}",
            channels
        )));
    }
    let raw: Vec<u8> = data.iter().copied().collect();
    let buffer = image::RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| PhenoError::Processing("RGB buffer size mismatch".to_string()))?;
    buffer.save(path)?;
    Ok(())
}

/// Write a GCC/RCC raster as a 32-bit float grayscale TIFF, NaN kept
pub fn write_index_raster(path: &Path, raster: &IndexRaster) -> PhenoResult<()> {
    let (height, width) = raster.dim();
    let data: Vec<f32> = raster.iter().copied().collect();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    encoder.write_image::<colortype::Gray32Float>(width as u32, height as u32, &data)?;
    Ok(())
}

/// Read a float raster written by `write_index_raster`
pub fn read_index_raster(path: &Path) -> PhenoResult<IndexRaster> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    let data = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf,
        _ => {
            return Err(PhenoError::InvalidFormat(format!(
                "{} is not a 32-bit float raster",
                path.display()
            )))
        }
    };
    Array2::from_shape_vec((height as usize, width as usize), data)
        .map_err(|e| PhenoError::InvalidFormat(format!("{}: {}", path.display(), e)))
}
