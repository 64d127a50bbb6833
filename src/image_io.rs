use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use log::debug;

use crate::errors::{ModeError, Result};
use crate::field::{LabeledField, RawField, DEFAULT_BAD_DATA};

/// Load a grayscale image as a raw field.
///
/// Pixel values are read at 16-bit depth when the file has it and 8-bit otherwise, then
/// multiplied by `scale`. A pixel equal to `bad_pixel` before scaling becomes bad data.
pub fn load_field<P: AsRef<Path>>(path: P, scale: f64, bad_pixel: Option<u16>) -> Result<RawField> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ModeError::InvalidPath(path.to_path_buf()));
    }

    let img = image::open(path)?;

    let (nx, ny, samples): (u32, u32, Vec<u16>) = match &img {
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => {
            let gray = img.to_luma16();
            (gray.width(), gray.height(), gray.into_raw())
        }
        _ => {
            let gray = img.to_luma8();
            (
                gray.width(),
                gray.height(),
                gray.into_raw().into_iter().map(u16::from).collect(),
            )
        }
    };

    let data: Vec<f64> = samples
        .into_iter()
        .map(|v| match bad_pixel {
            Some(bad) if v == bad => DEFAULT_BAD_DATA,
            _ => v as f64 * scale,
        })
        .collect();

    debug!("Loaded {}x{} field from {}", nx, ny, path.display());
    RawField::new(nx as usize, ny as usize, data, DEFAULT_BAD_DATA)
}

/// Save a label grid as a 16-bit grayscale PNG; ids above 65535 saturate
pub fn save_label_image<P: AsRef<Path>>(labels: &LabeledField, path: P) -> Result<()> {
    let pixels: Vec<u16> = labels
        .data()
        .iter()
        .map(|&id| id.min(u16::MAX as usize) as u16)
        .collect();

    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(labels.nx() as u32, labels.ny() as u32, pixels).ok_or_else(|| {
            ModeError::InvalidField(format!(
                "label grid {}x{} does not fit an image buffer",
                labels.nx(),
                labels.ny()
            ))
        })?;

    img.save_with_format(path, ImageFormat::Png)?;

    Ok(())
}
