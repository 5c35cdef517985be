//! Aspect-preserving frame resize.

use image::RgbImage;
use image::imageops::{self, FilterType};

/// Largest Rows/Columns value a DICOM image can declare.
pub const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Frame dimensions that cannot be scaled.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeError {
    #[error("cannot resize a frame with zero width")]
    ZeroWidth,
    #[error("target width must be greater than 0")]
    ZeroTargetWidth,
    #[error("frame dimensions {width}x{height} exceed the DICOM limit of 65535")]
    TooLarge { width: u32, height: u32 },
}

/// Output dimensions for scaling `(width, height)` to `target_width`.
///
/// The height scales by the same factor as the width, rounded to the nearest
/// pixel and never below one. Neither side may exceed [`MAX_DIMENSION`].
pub fn target_dimensions(
    width: u32,
    height: u32,
    target_width: Option<u32>,
) -> Result<(u32, u32), ResizeError> {
    let dimensions = match target_width {
        None => (width, height),
        Some(_) if width == 0 => return Err(ResizeError::ZeroWidth),
        Some(0) => return Err(ResizeError::ZeroTargetWidth),
        Some(target_width) => {
            let scaled = (f64::from(height) * f64::from(target_width) / f64::from(width)).round();
            (target_width, (scaled as u32).max(1))
        }
    };

    if dimensions.0 > MAX_DIMENSION || dimensions.1 > MAX_DIMENSION {
        return Err(ResizeError::TooLarge {
            width: dimensions.0,
            height: dimensions.1,
        });
    }
    Ok(dimensions)
}

/// Resize `image` to `target_width`, keeping its aspect ratio. Without a target
/// the image is returned unchanged.
pub fn resize(image: RgbImage, target_width: Option<u32>) -> Result<RgbImage, ResizeError> {
    let (width, height) = target_dimensions(image.width(), image.height(), target_width)?;
    if (width, height) == image.dimensions() {
        return Ok(image);
    }
    Ok(imageops::resize(&image, width, height, FilterType::Triangle))
}
