//! Texture normalization (PNG/JPG -> size-limited JPG)
//!
//! Each texture is checked against the size limit and the power-of-two policy,
//! downsized when it is oversized and both sides are powers of two, and written
//! out as a 3-channel JPEG next to the source file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::{PrepError, Result};

/// JPEG quality used for every written texture.
pub const JPEG_QUALITY: u8 = 75;

/// Source texture format, detected from the file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Png,
    Jpeg,
}

impl TextureKind {
    /// Detect the format from an exact, case-sensitive `.png` / `.jpg` suffix.
    ///
    /// File names that are not valid UTF-8 are matched on their lossy form,
    /// which keeps an ASCII suffix intact.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.ends_with(".png") {
            Some(Self::Png)
        } else if name.ends_with(".jpg") {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// What the normalizer did to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeAction {
    /// Downsized and written as JPEG.
    Resized,
    /// Written as JPEG at its original size.
    Converted,
    /// Already a JPEG within limits; nothing written.
    AlreadyOptimal,
}

/// Non-power-of-two advisory raised while normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionWarning {
    pub width: u32,
    pub height: u32,
    /// The texture was oversized, so the warning also means it was not scaled.
    pub resize_skipped: bool,
}

/// Result of normalizing one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub source: PathBuf,
    pub kind: TextureKind,
    pub action: NormalizeAction,
    /// Dimensions of the source image.
    pub original: (u32, u32),
    /// Written JPEG path and its dimensions, if anything was written.
    pub output: Option<(PathBuf, (u32, u32))>,
    pub warning: Option<DimensionWarning>,
}

/// True for integers with exactly one set bit.
pub fn is_power_of_two(n: u32) -> bool {
    n > 0 && n & (n - 1) == 0
}

/// Target size for an oversized texture: longest side becomes `max`, floor rounding.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let (w, h, m) = (width as u64, height as u64, max as u64);
    let (tw, th) = if w == h {
        (m, m)
    } else if w > h {
        (m, h * m / w)
    } else {
        (w * m / h, m)
    };
    (tw.max(1) as u32, th.max(1) as u32)
}

/// Path the JPEG counterpart of `path` is written to.
pub fn jpeg_path_for(path: &Path) -> PathBuf {
    path.with_extension(TextureKind::Jpeg.extension())
}

/// Normalize a single texture file.
///
/// A PNG whose JPEG counterpart already exists is refused with
/// [`PrepError::Collision`]. An image that cannot be decoded yields
/// [`PrepError::Image`].
pub fn normalize(path: &Path, max_dimension: u32) -> Result<Normalized> {
    let kind =
        TextureKind::from_path(path).ok_or_else(|| PrepError::UnsupportedFormat(path.into()))?;
    let jpeg_path = jpeg_path_for(path);

    if kind != TextureKind::Jpeg && jpeg_path.exists() {
        return Err(PrepError::Collision {
            source_path: path.to_path_buf(),
            existing: jpeg_path,
        });
    }

    let img = image::open(path).map_err(|e| PrepError::image(path, e))?;
    let (width, height) = img.dimensions();
    let power_of_two = is_power_of_two(width) && is_power_of_two(height);
    let name = display_name(path);

    if width > max_dimension || height > max_dimension {
        // Oversized: non-power-of-two textures are left unscaled but still re-encoded.
        let (img, action, warning) = if !power_of_two {
            tracing::warn!(
                "{} resolution is not a power of two, image not scaled ({}, {})",
                name,
                width,
                height
            );
            let warning = DimensionWarning {
                width,
                height,
                resize_skipped: true,
            };
            (img, NormalizeAction::Converted, Some(warning))
        } else {
            let (target_w, target_h) = fit_within(width, height, max_dimension);
            let resized = img.resize_exact(target_w, target_h, FilterType::Lanczos3);
            tracing::info!("Resized {} to {}x{}", name, target_w, target_h);
            (resized, NormalizeAction::Resized, None)
        };

        let written = write_jpeg(&img, &jpeg_path)?;
        tracing::info!("Converted {} to {}", name, jpeg_path.display());

        return Ok(Normalized {
            source: path.to_path_buf(),
            kind,
            action,
            original: (width, height),
            output: Some((jpeg_path, written)),
            warning,
        });
    }

    let warning = if power_of_two {
        None
    } else {
        tracing::warn!(
            "{} resolution is not a power of two ({}, {})",
            name,
            width,
            height
        );
        Some(DimensionWarning {
            width,
            height,
            resize_skipped: false,
        })
    };

    let (action, output) = match kind {
        TextureKind::Jpeg => {
            tracing::info!(
                "{} is already a jpg and within {}x{}, skipping",
                name,
                max_dimension,
                max_dimension
            );
            (NormalizeAction::AlreadyOptimal, None)
        }
        TextureKind::Png => {
            let written = write_jpeg(&img, &jpeg_path)?;
            tracing::info!("Converted {} to {}", name, jpeg_path.display());
            (NormalizeAction::Converted, Some((jpeg_path, written)))
        }
    };

    Ok(Normalized {
        source: path.to_path_buf(),
        kind,
        action,
        original: (width, height),
        output,
        warning,
    })
}

/// Encode `img` as 3-channel JPEG, returning the written dimensions.
fn write_jpeg(img: &DynamicImage, output: &Path) -> Result<(u32, u32)> {
    let rgb = img.to_rgb8();

    let file = File::create(output).map_err(|e| PrepError::io(output, e))?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .map_err(|e| PrepError::image(output, e))?;
    }
    writer.flush().map_err(|e| PrepError::io(output, e))?;

    Ok(rgb.dimensions())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
