//! Rejects thumbnails that are a single flat color.
//!
//! A grid of at most 10x10 pixels spanning the whole frame is compared
//! against the top-left pixel; when fewer than 1% of samples differ the
//! frame is treated as blank (black intro frames, fade-ins, broken decodes).

use image::{DynamicImage, ImageReader};
use std::path::Path;
use thiserror::Error;

const GRID: u32 = 10;
/// Per-channel difference, on the 16-bit scale, that counts as different.
const CHANNEL_TOLERANCE: u16 = 256;
const MIN_DIFFERING_RATIO: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("could not decode thumbnail: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not read thumbnail: {0}")]
    Io(#[from] std::io::Error),
    #[error("thumbnail has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("thumbnail is a solid color ({differing} of {total} samples differ)")]
    SolidColor { differing: usize, total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleReport {
    pub differing: usize,
    pub total: usize,
}

impl SampleReport {
    pub fn is_degenerate(&self) -> bool {
        self.total == 0 || (self.differing as f64 / self.total as f64) < MIN_DIFFERING_RATIO
    }
}

pub fn sample(image: &DynamicImage) -> SampleReport {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return SampleReport {
            differing: 0,
            total: 0,
        };
    }

    let pixels = image.to_rgba16();
    let reference = pixels.get_pixel(0, 0).0;
    let step_x = width.div_ceil(GRID).max(1);
    let step_y = height.div_ceil(GRID).max(1);

    let mut report = SampleReport {
        differing: 0,
        total: 0,
    };
    for y in (0..height).step_by(step_y as usize) {
        for x in (0..width).step_by(step_x as usize) {
            let pixel = pixels.get_pixel(x, y).0;
            report.total += 1;
            let differs = pixel
                .iter()
                .zip(reference.iter())
                .any(|(a, b)| a.abs_diff(*b) > CHANNEL_TOLERANCE);
            if differs {
                report.differing += 1;
            }
        }
    }
    report
}

/// Decodes the image at `path` and errors when it is blank.
///
/// Decoding is CPU-bound; async callers should run this on a blocking
/// thread.
pub fn ensure_not_degenerate(path: &Path) -> Result<SampleReport, ValidationError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ValidationError::Empty {
            width: image.width(),
            height: image.height(),
        });
    }
    let report = sample(&image);
    if report.is_degenerate() {
        return Err(ValidationError::SolidColor {
            differing: report.differing,
            total: report.total,
        });
    }
    Ok(report)
}
