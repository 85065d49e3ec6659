//! Anomaly frame annotation
//!
//! Frames whose fake score strictly exceeds their real score get their scores
//! drawn in the top-left corner and are written as `frame_{index}.jpg` into
//! the request's output directory.

use ab_glyph::{FontVec, PxScale};
use deepfake_common::{AnomalyRecord, ClassificationResult, ProcessingError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Overlay color for annotated frames
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const TEXT_ORIGIN: (i32, i32) = (10, 10);
const TEXT_SCALE: f32 = 28.0;
/// Height of the marker bar drawn when no overlay font is available
const MARKER_HEIGHT: u32 = 8;
const DEFAULT_JPEG_QUALITY: u8 = 90;

/// File name used for the annotated image of `frame_index`
#[must_use]
pub fn annotated_frame_filename(frame_index: u64) -> String {
    format!("frame_{frame_index}.jpg")
}

/// Frame index encoded in an annotated frame file name, if it is one
#[must_use]
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("frame_")?
        .strip_suffix(".jpg")?
        .parse()
        .ok()
}

/// Overlay text for a pair of scores
#[must_use]
pub fn overlay_text(result: &ClassificationResult) -> String {
    format!(
        "Real: {:.2}, Fake: {:.2}",
        result.real_score, result.fake_score
    )
}

/// Load a TrueType/OpenType font for score overlays
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid font.
pub fn load_overlay_font(path: &Path) -> Result<Arc<FontVec>> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data).map_err(|e| {
        ProcessingError::InvalidInput(format!("Invalid font {}: {e}", path.display()))
    })?;
    info!("Loaded overlay font from {}", path.display());
    Ok(Arc::new(font))
}

/// Draws scores onto anomaly frames and persists them
#[derive(Clone)]
pub struct AnomalyAnnotator {
    output_dir: PathBuf,
    font: Option<Arc<FontVec>>,
    jpeg_quality: u8,
}

impl AnomalyAnnotator {
    /// Create an annotator writing into `output_dir`
    ///
    /// Without a font the overlay degrades to a solid marker bar along the top
    /// edge; the frame is still flagged and persisted.
    pub fn new(output_dir: impl Into<PathBuf>, font: Option<Arc<FontVec>>) -> Self {
        Self {
            output_dir: output_dir.into(),
            font,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Annotate and persist `image` if the scores flag it as an anomaly
    ///
    /// Returns `None` (and writes nothing) when the frame is not an anomaly.
    ///
    /// # Errors
    ///
    /// Returns an error if the annotated image cannot be written.
    pub fn annotate(
        &self,
        frame_index: u64,
        mut image: RgbImage,
        result: &ClassificationResult,
    ) -> Result<Option<AnomalyRecord>> {
        if !result.is_anomaly() {
            return Ok(None);
        }

        self.draw_overlay(&mut image, result);

        let path = self.output_dir.join(annotated_frame_filename(frame_index));
        let writer = BufWriter::new(File::create(&path)?);
        JpegEncoder::new_with_quality(writer, self.jpeg_quality).encode_image(&image)?;

        debug!(
            "Annotated anomaly frame {} -> {}",
            frame_index,
            path.display()
        );

        Ok(Some(AnomalyRecord {
            frame_index,
            real_score: result.real_score,
            fake_score: result.fake_score,
            frame_artifact: path,
        }))
    }

    fn draw_overlay(&self, image: &mut RgbImage, result: &ClassificationResult) {
        match &self.font {
            Some(font) => draw_text_mut(
                image,
                ANNOTATION_COLOR,
                TEXT_ORIGIN.0,
                TEXT_ORIGIN.1,
                PxScale::from(TEXT_SCALE),
                &**font,
                &overlay_text(result),
            ),
            None => {
                let (width, height) = image.dimensions();
                if width > 0 && height > 0 {
                    let rect = Rect::at(0, 0).of_size(width, MARKER_HEIGHT.min(height));
                    draw_filled_rect_mut(image, rect, ANNOTATION_COLOR);
                }
            }
        }
    }
}

impl std::fmt::Debug for AnomalyAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyAnnotator")
            .field("output_dir", &self.output_dir)
            .field("has_font", &self.font.is_some())
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}
