//! Per-format appearance extraction strategies.

use crate::error::ImageError;
use crate::histogram::{RgbFeature, SpatialRgbHistogram};
use crate::pixel_buffer::{ChromaMode, PixelBuffer, PixelFormat};
use crate::rect::Rect;

/// Turns a detection box in a frame into an appearance descriptor.
pub trait AppearanceExtractor: Send {
    fn supports(&self, format: PixelFormat) -> bool;

    fn feature_size(&self) -> usize;

    /// `roi` is expected to be clipped to the frame already.
    fn extract(
        &self,
        frame: &PixelBuffer,
        roi: &Rect<f32>,
    ) -> Result<RgbFeature, ImageError>;
}

/// Extractor for packed color frames (RGB, BGR, BGRA).
#[derive(Debug, Clone, Default)]
pub struct PackedExtractor {
    histogram: SpatialRgbHistogram,
}

impl PackedExtractor {
    pub fn new(histogram: SpatialRgbHistogram) -> Self {
        Self { histogram }
    }
}

impl AppearanceExtractor for PackedExtractor {
    fn supports(&self, format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Bgra32
        )
    }

    fn feature_size(&self) -> usize {
        self.histogram.feature_size()
    }

    fn extract(
        &self,
        frame: &PixelBuffer,
        roi: &Rect<f32>,
    ) -> Result<RgbFeature, ImageError> {
        if !self.supports(frame.format()) {
            return Err(ImageError::InvalidArgument(format!(
                "packed extractor cannot read {:?} frames",
                frame.format()
            )));
        }
        self.histogram.compute_in_roi(frame, roi)
    }
}

/// Extractor for planar 4:2:0 frames (NV12, I420).
#[derive(Debug, Clone, Default)]
pub struct YuvExtractor {
    histogram: SpatialRgbHistogram,
    chroma_mode: ChromaMode,
}

impl YuvExtractor {
    pub fn new(histogram: SpatialRgbHistogram, chroma_mode: ChromaMode) -> Self {
        Self {
            histogram,
            chroma_mode,
        }
    }
}

impl AppearanceExtractor for YuvExtractor {
    fn supports(&self, format: PixelFormat) -> bool {
        format.is_yuv()
    }

    fn feature_size(&self) -> usize {
        self.histogram.feature_size()
    }

    fn extract(
        &self,
        frame: &PixelBuffer,
        roi: &Rect<f32>,
    ) -> Result<RgbFeature, ImageError> {
        if !self.supports(frame.format()) {
            return Err(ImageError::InvalidArgument(format!(
                "yuv extractor cannot read {:?} frames",
                frame.format()
            )));
        }
        self.histogram
            .compute_in_roi_with(frame, roi, self.chroma_mode)
    }
}

/// Default extractor for a color format. Gray frames carry no color and
/// track on position and shape alone.
pub fn extractor_for(format: PixelFormat) -> Option<Box<dyn AppearanceExtractor>> {
    match format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Bgra32 => {
            Some(Box::new(PackedExtractor::default()))
        }
        PixelFormat::Nv12 | PixelFormat::I420 | PixelFormat::Yuv444 => {
            Some(Box::new(YuvExtractor::default()))
        }
        PixelFormat::Gray | PixelFormat::Unknown => None,
    }
}
