//! Spatially binned RGB color histogram used as the appearance descriptor.
//!
//! A patch is resampled to a canonical square, split into a grid of
//! (possibly overlapping) spatial cells, and each cell contributes a
//! Gaussian-weighted 3D RGB histogram. The descriptor is the concatenation
//! of the cell histograms.

use nalgebra::{DMatrix, DVector};

use crate::error::ImageError;
use crate::pixel_buffer::{ChromaMode, PixelBuffer, PixelFormat};
use crate::rect::Rect;

/// Appearance descriptor. Length is [`SpatialRgbHistogram::feature_size`].
pub type RgbFeature = DVector<f32>;

const MIN_HISTOGRAM_MASS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct SpatialRgbHistogram {
    canonical_patch_size: usize,
    spatial_bin_size: usize,
    spatial_bin_stride: usize,
    rgb_bin_size: usize,
    rgb_num_bins: usize,
    rgb_hist_size: usize,
    spatial_num_bins: usize,
    weight: DMatrix<f32>,
}

impl Default for SpatialRgbHistogram {
    fn default() -> Self {
        Self::new(64, 32, 32, 32)
    }
}

impl SpatialRgbHistogram {
    pub fn new(
        canonical_patch_size: usize,
        spatial_bin_size: usize,
        spatial_bin_stride: usize,
        rgb_bin_size: usize,
    ) -> Self {
        debug_assert!(
            spatial_bin_size > 0 && spatial_bin_size <= canonical_patch_size,
            "spatial bin {} does not fit in a {} patch",
            spatial_bin_size,
            canonical_patch_size
        );
        debug_assert!(spatial_bin_stride > 0, "spatial stride must be positive");
        debug_assert!(
            rgb_bin_size > 0 && rgb_bin_size <= 256,
            "rgb bin size must be in 1..=256"
        );

        let rgb_num_bins = 256 / rgb_bin_size;
        let spatial_num_bins =
            1 + (canonical_patch_size - spatial_bin_size) / spatial_bin_stride;

        let sigma = 0.5 * canonical_patch_size as f32;
        let weight = DMatrix::from_fn(
            canonical_patch_size,
            canonical_patch_size,
            |y, x| {
                let dx = (sigma - x as f32) / sigma;
                let dy = (sigma - y as f32) / sigma;
                (-0.5 * (dx * dx + dy * dy)).exp()
            },
        );

        Self {
            canonical_patch_size,
            spatial_bin_size,
            spatial_bin_stride,
            rgb_bin_size,
            rgb_num_bins,
            rgb_hist_size: rgb_num_bins * rgb_num_bins * rgb_num_bins,
            spatial_num_bins,
            weight,
        }
    }

    pub fn canonical_patch_size(&self) -> usize {
        self.canonical_patch_size
    }

    pub fn feature_size(&self) -> usize {
        self.spatial_num_bins * self.spatial_num_bins * self.rgb_hist_size
    }

    /// Descriptor of a whole packed patch (RGB, BGR, BGRA or GRAY).
    pub fn compute(&self, patch: &PixelBuffer) -> Result<RgbFeature, ImageError> {
        let mut hist = RgbFeature::zeros(self.feature_size());
        if patch.width() == 0 || patch.height() == 0 {
            return Ok(hist);
        }
        let size = self.canonical_patch_size;
        let canonical = patch.resize((size, size))?.to_rgb24()?;
        self.accumulate(&canonical, &mut hist)?;
        Ok(hist)
    }

    /// Descriptor of `roi` inside `image`, for any supported format. YUV
    /// crops are converted to RGB before binning.
    pub fn compute_in_roi(
        &self,
        image: &PixelBuffer,
        roi: &Rect<f32>,
    ) -> Result<RgbFeature, ImageError> {
        self.compute_in_roi_with(image, roi, ChromaMode::Subsampled)
    }

    /// Same as [`compute_in_roi`](Self::compute_in_roi) with an explicit
    /// chroma layout for the intermediate YUV crop.
    pub fn compute_in_roi_with(
        &self,
        image: &PixelBuffer,
        roi: &Rect<f32>,
        chroma_mode: ChromaMode,
    ) -> Result<RgbFeature, ImageError> {
        let mut hist = RgbFeature::zeros(self.feature_size());
        if image.width() == 0 || image.height() == 0 || roi.is_empty() {
            return Ok(hist);
        }
        // whole pixels touched by the roi, so a sliver on the right or
        // bottom edge cannot round to a window past the image
        let left = roi.x().floor().max(0.0);
        let top = roi.y().floor().max(0.0);
        let right = roi.right().ceil().min(image.width() as f32);
        let bottom = roi.bottom().ceil().min(image.height() as f32);
        if right <= left || bottom <= top {
            return Ok(hist);
        }
        let roi = Rect::from_xyxy(left, top, right, bottom);
        let size = self.canonical_patch_size;
        let patch = image.crop_and_resize(
            roi.center(),
            (roi.width(), roi.height()),
            (size, size),
            chroma_mode,
        )?;
        let canonical = if patch.format() == PixelFormat::Rgb24 {
            patch
        } else {
            patch.to_rgb24()?
        };
        self.accumulate(&canonical, &mut hist)?;
        Ok(hist)
    }

    /// Bhattacharyya coefficient of two descriptors, in `[0, 1]`.
    pub fn compute_similarity(h1: &RgbFeature, h2: &RgbFeature) -> f32 {
        debug_assert_eq!(h1.len(), h2.len(), "descriptor lengths differ");
        let sum1 = h1.sum();
        let sum2 = h2.sum();
        if sum1 < MIN_HISTOGRAM_MASS || sum2 < MIN_HISTOGRAM_MASS {
            return 0.0;
        }
        let overlap: f32 = h1
            .iter()
            .zip(h2.iter())
            .map(|(a, b)| (a * b).max(0.0).sqrt())
            .sum();
        (overlap / (sum1 * sum2).sqrt()).clamp(0.0, 1.0)
    }

    fn accumulate(
        &self,
        canonical: &PixelBuffer,
        hist: &mut RgbFeature,
    ) -> Result<(), ImageError> {
        let (r, g, b) = (canonical.channel(0)?, canonical.channel(1)?, canonical.channel(2)?);
        let bins = self.rgb_num_bins;
        let mut offset = 0;
        for y_bin in 0..self.spatial_num_bins {
            let y0 = y_bin * self.spatial_bin_stride;
            for x_bin in 0..self.spatial_num_bins {
                let x0 = x_bin * self.spatial_bin_stride;
                for y in y0..y0 + self.spatial_bin_size {
                    for x in x0..x0 + self.spatial_bin_size {
                        let rb = (r.get(x, y) as usize / self.rgb_bin_size).min(bins - 1);
                        let gb = (g.get(x, y) as usize / self.rgb_bin_size).min(bins - 1);
                        let bb = (b.get(x, y) as usize / self.rgb_bin_size).min(bins - 1);
                        let idx = offset + (rb * bins + gb) * bins + bb;
                        hist[idx] += self.weight[(y, x)];
                    }
                }
                offset += self.rgb_hist_size;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn solid_bgr(width: usize, height: usize, bgr: [u8; 3]) -> PixelBuffer<'static> {
        let mut img = PixelBuffer::new(width, height, PixelFormat::Bgr24).unwrap();
        // logical channel order is R, G, B
        img.fill_channel(0, bgr[2]).unwrap();
        img.fill_channel(1, bgr[1]).unwrap();
        img.fill_channel(2, bgr[0]).unwrap();
        img
    }

    #[test]
    fn test_default_feature_size() {
        let hist = SpatialRgbHistogram::default();
        assert_eq!(hist.feature_size(), 2048);
    }

    #[test]
    fn test_overlapping_spatial_bins() {
        let hist = SpatialRgbHistogram::new(64, 32, 16, 64);
        // 3x3 cells of 4^3 bins
        assert_eq!(hist.feature_size(), 9 * 64);
    }

    #[test]
    fn test_solid_patch_fills_one_bin_per_cell() {
        let hist = SpatialRgbHistogram::default();
        let img = solid_bgr(40, 20, [0, 0, 255]);
        let feature = hist.compute(&img).unwrap();
        let nonzero = feature.iter().filter(|v| **v > 0.0).count();
        assert_eq!(nonzero, 4);
        // pure red lands in bin (7, 0, 0) of each cell
        assert!(feature[7 * 64] > 0.0);
    }

    #[test]
    fn test_zero_size_input_gives_zero_feature() {
        let hist = SpatialRgbHistogram::default();
        let img = PixelBuffer::new(16, 16, PixelFormat::Rgb24).unwrap();
        let feature = hist
            .compute_in_roi(&img, &Rect::new(4.0, 4.0, 0.0, 8.0))
            .unwrap();
        assert_eq!(feature.len(), 2048);
        assert_eq!(feature.sum(), 0.0);
        assert_eq!(SpatialRgbHistogram::compute_similarity(&feature, &feature), 0.0);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let hist = SpatialRgbHistogram::default();
        let mut img = solid_bgr(64, 64, [10, 200, 30]);
        img.fill_region(&Rect::new(0.0, 0.0, 32.0, 64.0), &[250, 250, 0])
            .unwrap();
        let feature = hist
            .compute_in_roi(&img, &Rect::new(8.0, 8.0, 48.0, 48.0))
            .unwrap();
        assert_nearly_eq!(
            SpatialRgbHistogram::compute_similarity(&feature, &feature),
            1.0,
            1e-5
        );
    }

    #[test]
    fn test_different_colors_are_dissimilar() {
        let hist = SpatialRgbHistogram::default();
        let red = hist.compute(&solid_bgr(32, 32, [0, 0, 255])).unwrap();
        let blue = hist.compute(&solid_bgr(32, 32, [255, 0, 0])).unwrap();
        assert_nearly_eq!(SpatialRgbHistogram::compute_similarity(&red, &blue), 0.0, 1e-6);
    }

    #[test]
    fn test_nv12_roi_matches_rgb_color() {
        let hist = SpatialRgbHistogram::default();
        let mut nv12 = PixelBuffer::new(64, 64, PixelFormat::Nv12).unwrap();
        // mid gray in video range
        nv12.fill_channel(0, 126).unwrap();
        nv12.fill_channel(1, 128).unwrap();
        nv12.fill_channel(2, 128).unwrap();
        let from_yuv = hist
            .compute_in_roi(&nv12, &Rect::new(10.0, 10.0, 30.0, 30.0))
            .unwrap();
        let from_rgb = hist.compute(&solid_bgr(8, 8, [128, 128, 128])).unwrap();
        assert_nearly_eq!(
            SpatialRgbHistogram::compute_similarity(&from_yuv, &from_rgb),
            1.0,
            1e-5
        );
    }

    #[test]
    fn test_roi_sliver_on_far_edges() {
        let hist = SpatialRgbHistogram::default();
        let img = solid_bgr(640, 480, [30, 30, 220]);
        for roi in [
            Rect::new(639.5, 10.0, 0.5, 50.0),
            Rect::new(10.0, 479.5, 50.0, 0.5),
            Rect::new(639.5, 479.5, 0.5, 0.5),
        ] {
            let feature = hist.compute_in_roi(&img, &roi).unwrap();
            assert_nearly_eq!(
                SpatialRgbHistogram::compute_similarity(&feature, &feature),
                1.0,
                1e-4
            );
        }
    }

    #[test]
    fn test_quickcheck_similarity_bounds() {
        fn prop(a: Vec<u8>, b: Vec<u8>) -> bool {
            let n = a.len().min(b.len());
            let h1 = RgbFeature::from_iterator(n, a.iter().take(n).map(|v| *v as f32));
            let h2 = RgbFeature::from_iterator(n, b.iter().take(n).map(|v| *v as f32));
            let s = SpatialRgbHistogram::compute_similarity(&h1, &h2);
            let self_s = SpatialRgbHistogram::compute_similarity(&h1, &h1);
            let self_ok = h1.sum() < MIN_HISTOGRAM_MASS || (self_s - 1.0).abs() < 1e-4;
            (0.0..=1.0).contains(&s) && self_ok
        }
        quickcheck::quickcheck(prop as fn(Vec<u8>, Vec<u8>) -> bool);
    }
}
