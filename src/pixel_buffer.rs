//! Format-tagged image container used to cut appearance patches out of
//! video frames.
//!
//! A [`PixelBuffer`] either borrows memory owned by the caller (a decoded
//! frame handed over by the media pipeline) or owns its bytes (crops and
//! resized patches). Channel offsets are computed from the format, so the
//! resampling code never does raw pointer arithmetic.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::ImageError;
use crate::rect::Rect;

/* -----------------------------------------------------------------------------
 * Formats
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane followed by an interleaved, 2x2 subsampled UV plane.
    Nv12,
    /// Y plane followed by separate 2x2 subsampled U and V planes.
    I420,
    /// Three full resolution planes. Produced by upsampled YUV crops.
    Yuv444,
    Gray,
    Rgb24,
    Bgr24,
    Bgra32,
    /// Format of an empty or released buffer.
    Unknown,
}

impl PixelFormat {
    pub fn is_yuv(self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::I420 | PixelFormat::Yuv444)
    }

    /// Formats whose chroma planes are stored at half resolution.
    pub fn is_chroma_subsampled(self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::I420)
    }

    pub fn is_packed(self) -> bool {
        matches!(
            self,
            PixelFormat::Gray
                | PixelFormat::Rgb24
                | PixelFormat::Bgr24
                | PixelFormat::Bgra32
        )
    }

    /// Bytes per pixel of the first plane.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Bgra32 => 4,
            PixelFormat::Unknown => 0,
            _ => 1,
        }
    }

    pub fn num_channels(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Bgra32 => 4,
            PixelFormat::Unknown => 0,
            _ => 3,
        }
    }

    fn default_stride(self, width: usize) -> usize {
        if self.is_yuv() || self == PixelFormat::Gray {
            align_even(width)
        } else {
            width * self.bytes_per_pixel()
        }
    }
}

/// Chroma layout requested from a YUV crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaMode {
    /// Keep the 4:2:0 layout of the source.
    #[default]
    Subsampled,
    /// One chroma sample per pixel; the output is [`PixelFormat::Yuv444`].
    Upsampled,
}

#[inline(always)]
fn align_even(v: usize) -> usize {
    (v + 1) & !1
}

/* -----------------------------------------------------------------------------
 * Channel access
 * ----------------------------------------------------------------------------- */
/// Where the samples of one logical channel live inside the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    pub offset: usize,
    /// Distance in bytes between horizontally adjacent samples.
    pub step: usize,
    pub stride: usize,
    pub width: usize,
    pub height: usize,
}

impl ChannelLayout {
    #[inline(always)]
    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(
            x < self.width && y < self.height,
            "sample ({}, {}) is outside {}x{}",
            x,
            y,
            self.width,
            self.height
        );
        self.offset + y * self.stride + x * self.step
    }
}

/// Read-only view of one logical channel: (Y, U, V) for YUV formats,
/// (R, G, B[, A]) for packed formats regardless of byte order.
#[derive(Debug, Clone, Copy)]
pub struct ChannelView<'b> {
    data: &'b [u8],
    layout: ChannelLayout,
}

impl<'b> ChannelView<'b> {
    pub fn width(&self) -> usize {
        self.layout.width
    }

    pub fn height(&self) -> usize {
        self.layout.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[self.layout.index(x, y)]
    }
}

/* -----------------------------------------------------------------------------
 * PixelBuffer
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone)]
pub struct PixelBuffer<'a> {
    data: Cow<'a, [u8]>,
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
}

fn allocate(len: usize) -> Result<Vec<u8>, ImageError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| ImageError::AllocationFailed(len))?;
    data.resize(len, 0);
    Ok(data)
}

fn required_len(
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
) -> usize {
    let chroma_height = (height + 1) / 2;
    match format {
        PixelFormat::Nv12 => stride * height + stride * chroma_height,
        PixelFormat::I420 => {
            stride * height + 2 * ((stride + 1) / 2) * chroma_height
        }
        PixelFormat::Yuv444 => 3 * stride * height,
        PixelFormat::Unknown => 0,
        _ => stride * height,
    }
}

impl PixelBuffer<'static> {
    /// Allocate a zero-filled buffer that owns its memory.
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        if format == PixelFormat::Unknown {
            return Err(ImageError::InvalidArgument(
                "cannot allocate a buffer of unknown format".to_string(),
            ));
        }
        let stride = format.default_stride(width);
        let data = allocate(required_len(width, height, stride, format))?;
        Ok(Self {
            data: Cow::Owned(data),
            width,
            height,
            stride,
            format,
        })
    }

    /// Take ownership of an already filled byte vector.
    pub fn from_vec(
        data: Vec<u8>,
        width: usize,
        height: usize,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        validate_geometry(data.len(), width, height, stride, format)?;
        Ok(Self {
            data: Cow::Owned(data),
            width,
            height,
            stride,
            format,
        })
    }

    /// An unallocated buffer, the required destination of [`resize_into`].
    ///
    /// [`resize_into`]: PixelBuffer::resize_into
    pub fn empty() -> Self {
        Self {
            data: Cow::Owned(Vec::new()),
            width: 0,
            height: 0,
            stride: 0,
            format: PixelFormat::Unknown,
        }
    }
}

fn validate_geometry(
    len: usize,
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
) -> Result<(), ImageError> {
    if format == PixelFormat::Unknown {
        return Err(ImageError::InvalidArgument(
            "unknown pixel format".to_string(),
        ));
    }
    if stride < width * format.bytes_per_pixel() {
        return Err(ImageError::InvalidArgument(format!(
            "stride {} is smaller than a row of {} pixels",
            stride, width
        )));
    }
    if format.is_yuv() && stride % 2 != 0 {
        return Err(ImageError::InvalidArgument(format!(
            "stride {} of a {:?} buffer must be even",
            stride, format
        )));
    }
    let required = required_len(width, height, stride, format);
    if len < required {
        return Err(ImageError::InvalidArgument(format!(
            "{:?} {}x{} (stride {}) needs {} bytes, got {}",
            format, width, height, stride, required, len
        )));
    }
    Ok(())
}

impl<'a> PixelBuffer<'a> {
    /// Wrap externally owned memory without copying. The buffer never frees
    /// or writes through to `data`.
    pub fn from_slice(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, ImageError> {
        validate_geometry(data.len(), width, height, stride, format)?;
        Ok(Self {
            data: Cow::Borrowed(data),
            width,
            height,
            stride,
            format,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable bytes. A borrowed buffer is copied into owned memory first.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.to_mut()
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.data, Cow::Borrowed(_))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frame boundary as a rect anchored at the origin.
    pub fn bounds(&self) -> Rect<f32> {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Drop the pixel data and return to the empty state. Borrowed memory is
    /// simply forgotten.
    pub fn release(&mut self) {
        self.data = Cow::Owned(Vec::new());
        self.width = 0;
        self.height = 0;
        self.stride = 0;
        self.format = PixelFormat::Unknown;
    }

    pub fn into_owned(self) -> PixelBuffer<'static> {
        PixelBuffer {
            data: Cow::Owned(self.data.into_owned()),
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }

    pub fn channel_layout(&self, idx: usize) -> Option<ChannelLayout> {
        let (w, h, stride) = (self.width, self.height, self.stride);
        let luma_size = stride * h;
        let chroma_w = (w + 1) / 2;
        let chroma_h = (h + 1) / 2;
        let packed = |offset: usize| ChannelLayout {
            offset,
            step: self.format.bytes_per_pixel(),
            stride,
            width: w,
            height: h,
        };
        let layout = match (self.format, idx) {
            (PixelFormat::Unknown, _) => return None,
            (f, 0) if f.is_yuv() => packed(0),
            (PixelFormat::Nv12, 1 | 2) => ChannelLayout {
                offset: luma_size + idx - 1,
                step: 2,
                stride,
                width: chroma_w,
                height: chroma_h,
            },
            (PixelFormat::I420, 1 | 2) => {
                let chroma_stride = (stride + 1) / 2;
                ChannelLayout {
                    offset: luma_size + (idx - 1) * chroma_stride * chroma_h,
                    step: 1,
                    stride: chroma_stride,
                    width: chroma_w,
                    height: chroma_h,
                }
            }
            (PixelFormat::Yuv444, 1 | 2) => ChannelLayout {
                offset: idx * luma_size,
                step: 1,
                stride,
                width: w,
                height: h,
            },
            (PixelFormat::Gray, 0) => packed(0),
            (PixelFormat::Rgb24, 0..=2) => packed(idx),
            (PixelFormat::Bgr24, 0..=2) => packed(2 - idx),
            (PixelFormat::Bgra32, 0..=2) => packed(2 - idx),
            (PixelFormat::Bgra32, 3) => packed(3),
            _ => return None,
        };
        Some(layout)
    }

    pub fn channel(&self, idx: usize) -> Result<ChannelView<'_>, ImageError> {
        let layout = self.channel_layout(idx).ok_or_else(|| {
            ImageError::InvalidArgument(format!(
                "{:?} has no channel {}",
                self.format, idx
            ))
        })?;
        Ok(ChannelView {
            data: &self.data,
            layout,
        })
    }

    /// Set every sample of one channel to `value`.
    pub fn fill_channel(&mut self, idx: usize, value: u8) -> Result<(), ImageError> {
        let layout = self.channel(idx)?.layout();
        let data = self.data.to_mut();
        for y in 0..layout.height {
            for x in 0..layout.width {
                data[layout.index(x, y)] = value;
            }
        }
        Ok(())
    }

    /// Paint `values` (one per channel) into the pixels covered by `region`.
    /// Subsampled chroma is painted over the halved region.
    pub fn fill_region(
        &mut self,
        region: &Rect<f32>,
        values: &[u8],
    ) -> Result<(), ImageError> {
        let n_channels = self.format.num_channels();
        if values.len() < n_channels {
            return Err(ImageError::InvalidArgument(format!(
                "{:?} needs {} channel values, got {}",
                self.format,
                n_channels,
                values.len()
            )));
        }
        let region = region.intersect(&self.bounds());
        if region.is_empty() {
            return Ok(());
        }
        let subsampled = self.format.is_chroma_subsampled();
        let layouts = (0..n_channels)
            .filter_map(|c| self.channel_layout(c))
            .collect::<Vec<_>>();
        let data = self.data.to_mut();
        for (c, layout) in layouts.iter().enumerate() {
            let scale = if subsampled && c > 0 { 0.5 } else { 1.0 };
            let x0 = (region.x() * scale).floor() as usize;
            let y0 = (region.y() * scale).floor() as usize;
            let x1 = ((region.right() * scale).ceil() as usize).min(layout.width);
            let y1 = ((region.bottom() * scale).ceil() as usize).min(layout.height);
            for y in y0..y1 {
                for x in x0..x1 {
                    data[layout.index(x, y)] = values[c];
                }
            }
        }
        Ok(())
    }

    /* -------------------------------------------------------------------------
     * Crop and resize
     * ------------------------------------------------------------------------- */
    /// Crop a `crop_size` window centred on `center` and resample it to
    /// `output_size` with bilinear interpolation.
    ///
    /// Packed formats zero-pad the part of the window outside the image and
    /// reject a window that misses the image entirely. YUV formats resample
    /// each plane on its own grid (chroma coordinates halved for 4:2:0
    /// sources) and replicate edge pixels; `chroma_mode` chooses between a
    /// 4:2:0 output and a [`PixelFormat::Yuv444`] output.
    pub fn crop_and_resize(
        &self,
        center: (f32, f32),
        crop_size: (f32, f32),
        output_size: (usize, usize),
        chroma_mode: ChromaMode,
    ) -> Result<PixelBuffer<'static>, ImageError> {
        if self.format == PixelFormat::Unknown || self.is_empty() {
            return Err(ImageError::InvalidArgument(format!(
                "crop_and_resize does not support {:?} buffers",
                self.format
            )));
        }
        let (out_w, out_h) = output_size;
        if out_w == 0 || out_h == 0 {
            return Err(ImageError::InvalidArgument(format!(
                "invalid target size {}x{}",
                out_w, out_h
            )));
        }

        let out_format = match (self.format, chroma_mode) {
            (PixelFormat::Nv12 | PixelFormat::I420, ChromaMode::Upsampled) => {
                PixelFormat::Yuv444
            }
            (f, _) => f,
        };
        let mut output = PixelBuffer::new(out_w, out_h, out_format)?;

        let crop_left = (center.0 - crop_size.0 / 2.0).round();
        let crop_top = (center.1 - crop_size.1 / 2.0).round();
        let crop_w = crop_size.0.round();
        let crop_h = crop_size.1.round();
        if crop_w <= 0.0 || crop_h <= 0.0 {
            return Ok(output);
        }

        let crop_right = crop_left + crop_w - 1.0;
        let crop_bottom = crop_top + crop_h - 1.0;
        let (w, h) = (self.width as f32, self.height as f32);
        let outside = crop_right < 0.0
            || crop_left > w - 1.0
            || crop_bottom < 0.0
            || crop_top > h - 1.0;
        if outside {
            if self.format.is_packed() {
                return Err(ImageError::OutOfBounds(format!(
                    "window ({}, {}) {}x{} misses {}x{} image",
                    crop_left, crop_top, crop_w, crop_h, self.width, self.height
                )));
            }
            return Ok(output);
        }

        let border = if self.format.is_yuv() {
            Border::Replicate
        } else {
            Border::Zero
        };
        let luma = Window {
            left: crop_left,
            top: crop_top,
            width: crop_w,
            height: crop_h,
        };
        self.resample_into(&mut output, luma, border)?;
        Ok(output)
    }

    /// Resize the whole image. Only packed formats are supported.
    pub fn resize(
        &self,
        output_size: (usize, usize),
    ) -> Result<PixelBuffer<'static>, ImageError> {
        if !self.format.is_packed() {
            return Err(ImageError::InvalidArgument(format!(
                "resize does not support {:?} buffers",
                self.format
            )));
        }
        let (out_w, out_h) = output_size;
        if out_w == 0 || out_h == 0 {
            return Err(ImageError::InvalidArgument(format!(
                "invalid target size {}x{}",
                out_w, out_h
            )));
        }
        let mut output = PixelBuffer::new(out_w, out_h, self.format)?;
        if self.width == 0 || self.height == 0 {
            return Ok(output);
        }
        let whole = Window {
            left: 0.0,
            top: 0.0,
            width: self.width as f32,
            height: self.height as f32,
        };
        self.resample_into(&mut output, whole, Border::Replicate)?;
        Ok(output)
    }

    /// Resize into `dst`, which must be freshly created with
    /// [`PixelBuffer::empty`] (or released).
    pub fn resize_into(
        &self,
        dst: &mut PixelBuffer<'static>,
        output_size: (usize, usize),
    ) -> Result<(), ImageError> {
        if !dst.is_empty() {
            return Err(ImageError::InvalidArgument(
                "destination image is not empty".to_string(),
            ));
        }
        *dst = self.resize(output_size)?;
        Ok(())
    }

    fn resample_into(
        &self,
        output: &mut PixelBuffer<'static>,
        luma: Window,
        border: Border,
    ) -> Result<(), ImageError> {
        let n_channels = self.format.num_channels();
        let mut jobs = Vec::with_capacity(n_channels);
        for c in 0..n_channels {
            let src = self.channel(c)?.layout();
            let dst = output.channel(c)?.layout();
            let window = if c > 0 && self.format.is_chroma_subsampled() {
                luma.halved()
            } else {
                luma
            };
            jobs.push((src, dst, window));
        }
        let dst_data = output.data.to_mut();
        for (src, dst, window) in jobs {
            resample_channel(&self.data, &src, window, dst_data, &dst, border);
        }
        Ok(())
    }

    /* -------------------------------------------------------------------------
     * Color conversion
     * ------------------------------------------------------------------------- */
    /// Convert to packed RGB24. YUV input uses BT.601 video-range
    /// coefficients.
    pub fn to_rgb24(&self) -> Result<PixelBuffer<'static>, ImageError> {
        let mut output = PixelBuffer::new(self.width, self.height, PixelFormat::Rgb24)?;
        let out_stride = output.stride;
        let out = output.data.to_mut();
        match self.format {
            PixelFormat::Unknown => {
                return Err(ImageError::InvalidArgument(
                    "cannot convert an unknown format".to_string(),
                ));
            }
            PixelFormat::Gray => {
                let g = self.channel(0)?;
                for y in 0..self.height {
                    for x in 0..self.width {
                        let v = g.get(x, y);
                        let o = y * out_stride + x * 3;
                        out[o..o + 3].copy_from_slice(&[v, v, v]);
                    }
                }
            }
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Bgra32 => {
                let (r, g, b) = (self.channel(0)?, self.channel(1)?, self.channel(2)?);
                for y in 0..self.height {
                    for x in 0..self.width {
                        let o = y * out_stride + x * 3;
                        out[o] = r.get(x, y);
                        out[o + 1] = g.get(x, y);
                        out[o + 2] = b.get(x, y);
                    }
                }
            }
            PixelFormat::Nv12 | PixelFormat::I420 | PixelFormat::Yuv444 => {
                let (yp, up, vp) = (self.channel(0)?, self.channel(1)?, self.channel(2)?);
                let shift = if self.format.is_chroma_subsampled() { 1 } else { 0 };
                for y in 0..self.height {
                    for x in 0..self.width {
                        let (cx, cy) = (x >> shift, y >> shift);
                        let rgb = yuv_to_rgb(yp.get(x, y), up.get(cx, cy), vp.get(cx, cy));
                        let o = y * out_stride + x * 3;
                        out[o..o + 3].copy_from_slice(&rgb);
                    }
                }
            }
        }
        Ok(output)
    }
}

#[inline(always)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |val: i32| (val >> 8).clamp(0, 255) as u8;
    [
        clip(298 * c + 409 * e + 128),
        clip(298 * c - 100 * d - 208 * e + 128),
        clip(298 * c + 516 * d + 128),
    ]
}

/* -----------------------------------------------------------------------------
 * Bilinear resampling (Q10 fixed point)
 * ----------------------------------------------------------------------------- */
const FRAC_BITS: i64 = 10;
const FRAC_ONE: i64 = 1 << FRAC_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Border {
    /// Samples outside the channel read as 0.
    Zero,
    /// Samples outside the channel read the nearest edge sample.
    Replicate,
}

/// Source window in channel coordinates. `left`/`top` may be negative.
#[derive(Debug, Clone, Copy)]
struct Window {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
}

impl Window {
    fn halved(self) -> Self {
        Self {
            left: self.left / 2.0,
            top: self.top / 2.0,
            width: (self.width / 2.0).max(1.0),
            height: (self.height / 2.0).max(1.0),
        }
    }
}

#[inline(always)]
fn fetch(
    src: &[u8],
    layout: &ChannelLayout,
    x: i64,
    y: i64,
    border: Border,
) -> i64 {
    let (w, h) = (layout.width as i64, layout.height as i64);
    match border {
        Border::Zero => {
            if x < 0 || y < 0 || x >= w || y >= h {
                0
            } else {
                src[layout.index(x as usize, y as usize)] as i64
            }
        }
        Border::Replicate => {
            let x = x.clamp(0, w - 1) as usize;
            let y = y.clamp(0, h - 1) as usize;
            src[layout.index(x, y)] as i64
        }
    }
}

/// Map destination index `i` of `n` samples onto `[start, start + len)` using
/// pixel-centre alignment, clamped to the window. Returns a Q10 coordinate.
#[inline(always)]
fn map_coord(i: usize, n: usize, start: f32, len: f32) -> i64 {
    let s = start + (i as f32 + 0.5) * len / n as f32 - 0.5;
    let hi = (start + len - 1.0).max(start);
    (s.clamp(start, hi) * FRAC_ONE as f32).round() as i64
}

fn resample_channel(
    src: &[u8],
    src_layout: &ChannelLayout,
    window: Window,
    dst: &mut [u8],
    dst_layout: &ChannelLayout,
    border: Border,
) {
    if src_layout.width == 0 || src_layout.height == 0 {
        return;
    }
    for dy in 0..dst_layout.height {
        let sy = map_coord(dy, dst_layout.height, window.top, window.height);
        let y0 = sy.div_euclid(FRAC_ONE);
        let fy = sy.rem_euclid(FRAC_ONE);
        for dx in 0..dst_layout.width {
            let sx = map_coord(dx, dst_layout.width, window.left, window.width);
            let x0 = sx.div_euclid(FRAC_ONE);
            let fx = sx.rem_euclid(FRAC_ONE);

            let p00 = fetch(src, src_layout, x0, y0, border);
            let p01 = fetch(src, src_layout, x0 + 1, y0, border);
            let p10 = fetch(src, src_layout, x0, y0 + 1, border);
            let p11 = fetch(src, src_layout, x0 + 1, y0 + 1, border);

            let acc = p00 * (FRAC_ONE - fx) * (FRAC_ONE - fy)
                + p01 * fx * (FRAC_ONE - fy)
                + p10 * (FRAC_ONE - fx) * fy
                + p11 * fx * fy;
            let value = (acc + (1 << (2 * FRAC_BITS - 1))) >> (2 * FRAC_BITS);
            dst[dst_layout.index(dx, dy)] = value.clamp(0, 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_nv12(width: usize, height: usize, yuv: [u8; 3]) -> PixelBuffer<'static> {
        let mut img = PixelBuffer::new(width, height, PixelFormat::Nv12).unwrap();
        for (c, v) in yuv.iter().enumerate() {
            img.fill_channel(c, *v).unwrap();
        }
        img
    }

    fn assert_channel_near(img: &PixelBuffer, c: usize, expected: u8, tol: i32) {
        let ch = img.channel(c).unwrap();
        for y in 0..ch.height() {
            for x in 0..ch.width() {
                let v = ch.get(x, y) as i32;
                assert!(
                    (v - expected as i32).abs() <= tol,
                    "channel {} at ({}, {}) = {}, expected {}",
                    c,
                    x,
                    y,
                    v,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_new_allocates_zeroed_owned_memory() {
        let img = PixelBuffer::new(5, 3, PixelFormat::Nv12).unwrap();
        assert!(!img.is_reference());
        assert_eq!(img.stride(), 6);
        assert_eq!(img.as_bytes().len(), 6 * 3 + 6 * 2);
        assert!(img.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_slice_is_reference() {
        let data = vec![7u8; 4 * 4 * 3];
        let img = PixelBuffer::from_slice(&data, 4, 4, 12, PixelFormat::Bgr24).unwrap();
        assert!(img.is_reference());
        assert_eq!(img.channel(0).unwrap().get(3, 3), 7);
    }

    #[test]
    fn test_from_slice_rejects_short_data() {
        let data = vec![0u8; 10];
        let res = PixelBuffer::from_slice(&data, 4, 4, 4, PixelFormat::Nv12);
        assert!(matches!(res, Err(ImageError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_slice_rejects_odd_yuv_stride() {
        let data = vec![0u8; 100];
        let res = PixelBuffer::from_slice(&data, 3, 4, 3, PixelFormat::I420);
        assert!(matches!(res, Err(ImageError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_slice_accepts_tight_odd_gray_stride() {
        let data = (0u8..15).collect::<Vec<_>>();
        let img = PixelBuffer::from_slice(&data, 5, 3, 5, PixelFormat::Gray).unwrap();
        assert_eq!(img.channel(0).unwrap().get(4, 2), 14);
        assert_eq!(img.channel(0).unwrap().get(0, 1), 5);
    }

    #[test]
    fn test_bgr_channels_are_logical_rgb() {
        let data = vec![1u8, 2, 3, 4];
        let img = PixelBuffer::from_slice(&data, 1, 1, 4, PixelFormat::Bgra32).unwrap();
        assert_eq!(img.channel(0).unwrap().get(0, 0), 3);
        assert_eq!(img.channel(1).unwrap().get(0, 0), 2);
        assert_eq!(img.channel(2).unwrap().get(0, 0), 1);
        assert_eq!(img.channel(3).unwrap().get(0, 0), 4);
        assert!(img.channel(4).is_err());
    }

    #[test]
    fn test_nv12_crop_and_resize_solid_color() {
        let img = solid_nv12(320, 240, [120, 90, 200]);
        let crops = [
            ((160.0, 120.0), (50.0, 80.0)),
            ((25.0, 25.0), (50.0, 50.0)),
            ((300.0, 200.0), (31.0, 61.0)),
            ((100.5, 77.3), (7.0, 3.0)),
        ];
        for (center, size) in crops {
            let out = img
                .crop_and_resize(center, size, (64, 64), ChromaMode::Subsampled)
                .unwrap();
            assert_eq!(out.format(), PixelFormat::Nv12);
            assert_eq!(out.stride() % 2, 0);
            assert_channel_near(&out, 0, 120, 1);
            assert_channel_near(&out, 1, 90, 1);
            assert_channel_near(&out, 2, 200, 1);
        }
    }

    #[test]
    fn test_nv12_crop_upsampled_is_yuv444() {
        let img = solid_nv12(64, 48, [60, 100, 140]);
        let out = img
            .crop_and_resize((32.0, 24.0), (20.0, 20.0), (17, 9), ChromaMode::Upsampled)
            .unwrap();
        assert_eq!(out.format(), PixelFormat::Yuv444);
        assert_eq!(out.stride(), 18);
        assert_eq!(out.channel(1).unwrap().width(), 17);
        assert_channel_near(&out, 1, 100, 1);
        assert_channel_near(&out, 2, 140, 1);
    }

    #[test]
    fn test_i420_crop_keeps_planes_independent() {
        let mut img = PixelBuffer::new(40, 30, PixelFormat::I420).unwrap();
        img.fill_channel(0, 10).unwrap();
        img.fill_channel(1, 20).unwrap();
        img.fill_channel(2, 30).unwrap();
        let out = img
            .crop_and_resize((20.0, 15.0), (16.0, 16.0), (8, 8), ChromaMode::Subsampled)
            .unwrap();
        assert_eq!(out.format(), PixelFormat::I420);
        assert_channel_near(&out, 0, 10, 0);
        assert_channel_near(&out, 1, 20, 0);
        assert_channel_near(&out, 2, 30, 0);
    }

    #[test]
    fn test_packed_crop_zero_pads_outside_region() {
        let mut img = PixelBuffer::new(10, 10, PixelFormat::Bgr24).unwrap();
        for c in 0..3 {
            img.fill_channel(c, 200).unwrap();
        }
        // window spans x in [-10, 10): left half outside the image
        let out = img
            .crop_and_resize((0.0, 5.0), (20.0, 10.0), (20, 10), ChromaMode::Subsampled)
            .unwrap();
        let r = out.channel(0).unwrap();
        assert_eq!(r.get(0, 5), 0);
        assert_eq!(r.get(5, 5), 0);
        assert_eq!(r.get(15, 5), 200);
    }

    #[test]
    fn test_packed_crop_entirely_outside_fails() {
        let img = PixelBuffer::new(10, 10, PixelFormat::Rgb24).unwrap();
        let res = img.crop_and_resize((100.0, 100.0), (4.0, 4.0), (8, 8), ChromaMode::Subsampled);
        assert!(matches!(res, Err(ImageError::OutOfBounds(_))));
    }

    #[test]
    fn test_yuv_crop_entirely_outside_is_zeroed() {
        let img = solid_nv12(16, 16, [100, 100, 100]);
        let out = img
            .crop_and_resize((-50.0, -50.0), (4.0, 4.0), (8, 8), ChromaMode::Subsampled)
            .unwrap();
        assert!(out.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_crop_rejects_unknown_format_and_zero_size() {
        let empty = PixelBuffer::empty();
        let res = empty.crop_and_resize((0.0, 0.0), (1.0, 1.0), (4, 4), ChromaMode::Subsampled);
        assert!(matches!(res, Err(ImageError::InvalidArgument(_))));

        let img = PixelBuffer::new(8, 8, PixelFormat::Gray).unwrap();
        let res = img.crop_and_resize((4.0, 4.0), (2.0, 2.0), (0, 4), ChromaMode::Subsampled);
        assert!(matches!(res, Err(ImageError::InvalidArgument(_))));
    }

    #[test]
    fn test_resize_gradient_stays_monotonic() {
        let mut data = vec![0u8; 8 * 1];
        for (x, v) in data.iter_mut().enumerate() {
            *v = (x * 30) as u8;
        }
        let img = PixelBuffer::from_slice(&data, 8, 1, 8, PixelFormat::Gray).unwrap();
        let out = img.resize((16, 1)).unwrap();
        let ch = out.channel(0).unwrap();
        for x in 1..16 {
            assert!(ch.get(x, 0) >= ch.get(x - 1, 0));
        }
        assert_eq!(ch.get(0, 0), 0);
        assert_eq!(ch.get(15, 0), 210);
    }

    #[test]
    fn test_resize_into_requires_empty_destination() {
        let img = PixelBuffer::new(4, 4, PixelFormat::Rgb24).unwrap();
        let mut dst = PixelBuffer::new(2, 2, PixelFormat::Rgb24).unwrap();
        assert!(matches!(
            img.resize_into(&mut dst, (2, 2)),
            Err(ImageError::InvalidArgument(_))
        ));

        let mut fresh = PixelBuffer::empty();
        img.resize_into(&mut fresh, (3, 5)).unwrap();
        assert_eq!(fresh.format(), PixelFormat::Rgb24);
        assert_eq!((fresh.width(), fresh.height()), (3, 5));

        fresh.release();
        assert!(fresh.is_empty());
        assert_eq!(fresh.format(), PixelFormat::Unknown);
        img.resize_into(&mut fresh, (2, 2)).unwrap();
    }

    #[test]
    fn test_resize_rejects_yuv() {
        let img = solid_nv12(8, 8, [0, 0, 0]);
        assert!(matches!(
            img.resize((4, 4)),
            Err(ImageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_to_rgb24_from_nv12_gray_level() {
        // Y=126, U=V=128 is mid gray in video range
        let img = solid_nv12(4, 4, [126, 128, 128]);
        let rgb = img.to_rgb24().unwrap();
        for c in 0..3 {
            assert_channel_near(&rgb, c, 128, 1);
        }
    }

    #[test]
    fn test_fill_region_nv12_chroma_halved() {
        let mut img = solid_nv12(16, 16, [0, 128, 128]);
        img.fill_region(&Rect::new(8.0, 8.0, 8.0, 8.0), &[200, 50, 60])
            .unwrap();
        assert_eq!(img.channel(0).unwrap().get(8, 8), 200);
        assert_eq!(img.channel(0).unwrap().get(7, 7), 0);
        assert_eq!(img.channel(1).unwrap().get(4, 4), 50);
        assert_eq!(img.channel(2).unwrap().get(3, 3), 128);
    }
}
