//! Frame resizing to the working resolution.
//!
//! The first processing step: camera frames are scaled down (0.25x by
//! default) so the remaining stages run on a small pixel grid. Any
//! channel layout is accepted and preserved.
//!
//! `Nearest`, `Linear`, and `Area` are implemented here with the usual
//! camera-pipeline pixel-center convention
//! (`src = (dst + 0.5) * ratio - 0.5`). `Cubic` and `Lanczos` go through
//! [`image::imageops::resize`].

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Frame, PipelineError};

/// Resampling method used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Nearest source pixel: fastest, blocky.
    Nearest,
    /// Bilinear interpolation between the four nearest source pixels.
    #[default]
    Linear,
    /// Bicubic (Catmull-Rom).
    Cubic,
    /// Pixel-area averaging: each output pixel is the mean of the source
    /// area it covers.
    Area,
    /// Lanczos with 3 lobes.
    Lanczos,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Linear => f.write_str("Linear"),
            Self::Cubic => f.write_str("Cubic"),
            Self::Area => f.write_str("Area"),
            Self::Lanczos => f.write_str("Lanczos"),
        }
    }
}

/// Compute the output size of a resize.
///
/// A `target` with both sides non-zero wins; otherwise the size is
/// `round(width * scale_x) x round(height * scale_y)`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if no usable target is
/// given and a scale is not positive and finite, or if the computed
/// size has a zero side.
pub fn output_dimensions(
    src: Dimensions,
    target: Option<Dimensions>,
    scale_x: f64,
    scale_y: f64,
) -> Result<Dimensions, PipelineError> {
    if let Some(target) = target.filter(|t| !t.is_empty()) {
        return Ok(target);
    }
    let scaled = |len: u32, scale: f64, axis: &str| -> Result<u32, PipelineError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "resize needs a target size or a positive {axis} scale, got {scale}"
            )));
        }
        let out = (f64::from(len) * scale).round();
        if out < 1.0 || out > f64::from(u32::MAX) {
            return Err(PipelineError::InvalidArgument(format!(
                "resizing {len} px by {scale} along {axis} gives an unusable size"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(out as u32)
    };
    Ok(Dimensions::new(
        scaled(src.width, scale_x, "x")?,
        scaled(src.height, scale_y, "y")?,
    ))
}

/// Resize a frame.
///
/// When `target` is `None` (or has a zero side) the output size is
/// derived from the scale factors, which also define the sampling
/// ratio; otherwise the ratio is `src / target` on each axis.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if the input frame is
/// empty or the output size cannot be determined (see
/// [`output_dimensions`]).
pub fn resize(
    src: &Frame,
    target: Option<Dimensions>,
    scale_x: f64,
    scale_y: f64,
    interpolation: Interpolation,
) -> Result<Frame, PipelineError> {
    src.validate()?;
    let src_dims = src.dimensions();
    let dst_dims = output_dimensions(src_dims, target, scale_x, scale_y)?;

    let explicit_target = target.is_some_and(|t| !t.is_empty());
    let ratio = |src_len: u32, dst_len: u32, scale: f64| {
        if explicit_target {
            f64::from(src_len) / f64::from(dst_len)
        } else {
            1.0 / scale
        }
    };
    let ratio_x = ratio(src_dims.width, dst_dims.width, scale_x);
    let ratio_y = ratio(src_dims.height, dst_dims.height, scale_y);

    let (xs, ys) = match interpolation {
        Interpolation::Nearest => (
            nearest_taps(dst_dims.width, src_dims.width, ratio_x),
            nearest_taps(dst_dims.height, src_dims.height, ratio_y),
        ),
        Interpolation::Linear => (
            linear_taps(dst_dims.width, src_dims.width, ratio_x),
            linear_taps(dst_dims.height, src_dims.height, ratio_y),
        ),
        Interpolation::Area => (
            area_taps(dst_dims.width, src_dims.width, ratio_x),
            area_taps(dst_dims.height, src_dims.height, ratio_y),
        ),
        Interpolation::Cubic => {
            return Ok(filtered_resize(src, dst_dims, FilterType::CatmullRom));
        }
        Interpolation::Lanczos => {
            return Ok(filtered_resize(src, dst_dims, FilterType::Lanczos3));
        }
    };
    let raster = Raster {
        bytes: src.as_bytes(),
        width: src_dims.width as usize,
        channels: usize::from(src.channels()),
    };
    src.with_layout(dst_dims, raster.gather(&xs, &ys))
}

/// Resize through [`image::imageops::resize`] with a convolution kernel.
fn filtered_resize(src: &Frame, dst: Dimensions, filter: FilterType) -> Frame {
    let (w, h) = (dst.width, dst.height);
    match src {
        Frame::Gray(img) => Frame::Gray(image::imageops::resize(img, w, h, filter)),
        Frame::Bgr(img) => Frame::Bgr(image::imageops::resize(img, w, h, filter)),
        Frame::Bgra(img) => Frame::Bgra(image::imageops::resize(img, w, h, filter)),
    }
}

/// Weighted source indices contributing to one output coordinate.
type Taps = Vec<(usize, f64)>;

/// Borrowed view of interleaved source bytes.
struct Raster<'a> {
    bytes: &'a [u8],
    width: usize,
    channels: usize,
}

impl Raster<'_> {
    /// Separable weighted gather: every output pixel is
    /// `sum(wy * wx * src[y][x])` over its row and column taps.
    fn gather(&self, xs: &[Taps], ys: &[Taps]) -> Vec<u8> {
        let mut out = Vec::with_capacity(xs.len() * ys.len() * self.channels);
        let mut acc = vec![0.0_f64; self.channels];
        for row_taps in ys {
            for col_taps in xs {
                acc.iter_mut().for_each(|a| *a = 0.0);
                for &(sy, wy) in row_taps {
                    let row = sy * self.width;
                    for &(sx, wx) in col_taps {
                        let base = (row + sx) * self.channels;
                        let w = wy * wx;
                        for (c, a) in acc.iter_mut().enumerate() {
                            *a += w * f64::from(self.bytes[base + c]);
                        }
                    }
                }
                out.extend(acc.iter().map(|&v| saturate_u8(v)));
            }
        }
        out
    }
}

/// Round and clamp to the 8-bit range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn saturate_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn nearest_taps(dst_len: u32, src_len: u32, ratio: f64) -> Vec<Taps> {
    let last = src_len as usize - 1;
    (0..dst_len)
        .map(|d| {
            let s = (f64::from(d) * ratio).floor().max(0.0) as usize;
            vec![(s.min(last), 1.0)]
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn linear_taps(dst_len: u32, src_len: u32, ratio: f64) -> Vec<Taps> {
    let last = src_len as usize - 1;
    (0..dst_len)
        .map(|d| {
            let s = (f64::from(d) + 0.5).mul_add(ratio, -0.5);
            if s <= 0.0 {
                return vec![(0, 1.0)];
            }
            let i0 = s.floor() as usize;
            if i0 >= last {
                return vec![(last, 1.0)];
            }
            let frac = s - s.floor();
            vec![(i0, 1.0 - frac), (i0 + 1, frac)]
        })
        .collect()
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn area_taps(dst_len: u32, src_len: u32, ratio: f64) -> Vec<Taps> {
    let src_end = f64::from(src_len);
    (0..dst_len)
        .map(|d| {
            let start = (f64::from(d) * ratio).min(src_end);
            let end = ((f64::from(d) + 1.0) * ratio).min(src_end);
            let mut taps = Taps::new();
            let mut i = start.floor() as usize;
            while (i as f64) < end {
                let lo = (i as f64).max(start);
                let hi = ((i + 1) as f64).min(end);
                if hi > lo {
                    taps.push((i, hi - lo));
                }
                i += 1;
            }
            let total: f64 = taps.iter().map(|&(_, w)| w).sum();
            if total > 0.0 {
                taps.iter_mut().for_each(|(_, w)| *w /= total);
                taps
            } else {
                vec![((start as usize).min(src_len as usize - 1), 1.0)]
            }
        })
        .collect()
}
