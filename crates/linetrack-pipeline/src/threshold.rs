//! Fixed-level thresholding.
//!
//! Applied to every channel independently, so the output keeps the
//! input's channel layout. For 8-bit data the cutoff is floored and the
//! output level is rounded and saturated, and the comparison is strict
//! (`value > thresh`).
//!
//! Gray frames thresholded to the full 8-bit level go through
//! [`imageproc::contrast::threshold`]; other output levels and color
//! frames use a per-mode lookup table.

use imageproc::contrast::ThresholdType;
use serde::{Deserialize, Serialize};

use crate::resize::saturate_u8;
use crate::types::{Frame, PipelineError};

/// Thresholding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// `max_val` above the cutoff, 0 otherwise.
    #[default]
    Binary,
    /// 0 above the cutoff, `max_val` otherwise.
    BinaryInv,
    /// Cutoff above the cutoff, unchanged otherwise.
    Trunc,
    /// Unchanged above the cutoff, 0 otherwise.
    ToZero,
    /// 0 above the cutoff, unchanged otherwise.
    ToZeroInv,
}

impl ThresholdMode {
    /// The [`imageproc`] rule with the same effect at `max_val == 255`.
    ///
    /// `imageproc` names its to-zero rules after the side that is zeroed.
    const fn imageproc_rule(self) -> ThresholdType {
        match self {
            Self::Binary => ThresholdType::Binary,
            Self::BinaryInv => ThresholdType::BinaryInverted,
            Self::Trunc => ThresholdType::Truncate,
            Self::ToZero => ThresholdType::ToZeroInverted,
            Self::ToZeroInv => ThresholdType::ToZero,
        }
    }

    /// Build the 256-entry lookup table for this rule.
    fn table(self, thresh: i32, max_val: u8) -> [u8; 256] {
        let cut = saturate_u8(f64::from(thresh));
        std::array::from_fn(|i| {
            #[allow(clippy::cast_possible_truncation)]
            let v = i as u8;
            let above = i32::from(v) > thresh;
            match (self, above) {
                (Self::Binary, true) | (Self::BinaryInv, false) => max_val,
                (Self::Binary | Self::ToZero, false) | (Self::BinaryInv | Self::ToZeroInv, true) => 0,
                (Self::Trunc, true) => cut,
                (Self::Trunc | Self::ToZeroInv, false) | (Self::ToZero, true) => v,
            }
        })
    }
}

/// Apply a fixed-level threshold to each channel of a frame.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `thresh` or `max_val`
/// is not finite, or if the frame is empty.
pub fn threshold(
    src: &Frame,
    thresh: f64,
    max_val: f64,
    mode: ThresholdMode,
) -> Result<Frame, PipelineError> {
    src.validate()?;
    if !thresh.is_finite() || !max_val.is_finite() {
        return Err(PipelineError::InvalidArgument(format!(
            "threshold values must be finite, got thresh={thresh} max_val={max_val}"
        )));
    }
    // Floor onto the 8-bit grid; anything outside [-1, 255] behaves like
    // the nearest end of that range.
    #[allow(clippy::cast_possible_truncation)]
    let cutoff = thresh.floor().clamp(-1.0, 255.0) as i32;
    let level = saturate_u8(max_val);
    if let (Frame::Gray(img), u8::MAX, Ok(cut)) = (src, level, u8::try_from(cutoff)) {
        return Ok(Frame::Gray(imageproc::contrast::threshold(
            img,
            cut,
            mode.imageproc_rule(),
        )));
    }
    let table = mode.table(cutoff, level);
    let bytes = src.as_bytes().iter().map(|&v| table[usize::from(v)]).collect();
    src.with_layout(src.dimensions(), bytes)
}
