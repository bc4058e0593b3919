//! Color to grayscale conversion.
//!
//! Camera frames arrive in B-G-R(-A) order. The standard luminance
//! weights are applied in 14-bit fixed point:
//! `Y = 0.114*B + 0.587*G + 0.299*R`, rounded to nearest.

use crate::types::{BgrImage, BgraImage, Frame, GrayImage};

/// Fixed-point weights (scaled by `1 << 14`) for B, G, R.
const WEIGHT_B: u32 = 1868;
const WEIGHT_G: u32 = 9617;
const WEIGHT_R: u32 = 4899;
const SHIFT: u32 = 14;
const _: () = assert!(WEIGHT_B + WEIGHT_G + WEIGHT_R == 1 << SHIFT);

/// Luminance of a single B-G-R pixel.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn luminance(b: u8, g: u8, r: u8) -> u8 {
    let sum = b as u32 * WEIGHT_B + g as u32 * WEIGHT_G + r as u32 * WEIGHT_R;
    ((sum + (1 << (SHIFT - 1))) >> SHIFT) as u8
}

/// Convert a frame to a single-channel luminance image.
///
/// A gray frame is copied unchanged into a fresh buffer; B-G-R and
/// B-G-R-A frames are converted with [`luminance`], ignoring alpha.
/// Output dimensions always match the input.
#[must_use = "returns the grayscale image"]
pub fn desaturate(src: &Frame) -> GrayImage {
    match src {
        Frame::Gray(img) => img.clone(),
        Frame::Bgr(img) => bgr_to_gray(img),
        Frame::Bgra(img) => bgra_to_gray(img),
    }
}

fn bgr_to_gray(img: &BgrImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [b, g, r] = img.get_pixel(x, y).0;
        image::Luma([luminance(b, g, r)])
    })
}

fn bgra_to_gray(img: &BgraImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [b, g, r, _a] = img.get_pixel(x, y).0;
        image::Luma([luminance(b, g, r)])
    })
}
