//! Morphological erosion.
//!
//! Every output pixel is the per-channel minimum of the input pixels
//! covered by a [`StructuringElement`] placed at its anchor. Bright
//! regions shrink and dark regions grow; on the thresholded frame this
//! strips isolated specks and thin glare streaks before line detection.
//!
//! Wraps [`imageproc::morphology::grayscale_erode`], which only accepts
//! `GrayImage` and ignores pixels outside the frame. Color frames are
//! split into planes, eroded and reassembled. Borders other than the
//! neutral one are handled by padding each plane before the pass and
//! cropping afterwards.

use image::{ImageBuffer, Luma, Pixel};
use imageproc::morphology::{Mask, grayscale_erode};
use serde::{Deserialize, Serialize};

use crate::types::{Frame, GrayImage, PipelineError};

/// Shape of the erosion neighborhood.
///
/// A `width x height` grid of on/off cells in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl StructuringElement {
    /// Largest supported side, so every anchor fits the `u8` center of
    /// an [`imageproc`] mask.
    pub const MAX_SIDE: u32 = 255;

    /// Build an element from explicit cells.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a side is zero or
    /// above [`Self::MAX_SIDE`], if `cells.len() != width * height`, or
    /// if no cell is set.
    pub fn from_cells(width: u32, height: u32, cells: Vec<bool>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidArgument(format!(
                "structuring element must be non-empty, got {width}x{height}"
            )));
        }
        if width > Self::MAX_SIDE || height > Self::MAX_SIDE {
            return Err(PipelineError::InvalidArgument(format!(
                "structuring element {width}x{height} exceeds {} cells per side",
                Self::MAX_SIDE
            )));
        }
        if cells.len() != width as usize * height as usize {
            return Err(PipelineError::InvalidArgument(format!(
                "structuring element {width}x{height} needs {} cells, got {}",
                width as usize * height as usize,
                cells.len()
            )));
        }
        if !cells.contains(&true) {
            return Err(PipelineError::InvalidArgument(
                "structuring element has no active cells".to_owned(),
            ));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Filled `width x height` rectangle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a side is zero.
    pub fn rect(width: u32, height: u32) -> Result<Self, PipelineError> {
        Self::from_cells(width, height, vec![true; width as usize * height as usize])
    }

    /// Filled `size x size` square.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if `size` is zero.
    pub fn square(size: u32) -> Result<Self, PipelineError> {
        Self::rect(size, size)
    }

    /// Plus-shaped element: the center row and center column of a
    /// `size x size` grid.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if `size` is zero.
    pub fn cross(size: u32) -> Result<Self, PipelineError> {
        let mid = size / 2;
        let cells = (0..size)
            .flat_map(|y| (0..size).map(move |x| x == mid || y == mid))
            .collect();
        Self::from_cells(size, size, cells)
    }

    /// Element width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Element height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Center cell, used when no anchor is given.
    #[must_use]
    pub const fn center(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }

    /// The element as an [`imageproc`] mask centered on `anchor`.
    fn mask(&self, anchor: (u32, u32)) -> Result<Mask, PipelineError> {
        let center = |v: u32| {
            u8::try_from(v).map_err(|_| {
                PipelineError::InvalidArgument(format!("anchor coordinate {v} is out of range"))
            })
        };
        let (cx, cy) = (center(anchor.0)?, center(anchor.1)?);
        let image = GrayImage::from_fn(self.width, self.height, |x, y| {
            let on = self.cells[(y * self.width + x) as usize];
            Luma([if on { u8::MAX } else { 0 }])
        });
        Ok(Mask::from_image(&image, cx, cy))
    }
}

impl Default for StructuringElement {
    /// The 3x3 all-ones element.
    fn default() -> Self {
        Self {
            width: 3,
            height: 3,
            cells: vec![true; 9],
        }
    }
}

/// How pixels outside the frame are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BorderMode {
    /// Outside pixels take a fixed value (see [`ErodeParams::border_value`]).
    #[default]
    Constant,
    /// Outside pixels repeat the nearest edge pixel.
    Replicate,
}

/// Parameters of an erosion.
///
/// `None` fields fall back to the defaults: 3x3 all-ones element,
/// anchor at the element center, and for a constant border a value of
/// 255, which never erodes anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErodeParams {
    /// Neighborhood shape.
    pub kernel: Option<StructuringElement>,
    /// Cell of the element aligned with the output pixel.
    pub anchor: Option<(u32, u32)>,
    /// Number of passes, at least 1.
    pub iterations: u32,
    /// Outside-pixel rule.
    pub border: BorderMode,
    /// Value used by [`BorderMode::Constant`]; `None` means no override.
    pub border_value: Option<u8>,
}

impl Default for ErodeParams {
    fn default() -> Self {
        Self {
            kernel: None,
            anchor: None,
            iterations: 1,
            border: BorderMode::Constant,
            border_value: None,
        }
    }
}

/// Erode a frame.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `iterations` is zero,
/// the anchor lies outside the element, or the frame is empty.
pub fn erode(src: &Frame, params: &ErodeParams) -> Result<Frame, PipelineError> {
    src.validate()?;
    if params.iterations == 0 {
        return Err(PipelineError::InvalidArgument(
            "erosion needs at least one iteration".to_owned(),
        ));
    }
    let default_kernel = StructuringElement::default();
    let kernel = params.kernel.as_ref().unwrap_or(&default_kernel);
    let anchor = params.anchor.unwrap_or_else(|| kernel.center());
    if anchor.0 >= kernel.width() || anchor.1 >= kernel.height() {
        return Err(PipelineError::InvalidArgument(format!(
            "anchor ({}, {}) lies outside the {}x{} structuring element",
            anchor.0,
            anchor.1,
            kernel.width(),
            kernel.height()
        )));
    }

    let mask = kernel.mask(anchor)?;
    let fill = match (params.border, params.border_value) {
        (BorderMode::Constant, None | Some(u8::MAX)) => None,
        (BorderMode::Constant, Some(value)) => Some(Fill::Constant(value)),
        (BorderMode::Replicate, _) => Some(Fill::Replicate),
    };
    let pass = ErodePass {
        mask,
        padding: Padding::around(kernel, anchor),
        fill,
        iterations: params.iterations,
    };

    Ok(match src {
        Frame::Gray(img) => Frame::Gray(pass.apply(img)),
        Frame::Bgr(img) => Frame::Bgr(per_channel(img, |plane| pass.apply(plane))),
        Frame::Bgra(img) => Frame::Bgra(per_channel(img, |plane| pass.apply(plane))),
    })
}

/// Value of pixels outside the frame when it differs from the neutral 255.
#[derive(Debug, Clone, Copy)]
enum Fill {
    Constant(u8),
    Replicate,
}

/// Margins the element can reach past each edge of the frame.
#[derive(Debug, Clone, Copy)]
struct Padding {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl Padding {
    const fn around(kernel: &StructuringElement, anchor: (u32, u32)) -> Self {
        Self {
            left: anchor.0,
            top: anchor.1,
            right: kernel.width() - 1 - anchor.0,
            bottom: kernel.height() - 1 - anchor.1,
        }
    }

    /// Grow `plane` by the margins, filling them according to `fill`.
    fn extend(self, plane: &GrayImage, fill: Fill) -> GrayImage {
        let (w, h) = plane.dimensions();
        GrayImage::from_fn(w + self.left + self.right, h + self.top + self.bottom, |x, y| {
            let inside_x = x.checked_sub(self.left).filter(|&sx| sx < w);
            let inside_y = y.checked_sub(self.top).filter(|&sy| sy < h);
            match (inside_x, inside_y, fill) {
                (Some(sx), Some(sy), _) => *plane.get_pixel(sx, sy),
                (_, _, Fill::Constant(value)) => Luma([value]),
                (_, _, Fill::Replicate) => {
                    let sx = x.saturating_sub(self.left).min(w - 1);
                    let sy = y.saturating_sub(self.top).min(h - 1);
                    *plane.get_pixel(sx, sy)
                }
            }
        })
    }

    /// Cut the original `width x height` area back out of a padded plane.
    fn crop(self, padded: &GrayImage, width: u32, height: u32) -> GrayImage {
        image::imageops::crop_imm(padded, self.left, self.top, width, height).to_image()
    }
}

/// A configured erosion, applied to one plane at a time.
struct ErodePass {
    mask: Mask,
    padding: Padding,
    fill: Option<Fill>,
    iterations: u32,
}

impl ErodePass {
    fn apply(&self, plane: &GrayImage) -> GrayImage {
        let (w, h) = plane.dimensions();
        let mut current = plane.clone();
        for _ in 0..self.iterations {
            current = match self.fill {
                None => grayscale_erode(&current, &self.mask),
                Some(fill) => {
                    let padded = self.padding.extend(&current, fill);
                    self.padding.crop(&grayscale_erode(&padded, &self.mask), w, h)
                }
            };
        }
        current
    }
}

/// Run `op` on each channel of an interleaved image and reassemble.
fn per_channel<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    op: impl Fn(&GrayImage) -> GrayImage,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = image.dimensions();
    let planes: Vec<GrayImage> = (0..usize::from(P::CHANNEL_COUNT))
        .map(|c| op(&GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).channels()[c]]))))
        .collect();
    ImageBuffer::from_fn(w, h, |x, y| {
        let mut pixel = *image.get_pixel(x, y);
        for (value, plane) in pixel.channels_mut().iter_mut().zip(&planes) {
            *value = plane.get_pixel(x, y).0[0];
        }
        pixel
    })
}
