//! Shared types for the linetrack frame processing pipeline.

use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use serde::{Deserialize, Serialize};

use crate::detect::DetectorOptions;
use crate::erode::BorderMode;
use crate::filter::AngleRange;
use crate::resize::Interpolation;
use crate::threshold::ThresholdMode;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Three-channel 8-bit image in **B, G, R** byte order.
///
/// `Rgb<u8>` is used purely as a 3-byte pixel container: channel 0 is
/// blue and channel 2 is red, matching what camera drivers hand out.
pub type BgrImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Four-channel 8-bit image in **B, G, R, A** byte order.
pub type BgraImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An 8-bit camera frame with 1, 3, or 4 channels.
///
/// Every pipeline stage takes a `&Frame` and returns a new one; inputs
/// are never modified in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Single-channel luminance.
    Gray(GrayImage),
    /// Color, B-G-R byte order.
    Bgr(BgrImage),
    /// Color plus alpha, B-G-R-A byte order.
    Bgra(BgraImage),
}

impl Frame {
    /// Build a frame from an interleaved 8-bit buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if `channels` is not
    /// 1, 3, or 4, if either dimension is zero, or if `bytes` does not
    /// hold exactly `width * height * channels` values.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        bytes: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        let expected = u64::from(width) * u64::from(height) * u64::from(channels);
        if Dimensions::new(width, height).is_empty() {
            return Err(PipelineError::InvalidArgument(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if bytes.len() as u64 != expected && matches!(channels, 1 | 3 | 4) {
            return Err(PipelineError::InvalidArgument(format!(
                "expected {expected} bytes for a {width}x{height}x{channels} frame, got {}",
                bytes.len()
            )));
        }
        let frame = match channels {
            1 => GrayImage::from_raw(width, height, bytes).map(Self::Gray),
            3 => BgrImage::from_raw(width, height, bytes).map(Self::Bgr),
            4 => BgraImage::from_raw(width, height, bytes).map(Self::Bgra),
            other => {
                return Err(PipelineError::InvalidArgument(format!(
                    "frames must have 1, 3, or 4 channels, got {other}"
                )));
            }
        };
        frame.ok_or_else(|| {
            PipelineError::InvalidArgument(format!(
                "buffer does not fit a {width}x{height}x{channels} frame"
            ))
        })
    }

    /// Convert a decoded image file into a frame.
    ///
    /// Decoded color images are in R-G-B order; they are reordered to
    /// B-G-R so the result matches what a camera would deliver. Images
    /// with more than 8 bits per channel are reduced to 8 bits.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] for gray+alpha
    /// (two-channel) images and for empty images.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, PipelineError> {
        let frame = match image.color().channel_count() {
            1 => Self::Gray(image.to_luma8()),
            3 => Self::Bgr(swap_red_blue(image.to_rgb8())),
            4 => Self::Bgra(swap_red_blue(image.to_rgba8())),
            other => {
                return Err(PipelineError::InvalidArgument(format!(
                    "frames must have 1, 3, or 4 channels, got {other}"
                )));
            }
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Convert back into an RGB-ordered [`DynamicImage`] (e.g. for
    /// writing a PNG).
    #[must_use]
    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Self::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
            Self::Bgr(img) => DynamicImage::ImageRgb8(swap_red_blue(img.clone())),
            Self::Bgra(img) => DynamicImage::ImageRgba8(swap_red_blue(img.clone())),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Gray(img) => img.width(),
            Self::Bgr(img) => img.width(),
            Self::Bgra(img) => img.width(),
        }
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Self::Gray(img) => img.height(),
            Self::Bgr(img) => img.height(),
            Self::Bgra(img) => img.height(),
        }
    }

    /// Width and height together.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// Number of interleaved channels (1, 3, or 4).
    #[must_use]
    pub const fn channels(&self) -> u8 {
        match self {
            Self::Gray(_) => 1,
            Self::Bgr(_) => 3,
            Self::Bgra(_) => 4,
        }
    }

    /// The interleaved pixel bytes, row-major.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Gray(img) => img.as_raw(),
            Self::Bgr(img) => img.as_raw(),
            Self::Bgra(img) => img.as_raw(),
        }
    }

    /// Check the non-empty invariant.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if width or height is
    /// zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let dims = self.dimensions();
        if dims.is_empty() {
            return Err(PipelineError::InvalidArgument(format!(
                "frame dimensions must be non-zero, got {}x{}",
                dims.width, dims.height
            )));
        }
        Ok(())
    }

    /// Build a frame with the same channel layout as `self` from new
    /// interleaved bytes.
    pub(crate) fn with_layout(
        &self,
        dims: Dimensions,
        bytes: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        Self::from_raw(dims.width, dims.height, self.channels(), bytes)
    }
}

impl From<GrayImage> for Frame {
    fn from(image: GrayImage) -> Self {
        Self::Gray(image)
    }
}

/// Swap channel 0 and channel 2 of every pixel (RGB <-> BGR).
fn swap_red_blue<P>(mut image: ImageBuffer<P, Vec<u8>>) -> ImageBuffer<P, Vec<u8>>
where
    P: image::Pixel<Subpixel = u8>,
{
    for pixel in image.pixels_mut() {
        pixel.channels_mut().swap(0, 2);
    }
    image
}

/// A straight line segment in image-pixel coordinates.
///
/// Segments have no direction in the physical sense, but the endpoint
/// order is kept so that [`angle`](Self::angle) is well defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    /// First endpoint, horizontal.
    pub x1: f64,
    /// First endpoint, vertical.
    pub y1: f64,
    /// Second endpoint, horizontal.
    pub x2: f64,
    /// Second endpoint, vertical.
    pub y2: f64,
}

impl LineSegment {
    /// Create a segment from its endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if any coordinate is
    /// NaN or infinite.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, PipelineError> {
        if [x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            Ok(Self { x1, y1, x2, y2 })
        } else {
            Err(PipelineError::InvalidArgument(format!(
                "segment coordinates must be finite, got ({x1}, {y1}) -> ({x2}, {y2})"
            )))
        }
    }

    /// Squared Euclidean length.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn length_squared(&self) -> f64 {
        let dx = self.x2 - self.x1;
        let dy = self.y2 - self.y1;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Direction from the first to the second endpoint in degrees,
    /// in `(-180, 180]`, measured from the positive x-axis.
    #[must_use]
    pub fn angle(&self) -> f64 {
        let degrees = (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees();
        // atan2 gives -180 for a negative-zero dy.
        if degrees <= -180.0 {
            degrees + 360.0
        } else {
            degrees
        }
    }

    /// The same segment with its endpoints swapped.
    #[must_use]
    pub const fn reversed(&self) -> Self {
        Self {
            x1: self.x2,
            y1: self.y2,
            x2: self.x1,
            y2: self.y1,
        }
    }

    /// Midpoint of the two endpoints.
    #[must_use]
    pub fn midpoint(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Map pixel-center coordinates from an image resized by
    /// `(scale_x, scale_y)` back to the source image.
    ///
    /// Uses the same center convention as [`crate::resize`]:
    /// `src = (dst + 0.5) / scale - 0.5`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a scale is not a
    /// positive finite number.
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Result<Self, PipelineError> {
        if !(scale_x.is_finite() && scale_x > 0.0 && scale_y.is_finite() && scale_y > 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "scale factors must be positive and finite, got {scale_x} x {scale_y}"
            )));
        }
        let map_x = |v: f64| (v + 0.5) / scale_x - 0.5;
        let map_y = |v: f64| (v + 0.5) / scale_y - 0.5;
        Self::new(
            map_x(self.x1),
            map_y(self.y1),
            map_x(self.x2),
            map_y(self.y2),
        )
    }
}

/// An ordered collection of segments.
///
/// Order is the detector's emission order. It carries no meaning but is
/// preserved by every stage so results are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentSet(Vec<LineSegment>);

impl SegmentSet {
    /// Create a set from a vector of segments.
    #[must_use]
    pub const fn new(segments: Vec<LineSegment>) -> Self {
        Self(segments)
    }

    /// Returns `true` if the set has no segments.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate the segments in order.
    pub fn iter(&self) -> std::slice::Iter<'_, LineSegment> {
        self.0.iter()
    }

    /// Returns a reference to the underlying slice of segments.
    #[must_use]
    pub fn segments(&self) -> &[LineSegment] {
        &self.0
    }

    /// Consumes the set and returns the underlying vector.
    #[must_use]
    pub fn into_segments(self) -> Vec<LineSegment> {
        self.0
    }

    /// Apply [`LineSegment::scaled`] to every segment.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a scale is not a
    /// positive finite number.
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Result<Self, PipelineError> {
        self.0
            .iter()
            .map(|s| s.scaled(scale_x, scale_y))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl FromIterator<LineSegment> for SegmentSet {
    fn from_iter<I: IntoIterator<Item = LineSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SegmentSet {
    type Item = &'a LineSegment;
    type IntoIter = std::slice::Iter<'a, LineSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Configuration for the frame processing pipeline.
///
/// The defaults reproduce the deployed robot configuration. Note that
/// the default [`angle_range`](Self::angle_range) of `[0, 360]` accepts
/// every orientation, so the filter stage only applies the length test
/// unless a narrower range is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Horizontal resize factor applied to incoming frames.
    pub scale_x: f64,

    /// Vertical resize factor applied to incoming frames.
    pub scale_y: f64,

    /// Resampling method for the resize stage.
    pub interpolation: Interpolation,

    /// Threshold cutoff; pixels strictly above it become `threshold_max`.
    pub threshold: f64,

    /// Output level for pixels above the cutoff.
    pub threshold_max: f64,

    /// Thresholding rule.
    pub threshold_mode: ThresholdMode,

    /// Number of 3x3 erosion passes.
    pub erode_iterations: u32,

    /// Border handling for erosion.
    pub erode_border: BorderMode,

    /// Line segment detector tuning.
    pub detector: DetectorOptions,

    /// Minimum segment length, in **resized** pixels.
    pub min_length: f64,

    /// Accepted orientation range in degrees.
    pub angle_range: AngleRange,
}

impl PipelineConfig {
    /// Default resize factor on both axes.
    pub const DEFAULT_SCALE: f64 = 0.25;
    /// Default resize interpolation.
    pub const DEFAULT_INTERPOLATION: Interpolation = Interpolation::Linear;
    /// Default threshold cutoff.
    pub const DEFAULT_THRESHOLD: f64 = 230.0;
    /// Default threshold output level.
    pub const DEFAULT_THRESHOLD_MAX: f64 = 255.0;
    /// Default erosion pass count.
    pub const DEFAULT_ERODE_ITERATIONS: u32 = 1;
    /// Default minimum segment length (resized pixels).
    pub const DEFAULT_MIN_LENGTH: f64 = 20.0;
    /// Default lower orientation bound (degrees).
    pub const DEFAULT_ANGLE_LO: f64 = 0.0;
    /// Default upper orientation bound (degrees).
    pub const DEFAULT_ANGLE_HI: f64 = 360.0;

    /// Check every parameter the stages would otherwise reject mid-frame.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] describing the first
    /// invalid field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, scale) in [("scale_x", self.scale_x), ("scale_y", self.scale_y)] {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(PipelineError::InvalidArgument(format!(
                    "{name} must be positive and finite, got {scale}"
                )));
            }
        }
        if !self.threshold.is_finite() || !self.threshold_max.is_finite() {
            return Err(PipelineError::InvalidArgument(format!(
                "threshold values must be finite, got {} / {}",
                self.threshold, self.threshold_max
            )));
        }
        if self.erode_iterations == 0 {
            return Err(PipelineError::InvalidArgument(
                "erode_iterations must be at least 1".to_owned(),
            ));
        }
        if !(self.min_length.is_finite() && self.min_length >= 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "min_length must be non-negative and finite, got {}",
                self.min_length
            )));
        }
        AngleRange::new(self.angle_range.lo, self.angle_range.hi)?;
        self.detector
            .validate()
            .map_err(|e| PipelineError::InvalidArgument(e.to_string()))
    }

    /// Map segments found by the pipeline back to full-frame coordinates.
    ///
    /// Segment coordinates and `min_length` live in the resized image's
    /// pixel space; steering code working on the camera frame must go
    /// through this conversion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if the configured
    /// scales are not positive and finite.
    pub fn to_frame_coordinates(&self, segments: &SegmentSet) -> Result<SegmentSet, PipelineError> {
        segments.scaled(self.scale_x, self.scale_y)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scale_x: Self::DEFAULT_SCALE,
            scale_y: Self::DEFAULT_SCALE,
            interpolation: Self::DEFAULT_INTERPOLATION,
            threshold: Self::DEFAULT_THRESHOLD,
            threshold_max: Self::DEFAULT_THRESHOLD_MAX,
            threshold_mode: ThresholdMode::default(),
            erode_iterations: Self::DEFAULT_ERODE_ITERATIONS,
            erode_border: BorderMode::default(),
            detector: DetectorOptions::default(),
            min_length: Self::DEFAULT_MIN_LENGTH,
            angle_range: AngleRange {
                lo: Self::DEFAULT_ANGLE_LO,
                hi: Self::DEFAULT_ANGLE_HI,
            },
        }
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// A stage received malformed parameters or a malformed frame.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The line segment detector could not process the image.
    #[error("line detection failed: {0}")]
    DetectionFailure(String),
}
