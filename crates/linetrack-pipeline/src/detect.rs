//! Line segment detection.
//!
//! A small LSD-style detector: pixels are grouped by gradient
//! orientation and each coherent group is fitted with a straight
//! segment.
//!
//! 1. Sobel gradients give a magnitude and an orientation per pixel.
//!    Orientation is taken modulo 180 degrees, so the two edges of a thin
//!    bright stripe (opposite gradient signs) count as parallel.
//! 2. Seeds are visited strongest first. Each unused seed grows an
//!    8-connected region of pixels above the magnitude threshold whose
//!    orientation stays within the angle tolerance of the seed.
//! 3. Small regions, and regions where too few pixels are tightly
//!    aligned with the seed, are released for later seeds.
//! 4. The region's principal axis gives the segment direction. Its
//!    extreme projections are extended along the axis while the
//!    gradient stays strong (this picks up the rounded corners at the
//!    ends of a stroke), then padded by half a pixel so the segment
//!    covers the pixel footprint rather than stopping at pixel centers.
//!
//! Coordinates are pixel centers of the input image.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::desaturate::desaturate;
use crate::types::{Frame, GrayImage, LineSegment, PipelineError, SegmentSet};

/// 8-connected neighborhood.
const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Tuning for [`detect`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    /// Minimum Sobel gradient magnitude for a pixel to join a region.
    pub magnitude_threshold: f64,
    /// Maximum orientation difference from the seed, in degrees.
    pub angle_tolerance_deg: f64,
    /// Regions with fewer pixels are discarded.
    pub min_region_size: usize,
    /// Fraction of region pixels that must lie within half the angle
    /// tolerance of the seed.
    pub min_aligned_fraction: f64,
}

impl DetectorOptions {
    /// Default gradient magnitude threshold (Sobel units).
    pub const DEFAULT_MAGNITUDE_THRESHOLD: f64 = 50.0;
    /// Default orientation tolerance in degrees.
    pub const DEFAULT_ANGLE_TOLERANCE_DEG: f64 = 22.5;
    /// Default minimum region size in pixels.
    pub const DEFAULT_MIN_REGION_SIZE: usize = 12;
    /// Default aligned-pixel fraction.
    pub const DEFAULT_MIN_ALIGNED_FRACTION: f64 = 0.6;

    /// Check the options.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DetectionFailure`] for non-finite or
    /// negative thresholds, a tolerance outside `(0, 90]`, or a fraction
    /// outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.magnitude_threshold.is_finite() && self.magnitude_threshold >= 0.0) {
            return Err(PipelineError::DetectionFailure(format!(
                "magnitude_threshold must be non-negative and finite, got {}",
                self.magnitude_threshold
            )));
        }
        if !(self.angle_tolerance_deg > 0.0 && self.angle_tolerance_deg <= 90.0) {
            return Err(PipelineError::DetectionFailure(format!(
                "angle_tolerance_deg must be in (0, 90], got {}",
                self.angle_tolerance_deg
            )));
        }
        if !(0.0..=1.0).contains(&self.min_aligned_fraction) {
            return Err(PipelineError::DetectionFailure(format!(
                "min_aligned_fraction must be in [0, 1], got {}",
                self.min_aligned_fraction
            )));
        }
        Ok(())
    }
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            magnitude_threshold: Self::DEFAULT_MAGNITUDE_THRESHOLD,
            angle_tolerance_deg: Self::DEFAULT_ANGLE_TOLERANCE_DEG,
            min_region_size: Self::DEFAULT_MIN_REGION_SIZE,
            min_aligned_fraction: Self::DEFAULT_MIN_ALIGNED_FRACTION,
        }
    }
}

/// Find straight line segments in a frame.
///
/// Multi-channel frames are desaturated first. An image without
/// qualifying gradients yields an empty set.
///
/// # Errors
///
/// Returns [`PipelineError::DetectionFailure`] if the options are
/// invalid, the frame is empty, or a fitted segment has non-finite
/// coordinates.
pub fn detect(input: &Frame, options: &DetectorOptions) -> Result<SegmentSet, PipelineError> {
    options.validate()?;
    input
        .validate()
        .map_err(|e| PipelineError::DetectionFailure(e.to_string()))?;
    let gray = desaturate(input);
    Extractor::new(&gray, options).extract()
}

/// Running sums over the pixels of one region.
#[derive(Default)]
struct Region {
    indices: Vec<usize>,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_yy: f64,
    sum_xy: f64,
    aligned: usize,
}

impl Region {
    fn clear(&mut self) {
        self.indices.clear();
        self.sum_x = 0.0;
        self.sum_y = 0.0;
        self.sum_xx = 0.0;
        self.sum_yy = 0.0;
        self.sum_xy = 0.0;
        self.aligned = 0;
    }

    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, idx: usize, x: usize, y: usize, aligned: bool) {
        let (xf, yf) = (x as f64, y as f64);
        self.indices.push(idx);
        self.sum_x += xf;
        self.sum_y += yf;
        self.sum_xx += xf * xf;
        self.sum_yy += yf * yf;
        self.sum_xy += xf * yf;
        if aligned {
            self.aligned += 1;
        }
    }

    const fn len(&self) -> usize {
        self.indices.len()
    }

    #[allow(clippy::cast_precision_loss)]
    fn aligned_fraction(&self) -> f64 {
        if self.indices.is_empty() {
            0.0
        } else {
            self.aligned as f64 / self.indices.len() as f64
        }
    }
}

struct Extractor<'a> {
    options: &'a DetectorOptions,
    width: usize,
    height: usize,
    magnitude: Vec<f64>,
    orientation: Vec<f64>,
    used: Vec<bool>,
    stack: Vec<usize>,
    region: Region,
    tolerance: f64,
}

impl<'a> Extractor<'a> {
    fn new(gray: &GrayImage, options: &'a DetectorOptions) -> Self {
        let gx = imageproc::gradients::horizontal_sobel(gray);
        let gy = imageproc::gradients::vertical_sobel(gray);
        let (magnitude, orientation) = gx
            .pixels()
            .zip(gy.pixels())
            .map(|(h, v)| {
                let (dx, dy) = (f64::from(h.0[0]), f64::from(v.0[0]));
                (dx.hypot(dy), dy.atan2(dx).rem_euclid(PI))
            })
            .unzip();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        Self {
            options,
            width,
            height,
            magnitude,
            orientation,
            used: vec![false; width * height],
            stack: Vec::with_capacity(64),
            region: Region::default(),
            tolerance: options.angle_tolerance_deg.to_radians(),
        }
    }

    fn extract(mut self) -> Result<SegmentSet, PipelineError> {
        let mut seeds: Vec<usize> = (0..self.magnitude.len())
            .filter(|&i| self.is_strong(i))
            .collect();
        // Stable: equal magnitudes keep raster order.
        seeds.sort_by(|&a, &b| self.magnitude[b].total_cmp(&self.magnitude[a]));

        let mut segments = Vec::new();
        for seed in seeds {
            if self.used[seed] {
                continue;
            }
            self.grow(seed);
            match self.fit()? {
                Some(segment) => segments.push(segment),
                None => {
                    for &idx in &self.region.indices {
                        self.used[idx] = false;
                    }
                    // The seed itself cannot start an accepted region.
                    self.used[seed] = true;
                }
            }
        }
        Ok(SegmentSet::new(segments))
    }

    fn grow(&mut self, seed: usize) {
        self.region.clear();
        self.stack.clear();
        let seed_angle = self.orientation[seed];
        self.used[seed] = true;
        self.stack.push(seed);

        while let Some(idx) = self.stack.pop() {
            let (x, y) = (idx % self.width, idx / self.width);
            let aligned =
                angle_between(self.orientation[idx], seed_angle) <= self.tolerance * 0.5;
            self.region.push(idx, x, y, aligned);

            for (dx, dy) in NEIGHBORS {
                #[allow(clippy::cast_possible_wrap)]
                let Some(n) = self.index(x as i64 + dx, y as i64 + dy) else {
                    continue;
                };
                if self.used[n] || !self.is_strong(n) {
                    continue;
                }
                if angle_between(self.orientation[n], seed_angle) <= self.tolerance {
                    self.used[n] = true;
                    self.stack.push(n);
                }
            }
        }
    }

    /// Fit the current region. `Ok(None)` means the region was rejected.
    #[allow(clippy::cast_precision_loss)]
    fn fit(&self) -> Result<Option<LineSegment>, PipelineError> {
        let region = &self.region;
        if region.len() < self.options.min_region_size.max(2) {
            return Ok(None);
        }
        if region.aligned_fraction() < self.options.min_aligned_fraction {
            return Ok(None);
        }

        let n = region.len() as f64;
        let (cx, cy) = (region.sum_x / n, region.sum_y / n);
        let cxx = region.sum_xx / n - cx * cx;
        let cyy = region.sum_yy / n - cy * cy;
        let cxy = region.sum_xy / n - cx * cy;
        let spread = (cxx + cyy) / 2.0 + ((cxx - cyy) / 2.0).hypot(cxy);
        if !spread.is_finite() || spread <= f64::EPSILON {
            return Ok(None);
        }

        // Principal axis, oriented left-to-right (top-to-bottom when vertical).
        let theta = 0.5 * (2.0 * cxy).atan2(cxx - cyy);
        let (mut tx, mut ty) = (theta.cos(), theta.sin());
        if tx < -1e-9 || (tx.abs() <= 1e-9 && ty < 0.0) {
            tx = -tx;
            ty = -ty;
        }

        let (mut smin, mut smax) = (f64::INFINITY, f64::NEG_INFINITY);
        for &idx in &region.indices {
            let x = (idx % self.width) as f64;
            let y = (idx / self.width) as f64;
            let s = (x - cx).mul_add(tx, (y - cy) * ty);
            smin = smin.min(s);
            smax = smax.max(s);
        }
        smin -= self.extension(cx, cy, -tx, -ty, -smin);
        smax += self.extension(cx, cy, tx, ty, smax);

        let (s0, s1) = (smin - 0.5, smax + 0.5);
        LineSegment::new(
            s0.mul_add(tx, cx),
            s0.mul_add(ty, cy),
            s1.mul_add(tx, cx),
            s1.mul_add(ty, cy),
        )
        .map(Some)
        .map_err(|e| PipelineError::DetectionFailure(e.to_string()))
    }

    /// Whole-pixel steps past `from` along `(dx, dy)` that still land on
    /// a strong gradient.
    #[allow(clippy::cast_possible_truncation)]
    fn extension(&self, cx: f64, cy: f64, dx: f64, dy: f64, from: f64) -> f64 {
        let limit = u32::try_from(self.width.max(self.height)).unwrap_or(u32::MAX);
        let mut steps: u32 = 0;
        while steps < limit {
            let s = from + f64::from(steps + 1);
            let x = s.mul_add(dx, cx).round() as i64;
            let y = s.mul_add(dy, cy).round() as i64;
            match self.index(x, y) {
                Some(i) if self.is_strong(i) => steps += 1,
                _ => break,
            }
        }
        f64::from(steps)
    }

    fn is_strong(&self, idx: usize) -> bool {
        self.magnitude[idx] > 0.0 && self.magnitude[idx] >= self.options.magnitude_threshold
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let inside = x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height;
        inside.then(|| y as usize * self.width + x as usize)
    }
}

/// Smallest difference between two orientations taken modulo pi.
fn angle_between(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BgrImage, GrayImage};

    fn rect_frame(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Frame {
        Frame::Gray(GrayImage::from_fn(w, h, |x, y| {
            let on = (x0..x1).contains(&x) && (y0..y1).contains(&y);
            image::Luma([if on { 255 } else { 0 }])
        }))
    }

    fn is_horizontal(s: &LineSegment) -> bool {
        let a = s.angle().abs();
        a < 5.0 || a > 175.0
    }

    #[test]
    fn black_frame_has_no_segments() {
        let frame = Frame::Gray(GrayImage::new(40, 30));
        let segments = detect(&frame, &DetectorOptions::default()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn uniform_white_frame_has_no_segments() {
        let frame = Frame::Gray(GrayImage::from_pixel(40, 30, image::Luma([255])));
        let segments = detect(&frame, &DetectorOptions::default()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn thick_stripe_yields_two_horizontal_edges() {
        // 30 px long, rows 10..16: the top and bottom edges are separate.
        // Each edge picks up one corner pixel per end plus half-pixel padding.
        let frame = rect_frame(60, 30, 15, 10, 45, 16);
        let segments = detect(&frame, &DetectorOptions::default()).unwrap();
        assert_eq!(segments.len(), 2, "got {segments:?}");
        for s in &segments {
            assert!(is_horizontal(s), "not horizontal: {s:?}");
            assert!(
                (s.length() - 32.0).abs() <= 1.0,
                "expected ~32 px, got {}",
                s.length()
            );
            assert!(s.x1 < s.x2, "segments run left to right: {s:?}");
        }
        let (_, top_y) = segments.segments()[0].midpoint();
        let (_, bottom_y) = segments.segments()[1].midpoint();
        assert!(top_y < bottom_y, "top edge is emitted first");
        assert!((top_y - 9.5).abs() < 1.0, "top edge near y=9.5, got {top_y}");
        assert!((bottom_y - 15.5).abs() < 1.0, "bottom edge near y=15.5, got {bottom_y}");
    }

    #[test]
    fn vertical_edge_runs_top_to_bottom() {
        let frame = rect_frame(40, 40, 20, 5, 40, 35);
        let segments = detect(&frame, &DetectorOptions::default()).unwrap();
        let vertical: Vec<_> = segments
            .iter()
            .filter(|s| (s.angle().abs() - 90.0).abs() < 5.0)
            .collect();
        assert!(!vertical.is_empty(), "got {segments:?}");
        for s in vertical {
            assert!(s.y1 < s.y2);
            assert!((s.length() - 32.0).abs() <= 1.0, "got {}", s.length());
        }
    }

    #[test]
    fn diagonal_edge_has_diagonal_angle() {
        // Everything below the main diagonal is white.
        let frame = Frame::Gray(GrayImage::from_fn(50, 50, |x, y| {
            image::Luma([if y > x { 255 } else { 0 }])
        }));
        let segments = detect(&frame, &DetectorOptions::default()).unwrap();
        assert!(!segments.is_empty());
        let longest = segments
            .iter()
            .max_by(|a, b| a.length().total_cmp(&b.length()))
            .unwrap();
        assert!((longest.angle() - 45.0).abs() < 3.0, "angle {}", longest.angle());
        assert!(longest.length() > 50.0);
    }

    #[test]
    fn specks_are_ignored() {
        let mut img = GrayImage::new(40, 40);
        img.put_pixel(10, 10, image::Luma([255]));
        img.put_pixel(30, 25, image::Luma([255]));
        let segments = detect(&Frame::Gray(img), &DetectorOptions::default()).unwrap();
        assert!(segments.is_empty(), "got {segments:?}");
    }

    #[test]
    fn color_frames_are_desaturated_first() {
        let gray = rect_frame(60, 30, 15, 10, 45, 16);
        let color = Frame::Bgr(BgrImage::from_fn(60, 30, |x, y| {
            let on = (15..45).contains(&x) && (10..16).contains(&y);
            let v = if on { 255 } else { 0 };
            image::Rgb([v, v, v])
        }));
        let options = DetectorOptions::default();
        assert_eq!(detect(&gray, &options).unwrap(), detect(&color, &options).unwrap());
    }

    #[test]
    fn detection_is_deterministic() {
        let frame = rect_frame(80, 60, 10, 20, 70, 28);
        let options = DetectorOptions::default();
        assert_eq!(detect(&frame, &options).unwrap(), detect(&frame, &options).unwrap());
    }

    #[test]
    fn coordinates_are_finite() {
        let frame = rect_frame(64, 64, 5, 5, 50, 40);
        for s in &detect(&frame, &DetectorOptions::default()).unwrap() {
            assert!([s.x1, s.y1, s.x2, s.y2].iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn invalid_options_are_detection_failures() {
        let frame = Frame::Gray(GrayImage::new(8, 8));
        let options = DetectorOptions {
            min_aligned_fraction: 1.5,
            ..DetectorOptions::default()
        };
        assert!(matches!(
            detect(&frame, &options),
            Err(PipelineError::DetectionFailure(_))
        ));
    }

    #[test]
    fn empty_frame_is_a_detection_failure() {
        let frame = Frame::Gray(GrayImage::new(0, 0));
        assert!(matches!(
            detect(&frame, &DetectorOptions::default()),
            Err(PipelineError::DetectionFailure(_))
        ));
    }

    #[test]
    fn angle_between_wraps_at_half_turn() {
        assert!((angle_between(0.0, PI - 0.1) - 0.1).abs() < 1e-12);
        assert!(angle_between(1.0, 1.0).abs() < 1e-12);
        assert!((angle_between(0.0, PI / 2.0) - PI / 2.0).abs() < 1e-12);
    }
}
