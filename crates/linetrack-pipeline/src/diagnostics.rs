//! Pipeline diagnostics: timing and counts for each stage.
//!
//! Collected by [`LinePipeline::process_with_diagnostics`](crate::LinePipeline::process_with_diagnostics)
//! for parameter tuning and for the bench tool's reports.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::StageOutputs;
use crate::types::{Frame, PipelineConfig, PipelineError, SegmentSet};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Resize,
    Desaturate,
    Threshold,
    Erode,
    Detect,
    Filter,
}

impl Stage {
    pub(crate) const COUNT: usize = 6;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: resize.
    pub resize: StageDiagnostics,
    /// Stage 2: desaturation.
    pub desaturate: StageDiagnostics,
    /// Stage 3: threshold.
    pub threshold: StageDiagnostics,
    /// Stage 4: erosion.
    pub erode: StageDiagnostics,
    /// Stage 5: line segment detection.
    pub detect: StageDiagnostics,
    /// Stage 6: length and angle filter.
    pub filter: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Resize metrics.
    Resize {
        /// Input width in pixels.
        input_width: u32,
        /// Input height in pixels.
        input_height: u32,
        /// Output width in pixels.
        width: u32,
        /// Output height in pixels.
        height: u32,
        /// Interpolation used.
        interpolation: String,
    },
    /// Desaturation metrics.
    Desaturate {
        /// Channel count of the resized frame.
        input_channels: u8,
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Threshold metrics.
    Threshold {
        /// Cutoff value.
        threshold: f64,
        /// Output level above the cutoff.
        max_value: f64,
        /// Pixels with a non-zero value after thresholding.
        foreground_pixels: u64,
        /// Total pixel count.
        total_pixels: u64,
    },
    /// Erosion metrics.
    Erode {
        /// Number of passes.
        iterations: u32,
        /// Non-zero pixels before erosion.
        foreground_before: u64,
        /// Non-zero pixels after erosion.
        foreground_after: u64,
    },
    /// Detection metrics.
    Detect {
        /// Number of segments found.
        segment_count: usize,
        /// Sum of segment lengths in pixels.
        total_length: f64,
        /// Longest segment in pixels.
        max_length: f64,
    },
    /// Filter metrics.
    Filter {
        /// Minimum accepted length.
        min_length: f64,
        /// Lower angle bound in degrees.
        angle_lo: f64,
        /// Upper angle bound in degrees.
        angle_hi: f64,
        /// Segments kept.
        kept: usize,
        /// Segments dropped.
        rejected: usize,
    },
}

/// High-level summary counts for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Input frame width in pixels.
    pub frame_width: u32,
    /// Input frame height in pixels.
    pub frame_height: u32,
    /// Resized width in pixels.
    pub resized_width: u32,
    /// Resized height in pixels.
    pub resized_height: u32,
    /// Segments found by the detector.
    pub detected_count: usize,
    /// Segments that passed the filter.
    pub filtered_count: usize,
}

impl PipelineDiagnostics {
    /// Assemble diagnostics from a completed run.
    pub(crate) fn collect(
        frame: &Frame,
        config: &PipelineConfig,
        outputs: &StageOutputs,
        durations: &[Duration; Stage::COUNT],
        total_duration: Duration,
    ) -> Result<Self, PipelineError> {
        let (
            Some(resized),
            Some(desaturated),
            Some(thresholded),
            Some(eroded),
            Some(detected),
            Some(filtered),
        ) = (
            &outputs.resized,
            &outputs.desaturated,
            &outputs.thresholded,
            &outputs.eroded,
            &outputs.detected,
            &outputs.filtered,
        )
        else {
            return Err(PipelineError::DetectionFailure(
                "pipeline run did not complete".to_owned(),
            ));
        };
        let stage = |s: Stage, metrics: StageMetrics| StageDiagnostics {
            duration: durations[s as usize],
            metrics,
        };
        let thresholded_fg = count_foreground(thresholded);

        Ok(Self {
            resize: stage(
                Stage::Resize,
                StageMetrics::Resize {
                    input_width: frame.width(),
                    input_height: frame.height(),
                    width: resized.width(),
                    height: resized.height(),
                    interpolation: config.interpolation.to_string(),
                },
            ),
            desaturate: stage(
                Stage::Desaturate,
                StageMetrics::Desaturate {
                    input_channels: resized.channels(),
                    width: desaturated.width(),
                    height: desaturated.height(),
                },
            ),
            threshold: stage(
                Stage::Threshold,
                StageMetrics::Threshold {
                    threshold: config.threshold,
                    max_value: config.threshold_max,
                    foreground_pixels: thresholded_fg,
                    total_pixels: pixel_count(thresholded),
                },
            ),
            erode: stage(
                Stage::Erode,
                StageMetrics::Erode {
                    iterations: config.erode_iterations,
                    foreground_before: thresholded_fg,
                    foreground_after: count_foreground(eroded),
                },
            ),
            detect: stage(Stage::Detect, detect_metrics(detected)),
            filter: stage(
                Stage::Filter,
                StageMetrics::Filter {
                    min_length: config.min_length,
                    angle_lo: config.angle_range.lo,
                    angle_hi: config.angle_range.hi,
                    kept: filtered.len(),
                    rejected: detected.len().saturating_sub(filtered.len()),
                },
            ),
            total_duration,
            summary: PipelineSummary {
                frame_width: frame.width(),
                frame_height: frame.height(),
                resized_width: resized.width(),
                resized_height: resized.height(),
                detected_count: detected.len(),
                filtered_count: filtered.len(),
            },
        })
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Frame: {}x{} -> {}x{}",
            self.summary.frame_width,
            self.summary.frame_height,
            self.summary.resized_width,
            self.summary.resized_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Resize", &self.resize),
            ("Desaturate", &self.desaturate),
            ("Threshold", &self.threshold),
            ("Erode", &self.erode),
            ("Detect", &self.detect),
            ("Filter", &self.filter),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Segments: {} detected  |  {} kept",
            self.summary.detected_count, self.summary.filtered_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Resize {
            input_width,
            input_height,
            width,
            height,
            interpolation,
        } => format!("{input_width}x{input_height} -> {width}x{height} ({interpolation})"),
        StageMetrics::Desaturate {
            input_channels,
            width,
            height,
        } => format!("{input_channels}ch -> 1ch {width}x{height}"),
        StageMetrics::Threshold {
            threshold,
            max_value,
            foreground_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *foreground_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!("t={threshold:.1} max={max_value:.1} fg={foreground_pixels} ({density:.1}%)")
        }
        StageMetrics::Erode {
            iterations,
            foreground_before,
            foreground_after,
        } => format!("x{iterations} fg={foreground_before}->{foreground_after}"),
        StageMetrics::Detect {
            segment_count,
            total_length,
            max_length,
        } => format!("{segment_count} segments, total={total_length:.1}px max={max_length:.1}px"),
        StageMetrics::Filter {
            min_length,
            angle_lo,
            angle_hi,
            kept,
            rejected,
        } => format!(
            "len>={min_length:.1} angle=[{angle_lo:.1}, {angle_hi:.1}] kept={kept} rejected={rejected}"
        ),
    }
}

fn detect_metrics(segments: &SegmentSet) -> StageMetrics {
    let total_length = segments.iter().map(crate::LineSegment::length).sum();
    let max_length = segments
        .iter()
        .map(crate::LineSegment::length)
        .fold(0.0, f64::max);
    StageMetrics::Detect {
        segment_count: segments.len(),
        total_length,
        max_length,
    }
}

/// Count pixels with any non-zero channel.
pub(crate) fn count_foreground(frame: &Frame) -> u64 {
    let channels = usize::from(frame.channels());
    frame
        .as_bytes()
        .chunks_exact(channels)
        .map(|px| u64::from(px.iter().any(|&v| v != 0)))
        .sum()
}

fn pixel_count(frame: &Frame) -> u64 {
    u64::from(frame.width()) * u64::from(frame.height())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BgrImage, GrayImage};
    use crate::{LinePipeline, LineSegment};

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn count_foreground_works() {
        let mut img = GrayImage::new(10, 10);
        for i in 0..5 {
            img.put_pixel(i, 0, image::Luma([255]));
        }
        assert_eq!(count_foreground(&Frame::Gray(img)), 5);

        let mut color = BgrImage::new(4, 4);
        color.put_pixel(1, 1, image::Rgb([0, 0, 9]));
        assert_eq!(count_foreground(&Frame::Bgr(color)), 1);
    }

    #[test]
    fn detect_metrics_sums_lengths() {
        let segments: SegmentSet = [
            LineSegment::new(0.0, 0.0, 3.0, 4.0).unwrap(),
            LineSegment::new(0.0, 0.0, 10.0, 0.0).unwrap(),
        ]
        .into_iter()
        .collect();
        let StageMetrics::Detect {
            segment_count,
            total_length,
            max_length,
        } = detect_metrics(&segments)
        else {
            unreachable!()
        };
        assert_eq!(segment_count, 2);
        assert!((total_length - 15.0).abs() < 1e-9);
        assert!((max_length - 10.0).abs() < 1e-9);
    }

    #[test]
    fn report_lists_every_stage() {
        let frame = Frame::Gray(GrayImage::from_fn(64, 64, |x, _| {
            image::Luma([if x < 32 { 0 } else { 255 }])
        }));
        let mut pipeline = LinePipeline::default();
        let diag = pipeline.process_with_diagnostics(&frame).unwrap();

        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        for stage in ["Resize", "Desaturate", "Threshold", "Erode", "Detect", "Filter"] {
            assert!(report.contains(stage), "missing {stage}");
        }
        assert!(report.contains("64x64 -> 16x16"));
    }

    #[test]
    fn diagnostics_round_trip_through_json() {
        let frame = Frame::Gray(GrayImage::new(32, 32));
        let diag = LinePipeline::default()
            .process_with_diagnostics(&frame)
            .unwrap();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.resized_width, 8);
        assert_eq!(back.summary.detected_count, 0);
        assert!(json.contains("\"total_duration\""));
    }

    #[test]
    fn erode_metrics_track_foreground_loss() {
        let frame = Frame::Gray(GrayImage::from_fn(80, 80, |x, y| {
            image::Luma([if (20..60).contains(&x) && (20..60).contains(&y) { 255 } else { 0 }])
        }));
        let diag = LinePipeline::default()
            .process_with_diagnostics(&frame)
            .unwrap();
        let StageMetrics::Erode {
            foreground_before,
            foreground_after,
            ..
        } = diag.erode.metrics
        else {
            unreachable!()
        };
        // 10x10 block after resize, 8x8 after one erosion pass.
        assert_eq!(foreground_before, 100);
        assert_eq!(foreground_after, 64);
    }
}
