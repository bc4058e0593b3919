//! linetrack-pipeline: pure frame-to-line-segment pipeline (sans-IO).
//!
//! Turns a camera frame into the straight line segments a line-following
//! robot steers by:
//! resize -> desaturate -> threshold -> erode -> detect -> filter.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! frames and returns structured data. Camera capture, display and the
//! processing thread live in `linetrack-worker`.

pub mod desaturate;
pub mod detect;
pub mod diagnostics;
pub mod erode;
pub mod filter;
pub mod pipeline;
pub mod resize;
pub mod threshold;
pub mod types;

pub use desaturate::desaturate;
pub use detect::{DetectorOptions, detect};
pub use diagnostics::PipelineDiagnostics;
pub use erode::{BorderMode, ErodeParams, StructuringElement, erode};
pub use filter::{AngleRange, filter_segments};
pub use pipeline::{LinePipeline, StageOutputs};
pub use resize::{Interpolation, resize};
pub use threshold::{ThresholdMode, threshold};
pub use types::{
    BgrImage, BgraImage, Dimensions, Frame, GrayImage, LineSegment, PipelineConfig,
    PipelineError, SegmentSet,
};

/// Run the full pipeline once and return the filtered segments.
///
/// Convenience for one-off frames; use [`LinePipeline`] to keep the
/// intermediate images.
///
/// # Errors
///
/// Returns the first stage error, see [`LinePipeline::process`].
pub fn process(frame: &Frame, config: &PipelineConfig) -> Result<SegmentSet, PipelineError> {
    let mut pipeline = LinePipeline::new(config.clone());
    pipeline.process(frame).cloned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn process_black_frame_is_empty() {
        let frame = Frame::Gray(GrayImage::new(64, 48));
        let segments = process(&frame, &PipelineConfig::default()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn process_rejects_bad_config() {
        let frame = Frame::Gray(GrayImage::new(64, 48));
        let config = PipelineConfig {
            scale_x: 0.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            process(&frame, &config),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn process_matches_stateful_pipeline() {
        let frame = Frame::Gray(GrayImage::from_fn(200, 120, |x, y| {
            image::Luma([if (40..160).contains(&x) && (60..80).contains(&y) { 255 } else { 0 }])
        }));
        let config = PipelineConfig::default();
        let once = process(&frame, &config).unwrap();
        let mut pipeline = LinePipeline::new(config);
        assert_eq!(&once, pipeline.process(&frame).unwrap());
        assert!(!once.is_empty());
    }
}
