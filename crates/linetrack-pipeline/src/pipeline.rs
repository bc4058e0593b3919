//! Stateful frame pipeline: resize, desaturate, threshold, erode, detect,
//! filter.
//!
//! [`LinePipeline`] keeps the output of every stage from the most recent
//! call so callers (a display sink, the bench tool, tests) can look at
//! the intermediates without re-running anything:
//!
//! ```rust
//! # use linetrack_pipeline::{Frame, GrayImage, LinePipeline, PipelineConfig, PipelineError};
//! # fn run() -> Result<(), PipelineError> {
//! let mut pipeline = LinePipeline::new(PipelineConfig::default());
//! let frame = Frame::Gray(GrayImage::new(640, 480));
//!
//! let lines = pipeline.process(&frame)?;
//! assert!(lines.is_empty());
//! assert_eq!(pipeline.resized().map(Frame::width), Some(160));
//! # Ok(())
//! # }
//! ```
//!
//! # State
//!
//! Each [`process`](LinePipeline::process) call clears all outputs
//! before running. When a stage fails, the outputs of the stages that
//! finished in that call remain readable and the rest stay `None`.
//! Nothing else carries over from one frame to the next.

use std::time::{Duration, Instant};

use crate::detect::detect;
use crate::diagnostics::{PipelineDiagnostics, Stage};
use crate::erode::{ErodeParams, erode};
use crate::filter::{AngleRange, filter_segments};
use crate::resize::resize;
use crate::threshold::threshold;
use crate::types::{Frame, PipelineConfig, PipelineError, SegmentSet};

/// Output of each stage from the most recent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutputs {
    /// Input frame after resizing.
    pub resized: Option<Frame>,
    /// Single-channel luminance of the resized frame.
    pub desaturated: Option<Frame>,
    /// Binary image after thresholding.
    pub thresholded: Option<Frame>,
    /// Thresholded image after erosion.
    pub eroded: Option<Frame>,
    /// Every segment the detector found, in resized pixel coordinates.
    pub detected: Option<SegmentSet>,
    /// Segments that passed the length and angle filter.
    pub filtered: Option<SegmentSet>,
}

impl StageOutputs {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Line-following vision pipeline.
#[derive(Debug, Clone, Default)]
pub struct LinePipeline {
    config: PipelineConfig,
    outputs: StageOutputs,
}

impl LinePipeline {
    /// Create a pipeline. The configuration is checked stage by stage
    /// when frames are processed; call [`PipelineConfig::validate`] to
    /// check it up front.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            outputs: StageOutputs::default(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect on the next frame.
    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }

    /// Run every stage on `frame` and return the filtered segments.
    ///
    /// Segment coordinates are in the resized image's pixel space; see
    /// [`PipelineConfig::to_frame_coordinates`].
    ///
    /// # Errors
    ///
    /// Returns the first stage error: [`PipelineError::InvalidArgument`]
    /// for a malformed frame or parameter,
    /// [`PipelineError::DetectionFailure`] if line detection fails.
    pub fn process(&mut self, frame: &Frame) -> Result<&SegmentSet, PipelineError> {
        self.run(frame, |_, _| {})?;
        self.outputs
            .filtered
            .as_ref()
            .ok_or_else(|| PipelineError::DetectionFailure("filter stage produced no output".to_owned()))
    }

    /// Like [`process`](Self::process), also timing each stage.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process).
    pub fn process_with_diagnostics(
        &mut self,
        frame: &Frame,
    ) -> Result<PipelineDiagnostics, PipelineError> {
        let start = Instant::now();
        let mut durations = [Duration::ZERO; Stage::COUNT];
        self.run(frame, |stage, elapsed| durations[stage as usize] = elapsed)?;
        PipelineDiagnostics::collect(
            frame,
            &self.config,
            &self.outputs,
            &durations,
            start.elapsed(),
        )
    }

    /// All stage outputs from the most recent run.
    #[must_use]
    pub const fn outputs(&self) -> &StageOutputs {
        &self.outputs
    }

    /// Resized frame from the most recent run.
    #[must_use]
    pub const fn resized(&self) -> Option<&Frame> {
        self.outputs.resized.as_ref()
    }

    /// Desaturated frame from the most recent run.
    #[must_use]
    pub const fn desaturated(&self) -> Option<&Frame> {
        self.outputs.desaturated.as_ref()
    }

    /// Thresholded frame from the most recent run.
    #[must_use]
    pub const fn thresholded(&self) -> Option<&Frame> {
        self.outputs.thresholded.as_ref()
    }

    /// Eroded frame from the most recent run.
    #[must_use]
    pub const fn eroded(&self) -> Option<&Frame> {
        self.outputs.eroded.as_ref()
    }

    /// Unfiltered detector output from the most recent run.
    #[must_use]
    pub const fn detected(&self) -> Option<&SegmentSet> {
        self.outputs.detected.as_ref()
    }

    /// Filtered segments from the most recent run.
    #[must_use]
    pub const fn filtered(&self) -> Option<&SegmentSet> {
        self.outputs.filtered.as_ref()
    }

    /// Run the stage chain, reporting each stage's wall-clock time.
    fn run(
        &mut self,
        frame: &Frame,
        mut record: impl FnMut(Stage, Duration),
    ) -> Result<(), PipelineError> {
        self.outputs.clear();
        let config = &self.config;
        let outputs = &mut self.outputs;

        let t = Instant::now();
        let resized = resize(
            frame,
            None,
            config.scale_x,
            config.scale_y,
            config.interpolation,
        )?;
        record(Stage::Resize, t.elapsed());
        let resized = outputs.resized.insert(resized);

        let t = Instant::now();
        let desaturated = Frame::Gray(crate::desaturate::desaturate(resized));
        record(Stage::Desaturate, t.elapsed());
        let desaturated = outputs.desaturated.insert(desaturated);

        let t = Instant::now();
        let thresholded = threshold(
            desaturated,
            config.threshold,
            config.threshold_max,
            config.threshold_mode,
        )?;
        record(Stage::Threshold, t.elapsed());
        let thresholded = outputs.thresholded.insert(thresholded);

        let t = Instant::now();
        let params = ErodeParams {
            iterations: config.erode_iterations,
            border: config.erode_border,
            ..ErodeParams::default()
        };
        let eroded = erode(thresholded, &params)?;
        record(Stage::Erode, t.elapsed());
        let eroded = outputs.eroded.insert(eroded);

        let t = Instant::now();
        let detected = detect(eroded, &config.detector)?;
        record(Stage::Detect, t.elapsed());
        let detected = outputs.detected.insert(detected);

        let t = Instant::now();
        let range = filter_range(config)?;
        let filtered = filter_segments(detected, config.min_length, &range);
        record(Stage::Filter, t.elapsed());

        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            detected = detected.len(),
            filtered = filtered.len(),
            "processed frame"
        );
        outputs.filtered = Some(filtered);
        Ok(())
    }
}

/// Check the filter parameters and build the angle range.
fn filter_range(config: &PipelineConfig) -> Result<AngleRange, PipelineError> {
    if !(config.min_length.is_finite() && config.min_length >= 0.0) {
        return Err(PipelineError::InvalidArgument(format!(
            "min_length must be non-negative and finite, got {}",
            config.min_length
        )));
    }
    AngleRange::new(config.angle_range.lo, config.angle_range.hi)
}
