//! Vision thread for linetrack.
//!
//! Runs one [`LinePipeline`] on a dedicated thread that pulls frames
//! from a [`FrameSource`] (the camera), pushes results to a
//! [`FrameSink`] (the driver-station video stream) and sends the
//! filtered lines to the steering code as [`LineReport`]s.
//!
//! The thread is controlled by messages rather than shared flags:
//! [`Control::Enable`] and [`Control::Disable`] toggle processing, and
//! [`Control::Stop`] (or dropping the handle) ends the loop. Control
//! messages are checked between frames; a frame that is being processed
//! always finishes.
//!
//! Running vision on its own thread keeps frame processing latency out
//! of the robot's control loop.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use linetrack_pipeline::{Frame, LinePipeline, PipelineConfig, PipelineError, SegmentSet};
use serde::{Deserialize, Serialize};

/// Camera resolution the robot is configured for.
pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
/// Camera resolution the robot is configured for.
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;

/// Reports buffered for a slow consumer before new ones are dropped.
const REPORT_BUFFER: usize = 8;

/// Pause after a failed grab so a dead camera does not spin the thread.
const GRAB_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Frame acquisition failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The camera is gone or not yet connected.
    #[error("camera disconnected")]
    Disconnected,

    /// The driver could not deliver a frame.
    #[error("frame grab failed: {0}")]
    Grab(String),
}

/// Errors from starting or controlling the vision thread.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The pipeline configuration was rejected before starting.
    #[error("invalid pipeline config: {0}")]
    Config(#[from] PipelineError),

    /// The OS refused to create the thread.
    #[error("failed to spawn vision thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The vision thread has already exited.
    #[error("vision thread is not running")]
    Stopped,

    /// The vision thread panicked.
    #[error("vision thread panicked")]
    Panicked,
}

/// Where frames come from.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when no frame could be acquired. The
    /// worker reports it to the sink and tries again.
    fn grab(&mut self) -> Result<Frame, SourceError>;
}

/// Where processed frames go.
pub trait FrameSink: Send {
    /// Publish a frame with the lines found on it (empty when
    /// processing is disabled).
    fn publish(&mut self, frame: &Frame, lines: &SegmentSet);

    /// Show an error message in place of a frame.
    fn notify_error(&mut self, message: &str);
}

/// Control messages for the vision thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Run the pipeline on incoming frames.
    Enable,
    /// Pass raw frames through to the sink untouched.
    Disable,
    /// Exit after the current frame.
    Stop,
}

/// Lines found on one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineReport {
    /// Number of the grabbed frame this report belongs to, counting
    /// from zero across both enabled and disabled frames.
    pub sequence: u64,
    /// Filtered lines in resized-image pixel coordinates.
    pub lines: SegmentSet,
    /// The same lines in full camera-frame coordinates.
    pub frame_lines: SegmentSet,
}

/// Entry point for starting the vision thread.
pub struct VisionWorker;

impl VisionWorker {
    /// Validate `config` and start processing on a new thread.
    ///
    /// Processing starts enabled.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] if the configuration is invalid,
    /// or [`WorkerError::Spawn`] if the thread cannot be created.
    pub fn spawn<S, K>(config: PipelineConfig, source: S, sink: K) -> Result<VisionHandle, WorkerError>
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        config.validate()?;
        let (control_tx, control_rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::sync_channel(REPORT_BUFFER);

        let state = WorkerLoop {
            pipeline: LinePipeline::new(config),
            source,
            sink,
            control: control_rx,
            reports: report_tx,
            enabled: true,
            sequence: 0,
            processed: 0,
        };
        let thread = thread::Builder::new()
            .name("linetrack-vision".to_owned())
            .spawn(move || state.run())?;

        Ok(VisionHandle {
            control: control_tx,
            reports: report_rx,
            thread: Some(thread),
        })
    }
}

/// Handle to a running vision thread.
///
/// Dropping the handle stops the thread and waits for it to exit.
pub struct VisionHandle {
    control: Sender<Control>,
    reports: Receiver<LineReport>,
    thread: Option<JoinHandle<u64>>,
}

impl VisionHandle {
    /// Send a control message.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] if the thread has exited.
    pub fn send(&self, message: Control) -> Result<(), WorkerError> {
        self.control.send(message).map_err(|_| WorkerError::Stopped)
    }

    /// Start running the pipeline on incoming frames.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] if the thread has exited.
    pub fn enable(&self) -> Result<(), WorkerError> {
        self.send(Control::Enable)
    }

    /// Pass raw frames through without processing.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] if the thread has exited.
    pub fn disable(&self) -> Result<(), WorkerError> {
        self.send(Control::Disable)
    }

    /// Receiver of line reports, oldest first.
    #[must_use]
    pub const fn reports(&self) -> &Receiver<LineReport> {
        &self.reports
    }

    /// Drain pending reports and return the newest, if any.
    #[must_use]
    pub fn latest_report(&self) -> Option<LineReport> {
        self.reports.try_iter().last()
    }

    /// Stop the thread and wait for it to finish.
    ///
    /// Returns the number of frames the pipeline processed successfully.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Panicked`] if the thread panicked.
    pub fn stop(mut self) -> Result<u64, WorkerError> {
        self.shutdown().unwrap_or(Err(WorkerError::Stopped))
    }

    fn shutdown(&mut self) -> Option<Result<u64, WorkerError>> {
        let thread = self.thread.take()?;
        // The thread may already be gone; joining still reports how it ended.
        let _ = self.control.send(Control::Stop);
        Some(thread.join().map_err(|_| WorkerError::Panicked))
    }
}

impl Drop for VisionHandle {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.shutdown() {
            tracing::warn!("vision thread ended abnormally: {e}");
        }
    }
}

/// State owned by the vision thread.
struct WorkerLoop<S, K> {
    pipeline: LinePipeline,
    source: S,
    sink: K,
    control: Receiver<Control>,
    reports: SyncSender<LineReport>,
    enabled: bool,
    sequence: u64,
    processed: u64,
}

impl<S: FrameSource, K: FrameSink> WorkerLoop<S, K> {
    fn run(mut self) -> u64 {
        tracing::info!(enabled = self.enabled, "vision thread started");
        while self.drain_control() {
            match self.source.grab() {
                Ok(frame) => self.handle_frame(&frame),
                Err(e) => {
                    tracing::warn!("frame acquisition failed: {e}");
                    self.sink.notify_error(&e.to_string());
                    thread::sleep(GRAB_RETRY_DELAY);
                }
            }
        }
        tracing::info!(processed = self.processed, "vision thread stopped");
        self.processed
    }

    /// Apply pending control messages. Returns `false` when the loop
    /// should exit.
    fn drain_control(&mut self) -> bool {
        loop {
            match self.control.try_recv() {
                Ok(Control::Enable) => self.enabled = true,
                Ok(Control::Disable) => self.enabled = false,
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) {
        let sequence = self.sequence;
        self.sequence += 1;

        if !self.enabled {
            self.sink.publish(frame, &SegmentSet::default());
            return;
        }

        let lines = match self.pipeline.process(frame) {
            Ok(lines) => lines.clone(),
            Err(e) => {
                tracing::warn!(sequence, "frame processing failed: {e}");
                self.sink.notify_error(&e.to_string());
                return;
            }
        };
        self.processed += 1;

        if let Some(resized) = self.pipeline.resized() {
            self.sink.publish(resized, &lines);
        }

        let frame_lines = match self.pipeline.config().to_frame_coordinates(&lines) {
            Ok(frame_lines) => frame_lines,
            Err(e) => {
                tracing::warn!(sequence, "coordinate mapping failed: {e}");
                self.sink.notify_error(&e.to_string());
                return;
            }
        };
        let report = LineReport {
            sequence,
            lines,
            frame_lines,
        };
        match self.reports.try_send(report) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(sequence, "report consumer is behind, dropping report");
            }
        }
    }
}
