//! Export adapters: each consumes the classified frame sequence and produces
//! one finished binary artifact.

pub mod apng;
pub mod frames_zip;
pub mod gif;
pub mod webm;

use crate::{
    config::ChromaKeyConfig,
    error::{ChromaResult, ExportWarning},
    frame::{EncodedArtifact, Frame},
    job::{ExportFormat, ExportJob, ExportState},
    sequencer::CaptureSequencer,
    source::FrameSource,
};

/// Geometry and pacing handed to an adapter before any frames arrive.
#[derive(Clone, Copy, Debug)]
pub struct AdapterConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Requested frame count; the delivered count may be lower on early
    /// source end, and adapters must tolerate that.
    pub total_frames: u64,
}

/// Contract for pull-driven encoders.
///
/// Ordering contract: `push_frame` is called in strictly increasing frame
/// index order. `finish` is called at most once, and never after `abort`.
pub trait EncoderAdapter: Send {
    /// Called once before any frames are pushed. Construction failures of the
    /// underlying codec surface here, before capture begins.
    fn begin(&mut self, cfg: AdapterConfig) -> ChromaResult<()>;

    /// Consume one frame. The adapter owns it from here on.
    fn push_frame(&mut self, frame: Frame) -> ChromaResult<()>;

    /// Finalize and return the artifact.
    fn finish(&mut self) -> ChromaResult<EncodedArtifact>;

    /// Cancellation: discard buffered work without producing an artifact.
    fn abort(&mut self) {}

    /// Drain non-fatal degradations accumulated during encoding.
    fn take_warnings(&mut self) -> Vec<ExportWarning> {
        Vec::new()
    }
}

/// What one export run produced, returned as an owned handle rather than
/// stashed in ambient state.
#[derive(Debug)]
pub struct ExportOutcome {
    pub state: ExportState,
    /// `None` on cancellation of a pull-driven job; the time-driven recorder
    /// finalizes a truncated artifact instead.
    pub artifact: Option<EncodedArtifact>,
    pub warnings: Vec<ExportWarning>,
    pub frames_emitted: u64,
}

/// Drive a pull adapter from the capture sequencer to completion.
///
/// Fatal errors mark the job `Failed` and propagate; cancellation yields a
/// `Cancelled` outcome with no artifact.
#[tracing::instrument(skip(source, key, job, adapter), fields(format = ?job.format))]
pub fn run_export(
    source: &mut dyn FrameSource,
    key: &ChromaKeyConfig,
    job: &ExportJob,
    adapter: &mut dyn EncoderAdapter,
) -> ChromaResult<ExportOutcome> {
    match drive(source, key, job, adapter) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            job.set_state(ExportState::Failed);
            adapter.abort();
            Err(e)
        }
    }
}

fn drive(
    source: &mut dyn FrameSource,
    key: &ChromaKeyConfig,
    job: &ExportJob,
    adapter: &mut dyn EncoderAdapter,
) -> ChromaResult<ExportOutcome> {
    let (width, height) = source.dimensions();
    adapter.begin(AdapterConfig {
        width,
        height,
        fps: job.fps,
        total_frames: job.total_frames,
    })?;

    job.set_state(ExportState::Capturing);
    let mut sequencer = CaptureSequencer::new(source, key, job)?;
    for item in sequencer.by_ref() {
        adapter.push_frame(item?)?;
    }
    let frames_emitted = sequencer.emitted();

    if job.is_cancelled() {
        adapter.abort();
        job.set_state(ExportState::Cancelled);
        return Ok(ExportOutcome {
            state: ExportState::Cancelled,
            artifact: None,
            warnings: Vec::new(),
            frames_emitted,
        });
    }

    job.set_state(ExportState::Encoding);
    let artifact = adapter.finish()?;
    let warnings = adapter.take_warnings();
    for warning in &warnings {
        tracing::warn!(%warning, "export degraded");
    }

    job.set_state(ExportState::Finished);
    Ok(ExportOutcome {
        state: ExportState::Finished,
        artifact: Some(artifact),
        warnings,
        frames_emitted,
    })
}

/// Run a whole job with the default adapter for its format.
pub fn run_export_job(
    source: &mut dyn FrameSource,
    key: &ChromaKeyConfig,
    job: &ExportJob,
) -> ChromaResult<ExportOutcome> {
    match job.format {
        ExportFormat::ImageSequence => {
            let mut adapter = frames_zip::FramesZipAdapter::new();
            run_export(source, key, job, &mut adapter)
        }
        ExportFormat::PaletteAnimation => {
            let mut adapter = gif::GifAdapter::new(gif::GifOpts::default().with_sentinel(key.sentinel));
            run_export(source, key, job, &mut adapter)
        }
        ExportFormat::BatchedAnimation => {
            let mut adapter = apng::ApngAdapter::new(apng::ApngOpts::default());
            run_export(source, key, job, &mut adapter)
        }
        ExportFormat::AlphaVideo => webm::WebmRecorder::new(webm::WebmOpts::default())
            .record(source, key, job),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ChromaError,
        job::ExportFormat,
        source::SyntheticSource,
    };

    /// Minimal adapter capturing the driver's calls.
    #[derive(Default)]
    struct ProbeAdapter {
        begun: bool,
        frames: Vec<u64>,
        aborted: bool,
        fail_begin: bool,
    }

    impl EncoderAdapter for ProbeAdapter {
        fn begin(&mut self, _cfg: AdapterConfig) -> ChromaResult<()> {
            if self.fail_begin {
                return Err(ChromaError::encoder_init("forced"));
            }
            self.begun = true;
            Ok(())
        }

        fn push_frame(&mut self, frame: Frame) -> ChromaResult<()> {
            self.frames.push(frame.index);
            Ok(())
        }

        fn finish(&mut self) -> ChromaResult<EncodedArtifact> {
            Ok(EncodedArtifact::new(
                vec![0u8; 4],
                "application/octet-stream",
                "probe.bin",
            ))
        }

        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    #[test]
    fn happy_path_finishes_with_artifact() {
        let mut src = SyntheticSource::solid(4, 4, 1.0, [255, 0, 0, 255]);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 1.0).unwrap();
        let mut adapter = ProbeAdapter::default();

        let outcome = run_export(&mut src, &key, &job, &mut adapter).unwrap();
        assert_eq!(outcome.state, ExportState::Finished);
        assert!(outcome.artifact.is_some());
        assert_eq!(outcome.frames_emitted, 10);
        assert_eq!(adapter.frames, (0..10).collect::<Vec<u64>>());
        assert_eq!(job.state(), ExportState::Finished);
    }

    #[test]
    fn encoder_init_failure_surfaces_before_capture() {
        let mut src = SyntheticSource::solid(4, 4, 1.0, [255, 0, 0, 255]);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 1.0).unwrap();
        let mut adapter = ProbeAdapter {
            fail_begin: true,
            ..Default::default()
        };

        let err = run_export(&mut src, &key, &job, &mut adapter).unwrap_err();
        assert!(matches!(err, ChromaError::EncoderInit(_)));
        assert_eq!(job.progress(), 0);
        assert_eq!(job.state(), ExportState::Failed);
    }

    #[test]
    fn cancellation_yields_no_artifact() {
        let mut src = SyntheticSource::solid(4, 4, 10.0, [255, 0, 0, 255]);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 10.0).unwrap();
        // Cancel before the job starts: zero frames, clean Cancelled state.
        job.cancel_token().cancel();
        let mut adapter = ProbeAdapter::default();

        let outcome = run_export(&mut src, &key, &job, &mut adapter).unwrap();
        assert_eq!(outcome.state, ExportState::Cancelled);
        assert!(outcome.artifact.is_none());
        assert!(adapter.aborted);
        assert_eq!(job.state(), ExportState::Cancelled);
    }

    struct FailingPush;

    impl EncoderAdapter for FailingPush {
        fn begin(&mut self, _cfg: AdapterConfig) -> ChromaResult<()> {
            Ok(())
        }

        fn push_frame(&mut self, _frame: Frame) -> ChromaResult<()> {
            Err(ChromaError::encoding("forced"))
        }

        fn finish(&mut self) -> ChromaResult<EncodedArtifact> {
            unreachable!("finish after failed push")
        }
    }

    #[test]
    fn encoding_failure_marks_job_failed() {
        let mut src = SyntheticSource::solid(4, 4, 1.0, [255, 0, 0, 255]);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 1.0).unwrap();

        let err = run_export(&mut src, &key, &job, &mut FailingPush).unwrap_err();
        assert!(matches!(err, ChromaError::Encoding(_)));
        assert_eq!(job.state(), ExportState::Failed);
    }
}
