//! Chroma-key frame pipeline: strip a designated background color from a
//! decoded video's frames and re-encode the transparency-carrying stream as
//! an animated artifact.
//!
//! Pipeline: source frame -> [`classify`] -> keyed [`Frame`] ->
//! [`CaptureSequencer`] (ordering, pacing, cancellation) -> an export adapter
//! -> [`EncodedArtifact`]. Adapters exist for a lossless PNG/ZIP image
//! sequence, GIF (binary transparency via a reserved sentinel), batched APNG,
//! and real-time alpha WebM.

#![forbid(unsafe_code)]

pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod frame;
pub mod job;
pub mod sequencer;
pub mod source;
pub mod store;

pub use classify::{classify_frame, classify_pixel, rgb_to_hsv};
pub use config::{ChromaKeyConfig, KeyTarget};
pub use error::{ChromaError, ChromaResult, ExportWarning};
pub use export::{
    AdapterConfig, EncoderAdapter, ExportOutcome, run_export, run_export_job,
    apng::{ApngAdapter, ApngOpts},
    frames_zip::FramesZipAdapter,
    gif::{GifAdapter, GifOpts},
    webm::{WebmOpts, WebmRecorder},
};
pub use frame::{EncodedArtifact, Frame};
pub use job::{CancelToken, ExportFormat, ExportJob, ExportState};
pub use sequencer::{CaptureSequencer, spawn_capture};
pub use source::{FfmpegFrameSource, FrameSource, SeekState, SourceInfo, SyntheticSource};
pub use store::{ArtifactStore, FsArtifactStore};
