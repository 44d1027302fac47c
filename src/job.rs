use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
};

use crate::error::{ChromaError, ChromaResult};

/// Output format for one export job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExportFormat {
    /// Lossless PNG-per-frame archive (ZIP).
    ImageSequence,
    /// GIF with binary transparency via a reserved sentinel color.
    PaletteAnimation,
    /// APNG encoded in memory-bounded batches with whole-sequence second pass.
    BatchedAnimation,
    /// WebM/VP9 with alpha preserved end to end, captured in real time.
    AlphaVideo,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::ImageSequence => "application/zip",
            Self::PaletteAnimation => "image/gif",
            Self::BatchedAnimation => "image/apng",
            Self::AlphaVideo => "video/webm",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::ImageSequence => "frames.zip",
            Self::PaletteAnimation => "export.gif",
            Self::BatchedAnimation => "export.png",
            Self::AlphaVideo => "export.webm",
        }
    }
}

/// Lifecycle of an export job.
///
/// `Capturing` and `Encoding` interleave for the batched adapter and are
/// strictly sequential for the others; `Cancelled` is reachable from both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Capturing,
    Encoding,
    Finished,
    Cancelled,
    Failed,
}

impl ExportState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Capturing,
            2 => Self::Encoding,
            3 => Self::Finished,
            4 => Self::Cancelled,
            _ => Self::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Capturing => 1,
            Self::Encoding => 2,
            Self::Finished => 3,
            Self::Cancelled => 4,
            Self::Failed => 5,
        }
    }
}

/// Cooperative cancellation flag, polled between frame and batch steps.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One export run: format, pacing, derived frame count, live progress.
///
/// Created when export begins and dropped when it finishes, is cancelled, or
/// fails; the config it runs against is read-only for its whole lifetime.
#[derive(Debug)]
pub struct ExportJob {
    pub format: ExportFormat,
    pub fps: u32,
    /// `floor(duration * fps)`; the actually emitted count may be lower on
    /// early source end.
    pub total_frames: u64,
    progress: AtomicU64,
    state: AtomicU8,
    cancel: CancelToken,
}

impl ExportJob {
    pub fn new(format: ExportFormat, fps: u32, duration_sec: f64) -> ChromaResult<Self> {
        if fps == 0 {
            return Err(ChromaError::validation("export fps must be > 0"));
        }
        if !duration_sec.is_finite() || duration_sec < 0.0 {
            return Err(ChromaError::validation(
                "source duration must be finite and >= 0",
            ));
        }
        let total_frames = (duration_sec * f64::from(fps)).floor() as u64;
        Ok(Self {
            format,
            fps,
            total_frames,
            progress: AtomicU64::new(0),
            state: AtomicU8::new(ExportState::Idle.as_u8()),
            cancel: CancelToken::new(),
        })
    }

    /// Frames emitted so far; monotonically increasing.
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    pub(crate) fn advance(&self) -> u64 {
        self.progress.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn state(&self) -> ExportState {
        ExportState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: ExportState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
