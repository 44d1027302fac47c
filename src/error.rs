pub type ChromaResult<T> = Result<T, ChromaError>;

#[derive(thiserror::Error, Debug)]
pub enum ChromaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("encoder init error: {0}")]
    EncoderInit(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChromaError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn encoder_init(msg: impl Into<String>) -> Self {
        Self::EncoderInit(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }
}

/// Non-fatal degradations surfaced alongside a successful export.
///
/// These never abort a job: the artifact is usable, but the caller should
/// relay the message to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportWarning {
    /// The whole-sequence re-encode failed; only the first batch was delivered.
    EncodingDegraded {
        requested_frames: u64,
        delivered_frames: u64,
    },
    /// The finished artifact is smaller than the sanity floor. Usually a
    /// chroma-key misconfiguration (everything keyed out), not an encoder bug.
    ArtifactSuspiciouslySmall { bytes: usize, floor_bytes: usize },
}

impl std::fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EncodingDegraded {
                requested_frames,
                delivered_frames,
            } => write!(
                f,
                "encoding degraded: delivered {delivered_frames} of {requested_frames} requested frames"
            ),
            Self::ArtifactSuspiciouslySmall { bytes, floor_bytes } => write!(
                f,
                "artifact suspiciously small: {bytes} bytes (sanity floor {floor_bytes}); check the key configuration"
            ),
        }
    }
}
