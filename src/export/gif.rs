use gif::{Encoder, Repeat};

use crate::{
    error::{ChromaError, ChromaResult, ExportWarning},
    export::{AdapterConfig, EncoderAdapter},
    frame::{EncodedArtifact, Frame},
};

/// Substitution colors tried in order when the configured sentinel (or the
/// default) collides with retained content. Deliberately unusual hues.
const SENTINEL_CANDIDATES: [[u8; 3]; 4] =
    [[255, 0, 255], [0, 255, 255], [255, 0, 128], [64, 0, 96]];

/// Options for the palette-animation adapter.
#[derive(Clone, Debug)]
pub struct GifOpts {
    /// Pixels below this alpha collapse to fully transparent; at or above it,
    /// fully opaque. GIF transparency is binary, so partial edges are lossy
    /// by design here.
    pub alpha_cutoff: u8,
    /// Quantizer speed, 1 (best) to 30 (fastest).
    pub speed: i32,
    /// Artifacts smaller than this raise `ArtifactSuspiciouslySmall`.
    pub min_artifact_bytes: usize,
    /// Preferred sentinel; `None` starts from the candidate list.
    pub sentinel: Option<[u8; 3]>,
}

impl Default for GifOpts {
    fn default() -> Self {
        Self {
            alpha_cutoff: 128,
            speed: 10,
            min_artifact_bytes: 2048,
            sentinel: None,
        }
    }
}

impl GifOpts {
    #[must_use]
    pub fn with_sentinel(mut self, sentinel: Option<[u8; 3]>) -> Self {
        self.sentinel = sentinel;
        self
    }

    #[must_use]
    pub fn with_alpha_cutoff(mut self, cutoff: u8) -> Self {
        self.alpha_cutoff = cutoff;
        self
    }

    #[must_use]
    pub fn with_min_artifact_bytes(mut self, bytes: usize) -> Self {
        self.min_artifact_bytes = bytes;
        self
    }
}

/// Palette-animation adapter (GIF).
///
/// Capturing and encoding are strictly sequential: frames are buffered and
/// the whole animation is encoded in `finish`, once the per-job sentinel is
/// fixed. The sentinel becomes the transparent palette entry for every frame.
pub struct GifAdapter {
    opts: GifOpts,
    cfg: Option<AdapterConfig>,
    frames: Vec<Frame>,
    sentinel: Option<[u8; 3]>,
    warnings: Vec<ExportWarning>,
}

impl GifAdapter {
    #[must_use]
    pub fn new(opts: GifOpts) -> Self {
        Self {
            opts,
            cfg: None,
            frames: Vec::new(),
            sentinel: None,
            warnings: Vec::new(),
        }
    }

    /// The sentinel chosen for this job, once the first frame has been seen.
    pub fn sentinel(&self) -> Option<[u8; 3]> {
        self.sentinel
    }

    /// Pick a sentinel that does not occur among the frame's retained pixels.
    /// The configured color gets first refusal, then the candidate list.
    fn choose_sentinel(&self, first: &Frame) -> [u8; 3] {
        let collides = |color: [u8; 3]| {
            first.data.chunks_exact(4).any(|px| {
                px[3] >= self.opts.alpha_cutoff && px[0] == color[0] && px[1] == color[1] && px[2] == color[2]
            })
        };

        if let Some(preferred) = self.opts.sentinel
            && !collides(preferred)
        {
            return preferred;
        }
        for candidate in SENTINEL_CANDIDATES {
            if !collides(candidate) {
                return candidate;
            }
        }
        // Every candidate occurs in content; fall back to the first and
        // accept the collision rather than failing the job.
        self.opts.sentinel.unwrap_or(SENTINEL_CANDIDATES[0])
    }

    /// Collapse partial alpha to binary transparency: keyed pixels become the
    /// sentinel at alpha 0, everything else is forced opaque.
    fn substitute(&self, frame: &Frame, sentinel: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::with_capacity(frame.data.len());
        for px in frame.data.chunks_exact(4) {
            if px[3] < self.opts.alpha_cutoff {
                out.extend_from_slice(&[sentinel[0], sentinel[1], sentinel[2], 0]);
            } else {
                out.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
        }
        out
    }
}

impl EncoderAdapter for GifAdapter {
    fn begin(&mut self, cfg: AdapterConfig) -> ChromaResult<()> {
        if cfg.width > u32::from(u16::MAX) || cfg.height > u32::from(u16::MAX) {
            return Err(ChromaError::encoder_init(
                "gif dimensions are limited to 65535",
            ));
        }
        self.cfg = Some(cfg);
        self.frames.clear();
        self.sentinel = None;
        self.warnings.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame) -> ChromaResult<()> {
        if self.cfg.is_none() {
            return Err(ChromaError::encoding("adapter used before begin"));
        }
        if self.sentinel.is_none() {
            self.sentinel = Some(self.choose_sentinel(&frame));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn finish(&mut self) -> ChromaResult<EncodedArtifact> {
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| ChromaError::encoding("adapter finished before begin"))?;
        if self.frames.is_empty() {
            return Err(ChromaError::encoding("no frames captured"));
        }
        let sentinel = self.sentinel.unwrap_or(SENTINEL_CANDIDATES[0]);

        let width = cfg.width as u16;
        let height = cfg.height as u16;
        // GIF delays are centiseconds; round to the nearest rather than
        // truncating so 60 fps plays back at 50, not 100.
        let fps = cfg.fps.clamp(1, 100) as u16;
        let delay_cs = ((100 + fps / 2) / fps).max(1);

        let mut bytes = Vec::new();
        {
            let mut encoder = Encoder::new(&mut bytes, width, height, &[])
                .map_err(|e| ChromaError::encoder_init(format!("gif encoder: {e}")))?;
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| ChromaError::encoding(format!("gif repeat: {e}")))?;

            let frames = std::mem::take(&mut self.frames);
            for frame in frames {
                let mut rgba = self.substitute(&frame, sentinel);
                let mut gif_frame =
                    gif::Frame::from_rgba_speed(width, height, &mut rgba, self.opts.speed);
                gif_frame.delay = delay_cs;
                encoder
                    .write_frame(&gif_frame)
                    .map_err(|e| ChromaError::encoding(format!("gif frame: {e}")))?;
            }
        }

        if bytes.len() < self.opts.min_artifact_bytes {
            // Usually a key misconfiguration (everything transparent), not an
            // encoder defect, so warn and deliver.
            self.warnings.push(ExportWarning::ArtifactSuspiciouslySmall {
                bytes: bytes.len(),
                floor_bytes: self.opts.min_artifact_bytes,
            });
        }

        Ok(EncodedArtifact::new(bytes, "image/gif", "export.gif"))
    }

    fn abort(&mut self) {
        self.cfg = None;
        self.frames.clear();
        self.sentinel = None;
    }

    fn take_warnings(&mut self) -> Vec<ExportWarning> {
        std::mem::take(&mut self.warnings)
    }
}
