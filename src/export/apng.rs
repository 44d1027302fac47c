use crate::{
    error::{ChromaError, ChromaResult, ExportWarning},
    export::{AdapterConfig, EncoderAdapter},
    frame::{EncodedArtifact, Frame},
};

/// Options for the batched animated-image adapter.
#[derive(Clone, Debug)]
pub struct ApngOpts {
    /// Frames per independently encoded batch.
    pub batch_size: usize,
    /// Raw pixel bytes the adapter may retain for the whole-sequence second
    /// pass. Overflow degrades to the first batch instead of failing.
    pub memory_budget_bytes: usize,
    /// APNG play count; 0 loops forever.
    pub num_plays: u32,
}

impl Default for ApngOpts {
    fn default() -> Self {
        Self {
            batch_size: 50,
            memory_budget_bytes: 512 << 20,
            num_plays: 0,
        }
    }
}

impl ApngOpts {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }
}

/// Batched animated-image adapter (APNG).
///
/// Frames are partitioned into fixed-size batches, each encoded to a
/// self-contained APNG as it fills (every APNG frame here is a full-frame
/// replace, so each batch starts on a keyframe). `finish` then attempts a
/// whole-sequence re-encode for a single consistent artifact; if the retained
/// frames blew the memory budget, or the re-encode itself fails, the first
/// batch is delivered instead with an `EncodingDegraded` warning. Best
/// effort, never silently empty.
pub struct ApngAdapter {
    opts: ApngOpts,
    cfg: Option<AdapterConfig>,
    batch: Vec<Frame>,
    batch_artifacts: Vec<(Vec<u8>, u64)>,
    retained: Vec<Frame>,
    retained_bytes: usize,
    budget_blown: bool,
    pushed: u64,
    warnings: Vec<ExportWarning>,
}

impl ApngAdapter {
    #[must_use]
    pub fn new(opts: ApngOpts) -> Self {
        Self {
            opts,
            cfg: None,
            batch: Vec::new(),
            batch_artifacts: Vec::new(),
            retained: Vec::new(),
            retained_bytes: 0,
            budget_blown: false,
            pushed: 0,
            warnings: Vec::new(),
        }
    }

    /// Frame counts of the batches encoded so far.
    pub fn batch_sizes(&self) -> Vec<u64> {
        self.batch_artifacts.iter().map(|(_, n)| *n).collect()
    }

    fn flush_batch(&mut self) -> ChromaResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let cfg = self
            .cfg
            .ok_or_else(|| ChromaError::encoding("adapter used before begin"))?;
        let bytes = encode_apng(&self.batch, cfg, self.opts.num_plays)?;
        self.batch_artifacts
            .push((bytes, self.batch.len() as u64));
        self.batch.clear();
        Ok(())
    }
}

impl EncoderAdapter for ApngAdapter {
    fn begin(&mut self, cfg: AdapterConfig) -> ChromaResult<()> {
        self.cfg = Some(cfg);
        self.batch.clear();
        self.batch_artifacts.clear();
        self.retained.clear();
        self.retained_bytes = 0;
        self.budget_blown = false;
        self.pushed = 0;
        self.warnings.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame) -> ChromaResult<()> {
        if self.cfg.is_none() {
            return Err(ChromaError::encoding("adapter used before begin"));
        }
        self.pushed += 1;

        if !self.budget_blown {
            self.retained_bytes += frame.data.len();
            if self.retained_bytes > self.opts.memory_budget_bytes {
                // The whole-sequence pass is off the table; free what we
                // held, the batch artifacts still cover every frame.
                tracing::warn!(
                    retained_bytes = self.retained_bytes,
                    budget = self.opts.memory_budget_bytes,
                    "whole-sequence retention exceeds memory budget"
                );
                self.retained.clear();
                self.budget_blown = true;
            } else {
                self.retained.push(frame.clone());
            }
        }

        self.batch.push(frame);
        if self.batch.len() >= self.opts.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> ChromaResult<EncodedArtifact> {
        let cfg = self
            .cfg
            .ok_or_else(|| ChromaError::encoding("adapter finished before begin"))?;
        self.flush_batch()?;
        if self.batch_artifacts.is_empty() {
            return Err(ChromaError::encoding("no frames captured"));
        }

        if !self.budget_blown {
            match encode_apng(&self.retained, cfg, self.opts.num_plays) {
                Ok(bytes) => {
                    self.retained.clear();
                    return Ok(EncodedArtifact::new(bytes, "image/apng", "export.png"));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "whole-sequence re-encode failed, degrading");
                }
            }
        }

        // Fallback: deliver the first self-contained batch.
        let (bytes, delivered) = self.batch_artifacts[0].clone();
        self.warnings.push(ExportWarning::EncodingDegraded {
            requested_frames: self.pushed,
            delivered_frames: delivered,
        });
        Ok(EncodedArtifact::new(bytes, "image/apng", "export.png"))
    }

    fn abort(&mut self) {
        self.cfg = None;
        self.batch.clear();
        self.batch_artifacts.clear();
        self.retained.clear();
        self.retained_bytes = 0;
    }

    fn take_warnings(&mut self) -> Vec<ExportWarning> {
        std::mem::take(&mut self.warnings)
    }
}

/// Encode a frame run as one APNG with a single global loop descriptor and a
/// uniform per-frame delay derived from the job fps.
fn encode_apng(frames: &[Frame], cfg: AdapterConfig, num_plays: u32) -> ChromaResult<Vec<u8>> {
    if frames.is_empty() {
        return Err(ChromaError::encoding("cannot encode an empty frame run"));
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, cfg.width, cfg.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .set_animated(frames.len() as u32, num_plays)
            .map_err(|e| ChromaError::encoder_init(format!("apng animation control: {e}")))?;
        encoder
            .set_frame_delay(1, cfg.fps.clamp(1, u32::from(u16::MAX)) as u16)
            .map_err(|e| ChromaError::encoder_init(format!("apng frame delay: {e}")))?;

        let mut writer = encoder
            .write_header()
            .map_err(|e| ChromaError::encoder_init(format!("apng header: {e}")))?;
        for frame in frames {
            writer
                .write_image_data(&frame.data)
                .map_err(|e| ChromaError::encoding(format!("apng frame: {e}")))?;
        }
        writer
            .finish()
            .map_err(|e| ChromaError::encoding(format!("apng finalize: {e}")))?;
    }
    Ok(out)
}
