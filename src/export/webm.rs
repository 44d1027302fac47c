use std::{
    io::Write as _,
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use crate::{
    classify::classify_frame,
    config::ChromaKeyConfig,
    error::{ChromaError, ChromaResult},
    export::ExportOutcome,
    frame::EncodedArtifact,
    job::{ExportJob, ExportState},
    source::FrameSource,
};

/// Options for the alpha-preserving video recorder.
#[derive(Clone, Debug)]
pub struct WebmOpts {
    /// Pace samples against the wall clock. Disable for sources that are not
    /// actually playing in real time (tests, offline decode).
    pub realtime: bool,
    /// VP9 constant-quality level passed through to ffmpeg.
    pub crf: u32,
}

impl Default for WebmOpts {
    fn default() -> Self {
        Self {
            realtime: true,
            crf: 24,
        }
    }
}

impl WebmOpts {
    #[must_use]
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

/// Alpha-preserving video-container adapter (WebM/VP9, `yuva420p`).
///
/// Time-driven rather than pull-driven: the source plays forward and the
/// recorder samples its current frame at the job's fps interval, trading
/// seek-accurate timing for real-time container packaging. Cancellation stops
/// playback and finalizes whatever ffmpeg has buffered into a truncated but
/// valid artifact.
pub struct WebmRecorder {
    opts: WebmOpts,
}

impl WebmRecorder {
    #[must_use]
    pub fn new(opts: WebmOpts) -> Self {
        Self { opts }
    }

    #[tracing::instrument(skip(self, source, key, job))]
    pub fn record(
        &self,
        source: &mut dyn FrameSource,
        key: &ChromaKeyConfig,
        job: &ExportJob,
    ) -> ChromaResult<ExportOutcome> {
        match self.run(source, key, job) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                job.set_state(ExportState::Failed);
                Err(e)
            }
        }
    }

    fn run(
        &self,
        source: &mut dyn FrameSource,
        key: &ChromaKeyConfig,
        job: &ExportJob,
    ) -> ChromaResult<ExportOutcome> {
        key.validate()?;
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(ChromaError::validation(
                "source width/height must be non-zero",
            ));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(ChromaError::validation(
                "recorder width/height must be even (required for yuva420p output)",
            ));
        }

        if !is_ffmpeg_on_path() {
            return Err(ChromaError::encoder_init(
                "ffmpeg is required for WebM encoding, but was not found on PATH",
            ));
        }

        let dir = tempfile::tempdir()
            .map_err(|e| ChromaError::encoder_init(format!("temp dir for capture: {e}")))?;
        let out_path = dir.path().join("capture.webm");

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &job.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libvpx-vp9",
            "-pix_fmt",
            "yuva420p",
            // Alt-ref frames carry no alpha side data; keep them off.
            "-auto-alt-ref",
            "0",
            "-crf",
            &self.opts.crf.to_string(),
            "-b:v",
            "0",
        ])
        .arg(&out_path);

        let mut child = cmd
            .spawn()
            .map_err(|e| ChromaError::encoder_init(format!("failed to spawn ffmpeg: {e}")))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChromaError::encoder_init("failed to open ffmpeg stdin"))?;

        job.set_state(ExportState::Capturing);
        source.play()?;

        let interval = Duration::from_secs_f64(1.0 / f64::from(job.fps));
        let expected = width as usize * height as usize * 4;
        let mut cancelled = false;
        let mut emitted = 0u64;

        let capture = (|| -> ChromaResult<()> {
            for _ in 0..job.total_frames {
                if job.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let tick = Instant::now();

                let mut data = source.current_frame()?;
                if data.len() != expected {
                    return Err(ChromaError::validation(format!(
                        "sampled frame has {} bytes, expected {expected}",
                        data.len()
                    )));
                }
                classify_frame(&mut data, width, key)?;

                stdin.write_all(&data).map_err(|e| {
                    ChromaError::encoding(format!("failed to write frame to ffmpeg: {e}"))
                })?;
                emitted += 1;
                job.advance();

                if self.opts.realtime {
                    let elapsed = tick.elapsed();
                    if elapsed < interval {
                        std::thread::sleep(interval - elapsed);
                    }
                }
            }
            Ok(())
        })();

        source.pause()?;
        drop(stdin);

        let output = child.wait_with_output().map_err(|e| {
            ChromaError::encoding(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        // Surface the capture error after the child is reaped, so a source
        // failure does not leave a zombie encoder behind.
        capture?;

        if !output.status.success() && !cancelled {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChromaError::encoding(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        job.set_state(ExportState::Encoding);
        // On cancellation the container may hold anything from nothing to the
        // full run so far; whatever is there is finalized and valid.
        let bytes = std::fs::read(&out_path).unwrap_or_default();
        if bytes.is_empty() && !cancelled {
            return Err(ChromaError::encoding("capture produced no output"));
        }
        let artifact = EncodedArtifact::new(bytes, "video/webm", "export.webm");

        let state = if cancelled {
            ExportState::Cancelled
        } else {
            ExportState::Finished
        };
        job.set_state(state);
        Ok(ExportOutcome {
            state,
            // Unlike the pull adapters, cancellation here finalizes whatever
            // was buffered into a truncated artifact.
            artifact: Some(artifact),
            warnings: Vec::new(),
            frames_emitted: emitted,
        })
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
