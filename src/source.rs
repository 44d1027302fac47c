use std::path::{Path, PathBuf};

use crate::error::{ChromaError, ChromaResult};

/// Result of a seek or readiness poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekState {
    /// A decoded frame at or after the requested timestamp is available.
    Ready,
    /// The source is still decoding; poll again.
    Pending,
    /// The last decodable frame precedes the requested timestamp.
    PastEnd,
}

/// A seekable/playable frame provider.
///
/// The capture sequencer owns the source exclusively for the duration of one
/// job; only one job may run against a source at a time.
pub trait FrameSource: Send {
    fn duration_sec(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    /// Begin decoding at `timestamp_sec`. May complete synchronously.
    fn seek(&mut self, timestamp_sec: f64) -> ChromaResult<SeekState>;

    /// Re-check readiness after a `Pending` seek.
    fn poll_ready(&mut self) -> ChromaResult<SeekState>;

    /// Snapshot the currently decoded frame as straight-alpha RGBA8.
    fn current_frame(&mut self) -> ChromaResult<Vec<u8>>;

    /// Start free-running playback (used by the time-driven recorder).
    fn play(&mut self) -> ChromaResult<()> {
        Ok(())
    }

    fn pause(&mut self) -> ChromaResult<()> {
        Ok(())
    }
}

/// Probed metadata for an ffmpeg-backed source.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
}

impl SourceInfo {
    pub fn source_fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

/// Frame source backed by the system `ffprobe`/`ffmpeg` binaries.
///
/// Decoding is synchronous, so a successful seek is immediately `Ready`;
/// `Pending` never surfaces from this implementation.
pub struct FfmpegFrameSource {
    info: SourceInfo,
    current: Option<Vec<u8>>,
    playhead_sec: f64,
    playing: bool,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path) -> ChromaResult<Self> {
        let info = probe_source(path)?;
        if info.width == 0 || info.height == 0 {
            return Err(ChromaError::source_unavailable(format!(
                "'{}' reports zero dimensions",
                path.display()
            )));
        }
        Ok(Self {
            info,
            current: None,
            playhead_sec: 0.0,
            playing: false,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }
}

impl FrameSource for FfmpegFrameSource {
    fn duration_sec(&self) -> f64 {
        self.info.duration_sec
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn seek(&mut self, timestamp_sec: f64) -> ChromaResult<SeekState> {
        self.playhead_sec = timestamp_sec.max(0.0);
        match decode_frame_rgba8(&self.info, self.playhead_sec)? {
            Some(data) => {
                self.current = Some(data);
                Ok(SeekState::Ready)
            }
            None => Ok(SeekState::PastEnd),
        }
    }

    fn poll_ready(&mut self) -> ChromaResult<SeekState> {
        if self.current.is_some() {
            Ok(SeekState::Ready)
        } else {
            Ok(SeekState::PastEnd)
        }
    }

    fn current_frame(&mut self) -> ChromaResult<Vec<u8>> {
        if self.playing {
            // Free-running mode decodes at the playhead and advances it by the
            // source's own frame cadence.
            let step = {
                let fps = self.info.source_fps();
                if fps > 0.0 { 1.0 / fps } else { 1.0 / 30.0 }
            };
            let data = decode_frame_rgba8(&self.info, self.playhead_sec)?.ok_or_else(|| {
                ChromaError::source_unavailable("playback ran past the last decodable frame")
            })?;
            self.playhead_sec += step;
            self.current = Some(data.clone());
            return Ok(data);
        }

        self.current.clone().ok_or_else(|| {
            ChromaError::source_unavailable("no decoded frame available (seek first)")
        })
    }

    fn play(&mut self) -> ChromaResult<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> ChromaResult<()> {
        self.playing = false;
        Ok(())
    }
}

#[cfg(feature = "media-ffmpeg")]
fn probe_source(path: &Path) -> ChromaResult<SourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ChromaError::source_unavailable(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ChromaError::source_unavailable(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ChromaError::source_unavailable(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ChromaError::source_unavailable("no video stream found"))?;
    let width = video
        .width
        .ok_or_else(|| ChromaError::source_unavailable("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| ChromaError::source_unavailable("missing video height from ffprobe"))?;
    let (fps_num, fps_den) = parse_ff_ratio(video.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| ChromaError::source_unavailable("invalid video r_frame_rate"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(SourceInfo {
        path: path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn probe_source(_path: &Path) -> ChromaResult<SourceInfo> {
    Err(ChromaError::source_unavailable(
        "video sources require the 'media-ffmpeg' feature",
    ))
}

/// Decode the single frame at or after `timestamp_sec` as straight RGBA8.
/// `Ok(None)` means the timestamp lies past the last decodable frame.
#[cfg(feature = "media-ffmpeg")]
fn decode_frame_rgba8(info: &SourceInfo, timestamp_sec: f64) -> ChromaResult<Option<Vec<u8>>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{timestamp_sec:.9}")])
        .arg("-i")
        .arg(&info.path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| {
            ChromaError::source_unavailable(format!("failed to run ffmpeg for decode: {e}"))
        })?;

    if !out.status.success() {
        return Err(ChromaError::source_unavailable(format!(
            "ffmpeg decode failed for '{}': {}",
            info.path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected = info.width as usize * info.height as usize * 4;
    if out.stdout.is_empty() {
        return Ok(None);
    }
    if out.stdout.len() < expected {
        return Err(ChromaError::source_unavailable(format!(
            "decoded frame has invalid size: got {} bytes, expected {expected}",
            out.stdout.len()
        )));
    }
    Ok(Some(out.stdout[..expected].to_vec()))
}

#[cfg(not(feature = "media-ffmpeg"))]
fn decode_frame_rgba8(_info: &SourceInfo, _timestamp_sec: f64) -> ChromaResult<Option<Vec<u8>>> {
    Err(ChromaError::source_unavailable(
        "video sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}

/// Procedural in-memory source for tests and debugging.
///
/// Can simulate decode latency (`Pending` polls per seek) and media that ends
/// before its nominal duration.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    duration_sec: f64,
    fill: Box<dyn Fn(f64, u32, u32) -> Vec<u8> + Send>,
    seek_latency_polls: u32,
    polls_left: u32,
    decodable_until_sec: Option<f64>,
    current: Option<Vec<u8>>,
    last_seek_sec: f64,
    playhead_sec: f64,
    play_step_sec: f64,
    playing: bool,
}

impl SyntheticSource {
    pub fn new(
        width: u32,
        height: u32,
        duration_sec: f64,
        fill: impl Fn(f64, u32, u32) -> Vec<u8> + Send + 'static,
    ) -> Self {
        Self {
            width,
            height,
            duration_sec,
            fill: Box::new(fill),
            seek_latency_polls: 0,
            polls_left: 0,
            decodable_until_sec: None,
            current: None,
            last_seek_sec: 0.0,
            playhead_sec: 0.0,
            play_step_sec: 1.0 / 30.0,
            playing: false,
        }
    }

    /// Uniform solid-color source.
    pub fn solid(width: u32, height: u32, duration_sec: f64, rgba: [u8; 4]) -> Self {
        Self::new(width, height, duration_sec, move |_, w, h| {
            rgba.repeat(w as usize * h as usize)
        })
    }

    /// Every seek reports `Pending` for `polls` readiness checks.
    #[must_use]
    pub fn with_seek_latency(mut self, polls: u32) -> Self {
        self.seek_latency_polls = polls;
        self
    }

    /// Seeks past this point report `PastEnd`, simulating media whose last
    /// decodable frame precedes its nominal duration.
    #[must_use]
    pub fn with_decodable_until(mut self, sec: f64) -> Self {
        self.decodable_until_sec = Some(sec);
        self
    }

    /// Playhead advance per free-running `current_frame` sample.
    #[must_use]
    pub fn with_play_step(mut self, sec: f64) -> Self {
        self.play_step_sec = sec;
        self
    }

    fn produce(&mut self, timestamp_sec: f64) -> Vec<u8> {
        (self.fill)(timestamp_sec, self.width, self.height)
    }
}

impl FrameSource for SyntheticSource {
    fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn seek(&mut self, timestamp_sec: f64) -> ChromaResult<SeekState> {
        if let Some(end) = self.decodable_until_sec
            && timestamp_sec > end
        {
            return Ok(SeekState::PastEnd);
        }
        if timestamp_sec > self.duration_sec {
            return Ok(SeekState::PastEnd);
        }

        self.last_seek_sec = timestamp_sec;
        if self.seek_latency_polls > 0 {
            self.current = None;
            self.polls_left = self.seek_latency_polls;
            return Ok(SeekState::Pending);
        }
        let frame = self.produce(timestamp_sec);
        self.current = Some(frame);
        Ok(SeekState::Ready)
    }

    fn poll_ready(&mut self) -> ChromaResult<SeekState> {
        if self.current.is_some() {
            return Ok(SeekState::Ready);
        }
        if self.polls_left > 1 {
            self.polls_left -= 1;
            return Ok(SeekState::Pending);
        }
        self.polls_left = 0;
        let frame = self.produce(self.last_seek_sec);
        self.current = Some(frame);
        Ok(SeekState::Ready)
    }

    fn current_frame(&mut self) -> ChromaResult<Vec<u8>> {
        if self.playing {
            let frame = self.produce(self.playhead_sec);
            self.playhead_sec += self.play_step_sec;
            return Ok(frame);
        }
        self.current.clone().ok_or_else(|| {
            ChromaError::source_unavailable("no decoded frame available (seek first)")
        })
    }

    fn play(&mut self) -> ChromaResult<()> {
        self.playing = true;
        self.playhead_sec = 0.0;
        Ok(())
    }

    fn pause(&mut self) -> ChromaResult<()> {
        self.playing = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_seek_and_snapshot() {
        let mut src = SyntheticSource::solid(4, 4, 2.0, [0, 255, 0, 255]);
        assert_eq!(src.seek(0.5).unwrap(), SeekState::Ready);
        let frame = src.current_frame().unwrap();
        assert_eq!(frame.len(), 4 * 4 * 4);
        assert_eq!(&frame[..4], &[0, 255, 0, 255]);
    }

    #[test]
    fn synthetic_reports_past_end() {
        let mut src = SyntheticSource::solid(2, 2, 2.0, [0, 0, 0, 255]).with_decodable_until(1.0);
        assert_eq!(src.seek(0.9).unwrap(), SeekState::Ready);
        assert_eq!(src.seek(1.1).unwrap(), SeekState::PastEnd);
        assert_eq!(src.seek(5.0).unwrap(), SeekState::PastEnd);
    }

    #[test]
    fn synthetic_seek_latency_resolves_after_polls() {
        let mut src = SyntheticSource::solid(2, 2, 2.0, [1, 2, 3, 255]).with_seek_latency(3);
        assert_eq!(src.seek(0.0).unwrap(), SeekState::Pending);
        assert_eq!(src.poll_ready().unwrap(), SeekState::Pending);
        assert_eq!(src.poll_ready().unwrap(), SeekState::Pending);
        assert_eq!(src.poll_ready().unwrap(), SeekState::Ready);
        assert!(src.current_frame().is_ok());
    }

    #[test]
    fn synthetic_playback_advances_by_step() {
        let mut src = SyntheticSource::new(1, 1, 1.0, |t, _, _| {
            vec![(t * 100.0).round() as u8, 0, 0, 255]
        })
        .with_play_step(0.1);
        src.play().unwrap();
        assert_eq!(src.current_frame().unwrap()[0], 0);
        assert_eq!(src.current_frame().unwrap()[0], 10);
        assert_eq!(src.current_frame().unwrap()[0], 20);
        src.pause().unwrap();
    }

    #[test]
    fn current_frame_without_seek_fails() {
        let mut src = SyntheticSource::solid(2, 2, 1.0, [0, 0, 0, 255]);
        assert!(matches!(
            src.current_frame(),
            Err(crate::error::ChromaError::SourceUnavailable(_))
        ));
    }

    #[cfg(feature = "media-ffmpeg")]
    #[test]
    fn ratio_parsing() {
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
        assert_eq!(parse_ff_ratio("0/0"), None);
        assert_eq!(parse_ff_ratio("garbage"), None);
    }
}
