use std::{sync::Arc, time::Duration};

use crate::{
    classify::classify_frame,
    config::ChromaKeyConfig,
    error::{ChromaError, ChromaResult},
    frame::Frame,
    job::ExportJob,
    source::{FrameSource, SeekState},
};

const DEFAULT_POLL_BUDGET: u32 = 600;
const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(50);

/// Lazy, finite, non-restartable producer of classified frames.
///
/// Seeks the source to `i / fps` for each frame index, waits for decode
/// readiness within a bounded poll budget, snapshots the pixels, classifies
/// them, and yields `Frame`s in strictly increasing index order. Cancellation
/// and early source end both terminate the sequence cleanly; readiness budget
/// exhaustion is fatal.
pub struct CaptureSequencer<'a> {
    source: &'a mut dyn FrameSource,
    key: &'a ChromaKeyConfig,
    job: &'a ExportJob,
    next_index: u64,
    finished: bool,
    classify: bool,
    poll_budget: u32,
    poll_backoff: Duration,
}

impl<'a> CaptureSequencer<'a> {
    pub fn new(
        source: &'a mut dyn FrameSource,
        key: &'a ChromaKeyConfig,
        job: &'a ExportJob,
    ) -> ChromaResult<Self> {
        key.validate()?;
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(ChromaError::validation(
                "source width/height must be non-zero",
            ));
        }
        Ok(Self {
            source,
            key,
            job,
            next_index: 0,
            finished: false,
            classify: true,
            poll_budget: DEFAULT_POLL_BUDGET,
            poll_backoff: DEFAULT_POLL_BACKOFF,
        })
    }

    /// Skip classification and yield raw source pixels, for adapters that
    /// need a different representation.
    #[must_use]
    pub fn raw_frames(mut self) -> Self {
        self.classify = false;
        self
    }

    #[must_use]
    pub fn with_poll_budget(mut self, budget: u32, backoff: Duration) -> Self {
        self.poll_budget = budget.max(1);
        self.poll_backoff = backoff;
        self
    }

    /// Frames emitted so far. After the iterator returns `None` this is the
    /// final count, which may be lower than `job.total_frames` if the source
    /// ended early.
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    /// Seek and wait for readiness. `Ok(None)` means the source ended before
    /// this timestamp.
    fn await_frame(&mut self, timestamp_sec: f64) -> ChromaResult<Option<Vec<u8>>> {
        let mut state = self.source.seek(timestamp_sec)?;
        let mut polls = 0u32;
        loop {
            match state {
                SeekState::Ready => return self.source.current_frame().map(Some),
                SeekState::PastEnd => return Ok(None),
                SeekState::Pending => {
                    polls += 1;
                    if polls > self.poll_budget {
                        return Err(ChromaError::source_unavailable(format!(
                            "decode not ready at t={timestamp_sec:.3}s after {polls} polls"
                        )));
                    }
                    std::thread::sleep(self.poll_backoff);
                    state = self.source.poll_ready()?;
                }
            }
        }
    }
}

impl Iterator for CaptureSequencer<'_> {
    type Item = ChromaResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.next_index >= self.job.total_frames {
            self.finished = true;
            return None;
        }
        // Cooperative cancellation: checked before each capture, never
        // mid-frame.
        if self.job.is_cancelled() {
            self.finished = true;
            return None;
        }

        let index = self.next_index;
        let timestamp_sec = index as f64 / f64::from(self.job.fps);

        let mut data = match self.await_frame(timestamp_sec) {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(index, "source ended before requested timestamp");
                self.finished = true;
                return None;
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        let (width, height) = self.source.dimensions();
        if self.classify
            && let Err(e) = classify_frame(&mut data, width, self.key)
        {
            self.finished = true;
            return Some(Err(e));
        }

        let frame = match Frame::new(width, height, data, index, timestamp_sec) {
            Ok(frame) => frame,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        self.next_index += 1;
        self.job.advance();
        Some(Ok(frame))
    }
}

/// Run a sequencer on a worker thread feeding a bounded channel.
///
/// The channel capacity is what bounds memory when the consumer is slower
/// than the producer; the producer blocks on a full channel and stops on
/// cancellation or a dropped receiver.
pub fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    key: ChromaKeyConfig,
    job: Arc<ExportJob>,
) -> (
    crossbeam_channel::Receiver<ChromaResult<Frame>>,
    std::thread::JoinHandle<u64>,
) {
    let (tx, rx) = crossbeam_channel::bounded::<ChromaResult<Frame>>(8);
    let handle = std::thread::spawn(move || {
        let sequencer = match CaptureSequencer::new(source.as_mut(), &key, &job) {
            Ok(sequencer) => sequencer,
            Err(e) => {
                let _ = tx.send(Err(e));
                return 0;
            }
        };
        let mut emitted = 0u64;
        for item in sequencer {
            let stop = item.is_err();
            if !stop {
                emitted += 1;
            }
            if tx.send(item).is_err() {
                // Receiver dropped; the consumer is gone.
                break;
            }
            if stop {
                break;
            }
        }
        emitted
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::{ExportFormat, ExportJob},
        source::SyntheticSource,
    };

    fn green_source(duration_sec: f64) -> SyntheticSource {
        SyntheticSource::solid(4, 4, duration_sec, [0, 255, 0, 255])
    }

    #[test]
    fn emits_exactly_total_frames_in_order() {
        let mut src = green_source(1.0);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 1.0).unwrap();

        let frames: Vec<_> = CaptureSequencer::new(&mut src, &key, &job)
            .unwrap()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(frames.len(), 10);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i as u64);
            assert!((frame.timestamp_sec - i as f64 / 10.0).abs() < 1e-9);
            // Solid green keys to fully transparent.
            assert_eq!(frame.pixel(0, 0).unwrap()[3], 0);
        }
        assert_eq!(job.progress(), 10);
    }

    #[test]
    fn early_source_end_truncates_without_error() {
        let mut src = green_source(2.0).with_decodable_until(0.95);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 2.0).unwrap();
        assert_eq!(job.total_frames, 20);

        let mut sequencer = CaptureSequencer::new(&mut src, &key, &job).unwrap();
        let mut indices = Vec::new();
        for item in sequencer.by_ref() {
            indices.push(item.unwrap().index);
        }
        // Frames 0..=9 are at t <= 0.9; frame 10 at t=1.0 is past end.
        assert_eq!(indices, (0..10).collect::<Vec<u64>>());
        assert_eq!(sequencer.emitted(), 10);
    }

    #[test]
    fn pending_seeks_resolve_within_budget() {
        let mut src = green_source(1.0).with_seek_latency(2);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 5, 1.0).unwrap();

        let count = CaptureSequencer::new(&mut src, &key, &job)
            .unwrap()
            .with_poll_budget(10, Duration::from_millis(1))
            .map(|f| f.unwrap())
            .count();
        assert_eq!(count, 5);
    }

    #[test]
    fn exhausted_poll_budget_is_source_unavailable() {
        let mut src = green_source(1.0).with_seek_latency(100);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 5, 1.0).unwrap();

        let mut sequencer = CaptureSequencer::new(&mut src, &key, &job)
            .unwrap()
            .with_poll_budget(3, Duration::from_millis(1));
        let first = sequencer.next().unwrap();
        assert!(matches!(first, Err(ChromaError::SourceUnavailable(_))));
        // Fatal: the sequence terminates.
        assert!(sequencer.next().is_none());
    }

    #[test]
    fn cancellation_stops_within_one_step() {
        let mut src = green_source(10.0);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 10, 10.0).unwrap();
        let token = job.cancel_token();

        let mut sequencer = CaptureSequencer::new(&mut src, &key, &job).unwrap();
        for _ in 0..10 {
            sequencer.next().unwrap().unwrap();
        }
        token.cancel();
        assert!(sequencer.next().is_none());
        assert_eq!(sequencer.emitted(), 10);
    }

    #[test]
    fn raw_frames_skip_classification() {
        let mut src = green_source(1.0);
        let key = ChromaKeyConfig::default();
        let job = ExportJob::new(ExportFormat::ImageSequence, 2, 1.0).unwrap();

        let frames: Vec<_> = CaptureSequencer::new(&mut src, &key, &job)
            .unwrap()
            .raw_frames()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(frames[0].pixel(0, 0).unwrap(), [0, 255, 0, 255]);
    }

    #[test]
    fn spawn_capture_delivers_over_bounded_channel() {
        let src = Box::new(green_source(1.0));
        let key = ChromaKeyConfig::default();
        let job = Arc::new(ExportJob::new(ExportFormat::ImageSequence, 10, 1.0).unwrap());

        let (rx, handle) = spawn_capture(src, key, Arc::clone(&job));
        let frames: Vec<_> = rx.iter().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 10);
        assert_eq!(handle.join().unwrap(), 10);
    }
}
