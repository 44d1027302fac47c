use std::io::{Cursor, Write as _};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{
    error::{ChromaError, ChromaResult},
    export::{AdapterConfig, EncoderAdapter},
    frame::{EncodedArtifact, Frame},
};

/// Lossless image-sequence adapter: one PNG per frame, fixed-width zero-padded
/// names, bundled into a single ZIP.
///
/// No cross-frame state; a single frame failing to serialize fails the whole
/// job.
pub struct FramesZipAdapter {
    writer: Option<ZipWriter<Cursor<Vec<u8>>>>,
    cfg: Option<AdapterConfig>,
    count: u64,
}

impl FramesZipAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: None,
            cfg: None,
            count: 0,
        }
    }
}

impl Default for FramesZipAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_png(frame: &Frame) -> ChromaResult<Vec<u8>> {
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| ChromaError::validation("frame buffer does not match its dimensions"))?;
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ChromaError::encoding(format!("png encode failed: {e}")))?;
    Ok(bytes)
}

impl EncoderAdapter for FramesZipAdapter {
    fn begin(&mut self, cfg: AdapterConfig) -> ChromaResult<()> {
        self.writer = Some(ZipWriter::new(Cursor::new(Vec::new())));
        self.cfg = Some(cfg);
        self.count = 0;
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame) -> ChromaResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ChromaError::encoding("adapter used before begin"))?;

        let png = encode_png(&frame)?;
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(format!("frame_{:06}.png", frame.index), options)
            .map_err(|e| ChromaError::encoding(format!("zip entry failed: {e}")))?;
        writer
            .write_all(&png)
            .map_err(|e| ChromaError::encoding(format!("zip write failed: {e}")))?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> ChromaResult<EncodedArtifact> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| ChromaError::encoding("adapter finished before begin"))?;
        if self.count == 0 {
            return Err(ChromaError::encoding("no frames captured"));
        }
        let cursor = writer
            .finish()
            .map_err(|e| ChromaError::encoding(format!("zip finalize failed: {e}")))?;
        Ok(EncodedArtifact::new(
            cursor.into_inner(),
            "application/zip",
            "frames.zip",
        ))
    }

    fn abort(&mut self) {
        self.writer = None;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, rgba: [u8; 4]) -> Frame {
        Frame::new(4, 4, rgba.repeat(16), index, index as f64 / 10.0).unwrap()
    }

    fn begin_adapter() -> FramesZipAdapter {
        let mut adapter = FramesZipAdapter::new();
        adapter
            .begin(AdapterConfig {
                width: 4,
                height: 4,
                fps: 10,
                total_frames: 3,
            })
            .unwrap();
        adapter
    }

    #[test]
    fn produces_zip_with_zero_padded_entries() {
        let mut adapter = begin_adapter();
        for i in 0..3 {
            adapter.push_frame(frame(i, [255, 0, 0, 255])).unwrap();
        }
        let artifact = adapter.finish().unwrap();
        assert_eq!(artifact.content_type, "application/zip");
        // Local file header magic.
        assert_eq!(&artifact.bytes[..4], b"PK\x03\x04");

        let mut archive = zip::ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(archive.len(), 3);
        for i in 0..3 {
            let name = format!("frame_{i:06}.png");
            let entry = archive.by_name(&name).unwrap();
            assert!(entry.size() > 0);
        }
    }

    #[test]
    fn entries_decode_back_to_pixels() {
        let mut adapter = begin_adapter();
        adapter.push_frame(frame(0, [0, 255, 0, 0])).unwrap();
        let artifact = adapter.finish().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
        let mut entry = archive.by_name("frame_000000.png").unwrap();
        let mut png = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut png).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (4, 4));
        // Lossless: transparency survives the round trip.
        assert_eq!(img.get_pixel(0, 0).0, [0, 255, 0, 0]);
    }

    #[test]
    fn zero_frames_is_an_error() {
        let mut adapter = begin_adapter();
        assert!(adapter.finish().is_err());
    }

    #[test]
    fn abort_discards_everything() {
        let mut adapter = begin_adapter();
        adapter.push_frame(frame(0, [255, 0, 0, 255])).unwrap();
        adapter.abort();
        assert!(adapter.finish().is_err());
    }
}
