use crate::error::{ChromaError, ChromaResult};

/// One classified frame: straight-alpha RGBA8, immutable once built.
///
/// Ownership is exclusive to whichever adapter consumes it; nothing upstream
/// retains frames, which is what bounds job memory.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// RGBA8 quadruples, `width * height * 4` bytes.
    pub data: Vec<u8>,
    /// Position in the capture sequence, 0-based and gap-free.
    pub index: u64,
    /// Nominal source timestamp, `index / fps`.
    pub timestamp_sec: f64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        index: u64,
        timestamp_sec: f64,
    ) -> ChromaResult<Self> {
        if width == 0 || height == 0 {
            return Err(ChromaError::validation("frame width/height must be > 0"));
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(ChromaError::validation(format!(
                "frame buffer size mismatch: got {} bytes, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            index,
            timestamp_sec,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let off = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ])
    }
}

/// A finished export: bytes plus what the persistence collaborator needs to
/// file them away.
#[derive(Clone, Debug)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

impl EncodedArtifact {
    pub fn new(bytes: Vec<u8>, content_type: &'static str, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type,
            file_name: file_name.into(),
        }
    }
}
