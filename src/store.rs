use std::path::{Path, PathBuf};

use crate::{
    error::{ChromaError, ChromaResult},
    frame::EncodedArtifact,
};

/// Persistence collaborator: files an artifact away and returns a location
/// identifier. The core only ever depends on pass/fail.
pub trait ArtifactStore {
    fn put(&self, artifact: &EncodedArtifact) -> ChromaResult<String>;
}

/// Filesystem-backed store writing artifacts under a root directory.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn ensure_dir(path: &Path) -> ChromaResult<()> {
    use anyhow::Context as _;
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create output directory '{}'", path.display()))?;
    Ok(())
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, artifact: &EncodedArtifact) -> ChromaResult<String> {
        ensure_dir(&self.root)?;
        let path = self.root.join(&artifact.file_name);
        std::fs::write(&path, &artifact.bytes).map_err(|e| {
            ChromaError::encoding(format!("failed to write '{}': {e}", path.display()))
        })?;
        Ok(path.display().to_string())
    }
}
