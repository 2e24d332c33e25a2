//! Scoped temporary storage for uploaded audio.
//!
//! The upload is spilled to a uniquely named file in the system temp
//! directory so the decoder can probe it from disk. The original
//! extension is kept as the suffix because the decoder uses it as a
//! format hint. The file is removed when the handle goes out of scope,
//! on the success path and on every error path alike.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::upload::validator::file_extension;

pub struct TempUpload {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl TempUpload {
    /// Persists `bytes` to a fresh temp file named after a v4 uuid,
    /// carrying over the extension of `filename`.
    pub fn write(filename: &str, bytes: &[u8]) -> std::io::Result<TempUpload> {
        let prefix = format!("genre-upload-{}-", Uuid::new_v4());
        let suffix = file_extension(filename).map(|ext| format!(".{}", ext));

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        if let Some(suffix) = &suffix {
            builder.suffix(suffix);
        }

        let mut file = builder.tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.path().to_path_buf();
        log::debug!("Stored upload at {}", path.display());

        Ok(TempUpload {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                log::warn!("Failed to remove temp file {}: {}", self.path.display(), e);
            }
        }
    }
}
