use std::path::{Path, PathBuf};

/// Scopes a downloaded object to a single temp file, removed on every exit
/// path including panics ( "temp file is released on every exit
/// path").
pub struct ScopedTempFile {
    path: PathBuf,
}

impl ScopedTempFile {
    pub async fn write(bytes: &[u8], suffix: &str) -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("novatune-{}{suffix}", ulid::Ulid::new()));
        tokio::fs::write(&path, bytes).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

