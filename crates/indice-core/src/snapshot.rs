use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Write-once store for raw upstream documents and normalized row sets.
///
/// Files are named `<prefix>_<YYYYmmdd_HHMMSS>_<sha8>.<ext>`; the content hash
/// keeps two captures within the same second apart.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn persist_bytes(&self, prefix: &str, ext: &str, blob: &[u8]) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create snapshot dir {}", self.dir.display()))?;
        let digest = hex::encode(Sha256::digest(blob));
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .dir
            .join(format!("{}_{}_{}.{}", prefix, stamp, &digest[..8], ext));
        std::fs::write(&path, blob)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        tracing::debug!(event = "snapshot.written", path = %path.display(), bytes = blob.len());
        Ok(path)
    }

    pub fn persist_text(&self, prefix: &str, ext: &str, text: &str) -> anyhow::Result<PathBuf> {
        self.persist_bytes(prefix, ext, text.as_bytes())
    }

    /// Serializes `rows` as CSV. Returns `None` for an empty set.
    pub fn persist_csv<T: Serialize>(
        &self,
        prefix: &str,
        rows: &[T],
    ) -> anyhow::Result<Option<PathBuf>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let blob = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush csv snapshot: {}", e.error()))?;
        self.persist_bytes(prefix, "csv", &blob).map(Some)
    }
}
