use chrono::{DateTime, Utc};
use inflow_core::{CategorizedTransaction, ImportId, SourceDialect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use crate::error::StorageError;

/// The categorized rows of one import, held until confirm or cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedPreview {
    pub import_id: ImportId,
    pub filename: String,
    pub source_dialect: SourceDialect,
    pub row_count: usize,
    pub transactions: Vec<CategorizedTransaction>,
    pub errors: Vec<String>,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Keyed holding area for staged previews and raw uploads. One preview per
/// import id: `put` replaces whatever was there.
pub trait PreviewStore: Send + Sync {
    fn put(&self, preview: &StagedPreview) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get(
        &self,
        id: ImportId,
    ) -> impl Future<Output = Result<Option<StagedPreview>, StorageError>> + Send;

    /// Keep the raw upload next to its preview.
    fn stage_upload(
        &self,
        id: ImportId,
        filename: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Drop the preview and the raw upload of `id`. Missing entries are fine.
    fn purge(&self, id: ImportId) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Remove every entry older than `max_age`. Individual failures are
    /// logged and counted, never fatal.
    fn sweep_expired(&self, max_age: Duration) -> impl Future<Output = SweepReport> + Send;
}

/// Reduce an uploaded filename to a safe single path component.
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Filesystem store ─────────────────────────────────────────────────────────

/// Layout: `<dir>/<id>.json` for previews, `<dir>/<id>_<filename>` for
/// uploads.
#[derive(Debug, Clone)]
pub struct FsPreviewStore {
    dir: PathBuf,
}

impl FsPreviewStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn preview_path(&self, id: ImportId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn upload_path(&self, id: ImportId, filename: &str) -> PathBuf {
        self.dir.join(format!("{id}_{}", sanitize_filename(filename)))
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

impl PreviewStore for FsPreviewStore {
    async fn put(&self, preview: &StagedPreview) -> Result<(), StorageError> {
        let json = serde_json::to_vec(preview)?;
        let dest = self.preview_path(preview.import_id);
        // Write then rename so readers never see a half-written preview.
        let tmp = dest.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &dest).await?;
        Ok(())
    }

    async fn get(&self, id: ImportId) -> Result<Option<StagedPreview>, StorageError> {
        match tokio::fs::read(self.preview_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn stage_upload(&self, id: ImportId, filename: &str, content: &[u8]) -> Result<(), StorageError> {
        tokio::fs::write(self.upload_path(id, filename), content).await?;
        Ok(())
    }

    async fn purge(&self, id: ImportId) -> Result<(), StorageError> {
        remove_if_exists(&self.preview_path(id)).await?;

        let prefix = format!("{id}_");
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                remove_if_exists(&entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn sweep_expired(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot scan staging directory");
                return report;
            }
        };
        let now = SystemTime::now();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Staging directory scan interrupted");
                    report.failed += 1;
                    break;
                }
            };
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if !meta.is_file() => continue,
                Ok(meta) => meta.modified(),
                Err(e) => Err(e),
            };
            let modified = match modified {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cannot stat staged file");
                    report.failed += 1;
                    continue;
                }
            };
            // Future mtimes (clock skew) count as fresh.
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed expired staged file");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired staged file");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

// ── In-memory store ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryEntries {
    previews: HashMap<ImportId, (StagedPreview, Instant)>,
    uploads: HashMap<ImportId, (String, Vec<u8>, Instant)>,
}

/// Process-local store for tests and single-shot CLI runs.
#[derive(Default)]
pub struct MemoryPreviewStore {
    entries: Mutex<MemoryEntries>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryEntries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn upload(&self, id: ImportId) -> Option<(String, Vec<u8>)> {
        self.lock()
            .uploads
            .get(&id)
            .map(|(name, bytes, _)| (name.clone(), bytes.clone()))
    }

    pub fn len(&self) -> usize {
        let entries = self.lock();
        entries.previews.len() + entries.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreviewStore for MemoryPreviewStore {
    async fn put(&self, preview: &StagedPreview) -> Result<(), StorageError> {
        self.lock()
            .previews
            .insert(preview.import_id, (preview.clone(), Instant::now()));
        Ok(())
    }

    async fn get(&self, id: ImportId) -> Result<Option<StagedPreview>, StorageError> {
        Ok(self.lock().previews.get(&id).map(|(p, _)| p.clone()))
    }

    async fn stage_upload(&self, id: ImportId, filename: &str, content: &[u8]) -> Result<(), StorageError> {
        self.lock()
            .uploads
            .insert(id, (filename.to_string(), content.to_vec(), Instant::now()));
        Ok(())
    }

    async fn purge(&self, id: ImportId) -> Result<(), StorageError> {
        let mut entries = self.lock();
        entries.previews.remove(&id);
        entries.uploads.remove(&id);
        Ok(())
    }

    async fn sweep_expired(&self, max_age: Duration) -> SweepReport {
        let mut entries = self.lock();
        let before = entries.previews.len() + entries.uploads.len();
        entries.previews.retain(|_, (_, at)| at.elapsed() < max_age);
        entries.uploads.retain(|_, (_, _, at)| at.elapsed() < max_age);
        SweepReport {
            removed: before - (entries.previews.len() + entries.uploads.len()),
            failed: 0,
        }
    }
}
