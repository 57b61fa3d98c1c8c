use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::transaction::SourceDialect;

pub type ImportId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Processing,
    Preview,
    Confirmed,
    Failed,
    Cancelled,
}

impl ImportStatus {
    /// Confirmed and cancelled imports never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportStatus::Confirmed | ImportStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Preview => "preview",
            ImportStatus::Confirmed => "confirmed",
            ImportStatus::Failed => "failed",
            ImportStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImportStatus::Pending),
            "processing" => Ok(ImportStatus::Processing),
            "preview" => Ok(ImportStatus::Preview),
            "confirmed" => Ok(ImportStatus::Confirmed),
            "failed" => Ok(ImportStatus::Failed),
            "cancelled" => Ok(ImportStatus::Cancelled),
            other => Err(format!("Unknown import status: '{other}'")),
        }
    }
}

/// Container kind implied by the upload's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Csv,
    Pdf,
    Xlsx,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();
        match ext.as_str() {
            "csv" => Some(FileKind::Csv),
            "pdf" => Some(FileKind::Pdf),
            "xlsx" => Some(FileKind::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Csv => write!(f, "csv"),
            FileKind::Pdf => write!(f, "pdf"),
            FileKind::Xlsx => write!(f, "xlsx"),
        }
    }
}

impl std::str::FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(FileKind::Csv),
            "pdf" => Ok(FileKind::Pdf),
            "xlsx" => Ok(FileKind::Xlsx),
            other => Err(format!("Unknown file kind: '{other}'")),
        }
    }
}

/// One import attempt as seen by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: ImportId,
    pub filename: String,
    pub file_kind: FileKind,
    /// `None` while no parser has recognized the upload.
    pub source_dialect: Option<SourceDialect>,
    pub status: ImportStatus,
    pub row_count: usize,
    pub imported_count: usize,
    pub error_log: Vec<String>,
    /// SHA-256 of the uploaded bytes, lowercase hex.
    pub content_sha256: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportRecord {
    pub fn new(filename: &str, file_kind: FileKind, content_sha256: String) -> Self {
        let now = Utc::now();
        ImportRecord {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            file_kind,
            source_dialect: None,
            status: ImportStatus::Pending,
            row_count: 0,
            imported_count: 0,
            error_log: Vec::new(),
            content_sha256,
            created_at: now,
            updated_at: now,
        }
    }
}
