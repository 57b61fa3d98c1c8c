use inflow_core::{ImportId, ImportStatus};
use inflow_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("Unsupported file type: '{0}' (expected .csv, .pdf or .xlsx)")]
    UnsupportedExtension(String),
    #[error("Import {import_id} failed: {reason}")]
    Format { import_id: ImportId, reason: String },
    #[error("Import not found: {0}")]
    NotFound(ImportId),
    #[error("Cannot {action} import {import_id} in status '{status}'")]
    Conflict {
        import_id: ImportId,
        status: ImportStatus,
        action: &'static str,
    },
    #[error("Preview for import {0} is no longer available")]
    PreviewExpired(ImportId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Format,
    Conflict,
    NotFound,
    Internal,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::TooLarge { .. } | WorkflowError::UnsupportedExtension(_) => {
                ErrorKind::Validation
            }
            WorkflowError::Format { .. } => ErrorKind::Format,
            WorkflowError::Conflict { .. } => ErrorKind::Conflict,
            WorkflowError::NotFound(_) | WorkflowError::PreviewExpired(_) => ErrorKind::NotFound,
            WorkflowError::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// Serializable error body handed back to callers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&WorkflowError> for ErrorResponse {
    fn from(e: &WorkflowError) -> Self {
        ErrorResponse {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}
