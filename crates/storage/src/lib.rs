pub mod db;
pub mod error;
pub mod hash;
pub mod preview;
pub mod retention;

pub use db::{
    commit_import, create_db, get_import, get_transactions_for_import, insert_import,
    list_imports, record_outcome, transition_import, DbPool, ImportLedger, ImportOutcome,
    SqliteLedger,
};
pub use error::StorageError;
pub use hash::{content_sha256, sha256_bytes, to_hex};
pub use preview::{
    sanitize_filename, FsPreviewStore, MemoryPreviewStore, PreviewStore, StagedPreview,
    SweepReport,
};
pub use retention::{spawn_retention_sweep, sweep_once};
