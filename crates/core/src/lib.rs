pub mod categorization;
pub mod config;
pub mod import;
pub mod transaction;

pub use categorization::{
    CategorizationMethod, CategorizationResult, CategorizedTransaction, FinalizedTransaction,
    MatchedBy,
};
pub use config::{ConfigError, InflowConfig};
pub use import::{FileKind, ImportId, ImportRecord, ImportStatus};
pub use transaction::{
    normalize_whitespace, Direction, Metadata, MetadataValue, ParseResult, RawTransaction,
    SourceDialect,
};
