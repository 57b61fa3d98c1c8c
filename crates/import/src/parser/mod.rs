pub mod bank_csv;
pub mod paypal;
pub mod pdf;
pub mod satispay;
pub mod spreadsheet;
pub(crate) mod tabular;

use inflow_core::{ParseResult, SourceDialect};
use thiserror::Error;

use crate::normalize::NormalizeError;

/// Failure to turn one row into a transaction. Collected into
/// [`ParseResult::errors`] with a row locator; never aborts a parse.
#[derive(Error, Debug)]
pub enum RowError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("Missing {0} value")]
    MissingValue(&'static str),
    #[error("No amount column has a value")]
    NoAmount,
    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Structural failure: the container itself could not be read.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unreadable {kind} file: {reason}")]
    Container { kind: &'static str, reason: String },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A source-specific reader for one export dialect.
///
/// `detect` must be cheap and side-effect free; `parse` reports bad rows in
/// the result instead of failing.
pub trait FormatParser: Send + Sync {
    fn dialect(&self) -> SourceDialect;

    fn detect(&self, filename: &str, content: &[u8]) -> bool;

    fn parse(&self, filename: &str, content: &[u8]) -> Result<ParseResult, ParseError>;
}

pub(crate) fn row_error(locator: &str, err: impl std::fmt::Display) -> String {
    format!("{locator}: {err}")
}
