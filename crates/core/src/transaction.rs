use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Income,
    Expense,
    Transfer,
}

impl Direction {
    /// Sign-based direction used when a source has no explicit type column.
    pub fn from_amount(amount: Decimal) -> Self {
        if amount.is_sign_negative() && !amount.is_zero() {
            Direction::Expense
        } else {
            Direction::Income
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Income => write!(f, "income"),
            Direction::Expense => write!(f, "expense"),
            Direction::Transfer => write!(f, "transfer"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Direction::Income),
            "expense" => Ok(Direction::Expense),
            "transfer" => Ok(Direction::Transfer),
            other => Err(format!("Unknown direction: '{other}'")),
        }
    }
}

/// A source-specific extra attached to a transaction (fee, page number, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Decimal(Decimal),
    Integer(i64),
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<Decimal> for MetadataValue {
    fn from(d: Decimal) -> Self {
        MetadataValue::Decimal(d)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Integer(n)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => write!(f, "{s}"),
            MetadataValue::Decimal(d) => write!(f, "{d}"),
            MetadataValue::Integer(n) => write!(f, "{n}"),
        }
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// One normalized row from an uploaded export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub amount: Decimal,
    /// ISO 4217 code.
    pub currency: String,
    /// Whitespace-normalized description used for categorization.
    pub description: String,
    /// Description exactly as it appeared in the source.
    pub original_description: String,
    pub direction: Direction,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RawTransaction {
    pub fn new(
        date: NaiveDate,
        amount: Decimal,
        currency: &str,
        original_description: &str,
        direction: Direction,
    ) -> Self {
        RawTransaction {
            date,
            amount,
            currency: currency.to_string(),
            description: normalize_whitespace(original_description),
            original_description: original_description.to_string(),
            direction,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDialect {
    BankCsv,
    Satispay,
    Paypal,
    Pdf,
    Spreadsheet,
}

impl fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDialect::BankCsv => write!(f, "bank_csv"),
            SourceDialect::Satispay => write!(f, "satispay"),
            SourceDialect::Paypal => write!(f, "paypal"),
            SourceDialect::Pdf => write!(f, "pdf"),
            SourceDialect::Spreadsheet => write!(f, "spreadsheet"),
        }
    }
}

impl std::str::FromStr for SourceDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_csv" => Ok(SourceDialect::BankCsv),
            "satispay" => Ok(SourceDialect::Satispay),
            "paypal" => Ok(SourceDialect::Paypal),
            "pdf" => Ok(SourceDialect::Pdf),
            "spreadsheet" => Ok(SourceDialect::Spreadsheet),
            other => Err(format!("Unknown source dialect: '{other}'")),
        }
    }
}

/// Outcome of parsing one file.
///
/// `row_count` is every data row seen, `parsed_count` the rows that became
/// transactions. Row-level failures are kept in `errors`, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub transactions: Vec<RawTransaction>,
    pub source_dialect: SourceDialect,
    pub row_count: usize,
    pub parsed_count: usize,
    pub errors: Vec<String>,
}

impl ParseResult {
    pub fn empty(source_dialect: SourceDialect) -> Self {
        ParseResult {
            transactions: Vec::new(),
            source_dialect,
            row_count: 0,
            parsed_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn new(
        source_dialect: SourceDialect,
        transactions: Vec<RawTransaction>,
        row_count: usize,
        errors: Vec<String>,
    ) -> Self {
        let parsed_count = transactions.len();
        ParseResult {
            transactions,
            source_dialect,
            row_count: row_count.max(parsed_count),
            parsed_count,
            errors,
        }
    }
}
