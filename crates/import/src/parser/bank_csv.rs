use inflow_core::{Direction, FileKind, ParseResult, RawTransaction, SourceDialect};

use super::tabular::{self, cell, find_column};
use super::{row_error, FormatParser, ParseError, RowError};
use crate::normalize::{parse_amount, parse_date, parse_optional_amount};

// ── Header aliases (normalized: trimmed, lowercase, single spaces) ──────────

pub const DATE_ALIASES: &[&str] = &[
    "date",
    "operation date",
    "posting date",
    "transaction date",
    "booking date",
    "data",
    "data operazione",
    "data contabile",
    "data movimento",
];

pub const VALUE_DATE_ALIASES: &[&str] = &["value date", "data valuta", "valuta"];

pub const DESCRIPTION_ALIASES: &[&str] = &[
    "description",
    "narrative",
    "memo",
    "details",
    "descrizione",
    "descrizione operazione",
    "causale",
    "dettagli",
    "movimento",
];

pub const AMOUNT_ALIASES: &[&str] = &[
    "amount",
    "amount eur",
    "amount (eur)",
    "importo",
    "importo eur",
    "importo (eur)",
    "ammontare",
];

pub const DEBIT_ALIASES: &[&str] = &[
    "debit",
    "debits",
    "money out",
    "paid out",
    "withdrawals",
    "dare",
    "addebiti",
    "addebito",
    "uscite",
];

pub const CREDIT_ALIASES: &[&str] = &[
    "credit",
    "credits",
    "money in",
    "paid in",
    "deposits",
    "avere",
    "accrediti",
    "accredito",
    "entrate",
];

pub const CURRENCY_ALIASES: &[&str] = &["currency", "divisa"];

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Column layout of a bank-style table, shared by the CSV, PDF and
/// spreadsheet readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankColumns {
    pub date: usize,
    pub description: Option<usize>,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub value_date: Option<usize>,
    pub currency: Option<usize>,
}

impl BankColumns {
    /// Resolve aliases against normalized headers. Only a date column is
    /// mandatory at this level; callers decide how strict to be.
    pub fn resolve(headers: &[String]) -> Option<Self> {
        let date = find_column(headers, DATE_ALIASES)
            .or_else(|| find_column(headers, VALUE_DATE_ALIASES))?;
        let value_date = find_column(headers, VALUE_DATE_ALIASES).filter(|&i| i != date);
        Some(BankColumns {
            date,
            description: find_column(headers, DESCRIPTION_ALIASES),
            amount: find_column(headers, AMOUNT_ALIASES),
            debit: find_column(headers, DEBIT_ALIASES),
            credit: find_column(headers, CREDIT_ALIASES),
            value_date,
            currency: find_column(headers, CURRENCY_ALIASES),
        })
    }

    /// Strict rule for delimited files: date, description and either a
    /// signed amount or a debit/credit pair.
    pub fn resolve_strict(headers: &[String]) -> Option<Self> {
        Self::resolve(headers).filter(|c| {
            c.description.is_some()
                && (c.amount.is_some() || (c.debit.is_some() && c.credit.is_some()))
        })
    }

    /// Loose rule for tables lifted out of documents: a date plus any one of
    /// the other recognized columns.
    pub fn resolve_loose(headers: &[String]) -> Option<Self> {
        Self::resolve(headers).filter(|c| {
            c.description.is_some() || c.amount.is_some() || c.debit.is_some() || c.credit.is_some()
        })
    }

    /// Map one row of cells to a transaction. Debit/credit pairs combine as
    /// `credit - |debit|`; a non-empty signed amount column takes precedence.
    pub fn to_transaction(&self, cells: &[String]) -> Result<RawTransaction, RowError> {
        let date_raw = cell(cells, Some(self.date));
        if date_raw.is_empty() {
            return Err(RowError::MissingValue("date"));
        }
        let date = parse_date(date_raw)?;

        let amount_raw = cell(cells, self.amount);
        let amount = if self.amount.is_some()
            && (!amount_raw.is_empty() || (self.debit.is_none() && self.credit.is_none()))
        {
            parse_amount(amount_raw)?
        } else if self.debit.is_some() || self.credit.is_some() {
            let debit = parse_optional_amount(cell(cells, self.debit))?;
            let credit = parse_optional_amount(cell(cells, self.credit))?;
            credit - debit.abs()
        } else {
            return Err(RowError::NoAmount);
        };

        let currency = match cell(cells, self.currency) {
            "" => DEFAULT_CURRENCY.to_string(),
            c => c.to_uppercase(),
        };

        let mut tx = RawTransaction::new(
            date,
            amount,
            &currency,
            cell(cells, self.description),
            Direction::from_amount(amount),
        );
        let value_date = cell(cells, self.value_date);
        if !value_date.is_empty() {
            tx = tx.with_metadata("value_date", value_date);
        }
        Ok(tx)
    }
}

/// Generic bank-statement CSV with English or Italian headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BankCsvParser;

impl BankCsvParser {
    fn headers(content: &[u8]) -> Option<(String, u8, Vec<String>)> {
        if tabular::is_blank(content) {
            return None;
        }
        let text = tabular::decode(content);
        let delimiter = tabular::sniff_delimiter(&text, b';');
        let headers = tabular::read_headers(&text, delimiter);
        Some((text, delimiter, headers))
    }
}

impl FormatParser for BankCsvParser {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::BankCsv
    }

    fn detect(&self, filename: &str, content: &[u8]) -> bool {
        if FileKind::from_filename(filename) != Some(FileKind::Csv) {
            return false;
        }
        Self::headers(content)
            .is_some_and(|(_, _, headers)| BankColumns::resolve_strict(&headers).is_some())
    }

    fn parse(&self, _filename: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        let Some((text, delimiter, _)) = Self::headers(content) else {
            return Ok(ParseResult::empty(self.dialect()));
        };
        let table = tabular::read_table(&text, delimiter)?;

        let Some(columns) = BankColumns::resolve_strict(&table.headers) else {
            return Ok(ParseResult::new(
                self.dialect(),
                Vec::new(),
                table.records.len(),
                vec!["Missing required date, description or amount column".to_string()],
            ));
        };

        let mut transactions = Vec::new();
        let mut errors = Vec::new();
        for (line, record) in &table.records {
            let locator = format!("Row {line}");
            let result = record
                .as_ref()
                .map_err(|e| RowError::Malformed(e.clone()))
                .and_then(|cells| columns.to_transaction(cells));
            match result {
                Ok(tx) => transactions.push(tx),
                Err(e) => errors.push(row_error(&locator, e)),
            }
        }

        tracing::debug!(
            rows = table.records.len(),
            parsed = transactions.len(),
            delimiter = %char::from(delimiter),
            "Parsed bank CSV"
        );
        Ok(ParseResult::new(self.dialect(), transactions, table.records.len(), errors))
    }
}
