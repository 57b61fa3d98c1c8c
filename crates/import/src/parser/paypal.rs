use inflow_core::{Direction, FileKind, ParseResult, RawTransaction, SourceDialect};
use rust_decimal::Decimal;

use super::satispay::date_part;
use super::tabular::{self, cell, has_all, map_columns, KeyedColumns};
use super::{row_error, FormatParser, ParseError, RowError};
use crate::normalize::{parse_amount, parse_date_with};

const REQUIRED_EN: &[&str] = &["date", "name", "type", "status", "currency", "gross"];
const REQUIRED_IT: &[&str] = &["data", "nome", "tipo", "stato", "valuta", "lordo"];

const COLUMNS: &[(&str, &str)] = &[
    ("date", "date"),
    ("name", "name"),
    ("type", "type"),
    ("status", "status"),
    ("currency", "currency"),
    ("gross", "gross"),
    ("fee", "fee"),
    ("net", "net"),
    ("transaction id", "transaction_id"),
    ("data", "date"),
    ("nome", "name"),
    ("tipo", "type"),
    ("stato", "status"),
    ("valuta", "currency"),
    ("lordo", "gross"),
    ("tariffa", "fee"),
    ("netto", "net"),
    ("codice transazione", "transaction_id"),
];

/// US-style exports write month first; Italian exports are day first.
const DATE_FORMATS_EN: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];
const DATE_FORMATS_IT: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d.%m.%Y", "%d-%m-%Y"];

// Checked in this order: a "Payment Refund" is income, not an expense.
const TRANSFER_TYPES: &[&str] = &[
    "transfer",
    "withdrawal",
    "currency conversion",
    "trasferimento",
    "bonifico",
    "prelievo",
    "conversione di valuta",
];
const INCOME_TYPES: &[&str] = &["refund", "deposit", "rimborso", "deposito", "accredito"];
const EXPENSE_TYPES: &[&str] = &["payment", "pagamento"];

/// PayPal activity export.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaypalParser;

pub(crate) fn direction_for(kind: &str, gross: Decimal) -> Direction {
    let kind = kind.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| kind.contains(w));
    if has(TRANSFER_TYPES) {
        Direction::Transfer
    } else if has(INCOME_TYPES) {
        Direction::Income
    } else if has(EXPENSE_TYPES) {
        Direction::Expense
    } else {
        Direction::from_amount(gross)
    }
}

fn to_transaction(
    columns: &KeyedColumns,
    date_formats: &[&str],
    cells: &[String],
) -> Result<RawTransaction, RowError> {
    let field = |key: &str| cell(cells, columns.get(key).copied());

    let date_raw = field("date");
    if date_raw.is_empty() {
        return Err(RowError::MissingValue("date"));
    }
    let date = parse_date_with(date_part(date_raw), date_formats)?;
    // Always gross: net already has the fee taken out.
    let gross = parse_amount(field("gross"))?;
    let kind = field("type");
    let description = match field("name") {
        "" => kind,
        name => name,
    };
    let currency = match field("currency") {
        "" => "EUR".to_string(),
        c => c.to_uppercase(),
    };

    let mut tx = RawTransaction::new(date, gross, &currency, description, direction_for(kind, gross))
        .with_metadata("status", field("status"))
        .with_metadata("paypal_type", kind);
    for key in ["fee", "net"] {
        if let Ok(value) = parse_amount(field(key)) {
            tx = tx.with_metadata(key, value);
        }
    }
    let transaction_id = field("transaction_id");
    if !transaction_id.is_empty() {
        tx = tx.with_metadata("paypal_transaction_id", transaction_id);
    }
    Ok(tx)
}

impl FormatParser for PaypalParser {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Paypal
    }

    fn detect(&self, filename: &str, content: &[u8]) -> bool {
        if FileKind::from_filename(filename) != Some(FileKind::Csv) || tabular::is_blank(content) {
            return false;
        }
        let text = tabular::decode(content);
        let headers = tabular::read_headers(&text, tabular::sniff_delimiter(&text, b','));
        has_all(&headers, REQUIRED_EN) || has_all(&headers, REQUIRED_IT)
    }

    fn parse(&self, _filename: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        if tabular::is_blank(content) {
            return Ok(ParseResult::empty(self.dialect()));
        }
        let text = tabular::decode(content);
        let table = tabular::read_table(&text, tabular::sniff_delimiter(&text, b','))?;
        let columns = map_columns(&table.headers, COLUMNS);
        let date_formats = if has_all(&table.headers, REQUIRED_IT) {
            DATE_FORMATS_IT
        } else {
            DATE_FORMATS_EN
        };

        let mut transactions = Vec::new();
        let mut errors = Vec::new();
        for (line, record) in &table.records {
            let result = record
                .as_ref()
                .map_err(|e| RowError::Malformed(e.clone()))
                .and_then(|cells| to_transaction(&columns, date_formats, cells));
            match result {
                Ok(tx) => transactions.push(tx),
                Err(e) => errors.push(row_error(&format!("Row {line}"), e)),
            }
        }
        tracing::debug!(rows = table.records.len(), parsed = transactions.len(), "Parsed PayPal export");
        Ok(ParseResult::new(self.dialect(), transactions, table.records.len(), errors))
    }
}
