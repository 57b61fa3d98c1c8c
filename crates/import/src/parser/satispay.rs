use inflow_core::{Direction, FileKind, ParseResult, RawTransaction, SourceDialect};
use rust_decimal::Decimal;

use super::tabular::{self, cell, has_all, map_columns, KeyedColumns};
use super::{row_error, FormatParser, ParseError, RowError};
use crate::normalize::{parse_amount, parse_date_with};

const REQUIRED_EN: &[&str] = &["id", "date", "type", "amount", "currency", "name"];
const REQUIRED_IT: &[&str] = &["id", "data", "tipo", "importo", "valuta", "nome"];

const COLUMNS: &[(&str, &str)] = &[
    ("id", "id"),
    ("date", "date"),
    ("type", "type"),
    ("amount", "amount"),
    ("currency", "currency"),
    ("name", "name"),
    ("description", "description"),
    ("data", "date"),
    ("tipo", "type"),
    ("importo", "amount"),
    ("valuta", "currency"),
    ("nome", "name"),
    ("descrizione", "description"),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Satispay wallet export.
#[derive(Debug, Default, Clone, Copy)]
pub struct SatispayParser;

pub(crate) fn direction_for(kind: &str, amount: Decimal) -> Direction {
    match kind.trim().to_lowercase().as_str() {
        "payment" | "pagamento" => Direction::Expense,
        "refund" | "rimborso" | "top up" | "top-up" | "ricarica" | "cashback" => Direction::Income,
        "transfer" | "trasferimento" => Direction::Transfer,
        _ => Direction::from_amount(amount),
    }
}

/// Drop a trailing time-of-day so timestamped exports parse as dates.
pub(crate) fn date_part(raw: &str) -> &str {
    raw.trim().split(['T', ' ']).next().unwrap_or("")
}

fn to_transaction(columns: &KeyedColumns, cells: &[String]) -> Result<RawTransaction, RowError> {
    let field = |key: &str| cell(cells, columns.get(key).copied());

    let date_raw = field("date");
    if date_raw.is_empty() {
        return Err(RowError::MissingValue("date"));
    }
    let date = parse_date_with(date_part(date_raw), DATE_FORMATS)?;
    let amount = parse_amount(field("amount"))?;
    let kind = field("type");

    let name = field("name");
    let description = match field("description") {
        "" => name.to_string(),
        extra if name.is_empty() => extra.to_string(),
        extra => format!("{name} - {extra}"),
    };
    let currency = match field("currency") {
        "" => "EUR".to_string(),
        c => c.to_uppercase(),
    };

    Ok(RawTransaction::new(
        date,
        amount,
        &currency,
        &description,
        direction_for(kind, amount),
    )
    .with_metadata("satispay_id", field("id"))
    .with_metadata("satispay_type", kind))
}

impl FormatParser for SatispayParser {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Satispay
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

        let mut transactions = Vec::new();
        let mut errors = Vec::new();
        for (line, record) in &table.records {
            let result = record
                .as_ref()
                .map_err(|e| RowError::Malformed(e.clone()))
                .and_then(|cells| to_transaction(&columns, cells));
            match result {
                Ok(tx) => transactions.push(tx),
                Err(e) => errors.push(row_error(&format!("Row {line}"), e)),
            }
        }
        tracing::debug!(rows = table.records.len(), parsed = transactions.len(), "Parsed Satispay export");
        Ok(ParseResult::new(self.dialect(), transactions, table.records.len(), errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use inflow_core::MetadataValue;
    use std::str::FromStr;

    const ENGLISH: &str = "id,date,name,description,amount,currency,type\n\
tx-1,2025-03-01,Bar Centrale,Caffè,-1.20,EUR,payment\n\
tx-2,2025-03-02 18:04:11,Mario Rossi,,15.00,EUR,refund\n\
tx-3,2025-03-03,Satispay,,50.00,eur,top up\n";

    #[test]
    fn detects_both_locales() {
        let p = SatispayParser;
        assert!(p.detect("satispay.csv", ENGLISH.as_bytes()));
        assert!(p.detect("s.csv", b"id;data;nome;descrizione;importo;valuta;tipo\n"));
        assert!(!p.detect("s.csv", b"date,description,amount\n"));
        assert!(!p.detect("s.pdf", ENGLISH.as_bytes()));
    }

    #[test]
    fn parses_types_and_metadata() {
        let result = SatispayParser.parse("s.csv", ENGLISH.as_bytes()).unwrap();
        assert_eq!(result.parsed_count, 3);
        assert!(result.errors.is_empty());

        let coffee = &result.transactions[0];
        assert_eq!(coffee.description, "Bar Centrale - Caffè");
        assert_eq!(coffee.direction, Direction::Expense);
        assert_eq!(coffee.amount, Decimal::from_str("-1.20").unwrap());
        assert_eq!(
            coffee.metadata.get("satispay_id"),
            Some(&MetadataValue::Text("tx-1".into()))
        );

        let refund = &result.transactions[1];
        assert_eq!(refund.date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(refund.direction, Direction::Income);
        assert_eq!(refund.description, "Mario Rossi");

        let top_up = &result.transactions[2];
        assert_eq!(top_up.direction, Direction::Income);
        assert_eq!(top_up.currency, "EUR");
    }

    #[test]
    fn italian_types_map() {
        let csv = "id;data;nome;importo;valuta;tipo\n\
a;01/03/2025;Negozio;-3,50;EUR;pagamento\n\
b;02/03/2025;Amico;10,00;EUR;ricarica\n";
        let result = SatispayParser.parse("s.csv", csv.as_bytes()).unwrap();
        assert_eq!(result.parsed_count, 2);
        assert_eq!(result.transactions[0].direction, Direction::Expense);
        assert_eq!(result.transactions[1].direction, Direction::Income);
    }

    #[test]
    fn transfer_type_maps_to_transfer() {
        assert_eq!(direction_for("Transfer", Decimal::from(-20)), Direction::Transfer);
        assert_eq!(direction_for("trasferimento", Decimal::from(20)), Direction::Transfer);
    }

    #[test]
    fn unknown_type_uses_sign() {
        assert_eq!(direction_for("p2p", Decimal::from(-5)), Direction::Expense);
        assert_eq!(direction_for("p2p", Decimal::from(5)), Direction::Income);
    }

    #[test]
    fn bad_row_is_isolated() {
        let csv = "id,date,name,amount,currency,type\n\
a,2025-03-01,Shop,-1.00,EUR,payment\n\
b,yesterday,Shop,-1.00,EUR,payment\n";
        let result = SatispayParser.parse("s.csv", csv.as_bytes()).unwrap();
        assert_eq!(result.parsed_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Row 3:"));
    }
}
