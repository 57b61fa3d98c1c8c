use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use inflow_core::{FileKind, ParseResult, SourceDialect};
use std::io::Cursor;

use super::bank_csv::BankColumns;
use super::tabular::normalize_header;
use super::{row_error, FormatParser, ParseError};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// How far down the first sheet to look for the header row; banks often put
/// account details above the table.
const HEADER_SCAN_ROWS: usize = 20;

/// Bank export delivered as an `.xlsx` workbook. Reads the first sheet with
/// the bank CSV column aliases.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetParser;

/// Excel serial day number to a day-first date string.
pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(Duration::days(serial.floor() as i64))?;
    Some(date.format("%d/%m/%Y").to_string())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).unwrap_or_default(),
        Data::DateTimeIso(s) => NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|_| s.clone()),
        other => other.to_string(),
    }
}

/// Date columns may hold bare serial numbers when the cell has no date
/// format applied.
fn date_cell_text(cell: &Data) -> String {
    match cell {
        Data::Float(f) => excel_serial_to_date(*f).unwrap_or_default(),
        Data::Int(i) => excel_serial_to_date(*i as f64).unwrap_or_default(),
        other => cell_text(other),
    }
}

fn container_error(e: impl std::fmt::Display) -> ParseError {
    ParseError::Container {
        kind: "xlsx",
        reason: e.to_string(),
    }
}

impl FormatParser for SpreadsheetParser {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Spreadsheet
    }

    fn detect(&self, filename: &str, content: &[u8]) -> bool {
        FileKind::from_filename(filename) == Some(FileKind::Xlsx) && content.starts_with(ZIP_MAGIC)
    }

    fn parse(&self, _filename: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        if content.is_empty() {
            return Ok(ParseResult::empty(self.dialect()));
        }
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(content)).map_err(container_error)?;
        let range = match workbook.worksheet_range_at(0) {
            Some(range) => range.map_err(container_error)?,
            None => return Ok(ParseResult::empty(self.dialect())),
        };
        let first_row = range.start().map_or(0, |(row, _)| row as usize);
        let rows: Vec<&[Data]> = range.rows().collect();

        let header = rows.iter().take(HEADER_SCAN_ROWS).enumerate().find_map(|(idx, row)| {
            let headers: Vec<String> = row.iter().map(|c| normalize_header(&cell_text(c))).collect();
            BankColumns::resolve_strict(&headers).map(|cols| (idx, cols))
        });
        let Some((header_idx, columns)) = header else {
            return Ok(ParseResult::new(
                self.dialect(),
                Vec::new(),
                rows.len(),
                vec![format!("No recognizable header row in the first {HEADER_SCAN_ROWS} rows")],
            ));
        };

        let mut transactions = Vec::new();
        let mut errors = Vec::new();
        let mut row_count = 0;
        for (idx, row) in rows.iter().enumerate().skip(header_idx + 1) {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(col, cell)| {
                    if col == columns.date || Some(col) == columns.value_date {
                        date_cell_text(cell)
                    } else {
                        cell_text(cell)
                    }
                })
                .collect();
            if cells.iter().all(String::is_empty) {
                continue;
            }
            row_count += 1;
            // 1-based sheet row, as shown by spreadsheet applications.
            let locator = format!("Row {}", first_row + idx + 1);
            match columns.to_transaction(&cells) {
                Ok(tx) => transactions.push(tx),
                Err(e) => errors.push(row_error(&locator, e)),
            }
        }

        tracing::debug!(rows = row_count, parsed = transactions.len(), "Parsed spreadsheet");
        Ok(ParseResult::new(self.dialect(), transactions, row_count, errors))
    }
}
