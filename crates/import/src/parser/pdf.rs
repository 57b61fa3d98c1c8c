use inflow_core::{ParseResult, SourceDialect};
use std::sync::OnceLock;
use thiserror::Error;

use super::bank_csv::BankColumns;
use super::tabular::normalize_header;
use super::{row_error, FormatParser, ParseError};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Rows of cells as laid out on the page.
pub type Table = Vec<Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfPage {
    /// 1-based.
    pub number: usize,
    pub tables: Vec<Table>,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Unreadable(String),
}

/// Source of tables for the PDF dialect. Swappable so tests (and better
/// layout engines) can stand in for the text-based default.
pub trait TableExtractor: Send + Sync {
    fn extract(&self, content: &[u8]) -> Result<Vec<PdfPage>, ExtractError>;
}

/// Rebuilds tables from page text: a line with two or more cells separated
/// by wide gaps is a table row, and consecutive rows form one table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLayoutExtractor;

impl TableExtractor for TextLayoutExtractor {
    fn extract(&self, content: &[u8]) -> Result<Vec<PdfPage>, ExtractError> {
        // The decoder panics on some malformed streams.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(content))
            .map_err(|_| ExtractError::Unreadable("decoder aborted".to_string()))?
            .map_err(|e| ExtractError::Unreadable(format!("{e:?}")))?;
        if pages.is_empty() {
            return Err(ExtractError::Unreadable("document has no pages".to_string()));
        }
        Ok(pages
            .iter()
            .enumerate()
            .map(|(idx, text)| PdfPage {
                number: idx + 1,
                tables: tables_from_text(text),
            })
            .collect())
    }
}

fn column_gap() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\t+|\s{2,}").expect("invalid regex"))
}

pub fn tables_from_text(text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut current: Table = Vec::new();
    for line in text.lines() {
        let cells: Vec<String> = column_gap()
            .split(line.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if cells.len() >= 2 {
            current.push(cells);
        } else if !current.is_empty() {
            tables.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tables.push(current);
    }
    tables
}

/// Bank statement PDF. Tables are located per page and read with the bank
/// CSV column aliases.
pub struct PdfParser<E = TextLayoutExtractor> {
    extractor: E,
}

impl Default for PdfParser {
    fn default() -> Self {
        PdfParser {
            extractor: TextLayoutExtractor,
        }
    }
}

impl<E: TableExtractor> PdfParser<E> {
    pub fn with_extractor(extractor: E) -> Self {
        PdfParser { extractor }
    }
}

impl<E: TableExtractor> FormatParser for PdfParser<E> {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Pdf
    }

    fn detect(&self, _filename: &str, content: &[u8]) -> bool {
        content.starts_with(PDF_MAGIC)
    }

    fn parse(&self, _filename: &str, content: &[u8]) -> Result<ParseResult, ParseError> {
        let mut result = ParseResult::empty(self.dialect());
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(result);
        }

        let pages = match self.extractor.extract(content) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open PDF");
                result.errors.push(format!("Failed to open PDF: {e}"));
                return Ok(result);
            }
        };

        let mut transactions = Vec::new();
        let mut errors = Vec::new();
        let mut row_count = 0;
        for page in &pages {
            let n = page.number;
            if page.tables.is_empty() {
                errors.push(format!("Page {n}: no tables found"));
                continue;
            }
            for table in &page.tables {
                if table.len() < 2 {
                    errors.push(format!("Page {n}: table too small (< 2 rows)"));
                    continue;
                }
                let header = table.iter().enumerate().find_map(|(idx, row)| {
                    let headers: Vec<String> = row.iter().map(|c| normalize_header(c)).collect();
                    BankColumns::resolve_loose(&headers).map(|cols| (idx, cols))
                });
                let Some((header_idx, columns)) = header else {
                    errors.push(format!("Page {n}: no recognizable header row"));
                    continue;
                };

                for (offset, row) in table.iter().skip(header_idx + 1).enumerate() {
                    row_count += 1;
                    let locator = format!("Page {n}, row {}", offset + 1);
                    match columns.to_transaction(row) {
                        Ok(tx) => transactions.push(tx.with_metadata("source_page", n as i64)),
                        Err(e) => errors.push(row_error(&locator, e)),
                    }
                }
            }
        }

        tracing::debug!(pages = pages.len(), rows = row_count, parsed = transactions.len(), "Parsed PDF");
        Ok(ParseResult::new(self.dialect(), transactions, row_count, errors))
    }
}
