//! Shared plumbing for delimited-text exports: byte decoding, delimiter
//! sniffing, header normalization and alias lookup.

use inflow_core::normalize_whitespace;
use std::collections::HashMap;

/// Delimiters considered when sniffing, in tie-break order.
pub const DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

const SNIFF_LINES: usize = 5;

/// Decode an upload as UTF-8 (dropping a BOM), falling back to Latin-1 so
/// that legacy bank exports never fail to decode.
pub fn decode(content: &[u8]) -> String {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    match std::str::from_utf8(content) {
        Ok(s) => s.to_string(),
        Err(_) => content.iter().map(|&b| b as char).collect(),
    }
}

pub fn is_blank(content: &[u8]) -> bool {
    content.iter().all(u8::is_ascii_whitespace)
}

/// Pick the delimiter that splits the first lines into a consistent,
/// non-zero number of fields. Ties go to the earlier entry of
/// [`DELIMITERS`]; when nothing is consistent `fallback` is used.
pub fn sniff_delimiter(text: &str, fallback: u8) -> u8 {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if sample.is_empty() {
        return fallback;
    }

    let mut best: Option<(u8, usize)> = None;
    for &candidate in &DELIMITERS {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| count_unquoted(line, candidate))
            .collect();
        let first = counts[0];
        if first == 0 || counts.iter().any(|&c| c != first) {
            continue;
        }
        if best.map_or(true, |(_, n)| first > n) {
            best = Some((candidate, first));
        }
    }
    best.map_or(fallback, |(d, _)| d)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

pub fn normalize_header(raw: &str) -> String {
    normalize_whitespace(raw.trim_matches('"')).to_lowercase()
}

/// Index of the first header that equals one of `aliases`.
pub fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| aliases.contains(&h.as_str()))
}

pub fn has_all(headers: &[String], required: &[&str]) -> bool {
    required.iter().all(|r| headers.iter().any(|h| h == r))
}

/// Logical field name to column index, for dialects with fixed field sets.
pub type KeyedColumns = HashMap<&'static str, usize>;

/// Resolve `(header alias, logical key)` pairs; the first header carrying a
/// key wins.
pub fn map_columns(headers: &[String], aliases: &[(&str, &'static str)]) -> KeyedColumns {
    let mut columns = KeyedColumns::new();
    for (idx, header) in headers.iter().enumerate() {
        if let Some((_, key)) = aliases.iter().find(|(alias, _)| *alias == header.as_str()) {
            columns.entry(*key).or_insert(idx);
        }
    }
    columns
}

pub fn cell(cells: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| cells.get(i)).map_or("", |s| s.as_str())
}

/// A delimited document split into normalized headers and data records.
/// Each record keeps the 1-based line it started on.
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<(u64, Result<Vec<String>, String>)>,
}

fn reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

/// Normalized header row only; empty when the text has none.
pub fn read_headers(text: &str, delimiter: u8) -> Vec<String> {
    reader(text, delimiter)
        .headers()
        .map(|h| h.iter().map(normalize_header).collect())
        .unwrap_or_default()
}

pub fn read_table(text: &str, delimiter: u8) -> Result<Table, csv::Error> {
    let mut rdr = reader(text, delimiter);
    let headers = rdr.headers()?.iter().map(normalize_header).collect();

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        // Header is line 1, so the n-th record sits at least on line n + 2.
        let fallback_line = idx as u64 + 2;
        match result {
            Ok(record) => {
                if record.iter().all(|f| f.is_empty()) {
                    continue;
                }
                let line = record.position().map_or(fallback_line, |p| p.line());
                records.push((line, Ok(record.iter().map(str::to_string).collect())));
            }
            Err(e) => {
                let line = e.position().map_or(fallback_line, |p| p.line());
                records.push((line, Err(e.to_string())));
            }
        }
    }
    Ok(Table { headers, records })
}
