use inflow_core::ParseResult;
use thiserror::Error;

use crate::parser::bank_csv::BankCsvParser;
use crate::parser::paypal::PaypalParser;
use crate::parser::pdf::PdfParser;
use crate::parser::satispay::SatispayParser;
use crate::parser::spreadsheet::SpreadsheetParser;
use crate::parser::{FormatParser, ParseError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No parser found for file: {0}")]
    NoParser(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Ordered list of dialect parsers. The first parser whose `detect` accepts
/// an upload handles it.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FormatParser>>,
}

impl Default for ParserRegistry {
    /// Wallet dialects come before the generic bank reader because their
    /// headers also satisfy the bank aliases.
    fn default() -> Self {
        Self::with_parsers(vec![
            Box::new(PaypalParser),
            Box::new(SatispayParser),
            Box::new(BankCsvParser),
            Box::new(PdfParser::default()),
            Box::new(SpreadsheetParser),
        ])
    }
}

impl ParserRegistry {
    pub fn with_parsers(parsers: Vec<Box<dyn FormatParser>>) -> Self {
        Self { parsers }
    }

    pub fn detect(&self, filename: &str, content: &[u8]) -> Option<&dyn FormatParser> {
        self.parsers
            .iter()
            .find(|p| p.detect(filename, content))
            .map(|p| p.as_ref())
    }

    pub fn parse(&self, filename: &str, content: &[u8]) -> Result<ParseResult, RegistryError> {
        let parser = self
            .detect(filename, content)
            .ok_or_else(|| RegistryError::NoParser(filename.to_string()))?;
        tracing::info!(filename, dialect = %parser.dialect(), "Detected import dialect");
        Ok(parser.parse(filename, content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::pdf::tests::StaticExtractor;
    use crate::parser::pdf::PdfPage;
    use inflow_core::SourceDialect;

    fn dialect_of(filename: &str, content: &[u8]) -> Option<SourceDialect> {
        ParserRegistry::default().detect(filename, content).map(|p| p.dialect())
    }

    #[test]
    fn routes_each_dialect() {
        assert_eq!(
            dialect_of("e.csv", b"Data;Descrizione;Importo\n01/03/2025;X;-1,00\n"),
            Some(SourceDialect::BankCsv)
        );
        assert_eq!(
            dialect_of("s.csv", b"id,date,name,description,amount,currency,type\n"),
            Some(SourceDialect::Satispay)
        );
        assert_eq!(
            dialect_of("p.csv", b"Date,Name,Type,Status,Currency,Gross,Fee,Net,Description,Amount\n"),
            Some(SourceDialect::Paypal)
        );
        assert_eq!(dialect_of("s.pdf", b"%PDF-1.7"), Some(SourceDialect::Pdf));
        assert_eq!(dialect_of("m.xlsx", b"PK\x03\x04"), Some(SourceDialect::Spreadsheet));
    }

    #[test]
    fn unknown_input_is_no_parser() {
        let registry = ParserRegistry::default();
        assert!(registry.detect("notes.csv", b"hello,world\n").is_none());
        assert!(matches!(
            registry.parse("notes.csv", b"hello,world\n"),
            Err(RegistryError::NoParser(name)) if name == "notes.csv"
        ));
    }

    #[test]
    fn first_registered_match_wins() {
        let pages = vec![PdfPage { number: 1, tables: vec![] }];
        let registry = ParserRegistry::with_parsers(vec![
            Box::new(PdfParser::with_extractor(StaticExtractor(Ok(pages)))),
            Box::new(PdfParser::default()),
        ]);
        let result = registry.parse("s.pdf", b"%PDF-1.4").unwrap();
        assert_eq!(result.errors, vec!["Page 1: no tables found".to_string()]);
    }

    #[test]
    fn structural_failure_surfaces() {
        let registry = ParserRegistry::default();
        assert!(matches!(
            registry.parse("m.xlsx", b"PK\x03\x04broken"),
            Err(RegistryError::Parse(ParseError::Container { .. }))
        ));
    }
}
