use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Cannot parse date: '{0}'")]
    InvalidDate(String),
    #[error("Empty amount")]
    EmptyAmount,
    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),
}

/// Day-first layouts accepted from bank exports, tried in order.
pub const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

const CURRENCY_SYMBOLS: &[char] = &['€', '$', '£', '¥', '₣'];

/// Parse a day-month-year date. The first format that matches the whole
/// string wins; anything else is rejected.
pub fn parse_date(value: &str) -> Result<NaiveDate, NormalizeError> {
    parse_date_with(value, DAY_FIRST_FORMATS)
}

/// Parse a date against an explicit, ordered list of `chrono` formats.
///
/// Years must be written with four digits: `01/03/25` is refused instead of
/// being read as the year 25.
pub fn parse_date_with(value: &str, formats: &[&str]) -> Result<NaiveDate, NormalizeError> {
    let value = value.trim();
    if !has_four_digit_year(value) {
        return Err(NormalizeError::InvalidDate(value.to_string()));
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| NormalizeError::InvalidDate(value.to_string()))
}

fn has_four_digit_year(value: &str) -> bool {
    let runs: Vec<usize> = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .map(str::len)
        .collect();
    runs.contains(&4) && runs.iter().all(|&len| len <= 4)
}

/// Parse a locale-formatted amount into an exact decimal.
///
/// When both `,` and `.` are present the rightmost one is the decimal
/// separator. A lone `,` is a decimal comma; a lone `.` is already canonical.
/// Accounting parentheses mark a negative amount.
pub fn parse_amount(value: &str) -> Result<Decimal, NormalizeError> {
    let trimmed = value.trim();
    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if cleaned.is_empty() {
        return Err(NormalizeError::EmptyAmount);
    }

    let canonical = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned.to_string(),
    };

    let amount = Decimal::from_str(&canonical)
        .map_err(|_| NormalizeError::InvalidAmount(trimmed.to_string()))?;
    Ok(if negative { -amount } else { amount })
}

/// Like [`parse_amount`] but an empty cell reads as zero. Only for columns
/// that are legitimately blank, such as one side of a debit/credit pair.
pub fn parse_optional_amount(value: &str) -> Result<Decimal, NormalizeError> {
    match parse_amount(value) {
        Err(NormalizeError::EmptyAmount) => Ok(Decimal::ZERO),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn amount_italian_thousands_and_decimal_comma() {
        assert_eq!(parse_amount("1.234,56").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("2.350,00").unwrap(), dec("2350.00"));
    }

    #[test]
    fn amount_plain_negative_keeps_scale() {
        let a = parse_amount("-45.80").unwrap();
        assert_eq!(a, dec("-45.80"));
        assert_eq!(a.to_string(), "-45.80");
    }

    #[test]
    fn amount_english_thousands() {
        assert_eq!(parse_amount("1,234.56").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("1,234,567.89").unwrap(), dec("1234567.89"));
    }

    #[test]
    fn amount_lone_comma_is_decimal() {
        assert_eq!(parse_amount("-45,80").unwrap(), dec("-45.80"));
        assert_eq!(parse_amount("0,01").unwrap(), dec("0.01"));
    }

    #[test]
    fn amount_lone_dot_is_canonical() {
        assert_eq!(parse_amount("1.234").unwrap(), dec("1.234"));
    }

    #[test]
    fn amount_strips_symbols_and_spaces() {
        assert_eq!(parse_amount("€ 1.234,56").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("$99.99").unwrap(), dec("99.99"));
        assert_eq!(parse_amount(" +12,00 ").unwrap(), dec("12.00"));
        assert_eq!(parse_amount("1\u{a0}234,56").unwrap(), dec("1234.56"));
    }

    #[test]
    fn amount_accounting_parens() {
        assert_eq!(parse_amount("(75,25)").unwrap(), dec("-75.25"));
    }

    #[test]
    fn amount_is_exact_for_float_unfriendly_values() {
        // 0.1 + 0.2 is not 0.3 in binary floating point.
        let sum = parse_amount("0,1").unwrap() + parse_amount("0,2").unwrap();
        assert_eq!(sum, dec("0.3"));
    }

    #[test]
    fn amount_empty_is_an_error() {
        assert_eq!(parse_amount(""), Err(NormalizeError::EmptyAmount));
        assert_eq!(parse_amount("   "), Err(NormalizeError::EmptyAmount));
        assert_eq!(parse_amount("€"), Err(NormalizeError::EmptyAmount));
    }

    #[test]
    fn amount_garbage_is_an_error() {
        assert!(matches!(parse_amount("abc"), Err(NormalizeError::InvalidAmount(_))));
        assert!(matches!(parse_amount("12,34,56"), Err(NormalizeError::InvalidAmount(_))));
    }

    #[test]
    fn optional_amount_reads_blank_as_zero() {
        assert_eq!(parse_optional_amount("").unwrap(), Decimal::ZERO);
        assert_eq!(parse_optional_amount("100,00").unwrap(), dec("100.00"));
        assert!(parse_optional_amount("n/a").is_err());
    }

    // ── parse_date ────────────────────────────────────────────────────────────

    #[test]
    fn date_all_separators() {
        assert_eq!(parse_date("01/03/2025").unwrap(), date(2025, 3, 1));
        assert_eq!(parse_date("01-03-2025").unwrap(), date(2025, 3, 1));
        assert_eq!(parse_date("01.03.2025").unwrap(), date(2025, 3, 1));
        assert_eq!(parse_date(" 1/3/2025 ").unwrap(), date(2025, 3, 1));
    }

    #[test]
    fn date_rejects_year_first() {
        assert!(parse_date("2025/03/01").is_err());
        assert!(parse_date("2025-03-01").is_err());
        assert!(parse_date("2025.03.01").is_err());
    }

    #[test]
    fn date_rejects_two_digit_year() {
        assert!(parse_date("01/03/25").is_err());
    }

    #[test]
    fn date_rejects_partial_and_impossible() {
        assert!(parse_date("01/03/2025 extra").is_err());
        assert!(parse_date("31/02/2025").is_err());
        assert!(parse_date("").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn date_custom_format_order() {
        let formats = ["%m/%d/%Y", "%Y-%m-%d", "%d/%m/%Y"];
        // Month-first wins when both readings are valid.
        assert_eq!(parse_date_with("03/01/2025", &formats).unwrap(), date(2025, 3, 1));
        // Falls through to day-first when month-first is impossible.
        assert_eq!(parse_date_with("13/01/2025", &formats).unwrap(), date(2025, 1, 13));
        assert_eq!(parse_date_with("2025-03-01", &formats).unwrap(), date(2025, 3, 1));
    }
}
