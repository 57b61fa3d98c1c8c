use regex::Regex;
use std::sync::OnceLock;

/// A narrative pattern with its category and confidence.
pub struct PatternRule {
    pub regex: Regex,
    pub category: &'static str,
    pub confidence: f32,
}

// Ordered: specific narratives before the generic ones they overlap with.
const PATTERNS: &[(&str, &str, f32)] = &[
    // ── Payroll ──────────────────────────────────────────────────────────────
    (
        r"(?i)(BONIFICO|TRANSFER|ACCREDITO|CREDIT).*(STIPENDIO|RETRIBUZIONE|SALARIO|EMOLUMENT|SALARY|PAYROLL|WAGES)",
        "salary",
        0.9,
    ),
    // ── Housing ──────────────────────────────────────────────────────────────
    (r"(?i)(BONIFICO|TRANSFER).*(AFFITTO|CANONE\s+LOCAZIONE|\bRENT\b)", "rent_mortgage", 0.85),
    (r"(?i)RATA\s+MUTUO|ADDEBITO\s+MUTUO|MORTGAGE", "rent_mortgage", 0.9),
    // ── Direct debits ────────────────────────────────────────────────────────
    (
        r"(?i)(ADDEBITO\s+SDD|DIRECT\s+DEBIT|SEPA\s+DD).*\b(ENEL|IREN|A2A|HERA|ACEA|SORGENIA|EDISON|ITALGAS|EDF|OCTOPUS)\b",
        "utilities",
        0.85,
    ),
    (
        r"(?i)(ADDEBITO\s+SDD|DIRECT\s+DEBIT|SEPA\s+DD).*\b(TIM|VODAFONE|WIND\w*|ILIAD|FASTWEB|BT|O2)\b",
        "telecom",
        0.85,
    ),
    (r"(?i)ADDEBITO\s+SDD|DIRECT\s+DEBIT|SEPA\s+DD", "other_expense", 0.5),
    // ── Movements ────────────────────────────────────────────────────────────
    (r"(?i)BONIFICO\s+(DA|A|IN\s+FAVORE)\b|BANK\s+TRANSFER", "transfers", 0.3),
    (r"(?i)PAGAMENTO\s+POS|CARD\s+PAYMENT|POS\s+PURCHASE", "other_expense", 0.3),
    (r"(?i)PRELIEVO\s+(BANCOMAT|ATM)|ATM\s+WITHDRAWAL|CASH\s+WITHDRAWAL", "cash_withdrawal", 0.6),
    (r"(?i)GIROCONTO|INTERNAL\s+TRANSFER|TRANSFER\s+BETWEEN\s+ACCOUNTS", "internal_transfer", 0.3),
    // ── Bank income ──────────────────────────────────────────────────────────
    (r"(?i)ACCREDITO\s+COMPETENZE|INTERESSI\s+CREDITOR|INTEREST\s+(PAID|CREDIT)", "interest", 0.85),
    // ── Car & insurance ──────────────────────────────────────────────────────
    (r"(?i)PEDAGG|TELEPASS|AUTOSTRAD|\bTOLLS?\b", "tolls_parking", 0.8),
    (
        r"(?i)ASSICURAZION.*AUTO|\bRCA\b|POLIZZA.*AUTO|CAR\s+INSURANCE|MOTOR\s+INSURANCE",
        "car_insurance",
        0.85,
    ),
    (
        r"(?i)ASSICURAZION.*CASA|POLIZZA.*CASA|HOME\s+INSURANCE",
        "home_insurance",
        0.85,
    ),
    // ── Taxes, refunds, investments ──────────────────────────────────────────
    (
        r"(?i)\bF24\b|TASSE|TRIBUT|IRPEF|\bIMU\b|\bTASI\b|\bTARI\b|HMRC|TAX\s+PAYMENT",
        "taxes",
        0.85,
    ),
    (r"(?i)RIMBORSO|STORNO|REFUND", "refunds", 0.7),
    (r"(?i)DIVIDEND|CEDOLA", "dividends", 0.85),
];

/// Compiled pattern rules in match order.
pub fn rules() -> &'static [PatternRule] {
    static RULES: OnceLock<Vec<PatternRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|&(pattern, category, confidence)| PatternRule {
                regex: Regex::new(pattern).expect("invalid regex"),
                category,
                confidence,
            })
            .collect()
    })
}

/// First pattern matching `description`, if any.
pub fn find(description: &str) -> Option<&'static PatternRule> {
    rules().iter().find(|r| r.regex.is_match(description))
}
