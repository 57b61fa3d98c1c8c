use inflow_core::{
    CategorizationResult, CategorizedTransaction, Direction, MatchedBy, RawTransaction,
};
use serde::{Deserialize, Serialize};

use super::{keywords, patterns};

pub const KEYWORD_CONFIDENCE: f32 = 0.7;
pub const FALLBACK_INCOME: &str = "other_income";
pub const FALLBACK_EXPENSE: &str = "other_expense";

/// A categorization rule supplied by the caller. The engine never stores or
/// edits rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRule {
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub match_kind: MatchKind,
    pub category_name: String,
    /// Higher wins.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Contains,
    Exact,
    StartsWith,
    Regex,
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: UserRule,
    pattern_lower: String,
    compiled_regex: Option<regex::Regex>,
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<UserRule>,
}

/// Staged categorizer: user rules, then keywords, then narrative patterns,
/// then a direction-based fallback. The first stage that matches decides.
pub struct CategorizationEngine {
    rules: Vec<CompiledRule>,
}

impl Default for CategorizationEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CategorizationEngine {
    pub fn new(rules: Vec<UserRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = if rule.match_kind == MatchKind::Regex {
                    match regex::RegexBuilder::new(&rule.pattern)
                        .case_insensitive(true)
                        .build()
                    {
                        Ok(re) => Some(re),
                        Err(e) => {
                            tracing::warn!(rule_id = %rule.id, error = %e, "Invalid rule regex; rule will never match");
                            None
                        }
                    }
                } else {
                    None
                };
                CompiledRule {
                    pattern_lower: rule.pattern.to_lowercase(),
                    rule,
                    compiled_regex,
                }
            })
            .collect();
        // Highest priority first; the sort is stable so ties keep input order.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    /// Build an engine from a TOML document of `[[rules]]` tables.
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        Ok(Self::new(load_rules(toml_content)?))
    }

    pub fn classify(&self, description: &str, direction: Direction) -> CategorizationResult {
        let lower = description.to_lowercase();

        if let Some(cr) = self.rules.iter().find(|cr| rule_matches(cr, &lower)) {
            return CategorizationResult::from_user_rule(&cr.rule.category_name, &cr.rule.id);
        }

        if let Some((_, category)) = keywords::by_length()
            .iter()
            .find(|(keyword, _)| keywords::matches(&lower, keyword))
        {
            return CategorizationResult::new(category, KEYWORD_CONFIDENCE, MatchedBy::Keyword);
        }

        if let Some(rule) = patterns::find(description) {
            return CategorizationResult::new(rule.category, rule.confidence, MatchedBy::Pattern);
        }

        let fallback = match direction {
            Direction::Income => FALLBACK_INCOME,
            Direction::Expense | Direction::Transfer => FALLBACK_EXPENSE,
        };
        CategorizationResult::new(fallback, 0.0, MatchedBy::Fallback)
    }

    pub fn categorize(&self, transaction: RawTransaction) -> CategorizedTransaction {
        let categorization = self.classify(&transaction.description, transaction.direction);
        CategorizedTransaction {
            transaction,
            categorization,
        }
    }

    /// Categorize each transaction independently, preserving order.
    pub fn categorize_batch(&self, transactions: Vec<RawTransaction>) -> Vec<CategorizedTransaction> {
        transactions.into_iter().map(|tx| self.categorize(tx)).collect()
    }
}

/// Parse a TOML document of `[[rules]]` tables.
pub fn load_rules(toml_content: &str) -> Result<Vec<UserRule>, String> {
    let file: RuleFile =
        toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
    Ok(file.rules)
}

fn rule_matches(cr: &CompiledRule, lower: &str) -> bool {
    match cr.rule.match_kind {
        MatchKind::Contains => lower.contains(&cr.pattern_lower),
        MatchKind::Exact => lower == cr.pattern_lower,
        MatchKind::StartsWith => lower.starts_with(&cr.pattern_lower),
        MatchKind::Regex => cr.compiled_regex.as_ref().is_some_and(|re| re.is_match(lower)),
    }
}
