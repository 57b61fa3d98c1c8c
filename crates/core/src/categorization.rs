use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::RawTransaction;

/// Which stage of the categorization pipeline produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    UserRule,
    Keyword,
    Pattern,
    Fallback,
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedBy::UserRule => write!(f, "user_rule"),
            MatchedBy::Keyword => write!(f, "keyword"),
            MatchedBy::Pattern => write!(f, "pattern"),
            MatchedBy::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub category_name: String,
    /// 0.0 = fallback guess, 1.0 = explicit user rule.
    pub confidence: f32,
    pub matched_by: MatchedBy,
    /// Set only when `matched_by` is `UserRule`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl CategorizationResult {
    pub fn new(category_name: &str, confidence: f32, matched_by: MatchedBy) -> Self {
        CategorizationResult {
            category_name: category_name.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            matched_by,
            rule_id: None,
        }
    }

    pub fn from_user_rule(category_name: &str, rule_id: &str) -> Self {
        CategorizationResult {
            category_name: category_name.to_string(),
            confidence: 1.0,
            matched_by: MatchedBy::UserRule,
            rule_id: Some(rule_id.to_string()),
        }
    }
}

/// A raw transaction paired with its categorization; the unit that is staged
/// for preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedTransaction {
    #[serde(flatten)]
    pub transaction: RawTransaction,
    pub categorization: CategorizationResult,
}

/// How the category of a persisted transaction was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationMethod {
    UserRule,
    Keyword,
    Pattern,
    Manual,
    Fallback,
}

impl CategorizationMethod {
    /// Anything but the fallback counts as a meaningful categorization.
    pub fn is_categorized(self) -> bool {
        self != CategorizationMethod::Fallback
    }
}

impl From<MatchedBy> for CategorizationMethod {
    fn from(m: MatchedBy) -> Self {
        match m {
            MatchedBy::UserRule => CategorizationMethod::UserRule,
            MatchedBy::Keyword => CategorizationMethod::Keyword,
            MatchedBy::Pattern => CategorizationMethod::Pattern,
            MatchedBy::Fallback => CategorizationMethod::Fallback,
        }
    }
}

impl fmt::Display for CategorizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategorizationMethod::UserRule => write!(f, "user_rule"),
            CategorizationMethod::Keyword => write!(f, "keyword"),
            CategorizationMethod::Pattern => write!(f, "pattern"),
            CategorizationMethod::Manual => write!(f, "manual"),
            CategorizationMethod::Fallback => write!(f, "fallback"),
        }
    }
}

impl std::str::FromStr for CategorizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_rule" => Ok(CategorizationMethod::UserRule),
            "keyword" => Ok(CategorizationMethod::Keyword),
            "pattern" => Ok(CategorizationMethod::Pattern),
            "manual" => Ok(CategorizationMethod::Manual),
            "fallback" => Ok(CategorizationMethod::Fallback),
            other => Err(format!("Unknown categorization method: '{other}'")),
        }
    }
}

/// A confirmed transaction as handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedTransaction {
    #[serde(flatten)]
    pub transaction: RawTransaction,
    pub category_name: String,
    pub categorization_method: CategorizationMethod,
}

impl FinalizedTransaction {
    /// Keep the staged decision, or replace it with a user-chosen category.
    pub fn from_staged(staged: CategorizedTransaction, category_override: Option<&str>) -> Self {
        let (category_name, categorization_method) = match category_override {
            Some(name) => (name.to_string(), CategorizationMethod::Manual),
            None => (
                staged.categorization.category_name,
                staged.categorization.matched_by.into(),
            ),
        };
        FinalizedTransaction {
            transaction: staged.transaction,
            category_name,
            categorization_method,
        }
    }
}
