pub mod engine;
pub mod keywords;
pub mod patterns;

pub use engine::{load_rules, CategorizationEngine, MatchKind, UserRule};
