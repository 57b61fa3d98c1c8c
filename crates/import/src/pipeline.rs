use inflow_core::{CategorizedTransaction, SourceDialect};
use serde::{Deserialize, Serialize};

use crate::categorize::CategorizationEngine;
use crate::registry::{ParserRegistry, RegistryError};

/// Everything a preview needs from one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub source_dialect: SourceDialect,
    pub row_count: usize,
    pub parsed_count: usize,
    pub transactions: Vec<CategorizedTransaction>,
    pub errors: Vec<String>,
}

impl PipelineOutput {
    /// Rows that got a category from anything but the fallback.
    pub fn categorized_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.categorization.matched_by != inflow_core::MatchedBy::Fallback)
            .count()
    }
}

/// Detect, parse and categorize an upload in one pass.
pub struct ImportPipeline {
    registry: ParserRegistry,
    engine: CategorizationEngine,
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::new(ParserRegistry::default(), CategorizationEngine::default())
    }
}

impl ImportPipeline {
    pub fn new(registry: ParserRegistry, engine: CategorizationEngine) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn run(&self, filename: &str, content: &[u8]) -> Result<PipelineOutput, RegistryError> {
        self.run_with(&self.engine, filename, content)
    }

    /// Like [`run`](Self::run) with a caller-supplied engine, e.g. one built
    /// from the requesting user's rules.
    pub fn run_with(
        &self,
        engine: &CategorizationEngine,
        filename: &str,
        content: &[u8],
    ) -> Result<PipelineOutput, RegistryError> {
        let parsed = self.registry.parse(filename, content)?;
        let transactions = engine.categorize_batch(parsed.transactions);
        let output = PipelineOutput {
            source_dialect: parsed.source_dialect,
            row_count: parsed.row_count,
            parsed_count: parsed.parsed_count,
            transactions,
            errors: parsed.errors,
        };
        tracing::info!(
            filename,
            dialect = %output.source_dialect,
            rows = output.row_count,
            parsed = output.parsed_count,
            categorized = output.categorized_count(),
            errors = output.errors.len(),
            "Upload parsed and categorized"
        );
        Ok(output)
    }
}
