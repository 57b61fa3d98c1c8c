pub mod categorize;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod registry;

pub use categorize::{load_rules, CategorizationEngine, MatchKind, UserRule};
pub use normalize::{parse_amount, parse_date, parse_date_with, NormalizeError};
pub use parser::pdf::{PdfPage, PdfParser, TableExtractor, TextLayoutExtractor};
pub use parser::{FormatParser, ParseError, RowError};
pub use pipeline::{ImportPipeline, PipelineOutput};
pub use registry::{ParserRegistry, RegistryError};
