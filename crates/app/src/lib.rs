pub mod error;
pub mod workflow;

pub use error::{ErrorKind, ErrorResponse, WorkflowError};
pub use workflow::{ConfirmOutcome, ImportWorkflow, PreviewRow, PreviewView};
