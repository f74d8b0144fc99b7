pub mod extractor;
pub mod logging;

pub use extractor::{
    CapturedStream, DiagnosticLog, ExtractError, ExtractionOrchestrator, ExtractorConfig,
    LaunchOutcome, ResolverMode, StageError,
};
