// Extractor module - embed page to playable HLS playlist, then player handoff
//
// Resolvers:
// - browser: headless Chromium with request interception and DOM fallback
// - static: page variables + companion script token + host probing
// - direct: raw page scan for a playlist link
//
// Exactly one resolver runs per request; see `ResolverMode`.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod headers;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod player;
pub mod resolvers;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, ExtractorConfig};
pub use diagnostics::DiagnosticLog;
pub use errors::{ExtractError, Stage, StageError};
pub use headers::{derive_headers, normalize, HeaderSet};
pub use models::{CapturedStream, DiscoveryMethod, EmbedReference};
pub use orchestrator::ExtractionOrchestrator;
pub use player::{LaunchOutcome, PlayerLauncher};
pub use traits::{Resolver, ResolverMode};
