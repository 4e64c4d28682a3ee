pub mod clean;
pub mod cli;
pub mod content;
pub mod encoding;
pub mod fetcher;
pub mod ingest;
pub mod links;
pub mod logging;
pub mod manager;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use cli::{handle_command, FetchArgs, ScraperArgs, ScraperCommands};
pub use content::{ContentExtractor, ExtractionFailure, FailureReason};
pub use encoding::{DecodeStage, FallbackDecoder};
pub use fetcher::{FetchError, Fetcher, FetcherConfig, PageFetcher};
pub use ingest::{IngestCandidate, Ingestor, RunSummary};
pub use manager::{run_blocking, PipelineConfig, ScraperManager, StepSummary};
pub use registry::{classify, Registry};

pub mod prelude {
    pub use super::content::ContentExtractor;
    pub use super::fetcher::{Fetcher, FetcherConfig, PageFetcher};
    pub use super::manager::{PipelineConfig, ScraperManager};
    pub use super::registry::Registry;
    pub use ns_core::{ArticleReference, Error, ExtractedContent, Result};
}
