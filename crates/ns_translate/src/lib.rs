use std::time::Duration;

use thiserror::Error;

pub mod models;
pub mod sanitize;

pub const DEFAULT_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com";
pub const DEFAULT_REGION: &str = "global";

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub api_key: Option<String>,
    pub region: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            region: DEFAULT_REGION.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Why a single translation call produced no text.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("nothing to translate")]
    EmptyText,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("response contained no translation")]
    EmptyResult,
}

pub mod prelude {
    pub use super::models::{create_translator, DeferredTranslator, MicrosoftTranslator};
    pub use super::{TranslationError, TranslatorConfig};
    pub use ns_core::{Result, TranslationResult, Translator};
}

pub use models::create_translator;
