use async_trait::async_trait;
use serde::Serialize;

/// Outcome of one translation call. There is no way to build a
/// successful result without translated text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    original: String,
    translated: Option<String>,
    error: Option<String>,
}

impl TranslationResult {
    pub fn ok(original: impl Into<String>, translated: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            translated: Some(translated.into()),
            error: None,
        }
    }

    pub fn failed(original: impl Into<String>, error: impl ToString) -> Self {
        Self {
            original: original.into(),
            translated: None,
            error: Some(error.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.translated.is_some()
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn translated(&self) -> Option<&str> {
        self.translated.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_translated(self) -> Option<String> {
        self.translated
    }
}

/// Best-effort machine translation. Implementations report failures in
/// the returned value and never panic or error out of `translate`.
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    /// False when calls are deferred to a later pass.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> TranslationResult;
}
