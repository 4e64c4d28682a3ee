use std::fmt;

use async_trait::async_trait;
use ns_core::{TranslationResult, Translator};

/// Stands in for a real translator in development mode. Records stay
/// untranslated until `translate_pending` runs with a real one.
#[derive(Default)]
pub struct DeferredTranslator;

impl fmt::Debug for DeferredTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTranslator").finish()
    }
}

impl DeferredTranslator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Translator for DeferredTranslator {
    fn name(&self) -> &str {
        "Deferred"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn translate(&self, text: &str, _from: &str, _to: &str) -> TranslationResult {
        TranslationResult::failed(text, "translation deferred")
    }
}
