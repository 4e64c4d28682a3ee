use std::sync::Arc;

use ns_core::{Result, Translator};
use tracing::info;

use crate::TranslatorConfig;

pub mod deferred;
pub mod microsoft;

pub use deferred::DeferredTranslator;
pub use microsoft::MicrosoftTranslator;

/// Pick the translator for this process. With `immediate` unset nothing is
/// sent over the wire and translation is left to a later pass.
pub fn create_translator(config: &TranslatorConfig, immediate: bool) -> Result<Arc<dyn Translator>> {
    if !immediate {
        info!("Translation deferred");
        return Ok(Arc::new(DeferredTranslator::new()));
    }
    let translator = MicrosoftTranslator::new(config)?;
    info!(region = %config.region, "Microsoft Translator initialized");
    Ok(Arc::new(translator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_when_not_immediate() {
        let translator = create_translator(&TranslatorConfig::default(), false).unwrap();
        assert!(!translator.is_enabled());
        assert_eq!(translator.name(), "Deferred");
    }

    #[test]
    fn test_immediate_requires_key() {
        let result = create_translator(&TranslatorConfig::default(), true);
        assert!(matches!(result, Err(ns_core::Error::Config(_))));

        let config = TranslatorConfig {
            api_key: Some("test-key".to_string()),
            ..TranslatorConfig::default()
        };
        let translator = create_translator(&config, true).unwrap();
        assert!(translator.is_enabled());
        assert_eq!(translator.name(), "Microsoft");
    }
}
