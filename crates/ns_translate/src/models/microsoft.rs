use std::fmt;

use async_trait::async_trait;
use ns_core::{Error, Result, TranslationResult, Translator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::sanitize::sanitize;
use crate::{TranslationError, TranslatorConfig};

const API_VERSION: &str = "3.0";

#[derive(Serialize)]
struct TranslateRequest<'a> {
    #[serde(rename = "Text")]
    text: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

/// Client for the Microsoft Translator v3 REST API.
pub struct MicrosoftTranslator {
    client: Client,
    api_key: String,
    region: String,
    endpoint: String,
}

impl fmt::Debug for MicrosoftTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrosoftTranslator")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl MicrosoftTranslator {
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config("Microsoft Translator API key is required".to_string()))?;

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            region: config.region.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, text: &str, from: &str, to: &str) -> std::result::Result<String, TranslationError> {
        let text = sanitize(text);
        if text.is_empty() {
            return Err(TranslationError::EmptyText);
        }

        let trace_id = new_trace_id();
        let response = self
            .client
            .post(format!("{}/translate", self.endpoint))
            .query(&[("api-version", API_VERSION), ("from", from), ("to", to)])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Ocp-Apim-Subscription-Region", &self.region)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("X-ClientTraceId", &trace_id)
            .json(&[TranslateRequest { text: &text }])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: Vec<TranslateResponse> =
            serde_json::from_str(&body).map_err(|e| TranslationError::Decode(e.to_string()))?;
        debug!(trace_id = %trace_id, "Translation response received");

        parsed
            .into_iter()
            .next()
            .and_then(|r| r.translations.into_iter().next())
            .map(|t| t.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(TranslationError::EmptyResult)
    }
}

/// Sent as `X-ClientTraceId`, one per request.
fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Translator for MicrosoftTranslator {
    fn name(&self) -> &str {
        "Microsoft"
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn translate(&self, text: &str, from: &str, to: &str) -> TranslationResult {
        match self.request(text, from, to).await {
            Ok(translated) => TranslationResult::ok(text, translated),
            Err(e) => {
                warn!(error = %e, "Translation failed");
                TranslationResult::failed(text, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_rejected() {
        let config = TranslatorConfig {
            api_key: Some("   ".to_string()),
            ..TranslatorConfig::default()
        };
        let err = MicrosoftTranslator::new(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Microsoft Translator API key is required"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = TranslatorConfig {
            api_key: Some("secret-key".to_string()),
            ..TranslatorConfig::default()
        };
        let translator = MicrosoftTranslator::new(&config).unwrap();
        let debug = format!("{:?}", translator);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_trace_ids_are_unique() {
        let first = new_trace_id();
        assert_eq!(first.len(), 36);
        assert_ne!(first, new_trace_id());
    }

    #[tokio::test]
    async fn test_empty_text_is_not_sent() {
        let config = TranslatorConfig {
            api_key: Some("k".to_string()),
            endpoint: "http://127.0.0.1:9".to_string(),
            ..TranslatorConfig::default()
        };
        let translator = MicrosoftTranslator::new(&config).unwrap();
        let result = translator.translate("\0 ", "zh", "en").await;
        assert!(!result.success());
        assert_eq!(result.error(), Some("nothing to translate"));
    }
}
