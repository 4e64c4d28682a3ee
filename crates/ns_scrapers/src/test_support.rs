//! Hand-written fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ns_core::{TranslationResult, Translator};

use crate::encoding::DecodeStage;
use crate::fetcher::{FetchError, FetchedPage, PageFetcher};

/// Serves pages from a map; anything else is a 404.
#[derive(Default)]
pub struct MapFetcher {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(text) => Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                text: text.clone(),
                encoding: "UTF-8",
                stage: DecodeStage::Declared,
                elapsed: Duration::from_millis(1),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                code: 404,
            }),
        }
    }
}

/// Prefixes text with "EN:" and counts calls.
#[derive(Default)]
pub struct MockTranslator {
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(&self, text: &str, _from: &str, _to: &str) -> TranslationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TranslationResult::ok(text, format!("EN:{}", text))
    }
}
