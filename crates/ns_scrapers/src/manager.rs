use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use ns_core::{
    ArticleReference, ArticleStore, ContentLanguage, Error, ExtractedContent, PersistedArticle,
    Result, Translator,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::content::{ContentExtractor, ExtractionFailure};
use crate::fetcher::{FetchError, PageFetcher};
use crate::ingest::{IngestCandidate, Ingestor, RunSummary};
use crate::links::{dedup_references, extract_links};
use crate::registry::{Registry, SourceSection};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Detail pages extracted concurrently. Per-host spacing is still
    /// enforced by the fetcher.
    pub workers: usize,
    /// Extract bodies during a fetch pass instead of storing links only.
    pub fetch_content: bool,
    /// Translate bodies as soon as they are scraped.
    pub translate_immediately: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            fetch_content: true,
            translate_immediately: false,
        }
    }
}

/// Counts for a follow-up step over already stored articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct ScraperManager {
    registry: Arc<Registry>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: ContentExtractor,
    ingestor: Ingestor,
    store: Arc<dyn ArticleStore>,
    translator: Arc<dyn Translator>,
    config: PipelineConfig,
}

impl ScraperManager {
    pub fn new(
        registry: Arc<Registry>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ArticleStore>,
        translator: Arc<dyn Translator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: ContentExtractor::new(fetcher.clone(), registry.clone()),
            ingestor: Ingestor::new(store.clone(), translator.clone()),
            registry,
            fetcher,
            store,
            translator,
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch one listing page and return its unique links.
    #[instrument(skip_all, fields(section = %section.label()))]
    pub async fn discover_section(
        &self,
        section: &SourceSection,
    ) -> std::result::Result<Vec<ArticleReference>, FetchError> {
        let page = self.fetcher.fetch(section.listing_url.as_str()).await?;
        let references = dedup_references(extract_links(&page.text, section, Utc::now()));
        info!(count = references.len(), "🔗 Found links");
        Ok(references)
    }

    /// Every section of `source`, one after another. A listing that cannot
    /// be fetched is logged and skipped.
    pub async fn discover(&self, source: &str) -> Result<Vec<ArticleReference>> {
        let sections = self.registry.sections_for(source);
        if sections.is_empty() {
            return Err(Error::Config(format!("Unknown source: {}", source)));
        }

        let mut references = Vec::new();
        for section in sections {
            match self.discover_section(section).await {
                Ok(mut found) => references.append(&mut found),
                Err(e) => warn!(section = %section.label(), error = %e, "Skipping section"),
            }
        }
        Ok(dedup_references(references))
    }

    /// One fetch pass over `source`, or over every source when `None`.
    /// Sources run sequentially and each one is ingested as its own batch.
    pub async fn run(&self, source: Option<&str>, collection_date: NaiveDate) -> Result<RunSummary> {
        self.run_with(source, collection_date, self.config.fetch_content).await
    }

    /// `run` with the listing-only/full choice made by the caller.
    pub async fn run_with(
        &self,
        source: Option<&str>,
        collection_date: NaiveDate,
        fetch_content: bool,
    ) -> Result<RunSummary> {
        let sources: Vec<String> = match source {
            Some(source) => vec![source.to_string()],
            None => self.registry.source_names().into_iter().map(str::to_string).collect(),
        };

        let mut summary = RunSummary::default();
        for source in &sources {
            info!(source = %source, "🦗 Scraping");
            let references = self.discover(source).await?;
            let (candidates, extraction_failures) = if fetch_content {
                self.extract_all(references).await
            } else {
                (references.into_iter().map(IngestCandidate::from).collect(), 0)
            };
            let mut batch = self.ingestor.ingest(candidates, collection_date).await?;
            batch.extraction_failures = extraction_failures;
            info!(source = %source, "{}", batch);
            summary.merge(&batch);
        }
        Ok(summary)
    }

    /// Extract bodies through the worker pool. URLs already stored are not
    /// fetched again. Returns the candidates and how many extractions failed;
    /// a failed one is still ingested as a bare reference.
    async fn extract_all(&self, references: Vec<ArticleReference>) -> (Vec<IngestCandidate>, usize) {
        let results: Vec<(IngestCandidate, bool)> = stream::iter(references)
            .map(|reference| async move {
                let known = match self.store.find_by_url(&reference.url).await {
                    Ok(found) => found.is_some(),
                    Err(e) => {
                        warn!(url = %reference.url, error = %e, "Lookup failed, extracting anyway");
                        false
                    }
                };
                if known {
                    return (IngestCandidate { reference, content: None }, false);
                }
                match self.extractor.extract_url(&reference.url).await {
                    Ok(content) => (
                        IngestCandidate {
                            reference,
                            content: Some(content),
                        },
                        false,
                    ),
                    Err(failure) => {
                        warn!(url = %reference.url, reason = %failure.reason, "Storing link without body");
                        (IngestCandidate { reference, content: None }, true)
                    }
                }
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let failures = results.iter().filter(|(_, failed)| *failed).count();
        (results.into_iter().map(|(candidate, _)| candidate).collect(), failures)
    }

    pub async fn extract_url(&self, url: &str) -> std::result::Result<ExtractedContent, ExtractionFailure> {
        self.extractor.extract_url(url).await
    }

    /// Scrape bodies for stored articles that do not have one yet.
    pub async fn scrape_pending(&self, limit: usize) -> Result<StepSummary> {
        let pending = self.store.pending_content(limit).await?;
        let outcomes: Vec<Result<bool>> = stream::iter(pending)
            .map(|article| async move { self.scrape_one(&article).await })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;
        Ok(tally("scrape", outcomes))
    }

    async fn scrape_one(&self, article: &PersistedArticle) -> Result<bool> {
        if article.is_content_scraped {
            return Ok(false);
        }
        let content = match self.extractor.extract_url(&article.source_url).await {
            Ok(content) => content,
            Err(_) => return Ok(false),
        };
        self.store
            .mark_content_scraped(article.id, &content.content, Utc::now())
            .await?;

        if self.config.translate_immediately && !article.content_language.is_english() {
            if let Some(english) = self.to_english(&content.content).await {
                self.store
                    .mark_content_translated(article.id, &english, Utc::now())
                    .await?;
            }
        }
        Ok(true)
    }

    /// Fill in missing title and body translations.
    pub async fn translate_pending(&self, limit: usize) -> Result<StepSummary> {
        if !self.translator.is_enabled() {
            return Err(Error::Config(format!(
                "translator {} is disabled, configure an API key to translate",
                self.translator.name()
            )));
        }
        let pending = self.store.pending_translation(limit).await?;
        let mut outcomes = Vec::with_capacity(pending.len());
        for article in &pending {
            outcomes.push(self.translate_one(article).await);
        }
        Ok(tally("translate", outcomes))
    }

    async fn translate_one(&self, article: &PersistedArticle) -> Result<bool> {
        let mut complete = true;
        if article.title_english.is_none() {
            match self.to_english(&article.title).await {
                Some(english) => self.store.set_title_translation(article.id, &english).await?,
                None => complete = false,
            }
        }
        if let (Some(body), false) = (&article.full_content, article.is_content_translated) {
            match self.to_english(body).await {
                Some(english) => {
                    self.store
                        .mark_content_translated(article.id, &english, Utc::now())
                        .await?
                }
                None => complete = false,
            }
        }
        Ok(complete)
    }

    async fn to_english(&self, text: &str) -> Option<String> {
        if !self.translator.is_enabled() {
            return None;
        }
        self.translator
            .translate(text, ContentLanguage::Zh.code(), ContentLanguage::En.code())
            .await
            .into_translated()
    }

    /// Stored articles for a date, a domain, or both.
    pub async fn articles(
        &self,
        date: Option<NaiveDate>,
        domain: Option<&str>,
    ) -> Result<Vec<PersistedArticle>> {
        match (date, domain) {
            (Some(date), Some(domain)) => Ok(self
                .store
                .by_collection_date(date)
                .await?
                .into_iter()
                .filter(|a| a.source_domain.eq_ignore_ascii_case(domain))
                .collect()),
            (Some(date), None) => self.store.by_collection_date(date).await,
            (None, Some(domain)) => self.store.by_domain(domain).await,
            (None, None) => self.store.by_collection_date(Utc::now().date_naive()).await,
        }
    }
}

fn tally(step: &str, outcomes: Vec<Result<bool>>) -> StepSummary {
    let mut summary = StepSummary {
        attempted: outcomes.len(),
        ..StepSummary::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(true) => summary.completed += 1,
            Ok(false) => summary.failed += 1,
            Err(e) => {
                error!(step, error = %e, "Storage update failed");
                summary.failed += 1;
            }
        }
    }
    info!(
        step,
        attempted = summary.attempted,
        completed = summary.completed,
        failed = summary.failed,
        "Follow-up step finished"
    );
    summary
}

/// Drive a pipeline future from synchronous code on a private
/// current-thread runtime. Must not be called from inside a runtime.
pub fn run_blocking<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SelectorDefinition, SourceDefinition};
    use crate::test_support::{MapFetcher, MockTranslator};
    use ns_storage::MemoryStorage;
    use ns_translate::models::DeferredTranslator;

    const LISTING_URL: &str = "http://news.test/politics/";

    fn registry() -> Arc<Registry> {
        let source = |section: &str, listing: &str| SourceDefinition {
            source: "Test Wire".to_string(),
            section: section.to_string(),
            listing_url: listing.to_string(),
            link_selector: "ul.list a".to_string(),
            base_url: None,
            language: ContentLanguage::Zh,
        };
        let selector = SelectorDefinition {
            domain: "news.test".to_string(),
            subcategory: "default".to_string(),
            content: "div.body p".to_string(),
            title: Some("h1".to_string()),
            author: None,
            date: None,
            remove: vec![".share".to_string()],
        };
        let fallback = SelectorDefinition {
            domain: "default".to_string(),
            content: "article".to_string(),
            title: None,
            ..selector.clone()
        };
        Arc::new(
            Registry::from_definitions(
                vec![
                    source("Politics", LISTING_URL),
                    source("Broken", "http://news.test/broken/"),
                ],
                vec![selector],
                fallback,
            )
            .unwrap(),
        )
    }

    fn detail(title: &str) -> String {
        let body: String = "新闻正文内容，用于测试抓取流程是否完整。".chars().cycle().take(120).collect();
        format!(
            r#"<html><body><h1>{}</h1><div class="body"><p>{}</p><p class="share">分享到微博分享到微信分享到朋友圈</p></div></body></html>"#,
            title, body
        )
    }

    fn fetcher() -> MapFetcher {
        MapFetcher::new()
            .page(
                LISTING_URL,
                r#"<ul class="list">
                    <li><a href="a.html">第一篇</a></li>
                    <li><a href="b.html">第二篇</a></li>
                    <li><a href="a.html">第一篇（重复）</a></li>
                    <li><a href="missing.html">失效链接</a></li>
                </ul>"#,
            )
            .page("http://news.test/politics/a.html", &detail("第一篇"))
            .page("http://news.test/politics/b.html", &detail("第二篇"))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn manager(fetcher: Arc<MapFetcher>, store: Arc<MemoryStorage>, config: PipelineConfig) -> ScraperManager {
        ScraperManager::new(registry(), fetcher, store, Arc::new(DeferredTranslator::new()), config)
    }

    #[tokio::test]
    async fn test_full_run_then_rerun() {
        let fetcher = Arc::new(fetcher());
        let store = Arc::new(MemoryStorage::new());
        let manager = manager(fetcher.clone(), store.clone(), PipelineConfig::default());

        let summary = manager.run(Some("test-wire"), date()).await.unwrap();
        assert_eq!(summary.new_articles, 3);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.extraction_failures, 1);

        let a = store.find_by_url("http://news.test/politics/a.html").await.unwrap().unwrap();
        assert!(a.is_content_scraped);
        assert!(!a.full_content.as_deref().unwrap().contains("分享"));
        assert_eq!(a.source_section.as_deref(), Some("Test Wire - Politics"));
        assert_eq!(a.source_domain, "news.test");

        let missing = store.find_by_url("http://news.test/politics/missing.html").await.unwrap().unwrap();
        assert!(!missing.is_content_scraped);

        let detail_fetches = |fetcher: &MapFetcher| {
            fetcher.requests().iter().filter(|u| u.ends_with(".html")).count()
        };
        assert_eq!(detail_fetches(&fetcher), 3);

        let again = manager.run(Some("Test Wire"), date()).await.unwrap();
        assert_eq!(again.new_articles, 0);
        assert_eq!(again.duplicates, 3);
        assert_eq!(again.extraction_failures, 0);
        assert_eq!(detail_fetches(&fetcher), 3);
    }

    #[tokio::test]
    async fn test_listing_only_then_scrape_pending() {
        let fetcher = Arc::new(fetcher());
        let store = Arc::new(MemoryStorage::new());
        let config = PipelineConfig {
            fetch_content: false,
            ..PipelineConfig::default()
        };
        let manager = manager(fetcher, store.clone(), config);

        let summary = manager.run(None, date()).await.unwrap();
        assert_eq!(summary.new_articles, 3);
        assert_eq!(summary.extraction_failures, 0);
        assert_eq!(store.pending_content(10).await.unwrap().len(), 3);

        let step = manager.scrape_pending(10).await.unwrap();
        assert_eq!(step.attempted, 3);
        assert_eq!(step.completed, 2);
        assert_eq!(step.failed, 1);
        assert_eq!(store.pending_content(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_source_is_config_error() {
        let manager = manager(Arc::new(fetcher()), Arc::new(MemoryStorage::new()), PipelineConfig::default());
        assert!(matches!(
            manager.run(Some("nowhere"), date()).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_translate_pending() {
        let store = Arc::new(MemoryStorage::new());
        let listing_only = PipelineConfig {
            fetch_content: false,
            ..PipelineConfig::default()
        };
        manager(Arc::new(fetcher()), store.clone(), listing_only.clone())
            .run(None, date())
            .await
            .unwrap();

        let deferred = manager(Arc::new(fetcher()), store.clone(), listing_only.clone());
        assert!(matches!(deferred.translate_pending(10).await, Err(Error::Config(_))));

        let translator = Arc::new(MockTranslator::default());
        let manager = ScraperManager::new(
            registry(),
            Arc::new(fetcher()),
            store.clone(),
            translator.clone(),
            PipelineConfig {
                translate_immediately: true,
                ..listing_only
            },
        );
        manager.scrape_pending(10).await.unwrap();
        let step = manager.translate_pending(10).await.unwrap();
        assert_eq!(step.completed, 3);
        assert!(store.pending_translation(10).await.unwrap().is_empty());

        let a = store.find_by_url("http://news.test/politics/a.html").await.unwrap().unwrap();
        assert_eq!(a.title_english.as_deref(), Some("EN:第一篇"));
        assert!(a.full_content_english.as_deref().unwrap().starts_with("EN:"));
    }

    #[test]
    fn test_run_blocking_from_sync_code() {
        let store = Arc::new(MemoryStorage::new());
        let manager = manager(Arc::new(fetcher()), store, PipelineConfig::default());
        let summary = run_blocking(manager.run(Some("test-wire"), date())).unwrap().unwrap();
        assert_eq!(summary.new_articles, 3);
    }
}
