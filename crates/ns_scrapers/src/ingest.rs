//! Insert-time deduplication against the article store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use ns_core::{
    ArticleReference, ArticleStore, ContentLanguage, Error, ExtractedContent, NewArticle, Result,
    StoreTransaction, Translator,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::registry::classify;

/// A discovered link, with its body when the run extracted one.
#[derive(Debug, Clone)]
pub struct IngestCandidate {
    pub reference: ArticleReference,
    pub content: Option<ExtractedContent>,
}

impl From<ArticleReference> for IngestCandidate {
    fn from(reference: ArticleReference) -> Self {
        Self {
            reference,
            content: None,
        }
    }
}

/// Aggregate counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub new_articles: usize,
    /// Known URLs whose missing section label was filled in.
    pub updated: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub total_processed: usize,
    /// Links stored without a body because extraction failed.
    pub extraction_failures: usize,
}

impl RunSummary {
    pub fn duplicate_or_updated(&self) -> usize {
        self.duplicates + self.updated
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.new_articles += other.new_articles;
        self.updated += other.updated;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
        self.total_processed += other.total_processed;
        self.extraction_failures += other.extraction_failures;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} duplicate or updated, {} errors, {} processed",
            self.new_articles,
            self.duplicate_or_updated(),
            self.errors,
            self.total_processed
        )
    }
}

enum Outcome {
    Inserted,
    Backfilled,
    Duplicate,
}

/// A candidate with its record built ahead of the batch. `article` is
/// `None` when the URL was already stored at lookup time.
struct Prepared<'a> {
    candidate: &'a IngestCandidate,
    article: Option<NewArticle>,
}

pub struct Ingestor {
    store: Arc<dyn ArticleStore>,
    translator: Arc<dyn Translator>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ArticleStore>, translator: Arc<dyn Translator>) -> Self {
        Self { store, translator }
    }

    /// Persist `candidates` as one batch. Per-record failures are counted
    /// and the batch carries on; only opening or committing the batch can
    /// fail the call, and a failed commit persists nothing.
    ///
    /// Titles and bodies are translated before the batch is opened, so no
    /// remote call runs while the store holds a write lock.
    #[instrument(skip_all, fields(candidates = candidates.len(), %collection_date))]
    pub async fn ingest(
        &self,
        candidates: Vec<IngestCandidate>,
        collection_date: NaiveDate,
    ) -> Result<RunSummary> {
        let batch = self.prepare(&candidates, collection_date).await;

        let mut tx = self.store.begin().await?;
        let mut summary = RunSummary::default();

        for prepared in &batch {
            let candidate = prepared.candidate;
            summary.total_processed += 1;
            match self.ingest_one(tx.as_mut(), prepared, collection_date).await {
                Ok(Outcome::Inserted) => summary.new_articles += 1,
                Ok(Outcome::Backfilled) => summary.updated += 1,
                Ok(Outcome::Duplicate) => summary.duplicates += 1,
                Err(e) if e.is_unique_violation() => {
                    debug!(url = %candidate.reference.url, "Insert raced with another writer, counted as duplicate");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(url = %candidate.reference.url, error = %e, "Failed to ingest article");
                    summary.errors += 1;
                }
            }
        }

        if let Err(e) = tx.commit().await {
            error!(error = %e, "Batch commit failed, nothing from this run was persisted");
            return Err(match e {
                Error::Commit(_) => e,
                other => Error::Commit(other.to_string()),
            });
        }

        info!(
            new = summary.new_articles,
            updated = summary.updated,
            duplicates = summary.duplicates,
            errors = summary.errors,
            "💾 Batch committed"
        );
        Ok(summary)
    }

    /// Look up every candidate outside the batch and build (and translate)
    /// a record for the unknown ones. A URL repeated within the batch is
    /// only translated once.
    async fn prepare<'a>(
        &self,
        candidates: &'a [IngestCandidate],
        collection_date: NaiveDate,
    ) -> Vec<Prepared<'a>> {
        let mut built: HashMap<&str, NewArticle> = HashMap::new();
        let mut prepared = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let url = candidate.reference.url.as_str();
            let article = match built.get(url) {
                Some(article) => Some(article.clone()),
                None => {
                    let known = match self.store.find_by_url(url).await {
                        Ok(found) => found.is_some(),
                        Err(e) => {
                            warn!(url, error = %e, "Lookup failed, preparing a new record");
                            false
                        }
                    };
                    if known {
                        None
                    } else {
                        let article = self.build_article(candidate, collection_date).await;
                        built.insert(url, article.clone());
                        Some(article)
                    }
                }
            };
            prepared.push(Prepared { candidate, article });
        }
        prepared
    }

    async fn ingest_one(
        &self,
        tx: &mut dyn StoreTransaction,
        prepared: &Prepared<'_>,
        collection_date: NaiveDate,
    ) -> Result<Outcome> {
        let reference = &prepared.candidate.reference;
        if let Some(existing) = tx.find_by_url(&reference.url).await? {
            if existing.source_section.is_some() {
                return Ok(Outcome::Duplicate);
            }
            tx.backfill_section(existing.id, &reference.section).await?;
            return Ok(Outcome::Backfilled);
        }

        // Stored at lookup time but gone now: insert it untranslated.
        let untranslated;
        let article = match &prepared.article {
            Some(article) => article,
            None => {
                untranslated = new_article(prepared.candidate, collection_date);
                &untranslated
            }
        };
        tx.insert(article).await?;
        Ok(Outcome::Inserted)
    }

    async fn build_article(&self, candidate: &IngestCandidate, collection_date: NaiveDate) -> NewArticle {
        let mut article = new_article(candidate, collection_date);
        if !article.content_language.is_english() {
            article.title_english = self.to_english(&article.title).await;
            if let Some(body) = &article.full_content {
                article.full_content_english = self.to_english(body).await;
            }
        }
        article
    }

    /// Best effort: a failed or deferred translation is just `None`.
    async fn to_english(&self, text: &str) -> Option<String> {
        if !self.translator.is_enabled() || text.trim().is_empty() {
            return None;
        }
        self.translator
            .translate(text, ContentLanguage::Zh.code(), ContentLanguage::En.code())
            .await
            .into_translated()
    }
}

/// The record for `candidate` before any translation. English sources
/// already carry their English text.
fn new_article(candidate: &IngestCandidate, collection_date: NaiveDate) -> NewArticle {
    let reference = &candidate.reference;
    let content = candidate.content.as_ref();
    let source_domain = match content {
        Some(content) => content.domain.clone(),
        None => classify(&reference.url).0,
    };
    let full_content = content.map(|c| c.content.clone());
    let english = reference.language.is_english();

    NewArticle {
        title: reference.title.clone(),
        title_english: english.then(|| reference.title.clone()),
        source_url: reference.url.clone(),
        source_section: Some(reference.section.clone()),
        collection_date,
        source_domain,
        content_language: reference.language,
        full_content_english: if english { full_content.clone() } else { None },
        full_content,
    }
}
