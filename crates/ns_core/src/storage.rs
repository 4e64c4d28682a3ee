use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{NewArticle, PersistedArticle};
use crate::Result;

/// Persistent article store. URL uniqueness is the only invariant it
/// enforces across writers.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Open a batch. Nothing written through it is visible until commit.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    async fn get(&self, id: i64) -> Result<Option<PersistedArticle>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<PersistedArticle>>;

    /// Store the scraped body and stamp `content_scraped_at`.
    async fn mark_content_scraped(&self, id: i64, content: &str, at: DateTime<Utc>) -> Result<()>;

    /// Store the body translation and stamp `content_translated_at`.
    async fn mark_content_translated(&self, id: i64, english: &str, at: DateTime<Utc>) -> Result<()>;

    async fn set_title_translation(&self, id: i64, english: &str) -> Result<()>;

    async fn mark_summarized(
        &self,
        id: i64,
        summary: &str,
        summary_english: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn by_collection_date(&self, date: NaiveDate) -> Result<Vec<PersistedArticle>>;

    async fn by_domain(&self, domain: &str) -> Result<Vec<PersistedArticle>>;

    /// Oldest first, articles whose body has not been scraped yet.
    async fn pending_content(&self, limit: usize) -> Result<Vec<PersistedArticle>>;

    /// Oldest first, articles still missing a title or body translation.
    async fn pending_translation(&self, limit: usize) -> Result<Vec<PersistedArticle>>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Sees both committed rows and rows inserted earlier in this batch.
    async fn find_by_url(&mut self, url: &str) -> Result<Option<PersistedArticle>>;

    /// Fails with `Error::UniqueViolation` when the URL already exists.
    /// A failed insert leaves the rest of the batch intact.
    async fn insert(&mut self, article: &NewArticle) -> Result<i64>;

    async fn backfill_section(&mut self, id: i64, section: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
