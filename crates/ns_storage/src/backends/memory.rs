use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ns_core::{ArticleStore, Error, NewArticle, PersistedArticle, Result, StoreTransaction};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: Vec<PersistedArticle>,
    next_id: i64,
}

impl MemoryStore {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn find_by_url(&self, url: &str) -> Option<&PersistedArticle> {
        self.articles.iter().find(|a| a.source_url == url)
    }

    fn get_mut(&mut self, id: i64) -> Result<&mut PersistedArticle> {
        self.articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::Storage(format!("No article with id {}", id)))
    }

    fn oldest_matching<F>(&self, limit: usize, predicate: F) -> Vec<PersistedArticle>
    where
        F: Fn(&PersistedArticle) -> bool,
    {
        let mut found: Vec<_> = self.articles.iter().filter(|a| predicate(a)).cloned().collect();
        found.sort_by_key(|a| a.id);
        found.truncate(limit);
        found
    }
}

/// Process-local store. Writes in a batch are staged and applied
/// atomically at commit. A staged URL is claimed at insert time, so a
/// concurrent batch inserting it too sees a unique violation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.store.clone(),
            claimed: self.claimed.clone(),
            staged: Vec::new(),
            backfills: Vec::new(),
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<PersistedArticle>> {
        let store = self.store.read().await;
        Ok(store.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<PersistedArticle>> {
        let store = self.store.read().await;
        Ok(store.find_by_url(url).cloned())
    }

    async fn mark_content_scraped(&self, id: i64, content: &str, at: DateTime<Utc>) -> Result<()> {
        let mut store = self.store.write().await;
        let article = store.get_mut(id)?;
        article.full_content = Some(content.to_string());
        article.is_content_scraped = true;
        article.content_scraped_at = Some(at);
        Ok(())
    }

    async fn mark_content_translated(&self, id: i64, english: &str, at: DateTime<Utc>) -> Result<()> {
        let mut store = self.store.write().await;
        let article = store.get_mut(id)?;
        article.full_content_english = Some(english.to_string());
        article.is_content_translated = true;
        article.content_translated_at = Some(at);
        Ok(())
    }

    async fn set_title_translation(&self, id: i64, english: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.get_mut(id)?.title_english = Some(english.to_string());
        Ok(())
    }

    async fn mark_summarized(
        &self,
        id: i64,
        summary: &str,
        summary_english: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        let article = store.get_mut(id)?;
        article.summary = Some(summary.to_string());
        article.summary_english = summary_english.map(str::to_string);
        article.is_summarized = true;
        article.summarized_at = Some(at);
        Ok(())
    }

    async fn by_collection_date(&self, date: NaiveDate) -> Result<Vec<PersistedArticle>> {
        let store = self.store.read().await;
        Ok(store.oldest_matching(usize::MAX, |a| a.collection_date == date))
    }

    async fn by_domain(&self, domain: &str) -> Result<Vec<PersistedArticle>> {
        let store = self.store.read().await;
        Ok(store.oldest_matching(usize::MAX, |a| a.source_domain == domain))
    }

    async fn pending_content(&self, limit: usize) -> Result<Vec<PersistedArticle>> {
        let store = self.store.read().await;
        Ok(store.oldest_matching(limit, |a| !a.is_content_scraped))
    }

    async fn pending_translation(&self, limit: usize) -> Result<Vec<PersistedArticle>> {
        let store = self.store.read().await;
        Ok(store.oldest_matching(limit, PersistedArticle::needs_translation))
    }
}

pub struct MemoryTransaction {
    store: Arc<RwLock<MemoryStore>>,
    claimed: Arc<Mutex<HashSet<String>>>,
    staged: Vec<PersistedArticle>,
    backfills: Vec<(i64, String)>,
}

impl MemoryTransaction {
    /// Give up the URL claims of everything still staged.
    fn release(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return;
        }
        if let Ok(mut claimed) = self.claimed.lock() {
            for article in &staged {
                claimed.remove(&article.source_url);
            }
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_by_url(&mut self, url: &str) -> Result<Option<PersistedArticle>> {
        if let Some(staged) = self.staged.iter().find(|a| a.source_url == url) {
            return Ok(Some(staged.clone()));
        }
        let store = self.store.read().await;
        let mut found = store.find_by_url(url).cloned();
        if let Some(article) = found.as_mut() {
            if let Some((_, section)) = self.backfills.iter().rev().find(|(id, _)| *id == article.id) {
                article.source_section = Some(section.clone());
            }
        }
        Ok(found)
    }

    async fn insert(&mut self, article: &NewArticle) -> Result<i64> {
        let mut store = self.store.write().await;
        let claimed_now = match self.claimed.lock() {
            Ok(mut claimed) => {
                store.find_by_url(&article.source_url).is_none()
                    && claimed.insert(article.source_url.clone())
            }
            Err(e) => return Err(Error::Storage(format!("URL claims unavailable: {}", e))),
        };
        if !claimed_now {
            return Err(Error::UniqueViolation {
                url: article.source_url.clone(),
            });
        }
        let id = store.allocate_id();
        self.staged.push(PersistedArticle::from_new(id, article, Utc::now()));
        Ok(id)
    }

    async fn backfill_section(&mut self, id: i64, section: &str) -> Result<()> {
        if let Some(staged) = self.staged.iter_mut().find(|a| a.id == id) {
            staged.source_section = Some(section.to_string());
        } else {
            self.backfills.push((id, section.to_string()));
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let store = self.store.clone();
        let mut store = store.write().await;
        for (id, _) in &self.backfills {
            store.get_mut(*id).map_err(|e| Error::Commit(e.to_string()))?;
        }

        for (id, section) in std::mem::take(&mut self.backfills) {
            if let Ok(article) = store.get_mut(id) {
                article.source_section = Some(section);
            }
        }
        let inserted = self.staged.len();
        store.articles.extend(self.staged.iter().cloned());
        // Claims are dropped only once the rows are visible in the store.
        self.release();
        debug!(inserted, "Committed memory batch");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        debug!(discarded = self.staged.len(), "Rolled back memory batch");
        self.release();
        Ok(())
    }
}
