use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ns_core::{
    ArticleStore, ContentLanguage, Error, NewArticle, PersistedArticle, Result, StoreTransaction,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        title_english TEXT,
        source_url TEXT NOT NULL UNIQUE,
        source_section TEXT,
        collection_date TEXT NOT NULL,
        full_content TEXT,
        full_content_english TEXT,
        summary TEXT,
        summary_english TEXT,
        content_language TEXT NOT NULL DEFAULT 'zh',
        source_domain TEXT NOT NULL,
        is_content_scraped INTEGER NOT NULL DEFAULT 0,
        is_content_translated INTEGER NOT NULL DEFAULT 0,
        is_summarized INTEGER NOT NULL DEFAULT 0,
        content_scraped_at TEXT,
        content_translated_at TEXT,
        summarized_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_collection_date ON articles (collection_date)",
    "CREATE INDEX IF NOT EXISTS idx_articles_source_domain ON articles (source_domain)",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
}

impl SQLiteStorage {
    pub async fn new() -> Result<Self> {
        Self::new_with_path(Path::new("news.db")).await
    }

    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }
        info!(path = %db_path.display(), "Opened SQLite store");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn fetch_where(&self, clause: &str, bind: Option<String>, limit: usize) -> Result<Vec<PersistedArticle>> {
        let sql = format!("SELECT * FROM articles WHERE {} ORDER BY id LIMIT ?", clause);
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to query articles: {}", e)))?;
        rows.iter().map(row_to_article).collect()
    }

    async fn update(&self, sql: &str, id: i64, values: Vec<Option<String>>) -> Result<()> {
        let mut query = sqlx::query(sql);
        for value in values {
            query = query.bind(value);
        }
        let result = query
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update article {}: {}", id, e)))?;
        if result.rows_affected() == 0 {
            return Err(Error::Storage(format!("No article with id {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for SQLiteStorage {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to open batch: {}", e)))?;
        Ok(Box::new(SQLiteTransaction { tx }))
    }

    async fn get(&self, id: i64) -> Result<Option<PersistedArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get article {}: {}", id, e)))?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<PersistedArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE source_url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to look up {}: {}", url, e)))?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn mark_content_scraped(&self, id: i64, content: &str, at: DateTime<Utc>) -> Result<()> {
        self.update(
            "UPDATE articles SET full_content = ?, is_content_scraped = 1, content_scraped_at = ? WHERE id = ?",
            id,
            vec![Some(content.to_string()), Some(at.to_rfc3339())],
        )
        .await
    }

    async fn mark_content_translated(&self, id: i64, english: &str, at: DateTime<Utc>) -> Result<()> {
        self.update(
            "UPDATE articles SET full_content_english = ?, is_content_translated = 1, content_translated_at = ? WHERE id = ?",
            id,
            vec![Some(english.to_string()), Some(at.to_rfc3339())],
        )
        .await
    }

    async fn set_title_translation(&self, id: i64, english: &str) -> Result<()> {
        self.update(
            "UPDATE articles SET title_english = ? WHERE id = ?",
            id,
            vec![Some(english.to_string())],
        )
        .await
    }

    async fn mark_summarized(
        &self,
        id: i64,
        summary: &str,
        summary_english: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(
            "UPDATE articles SET summary = ?, summary_english = ?, is_summarized = 1, summarized_at = ? WHERE id = ?",
            id,
            vec![
                Some(summary.to_string()),
                summary_english.map(str::to_string),
                Some(at.to_rfc3339()),
            ],
        )
        .await
    }

    async fn by_collection_date(&self, date: NaiveDate) -> Result<Vec<PersistedArticle>> {
        self.fetch_where(
            "collection_date = ?",
            Some(date.format(DATE_FORMAT).to_string()),
            usize::MAX,
        )
        .await
    }

    async fn by_domain(&self, domain: &str) -> Result<Vec<PersistedArticle>> {
        self.fetch_where("source_domain = ?", Some(domain.to_string()), usize::MAX)
            .await
    }

    async fn pending_content(&self, limit: usize) -> Result<Vec<PersistedArticle>> {
        self.fetch_where("is_content_scraped = 0", None, limit).await
    }

    async fn pending_translation(&self, limit: usize) -> Result<Vec<PersistedArticle>> {
        self.fetch_where(
            "content_language != 'en' AND (title_english IS NULL OR (is_content_scraped = 1 AND is_content_translated = 0))",
            None,
            limit,
        )
        .await
    }
}

pub struct SQLiteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SQLiteTransaction {
    async fn find_by_url(&mut self, url: &str) -> Result<Option<PersistedArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE source_url = ?")
            .bind(url)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to look up {}: {}", url, e)))?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn insert(&mut self, article: &NewArticle) -> Result<i64> {
        // Savepoint so a rejected row does not poison the outer batch.
        sqlx::query("SAVEPOINT insert_article")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to open savepoint: {}", e)))?;

        let now = Utc::now().to_rfc3339();
        let scraped = article.full_content.is_some();
        let translated = article.full_content_english.is_some();
        let inserted = sqlx::query(
            r#"
            INSERT INTO articles
            (title, title_english, source_url, source_section, collection_date,
             full_content, full_content_english, content_language, source_domain,
             is_content_scraped, is_content_translated, content_scraped_at, content_translated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(article.title_english.as_deref())
        .bind(&article.source_url)
        .bind(article.source_section.as_deref())
        .bind(article.collection_date.format(DATE_FORMAT).to_string())
        .bind(article.full_content.as_deref())
        .bind(article.full_content_english.as_deref())
        .bind(article.content_language.code())
        .bind(&article.source_domain)
        .bind(scraped)
        .bind(translated)
        .bind(scraped.then(|| now.clone()))
        .bind(translated.then(|| now.clone()))
        .execute(&mut *self.tx)
        .await;

        match inserted {
            Ok(result) => {
                sqlx::query("RELEASE insert_article")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| Error::Database(format!("Failed to release savepoint: {}", e)))?;
                Ok(result.last_insert_rowid())
            }
            Err(e) => {
                sqlx::query("ROLLBACK TO insert_article")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| Error::Database(format!("Failed to roll back insert: {}", e)))?;
                sqlx::query("RELEASE insert_article")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| Error::Database(format!("Failed to release savepoint: {}", e)))?;

                match e {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        debug!(url = %article.source_url, "Unique constraint rejected insert");
                        Err(Error::UniqueViolation {
                            url: article.source_url.clone(),
                        })
                    }
                    other => Err(Error::Database(format!(
                        "Failed to insert {}: {}",
                        article.source_url, other
                    ))),
                }
            }
        }
    }

    async fn backfill_section(&mut self, id: i64, section: &str) -> Result<()> {
        sqlx::query("UPDATE articles SET source_section = ? WHERE id = ?")
            .bind(section)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to backfill section for {}: {}", id, e)))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::Commit(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| Error::Database(format!("Failed to roll back batch: {}", e)))
    }
}

fn row_to_article(row: &SqliteRow) -> Result<PersistedArticle> {
    let date: String = get(row, "collection_date")?;
    let collection_date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| Error::Database(format!("Failed to parse date {}: {}", date, e)))?;
    let language: String = get(row, "content_language")?;

    Ok(PersistedArticle {
        id: get(row, "id")?,
        title: get(row, "title")?,
        title_english: get(row, "title_english")?,
        source_url: get(row, "source_url")?,
        source_section: get(row, "source_section")?,
        collection_date,
        full_content: get(row, "full_content")?,
        full_content_english: get(row, "full_content_english")?,
        summary: get(row, "summary")?,
        summary_english: get(row, "summary_english")?,
        content_language: ContentLanguage::from_code(&language),
        source_domain: get(row, "source_domain")?,
        is_content_scraped: get(row, "is_content_scraped")?,
        is_content_translated: get(row, "is_content_translated")?,
        is_summarized: get(row, "is_summarized")?,
        content_scraped_at: timestamp(get(row, "content_scraped_at")?)?,
        content_translated_at: timestamp(get(row, "content_translated_at")?)?,
        summarized_at: timestamp(get(row, "summarized_at")?)?,
    })
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| Error::Database(format!("Failed to read column {}: {}", column, e)))
}

fn timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Database(format!("Failed to parse timestamp {}: {}", raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_article(url: &str, language: ContentLanguage) -> NewArticle {
        NewArticle {
            title: "国防部例行记者会".to_string(),
            title_english: language.is_english().then(|| "Routine press conference".to_string()),
            source_url: url.to_string(),
            source_section: None,
            collection_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            source_domain: "www.mod.gov.cn".to_string(),
            content_language: language,
            full_content: None,
            full_content_english: None,
        }
    }

    #[tokio::test]
    async fn test_sqlite_batch_with_duplicate() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        let id = tx.insert(&new_article("http://www.mod.gov.cn/a", ContentLanguage::Zh)).await.unwrap();
        let err = tx
            .insert(&new_article("http://www.mod.gov.cn/a", ContentLanguage::Zh))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // The batch survives the rejected row.
        tx.insert(&new_article("http://www.mod.gov.cn/b", ContentLanguage::Zh)).await.unwrap();
        tx.backfill_section(id, "Ministry of National Defense - Regular PC").await.unwrap();
        tx.commit().await.unwrap();

        let stored = storage.find_by_url("http://www.mod.gov.cn/a").await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(
            stored.source_section.as_deref(),
            Some("Ministry of National Defense - Regular PC")
        );
        assert_eq!(stored.collection_date, NaiveDate::from_ymd_opt(2024, 5, 20).unwrap());
        assert_eq!(storage.by_domain("www.mod.gov.cn").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_rollback() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        tx.insert(&new_article("http://www.mod.gov.cn/a", ContentLanguage::Zh)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(storage.find_by_url("http://www.mod.gov.cn/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_status_updates() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("nested/test.db")).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        let zh = tx.insert(&new_article("http://www.mod.gov.cn/a", ContentLanguage::Zh)).await.unwrap();
        let en = tx.insert(&new_article("https://www.globaltimes.cn/b", ContentLanguage::En)).await.unwrap();
        tx.commit().await.unwrap();

        let pending = storage.pending_translation(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, zh);

        let now = Utc::now();
        storage.mark_content_scraped(en, "Body text", now).await.unwrap();
        storage.set_title_translation(zh, "Routine press conference").await.unwrap();
        assert!(storage.pending_translation(10).await.unwrap().is_empty());

        let pending = storage.pending_content(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, zh);

        storage.mark_summarized(en, "Summary", None, now).await.unwrap();
        let stored = storage.get(en).await.unwrap().unwrap();
        assert!(stored.is_content_scraped);
        assert!(stored.is_summarized);
        assert!(stored.summary_english.is_none());
        assert_eq!(stored.content_language, ContentLanguage::En);
        assert_eq!(
            stored.content_scraped_at.map(|t| t.timestamp()),
            Some(now.timestamp())
        );

        let date = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        assert_eq!(storage.by_collection_date(date).await.unwrap().len(), 2);

        let err = storage.set_title_translation(999, "x").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
