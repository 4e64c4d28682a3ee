use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Language an outlet publishes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentLanguage {
    #[default]
    Zh,
    En,
}

impl ContentLanguage {
    pub fn code(&self) -> &'static str {
        match self {
            ContentLanguage::Zh => "zh",
            ContentLanguage::En => "en",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => ContentLanguage::En,
            _ => ContentLanguage::Zh,
        }
    }

    pub fn is_english(&self) -> bool {
        matches!(self, ContentLanguage::En)
    }
}

impl fmt::Display for ContentLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A link discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleReference {
    pub title: String,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
    /// "<source> - <section>"
    pub section: String,
    pub language: ContentLanguage,
}

/// Body text pulled out of a detail page. Only ever constructed for
/// pages whose cleaned body reached the minimum length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub url: String,
    pub domain: String,
    pub subcategory: String,
    pub content: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    /// Characters, not bytes.
    pub content_length: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Record handed to the store on first sight of a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub title_english: Option<String>,
    pub source_url: String,
    pub source_section: Option<String>,
    pub collection_date: NaiveDate,
    pub source_domain: String,
    pub content_language: ContentLanguage,
    pub full_content: Option<String>,
    pub full_content_english: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedArticle {
    pub id: i64,
    pub title: String,
    pub title_english: Option<String>,
    pub source_url: String,
    pub source_section: Option<String>,
    pub collection_date: NaiveDate,
    pub full_content: Option<String>,
    pub full_content_english: Option<String>,
    pub summary: Option<String>,
    pub summary_english: Option<String>,
    pub content_language: ContentLanguage,
    pub source_domain: String,
    pub is_content_scraped: bool,
    pub is_content_translated: bool,
    pub is_summarized: bool,
    pub content_scraped_at: Option<DateTime<Utc>>,
    pub content_translated_at: Option<DateTime<Utc>>,
    pub summarized_at: Option<DateTime<Utc>>,
}

impl PersistedArticle {
    /// Builds the freshly inserted form of `article`.
    pub fn from_new(id: i64, article: &NewArticle, now: DateTime<Utc>) -> Self {
        let scraped = article.full_content.is_some();
        let translated = article.full_content_english.is_some();
        Self {
            id,
            title: article.title.clone(),
            title_english: article.title_english.clone(),
            source_url: article.source_url.clone(),
            source_section: article.source_section.clone(),
            collection_date: article.collection_date,
            full_content: article.full_content.clone(),
            full_content_english: article.full_content_english.clone(),
            summary: None,
            summary_english: None,
            content_language: article.content_language,
            source_domain: article.source_domain.clone(),
            is_content_scraped: scraped,
            is_content_translated: translated,
            is_summarized: false,
            content_scraped_at: scraped.then_some(now),
            content_translated_at: translated.then_some(now),
            summarized_at: None,
        }
    }

    pub fn state(&self) -> ArticleState {
        if self.is_summarized {
            ArticleState::Summarized
        } else if self.is_content_translated {
            ArticleState::ContentTranslated
        } else if self.is_content_scraped {
            ArticleState::ContentScraped
        } else {
            ArticleState::Persisted
        }
    }

    /// Still missing a title or body translation. English outlets never are.
    pub fn needs_translation(&self) -> bool {
        if self.content_language.is_english() {
            return false;
        }
        self.title_english.is_none() || (self.is_content_scraped && !self.is_content_translated)
    }
}

/// Lifecycle of a stored article. Each step is optional and retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArticleState {
    Persisted,
    ContentScraped,
    ContentTranslated,
    Summarized,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
