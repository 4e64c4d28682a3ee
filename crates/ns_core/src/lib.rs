pub mod error;
pub mod storage;
pub mod translation;
pub mod types;

pub use error::{Error, Result};
pub use storage::{ArticleStore, StoreTransaction};
pub use translation::{TranslationResult, Translator};
pub use types::{
    ArticleReference, ArticleState, ContentLanguage, ExtractedContent, NewArticle, PersistedArticle,
};
