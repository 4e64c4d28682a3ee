use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    /// An insert hit the URL uniqueness constraint.
    #[error("Duplicate URL: {url}")]
    UniqueViolation { url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The batch could not be committed; nothing from it was persisted.
    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::UniqueViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_is_distinguishable() {
        let err = Error::UniqueViolation { url: "http://a.cn/1".to_string() };
        assert!(err.is_unique_violation());
        assert_eq!(err.to_string(), "Duplicate URL: http://a.cn/1");

        assert!(!Error::Storage("disk full".to_string()).is_unique_violation());
    }
}
