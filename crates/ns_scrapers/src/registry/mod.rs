//! Source and selector configuration. Built once at startup, validated,
//! then shared read-only.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use ns_core::{ContentLanguage, Error, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

mod builtin;

pub const DEFAULT_SUBCATEGORY: &str = "default";
const DEFAULT_DOMAIN: &str = "default";

/// One listing page to harvest links from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub source: String,
    pub section: String,
    pub listing_url: String,
    pub link_selector: String,
    /// Relative hrefs resolve against this; the listing URL when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub language: ContentLanguage,
}

/// Selectors for detail pages on one (domain, subcategory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorDefinition {
    pub domain: String,
    #[serde(default = "default_subcategory")]
    pub subcategory: String,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

fn default_subcategory() -> String {
    DEFAULT_SUBCATEGORY.to_string()
}

/// A selector string together with its compiled form.
#[derive(Clone)]
pub struct CompiledSelector {
    source: String,
    selector: Selector,
}

impl CompiledSelector {
    pub fn parse(source: &str) -> Result<Self> {
        let selector = Selector::parse(source).map_err(|e| Error::InvalidSelector {
            selector: source.to_string(),
            reason: format!("{:?}", e),
        })?;
        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl fmt::Debug for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

#[derive(Debug, Clone)]
pub struct SourceSection {
    pub source: String,
    pub section: String,
    pub listing_url: Url,
    pub link_selector: CompiledSelector,
    pub base_url: Url,
    pub language: ContentLanguage,
}

impl SourceSection {
    fn compile(definition: SourceDefinition) -> Result<Self> {
        let listing_url = parse_url(&definition.listing_url)?;
        let base_url = match definition.base_url.as_deref() {
            Some(base) => parse_url(base)?,
            None => listing_url.clone(),
        };
        Ok(Self {
            link_selector: CompiledSelector::parse(&definition.link_selector)?,
            source: definition.source,
            section: definition.section,
            listing_url,
            base_url,
            language: definition.language,
        })
    }

    /// Label stored on every article found here.
    pub fn label(&self) -> String {
        format!("{} - {}", self.source, self.section)
    }
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub content: CompiledSelector,
    pub title: Option<CompiledSelector>,
    pub author: Option<CompiledSelector>,
    pub date: Option<CompiledSelector>,
    /// Applied in order, before any text is read.
    pub remove: Vec<CompiledSelector>,
}

impl SelectorConfig {
    fn compile(definition: &SelectorDefinition) -> Result<Self> {
        let optional = |s: &Option<String>| s.as_deref().map(CompiledSelector::parse).transpose();
        Ok(Self {
            content: CompiledSelector::parse(&definition.content)?,
            title: optional(&definition.title)?,
            author: optional(&definition.author)?,
            date: optional(&definition.date)?,
            remove: definition
                .remove
                .iter()
                .map(|s| CompiledSelector::parse(s))
                .collect::<Result<_>>()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    sections: Vec<SourceSection>,
    selectors: HashMap<String, HashMap<String, SelectorConfig>>,
    fallback: SelectorConfig,
}

impl Registry {
    /// The built-in People's Daily, The Paper, government and Global Times tables.
    pub fn builtin() -> Result<Self> {
        Self::from_definitions(builtin::sources(), builtin::selectors(), builtin::default_selector())
    }

    pub fn from_definitions(
        sources: Vec<SourceDefinition>,
        selectors: Vec<SelectorDefinition>,
        fallback: SelectorDefinition,
    ) -> Result<Self> {
        let sections = sources
            .into_iter()
            .map(SourceSection::compile)
            .collect::<Result<Vec<_>>>()?;

        let mut registry = Self {
            sections,
            selectors: HashMap::new(),
            fallback: SelectorConfig::compile(&fallback)?,
        };
        for definition in &selectors {
            registry.insert_selector(definition)?;
        }
        Ok(registry)
    }

    /// Add or replace selector entries from a JSON array of definitions.
    /// Only meant to run during startup, before the registry is shared.
    pub fn with_overlay(mut self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let definitions: Vec<SelectorDefinition> = serde_json::from_str(&raw)?;
        for definition in &definitions {
            self.insert_selector(definition)?;
        }
        info!(path = %path.display(), count = definitions.len(), "Loaded selector overlay");
        Ok(self)
    }

    fn insert_selector(&mut self, definition: &SelectorDefinition) -> Result<()> {
        let config = SelectorConfig::compile(definition)?;
        if definition.domain == DEFAULT_DOMAIN {
            self.fallback = config;
        } else {
            self.selectors
                .entry(definition.domain.to_ascii_lowercase())
                .or_default()
                .insert(definition.subcategory.clone(), config);
        }
        Ok(())
    }

    pub fn sections(&self) -> &[SourceSection] {
        &self.sections
    }

    /// Distinct source names in table order.
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for section in &self.sections {
            if !names.contains(&section.source.as_str()) {
                names.push(&section.source);
            }
        }
        names
    }

    /// Sections of one source. Matches the display name or its slug
    /// (`peoples-daily`), case-insensitively.
    pub fn sections_for(&self, source: &str) -> Vec<&SourceSection> {
        let wanted = slug(source);
        self.sections
            .iter()
            .filter(|s| slug(&s.source) == wanted)
            .collect()
    }

    /// Falls back from (domain, subcategory) to (domain, "default") and
    /// then to the global default entry.
    pub fn selector_config(&self, domain: &str, subcategory: &str) -> &SelectorConfig {
        self.selectors
            .get(&domain.to_ascii_lowercase())
            .and_then(|subs| subs.get(subcategory).or_else(|| subs.get(DEFAULT_SUBCATEGORY)))
            .unwrap_or(&self.fallback)
    }

    /// Language of the source listed on the same host; Chinese when no
    /// source matches.
    pub fn language_for_url(&self, url: &str) -> ContentLanguage {
        let host = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string));
        self.sections
            .iter()
            .find(|s| s.listing_url.host_str().map(str::to_string) == host)
            .map(|s| s.language)
            .unwrap_or_default()
    }
}

/// Lower-case, ASCII alphanumerics only, words joined by '-'.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .replace('\'', "")
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Derive (domain, subcategory) from an article URL. Unparsable URLs map
/// to ("unknown", "default").
pub fn classify(url: &str) -> (String, String) {
    let Ok(parsed) = Url::parse(url) else {
        return ("unknown".to_string(), DEFAULT_SUBCATEGORY.to_string());
    };
    let Some(host) = parsed.host_str() else {
        return ("unknown".to_string(), DEFAULT_SUBCATEGORY.to_string());
    };

    let path = parsed.path().to_lowercase();
    let subcategory = if path.contains("international") || path.contains("world") {
        "international"
    } else if path.contains("politics") || path.contains("political") {
        "politics"
    } else if path.contains("society") || path.contains("social") {
        "society"
    } else {
        DEFAULT_SUBCATEGORY
    };
    (host.to_ascii_lowercase(), subcategory.to_string())
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))
}
