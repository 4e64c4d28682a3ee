use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ns_core::ArticleReference;
use scraper::Html;
use tracing::{debug, warn};
use url::Url;

use crate::clean::collapse_whitespace;
use crate::registry::SourceSection;

/// Anchors matched by the section's link selector, in document order.
/// Anchors without text or href are skipped; duplicates are kept.
pub fn extract_links(
    html: &str,
    section: &SourceSection,
    discovered_at: DateTime<Utc>,
) -> Vec<ArticleReference> {
    let document = Html::parse_document(html);
    let label = section.label();

    let mut matched = 0;
    let mut references = Vec::new();
    for anchor in document.select(section.link_selector.selector()) {
        matched += 1;

        let Some(href) = anchor.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        let title = collapse_whitespace(&anchor.text().collect::<String>());
        if title.is_empty() {
            continue;
        }
        let Some(url) = resolve(&section.base_url, href) else {
            debug!(href, "Skipping unresolvable link");
            continue;
        };

        references.push(ArticleReference {
            title,
            url,
            discovered_at,
            section: label.clone(),
            language: section.language,
        });
    }

    if matched == 0 {
        warn!(
            section = %label,
            selector = section.link_selector.as_str(),
            "Link selector matched nothing, the listing markup may have changed"
        );
    }
    references
}

/// Keep the first reference seen for each URL.
pub fn dedup_references(references: Vec<ArticleReference>) -> Vec<ArticleReference> {
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
