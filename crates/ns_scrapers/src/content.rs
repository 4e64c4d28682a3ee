//! Detail-page body extraction.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use ns_core::ExtractedContent;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::clean::clean_text;
use crate::encoding::FallbackDecoder;
use crate::fetcher::{tld, FetchError, PageFetcher};
use crate::registry::{classify, CompiledSelector, Registry, SelectorConfig};

/// Cleaned bodies shorter than this are layout noise, not articles.
pub const MIN_CONTENT_CHARS: usize = 100;
/// Individual selector matches shorter than this are dropped.
pub const MIN_MATCH_CHARS: usize = 20;

lazy_static! {
    static ref PARAGRAPH: Selector = Selector::parse("p").expect("valid selector");
}

#[derive(Error, Debug)]
pub enum FailureReason {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("insufficient content ({length} characters)")]
    InsufficientContent { length: usize },
}

#[derive(Error, Debug)]
#[error("extracting {url} failed: {reason}")]
pub struct ExtractionFailure {
    pub url: String,
    pub domain: String,
    pub subcategory: String,
    pub reason: FailureReason,
    /// Length of whatever was extracted, for diagnostics.
    pub content_length: usize,
    pub duration: Duration,
}

/// Text pulled from one parsed page, already cleaned.
#[derive(Debug, Default, Clone, PartialEq)]
struct PageText {
    content: String,
    title: Option<String>,
    author: Option<String>,
    date: Option<String>,
}

pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    registry: Arc<Registry>,
    decoder: FallbackDecoder,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, registry: Arc<Registry>) -> Self {
        Self {
            fetcher,
            registry,
            decoder: FallbackDecoder::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn extract(
        &self,
        url: &str,
        domain: &str,
        subcategory: &str,
    ) -> Result<ExtractedContent, ExtractionFailure> {
        let started = Instant::now();
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                return Err(ExtractionFailure {
                    url: url.to_string(),
                    domain: domain.to_string(),
                    subcategory: subcategory.to_string(),
                    reason: FailureReason::Fetch(e),
                    content_length: 0,
                    duration: started.elapsed(),
                })
            }
        };
        self.finish(url, domain, subcategory, &page.text, started)
    }

    /// Like `extract`, with domain and subcategory derived from the URL.
    pub async fn extract_url(&self, url: &str) -> Result<ExtractedContent, ExtractionFailure> {
        let (domain, subcategory) = classify(url);
        self.extract(url, &domain, &subcategory).await
    }

    /// Run extraction over an already downloaded page.
    pub fn extract_from_bytes(
        &self,
        url: &str,
        bytes: &[u8],
        declared_charset: Option<&str>,
        domain: &str,
        subcategory: &str,
    ) -> Result<ExtractedContent, ExtractionFailure> {
        let started = Instant::now();
        let decoded = self.decoder.decode(bytes, declared_charset, tld(domain));
        debug!(url, encoding = decoded.encoding.name(), stage = %decoded.stage, "Decoded page");
        self.finish(url, domain, subcategory, &decoded.text, started)
    }

    fn finish(
        &self,
        url: &str,
        domain: &str,
        subcategory: &str,
        html: &str,
        started: Instant,
    ) -> Result<ExtractedContent, ExtractionFailure> {
        let config = self.registry.selector_config(domain, subcategory);
        let page = extract_page(html, config);
        let content_length = page.content.chars().count();

        if content_length < MIN_CONTENT_CHARS {
            warn!(url, domain, content_length, "Insufficient content extracted");
            return Err(ExtractionFailure {
                url: url.to_string(),
                domain: domain.to_string(),
                subcategory: subcategory.to_string(),
                reason: FailureReason::InsufficientContent {
                    length: content_length,
                },
                content_length,
                duration: started.elapsed(),
            });
        }

        let duration = started.elapsed();
        info!(
            url,
            domain,
            content_length,
            elapsed_ms = duration.as_millis() as u64,
            "📄 Extracted article body"
        );
        Ok(ExtractedContent {
            url: url.to_string(),
            domain: domain.to_string(),
            subcategory: subcategory.to_string(),
            content: page.content,
            title: page.title,
            author: page.author,
            date: page.date,
            content_length,
            duration,
        })
    }
}

fn extract_page(html: &str, config: &SelectorConfig) -> PageText {
    let mut document = Html::parse_document(html);
    let removed = strip_nodes(&mut document, &config.remove);
    if removed > 0 {
        debug!(removed, "Removed boilerplate nodes");
    }
    let root = document.root_element();

    let mut content = clean_text(&selector_text(root, &config.content));
    if content.chars().count() < MIN_CONTENT_CHARS {
        let paragraphs = clean_text(&paragraph_text(root));
        if paragraphs.chars().count() > content.chars().count() {
            debug!(
                selector = config.content.as_str(),
                "Content selector came up short, using paragraph fallback"
            );
            content = paragraphs;
        }
    }

    PageText {
        content,
        title: first_text(root, config.title.as_ref()),
        author: first_text(root, config.author.as_ref()),
        date: first_text(root, config.date.as_ref()),
    }
}

/// Detach every node matching any of `selectors`. Returns how many went.
fn strip_nodes(document: &mut Html, selectors: &[CompiledSelector]) -> usize {
    let mut removed = 0;
    for selector in selectors {
        let ids: Vec<_> = document
            .root_element()
            .select(selector.selector())
            .map(|element| element.id())
            .collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
                removed += 1;
            }
        }
    }
    removed
}

/// Matches joined by newlines. Nested matches are only counted once and
/// short matches are dropped.
fn selector_text(root: ElementRef<'_>, selector: &CompiledSelector) -> String {
    let matches: Vec<ElementRef<'_>> = root.select(selector.selector()).collect();
    let ids: HashSet<_> = matches.iter().map(|m| m.id()).collect();

    matches
        .iter()
        .filter(|m| !m.ancestors().any(|a| ids.contains(&a.id())))
        .map(|m| block_text(*m))
        .filter(|text| text.split_whitespace().collect::<String>().chars().count() >= MIN_MATCH_CHARS)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(root: ElementRef<'_>) -> String {
    root.select(&PARAGRAPH)
        .map(block_text)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_text(root: ElementRef<'_>, selector: Option<&CompiledSelector>) -> Option<String> {
    let element = root.select(selector?.selector()).next()?;
    Some(clean_text(&block_text(element))).filter(|text| !text.is_empty())
}

/// Text of `element` with a line break around block-level children.
/// Script and style contents are skipped.
fn block_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style" | "noscript") {
                    continue;
                }
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = is_block(name);
                if block {
                    out.push('\n');
                }
                collect_text(child, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "br" | "div" | "li" | "tr" | "section" | "article" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MapFetcher;
    use encoding_rs::GBK;

    fn extractor(fetcher: MapFetcher) -> ContentExtractor {
        ContentExtractor::new(Arc::new(fetcher), Arc::new(Registry::builtin().unwrap()))
    }

    fn paragraph(seed: &str, len: usize) -> String {
        seed.chars().cycle().take(len).collect()
    }

    #[tokio::test]
    async fn test_short_selector_match_falls_back_to_paragraphs() {
        let url = "https://example.com/story/1.html";
        let first = paragraph("abcdefghij", 124);
        let second = paragraph("klmnopqrst", 125);
        let html = format!(
            r#"<html><body>
                <div class="content"><span>Short snippet!!</span></div>
                <p>{}</p>
                <p>{}</p>
            </body></html>"#,
            first, second
        );
        let fetcher = MapFetcher::new().page(url, &html);

        let extracted = extractor(fetcher).extract(url, "example.com", "default").await.unwrap();
        assert_eq!(extracted.content_length, 250);
        assert_eq!(extracted.content, format!("{} {}", first, second));
        assert!(!extracted.content.contains("Short snippet"));
    }

    #[tokio::test]
    async fn test_removed_nodes_never_reach_the_body() {
        let url = "http://world.people.com.cn/n1/2024/0101/c1002-1.html";
        let body = paragraph("外交部发言人在例行记者会上回答了有关提问，表示中方愿同各方加强沟通协调。", 160);
        let html = format!(
            r#"<html><head><script>var ad = "脚本内容";</script></head><body>
                <h1 class="title">外交部例行记者会</h1>
                <div class="rm_txt_con">
                  <p>{}</p>
                  <p class="ad">广告位招租广告位招租广告位招租广告位招租</p>
                  <div class="related-articles"><p>相关阅读相关阅读相关阅读相关阅读相关阅读相关阅读</p></div>
                  <p>（责编：王五）</p>
                </div>
                <div class="author">人民网</div>
            </body></html>"#,
            body
        );
        let fetcher = MapFetcher::new().page(url, &html);

        let extracted = extractor(fetcher).extract_url(url).await.unwrap();
        assert_eq!(extracted.domain, "world.people.com.cn");
        assert_eq!(extracted.content, body);
        assert!(!extracted.content.contains("广告位"));
        assert!(!extracted.content.contains("相关阅读"));
        assert!(!extracted.content.contains("脚本"));
        assert_eq!(extracted.title.as_deref(), Some("外交部例行记者会"));
        assert_eq!(extracted.author.as_deref(), Some("人民网"));
        assert_eq!(extracted.date, None);
    }

    #[tokio::test]
    async fn test_nested_matches_are_not_duplicated() {
        let url = "https://example.com/a.html";
        let body = paragraph("Nested article text that should appear once. ", 150);
        let html = format!(
            r#"<html><body><main><article><div class="content"><p>{}</p></div></article></main></body></html>"#,
            body
        );
        let fetcher = MapFetcher::new().page(url, &html);

        let extracted = extractor(fetcher).extract(url, "example.com", "default").await.unwrap();
        assert_eq!(extracted.content, body.trim());
    }

    #[tokio::test]
    async fn test_insufficient_content() {
        let url = "https://example.com/empty.html";
        let fetcher = MapFetcher::new().page(url, "<html><body><p>太短了</p></body></html>");

        let failure = extractor(fetcher).extract(url, "example.com", "default").await.unwrap_err();
        assert!(matches!(failure.reason, FailureReason::InsufficientContent { length: 3 }));
        assert_eq!(failure.content_length, 3);
    }

    #[tokio::test]
    async fn test_body_length_threshold_is_inclusive() {
        let url = "https://example.com/edge.html";
        let page = |len| format!(r#"<html><body><div class="content">{}</div></body></html>"#, paragraph("abcdefghij", len));

        let short = extractor(MapFetcher::new().page(url, &page(MIN_CONTENT_CHARS - 1)))
            .extract(url, "example.com", "default")
            .await
            .unwrap_err();
        assert!(matches!(short.reason, FailureReason::InsufficientContent { length: 99 }));

        let extracted = extractor(MapFetcher::new().page(url, &page(MIN_CONTENT_CHARS)))
            .extract(url, "example.com", "default")
            .await
            .unwrap();
        assert_eq!(extracted.content_length, 100);
    }

    #[tokio::test]
    async fn test_match_length_threshold_is_inclusive() {
        let url = "https://example.com/matches.html";
        let body = paragraph("abcdefghij", 120);
        let page = |len| {
            format!(
                r#"<html><body><div class="content">{}</div><div class="content">{}</div></body></html>"#,
                paragraph("klmnopqrst", len),
                body
            )
        };

        let extracted = extractor(MapFetcher::new().page(url, &page(MIN_MATCH_CHARS - 1)))
            .extract(url, "example.com", "default")
            .await
            .unwrap();
        assert_eq!(extracted.content, body);

        let extracted = extractor(MapFetcher::new().page(url, &page(MIN_MATCH_CHARS)))
            .extract(url, "example.com", "default")
            .await
            .unwrap();
        assert_eq!(extracted.content, format!("{} {}", paragraph("klmnopqrst", 20), body));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let failure = extractor(MapFetcher::new())
            .extract("https://example.com/missing.html", "example.com", "default")
            .await
            .unwrap_err();
        assert!(matches!(
            failure.reason,
            FailureReason::Fetch(FetchError::Status { code: 404, .. })
        ));
    }

    #[test]
    fn test_extract_from_gbk_bytes() {
        let body = paragraph("国家统计局今天发布数据，国民经济运行总体平稳，主要指标稳中有进。", 120);
        let html = format!(
            r#"<html><head><meta charset="gb2312"></head><body><div class="content"><p>{}</p></div></body></html>"#,
            body
        );
        let (bytes, _, _) = GBK.encode(&html);

        let extracted = extractor(MapFetcher::new())
            .extract_from_bytes("https://www.stats.gov.cn/sj/zxfb/1.html", &bytes, None, "www.stats.gov.cn", "default")
            .unwrap();
        assert_eq!(extracted.content, body);
        assert_eq!(extracted.content_length, 120);
    }

    #[test]
    fn test_block_text_separates_paragraphs() {
        let document = Html::parse_document("<div>一<p>二</p>三<br>四<style>x{}</style></div>");
        let div = document.select(&Selector::parse("div").unwrap()).next().unwrap();
        assert_eq!(clean_text(&block_text(div)), "一 二 三 四");
    }
}
