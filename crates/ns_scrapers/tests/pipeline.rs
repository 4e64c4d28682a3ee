use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use httpmock::prelude::*;
use ns_core::{ArticleStore, ContentLanguage};
use ns_scrapers::registry::{SelectorDefinition, SourceDefinition};
use ns_scrapers::{Fetcher, FetcherConfig, PipelineConfig, Registry, ScraperManager};
use ns_storage::MemoryStorage;
use ns_translate::models::DeferredTranslator;

fn article(title: &str) -> String {
    let body: String = "商务部新闻发言人表示，中方将继续扩大高水平对外开放，稳定外贸外资基本盘。"
        .chars()
        .cycle()
        .take(150)
        .collect();
    format!(
        r#"<html><head><meta charset="utf-8"><title>{0}</title></head><body>
            <h1>{0}</h1>
            <div class="text"><p>{1}</p><div class="share">分享到：微信 微博 QQ空间 分享到：微信</div></div>
            <p>责任编辑：张三</p>
        </body></html>"#,
        title, body
    )
}

#[tokio::test]
async fn test_listing_to_store() {
    let server = MockServer::start_async().await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET).path("/xwfb/");
            then.status(200).body(
                r#"<ul class="txtList"><li><a href="/xwfb/1.html">例行新闻发布会</a></li>
                   <li><a href="2.html">商务部：外贸稳中向好</a></li>
                   <li><a href="/xwfb/3.html">已下线</a></li></ul>"#,
            );
        })
        .await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/xwfb/1.html");
            then.status(200).body(article("例行新闻发布会"));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET).path("/xwfb/2.html");
            then.status(200).body(article("商务部：外贸稳中向好"));
        })
        .await;

    let host = "127.0.0.1".to_string();
    let registry = Registry::from_definitions(
        vec![SourceDefinition {
            source: "Ministry of Commerce".to_string(),
            section: "Spokesperson".to_string(),
            listing_url: server.url("/xwfb/"),
            link_selector: "ul.txtList a".to_string(),
            base_url: None,
            language: ContentLanguage::Zh,
        }],
        vec![SelectorDefinition {
            domain: host.clone(),
            subcategory: "default".to_string(),
            content: "div.text".to_string(),
            title: Some("h1".to_string()),
            author: None,
            date: None,
            remove: vec!["div.share".to_string()],
        }],
        SelectorDefinition {
            domain: "default".to_string(),
            subcategory: "default".to_string(),
            content: "article".to_string(),
            title: None,
            author: None,
            date: None,
            remove: Vec::new(),
        },
    )
    .unwrap();

    let fetcher = Fetcher::new(&FetcherConfig {
        politeness_delay: Duration::from_millis(10),
        ..FetcherConfig::default()
    })
    .unwrap();
    let store = Arc::new(MemoryStorage::new());
    let manager = ScraperManager::new(
        Arc::new(registry),
        Arc::new(fetcher),
        store.clone(),
        Arc::new(DeferredTranslator::new()),
        PipelineConfig::default(),
    );

    let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let summary = manager.run(Some("ministry-of-commerce"), date).await.unwrap();
    assert_eq!(summary.new_articles, 3);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.extraction_failures, 1);

    let stored = store.by_collection_date(date).await.unwrap();
    assert_eq!(stored.len(), 3);
    let scraped: Vec<_> = stored.iter().filter(|a| a.is_content_scraped).collect();
    assert_eq!(scraped.len(), 2);
    for article in &scraped {
        let body = article.full_content.as_deref().unwrap();
        assert!(body.chars().count() >= 100);
        assert!(!body.contains("分享到"));
        assert!(!body.contains("责任编辑"));
        assert_eq!(article.source_domain, host);
        assert_eq!(article.source_section.as_deref(), Some("Ministry of Commerce - Spokesperson"));
    }

    let again = manager.run(None, date).await.unwrap();
    assert_eq!(again.duplicates, 3);
    assert_eq!(store.len().await, 3);
    listing.assert_hits_async(2).await;
    // stored articles are not fetched again
    first.assert_hits_async(1).await;
    second.assert_hits_async(1).await;
}
