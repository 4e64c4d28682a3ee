use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use ns_core::{Error, ExtractedContent, Result};
use serde::Serialize;

use crate::manager::ScraperManager;
use crate::registry::{slug, Registry};

#[derive(Args, Debug, Clone)]
pub struct ScraperArgs {
    #[command(subcommand)]
    pub command: ScraperCommands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Source name or slug (e.g. peoples-daily). All sources when omitted.
    pub source: Option<String>,
    /// Store links only, without extracting article bodies
    #[arg(long)]
    pub listing_only: bool,
    /// Collection date to record (defaults to today, UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScraperCommands {
    /// Fetch listing pages and ingest the articles they link to
    Fetch(FetchArgs),
    /// List configured sources and sections
    List,
    /// Extract the body of a single article URL and print it
    Extract { url: String },
    /// Scrape bodies for stored articles that have none yet
    ScrapePending {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Translate stored titles and bodies that are still missing English
    TranslatePending {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show stored articles for a collection date and/or source domain
    Articles {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        domain: Option<String>,
    },
}

pub async fn handle_command(args: ScraperArgs, manager: &ScraperManager) -> Result<()> {
    match args.command {
        ScraperCommands::Fetch(FetchArgs {
            source,
            listing_only,
            date,
        }) => {
            let source = parse_source(manager.registry(), source.as_deref())?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let fetch_content = manager.config().fetch_content && !listing_only;
            let summary = manager.run_with(source, date, fetch_content).await?;
            println!(
                "🆕 {} new  📝 {} duplicate or updated  ❌ {} errors  ({} processed, {} without body)",
                summary.new_articles,
                summary.duplicate_or_updated(),
                summary.errors,
                summary.total_processed,
                summary.extraction_failures
            );
        }
        ScraperCommands::List => {
            for line in source_listing(manager.registry()) {
                println!("{}", line);
            }
        }
        ScraperCommands::Extract { url } => match manager.extract_url(&url).await {
            Ok(content) => {
                let report = extract_report(manager.registry(), &content);
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(failure) => return Err(Error::Scraping(failure.to_string())),
        },
        ScraperCommands::ScrapePending { limit } => {
            let step = manager.scrape_pending(limit).await?;
            println!(
                "📄 {} scraped, {} failed ({} attempted)",
                step.completed, step.failed, step.attempted
            );
        }
        ScraperCommands::TranslatePending { limit } => {
            let step = manager.translate_pending(limit).await?;
            println!(
                "🌐 {} translated, {} incomplete ({} attempted)",
                step.completed, step.failed, step.attempted
            );
        }
        ScraperCommands::Articles { date, domain } => {
            let articles = manager.articles(date, domain.as_deref()).await?;
            for article in &articles {
                println!(
                    "{:>6}  {}  {:<18}  {}  {}",
                    article.id,
                    article.collection_date,
                    format!("{:?}", article.state()),
                    article.title_english.as_deref().unwrap_or(&article.title),
                    article.source_url
                );
            }
            println!("{} articles", articles.len());
        }
    }
    Ok(())
}

/// Check a source argument against the registry before any network work.
fn parse_source<'a>(registry: &Registry, source: Option<&'a str>) -> Result<Option<&'a str>> {
    match source.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(source) if registry.sections_for(source).is_empty() => {
            let known: Vec<String> = registry.source_names().into_iter().map(slug).collect();
            Err(Error::Scraping(format!(
                "Unknown source: {}. Available: {}",
                source,
                known.join(", ")
            )))
        }
        Some(source) => Ok(Some(source)),
    }
}

/// What `extract` prints: the extracted fields plus the source language.
#[derive(Serialize)]
struct ExtractReport<'a> {
    language: &'static str,
    #[serde(flatten)]
    content: &'a ExtractedContent,
}

fn extract_report<'a>(registry: &Registry, content: &'a ExtractedContent) -> ExtractReport<'a> {
    ExtractReport {
        language: registry.language_for_url(&content.url).code(),
        content,
    }
}

fn source_listing(registry: &Registry) -> Vec<String> {
    let mut lines = Vec::new();
    for name in registry.source_names() {
        lines.push(format!("{} ({}):", name, slug(name)));
        for section in registry.sections_for(name) {
            lines.push(format!("  - {:<32} {}", section.section, section.listing_url));
        }
    }
    lines
}
