use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ns_core::Result;
use ns_scrapers::cli::{handle_command, FetchArgs, ScraperArgs, ScraperCommands};
use ns_scrapers::logging::init_logging;
use ns_scrapers::{Fetcher, FetcherConfig, PipelineConfig, Registry, ScraperManager};
use ns_storage::{create_storage, StorageKind};
use ns_translate::{create_translator, TranslatorConfig, DEFAULT_ENDPOINT, DEFAULT_REGION};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    /// `1h15m30s`, `30m`, `1d`; a bare number is seconds.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_value = false;

        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let num: u64 = current_number
                .parse()
                .map_err(|_| format!("Expected a number before '{}'", c))?;
            let unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            total_seconds = num
                .checked_mul(unit)
                .and_then(|seconds| total_seconds.checked_add(seconds))
                .ok_or("Duration is too long")?;
            current_number.clear();
            has_value = true;
        }

        if !current_number.is_empty() {
            let num: u64 = current_number
                .parse()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds.checked_add(num).ok_or("Duration is too long")?;
            has_value = true;
        }

        if !has_value {
            return Err("Duration must include a number".to_string());
        }
        if total_seconds == 0 {
            return Err("Interval must be longer than zero".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Collects, cleans and translates Chinese news articles", long_about = None)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = StorageKind::Memory, env = "NS_STORAGE")]
    storage: StorageKind,
    /// SQLite database file
    #[arg(long, default_value = "news.db", env = "NS_DATABASE")]
    database: PathBuf,
    #[arg(long, env = "MS_TRANSLATOR_KEY", hide_env_values = true)]
    translator_key: Option<String>,
    #[arg(long, env = "MS_TRANSLATOR_LOCATION", default_value = DEFAULT_REGION)]
    translator_region: String,
    #[arg(long, env = "MS_TRANSLATOR_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    translator_endpoint: String,
    /// Translate during fetch passes instead of deferring to translate-pending
    #[arg(long, env = "NS_PRODUCTION")]
    production: bool,
    /// JSON file with extra selector entries, applied over the built-in table
    #[arg(long, env = "NS_SELECTORS")]
    selectors: Option<PathBuf>,
    /// Concurrent detail-page extractions
    #[arg(long, default_value_t = 4, env = "NS_WORKERS")]
    workers: usize,
    /// Minimum spacing between requests to the same host, in milliseconds
    #[arg(long, default_value_t = 1000, env = "NS_DELAY_MS")]
    delay_ms: u64,
    /// Log filter, e.g. `debug` or `ns_scrapers=debug` (overrides RUST_LOG)
    #[arg(long, env = "NS_LOG")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch listing pages and ingest the articles they link to
    Fetch {
        #[command(flatten)]
        args: FetchArgs,
        /// Run in periodic mode with the specified interval (e.g. 1h, 30m, 1d, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
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
        date: Option<chrono::NaiveDate>,
        #[arg(long)]
        domain: Option<String>,
    },
}

impl Commands {
    fn into_scraper_command(self) -> ScraperCommands {
        match self {
            Commands::Fetch { args, .. } => ScraperCommands::Fetch(args),
            Commands::List => ScraperCommands::List,
            Commands::Extract { url } => ScraperCommands::Extract { url },
            Commands::ScrapePending { limit } => ScraperCommands::ScrapePending { limit },
            Commands::TranslatePending { limit } => ScraperCommands::TranslatePending { limit },
            Commands::Articles { date, domain } => ScraperCommands::Articles { date, domain },
        }
    }
}

impl Cli {
    fn translator_config(&self) -> TranslatorConfig {
        TranslatorConfig {
            api_key: self.translator_key.clone(),
            region: self.translator_region.clone(),
            endpoint: self.translator_endpoint.clone(),
            ..TranslatorConfig::default()
        }
    }

    /// translate-pending always needs a live translator.
    fn translate_immediately(&self) -> bool {
        self.production || matches!(self.command, Commands::TranslatePending { .. })
    }
}

async fn build_manager(cli: &Cli) -> Result<ScraperManager> {
    let store = create_storage(cli.storage, &cli.database).await?;
    info!("💾 Storage initialized successfully (using {})", cli.storage);

    let translator = create_translator(&cli.translator_config(), cli.translate_immediately())?;
    info!("🌐 Translator ready: {}", translator.name());

    let mut registry = Registry::builtin()?;
    if let Some(path) = &cli.selectors {
        registry = registry.with_overlay(path)?;
    }
    info!(
        "🦗 Sources loaded: {} ({} sections)",
        registry.source_names().join(", "),
        registry.sections().len()
    );

    let fetcher = Fetcher::new(&FetcherConfig {
        politeness_delay: Duration::from_millis(cli.delay_ms),
        ..FetcherConfig::default()
    })?;

    let config = PipelineConfig {
        workers: cli.workers.max(1),
        fetch_content: true,
        translate_immediately: cli.production,
    };
    Ok(ScraperManager::new(
        Arc::new(registry),
        Arc::new(fetcher),
        store,
        translator,
        config,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let manager = build_manager(&cli).await?;

    match cli.command {
        Commands::Fetch {
            args,
            interval: Some(interval),
        } => {
            info!("Running in periodic mode with {}s interval", interval.0.as_secs());
            loop {
                info!("Starting fetch cycle");
                let command = ScraperCommands::Fetch(args.clone());
                if let Err(e) = handle_command(ScraperArgs { command }, &manager).await {
                    error!(error = %e, "Fetch cycle failed");
                }
                info!("Waiting {}s before next fetch", interval.0.as_secs());
                tokio::time::sleep(interval.0).await;
            }
        }
        command => {
            let args = ScraperArgs {
                command: command.into_scraper_command(),
            };
            handle_command(args, &manager).await?;
        }
    }

    Ok(())
}
