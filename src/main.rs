//! rustscopus - resumable Scopus author/affiliation crawler
//!
//! ## Usage
//!
//! ```bash
//! rustscopus cookies import
//! rustscopus crawl --config crawl.json
//! rustscopus crawl --resume
//! rustscopus merge --output ./output
//! rustscopus split output/scopus_LLM_embodied_pages_1-5.csv --rows 100
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustscopus::affiliation::{parse_affiliation, resolve, AffiliationTable};
use rustscopus::checkpoint::{CheckpointStore, CrawlCheckpoint};
use rustscopus::config::CrawlConfig;
use rustscopus::cookies::{parse_cookies, CookieManager};
use rustscopus::crawl::{BatchPolicy, CheckpointTracker, CrawlOutcome, Crawler, ResumeToken};
use rustscopus::export::{consolidate, split_export, CsvExporter};
use rustscopus::relevance::TopicFilter;
use rustscopus::scopus::{parse_detail_page, ScopusClient, ScopusOptions};
use rustscopus::HarvestError;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Resumable Scopus author/affiliation crawler
#[derive(Parser)]
#[command(name = "rustscopus")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl all keywords, writing a CSV batch and a checkpoint every few pages
    Crawl {
        /// JSON config file (missing fields use defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Continue from the saved checkpoint
        #[arg(long, conflicts_with_all = ["start_keyword", "start_page"])]
        resume: bool,

        /// Keyword index to start from (0-based)
        #[arg(long)]
        start_keyword: Option<usize>,

        /// Results page to start from (1-based)
        #[arg(long)]
        start_page: Option<u32>,

        /// Proxy URL (e.g., http://127.0.0.1:7890)
        #[arg(long)]
        proxy: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or reset the crawl checkpoint
    Checkpoint {
        /// Checkpoint file
        #[arg(long, default_value = rustscopus::checkpoint::DEFAULT_CHECKPOINT_FILE)]
        file: PathBuf,

        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Manage session cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },

    /// Split an exported CSV into parts for manual annotation
    Split {
        /// Exported CSV file
        input: PathBuf,

        /// Rows per part
        #[arg(long, default_value = "100")]
        rows: usize,

        /// Directory for the parts
        #[arg(long, default_value = "split_files")]
        output_dir: PathBuf,
    },

    /// Merge the batch files of an output directory into one file per keyword
    Merge {
        /// Output directory of a crawl
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },

    /// Parse a saved detail-page HTML file and print its authors
    Inspect {
        /// Saved detail page
        html: PathBuf,

        /// JSON config file whose topic terms drive keyword detection
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the saved checkpoint
    Show,
    /// Delete the saved checkpoint
    Clear,
}

#[derive(Subcommand)]
enum CookieAction {
    /// Paste cookies exported from a logged-in browser
    Import,
    /// Show cookie file path
    Path,
    /// Clear stored cookies
    Clear,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Crawl {
            config,
            resume,
            start_keyword,
            start_page,
            proxy,
            output,
        } => run_crawl(config, resume, start_keyword, start_page, proxy, output).await,
        Commands::Checkpoint { file, action } => handle_checkpoint(file, action),
        Commands::Cookies { action } => handle_cookies(action),
        Commands::Split {
            input,
            rows,
            output_dir,
        } => {
            let parts = split_export(&input, rows, &output_dir)
                .with_context(|| format!("Failed to split {}", input.display()))?;
            for part in &parts {
                println!("Saved: {}", part.display());
            }
            println!("Split into {} files.", parts.len());
            Ok(())
        }
        Commands::Merge { output } => merge_batches(&output),
        Commands::Inspect { html, config } => inspect_detail_page(html, config),
    }
}

// ============================================================================
// Crawl
// ============================================================================

async fn run_crawl(
    config_path: Option<PathBuf>,
    resume: bool,
    start_keyword: Option<usize>,
    start_page: Option<u32>,
    proxy: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => CrawlConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CrawlConfig::default(),
    };
    if proxy.is_some() {
        config.proxy = proxy;
    }
    if let Some(dir) = output {
        config.output_dir = dir;
    }
    config.validate().context("Invalid configuration")?;

    let keywords = config.keyword_list();
    let store = CheckpointStore::new(&config.checkpoint_path);

    let start = if resume {
        match store.load() {
            Ok(checkpoint) => checkpoint,
            Err(HarvestError::NotFound(_)) => {
                warn!(path = %store.path().display(), "No checkpoint found, starting from the beginning");
                CrawlCheckpoint::start_at(0, 1)
            }
            Err(e) => return Err(e).context("Failed to read checkpoint"),
        }
    } else {
        CrawlCheckpoint::start_at(start_keyword.unwrap_or(0), start_page.unwrap_or(1))
    };

    if start.keyword_index >= keywords.len() {
        if resume {
            println!("Checkpoint is past the last keyword; nothing left to crawl.");
            println!("Run 'rustscopus checkpoint clear' to start over.");
            return Ok(());
        }
        anyhow::bail!(
            "--start-keyword {} is out of range (0-{})",
            start.keyword_index,
            keywords.len() - 1
        );
    }

    println!("Keywords:");
    for (idx, keyword) in keywords.iter().enumerate() {
        let marker = if idx == start.keyword_index { ">" } else { " " };
        println!(" {} [{}] {}", marker, idx, keyword);
    }
    println!(
        "Starting at keyword {} page {} (paper no. {})",
        start.keyword_index, start.next_page, start.next_paper_number
    );
    println!("Output folder: {}", config.output_dir.display());

    let cookie_manager = CookieManager::new()?;
    let options = ScopusOptions {
        base_url: config.base_url.clone(),
        proxy: config.proxy.clone(),
        page_size: config.page_size,
        request_delay: config.request_delay_ms,
    };
    let client = ScopusClient::new(&options, &cookie_manager.load()).context("Failed to create Scopus client")?;
    let exporter = CsvExporter::new(&config.output_dir).context("Failed to create output directory")?;
    let filter = TopicFilter::new(&config.topic).context("Invalid topic terms")?;

    let policy = BatchPolicy {
        batch_pages: config.batch_pages,
        max_pages: config.max_pages,
    };
    let mut tracker = CheckpointTracker::new(keywords, policy, &start);
    let mut crawler = Crawler::new(client, exporter, store, filter).with_keyword_delay(config.keyword_delay_ms);

    loop {
        match crawler.run(&mut tracker).await? {
            CrawlOutcome::Finished(summary) => {
                println!();
                println!(
                    "✓ Crawl complete: {} papers retained, {} skipped, {} failed, {} batches.",
                    summary.retained, summary.skipped, summary.failed_details, summary.batches
                );
                println!("Results in: {}", config.output_dir.display());
                return merge_batches(&config.output_dir);
            }
            CrawlOutcome::Suspended(token) => {
                if !wait_for_operator(&token, &cookie_manager)? {
                    println!("Stopped. Resume later with: rustscopus crawl --resume");
                    return Ok(());
                }
                crawler.source_mut().set_cookies(&cookie_manager.load());
                info!("Resuming crawl");
            }
        }
    }
}

fn merge_batches(output_dir: &std::path::Path) -> Result<()> {
    let merged = consolidate(output_dir)
        .with_context(|| format!("Failed to merge batches in {}", output_dir.display()))?;
    for path in &merged {
        println!("Merged: {}", path.display());
    }
    println!("Merged {} keywords.", merged.len());
    Ok(())
}

/// Ask the operator to log in again. Returns false when they want to stop.
fn wait_for_operator(token: &ResumeToken, manager: &CookieManager) -> Result<bool> {
    println!();
    println!("=== Crawl paused: {} ===", token.reason);
    println!(
        "Checkpoint saved at keyword {} page {}.",
        token.checkpoint.keyword_index, token.checkpoint.next_page
    );
    println!();
    println!("1. Log in to Scopus in your browser (complete any CAPTCHA)");
    println!("2. Export the cookies as JSON (e.g. with a cookie export extension)");
    println!("3. Paste the JSON below, or press Enter to reload {:?}", manager.path());
    println!("Type 'q' to stop.");
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.eq_ignore_ascii_case("q") {
        return Ok(false);
    }
    if !input.is_empty() {
        match parse_cookies(input) {
            Ok(cookies) => {
                manager.save(&cookies)?;
                println!("Saved {} cookies.", cookies.len());
            }
            Err(e) => println!("Failed to parse cookies ({}), reloading cookie file instead.", e),
        }
    }
    Ok(true)
}

// ============================================================================
// Checkpoint Management
// ============================================================================

fn handle_checkpoint(file: PathBuf, action: CheckpointAction) -> Result<()> {
    let store = CheckpointStore::new(file);

    match action {
        CheckpointAction::Show => match store.load() {
            Ok(checkpoint) => print!("{}", checkpoint.to_text()),
            Err(HarvestError::NotFound(_)) => println!("No checkpoint at {}", store.path().display()),
            Err(e) => return Err(e).context("Failed to read checkpoint"),
        },
        CheckpointAction::Clear => {
            store.clear()?;
            println!("Checkpoint cleared.");
        }
    }

    Ok(())
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: CookieAction) -> Result<()> {
    let manager = CookieManager::new()?;

    match action {
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
        }
        CookieAction::Import => import_cookies(&manager)?,
    }

    Ok(())
}

fn import_cookies(manager: &CookieManager) -> Result<()> {
    println!("=== Cookie Export Instructions ===");
    println!();
    println!("1. Open your browser and log in to Scopus through the library proxy");
    println!("2. Press F12 to open Developer Tools");
    println!("3. Go to 'Application' tab -> 'Cookies' and select the Scopus site");
    println!("4. Copy all cookies, or use a cookie export extension");
    println!();
    println!("Paste cookies in JSON format below (or press Enter to skip):");
    println!("Format: [{{\"name\":\"SCSESSIONID\",\"value\":\"xxx\",\"domain\":\".oca.korea.ac.kr\"}},...]");
    println!();
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.is_empty() {
        println!("No cookies provided. You can manually create the cookie file at:");
        println!("{:?}", manager.path());
        return Ok(());
    }

    match parse_cookies(input) {
        Ok(cookies) => {
            manager.save(&cookies)?;
            println!("Successfully saved {} cookies!", cookies.len());
        }
        Err(e) => {
            println!("Failed to parse cookies: {}", e);
            println!("Please ensure the format is valid JSON.");
        }
    }

    Ok(())
}

// ============================================================================
// Inspect
// ============================================================================

fn inspect_detail_page(path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let filter = match config_path {
        Some(config_path) => {
            let config = CrawlConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config {}", config_path.display()))?;
            TopicFilter::new(&config.topic).context("Invalid topic terms")?
        }
        None => TopicFilter::default(),
    };

    let html = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let page = parse_detail_page(&html).context("Failed to parse detail page")?;

    println!("Title: {}", page.title);
    match filter.detect(&page.title, &page.abstract_text) {
        Some(sentences) => println!("Detected: {}", sentences),
        None => println!("Detected: (no keyword match)"),
    }

    let table = AffiliationTable::build(&page.affiliations);
    println!();
    println!("Affiliations ({}):", table.len());
    for key in table.keys() {
        if let Some(entry) = table.get(key) {
            let parsed = parse_affiliation(&entry.text);
            println!("  [{}] {}", key, entry.text);
            println!(
                "      department: {} | university: {} | country: {}",
                parsed.department, parsed.university, parsed.country
            );
        }
    }

    println!();
    println!("Authors ({}):", page.authors.len());
    for author in resolve(&page.affiliations, &page.authors) {
        println!("  {} <{}> markers: {}", author.name, author.email, author.markers.join(","));
        for label in author.affiliations.iter().map(|a| a.label()) {
            println!("      {}", label);
        }
    }

    Ok(())
}
