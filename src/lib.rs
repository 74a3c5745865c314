//! # rustscopus
//!
//! Resumable Scopus crawler: searches a list of keywords page by page, opens
//! every paper's detail page, keeps papers that mention the topic, reconciles
//! authors with their affiliations and writes batches of rows to CSV with a
//! checkpoint after each batch.
//!
//! ## Modules
//!
//! - [`crawl`] - Pagination state machine and crawl driver
//! - [`scopus`] - Scopus HTTP page source and HTML parsing
//! - [`affiliation`] - Author/affiliation reconciliation
//! - [`relevance`] - Topic keyword filter
//! - [`paper`] - Paper assembly
//! - [`checkpoint`] - Checkpoint persistence
//! - [`export`] - CSV batch export and splitter
//! - [`config`] - Crawl configuration
//! - [`cookies`] - Session cookie persistence
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustscopus::checkpoint::{CheckpointStore, CrawlCheckpoint};
//! use rustscopus::config::CrawlConfig;
//! use rustscopus::cookies::CookieManager;
//! use rustscopus::crawl::{BatchPolicy, CheckpointTracker, Crawler};
//! use rustscopus::export::CsvExporter;
//! use rustscopus::relevance::TopicFilter;
//! use rustscopus::scopus::{ScopusClient, ScopusOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CrawlConfig::default();
//!     let client = ScopusClient::new(&ScopusOptions::default(), &CookieManager::new()?.load())?;
//!     let mut tracker = CheckpointTracker::new(
//!         config.keyword_list(),
//!         BatchPolicy::default(),
//!         &CrawlCheckpoint::start_at(0, 1),
//!     );
//!     let mut crawler = Crawler::new(
//!         client,
//!         CsvExporter::new(&config.output_dir)?,
//!         CheckpointStore::new(&config.checkpoint_path),
//!         TopicFilter::new(&config.topic)?,
//!     );
//!     let outcome = crawler.run(&mut tracker).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod affiliation;
pub mod checkpoint;
pub mod config;
pub mod cookies;
pub mod crawl;
pub mod error;
pub mod export;
pub mod paper;
pub mod relevance;
pub mod scopus;

pub use error::{HarvestError, Result};
