//! Crawl configuration.
//!
//! Defaults reproduce the standard Scopus crawl; a JSON file can override any
//! field and CLI flags override the file.

use crate::error::{HarvestError, Result};
use crate::relevance::TopicTerms;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Scopus as reached through the institutional proxy
pub const DEFAULT_BASE_URL: &str = "https://www-scopus-com-ssl.oca.korea.ac.kr";

/// Search keywords crawled when no configuration supplies its own
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "LLM OR large language model",
    "LLM embodied",
    "LLM AND IoT",
    "LLM wireless communications",
    "embodied AI AND IoT",
    "embodied AI internet of things",
    "LLM spectrum management",
    "embodied AI wireless communication",
];

/// Random pause range in milliseconds, inclusive. `[0, 0]` disables the pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange(pub u64, pub u64);

impl DelayRange {
    pub const NONE: DelayRange = DelayRange(0, 0);

    pub fn is_valid(&self) -> bool {
        self.0 <= self.1
    }

    /// Pick a duration inside the range.
    pub fn sample(&self) -> Duration {
        if self.1 == 0 || !self.is_valid() {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.0..=self.1))
    }

    pub async fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Pausing");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Everything a crawl needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Scopus root URL (proxy or direct)
    pub base_url: String,
    /// Ordered search keywords
    pub keywords: Vec<String>,
    /// Flush a batch after every N-th page
    pub batch_pages: u32,
    /// Last page crawled per keyword
    pub max_pages: u32,
    /// Results requested per listing page
    pub page_size: u32,
    /// Where batch spreadsheets are written
    pub output_dir: PathBuf,
    /// Checkpoint file
    pub checkpoint_path: PathBuf,
    /// Topic the relevance filter looks for
    pub topic: TopicTerms,
    /// Pause before each page request
    pub request_delay_ms: DelayRange,
    /// Pause between keywords
    pub keyword_delay_ms: DelayRange,
    /// Optional HTTP proxy (e.g. "http://127.0.0.1:7890")
    pub proxy: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            batch_pages: 5,
            max_pages: 200,
            page_size: 20,
            output_dir: PathBuf::from("./output"),
            checkpoint_path: PathBuf::from(crate::checkpoint::DEFAULT_CHECKPOINT_FILE),
            topic: TopicTerms::default(),
            request_delay_ms: DelayRange(2000, 4000),
            keyword_delay_ms: DelayRange(10_000, 15_000),
            proxy: None,
        }
    }
}

impl CrawlConfig {
    /// Load a JSON config file; absent fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarvestError::NotFound(format!("config file {}", path.display())));
        }

        let content = std::fs::read_to_string(path)?;
        let config: CrawlConfig = serde_json::from_str(&content)
            .map_err(|e| HarvestError::MalformedInput(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), keywords = config.keywords.len(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(HarvestError::Config("at least one keyword is required".to_string()));
        }
        if self.batch_pages == 0 {
            return Err(HarvestError::Config("batch_pages must be at least 1".to_string()));
        }
        if self.max_pages == 0 {
            return Err(HarvestError::Config("max_pages must be at least 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(HarvestError::Config("page_size must be at least 1".to_string()));
        }
        if !self.request_delay_ms.is_valid() || !self.keyword_delay_ms.is_valid() {
            return Err(HarvestError::Config("delay ranges must be [min, max]".to_string()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| HarvestError::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        Ok(())
    }

    /// Keywords with blank entries removed, in configured order.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}
