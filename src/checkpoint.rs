//! Crawl checkpoint persistence.
//!
//! The checkpoint is the only resumption state: the next `(keyword, page)` to
//! crawl and the next paper number. It is stored as a small `key: value` text
//! file so it can be read and edited by hand.

use crate::error::{HarvestError, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default checkpoint file, relative to the working directory
pub const DEFAULT_CHECKPOINT_FILE: &str = "scopus_progress.txt";

/// Resume point of a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlCheckpoint {
    /// Keyword the last flush belonged to (informational)
    pub keyword: String,
    pub keyword_index: usize,
    pub next_page: u32,
    pub next_paper_number: u64,
    pub timestamp: String,
}

impl CrawlCheckpoint {
    /// Fresh start at a given position, e.g. for a manual resume.
    pub fn start_at(keyword_index: usize, page: u32) -> Self {
        Self {
            keyword: String::new(),
            keyword_index,
            next_page: page.max(1),
            next_paper_number: 1,
            timestamp: now(),
        }
    }

    pub fn to_text(&self) -> String {
        format!(
            "last_keyword: {}\n\
             keyword_index: {}\n\
             next_page: {}\n\
             next_paper_number: {}\n\
             timestamp: {}\n\
             \n\
             resume: rustscopus crawl --resume\n\
             manual: rustscopus crawl --start-keyword {} --start-page {}\n",
            self.keyword,
            self.keyword_index,
            self.next_page,
            self.next_paper_number,
            self.timestamp,
            self.keyword_index,
            self.next_page,
        )
    }

    /// Parse the text written by [`CrawlCheckpoint::to_text`]. Unknown keys are ignored.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut keyword = String::new();
        let mut keyword_index = None;
        let mut next_page = None;
        let mut next_paper_number = 1;
        let mut timestamp = String::new();

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "last_keyword" => keyword = value.to_string(),
                "keyword_index" => keyword_index = Some(parse_field(key, value)?),
                "next_page" => next_page = Some(parse_field(key, value)?),
                "next_paper_number" => next_paper_number = parse_field(key, value)?,
                "timestamp" => timestamp = value.to_string(),
                _ => {}
            }
        }

        let keyword_index = keyword_index
            .ok_or_else(|| HarvestError::MalformedInput("checkpoint lacks keyword_index".to_string()))?;
        let next_page: u32 = next_page
            .ok_or_else(|| HarvestError::MalformedInput("checkpoint lacks next_page".to_string()))?;

        if next_page == 0 || next_paper_number == 0 {
            return Err(HarvestError::MalformedInput(
                "checkpoint page and paper number start at 1".to_string(),
            ));
        }

        Ok(Self {
            keyword,
            keyword_index,
            next_page,
            next_paper_number,
            timestamp,
        })
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| HarvestError::MalformedInput(format!("invalid {} '{}'", key.trim(), value)))
}

pub(crate) fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Reads and writes the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last checkpoint.
    ///
    /// `NotFound` when no crawl has flushed yet, `MalformedInput` when the file
    /// cannot be understood.
    pub fn load(&self) -> Result<CrawlCheckpoint> {
        if !self.path.exists() {
            return Err(HarvestError::NotFound(format!(
                "no checkpoint at {}",
                self.path.display()
            )));
        }

        let text = std::fs::read_to_string(&self.path)?;
        let checkpoint = CrawlCheckpoint::from_text(&text)?;
        debug!(path = %self.path.display(), ?checkpoint, "Loaded checkpoint");
        Ok(checkpoint)
    }

    /// Overwrite the checkpoint file.
    pub fn save(&self, checkpoint: &CrawlCheckpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so an interrupted save never leaves half a file.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, checkpoint.to_text())?;
        std::fs::rename(&tmp, &self.path)?;

        info!(
            keyword_index = checkpoint.keyword_index,
            next_page = checkpoint.next_page,
            next_paper = checkpoint.next_paper_number,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint file.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Cleared checkpoint at {:?}", self.path);
        }
        Ok(())
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_FILE)
    }
}
