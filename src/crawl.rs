//! Keyword/page crawl driver with batch checkpointing.
//!
//! [`CheckpointTracker`] is the pure state machine: it knows the current
//! `(keyword, page)`, numbers retained papers, accumulates the batch and
//! decides when a batch must be flushed. [`Crawler`] walks the tracker against
//! a [`PageSource`], writes flushed batches to a [`BatchSink`] and persists the
//! checkpoint after every flush.

use crate::checkpoint::{now, CheckpointStore, CrawlCheckpoint};
use crate::config::DelayRange;
use crate::error::{HarvestError, Result};
use crate::paper::{DetailPage, PaperDraft, PaperRecord};
use crate::relevance::TopicFilter;
use tracing::{debug, error, info, warn};

/// Detail links found on one search-results page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    pub links: Vec<String>,
    /// Whether an enabled "next page" control was present
    pub has_next: bool,
}

/// Where pages come from: a logged-in browser session, an HTTP client, a fixture.
///
/// Implementations report login walls and expired sessions as
/// [`HarvestError::ManualInterventionRequired`].
#[allow(async_fn_in_trait)]
pub trait PageSource {
    /// Results page `page` (1-based) of a keyword search.
    async fn search(&mut self, keyword: &str, page: u32) -> Result<ResultPage>;

    /// One paper's detail page.
    async fn detail(&mut self, link: &str) -> Result<DetailPage>;
}

/// Destination of flushed batches.
pub trait BatchSink {
    fn write_batch(&mut self, batch: &Batch) -> Result<()>;
}

/// Papers collected between two flushes, all from one keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub keyword: String,
    pub keyword_index: usize,
    pub start_page: u32,
    pub end_page: u32,
    pub papers: Vec<PaperRecord>,
}

/// Batch and checkpoint to persist, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush {
    /// `None` when no page since the last flush produced a paper
    pub batch: Option<Batch>,
    pub checkpoint: CrawlCheckpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Flush whenever a completed page number is a multiple of this
    pub batch_pages: u32,
    /// Treat this page as the keyword's last
    pub max_pages: u32,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_pages: 5,
            max_pages: 200,
        }
    }
}

/// Current crawl position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position<'a> {
    pub keyword_index: usize,
    pub keyword: &'a str,
    pub page: u32,
}

/// Pagination state machine over `(keyword_index, page)`.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    keywords: Vec<String>,
    policy: BatchPolicy,
    keyword_index: usize,
    page: u32,
    next_paper_number: u64,
    page_start_number: u64,
    batch: Vec<PaperRecord>,
    batch_start_page: u32,
    page_papers: Vec<PaperRecord>,
}

impl CheckpointTracker {
    pub fn new(keywords: Vec<String>, policy: BatchPolicy, start: &CrawlCheckpoint) -> Self {
        let page = start.next_page.max(1);
        let next_paper_number = start.next_paper_number.max(1);
        Self {
            keywords,
            policy: BatchPolicy {
                batch_pages: policy.batch_pages.max(1),
                max_pages: policy.max_pages.max(1),
            },
            keyword_index: start.keyword_index,
            page,
            next_paper_number,
            page_start_number: next_paper_number,
            batch: Vec::new(),
            batch_start_page: page,
            page_papers: Vec::new(),
        }
    }

    pub fn position(&self) -> Option<Position<'_>> {
        self.keywords.get(self.keyword_index).map(|keyword| Position {
            keyword_index: self.keyword_index,
            keyword,
            page: self.page,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.keyword_index >= self.keywords.len()
    }

    pub fn next_paper_number(&self) -> u64 {
        self.next_paper_number
    }

    /// Papers held in memory that a flush has not written yet.
    pub fn pending(&self) -> usize {
        self.batch.len() + self.page_papers.len()
    }

    /// Number the draft (retained papers only) and hold it with the current page.
    pub fn record(&mut self, draft: PaperDraft) -> &PaperRecord {
        let number = self.next_paper_number;
        if draft.is_retained() {
            self.next_paper_number += 1;
        }
        self.page_papers.push(draft.into_record(number));
        let last = self.page_papers.len() - 1;
        &self.page_papers[last]
    }

    /// The current page is done. Moves to the next page or, when the keyword is
    /// exhausted, to page 1 of the next keyword. Returns a flush when one is due.
    pub fn finish_page(&mut self, has_next: bool) -> Option<Flush> {
        let page = self.page;
        self.batch.append(&mut self.page_papers);
        self.page_start_number = self.next_paper_number;

        if !has_next || page >= self.policy.max_pages {
            let flush = self.flush(page, self.keyword_index + 1, 1);
            self.advance_keyword();
            return Some(flush);
        }

        self.page += 1;
        if page % self.policy.batch_pages == 0 {
            Some(self.flush(page, self.keyword_index, page + 1))
        } else {
            None
        }
    }

    /// The current page had no results: the previous page was the keyword's last.
    pub fn exhaust_keyword(&mut self) -> Flush {
        self.discard_page();
        let end_page = self.page.saturating_sub(1).max(self.batch_start_page);
        let flush = self.flush(end_page, self.keyword_index + 1, 1);
        self.advance_keyword();
        flush
    }

    /// The current page could not be loaded. Completed pages are flushed with a
    /// checkpoint pointing at the failed page; the run moves on to the next keyword.
    pub fn abandon_keyword(&mut self) -> Flush {
        self.discard_page();
        let page = self.page;
        let end_page = page.saturating_sub(1).max(self.batch_start_page);
        let flush = self.flush(end_page, self.keyword_index, page);
        self.advance_keyword();
        flush
    }

    /// Pause at the current page. Its partial results are dropped so that a
    /// resume reprocesses it from the first paper with the same numbers.
    pub fn suspend(&mut self) -> Flush {
        self.discard_page();
        let page = self.page;
        let end_page = page.saturating_sub(1).max(self.batch_start_page);
        self.flush(end_page, self.keyword_index, page)
    }

    fn discard_page(&mut self) {
        if !self.page_papers.is_empty() {
            debug!(dropped = self.page_papers.len(), "Dropping partial page");
        }
        self.page_papers.clear();
        self.next_paper_number = self.page_start_number;
    }

    fn advance_keyword(&mut self) {
        self.keyword_index += 1;
        self.page = 1;
        self.batch_start_page = 1;
    }

    fn flush(&mut self, end_page: u32, next_keyword_index: usize, next_page: u32) -> Flush {
        let keyword = self
            .keywords
            .get(self.keyword_index)
            .cloned()
            .unwrap_or_default();

        let batch = if self.batch.is_empty() {
            None
        } else {
            Some(Batch {
                keyword: keyword.clone(),
                keyword_index: self.keyword_index,
                start_page: self.batch_start_page,
                end_page,
                papers: std::mem::take(&mut self.batch),
            })
        };
        self.batch_start_page = next_page;

        Flush {
            batch,
            checkpoint: CrawlCheckpoint {
                keyword,
                keyword_index: next_keyword_index,
                next_page,
                next_paper_number: self.next_paper_number,
                timestamp: now(),
            },
        }
    }
}

/// Handed back when the crawl pauses for a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeToken {
    /// Checkpoint persisted at the pause
    pub checkpoint: CrawlCheckpoint,
    pub reason: String,
}

/// Totals of what has been written so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub batches: usize,
    pub retained: usize,
    pub skipped: usize,
    pub failed_details: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Finished(CrawlSummary),
    Suspended(ResumeToken),
}

/// Sequential crawler: one listing page, then its detail pages one by one.
pub struct Crawler<S, K> {
    source: S,
    sink: K,
    store: CheckpointStore,
    filter: TopicFilter,
    keyword_delay: DelayRange,
    summary: CrawlSummary,
}

impl<S: PageSource, K: BatchSink> Crawler<S, K> {
    pub fn new(source: S, sink: K, store: CheckpointStore, filter: TopicFilter) -> Self {
        Self {
            source,
            sink,
            store,
            filter,
            keyword_delay: DelayRange::NONE,
            summary: CrawlSummary::default(),
        }
    }

    /// Pause between two keywords.
    pub fn with_keyword_delay(mut self, delay: DelayRange) -> Self {
        self.keyword_delay = delay;
        self
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn summary(&self) -> CrawlSummary {
        self.summary
    }

    /// Crawl until the tracker reaches its terminal state or a page asks for a human.
    ///
    /// After [`CrawlOutcome::Suspended`], call `run` again with the same tracker
    /// once the situation is resolved.
    pub async fn run(&mut self, tracker: &mut CheckpointTracker) -> Result<CrawlOutcome> {
        let mut current_keyword: Option<usize> = None;

        while let Some(position) = tracker.position() {
            let keyword_index = position.keyword_index;
            let keyword = position.keyword.to_string();
            let page = position.page;

            if current_keyword != Some(keyword_index) {
                if current_keyword.is_some() {
                    self.keyword_delay.wait().await;
                }
                info!(keyword = %keyword, index = keyword_index, page, "Crawling keyword");
                current_keyword = Some(keyword_index);
            }

            let listing = match self.source.search(&keyword, page).await {
                Ok(listing) => listing,
                Err(e) if e.needs_manual_intervention() => return self.suspend(tracker, e),
                Err(e) => {
                    error!(keyword = %keyword, page, error = %e, "Failed to load results page, stopping keyword");
                    let flush = tracker.abandon_keyword();
                    self.persist(flush)?;
                    continue;
                }
            };

            if listing.links.is_empty() {
                info!(keyword = %keyword, page, "No more results");
                let flush = tracker.exhaust_keyword();
                self.persist(flush)?;
                continue;
            }

            info!(keyword = %keyword, page, papers = listing.links.len(), "Processing results page");

            for (idx, link) in listing.links.iter().enumerate() {
                match self.source.detail(link).await {
                    Ok(detail) => {
                        let draft = PaperDraft::assemble(link, &detail, &self.filter);
                        let record = tracker.record(draft);
                        debug!(
                            link = %link,
                            paper = %record.number,
                            authors = record.authors.len(),
                            "Paper processed"
                        );
                    }
                    Err(e) if e.needs_manual_intervention() => return self.suspend(tracker, e),
                    Err(e) => {
                        warn!(link = %link, idx, error = %e, "Skipping paper");
                        self.summary.failed_details += 1;
                    }
                }
            }

            if let Some(flush) = tracker.finish_page(listing.has_next) {
                self.persist(flush)?;
            }
        }

        info!(
            batches = self.summary.batches,
            retained = self.summary.retained,
            skipped = self.summary.skipped,
            "Crawl complete"
        );
        Ok(CrawlOutcome::Finished(self.summary))
    }

    fn suspend(&mut self, tracker: &mut CheckpointTracker, cause: HarvestError) -> Result<CrawlOutcome> {
        let flush = tracker.suspend();
        let checkpoint = flush.checkpoint.clone();
        self.persist(flush)?;

        warn!(
            keyword_index = checkpoint.keyword_index,
            page = checkpoint.next_page,
            reason = %cause,
            "Crawl suspended"
        );
        Ok(CrawlOutcome::Suspended(ResumeToken {
            checkpoint,
            reason: cause.to_string(),
        }))
    }

    fn persist(&mut self, flush: Flush) -> Result<()> {
        if let Some(batch) = &flush.batch {
            self.sink.write_batch(batch)?;
            self.summary.batches += 1;
            let skipped = batch.papers.iter().filter(|p| p.is_skipped()).count();
            self.summary.skipped += skipped;
            self.summary.retained += batch.papers.len() - skipped;
        }
        self.store.save(&flush.checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affiliation::{AffiliationEntry, RawAuthor};
    use crate::paper::PaperNumber;
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<(String, u32), ResultPage>,
        failing_pages: HashSet<(String, u32)>,
        details: HashMap<String, DetailPage>,
        failing_details: HashSet<String>,
        login_once: HashSet<String>,
        searches: Vec<(String, u32)>,
    }

    impl FakeSource {
        /// `pages` result pages for `keyword`, `per_page` links each. Links ending
        /// in an even index are off-topic.
        fn with_keyword(mut self, keyword: &str, pages: u32, per_page: usize) -> Self {
            for page in 1..=pages {
                let links: Vec<String> = (0..per_page)
                    .map(|n| format!("https://scopus.test/{}/{}/{}", keyword, page, n))
                    .collect();
                for (n, link) in links.iter().enumerate() {
                    let title = if n % 2 == 0 { "LLM agents" } else { "Soil erosion" };
                    self.details.insert(link.clone(), detail(title));
                }
                self.pages.insert(
                    (keyword.to_string(), page),
                    ResultPage {
                        links,
                        has_next: page < pages,
                    },
                );
            }
            self
        }
    }

    impl PageSource for FakeSource {
        async fn search(&mut self, keyword: &str, page: u32) -> Result<ResultPage> {
            self.searches.push((keyword.to_string(), page));
            if self.failing_pages.contains(&(keyword.to_string(), page)) {
                return Err(HarvestError::Browser("results table missing".to_string()));
            }
            Ok(self
                .pages
                .get(&(keyword.to_string(), page))
                .cloned()
                .unwrap_or_default())
        }

        async fn detail(&mut self, link: &str) -> Result<DetailPage> {
            if self.login_once.remove(link) {
                return Err(HarvestError::ManualInterventionRequired("session expired".to_string()));
            }
            if self.failing_details.contains(link) {
                return Err(HarvestError::Browser("tab crashed".to_string()));
            }
            self.details
                .get(link)
                .cloned()
                .ok_or_else(|| HarvestError::NotFound(link.to_string()))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        batches: Vec<Batch>,
    }

    impl BatchSink for MemorySink {
        fn write_batch(&mut self, batch: &Batch) -> Result<()> {
            self.batches.push(batch.clone());
            Ok(())
        }
    }

    fn detail(title: &str) -> DetailPage {
        DetailPage {
            title: title.to_string(),
            abstract_text: String::new(),
            affiliations: vec![AffiliationEntry::new(Some("a"), "KAIST, South Korea")],
            authors: vec![RawAuthor {
                name: "Kim J.".to_string(),
                marker_text: vec!["a".to_string()],
                email: String::new(),
            }],
        }
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    fn crawler(source: FakeSource, dir: &TempDir) -> Crawler<FakeSource, MemorySink> {
        Crawler::new(
            source,
            MemorySink::default(),
            CheckpointStore::new(dir.path().join("progress.txt")),
            TopicFilter::default(),
        )
    }

    fn numbers(batches: &[Batch]) -> Vec<u64> {
        batches
            .iter()
            .flat_map(|b| b.papers.iter())
            .filter_map(|p| match p.number {
                PaperNumber::Assigned(n) => Some(n),
                PaperNumber::Skipped => None,
            })
            .collect()
    }

    #[test]
    fn test_tracker_transitions() {
        let start = CrawlCheckpoint::start_at(0, 1);
        let policy = BatchPolicy {
            batch_pages: 2,
            max_pages: 10,
        };
        let mut tracker = CheckpointTracker::new(keywords(&["a", "b"]), policy, &start);

        assert!(tracker.finish_page(true).is_none());
        assert_eq!(tracker.position().map(|p| p.page), Some(2));

        let flush = tracker.finish_page(true).expect("page 2 flushes");
        assert!(flush.batch.is_none());
        assert_eq!(flush.checkpoint.keyword_index, 0);
        assert_eq!(flush.checkpoint.next_page, 3);

        let flush = tracker.finish_page(false).expect("exhausted keyword flushes");
        assert_eq!(flush.checkpoint.keyword_index, 1);
        assert_eq!(flush.checkpoint.next_page, 1);
        assert_eq!(tracker.position().map(|p| (p.keyword, p.page)), Some(("b", 1)));

        tracker.finish_page(false);
        assert!(tracker.is_finished());
        assert!(tracker.position().is_none());
    }

    #[test]
    fn test_tracker_numbers_only_retained_papers() {
        let start = CrawlCheckpoint::start_at(0, 1);
        let mut tracker = CheckpointTracker::new(keywords(&["a"]), BatchPolicy::default(), &start);
        let filter = TopicFilter::default();

        let kept = PaperDraft::assemble("l1", &detail("LLM"), &filter);
        let dropped = PaperDraft::assemble("l2", &detail("Rocks"), &filter);

        assert_eq!(tracker.record(kept.clone()).number, PaperNumber::Assigned(1));
        assert_eq!(tracker.record(dropped).number, PaperNumber::Skipped);
        assert_eq!(tracker.record(kept).number, PaperNumber::Assigned(2));
        assert_eq!(tracker.next_paper_number(), 3);
        assert_eq!(tracker.pending(), 3);
    }

    #[test]
    fn test_suspend_rolls_back_partial_page() {
        let start = CrawlCheckpoint::start_at(0, 4);
        let mut tracker = CheckpointTracker::new(keywords(&["a"]), BatchPolicy::default(), &start);
        let filter = TopicFilter::default();

        tracker.record(PaperDraft::assemble("l1", &detail("LLM"), &filter));
        assert!(tracker.finish_page(true).is_none());
        tracker.record(PaperDraft::assemble("l2", &detail("LLM"), &filter));

        let flush = tracker.suspend();
        let batch = flush.batch.expect("page 4 is complete");
        assert_eq!((batch.start_page, batch.end_page), (4, 4));
        assert_eq!(batch.papers.len(), 1);
        assert_eq!(flush.checkpoint.next_page, 5);
        assert_eq!(flush.checkpoint.next_paper_number, 2);
        assert_eq!(tracker.next_paper_number(), 2);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_crawl_batches_and_numbering() -> Result<()> {
        let dir = TempDir::new()?;
        let source = FakeSource::default()
            .with_keyword("alpha", 7, 3)
            .with_keyword("beta", 1, 2);
        let mut crawler = crawler(source, &dir);

        let start = CrawlCheckpoint::start_at(0, 1);
        let mut tracker = CheckpointTracker::new(keywords(&["alpha", "beta"]), BatchPolicy::default(), &start);

        let outcome = crawler.run(&mut tracker).await?;
        let CrawlOutcome::Finished(summary) = outcome else {
            panic!("crawl should finish");
        };

        let batches = &crawler.sink().batches;
        let ranges: Vec<(&str, u32, u32)> = batches
            .iter()
            .map(|b| (b.keyword.as_str(), b.start_page, b.end_page))
            .collect();
        assert_eq!(ranges, vec![("alpha", 1, 5), ("alpha", 6, 7), ("beta", 1, 1)]);

        // 7 pages x 2 on-topic + 1 on-topic
        let retained = 7 * 2 + 1;
        assert_eq!(summary.retained, retained);
        assert_eq!(summary.skipped, 7 + 1);
        assert_eq!(numbers(batches), (1..=retained as u64).collect::<Vec<_>>());
        assert_eq!(tracker.next_paper_number(), 1 + retained as u64);

        let saved = CheckpointStore::new(dir.path().join("progress.txt")).load()?;
        assert_eq!(saved.keyword_index, 2);
        assert_eq!(saved.next_page, 1);
        assert_eq!(saved.next_paper_number, 1 + retained as u64);
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let source = FakeSource::default().with_keyword("gamma", 16, 2);
        let mut crawler = crawler(source, &dir);

        let start = CrawlCheckpoint {
            keyword: "beta".to_string(),
            keyword_index: 2,
            next_page: 15,
            next_paper_number: 40,
            timestamp: String::new(),
        };
        let mut tracker =
            CheckpointTracker::new(keywords(&["alpha", "beta", "gamma"]), BatchPolicy::default(), &start);

        crawler.run(&mut tracker).await?;

        assert_eq!(
            crawler.source_mut().searches,
            vec![("gamma".to_string(), 15), ("gamma".to_string(), 16)]
        );
        let batches = &crawler.sink().batches;
        assert_eq!(batches.len(), 2);
        assert_eq!((batches[0].start_page, batches[0].end_page), (15, 15));
        assert_eq!((batches[1].start_page, batches[1].end_page), (16, 16));
        assert_eq!(numbers(batches), vec![40, 41]);
        Ok(())
    }

    #[tokio::test]
    async fn test_detail_failure_skips_paper() -> Result<()> {
        let dir = TempDir::new()?;
        let mut source = FakeSource::default().with_keyword("alpha", 1, 4);
        source.failing_details.insert("https://scopus.test/alpha/1/0".to_string());
        let mut crawler = crawler(source, &dir);

        let mut tracker =
            CheckpointTracker::new(keywords(&["alpha"]), BatchPolicy::default(), &CrawlCheckpoint::start_at(0, 1));
        crawler.run(&mut tracker).await?;

        let summary = crawler.summary();
        assert_eq!(summary.failed_details, 1);
        assert_eq!(summary.retained, 1);
        assert_eq!(crawler.sink().batches[0].papers.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_failure_flushes_and_moves_on() -> Result<()> {
        let dir = TempDir::new()?;
        let mut source = FakeSource::default()
            .with_keyword("alpha", 6, 2)
            .with_keyword("beta", 1, 2);
        source.failing_pages.insert(("alpha".to_string(), 3));
        let mut crawler = crawler(source, &dir);

        let mut tracker = CheckpointTracker::new(
            keywords(&["alpha", "beta"]),
            BatchPolicy::default(),
            &CrawlCheckpoint::start_at(0, 1),
        );
        crawler.run(&mut tracker).await?;

        let batches = &crawler.sink().batches;
        assert_eq!((batches[0].keyword.as_str(), batches[0].start_page, batches[0].end_page), ("alpha", 1, 2));
        assert_eq!(batches[1].keyword, "beta");
        assert_eq!(numbers(batches), vec![1, 2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_listing_ends_keyword() -> Result<()> {
        let dir = TempDir::new()?;
        let mut source = FakeSource::default().with_keyword("alpha", 3, 2);
        // page 3 claims a next page that turns out empty
        if let Some(page) = source.pages.get_mut(&("alpha".to_string(), 3)) {
            page.has_next = true;
        }
        let mut crawler = crawler(source, &dir);

        let mut tracker =
            CheckpointTracker::new(keywords(&["alpha"]), BatchPolicy::default(), &CrawlCheckpoint::start_at(0, 1));
        crawler.run(&mut tracker).await?;

        let batches = &crawler.sink().batches;
        assert_eq!(batches.len(), 1);
        assert_eq!((batches[0].start_page, batches[0].end_page), (1, 3));
        assert!(tracker.is_finished());
        Ok(())
    }

    #[tokio::test]
    async fn test_max_pages_caps_keyword() -> Result<()> {
        let dir = TempDir::new()?;
        let source = FakeSource::default().with_keyword("alpha", 9, 1);
        let mut crawler = crawler(source, &dir);

        let policy = BatchPolicy {
            batch_pages: 5,
            max_pages: 3,
        };
        let mut tracker = CheckpointTracker::new(keywords(&["alpha"]), policy, &CrawlCheckpoint::start_at(0, 1));
        crawler.run(&mut tracker).await?;

        assert_eq!(crawler.source_mut().searches.len(), 3);
        assert_eq!(crawler.sink().batches[0].end_page, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_suspend_and_resume_without_duplicates() -> Result<()> {
        let dir = TempDir::new()?;
        let mut source = FakeSource::default().with_keyword("alpha", 7, 2);
        source.login_once.insert("https://scopus.test/alpha/6/1".to_string());
        let mut crawler = crawler(source, &dir);

        let mut tracker =
            CheckpointTracker::new(keywords(&["alpha"]), BatchPolicy::default(), &CrawlCheckpoint::start_at(0, 1));

        let outcome = crawler.run(&mut tracker).await?;
        let CrawlOutcome::Suspended(token) = outcome else {
            panic!("login wall should suspend the crawl");
        };
        assert_eq!(token.checkpoint.keyword_index, 0);
        assert_eq!(token.checkpoint.next_page, 6);
        assert_eq!(token.checkpoint.next_paper_number, 6);

        let saved = CheckpointStore::new(dir.path().join("progress.txt")).load()?;
        assert_eq!(saved, token.checkpoint);

        let outcome = crawler.run(&mut tracker).await?;
        assert!(matches!(outcome, CrawlOutcome::Finished(_)));

        let batches = &crawler.sink().batches;
        let links: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.papers.iter().map(|p| p.link.as_str()))
            .collect();
        let unique: HashSet<&str> = links.iter().copied().collect();
        assert_eq!(links.len(), 14);
        assert_eq!(unique.len(), 14);
        assert_eq!(numbers(batches), (1..=7).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_from_persisted_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let mut source = FakeSource::default().with_keyword("alpha", 12, 1);
        source.login_once.insert("https://scopus.test/alpha/8/0".to_string());
        let mut first = crawler(source, &dir);

        let mut tracker =
            CheckpointTracker::new(keywords(&["alpha"]), BatchPolicy::default(), &CrawlCheckpoint::start_at(0, 1));
        first.run(&mut tracker).await?;

        // new process: fresh tracker from the file
        let saved = CheckpointStore::new(dir.path().join("progress.txt")).load()?;
        assert_eq!((saved.keyword_index, saved.next_page, saved.next_paper_number), (0, 8, 8));

        let source = FakeSource::default().with_keyword("alpha", 12, 1);
        let mut second = crawler(source, &dir);
        let mut tracker = CheckpointTracker::new(keywords(&["alpha"]), BatchPolicy::default(), &saved);
        second.run(&mut tracker).await?;

        assert_eq!(second.source_mut().searches.first(), Some(&("alpha".to_string(), 8)));
        let mut all = numbers(&first.sink().batches);
        all.extend(numbers(&second.sink().batches));
        assert_eq!(all, (1..=12).collect::<Vec<_>>());
        Ok(())
    }
}
