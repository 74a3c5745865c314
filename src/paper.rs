//! Paper records assembled from detail pages.

use crate::affiliation::{resolve, AffiliationEntry, AuthorRecord, RawAuthor};
use crate::relevance::{TopicFilter, SKIPPED_SENTINEL};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw content of one detail page, as delivered by a page source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailPage {
    pub title: String,
    pub abstract_text: String,
    pub affiliations: Vec<AffiliationEntry>,
    pub authors: Vec<RawAuthor>,
}

/// Sequence number of a retained paper, or the skipped marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperNumber {
    Assigned(u64),
    Skipped,
}

impl fmt::Display for PaperNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperNumber::Assigned(n) => write!(f, "{}", n),
            PaperNumber::Skipped => write!(f, "skipped"),
        }
    }
}

/// One visited detail page, ready for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub link: String,
    pub authors: Vec<AuthorRecord>,
    pub detected_sentences: String,
    pub number: PaperNumber,
}

impl PaperRecord {
    pub fn is_skipped(&self) -> bool {
        self.number == PaperNumber::Skipped
    }
}

/// A paper before numbering: either kept with its authors or skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperDraft {
    Retained {
        link: String,
        authors: Vec<AuthorRecord>,
        detected_sentences: String,
    },
    Skipped {
        link: String,
    },
}

impl PaperDraft {
    /// Run the topic filter and, for matching papers, the affiliation resolver.
    pub fn assemble(link: &str, page: &DetailPage, filter: &TopicFilter) -> Self {
        match filter.detect(&page.title, &page.abstract_text) {
            Some(detected_sentences) => PaperDraft::Retained {
                link: link.to_string(),
                authors: resolve(&page.affiliations, &page.authors),
                detected_sentences,
            },
            None => PaperDraft::Skipped {
                link: link.to_string(),
            },
        }
    }

    /// Attach the number; `number` is ignored for skipped drafts.
    pub fn into_record(self, number: u64) -> PaperRecord {
        match self {
            PaperDraft::Retained {
                link,
                authors,
                detected_sentences,
            } => PaperRecord {
                link,
                authors,
                detected_sentences,
                number: PaperNumber::Assigned(number),
            },
            PaperDraft::Skipped { link } => PaperRecord {
                link,
                authors: Vec::new(),
                detected_sentences: SKIPPED_SENTINEL.to_string(),
                number: PaperNumber::Skipped,
            },
        }
    }

    pub fn is_retained(&self) -> bool {
        matches!(self, PaperDraft::Retained { .. })
    }
}
