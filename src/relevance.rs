//! Topical relevance filtering for detail pages.
//!
//! A paper is kept only when its title or abstract mentions the tracked topic:
//! an abbreviation family matched on word boundaries (`llm`, `llms`) or one of
//! the spelled-out phrases (`large language model`).

use crate::error::{HarvestError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between extracted sentences.
pub const SENTENCE_SEPARATOR: &str = " | ";

/// Detected-sentences text stored for papers that fail the filter.
pub const SKIPPED_SENTINEL: &str = "no keyword match - skipped";

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]+").expect("sentence pattern is valid");
    static ref DEFAULT_FILTER: TopicFilter =
        TopicFilter::new(&TopicTerms::default()).expect("default topic terms are valid");
}

/// Terms describing the tracked topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTerms {
    /// Abbreviations matched as whole words, with an optional plural `s`
    pub abbreviations: Vec<String>,
    /// Phrases matched as plain substrings
    pub phrases: Vec<String>,
}

impl Default for TopicTerms {
    fn default() -> Self {
        Self {
            abbreviations: vec!["llm".to_string()],
            phrases: vec!["large language model".to_string()],
        }
    }
}

/// Compiled topic matcher.
#[derive(Debug, Clone)]
pub struct TopicFilter {
    pattern: Option<Regex>,
    phrases: Vec<String>,
}

impl TopicFilter {
    pub fn new(terms: &TopicTerms) -> Result<Self> {
        let abbreviations: Vec<String> = terms
            .abbreviations
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .map(|a| regex::escape(&a))
            .collect();

        let phrases: Vec<String> = terms
            .phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        if abbreviations.is_empty() && phrases.is_empty() {
            return Err(HarvestError::Config("topic needs at least one term".to_string()));
        }

        let pattern = if abbreviations.is_empty() {
            None
        } else {
            let source = format!(r"\b(?:{})s?\b", abbreviations.join("|"));
            Some(Regex::new(&source).map_err(|e| HarvestError::Config(e.to_string()))?)
        };

        Ok(Self { pattern, phrases })
    }

    pub fn contains_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();

        if let Some(pattern) = &self.pattern {
            if pattern.is_match(&lower) {
                return true;
            }
        }

        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Sentences of `text` that mention the topic, joined with `" | "`.
    pub fn extract_matching_sentences(&self, text: &str) -> String {
        SENTENCE_END
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty() && self.contains_keyword(s))
            .collect::<Vec<_>>()
            .join(SENTENCE_SEPARATOR)
    }

    /// Summarise where the topic shows up in a paper.
    ///
    /// Returns `None` when neither the title nor the abstract matches.
    pub fn detect(&self, title: &str, abstract_text: &str) -> Option<String> {
        let title_hit = self.contains_keyword(title);
        let abstract_hit = self.contains_keyword(abstract_text);

        if !title_hit && !abstract_hit {
            return None;
        }

        let mut parts = Vec::new();
        if title_hit {
            let sentences = self.extract_matching_sentences(title);
            if !sentences.is_empty() {
                parts.push(format!("Title: {}", sentences));
            }
        }
        if abstract_hit {
            let sentences = self.extract_matching_sentences(abstract_text);
            if !sentences.is_empty() {
                parts.push(format!("Abstract: {}", sentences));
            }
        }

        Some(parts.join(SENTENCE_SEPARATOR))
    }
}

impl Default for TopicFilter {
    fn default() -> Self {
        DEFAULT_FILTER.clone()
    }
}

/// [`TopicFilter::contains_keyword`] with the default LLM terms.
pub fn contains_keyword(text: &str) -> bool {
    DEFAULT_FILTER.contains_keyword(text)
}

/// [`TopicFilter::extract_matching_sentences`] with the default LLM terms.
pub fn extract_matching_sentences(text: &str) -> String {
    DEFAULT_FILTER.extract_matching_sentences(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundary_match() {
        assert!(contains_keyword("We use LLMs for control."));
        assert!(contains_keyword("An LLM-based planner"));
        assert!(!contains_keyword("We use llamas for control."));
        assert!(!contains_keyword("allmighty"));
    }

    #[test]
    fn test_phrase_match() {
        assert!(contains_keyword("Large Language Models for robots"));
        assert!(!contains_keyword("language models"));
    }

    #[test]
    fn test_extract_matching_sentences() {
        assert_eq!(
            extract_matching_sentences("LLMs are great. Cats are nice."),
            "LLMs are great"
        );
        assert_eq!(
            extract_matching_sentences("Why LLMs?! Because. A large language model helps!"),
            "Why LLMs | A large language model helps"
        );
        assert_eq!(extract_matching_sentences("Nothing here."), "");
    }

    #[test]
    fn test_detect() {
        let filter = TopicFilter::default();
        assert_eq!(filter.detect("Robot arms", "No match here."), None);
        assert_eq!(
            filter.detect("LLM agents for IoT", "We study sensors. LLMs plan tasks."),
            Some("Title: LLM agents for IoT | Abstract: LLMs plan tasks".to_string())
        );
        assert_eq!(
            filter.detect("Embodied AI", "A large language model guides the robot."),
            Some("Abstract: A large language model guides the robot".to_string())
        );
    }

    #[test]
    fn test_custom_terms() -> Result<()> {
        let filter = TopicFilter::new(&TopicTerms {
            abbreviations: vec!["VLM".to_string()],
            phrases: vec!["vision language model".to_string()],
        })?;
        assert!(filter.contains_keyword("Two VLMs compared"));
        assert!(!filter.contains_keyword("LLMs only"));
        Ok(())
    }

    #[test]
    fn test_empty_terms_rejected() {
        let terms = TopicTerms {
            abbreviations: vec![" ".to_string()],
            phrases: vec![],
        };
        assert!(matches!(TopicFilter::new(&terms), Err(HarvestError::Config(_))));
    }
}
