//! Author/affiliation reconciliation.
//!
//! A detail page lists affiliations tagged with footnote markers (`a`, `1`, ...)
//! and authors carrying superscripts that point at those markers. This module
//! turns both lists into one [`AuthorRecord`] per author and splits affiliation
//! strings into department, university and country.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix of the keys given to affiliations listed without a footnote marker.
pub const SYNTHETIC_MARKER: &str = "default";

/// Separator used when several affiliations land in a single cell.
pub const CELL_SEPARATOR: &str = " | ";

/// Keywords that identify the institution part of an affiliation string.
const INSTITUTION_KEYWORDS: &[&str] = &["university", "college", "institute", "school"];

/// One affiliation line as shown on a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliationEntry {
    /// Footnote symbol, `None` when the page printed no marker
    pub marker: Option<String>,
    /// Full affiliation text
    pub text: String,
}

impl AffiliationEntry {
    pub fn new(marker: Option<&str>, text: &str) -> Self {
        Self {
            marker: marker
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from),
            text: text.trim().to_string(),
        }
    }

    /// Text prefixed with its marker, e.g. `[a] Dept of CS, KAIST, South Korea`.
    pub fn label(&self) -> String {
        match &self.marker {
            Some(marker) => format!("[{}] {}", marker, self.text),
            None => format!("[no marker] {}", self.text),
        }
    }
}

/// Author entry as scraped, before reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAuthor {
    pub name: String,
    /// Raw superscript texts, possibly holding several markers each (`"a, b"`)
    pub marker_text: Vec<String>,
    /// Email from a `mailto:` link in the author's block, empty when absent
    pub email: String,
}

/// Author with the affiliations that apply to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub name: String,
    /// Lookup keys into the page's affiliation table
    pub markers: Vec<String>,
    pub email: String,
    pub affiliations: Vec<AffiliationEntry>,
}

impl AuthorRecord {
    /// Marker-prefixed affiliation texts joined for a single cell.
    pub fn raw_affiliations(&self) -> String {
        self.affiliations
            .iter()
            .map(AffiliationEntry::label)
            .collect::<Vec<_>>()
            .join(CELL_SEPARATOR)
    }

    /// Parsed department, university and country columns, one value per affiliation.
    pub fn parsed_columns(&self) -> (String, String, String) {
        let parsed: Vec<ParsedAffiliation> = self
            .affiliations
            .iter()
            .map(|a| parse_affiliation(&a.text))
            .collect();

        let departments: Vec<&str> = parsed.iter().map(|p| p.department.as_str()).collect();
        let universities: Vec<&str> = parsed.iter().map(|p| p.university.as_str()).collect();
        let countries: Vec<&str> = parsed.iter().map(|p| p.country.as_str()).collect();

        (
            departments.join(CELL_SEPARATOR),
            universities.join(CELL_SEPARATOR),
            countries.join(CELL_SEPARATOR),
        )
    }
}

/// Affiliation split into its parts. Fields are empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAffiliation {
    pub department: String,
    pub university: String,
    pub country: String,
}

/// Marker → affiliation lookup preserving the order the page declared them in.
#[derive(Debug, Clone, Default)]
pub struct AffiliationTable {
    entries: Vec<(String, AffiliationEntry)>,
}

impl AffiliationTable {
    pub fn build(entries: &[AffiliationEntry]) -> Self {
        let mut table = Self::default();

        for entry in entries {
            match &entry.marker {
                Some(marker) => {
                    if let Some(slot) = table.entries.iter_mut().find(|(k, _)| k == marker) {
                        slot.1 = entry.clone();
                    } else {
                        table.entries.push((marker.clone(), entry.clone()));
                    }
                }
                None => {
                    if entry.text.is_empty() {
                        continue;
                    }
                    let key = table.next_synthetic_key();
                    table.entries.push((key, entry.clone()));
                }
            }
        }

        table
    }

    fn next_synthetic_key(&self) -> String {
        let mut key = SYNTHETIC_MARKER.to_string();
        let mut counter = 1;
        while self.contains(&key) {
            key = format!("{}{}", SYNTHETIC_MARKER, counter);
            counter += 1;
        }
        key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&AffiliationEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// Split superscript texts like `"a, b"` or `"1 2"` into single markers.
pub fn tokenize_markers(marker_text: &[String]) -> Vec<String> {
    marker_text
        .iter()
        .flat_map(|text| text.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Entries that are not real authors: blanks, the "Authors" heading and
/// "+N more" controls.
pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case("authors") || name.starts_with('+')
}

/// Assign affiliations to authors.
///
/// Precedence per author: a single affiliation on the page applies to everyone;
/// otherwise explicit markers are looked up (unknown ones dropped); otherwise
/// the first declared affiliation is used; with no affiliations the list is empty.
/// Placeholder names are left out. Same-name authors stay separate records.
pub fn resolve(entries: &[AffiliationEntry], authors: &[RawAuthor]) -> Vec<AuthorRecord> {
    let table = AffiliationTable::build(entries);

    authors
        .iter()
        .filter(|author| !is_placeholder_name(&author.name))
        .map(|author| {
            let tokens = tokenize_markers(&author.marker_text);

            let markers: Vec<String> = if table.len() == 1 {
                table.keys().map(String::from).collect()
            } else if !tokens.is_empty() {
                tokens.into_iter().filter(|t| table.contains(t)).collect()
            } else {
                table.keys().take(1).map(String::from).collect()
            };

            let affiliations: Vec<AffiliationEntry> = markers
                .iter()
                .filter_map(|m| table.get(m))
                .cloned()
                .collect();

            debug!(author = %author.name, markers = ?markers, "Resolved affiliations");

            AuthorRecord {
                name: author.name.trim().to_string(),
                markers,
                email: author.email.trim().to_string(),
                affiliations,
            }
        })
        .collect()
}

/// Best-effort split of `"Department, University, City, Country"` strings.
pub fn parse_affiliation(text: &str) -> ParsedAffiliation {
    let mut parsed = ParsedAffiliation::default();

    if text.trim().is_empty() {
        return parsed;
    }

    let parts: Vec<&str> = text.split(',').map(str::trim).collect();

    match parts.len() {
        1 => parsed.university = parts[0].to_string(),
        2 => {
            parsed.university = parts[0].to_string();
            parsed.country = parts[1].to_string();
        }
        _ => {
            parsed.department = parts[0].to_string();
            parsed.university = parts[1].to_string();
            parsed.country = parts[parts.len() - 1].to_string();
        }
    }

    let first = parts[0].to_lowercase();
    if parts.len() >= 2 && !first.contains("university") && !first.contains("college") {
        let found = parts.iter().enumerate().skip(1).find(|(_, part)| {
            let lower = part.to_lowercase();
            INSTITUTION_KEYWORDS.iter().any(|k| lower.contains(k))
        });

        if let Some((idx, part)) = found {
            parsed.department = parts[idx - 1].to_string();
            parsed.university = part.to_string();
            parsed.country = if idx + 1 < parts.len() {
                parts[parts.len() - 1].to_string()
            } else {
                String::new()
            };
        }
    }

    parsed
}
