//! Spreadsheet export of flushed batches.
//!
//! Each batch becomes one CSV file with one row per author of each paper and a
//! blank row after every paper. Files start with a UTF-8 byte-order mark so
//! spreadsheet applications pick the right encoding.
//!
//! At the end of a run [`consolidate`] rebuilds one merged file per keyword
//! from the batch files on disk, so the merge also covers earlier resumed runs.

use crate::crawl::{Batch, BatchSink};
use crate::error::{HarvestError, Result};
use crate::paper::PaperRecord;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

lazy_static! {
    static ref BATCH_FILE: Regex =
        Regex::new(r"^scopus_(.+)_pages_(\d+)-(\d+)\.csv$").expect("batch file pattern is valid");
}

/// One spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Paper No.")]
    pub paper_number: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Affiliation (raw)")]
    pub raw_affiliation: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "University")]
    pub university: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Detected Sentences")]
    pub detected_sentences: String,
    #[serde(rename = "Link")]
    pub link: String,
}

impl ExportRow {
    pub fn is_blank(&self) -> bool {
        *self == ExportRow::default()
    }
}

/// Rows for one paper followed by the blank separator row.
///
/// Paper number, detected sentences and link only appear on the first row.
pub fn paper_rows(paper: &PaperRecord) -> Vec<ExportRow> {
    let mut rows: Vec<ExportRow> = paper
        .authors
        .iter()
        .map(|author| {
            let (department, university, country) = author.parsed_columns();
            ExportRow {
                author: author.name.clone(),
                email: author.email.clone(),
                raw_affiliation: author.raw_affiliations(),
                department,
                university,
                country,
                ..Default::default()
            }
        })
        .collect();

    if rows.is_empty() {
        rows.push(ExportRow::default());
    }

    rows[0].paper_number = paper.number.to_string();
    rows[0].detected_sentences = paper.detected_sentences.clone();
    rows[0].link = paper.link.clone();

    rows.push(ExportRow::default());
    rows
}

pub fn batch_rows(papers: &[PaperRecord]) -> Vec<ExportRow> {
    papers.iter().flat_map(paper_rows).collect()
}

/// Keyword reduced to characters safe in a file name, spaces as underscores.
pub fn safe_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}

pub fn batch_file_name(keyword: &str, start_page: u32, end_page: u32) -> String {
    format!(
        "scopus_{}_pages_{}-{}.csv",
        safe_keyword(keyword),
        start_page,
        end_page
    )
}

/// Write rows with the BOM and a header line.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;

    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(file);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes every batch to `<output_dir>/scopus_<keyword>_pages_<start>-<end>.csv`.
///
/// Writing the same batch again overwrites its file.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvExporter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        std::fs::create_dir_all(output_dir.as_ref())?;
        Ok(Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            written: Vec::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Files written by this exporter, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl BatchSink for CsvExporter {
    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let path = self
            .output_dir
            .join(batch_file_name(&batch.keyword, batch.start_page, batch.end_page));
        let rows = batch_rows(&batch.papers);

        write_rows(&path, &rows)?;

        info!(
            path = %path.display(),
            papers = batch.papers.len(),
            rows = rows.len(),
            pages = %format!("{}-{}", batch.start_page, batch.end_page),
            "Batch saved"
        );
        self.written.push(path);
        Ok(())
    }
}

/// Read rows written by [`write_rows`], with or without the BOM.
pub fn read_rows(path: &Path) -> Result<Vec<ExportRow>> {
    let bytes = std::fs::read(path)?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);

    let mut rdr = csv::Reader::from_reader(body);
    let mut rows = Vec::new();
    for row in rdr.deserialize::<ExportRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn merged_file_name(keyword: &str) -> String {
    format!("scopus_{}_merged.csv", safe_keyword(keyword))
}

/// Group rows back into papers. A paper starts at a row carrying a paper
/// number and ends at the blank separator row.
fn group_papers(rows: Vec<ExportRow>) -> Vec<Vec<ExportRow>> {
    let mut papers = Vec::new();
    let mut current: Vec<ExportRow> = Vec::new();

    for row in rows {
        if row.is_blank() {
            if !current.is_empty() {
                papers.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !row.paper_number.is_empty() && !current.is_empty() {
            papers.push(std::mem::take(&mut current));
        }
        current.push(row);
    }
    if !current.is_empty() {
        papers.push(current);
    }
    papers
}

/// Merge the batch files in `output_dir` into one `scopus_<keyword>_merged.csv`
/// per keyword.
///
/// Batches are read in page order, papers already seen under the same link are
/// dropped, and retained papers are renumbered from 1 within each keyword.
/// Skipped papers keep their `skipped` marker. Returns the merged files in
/// keyword-name order.
pub fn consolidate(output_dir: &Path) -> Result<Vec<PathBuf>> {
    if !output_dir.is_dir() {
        return Err(HarvestError::NotFound(format!("output directory {}", output_dir.display())));
    }

    let mut batches: BTreeMap<String, Vec<(u32, u32, PathBuf)>> = BTreeMap::new();
    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = BATCH_FILE.captures(name) else {
            continue;
        };
        let (Ok(start), Ok(end)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
            continue;
        };
        batches
            .entry(caps[1].to_string())
            .or_default()
            .push((start, end, path.clone()));
    }

    let mut written = Vec::new();
    for (keyword, mut files) in batches {
        files.sort();

        let mut seen = HashSet::new();
        let mut duplicates = 0;
        let mut papers = Vec::new();
        for (_, _, path) in &files {
            for paper in group_papers(read_rows(path)?) {
                let link = paper[0].link.clone();
                if !link.is_empty() && !seen.insert(link) {
                    duplicates += 1;
                    continue;
                }
                papers.push(paper);
            }
        }
        if duplicates > 0 {
            warn!(keyword = %keyword, duplicates, "Dropped papers present in several batches");
        }

        let mut number = 0u64;
        let mut rows = Vec::new();
        for mut paper in papers {
            if paper[0].paper_number.parse::<u64>().is_ok() {
                number += 1;
                paper[0].paper_number = number.to_string();
            }
            rows.extend(paper);
            rows.push(ExportRow::default());
        }

        let path = output_dir.join(merged_file_name(&keyword));
        write_rows(&path, &rows)?;
        info!(path = %path.display(), batches = files.len(), papers = number, "Keyword merged");
        written.push(path);
    }

    Ok(written)
}

/// Row of a split part: the columns kept for manual annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationRow {
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Affiliation (raw)")]
    pub raw_affiliation: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "University")]
    pub university: String,
}

/// Split an exported CSV into parts of `rows_per_file` rows.
///
/// Parts keep the author and raw affiliation columns, carry empty department and
/// university columns to be filled in by hand, and keep blank separator rows.
/// Returns the written paths (`<stem>_part_001.csv`, ...).
pub fn split_export(input: &Path, rows_per_file: usize, output_dir: &Path) -> Result<Vec<PathBuf>> {
    if rows_per_file == 0 {
        return Err(HarvestError::Config("rows per file must be at least 1".to_string()));
    }
    if !input.exists() {
        return Err(HarvestError::NotFound(format!("{}", input.display())));
    }

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(input)?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .ok_or_else(|| HarvestError::MalformedInput(format!("{} has no '{}' column", input.display(), name)))
    };
    let author_col = column("Author")?;
    let affiliation_col = column("Affiliation (raw)")?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(AnnotationRow {
            author: record.get(author_col).unwrap_or_default().to_string(),
            raw_affiliation: record.get(affiliation_col).unwrap_or_default().to_string(),
            ..Default::default()
        });
    }

    std::fs::create_dir_all(output_dir)?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());

    let mut written = Vec::new();
    for (idx, chunk) in rows.chunks(rows_per_file).enumerate() {
        let path = output_dir.join(format!("{}_part_{:03}.csv", stem, idx + 1));
        write_rows(&path, chunk)?;

        let blank = chunk
            .iter()
            .filter(|r| r.author.trim().is_empty() && r.raw_affiliation.trim().is_empty())
            .count();
        debug!(path = %path.display(), rows = chunk.len(), blank, "Part written");
        written.push(path);
    }

    info!(input = %input.display(), parts = written.len(), rows = rows.len(), "Split complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affiliation::{AffiliationEntry, AuthorRecord};
    use crate::paper::PaperNumber;
    use crate::relevance::SKIPPED_SENTINEL;
    use tempfile::TempDir;

    fn author(name: &str, email: &str, affiliations: Vec<AffiliationEntry>) -> AuthorRecord {
        AuthorRecord {
            name: name.to_string(),
            markers: affiliations.iter().filter_map(|a| a.marker.clone()).collect(),
            email: email.to_string(),
            affiliations,
        }
    }

    fn sample_papers() -> Vec<PaperRecord> {
        vec![
            PaperRecord {
                link: "https://scopus.test/1".to_string(),
                authors: vec![
                    author(
                        "Kim J.",
                        "kim@kaist.ac.kr",
                        vec![AffiliationEntry::new(Some("a"), "School of EE, KAIST, South Korea")],
                    ),
                    author("Lee S.", "", vec![]),
                ],
                detected_sentences: "Title: LLM agents".to_string(),
                number: PaperNumber::Assigned(12),
            },
            PaperRecord {
                link: "https://scopus.test/2".to_string(),
                authors: vec![],
                detected_sentences: SKIPPED_SENTINEL.to_string(),
                number: PaperNumber::Skipped,
            },
        ]
    }

    #[test]
    fn test_batch_rows_layout() {
        let rows = batch_rows(&sample_papers());
        assert_eq!(rows.len(), 5);

        assert_eq!(rows[0].paper_number, "12");
        assert_eq!(rows[0].author, "Kim J.");
        assert_eq!(rows[0].raw_affiliation, "[a] School of EE, KAIST, South Korea");
        assert_eq!(rows[0].department, "School of EE");
        assert_eq!(rows[0].university, "KAIST");
        assert_eq!(rows[0].country, "South Korea");
        assert_eq!(rows[0].link, "https://scopus.test/1");

        assert_eq!(rows[1].author, "Lee S.");
        assert!(rows[1].paper_number.is_empty());
        assert!(rows[1].link.is_empty());
        assert!(rows[2].is_blank());

        assert_eq!(rows[3].paper_number, "skipped");
        assert_eq!(rows[3].detected_sentences, SKIPPED_SENTINEL);
        assert!(rows[4].is_blank());
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(
            batch_file_name("LLM OR large language model", 1, 5),
            "scopus_LLM_OR_large_language_model_pages_1-5.csv"
        );
        assert_eq!(safe_keyword(" \"embodied AI\" (IoT) "), "embodied_AI_IoT");
    }

    #[test]
    fn test_exporter_writes_bom_and_rows() -> Result<()> {
        let dir = TempDir::new()?;
        let mut exporter = CsvExporter::new(dir.path().join("out"))?;

        let batch = Batch {
            keyword: "LLM AND IoT".to_string(),
            keyword_index: 2,
            start_page: 6,
            end_page: 10,
            papers: sample_papers(),
        };
        exporter.write_batch(&batch)?;

        let path = dir.path().join("out").join("scopus_LLM_AND_IoT_pages_6-10.csv");
        assert_eq!(exporter.written(), &[path.clone()]);

        let bytes = std::fs::read(&path)?;
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8_lossy(&bytes[UTF8_BOM.len()..]).into_owned();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Paper No.,Author,Email,Affiliation (raw),Department,University,Country,Detected Sentences,Link")
        );
        assert_eq!(text.lines().count(), 6);
        Ok(())
    }

    fn write_batch(exporter: &mut CsvExporter, keyword: &str, pages: (u32, u32), papers: Vec<PaperRecord>) -> Result<()> {
        exporter.write_batch(&Batch {
            keyword: keyword.to_string(),
            keyword_index: 0,
            start_page: pages.0,
            end_page: pages.1,
            papers,
        })
    }

    #[test]
    fn test_consolidate_per_keyword() -> Result<()> {
        let dir = TempDir::new()?;
        let mut exporter = CsvExporter::new(dir.path())?;

        let mut later = sample_papers();
        later[0].link = "https://scopus.test/3".to_string();
        later[0].number = PaperNumber::Assigned(40);

        // written out of page order, plus a batch repeating an earlier paper
        write_batch(&mut exporter, "LLM AND IoT", (6, 10), later)?;
        write_batch(&mut exporter, "LLM AND IoT", (1, 5), sample_papers())?;
        write_batch(&mut exporter, "LLM AND IoT", (11, 11), sample_papers()[..1].to_vec())?;
        write_batch(&mut exporter, "LLM embodied", (1, 5), sample_papers()[..1].to_vec())?;

        let merged = consolidate(dir.path())?;
        assert_eq!(
            merged,
            vec![
                dir.path().join("scopus_LLM_AND_IoT_merged.csv"),
                dir.path().join("scopus_LLM_embodied_merged.csv"),
            ]
        );

        let rows = read_rows(&merged[0])?;
        let firsts: Vec<(&str, &str)> = rows
            .iter()
            .filter(|r| !r.paper_number.is_empty())
            .map(|r| (r.paper_number.as_str(), r.link.as_str()))
            .collect();
        assert_eq!(
            firsts,
            vec![
                ("1", "https://scopus.test/1"),
                ("skipped", "https://scopus.test/2"),
                ("2", "https://scopus.test/3"),
            ]
        );
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[1].author, "Lee S.");
        assert!(rows[2].is_blank());

        let rows = read_rows(&merged[1])?;
        assert_eq!(rows[0].paper_number, "1");
        assert_eq!(rows.len(), 3);

        // merged files are not picked up as batches on a second merge
        assert_eq!(consolidate(dir.path())?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_consolidate_missing_dir() {
        assert!(matches!(
            consolidate(Path::new("/nonexistent/output")),
            Err(HarvestError::NotFound(_))
        ));
    }

    #[test]
    fn test_split_export_keeps_blank_rows() -> Result<()> {
        let dir = TempDir::new()?;
        let input = dir.path().join("scopus_batch.csv");
        write_rows(&input, &batch_rows(&sample_papers()))?;

        let parts = split_export(&input, 2, &dir.path().join("parts"))?;
        assert_eq!(parts.len(), 3);
        assert!(parts[0].ends_with("scopus_batch_part_001.csv"));

        let mut rdr = csv::Reader::from_path(&parts[1])?;
        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        assert_eq!(headers, vec!["Author", "Affiliation (raw)", "Department", "University"]);

        let records: Vec<csv::StringRecord> = rdr.records().collect::<std::result::Result<_, _>>()?;
        assert_eq!(records.len(), 2);
        // blank separator after the first paper, then the skipped paper's row
        assert!(records[0].iter().all(str::is_empty));
        assert_eq!(records[1].get(0), Some(""));
        Ok(())
    }

    #[test]
    fn test_split_export_errors() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(matches!(
            split_export(&dir.path().join("missing.csv"), 10, dir.path()),
            Err(HarvestError::NotFound(_))
        ));

        let input = dir.path().join("other.csv");
        std::fs::write(&input, "a,b\n1,2\n")?;
        assert!(matches!(
            split_export(&input, 10, dir.path()),
            Err(HarvestError::MalformedInput(_))
        ));
        assert!(matches!(split_export(&input, 0, dir.path()), Err(HarvestError::Config(_))));
        Ok(())
    }
}
