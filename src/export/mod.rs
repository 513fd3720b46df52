//! Work-queue builder: turns the source catalog's export into an ordered,
//! deduplicated list of records and seeds a fresh checkpoint with it.
pub mod table;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{MovieRecord, RatingValue};
use crate::checkpoint::{checkpoint_path_for, CheckpointDocument, CheckpointError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("regex: {0}")]
    Regex(#[from] regex::Error),
    #[error(
        "no header row with title and year columns; exports saved as Windows-1251 \
         (Kinopoisk .xls) must be re-saved as UTF-8 first"
    )]
    MissingColumns,
    #[error("export contains no records")]
    Empty,
    #[error("writing fresh checkpoint: {0}")]
    Checkpoint(String),
}

impl From<CheckpointError> for ExportError {
    fn from(e: CheckpointError) -> Self {
        ExportError::Checkpoint(e.to_string())
    }
}

/// Produces the checkpoint a run starts from. Returns the checkpoint path.
pub trait WorkQueueBuilder {
    fn build(&self, source: &Path) -> Result<PathBuf, ExportError>;
}

const ORIGINAL_TITLE_ALIASES: &[&str] = &["оригинальное название", "original title", "original_title"];
const LOCAL_TITLE_ALIASES: &[&str] = &["русскоязычное название", "название", "title", "name"];
const YEAR_ALIASES: &[&str] = &["год", "year", "release year"];
const RATING_ALIASES: &[&str] = &["моя оценка", "my rating", "rating", "your rating"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    original_title: Option<usize>,
    local_title: Option<usize>,
    year: usize,
    rating: Option<usize>,
}

fn find_column(header: &[String], aliases: &[&str]) -> Option<usize> {
    header.iter().position(|cell| {
        let cell = cell.to_lowercase();
        aliases.iter().any(|a| cell == *a)
    })
}

impl Columns {
    fn detect(header: &[String]) -> Option<Self> {
        let original_title = find_column(header, ORIGINAL_TITLE_ALIASES);
        let local_title = find_column(header, LOCAL_TITLE_ALIASES);
        let year = find_column(header, YEAR_ALIASES)?;
        if original_title.is_none() && local_title.is_none() {
            return None;
        }
        Some(Self {
            original_title,
            local_title,
            year,
            rating: find_column(header, RATING_ALIASES),
        })
    }

    fn record(&self, row: &[String]) -> Option<MovieRecord> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };
        let title = cell(self.original_title).or_else(|| cell(self.local_title))?;
        let year = cell(Some(self.year))?;
        let mut record = MovieRecord::new(title, year);
        if let Some(raw) = cell(self.rating) {
            record = record.with_rating(match raw.parse::<f64>() {
                Ok(n) => RatingValue::Number(n),
                Err(_) => RatingValue::Text(raw.to_string()),
            });
        }
        Some(record)
    }
}

/// Reads a source export into records.
#[derive(Debug, Clone, Default)]
pub struct ExportParser;

impl ExportParser {
    pub fn parse_file(&self, path: &Path) -> Result<Vec<MovieRecord>, ExportError> {
        let bytes = fs::read(path)?;
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        let rows = if is_csv {
            table::csv_rows(&bytes)?
        } else {
            if std::str::from_utf8(&bytes).is_err() {
                warn!(source = %path.display(), "export is not valid UTF-8; decoding lossily");
            }
            table::html_rows(&String::from_utf8_lossy(&bytes))?
        };
        self.records_from_rows(&rows)
    }

    /// Header is the first row naming a title and a year column. Blank rows
    /// are skipped; later duplicates of `(title, year)` are dropped.
    pub fn records_from_rows(&self, rows: &[Vec<String>]) -> Result<Vec<MovieRecord>, ExportError> {
        let (header_idx, columns) = rows
            .iter()
            .enumerate()
            .find_map(|(i, row)| Columns::detect(row).map(|c| (i, c)))
            .ok_or(ExportError::MissingColumns)?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for row in &rows[header_idx + 1..] {
            let Some(record) = columns.record(row) else {
                continue;
            };
            let key = (record.title.clone(), record.year.clone());
            if !seen.insert(key) {
                debug!(title = %record.title, year = %record.year, "duplicate export row dropped");
                continue;
            }
            records.push(record);
        }
        if records.is_empty() {
            return Err(ExportError::Empty);
        }
        Ok(records)
    }
}

/// Parses the export and writes a fresh checkpoint beside it.
#[derive(Debug, Clone, Default)]
pub struct ExportWorkQueueBuilder {
    parser: ExportParser,
}

impl WorkQueueBuilder for ExportWorkQueueBuilder {
    fn build(&self, source: &Path) -> Result<PathBuf, ExportError> {
        let filesize = fs::metadata(source)?.len();
        let records = self.parser.parse_file(source)?;
        let path = checkpoint_path_for(source);
        CheckpointDocument::fresh(records, filesize).write_to(&path)?;
        info!(source = %source.display(), checkpoint = %path.display(), "fresh checkpoint written");
        Ok(path)
    }
}
