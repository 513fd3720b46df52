use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::record::MovieRecord;

/// Similarity required by [`CompareStrategy::Fuzzy`].
pub const FUZZY_THRESHOLD: f64 = 0.93;

/// Match-quality tiers in the search response, highest confidence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchCategory {
    TitlePopular,
    TitleExact,
    TitleSubstring,
}

impl MatchCategory {
    pub const PRIORITY: [MatchCategory; 3] = [
        MatchCategory::TitlePopular,
        MatchCategory::TitleExact,
        MatchCategory::TitleSubstring,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MatchCategory::TitlePopular => "title_popular",
            MatchCategory::TitleExact => "title_exact",
            MatchCategory::TitleSubstring => "title_substring",
        }
    }
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCandidate")]
pub struct CandidateEntry {
    pub id: String,
    pub title: String,
    /// Free-text blurb; the release year is somewhere inside it.
    pub description: String,
}

/// Wire shape of a candidate. The catalog sends the year blurb as
/// `title_description` and sometimes repeats it as `description`.
#[derive(Deserialize)]
struct RawCandidate {
    #[serde(deserialize_with = "id_from_any")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    title_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<RawCandidate> for CandidateEntry {
    fn from(raw: RawCandidate) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            description: raw
                .title_description
                .filter(|d| !d.is_empty())
                .or(raw.description)
                .unwrap_or_default(),
        }
    }
}

fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "candidate id must be a string or number, got {other}"
        ))),
    }
}

/// Decoded search response: recognized categories and their candidates, in the
/// order the catalog returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResultSet {
    categories: HashMap<MatchCategory, Vec<CandidateEntry>>,
}

impl SearchResultSet {
    /// Decode a raw search payload. Unknown top-level keys are ignored and a
    /// `null` category counts as absent. A recognized key that is not a list
    /// is an error; individual candidates that fail to decode are skipped.
    pub fn from_payload(raw: &str) -> Result<Self, MatchError> {
        let body: HashMap<String, Value> =
            serde_json::from_str(raw).map_err(|e| MatchError::Undecodable(e.to_string()))?;
        let mut categories = HashMap::new();
        for category in MatchCategory::PRIORITY {
            let items = match body.get(category.key()) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(MatchError::Undecodable(format!(
                        "{category}: expected a list, got {other}"
                    )))
                }
            };
            let entries = items
                .iter()
                .filter_map(|item| match CandidateEntry::deserialize(item) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        debug!(%category, error = %e, "skipping malformed candidate");
                        None
                    }
                })
                .collect();
            categories.insert(category, entries);
        }
        Ok(Self { categories })
    }

    pub fn with_category(mut self, category: MatchCategory, entries: Vec<CandidateEntry>) -> Self {
        self.categories.insert(category, entries);
        self
    }

    /// Highest-priority category present in the response, even when it is empty.
    pub fn selected_category(&self) -> Option<(MatchCategory, &[CandidateEntry])> {
        MatchCategory::PRIORITY.into_iter().find_map(|category| {
            self.categories
                .get(&category)
                .map(|entries| (category, entries.as_slice()))
        })
    }
}

/// How candidate titles are compared against the record title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareStrategy {
    #[default]
    Strict,
    IgnoreCase,
    Fuzzy,
}

impl CompareStrategy {
    pub fn titles_match(self, candidate: &str, target: &str) -> bool {
        match self {
            CompareStrategy::Strict => candidate == target,
            CompareStrategy::IgnoreCase => fold(candidate) == fold(target),
            CompareStrategy::Fuzzy => {
                strsim::jaro_winkler(&fold(candidate), &fold(target)) >= FUZZY_THRESHOLD
            }
        }
    }
}

impl FromStr for CompareStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "strict" | "exact" => Ok(CompareStrategy::Strict),
            "ignore_case" | "ignore-case" | "case_insensitive" => Ok(CompareStrategy::IgnoreCase),
            "fuzzy" => Ok(CompareStrategy::Fuzzy),
            other => Err(other.to_string()),
        }
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("search payload undecodable: {0}")]
    Undecodable(String),
    #[error("no recognized category in search results")]
    NoCategory,
    #[error("no candidate in {category} matched title and year")]
    NoCandidate { category: MatchCategory },
}

/// Pick the catalog id for `target`.
///
/// Only the first category present is searched; lower tiers are never
/// consulted, even when the selected one is empty. Within it the first
/// candidate whose title matches and whose description contains the year wins.
pub fn match_movie(
    results: &SearchResultSet,
    target: &MovieRecord,
    compare: CompareStrategy,
) -> Result<String, MatchError> {
    let (category, candidates) = results.selected_category().ok_or(MatchError::NoCategory)?;
    candidates
        .iter()
        .find(|c| {
            compare.titles_match(&c.title, &target.title) && c.description.contains(&target.year)
        })
        .map(|c| c.id.clone())
        .ok_or(MatchError::NoCandidate { category })
}
