pub mod imdb;

use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

pub use imdb::ImdbTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("other: {0}")]
    Other(String),
}

impl TransportError {
    /// Short detail recorded against a failed record.
    pub fn detail(&self) -> String {
        match self {
            TransportError::Http { status, .. } => status.to_string(),
            other => other.to_string(),
        }
    }
}

/// How the search query string is assembled from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryFormat {
    Title,
    #[default]
    TitleYear,
}

impl QueryFormat {
    pub fn build(self, title: &str, year: &str) -> String {
        match self {
            QueryFormat::Title => title.to_string(),
            QueryFormat::TitleYear if year.is_empty() => title.to_string(),
            QueryFormat::TitleYear => format!("{title} {year}"),
        }
    }
}

impl FromStr for QueryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(QueryFormat::Title),
            "" | "title_year" | "title-year" => Ok(QueryFormat::TitleYear),
            other => Err(other.to_string()),
        }
    }
}

/// Network side of a migration: search the target catalog and replay actions.
///
/// Every call returns the raw response body; interpreting it is the caller's job.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn search(
        &self,
        title: &str,
        year: &str,
        format: QueryFormat,
    ) -> Result<String, TransportError>;

    async fn add_to_watchlist(&self, id: &str, list_id: &str) -> Result<String, TransportError>;

    async fn fetch_entry_page(&self, id: &str) -> Result<String, TransportError>;

    async fn submit_rating(
        &self,
        id: &str,
        rating: f64,
        auth_token: &str,
    ) -> Result<String, TransportError>;
}

/// First non-empty `data-auth` attribute on an entry page.
pub fn extract_auth_token(html: &str) -> Option<String> {
    let auth_re = Regex::new(r#"data-auth\s*=\s*["']([^"']*)["']"#).ok()?;
    let token = auth_re
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|v| !v.is_empty())
        .map(str::to_string);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_formats() {
        assert_eq!(QueryFormat::Title.build("Heat", "1995"), "Heat");
        assert_eq!(QueryFormat::TitleYear.build("Heat", "1995"), "Heat 1995");
        assert_eq!(QueryFormat::TitleYear.build("Heat", ""), "Heat");
        assert_eq!("title".parse(), Ok(QueryFormat::Title));
        assert!("year_only".parse::<QueryFormat>().is_err());
    }

    #[test]
    fn auth_token_skips_empty_attributes() {
        let html = r#"<div data-auth=""></div><span class="rate" data-auth="BCYx-9Q"></span>"#;
        assert_eq!(extract_auth_token(html).as_deref(), Some("BCYx-9Q"));
        assert_eq!(extract_auth_token("<html></html>"), None);
        assert_eq!(
            extract_auth_token("<b data-auth='  tok-2 '></b>").as_deref(),
            Some("tok-2")
        );
    }

    #[test]
    fn http_detail_is_status() {
        let err = TransportError::Http {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(err.detail(), "503");
    }
}
