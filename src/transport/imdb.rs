use std::time::Duration;

use reqwest::{header, Client, RequestBuilder};
use tracing::debug;

use super::{QueryFormat, Transport, TransportError};

const DEFAULT_BASE_URL: &str = "https://www.imdb.com";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Target catalog client speaking the site's web endpoints.
///
/// Endpoints used:
/// - GET  /xml/find?json=1&nr=1&tt=on&q=... - tiered title search (JSON)
/// - POST /list/_ajax/edit - add a title to a list
/// - GET  /title/{id}/ - entry page carrying the per-user `data-auth` token
/// - POST /ratings/_ajax/title - set the user's rating
///
/// Authentication is the logged-in session cookie, sent verbatim.
#[derive(Debug, Clone)]
pub struct ImdbTransport {
    base_url: String,
    http: Client,
    auth_cookie: Option<String>,
}

impl ImdbTransport {
    pub fn new(base_url: Option<&str>, timeout_secs: Option<u64>) -> Result<Self, TransportError> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .user_agent("rating-porter/0.1")
            .timeout(Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .build()?;
        Ok(Self {
            base_url,
            http,
            auth_cookie: None,
        })
    }

    pub fn with_auth_cookie(mut self, cookie: Option<String>) -> Self {
        self.auth_cookie = cookie.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn add_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match self.auth_cookie.as_deref() {
            Some(cookie) => req.header(header::COOKIE, cookie),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<String, TransportError> {
        let resp = self.add_auth(req).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate_for_log(body, 500),
            });
        }
        debug!(call = what, bytes = body.len(), "catalog response");
        Ok(body)
    }
}

/// Ratings go out as whole numbers when they are whole.
fn format_rating(rating: f64) -> String {
    if rating.fract() == 0.0 {
        format!("{rating:.0}")
    } else {
        rating.to_string()
    }
}

#[async_trait::async_trait]
impl Transport for ImdbTransport {
    async fn search(
        &self,
        title: &str,
        year: &str,
        format: QueryFormat,
    ) -> Result<String, TransportError> {
        let url = format!("{}/xml/find", self.base_url);
        let q = format.build(title, year);
        let req = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(&[("json", "1"), ("nr", "1"), ("tt", "on"), ("q", q.as_str())]);
        self.send(req, "search").await
    }

    async fn add_to_watchlist(&self, id: &str, list_id: &str) -> Result<String, TransportError> {
        let url = format!("{}/list/_ajax/edit", self.base_url);
        let req = self.http.post(&url).form(&[
            ("const", id),
            ("list_id", list_id),
            ("ref_tag", "title"),
        ]);
        self.send(req, "add_to_watchlist").await
    }

    async fn fetch_entry_page(&self, id: &str) -> Result<String, TransportError> {
        let url = format!("{}/title/{}/", self.base_url, urlencoding::encode(id));
        let req = self.http.get(&url).header(header::ACCEPT, "text/html");
        self.send(req, "fetch_entry_page").await
    }

    async fn submit_rating(
        &self,
        id: &str,
        rating: f64,
        auth_token: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{}/ratings/_ajax/title", self.base_url);
        let rating = format_rating(rating);
        let req = self.http.post(&url).form(&[
            ("tconst", id),
            ("rating", rating.as_str()),
            ("auth", auth_token),
            ("tracking_tag", "title-maindetails"),
        ]);
        self.send(req, "submit_rating").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_initialization() {
        let transport = ImdbTransport::new(None, Some(5)).unwrap();
        assert!(transport.base_url().contains("imdb"));

        let custom = ImdbTransport::new(Some("http://localhost:8080/"), None)
            .unwrap()
            .with_auth_cookie(Some("   ".into()));
        assert_eq!(custom.base_url(), "http://localhost:8080");
        assert!(custom.auth_cookie.is_none());
    }

    #[test]
    fn ratings_are_sent_as_integers_when_whole() {
        assert_eq!(format_rating(8.0), "8");
        assert_eq!(format_rating(7.5), "7.5");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let out = truncate_for_log("абвгд".to_string(), 3);
        assert_eq!(out, "а…");
    }
}
