pub mod driver;
pub mod outcome;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{match_movie, CompareStrategy, MatchError, MovieRecord, SearchResultSet};
use crate::config::Mode;
use crate::transport::{extract_auth_token, QueryFormat, Transport, TransportError};

pub use driver::{DriverError, RunDriver, RunSummary};
pub use outcome::{MigrationOutcome, RecordError};

/// Status code every submission response must carry.
pub const SUCCESS_STATUS: i64 = 200;

/// The subset of configuration the per-record pipeline reads.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub mode: Mode,
    pub list_id: Option<String>,
    pub compare: CompareStrategy,
    pub query_format: QueryFormat,
}

/// Replays one record at a time against the target catalog.
pub struct Migrator<T> {
    transport: T,
    options: MigrationOptions,
}

impl<T: Transport> Migrator<T> {
    pub fn new(transport: T, options: MigrationOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Search, match, then submit whatever the mode allows. Never errors:
    /// problems become a `Failure` for this record only.
    pub async fn process_record(&self, record: &MovieRecord) -> MigrationOutcome {
        match self.replay(record).await {
            Ok(()) => MigrationOutcome::success(record.clone()),
            Err(err) => {
                warn!(
                    title = %record.title,
                    year = %record.year,
                    kind = err.kind(),
                    detail = err.detail(),
                    "record failed"
                );
                MigrationOutcome::failure(record.clone(), err)
            }
        }
    }

    async fn replay(&self, record: &MovieRecord) -> Result<(), RecordError> {
        let raw = self
            .transport
            .search(&record.title, &record.year, self.options.query_format)
            .await
            .map_err(transport_failure)?;
        if raw.trim().is_empty() {
            return Err(RecordError::network("empty"));
        }

        let results = SearchResultSet::from_payload(&raw).map_err(not_found)?;
        let id = match_movie(&results, record, self.options.compare).map_err(not_found)?;
        debug!(title = %record.title, id = %id, "matched catalog entry");

        let mut responses = Vec::new();

        if self.options.mode.includes_list() {
            if let Some(list_id) = self.options.list_id.as_deref().filter(|l| !l.is_empty()) {
                let resp = self
                    .transport
                    .add_to_watchlist(&id, list_id)
                    .await
                    .map_err(transport_failure)?;
                responses.push(resp);
            }
        }

        if self.options.mode.includes_rating() {
            if let Some(rating) = record.submittable_rating() {
                let page = self
                    .transport
                    .fetch_entry_page(&id)
                    .await
                    .map_err(transport_failure)?;
                let token = extract_auth_token(&page)
                    .ok_or_else(|| RecordError::network("auth_token_missing"))?;
                let resp = self
                    .transport
                    .submit_rating(&id, rating, &token)
                    .await
                    .map_err(transport_failure)?;
                responses.push(resp);
            } else {
                debug!(title = %record.title, "no valid rating; skipping rating submission");
            }
        }

        validate_responses(&responses).map_err(RecordError::NetworkProblem)
    }
}

fn transport_failure(err: TransportError) -> RecordError {
    RecordError::NetworkProblem(err.detail())
}

fn not_found(err: MatchError) -> RecordError {
    RecordError::TitleNotFound(err.to_string())
}

/// Every response must be a non-empty JSON document whose `status` is 200.
/// Returns the first offending detail.
pub fn validate_responses(responses: &[String]) -> Result<(), String> {
    for body in responses {
        if body.trim().is_empty() {
            return Err("empty".to_string());
        }
        let json: Value = serde_json::from_str(body).map_err(|_| "undecodable".to_string())?;
        let status = json.get("status").ok_or_else(|| "missing_status".to_string())?;
        let code = match status {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if code != Some(SUCCESS_STATUS as f64) {
            return Err(match status {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use crate::catalog::RatingValue;

    fn options(mode: Mode, list: Option<&str>) -> MigrationOptions {
        MigrationOptions {
            mode,
            list_id: list.map(str::to_string),
            ..MigrationOptions::default()
        }
    }

    fn inception(rating: f64) -> MovieRecord {
        MovieRecord::new("Inception", "2010").with_rating(RatingValue::Number(rating))
    }

    #[tokio::test]
    async fn all_mode_submits_list_and_rating() {
        let migrator = Migrator::new(
            ScriptedTransport::found("Inception", "2010", "tt1375666"),
            options(Mode::All, Some("ls001")),
        );
        let out = migrator.process_record(&inception(9.0)).await;
        assert_eq!(out, MigrationOutcome::success(inception(9.0)));
        assert_eq!(
            migrator.transport.calls(),
            vec![
                "search:Inception",
                "watchlist:tt1375666:ls001",
                "page:tt1375666",
                "rating:tt1375666:9:tok-1",
            ]
        );
    }

    #[tokio::test]
    async fn out_of_range_rating_skips_submission_but_keeps_watchlist() {
        let migrator = Migrator::new(
            ScriptedTransport::found("Inception", "2010", "tt1375666"),
            options(Mode::All, Some("ls001")),
        );
        let out = migrator.process_record(&inception(11.0)).await;
        assert!(!out.is_failure());
        assert_eq!(
            migrator.transport.calls(),
            vec!["search:Inception", "watchlist:tt1375666:ls001"]
        );
    }

    #[tokio::test]
    async fn not_found_attempts_no_submission() {
        let mut transport = ScriptedTransport::found("Inception", "2010", "tt1375666");
        transport.search.insert(
            "Inception".into(),
            Ok(r#"{"title_exact":[{"id":"x","title":"Inception","title_description":"1999"}]}"#
                .into()),
        );
        let migrator = Migrator::new(transport, options(Mode::All, Some("ls001")));
        let out = migrator.process_record(&inception(8.0)).await;
        assert_eq!(out.error().map(RecordError::kind), Some("title_not_found"));
        assert_eq!(migrator.transport.calls(), vec!["search:Inception"]);
    }

    #[tokio::test]
    async fn empty_search_payload_is_network_problem() {
        let mut transport = ScriptedTransport::default();
        transport.search.insert("Inception".into(), Ok(String::new()));
        let migrator = Migrator::new(transport, options(Mode::All, None));
        let out = migrator.process_record(&inception(8.0)).await;
        assert_eq!(
            out,
            MigrationOutcome::failure(inception(8.0), RecordError::network("empty"))
        );
    }

    #[tokio::test]
    async fn undecodable_search_payload_is_title_not_found() {
        let mut transport = ScriptedTransport::default();
        transport
            .search
            .insert("Inception".into(), Ok("<html>rate limited</html>".into()));
        let migrator = Migrator::new(transport, options(Mode::All, None));
        let out = migrator.process_record(&inception(8.0)).await;
        let err = out.error().unwrap();
        assert_eq!(err.kind(), "title_not_found");
        assert!(err.detail().contains("undecodable"));
    }

    #[tokio::test]
    async fn one_bad_response_fails_whole_record() {
        let mut transport = ScriptedTransport::found("Inception", "2010", "tt1375666");
        transport.rating = Some(Ok(r#"{"status":403}"#.into()));
        let migrator = Migrator::new(transport, options(Mode::All, Some("ls001")));
        let out = migrator.process_record(&inception(7.0)).await;
        assert_eq!(out.error(), Some(&RecordError::network("403")));
    }

    #[tokio::test]
    async fn http_error_on_watchlist_records_status() {
        let mut transport = ScriptedTransport::found("Inception", "2010", "tt1375666");
        transport.watchlist = Some(Err(502));
        let migrator = Migrator::new(transport, options(Mode::ListOnly, Some("ls001")));
        let out = migrator.process_record(&inception(7.0)).await;
        assert_eq!(out.error(), Some(&RecordError::network("502")));
    }

    #[tokio::test]
    async fn rating_only_ignores_list() {
        let migrator = Migrator::new(
            ScriptedTransport::found("Inception", "2010", "tt1375666"),
            options(Mode::RatingOnly, Some("ls001")),
        );
        assert!(!migrator.process_record(&inception(6.0)).await.is_failure());
        assert!(!migrator
            .transport
            .calls()
            .iter()
            .any(|c| c.starts_with("watchlist")));
    }

    #[tokio::test]
    async fn list_only_without_list_is_a_noop_success() {
        let migrator = Migrator::new(
            ScriptedTransport::found("Inception", "2010", "tt1375666"),
            options(Mode::ListOnly, None),
        );
        assert!(!migrator.process_record(&inception(6.0)).await.is_failure());
        assert_eq!(migrator.transport.calls(), vec!["search:Inception"]);
    }

    #[tokio::test]
    async fn page_without_token_fails_before_submit() {
        let mut transport = ScriptedTransport::found("Inception", "2010", "tt1375666");
        transport.page = Some(Ok("<html></html>".into()));
        let migrator = Migrator::new(transport, options(Mode::RatingOnly, None));
        let out = migrator.process_record(&inception(6.0)).await;
        assert_eq!(out.error(), Some(&RecordError::network("auth_token_missing")));
        assert!(!migrator
            .transport
            .calls()
            .iter()
            .any(|c| c.starts_with("rating")));
    }

    #[test]
    fn response_validation() {
        assert_eq!(validate_responses(&[]), Ok(()));
        assert_eq!(
            validate_responses(&[r#"{"status":200}"#.into(), r#"{"status":"200"}"#.into()]),
            Ok(())
        );
        assert_eq!(
            validate_responses(&[r#"{"status":200.0}"#.into(), r#"{"status":"200.0"}"#.into()]),
            Ok(())
        );
        assert_eq!(
            validate_responses(&[r#"{"status":200.5}"#.into()]),
            Err("200.5".into())
        );
        assert_eq!(validate_responses(&["".into()]), Err("empty".into()));
        assert_eq!(validate_responses(&["nope".into()]), Err("undecodable".into()));
        assert_eq!(
            validate_responses(&[r#"{"ok":true}"#.into()]),
            Err("missing_status".into())
        );
        assert_eq!(
            validate_responses(&[r#"{"status":"forbidden"}"#.into()]),
            Err("forbidden".into())
        );
    }
}
