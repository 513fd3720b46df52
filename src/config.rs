//! Run configuration: environment first (via `.env`), CLI flags override.
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::CompareStrategy;
use crate::migrate::MigrationOptions;
use crate::transport::QueryFormat;
use crate::util::env::{env_opt, env_parse};

pub const MODE_ENV: &str = "PORTER_MODE";
pub const LIST_ENV: &str = "PORTER_LIST_ID";
pub const COMPARE_ENV: &str = "PORTER_COMPARE";
pub const QUERY_FORMAT_ENV: &str = "PORTER_QUERY_FORMAT";
pub const TIME_LIMIT_ENV: &str = "PORTER_TIME_LIMIT_SECS";
pub const REQUEST_DELAY_ENV: &str = "PORTER_REQUEST_DELAY_MS";
pub const AUTH_COOKIE_ENV: &str = "IMDB_AUTH_COOKIE";
pub const BASE_URL_ENV: &str = "IMDB_BASE_URL";
pub const TIMEOUT_ENV: &str = "IMDB_TIMEOUT_SECS";

/// Which actions get replayed for each matched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    All,
    ListOnly,
    RatingOnly,
}

impl Mode {
    pub fn includes_list(self) -> bool {
        matches!(self, Mode::All | Mode::ListOnly)
    }

    pub fn includes_rating(self) -> bool {
        matches!(self, Mode::All | Mode::RatingOnly)
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => Ok(Mode::All),
            "list_only" | "list" => Ok(Mode::ListOnly),
            "rating_only" | "rating" => Ok(Mode::RatingOnly),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown mode '{0}' (expected all, list_only or rating_only)")]
    UnknownMode(String),
    #[error("unknown query format '{0}' (expected title or title_year)")]
    UnknownQueryFormat(String),
    #[error("unknown compare strategy '{0}' (expected strict, ignore_case or fuzzy)")]
    UnknownCompare(String),
    #[error("missing IMDB_AUTH_COOKIE; the catalog rejects anonymous submissions")]
    MissingAuth,
}

/// Raw values before validation; `None` means "not given here".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub mode: Option<String>,
    pub list_id: Option<String>,
    pub compare: Option<String>,
    pub query_format: Option<String>,
    pub time_limit_secs: Option<u64>,
    pub request_delay_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        Self {
            mode: env_opt(MODE_ENV),
            list_id: env_opt(LIST_ENV),
            compare: env_opt(COMPARE_ENV),
            query_format: env_opt(QUERY_FORMAT_ENV),
            time_limit_secs: Some(env_parse(TIME_LIMIT_ENV, 0u64)),
            request_delay_ms: Some(env_parse(REQUEST_DELAY_ENV, 0u64)),
        }
    }

    /// Values set in `self` win over `base`.
    pub fn over(self, base: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.or(base.mode),
            list_id: self.list_id.or(base.list_id),
            compare: self.compare.or(base.compare),
            query_format: self.query_format.or(base.query_format),
            time_limit_secs: self.time_limit_secs.or(base.time_limit_secs),
            request_delay_ms: self.request_delay_ms.or(base.request_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub options: MigrationOptions,
    /// Whole-run budget; `None` means unbounded.
    pub time_limit: Option<Duration>,
    pub request_delay: Duration,
}

impl TryFrom<ConfigOverrides> for MigrationConfig {
    type Error = ConfigError;

    fn try_from(raw: ConfigOverrides) -> Result<Self, Self::Error> {
        let mode = match raw.mode.as_deref() {
            Some(m) => m.parse()?,
            None => Mode::default(),
        };
        let compare = match raw.compare.as_deref() {
            Some(c) => c.parse().map_err(ConfigError::UnknownCompare)?,
            None => CompareStrategy::default(),
        };
        let query_format = match raw.query_format.as_deref() {
            Some(q) => q.parse().map_err(ConfigError::UnknownQueryFormat)?,
            None => QueryFormat::default(),
        };
        Ok(Self {
            options: MigrationOptions {
                mode,
                list_id: raw.list_id.filter(|l| !l.trim().is_empty()),
                compare,
                query_format,
            },
            time_limit: raw
                .time_limit_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            request_delay: Duration::from_millis(raw.request_delay_ms.unwrap_or(0)),
        })
    }
}

/// Session cookie for the target catalog, required before any submission.
pub fn auth_cookie() -> Result<String, ConfigError> {
    env_opt(AUTH_COOKIE_ENV).ok_or(ConfigError::MissingAuth)
}
