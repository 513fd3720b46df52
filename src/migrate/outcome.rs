use serde::{Deserialize, Serialize};

use crate::catalog::MovieRecord;

/// Why a record failed. Serialized the way the checkpoint's error entries
/// read: `{"title_not_found": "..."}` or `{"network_problem": "empty"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordError {
    TitleNotFound(String),
    NetworkProblem(String),
}

impl RecordError {
    pub fn network(detail: impl Into<String>) -> Self {
        RecordError::NetworkProblem(detail.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::TitleNotFound(_) => "title_not_found",
            RecordError::NetworkProblem(_) => "network_problem",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            RecordError::TitleNotFound(d) | RecordError::NetworkProblem(d) => d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Success {
        record: MovieRecord,
    },
    Failure {
        record: MovieRecord,
        errors: RecordError,
    },
}

impl MigrationOutcome {
    pub fn success(record: MovieRecord) -> Self {
        MigrationOutcome::Success { record }
    }

    pub fn failure(record: MovieRecord, errors: RecordError) -> Self {
        MigrationOutcome::Failure { record, errors }
    }

    pub fn record(&self) -> &MovieRecord {
        match self {
            MigrationOutcome::Success { record } | MigrationOutcome::Failure { record, .. } => {
                record
            }
        }
    }

    pub fn error(&self) -> Option<&RecordError> {
        match self {
            MigrationOutcome::Success { .. } => None,
            MigrationOutcome::Failure { errors, .. } => Some(errors),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }
}
