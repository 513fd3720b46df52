//! Checkpoint store: the cached work queue plus accumulated outcomes, keyed to
//! the byte size of the export it was built from.
//!
//! The checkpoint lives next to the source export with the same stem and a
//! `.json` extension. It is read once when a run starts and written once when
//! the run driver tears down.
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::MovieRecord;
use crate::export::{ExportError, WorkQueueBuilder};
use crate::migrate::MigrationOutcome;

pub const CHECKPOINT_EXT: &str = "json";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("source file does not exist: {0}")]
    MissingSourceFile(PathBuf),
    #[error("io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checkpoint json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("building work queue: {0}")]
    Export(#[from] ExportError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "with errors")]
    WithErrors,
    #[serde(rename = "in-progress")]
    InProgress,
}

impl RunStatus {
    /// `Completed` iff no outcome is a failure.
    pub fn from_outcomes(outcomes: &[MigrationOutcome]) -> Self {
        if outcomes.iter().any(MigrationOutcome::is_failure) {
            RunStatus::WithErrors
        } else {
            RunStatus::Completed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    pub status: RunStatus,
    /// Byte size of the source export when the queue was built.
    pub filesize: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// On-disk layout of a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDocument {
    pub queue: VecDeque<MovieRecord>,
    #[serde(default)]
    pub outcomes: Vec<MigrationOutcome>,
    pub settings: CheckpointSettings,
}

impl CheckpointDocument {
    /// A freshly built queue with nothing processed yet.
    pub fn fresh(queue: Vec<MovieRecord>, filesize: u64) -> Self {
        Self {
            queue: queue.into(),
            outcomes: Vec::new(),
            settings: CheckpointSettings {
                status: RunStatus::InProgress,
                filesize,
                updated_at: Some(Utc::now()),
            },
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), CheckpointError> {
        let body = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension(format!("{CHECKPOINT_EXT}.tmp"));
        fs::write(&tmp, body).map_err(io_err(&tmp))?;
        fs::rename(&tmp, path).map_err(io_err(path))
    }

    pub fn read_from(path: &Path) -> Result<Option<Self>, CheckpointError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path)(e)),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &MigrationOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

/// Mutable state of one run. `queue` holds only records not yet processed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub queue: VecDeque<MovieRecord>,
    pub outcomes: Vec<MigrationOutcome>,
    pub status: RunStatus,
    pub source_fingerprint: u64,
}

impl From<CheckpointDocument> for RunState {
    fn from(doc: CheckpointDocument) -> Self {
        Self {
            queue: doc.queue,
            outcomes: doc.outcomes,
            status: doc.settings.status,
            source_fingerprint: doc.settings.filesize,
        }
    }
}

impl RunState {
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    fn to_document(&self, status: RunStatus) -> CheckpointDocument {
        CheckpointDocument {
            queue: self.queue.clone(),
            outcomes: self.outcomes.clone(),
            settings: CheckpointSettings {
                status,
                filesize: self.source_fingerprint,
                updated_at: Some(Utc::now()),
            },
        }
    }
}

/// Derive the checkpoint path for an export: same directory and stem,
/// `.json` extension. A source that is itself `.json` gets `.checkpoint.json`.
pub fn checkpoint_path_for(source: &Path) -> PathBuf {
    let candidate = source.with_extension(CHECKPOINT_EXT);
    if candidate == source {
        source.with_extension(format!("checkpoint.{CHECKPOINT_EXT}"))
    } else {
        candidate
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    source: PathBuf,
    checkpoint: PathBuf,
}

impl CheckpointStore {
    /// Fails with `MissingSourceFile` before anything else happens.
    pub fn open(source: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let source = source.into();
        if !source.is_file() {
            return Err(CheckpointError::MissingSourceFile(source));
        }
        let checkpoint = checkpoint_path_for(&source);
        Ok(Self { source, checkpoint })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint
    }

    fn source_size(&self) -> Result<u64, CheckpointError> {
        if !self.source.is_file() {
            return Err(CheckpointError::MissingSourceFile(self.source.clone()));
        }
        Ok(fs::metadata(&self.source)
            .map_err(io_err(&self.source))?
            .len())
    }

    /// Reuse the existing checkpoint when its fingerprint matches the export's
    /// current size; otherwise have `builder` regenerate it.
    pub fn resolve_work_queue<B>(&mut self, builder: &B) -> Result<RunState, CheckpointError>
    where
        B: WorkQueueBuilder + ?Sized,
    {
        let size = self.source_size()?;
        match CheckpointDocument::read_from(&self.checkpoint) {
            Ok(Some(doc)) if doc.settings.filesize == size => {
                info!(
                    checkpoint = %self.checkpoint.display(),
                    pending = doc.queue.len(),
                    done = doc.outcomes.len(),
                    "resuming from checkpoint"
                );
                return Ok(doc.into());
            }
            Ok(Some(doc)) => info!(
                checkpoint = %self.checkpoint.display(),
                recorded = doc.settings.filesize,
                current = size,
                "source changed since checkpoint; rebuilding work queue"
            ),
            Ok(None) => info!(source = %self.source.display(), "no checkpoint; building work queue"),
            Err(e) => warn!(
                checkpoint = %self.checkpoint.display(),
                error = %e,
                "unreadable checkpoint; rebuilding work queue"
            ),
        }

        let generated = builder.build(&self.source)?;
        let doc = CheckpointDocument::read_from(&generated)?.ok_or_else(|| CheckpointError::Io {
            path: generated.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "builder produced no checkpoint"),
        })?;
        self.checkpoint = generated;
        info!(records = doc.queue.len(), "work queue built");
        Ok(doc.into())
    }

    /// Stamp the final status over all accumulated outcomes and persist.
    pub fn finalize(&self, state: &RunState) -> Result<RunStatus, CheckpointError> {
        let status = RunStatus::from_outcomes(&state.outcomes);
        state.to_document(status).write_to(&self.checkpoint)?;
        info!(
            checkpoint = %self.checkpoint.display(),
            status = ?status,
            pending = state.pending(),
            outcomes = state.outcomes.len(),
            failures = state.failure_count(),
            "checkpoint written"
        );
        Ok(status)
    }

    /// Current checkpoint contents, without any rebuild.
    pub fn inspect(&self) -> Result<Option<CheckpointDocument>, CheckpointError> {
        CheckpointDocument::read_from(&self.checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::migrate::RecordError;

    struct CountingBuilder {
        records: Vec<MovieRecord>,
        calls: Cell<usize>,
    }

    impl CountingBuilder {
        fn new(records: Vec<MovieRecord>) -> Self {
            Self {
                records,
                calls: Cell::new(0),
            }
        }
    }

    impl WorkQueueBuilder for CountingBuilder {
        fn build(&self, source: &Path) -> Result<PathBuf, ExportError> {
            self.calls.set(self.calls.get() + 1);
            let size = fs::metadata(source)?.len();
            let path = checkpoint_path_for(source);
            CheckpointDocument::fresh(self.records.clone(), size).write_to(&path)?;
            Ok(path)
        }
    }

    fn records() -> Vec<MovieRecord> {
        vec![
            MovieRecord::new("Inception", "2010"),
            MovieRecord::new("Heat", "1995"),
        ]
    }

    #[test]
    fn missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CheckpointStore::open(dir.path().join("ratings.xls")).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingSourceFile(_)));
    }

    #[test]
    fn checkpoint_path_is_sibling() {
        assert_eq!(
            checkpoint_path_for(Path::new("/data/kinopoisk.xls")),
            PathBuf::from("/data/kinopoisk.json")
        );
        assert_eq!(
            checkpoint_path_for(Path::new("/data/export.json")),
            PathBuf::from("/data/export.checkpoint.json")
        );
    }

    #[test]
    fn unchanged_source_reuses_existing_queue() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ratings.xls");
        fs::write(&source, "<table></table>").unwrap();
        let builder = CountingBuilder::new(records());

        let mut store = CheckpointStore::open(&source).unwrap();
        let mut state = store.resolve_work_queue(&builder).unwrap();
        assert_eq!(builder.calls.get(), 1);
        assert_eq!(state.status, RunStatus::InProgress);
        assert_eq!(state.pending(), 2);

        // consume one record and persist
        let done = state.queue.pop_front().unwrap();
        state.outcomes.push(MigrationOutcome::success(done));
        store.finalize(&state).unwrap();

        let mut again = CheckpointStore::open(&source).unwrap();
        let resumed = again.resolve_work_queue(&builder).unwrap();
        assert_eq!(builder.calls.get(), 1);
        assert_eq!(resumed.queue, state.queue);
        assert_eq!(resumed.outcomes, state.outcomes);
        assert_eq!(resumed.status, RunStatus::Completed);
    }

    #[test]
    fn resized_source_rebuilds_queue() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ratings.xls");
        fs::write(&source, "<table></table>").unwrap();
        let builder = CountingBuilder::new(records());

        let mut store = CheckpointStore::open(&source).unwrap();
        let mut state = store.resolve_work_queue(&builder).unwrap();
        state.queue.clear();
        store.finalize(&state).unwrap();

        fs::write(&source, "<table><tr></tr></table>").unwrap();
        let resumed = store.resolve_work_queue(&builder).unwrap();
        assert_eq!(builder.calls.get(), 2);
        assert_eq!(resumed.pending(), 2);
        assert!(resumed.outcomes.is_empty());
    }

    #[test]
    fn corrupt_checkpoint_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ratings.xls");
        fs::write(&source, "x").unwrap();
        fs::write(checkpoint_path_for(&source), "{not json").unwrap();
        let builder = CountingBuilder::new(records());
        let mut store = CheckpointStore::open(&source).unwrap();
        let state = store.resolve_work_queue(&builder).unwrap();
        assert_eq!(builder.calls.get(), 1);
        assert_eq!(state.pending(), 2);
    }

    #[test]
    fn finalize_status_tracks_failures_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("ratings.xls");
        fs::write(&source, "abc").unwrap();
        let store = CheckpointStore::open(&source).unwrap();

        let mut state = RunState {
            queue: VecDeque::new(),
            outcomes: vec![MigrationOutcome::success(MovieRecord::new("Heat", "1995"))],
            status: RunStatus::InProgress,
            source_fingerprint: 3,
        };
        assert_eq!(store.finalize(&state).unwrap(), RunStatus::Completed);

        state.outcomes.push(MigrationOutcome::failure(
            MovieRecord::new("Inception", "2010"),
            RecordError::TitleNotFound("no recognized category in search results".into()),
        ));
        assert_eq!(store.finalize(&state).unwrap(), RunStatus::WithErrors);

        let doc = store.inspect().unwrap().unwrap();
        assert_eq!(doc.settings.status, RunStatus::WithErrors);
        assert_eq!(doc.settings.filesize, 3);
        assert_eq!(doc.outcomes, state.outcomes);
        assert_eq!(doc.failures().count(), 1);

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.checkpoint_path()).unwrap()).unwrap();
        assert_eq!(raw["settings"]["status"], "with errors");
    }
}
