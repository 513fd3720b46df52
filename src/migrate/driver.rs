//! Run driver: walks the work queue one record at a time and guarantees the
//! checkpoint is written exactly once on every exit path.
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Migrator;
use crate::checkpoint::{CheckpointError, CheckpointStore, RunState, RunStatus};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("run deadline exceeded after {processed} records (progress saved)")]
    DeadlineExceeded { processed: usize },
    #[error("run interrupted after {processed} records (progress saved)")]
    Interrupted { processed: usize },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Deadline and cancellation for one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn with_time_limit(limit: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            deadline: limit.map(|d| Instant::now() + d),
            cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Records processed during this run.
    pub processed: usize,
    /// Failures across all runs recorded in the checkpoint.
    pub failures: usize,
    pub pending: usize,
    pub status: RunStatus,
}

/// Owns the run state and writes it on `finish`, or from `Drop` if the run
/// unwinds before getting there.
struct FinalizeGuard<'a> {
    store: &'a CheckpointStore,
    state: RunState,
    start_outcomes: usize,
    finalized: bool,
}

impl<'a> FinalizeGuard<'a> {
    fn new(store: &'a CheckpointStore, state: RunState) -> Self {
        let start_outcomes = state.outcomes.len();
        Self {
            store,
            state,
            start_outcomes,
            finalized: false,
        }
    }

    fn processed(&self) -> usize {
        self.state.outcomes.len() - self.start_outcomes
    }

    fn finish(mut self) -> Result<RunSummary, CheckpointError> {
        self.finalized = true;
        let status = self.store.finalize(&self.state)?;
        Ok(RunSummary {
            processed: self.processed(),
            failures: self.state.failure_count(),
            pending: self.state.pending(),
            status,
        })
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        warn!(
            processed = self.processed(),
            "run ended abnormally; persisting checkpoint"
        );
        if let Err(e) = self.store.finalize(&self.state) {
            error!(error = %e, "failed to persist checkpoint on teardown");
        }
    }
}

enum Stop {
    Drained,
    Interrupted,
    DeadlineExceeded,
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub struct RunDriver<T> {
    migrator: Migrator<T>,
    store: CheckpointStore,
    request_delay: Duration,
}

impl<T: Transport> RunDriver<T> {
    pub fn new(migrator: Migrator<T>, store: CheckpointStore) -> Self {
        Self {
            migrator,
            store,
            request_delay: Duration::ZERO,
        }
    }

    /// Pause between records, to stay polite with the catalog.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Process the queue in order until it is empty, the deadline passes or
    /// `ctx.cancel` fires. The checkpoint is written in all three cases; the
    /// record in flight when the run stops stays queued for next time.
    pub async fn run(&self, state: RunState, ctx: &RunContext) -> Result<RunSummary, DriverError> {
        info!(
            pending = state.pending(),
            already_done = state.outcomes.len(),
            mode = ?self.migrator.options().mode,
            "run starting"
        );
        let mut guard = FinalizeGuard::new(&self.store, state);

        let stop = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Stop::Interrupted,
            _ = wait_for(ctx.deadline) => Stop::DeadlineExceeded,
            _ = self.drain(&mut guard.state) => Stop::Drained,
        };

        let summary = guard.finish()?;
        match stop {
            Stop::Drained => {
                info!(
                    processed = summary.processed,
                    failures = summary.failures,
                    status = ?summary.status,
                    "run finished"
                );
                Ok(summary)
            }
            Stop::Interrupted => {
                warn!(processed = summary.processed, pending = summary.pending, "run interrupted");
                Err(DriverError::Interrupted {
                    processed: summary.processed,
                })
            }
            Stop::DeadlineExceeded => {
                error!(processed = summary.processed, pending = summary.pending, "run deadline exceeded");
                Err(DriverError::DeadlineExceeded {
                    processed: summary.processed,
                })
            }
        }
    }

    async fn drain(&self, state: &mut RunState) {
        let total = state.pending();
        while let Some(record) = state.queue.front().cloned() {
            let outcome = self.migrator.process_record(&record).await;
            state.queue.pop_front();
            state.outcomes.push(outcome);
            info!(
                title = %record.title,
                year = %record.year,
                done = total - state.pending(),
                total,
                "record processed"
            );
            if !self.request_delay.is_zero() && !state.queue.is_empty() {
                sleep(self.request_delay).await;
            }
        }
    }
}
