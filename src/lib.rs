pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod export;
pub mod migrate;
pub mod tracing;
pub mod transport;

pub mod util {
    pub mod env;
}

pub use catalog::{match_movie, MovieRecord, SearchResultSet};
pub use checkpoint::{CheckpointStore, RunState, RunStatus};
pub use migrate::{MigrationOutcome, Migrator, RunDriver};
