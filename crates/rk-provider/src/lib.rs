//! Data provider: rows, rankings, selection and asynchronous re-sorting
//!
//! The provider is the only owner of mutable session state. Consumers
//! mutate columns and rankings through it so that every change is
//! published on the event bus and coalesced into one debounced re-sort.

pub mod backend;
pub mod debounce;
pub mod provider;
pub mod session;
pub mod settings;
pub mod source;
pub mod stats;

use rk_core::{ColumnId, RankingId};
use rk_model::ModelError;
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use backend::{BlockingSortBackend, DelayedSortBackend, LocalSortBackend, SortBackend};
pub use debounce::Debouncer;
pub use provider::{DataProvider, ResolvedSort, SortTicket};
pub use settings::ProviderSettings;
pub use source::{load_csv, load_json, load_rows};
pub use stats::{ColumnStats, StatsCache};

/// Errors raised by provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unknown ranking '{0}'")]
    UnknownRanking(RankingId),

    #[error("ranking '{0}' already exists")]
    DuplicateRanking(RankingId),

    #[error("unknown column '{0}'")]
    UnknownColumn(ColumnId),

    #[error("cannot create a column for '{0}'")]
    UnknownDescriptor(String),

    #[error("column '{0}' has no statistics")]
    NoStatistics(ColumnId),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("unsupported data file '{0}', expected .csv or .json")]
    UnsupportedFormat(String),

}

impl From<csv::Error> for ProviderError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => ProviderError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => ProviderError::Csv(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
