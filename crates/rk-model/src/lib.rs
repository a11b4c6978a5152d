//! Column model and rankings
//!
//! Columns are a closed set of variants sharing one capability surface
//! (value, compare, filter, label, group, dump/restore). Rankings own their
//! columns top-down; composite columns own their children and refer to
//! their parent by id only.

pub mod column;
pub mod dump;
pub mod factory;
pub mod ranking;

use rk_core::ColumnId;
use rk_data::DataError;
use thiserror::Error;

// Re-exports
pub use column::{CellValue, Column, ColumnFilter, ColumnKind, EvalContext, Fired};
pub use dump::{ColumnDump, ProviderDump, RankingDump, SortCriterionDump};
pub use factory::ColumnFactory;
pub use ranking::{sort_and_group, Group, OrderedGroup, RankIndex, Ranking, SortCriterion, SortSnapshot};

/// Errors raised by column and ranking setters
///
/// A setter returning an error has left the column or ranking unchanged
/// and fired no event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("unknown column '{0}'")]
    UnknownColumn(ColumnId),

    #[error("column '{0}' already belongs to this ranking")]
    DuplicateColumn(ColumnId),

    #[error("invalid width {0}")]
    InvalidWidth(f64),

    #[error("column '{column}' does not accept a {given} filter")]
    FilterMismatch { column: ColumnId, given: &'static str },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("column '{0}' has no {1}")]
    Unsupported(ColumnId, &'static str),

    #[error("column '{0}' cannot be sorted")]
    NotSortable(ColumnId),

    #[error("column '{0}' cannot be grouped")]
    NotGroupable(ColumnId),

    #[error("at most {max} criteria allowed")]
    TooManyCriteria { max: usize },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error(transparent)]
    Data(#[from] DataError),
}
