//! Row access, column descriptors, mapping functions and statistics
//!
//! Everything in here is free of ranking state: it operates on plain
//! JSON-like rows and value sequences.

pub mod config;
pub mod mapping;
pub mod schema;
pub mod stats;
pub mod value;

use thiserror::Error;

// Re-exports
pub use config::NullConfig;
pub use mapping::{MappingFunction, ScriptError};
pub use schema::{CategoryDesc, ColumnDesc, MappingDesc, SchemaDetector};
pub use stats::{
    compute_box_plot, compute_categorical_histogram, compute_histogram, BoxPlot, CategoricalHistogram, Histogram, SortMethod,
};
pub use value::DataRow;

/// Errors that can occur in data operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("invalid domain [{min}, {max}]")]
    InvalidDomain { min: f64, max: f64 },

    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("invalid exponent {0}, must be positive and finite")]
    InvalidExponent(f64),

    #[error("unknown mapping type '{0}'")]
    UnknownMapping(String),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("descriptor error: {0}")]
    Descriptor(String),
}
