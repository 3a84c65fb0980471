//! Error types for the harvester.
//!
//! Fetch and validation failures are handled locally inside the worker loop
//! and never reach the scheduler; only configuration, checkpoint and sink
//! failures surface through `HarvestError`. Queue full/empty conditions are
//! ordinary control-flow values, not errors.

use thiserror::Error;

/// Transport or navigation failure raised by a [`crate::source::PageSource`]
/// fetch. Workers log it, skip the identifier, and move on.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The page for an identifier could not be reached or rendered.
    #[error("navigation failed for '{identifier}': {reason}")]
    Navigation { identifier: String, reason: String },

    /// The fetch did not complete in time.
    #[error("fetch timed out for '{identifier}'")]
    Timeout { identifier: String },
}

/// A parsed record that cannot be projected into an output row.
///
/// This is a per-row outcome, not a run failure: the row is dropped and the
/// worker continues with the identifier's discoveries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// Too few attributes were extracted for the row to be worth keeping.
    #[error("record for '{identifier}' has only {present} extracted fields")]
    TooSparse { identifier: String, present: usize },

    /// Strict mode found a required field with no value.
    #[error("record for '{identifier}' is missing required field '{field}'")]
    MissingRequired { identifier: String, field: String },
}

/// Top-level error type for the harvester.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Invalid builder configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Checkpoint could not be read or written.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// An output sink rejected an append.
    #[error("output sink error: {0}")]
    Sink(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint (de)serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV output errors
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
