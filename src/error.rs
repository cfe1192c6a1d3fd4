//! Error kinds surfaced by the library.
//!
//! Configuration and I/O failures bubble up to the binary, which reports a
//! single human-readable message on rank 0 and exits with status 1.
//! Degenerate statistics are not errors: a contingency table with a zero
//! marginal simply produces an independence verdict.

use std::io;

/// A convenient alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while configuring or running a learning job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested discovery algorithm is not in the registry.
    #[error("requested algorithm not found; supported algorithms are: {{{0}}}")]
    UnknownAlgorithm(&'static str),

    /// The requested counter implementation is not in the registry.
    #[error("requested counter not found; supported counter types are: {{{0}}}")]
    UnknownCounter(&'static str),

    /// The target variable named on the command line is not in the dataset.
    #[error("target variable {0:?} not found")]
    TargetNotFound(String),

    /// More variables than the widest supported index type can address.
    #[error("the given number of variables ({0}) is not supported")]
    UnsupportedVarCount(usize),

    /// The dataset did not have the shape the options promised.
    #[error("dataset shape mismatch: {0}")]
    Shape(String),

    /// A field failed to parse as a byte-coded category.
    #[error("malformed field on line {line}: {reason}")]
    Malformed {
        /// 1-based line number within the input file.
        line: u64,
        /// What was wrong with the field.
        reason: String,
    },

    /// A command-line option was missing or unusable.
    #[error("{0}")]
    Options(String),

    /// An underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
