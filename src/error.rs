//! Error types for the hopdex library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`HopdexError`] enum. Protocol misuse of a transaction (committing
//! without a successful vote, nesting transactions) is a programming
//! error and panics instead of producing a value of this type.
//!
//! # Examples
//!
//! ```
//! use hopdex::error::{HopdexError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(HopdexError::invalid_config("large_threshold must be positive"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for hopdex operations.
#[derive(Error, Debug)]
pub enum HopdexError {
    /// I/O errors (file operations, renames, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors (dictionary, manifest, missing files)
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Corrupt or truncated postings block
    #[error("Posting error: {0}")]
    Posting(String),

    /// Compression or decompression failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// A posting list is not strictly increasing in both endpoints
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Transaction errors (lock contention, failed vote)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Thread join errors
    #[error("Thread join error: {0}")]
    ThreadJoinError(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with HopdexError.
pub type Result<T> = std::result::Result<T, HopdexError>;

impl HopdexError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        HopdexError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        HopdexError::Storage(msg.into())
    }

    /// Create a new posting error.
    pub fn posting<S: Into<String>>(msg: S) -> Self {
        HopdexError::Posting(msg.into())
    }

    /// Create a new compression error.
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        HopdexError::Compression(msg.into())
    }

    /// Create a new invariant violation error.
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        HopdexError::Invariant(msg.into())
    }

    /// Create a new transaction error.
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        HopdexError::Transaction(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        HopdexError::InvalidOperation(msg.into())
    }

    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        HopdexError::Other(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        HopdexError::Other(msg.into())
    }
}
