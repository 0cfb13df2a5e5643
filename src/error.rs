//! Custom error types for rustpubmed.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, PubmedError>` instead of using `unwrap()`.
//!
//! Note that a missing extraction anchor is NOT an error: per-field
//! extraction degrades to a sentinel value and never surfaces here.

use thiserror::Error;

/// Main error type for rustpubmed operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum PubmedError {
    /// Network/HTTP request error (connection failures, DNS, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Non-2xx HTTP status from an upstream origin
    #[error("HTTP status error: {0}")]
    HttpStatus(u16),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error (the only fatal pre-fetch condition)
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `PubmedError`
pub type Result<T> = std::result::Result<T, PubmedError>;

impl PubmedError {
    /// Whether this error came out of a single fetch attempt.
    ///
    /// Fetch errors are non-fatal: the pipeline turns them into a
    /// failed-status record (detail fetch), a zero-identifier page
    /// (listing fetch) or an empty supplement (enrichment fetch).
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            PubmedError::Network(_) | PubmedError::Timeout | PubmedError::HttpStatus(_)
        )
    }
}
