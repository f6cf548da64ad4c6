// src/error.rs

//! Crate-wide error type
//!
//! Most component boundaries in this crate report failures as descriptive
//! strings attached to results (best-effort resolution) rather than
//! propagating errors; this type covers the places that do propagate.

use thiserror::Error;

/// Errors that can occur across orchsync components
#[derive(Debug, Error)]
pub enum Error {
    /// Initialization failure (HTTP client construction, config loading)
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Filesystem I/O failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// Package download failure (network or HTTP-level)
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Manifest or payload parsing failure
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Package absent from the registry
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Local cache installation failure
    #[error("Install error: {0}")]
    InstallError(String),

    /// Configuration file failure
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
