//! Error handling and custom error types
//!
//! Provides unified error handling across the upload pipeline using thiserror.
//! Each pipeline step has its own variant so callers can tell where an
//! upload stopped.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The CDN accepted the asset but the backend did not register it.
    #[error("Linking failed: {0}")]
    Linking(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// A `.env` file exists but could not be loaded.
    #[error("Environment file error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
