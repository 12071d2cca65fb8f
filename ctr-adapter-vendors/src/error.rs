//! Adapter errors
//!
//! `ParseError` stays inside the vendor parsers: their public entry points
//! turn it into an `InvalidSessionFormat` result. `VerifierError` is what
//! the pipeline itself can fail with.

use ctr_core::{CryptoError, EncodingError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("{key}: {detail}")]
    Format { key: &'static str, detail: String },
}

impl ParseError {
    pub fn format(key: &'static str, detail: impl Into<String>) -> Self {
        ParseError::Format {
            key,
            detail: detail.into(),
        }
    }

    /// Message key for the user-facing result
    pub fn message_key(&self) -> &'static str {
        match self {
            ParseError::Format { key, .. } => key,
            _ => ctr_core::keys::UNKNOWN_FORMAT,
        }
    }
}

impl From<roxmltree::Error> for ParseError {
    fn from(e: roxmltree::Error) -> Self {
        ParseError::Xml(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verification cancelled")]
    Cancelled,

    #[error("cannot expand archive '{name}': {reason}")]
    Archive { name: String, reason: String },

    #[error("parser task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
