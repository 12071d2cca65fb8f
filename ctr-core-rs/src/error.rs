//! Error types for the CTR core
//!
//! Encoding errors come from the byte codec and the text transcoders,
//! crypto errors from key/signature decoding. Neither is allowed to escape a
//! vendor verifier: they are mapped to tagged verification results there.

use thiserror::Error;

/// Byte codec / transcoding error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid hex string '{0}'")]
    InvalidHex(String),

    #[error("invalid base32 string")]
    InvalidBase32,

    #[error("invalid base64 string")]
    InvalidBase64,

    #[error("invalid OBIS code '{0}'")]
    InvalidObis(String),

    #[error("write of {len} bytes at offset {offset} exceeds buffer of {capacity} bytes")]
    BufferOverflow {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    BufferUnderflow {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("text of {0} bytes does not fit a length prefix")]
    TextTooLong(usize),

    #[error("invalid UTF-8 text")]
    InvalidUtf8,

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

/// Key, signature and curve handling error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unknown curve '{0}'")]
    UnknownCurve(String),

    #[error("unknown hash algorithm '{0}'")]
    UnknownHashAlgorithm(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("unknown public key format '{0}'")]
    UnknownPublicKeyFormat(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("unknown signature format '{0}'")]
    UnknownSignatureFormat(String),

    #[error("public key is on curve {found}, expected {expected}")]
    CurveMismatch { expected: String, found: String },

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("openssl error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

pub type Result<T> = std::result::Result<T, EncodingError>;
