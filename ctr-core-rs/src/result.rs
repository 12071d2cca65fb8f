//! Verification results
//!
//! - [`VerificationStatus`]: the tag every entry point returns
//! - [`CryptoResult`]: per measurement value, with the proof trace
//! - [`SessionCryptoResult`]: per session / per file, with certainty and
//!   accumulated format errors
//! - [`Message`]: a localizable message key plus positional parameters

use serde::{Deserialize, Serialize};

use crate::layout::CryptoField;

/// Message keys emitted by the core and the vendor parsers
pub mod keys {
    pub const UNKNOWN_FORMAT: &str = "UnknownOrInvalidChargeTransparencyRecordFormat";
    pub const NO_RECORDS_FOUND: &str = "NoChargeTransparencyRecordsFound";
    pub const UNKNOWN_SESSION_FORMAT: &str = "UnknownSessionFormat";
    pub const INVALID_SESSION_FORMAT: &str = "InvalidSessionFormat";
    pub const AT_LEAST_TWO_MEASUREMENTS: &str = "AtLeastTwoMeasurementsRequired";
    pub const UNEXPECTED_ERROR: &str = "UnexpectedError";
    pub const MISSING_FIELD: &str = "MissingField";
    pub const INVALID_FIELD: &str = "InvalidField";
}

/// Outcome tag of a verification step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    UnknownSessionFormat,
    InvalidSessionFormat,
    EnergyMeterNotFound,
    UnknownSignatureFormat,
    PublicKeyNotFound,
    UnknownPublicKeyFormat,
    InvalidPublicKey,
    InvalidSignature,
    ValidSignature,
    AtLeastTwoMeasurementsRequired,
    ValidationError,
    NoChargeTransparencyRecordsFound,
}

impl VerificationStatus {
    /// Fold order for session results: lower wins. Statuses outside the
    /// cryptographic ladder (format and validation failures on a single
    /// value) sit between `InvalidPublicKey` and `InvalidSignature`.
    fn precedence(&self) -> u8 {
        match self {
            VerificationStatus::EnergyMeterNotFound => 0,
            VerificationStatus::UnknownSignatureFormat => 1,
            VerificationStatus::PublicKeyNotFound => 2,
            VerificationStatus::UnknownPublicKeyFormat => 3,
            VerificationStatus::InvalidPublicKey => 4,
            VerificationStatus::UnknownSessionFormat
            | VerificationStatus::InvalidSessionFormat
            | VerificationStatus::AtLeastTwoMeasurementsRequired
            | VerificationStatus::ValidationError
            | VerificationStatus::NoChargeTransparencyRecordsFound => 5,
            VerificationStatus::InvalidSignature => 6,
            VerificationStatus::ValidSignature => 7,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::ValidSignature)
    }

    /// Fold per-value statuses into one session status. An empty input
    /// cannot prove anything and folds to `AtLeastTwoMeasurementsRequired`.
    pub fn fold<I>(statuses: I) -> VerificationStatus
    where
        I: IntoIterator<Item = VerificationStatus>,
    {
        statuses
            .into_iter()
            .fold(None, |acc: Option<VerificationStatus>, status| match acc {
                Some(best) if best.precedence() <= status.precedence() => Some(best),
                _ => Some(status),
            })
            .unwrap_or(VerificationStatus::AtLeastTwoMeasurementsRequired)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Localizable message: key, positional parameters, and the rendered text
/// once a localizer has run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            params: Vec::new(),
            text: None,
        }
    }

    pub fn with_param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }
}

/// Per-value verification outcome and proof trace.
///
/// The trace fields are filled as far as the verifier got, including on
/// failure, so a reviewer can redo the computation by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoResult {
    pub status: VerificationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,

    /// Hex of the reconstructed signed bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_r: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_s: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<CryptoField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl CryptoResult {
    pub fn new(status: VerificationStatus) -> Self {
        Self {
            status,
            hash_algorithm: None,
            curve: None,
            buffer: None,
            digest: None,
            public_key: None,
            signature_r: None,
            signature_s: None,
            fields: Vec::new(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl ToString) -> Self {
        self.diagnostic = Some(diagnostic.to_string());
        self
    }
}

/// Session- or file-level outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCryptoResult {
    pub status: VerificationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    pub certainty: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Message>,

    /// Opaque internal error text, never shown to end users directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl SessionCryptoResult {
    pub fn new(status: VerificationStatus) -> Self {
        Self {
            status,
            message: None,
            certainty: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
            diagnostic: None,
        }
    }

    /// Failure with certainty 0 and a message key
    pub fn failure(status: VerificationStatus, key: &str) -> Self {
        Self::new(status).with_message(Message::new(key))
    }

    /// Unexpected internal error mapped to `InvalidSessionFormat`
    pub fn invalid_format(diagnostic: impl ToString) -> Self {
        Self::failure(VerificationStatus::InvalidSessionFormat, keys::UNKNOWN_FORMAT)
            .with_diagnostic(diagnostic)
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_certainty(mut self, certainty: f64) -> Self {
        self.certainty = certainty;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl ToString) -> Self {
        self.diagnostic = Some(diagnostic.to_string());
        self
    }
}
