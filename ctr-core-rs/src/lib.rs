//! CTR Core Library
//!
//! Building blocks for verifying charge transparency records: the byte
//! codec that reconstructs signed meter layouts, OBIS codes and DLMS units,
//! hashing and ECDSA verification, the record data model, and the
//! verification result types.

pub mod error;
pub mod codec;
pub mod layout;
pub mod obis;
pub mod crypto;
pub mod time;
pub mod types;
pub mod result;
pub mod certainty;
pub mod localizer;

pub use error::{CryptoError, EncodingError};
pub use codec::{Endian, TextEncoding};
pub use layout::{CryptoField, LayoutBuilder};
pub use obis::{DlmsUnit, Obis};
pub use crypto::{
    digest, truncate_digest, try_verify_signature, verify_signature, Curve, HashAlgorithm,
    PublicKeyBytes, SignatureBytes,
};
pub use types::*;
pub use result::{keys, CryptoResult, Message, SessionCryptoResult, VerificationStatus};
pub use certainty::FormatChecks;
pub use localizer::{CatalogLocalizer, KeyEchoLocalizer, Localizer};
