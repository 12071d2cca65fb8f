//! # CTR Vendor Adapter
//!
//! Turns vendor export files from EV charging infrastructure into
//! verified charge transparency records.
//!
//! ## Architecture
//!
//! ```text
//! input files
//!       │
//!       ▼
//! ┌─────────────────────────────────┐
//! │  archive expansion (host hook)  │
//! └─────────────┬───────────────────┘
//!               ▼
//! ┌─────────────────────────────────┐
//! │  FormatDetector                 │
//! │  XML │ OCMF │ Alfen │ JSON fan-out
//! └─────────────┬───────────────────┘
//!               ▼
//! ┌─────────────────────────────────┐
//! │  merge ─▶ Assembler             │
//! │  meter lookup │ key attestation │
//! │  per-session verifier           │
//! └─────────────┬───────────────────┘
//!               ▼
//!   ChargeTransparencyRecord + results
//! ```
//!
//! ## Supported Inputs
//!
//! | Input | Module |
//! |-------|--------|
//! | chargeIT Mobility JSON | [`vendors::chargeit`] (GDF / EMH sessions) |
//! | BSM-WS36a JSON | [`vendors::bsm`] |
//! | ChargePoint export | [`vendors::chargepoint`] |
//! | OCMF text | [`vendors::ocmf`] |
//! | Alfen `AP;` text | [`vendors::alfen`] |
//! | SAFE / generic XML | [`vendors::safe_xml`], [`vendors::xml_container`] |
//! | Mennekes export | [`vendors::mennekes`] |
//! | OCPI CDR | [`vendors::ocpi`] |
//! | native `CTR+json`, PEM keys | [`vendors::native`] |
//!
//! ## Usage
//!
//! ```no_run
//! use ctr_adapter_vendors::{FileBuffer, Verifier, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let verifier = Verifier::new(VerifierConfig::default());
//!     let file = FileBuffer::new("session.json", std::fs::read("session.json")?);
//!     let outcome = verifier.verify_files(vec![file], None).await?;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod archive;
pub mod vendors;
pub mod merge;
pub mod assembler;
pub mod chain;
pub mod detect;
pub mod pipeline;

#[cfg(test)]
mod testutil;

pub use config::VerifierConfig;
pub use error::{ParseError, VerifierError};
pub use archive::{ArchiveExpander, ArchiveKind, FileBuffer, NoArchiveExpander};
pub use assembler::{Assembler, AssemblySummary};
pub use chain::{verify_release, ReleaseDescriptor, ReleaseReport};
pub use detect::{FormatDetector, Envelope};
pub use merge::{merge_outcomes, merge_record};
pub use pipeline::{CancellationToken, VerificationOutcome, Verifier};
pub use vendors::{JsonFormatParser, SessionFormat};
