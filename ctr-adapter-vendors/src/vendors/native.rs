//! Native inputs: `CTR+json` documents and bare PEM public keys

use ctr_core::crypto::curve_of_public_key;
use ctr_core::{
    keys, ChargeTransparencyRecord, FormatChecks, Message, ParseOutcome, PublicKeyBytes,
    PublicKeyInfo, SessionCryptoResult, VerificationStatus, CTR_CONTEXT,
};
use tracing::debug;

use super::{finish_record, into_outcome};
use crate::error::Result;

const RECORD_CHECKS: u32 = 2;

pub const PEM_PUBLIC_KEY_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";

fn parse_record(json: &serde_json::Value) -> Result<ParseOutcome> {
    let ctr: ChargeTransparencyRecord = serde_json::from_value(json.clone())?;
    let mut checks = FormatChecks::new(RECORD_CHECKS);
    checks.check(
        ctr.context.as_ref().is_some_and(|c| c.contains(CTR_CONTEXT)),
        || Message::new(keys::INVALID_FIELD).with_param("@context"),
    );
    checks.check(!ctr.charging_sessions.is_empty(), || {
        Message::new(keys::MISSING_FIELD).with_param("chargingSessions")
    });
    debug!(
        "CTR: {:?} with {} session(s)",
        ctr.id,
        ctr.charging_sessions.len()
    );
    Ok(finish_record(ctr, checks))
}

/// Deserialize a native record; the certainty only reflects the context
/// and the presence of sessions
pub fn parse_native(json: &serde_json::Value) -> ParseOutcome {
    into_outcome(parse_record(json))
}

/// A PEM file holding one EC public key
pub fn parse_pem_public_key(text: &str) -> ParseOutcome {
    let pem = text.trim().to_string();
    match curve_of_public_key(&PublicKeyBytes::Pem(pem.clone())) {
        Ok(curve) => {
            debug!("PEM: {} public key", curve);
            ParseOutcome::PublicKey(PublicKeyInfo {
                algorithm: Some("ECDSA".into()),
                curve: Some(curve.name().to_string()),
                format: Some("PEM".into()),
                value: pem,
                ..Default::default()
            })
        }
        Err(e) => ParseOutcome::Failure(
            SessionCryptoResult::failure(VerificationStatus::InvalidPublicKey, keys::UNKNOWN_FORMAT)
                .with_diagnostic(e),
        ),
    }
}
