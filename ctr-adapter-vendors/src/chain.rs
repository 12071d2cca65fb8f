//! Second-order signatures
//!
//! - **Key attestation**: a meter public key carries signatures of the
//!   parties that vouch for it. The signed payload is the canonical JSON of
//!   the key and the signature metadata.
//! - **Release artifacts**: a descriptor lists file SHA-512 digests and is
//!   signed with secp256k1 over the SHA-512 of its own canonical JSON.
//!
//! Canonical JSON: object keys sorted, no whitespace, absent fields omitted.

use std::collections::BTreeMap;

use ctr_core::{
    codec, Curve, HashAlgorithm, PublicKeyInfo, PublicKeySignature, SignatureValue,
    VerificationStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha512};
use tracing::{debug, info};

use crate::archive::FileBuffer;
use crate::vendors::common::{verify_bytes_with_key, verify_prehashed, CryptoParams, SignatureDefault};

/// Curve of attestations that do not name one
pub const DEFAULT_ATTESTATION_CURVE: Curve = Curve::Secp256r1;

/// Curve of release signatures
pub const RELEASE_CURVE: Curve = Curve::Secp256k1;

// ============================================================================
// Canonical JSON
// ============================================================================

/// Serialize with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

fn insert_some(map: &mut serde_json::Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

// ============================================================================
// Key attestation
// ============================================================================

/// Bytes a key attestation signs
pub fn attestation_payload(key: &PublicKeyInfo, signature: &PublicKeySignature) -> String {
    let mut public_key = serde_json::Map::new();
    insert_some(&mut public_key, "algorithm", key.algorithm.as_deref());
    insert_some(&mut public_key, "format", key.format.as_deref());
    public_key.insert("value".into(), Value::String(key.value.clone()));

    let mut payload = serde_json::Map::new();
    payload.insert("publicKey".into(), Value::Object(public_key));
    payload.insert("signer".into(), Value::String(signature.signer.clone()));
    let timestamp = signature.timestamp.map(|t| t.to_rfc3339());
    insert_some(&mut payload, "timestamp", timestamp.as_deref());
    insert_some(&mut payload, "comment", signature.comment.as_deref());
    canonical_json(&Value::Object(payload))
}

/// Check one attestation of `key`
pub fn verify_key_signature(key: &PublicKeyInfo, signature: &PublicKeySignature) -> VerificationStatus {
    let hash = match signature.hash.as_deref().map(str::parse::<HashAlgorithm>) {
        None => HashAlgorithm::Sha256,
        Some(Ok(hash)) => hash,
        Some(Err(_)) => return VerificationStatus::UnknownSignatureFormat,
    };
    let Some(signer_key) = signature.public_key.as_deref() else {
        return VerificationStatus::PublicKeyNotFound;
    };
    let curve = match signer_key.curve.as_deref().map(str::parse::<Curve>) {
        None => DEFAULT_ATTESTATION_CURVE,
        Some(Ok(curve)) => curve,
        Some(Err(_)) => return VerificationStatus::UnknownPublicKeyFormat,
    };
    let value = SignatureValue {
        algorithm: signature.algorithm.clone(),
        format: signature.format.clone(),
        r: signature.r.clone(),
        s: signature.s.clone(),
        value: signature.value.clone(),
        ..Default::default()
    };
    let payload = attestation_payload(key, signature);
    let result = verify_bytes_with_key(
        &CryptoParams::new(hash, curve),
        payload.as_bytes(),
        Vec::new(),
        Some(signer_key),
        Some(&value),
        SignatureDefault::Der,
    );
    debug!(
        "Chain: attestation by {} -> {}",
        signature.signer, result.status
    );
    result.status
}

/// Verify and record every attestation of a key. Returns the folded status,
/// or `None` for a key without attestations.
pub fn verify_key_attestations(key: &mut PublicKeyInfo) -> Option<VerificationStatus> {
    if key.signatures.is_empty() {
        return None;
    }
    let snapshot = PublicKeyInfo {
        signatures: Vec::new(),
        ..key.clone()
    };
    let statuses: Vec<VerificationStatus> = key
        .signatures
        .iter_mut()
        .map(|signature| {
            let status = verify_key_signature(&snapshot, signature);
            signature.result = Some(status);
            status
        })
        .collect();
    Some(VerificationStatus::fold(statuses))
}

// ============================================================================
// Release artifacts
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDescriptor {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<ReleaseFile>,
    #[serde(default)]
    pub signatures: Vec<ReleaseSignature>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub name: String,
    /// Hex SHA-512 of the file content
    pub sha512: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSignature {
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Hex DER SubjectPublicKeyInfo or PEM
    pub public_key: String,
    /// Hex DER ECDSA signature
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileCheck {
    Matches,
    DigestMismatch,
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseReport {
    pub version: String,
    pub files: Vec<(String, FileCheck)>,
    pub signatures: Vec<(String, VerificationStatus)>,
}

impl ReleaseReport {
    /// Every file matches and at least one signature is valid, none invalid
    pub fn is_valid(&self) -> bool {
        self.files.iter().all(|(_, check)| *check == FileCheck::Matches)
            && !self.signatures.is_empty()
            && self.signatures.iter().all(|(_, status)| status.is_valid())
    }
}

/// SHA-512 over the canonical descriptor without its signatures
pub fn chained_digest(descriptor: &ReleaseDescriptor) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(descriptor)?;
    if let Value::Object(map) = &mut value {
        map.remove("signatures");
    }
    Ok(Sha512::digest(canonical_json(&value).as_bytes()).to_vec())
}

fn release_key(text: &str) -> PublicKeyInfo {
    let format = if text.contains("-----BEGIN") { "PEM" } else { "DER" };
    PublicKeyInfo {
        curve: Some(RELEASE_CURVE.name().to_string()),
        format: Some(format.into()),
        value: text.trim().to_string(),
        ..Default::default()
    }
}

/// Check file digests and descriptor signatures
pub fn verify_release(
    descriptor: &ReleaseDescriptor,
    files: &[FileBuffer],
) -> Result<ReleaseReport, serde_json::Error> {
    let mut report = ReleaseReport {
        version: descriptor.version.clone(),
        ..Default::default()
    };

    for expected in &descriptor.files {
        let check = match files.iter().find(|f| f.name == expected.name) {
            None => FileCheck::Missing,
            Some(file) => {
                let actual = codec::hex_encode(&Sha512::digest(&file.bytes));
                if actual.eq_ignore_ascii_case(expected.sha512.trim()) {
                    FileCheck::Matches
                } else {
                    FileCheck::DigestMismatch
                }
            }
        };
        report.files.push((expected.name.clone(), check));
    }

    let digest = chained_digest(descriptor)?;
    for signature in &descriptor.signatures {
        let value = SignatureValue {
            format: Some("DER".into()),
            value: Some(signature.signature.trim().to_string()),
            ..Default::default()
        };
        // signed over the chained digest itself, no second hash
        let result = verify_prehashed(
            RELEASE_CURVE,
            &digest,
            &release_key(&signature.public_key),
            &value,
        );
        report.signatures.push((signature.signer.clone(), result));
    }

    info!(
        "Chain: release {} -> files ok: {}, signatures: {:?}",
        report.version,
        report.files.iter().all(|(_, c)| *c == FileCheck::Matches),
        report.signatures
    );
    Ok(report)
}
