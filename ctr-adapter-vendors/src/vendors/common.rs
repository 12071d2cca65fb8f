//! Shared verifier plumbing: key and signature decoding, the
//! hash-then-verify step with its proof trace, and scaled values.

use std::str::FromStr;

use ctr_core::crypto::{self, public_key_point};
use ctr_core::{
    codec, CryptoError, CryptoResult, Curve, DlmsUnit, EnergyMeter, HashAlgorithm, LayoutBuilder,
    Measurement, MeasurementValue, PublicKeyBytes, PublicKeyInfo, SignatureBytes, SignatureInfos,
    SignatureValue, TextEncoding, VerificationStatus,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::MeasurementContext;
use crate::error::ParseError;

/// Hash, truncation and curve a verifier uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoParams {
    pub hash: HashAlgorithm,
    pub truncation: Option<usize>,
    pub curve: Curve,
}

impl CryptoParams {
    pub const fn new(hash: HashAlgorithm, curve: Curve) -> Self {
        Self {
            hash,
            truncation: None,
            curve,
        }
    }

    pub const fn with_truncation(mut self, bytes: usize) -> Self {
        self.truncation = Some(bytes);
        self
    }

    /// Apply declared `signatureInfos`; unparseable entries keep the default
    pub fn overridden_by(mut self, infos: Option<&SignatureInfos>) -> Self {
        let Some(infos) = infos else {
            return self;
        };
        if let Some(hash) = infos.hash.as_deref().and_then(|h| HashAlgorithm::from_str(h).ok()) {
            self.hash = hash;
        }
        if let Some(curve) = infos.curve.as_deref().and_then(|c| Curve::from_str(c).ok()) {
            self.curve = curve;
        }
        if infos.hash_truncation.is_some() {
            self.truncation = infos.hash_truncation;
        }
        self
    }

    /// Defaults overridden by the meter, then by the measurement
    pub fn for_context(self, ctx: &MeasurementContext<'_>) -> Self {
        self.overridden_by(ctx.meter.and_then(|m| m.signature_infos.as_ref()))
            .overridden_by(ctx.measurement.signature_infos.as_ref())
    }

    fn trace(&self, status: VerificationStatus) -> CryptoResult {
        let mut result = CryptoResult::new(status);
        result.hash_algorithm = Some(self.hash.name().to_string());
        result.curve = Some(self.curve.name().to_string());
        result
    }
}

/// How to read a signature that does not name its format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureDefault {
    Der,
    Concatenated,
}

/// Decode a key declaration
pub fn public_key_bytes(info: &PublicKeyInfo) -> Result<PublicKeyBytes, VerificationStatus> {
    if info.value.contains("-----BEGIN") {
        return Ok(PublicKeyBytes::Pem(info.value.clone()));
    }
    let encoding = match info.encoding.as_deref() {
        None => TextEncoding::Hex,
        Some(label) => {
            TextEncoding::from_label(label).ok_or(VerificationStatus::UnknownPublicKeyFormat)?
        }
    };
    match info.format.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("pem") => Ok(PublicKeyBytes::Pem(info.value.clone())),
        Some("der") => encoding
            .decode(&info.value)
            .map(PublicKeyBytes::Der)
            .map_err(|_| VerificationStatus::InvalidPublicKey),
        Some("raw") | Some("rs") | Some("sec1") => encoding
            .decode(&info.value)
            .map(PublicKeyBytes::Raw)
            .map_err(|_| VerificationStatus::InvalidPublicKey),
        None => encoding
            .decode(&info.value)
            .map(PublicKeyBytes::sniff)
            .map_err(|_| VerificationStatus::InvalidPublicKey),
        Some(_) => Err(VerificationStatus::UnknownPublicKeyFormat),
    }
}

/// Meter keys first, then record-level keys for the same (or no) meter
pub fn find_public_key<'a>(ctx: &MeasurementContext<'a>) -> Option<&'a PublicKeyInfo> {
    if let Some(key) = ctx.meter.and_then(|m| m.public_keys.first()) {
        return Some(key);
    }
    let meter_id = ctx.meter_id();
    ctx.record_keys
        .iter()
        .find(|key| key.meter_id.is_some() && key.meter_id.as_deref() == meter_id)
        .or_else(|| ctx.record_keys.iter().find(|key| key.meter_id.is_none()))
}

/// Decode a measurement signature
pub fn signature_bytes(
    signature: &SignatureValue,
    default: SignatureDefault,
) -> Result<SignatureBytes, VerificationStatus> {
    let encoding = match signature.encoding.as_deref() {
        None => TextEncoding::Hex,
        Some(label) => {
            TextEncoding::from_label(label).ok_or(VerificationStatus::UnknownSignatureFormat)?
        }
    };
    let decode = |text: &str| {
        encoding
            .decode(text)
            .map_err(|_| VerificationStatus::InvalidSignature)
    };
    let raw_pair = || match (&signature.r, &signature.s) {
        (Some(r), Some(s)) => Ok(SignatureBytes::Raw {
            r: decode(r)?,
            s: decode(s)?,
        }),
        _ => Err(VerificationStatus::UnknownSignatureFormat),
    };

    match signature.format.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("rs") => {
            if signature.r.is_some() {
                raw_pair()
            } else {
                let value = signature
                    .value
                    .as_deref()
                    .ok_or(VerificationStatus::UnknownSignatureFormat)?;
                SignatureBytes::from_concatenated(&decode(value)?)
                    .map_err(|_| VerificationStatus::InvalidSignature)
            }
        }
        Some("der") | Some("application/x-der") => {
            let value = signature
                .value
                .as_deref()
                .ok_or(VerificationStatus::UnknownSignatureFormat)?;
            Ok(SignatureBytes::Der(decode(value)?))
        }
        None => {
            if signature.r.is_some() {
                return raw_pair();
            }
            let value = signature
                .value
                .as_deref()
                .ok_or(VerificationStatus::UnknownSignatureFormat)?;
            let bytes = decode(value)?;
            match default {
                SignatureDefault::Der => Ok(SignatureBytes::Der(bytes)),
                SignatureDefault::Concatenated => SignatureBytes::from_concatenated(&bytes)
                    .map_err(|_| VerificationStatus::InvalidSignature),
            }
        }
        Some(_) => Err(VerificationStatus::UnknownSignatureFormat),
    }
}

/// The meter a value must be verified against
pub fn require_meter<'a>(ctx: &MeasurementContext<'a>) -> Result<&'a EnergyMeter, CryptoResult> {
    ctx.meter
        .ok_or_else(|| CryptoResult::new(VerificationStatus::EnergyMeterNotFound))
}

/// A layout could not be rebuilt from the value's fields
pub fn layout_failure(params: &CryptoParams, error: ParseError) -> CryptoResult {
    params
        .trace(VerificationStatus::ValidationError)
        .with_diagnostic(error)
}

/// Hash the rebuilt bytes, resolve the key, decode the signature and verify.
/// The trace is filled as far as the steps got.
pub fn verify_signed_bytes(
    ctx: &MeasurementContext<'_>,
    value: &MeasurementValue,
    params: &CryptoParams,
    layout: LayoutBuilder,
    default: SignatureDefault,
) -> CryptoResult {
    let (bytes, fields) = layout.into_parts();
    verify_bytes_with_key(params, &bytes, fields, find_public_key(ctx), value.signatures.first(), default)
}

/// Shared core of every vendor verifier
pub fn verify_bytes_with_key(
    params: &CryptoParams,
    bytes: &[u8],
    fields: Vec<ctr_core::CryptoField>,
    key: Option<&PublicKeyInfo>,
    signature: Option<&SignatureValue>,
    default: SignatureDefault,
) -> CryptoResult {
    let mut result = params.trace(VerificationStatus::ValidationError);
    result.buffer = Some(codec::hex_encode(bytes));
    result.fields = fields;

    let full_digest = params.hash.digest(bytes);
    let digest = crypto::truncate_digest(&full_digest, params.truncation);
    result.digest = Some(codec::hex_encode(digest));

    let Some(key_info) = key else {
        result.status = VerificationStatus::PublicKeyNotFound;
        return result;
    };
    result.public_key = Some(key_info.value.clone());
    let key = match public_key_bytes(key_info) {
        Ok(key) => key,
        Err(status) => {
            result.status = status;
            return result;
        }
    };

    let Some(signature) = signature else {
        result.status = VerificationStatus::UnknownSignatureFormat;
        return result;
    };
    let signature = match signature_bytes(signature, default) {
        Ok(signature) => signature,
        Err(status) => {
            result.status = status;
            return result;
        }
    };
    if let Ok((r, s)) = signature.components() {
        result.signature_r = Some(codec::hex_encode(&r));
        result.signature_s = Some(codec::hex_encode(&s));
    }

    match crypto::load_public_key(params.curve, &key) {
        Ok(loaded) => {
            if let Ok(point) = public_key_point(&loaded) {
                result.public_key = Some(codec::hex_encode(&point));
            }
        }
        Err(e) => {
            result.status = match e {
                CryptoError::CurveMismatch { .. } => VerificationStatus::InvalidSignature,
                _ => VerificationStatus::InvalidPublicKey,
            };
            return result.with_diagnostic(e);
        }
    }

    result.status = match crypto::try_verify_signature(params.curve, &key, digest, &signature) {
        Ok(true) => VerificationStatus::ValidSignature,
        Ok(false) => VerificationStatus::InvalidSignature,
        Err(e) => {
            result.diagnostic = Some(e.to_string());
            VerificationStatus::InvalidSignature
        }
    };
    result
}

/// Verify a signature over a digest computed by the caller
pub fn verify_prehashed(
    curve: Curve,
    digest: &[u8],
    key: &PublicKeyInfo,
    signature: &SignatureValue,
) -> VerificationStatus {
    let key = match public_key_bytes(key) {
        Ok(key) => key,
        Err(status) => return status,
    };
    let signature = match signature_bytes(signature, SignatureDefault::Der) {
        Ok(signature) => signature,
        Err(status) => return status,
    };
    match crypto::try_verify_signature(curve, &key, digest, &signature) {
        Ok(true) => VerificationStatus::ValidSignature,
        Ok(false) => VerificationStatus::InvalidSignature,
        Err(CryptoError::InvalidSignature(_)) | Err(CryptoError::CurveMismatch { .. }) => {
            VerificationStatus::InvalidSignature
        }
        Err(_) => VerificationStatus::InvalidPublicKey,
    }
}

// ============================================================================
// Layout inputs
// ============================================================================

/// A field a layout needs
pub fn required<T>(value: Option<T>, field: &str) -> Result<T, ParseError> {
    value.ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, field))
}

/// DLMS unit code of a measurement, from `unitEncoded` or the unit name
pub fn unit_code(measurement: &Measurement) -> Result<u8, ParseError> {
    if let Some(code) = measurement.unit_encoded {
        return Ok(code);
    }
    let unit = required(measurement.unit.as_deref(), "unit")?;
    DlmsUnit::from_name(unit)
        .map(|u| u.code())
        .ok_or_else(|| ParseError::format(ctr_core::keys::INVALID_FIELD, format!("unit {unit}")))
}

// ============================================================================
// Scaled values
// ============================================================================

fn pow10(exponent: u32) -> Result<Decimal, ParseError> {
    10u64
        .checked_pow(exponent)
        .map(Decimal::from)
        .ok_or_else(|| ParseError::format("InvalidScale", exponent.to_string()))
}

/// Register value for a display value: `value / 10^scale`, which must be
/// integral. Negative registers wrap like every other codec cell.
pub fn raw_value(value: Decimal, scale: i8) -> Result<u64, ParseError> {
    let exponent = u32::from(scale.unsigned_abs());
    let shifted = if scale < 0 {
        value.checked_mul(pow10(exponent)?)
    } else {
        value.checked_div(pow10(exponent)?)
    }
    .ok_or_else(|| ParseError::format("InvalidValue", value.to_string()))?;

    if !shifted.fract().is_zero() {
        return Err(ParseError::format(
            "InvalidValue",
            format!("{value} is not a multiple of 10^{scale}"),
        ));
    }
    shifted
        .trunc()
        .to_i128()
        .map(|raw| raw as u64)
        .ok_or_else(|| ParseError::format("InvalidValue", value.to_string()))
}

/// Display value for a register: `raw * 10^scale`
pub fn scaled_value(raw: i64, scale: i8) -> Result<Decimal, ParseError> {
    if scale < 0 {
        let exponent = u32::from(scale.unsigned_abs());
        if exponent > 28 {
            return Err(ParseError::format("InvalidScale", scale.to_string()));
        }
        Ok(Decimal::new(raw, exponent))
    } else {
        Decimal::from(raw)
            .checked_mul(pow10(u32::from(scale as u8))?)
            .ok_or_else(|| ParseError::format("InvalidValue", raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_and_scaled_values() {
        let v = Decimal::from_str("268.978").unwrap();
        assert_eq!(raw_value(v, -3).unwrap(), 268978);
        assert!(raw_value(v, -2).is_err());
        assert_eq!(raw_value(Decimal::from(1200), 2).unwrap(), 12);
        assert_eq!(scaled_value(268978, -3).unwrap(), v);
        assert_eq!(scaled_value(12, 2).unwrap(), Decimal::from(1200));
        assert_eq!(scaled_value(7, 0).unwrap(), Decimal::from(7));
    }

    #[test]
    fn test_signature_decoding() {
        let rs = SignatureValue {
            format: Some("rs".into()),
            r: Some("0102".into()),
            s: Some("0304".into()),
            ..Default::default()
        };
        assert_eq!(
            signature_bytes(&rs, SignatureDefault::Der).unwrap(),
            SignatureBytes::Raw { r: vec![1, 2], s: vec![3, 4] }
        );

        let concatenated = SignatureValue {
            value: Some("01020304".into()),
            ..Default::default()
        };
        assert_eq!(
            signature_bytes(&concatenated, SignatureDefault::Concatenated).unwrap(),
            SignatureBytes::Raw { r: vec![1, 2], s: vec![3, 4] }
        );
        assert_eq!(
            signature_bytes(&concatenated, SignatureDefault::Der).unwrap(),
            SignatureBytes::Der(vec![1, 2, 3, 4])
        );

        let unknown = SignatureValue {
            format: Some("xml-dsig".into()),
            value: Some("00".into()),
            ..Default::default()
        };
        assert_eq!(
            signature_bytes(&unknown, SignatureDefault::Der),
            Err(VerificationStatus::UnknownSignatureFormat)
        );

        let bad_hex = SignatureValue {
            format: Some("DER".into()),
            value: Some("zz".into()),
            ..Default::default()
        };
        assert_eq!(
            signature_bytes(&bad_hex, SignatureDefault::Der),
            Err(VerificationStatus::InvalidSignature)
        );
    }

    #[test]
    fn test_public_key_decoding() {
        let key = PublicKeyInfo {
            format: Some("x509".into()),
            value: "00".into(),
            ..Default::default()
        };
        assert_eq!(public_key_bytes(&key), Err(VerificationStatus::UnknownPublicKeyFormat));

        let key = PublicKeyInfo {
            value: "not hex".into(),
            ..Default::default()
        };
        assert_eq!(public_key_bytes(&key), Err(VerificationStatus::InvalidPublicKey));

        let key = PublicKeyInfo {
            value: "3059".into(),
            ..Default::default()
        };
        assert_eq!(public_key_bytes(&key), Ok(PublicKeyBytes::Der(vec![0x30, 0x59])));
    }

    #[test]
    fn test_params_override() {
        let params = CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp256r1).overridden_by(Some(
            &SignatureInfos {
                hash: Some("SHA512".into()),
                curve: Some("secp384r1".into()),
                hash_truncation: Some(24),
                ..Default::default()
            },
        ));
        assert_eq!(params.hash, HashAlgorithm::Sha512);
        assert_eq!(params.curve, Curve::Secp384r1);
        assert_eq!(params.truncation, Some(24));
    }
}
