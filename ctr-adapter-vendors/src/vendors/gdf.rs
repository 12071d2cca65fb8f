//! GDFCrypt01
//!
//! Fixed 320-byte layout, big-endian, zero padded:
//!
//! | Offset | Width | Field |
//! |--------|-------|-------|
//! | 0 | 10 | meter id (hex) |
//! | 10 | 4 | timestamp, epoch seconds |
//! | 23 | 6 | OBIS |
//! | 29 | 1 | unit (DLMS code) |
//! | 30 | 1 | scale |
//! | 31 | 8 | value register |
//! | 41 | var | authorization start id (hex) |
//! | 169 | 4 | authorization start timestamp |
//!
//! SHA-256, secp256r1, raw r/s.

use ctr_core::{
    ChargingSession, CryptoResult, Curve, Endian, HashAlgorithm, LayoutBuilder, Measurement,
    MeasurementValue,
};

use super::common::{
    layout_failure, raw_value, require_meter, required, unit_code, verify_signed_bytes,
    CryptoParams, SignatureDefault,
};
use super::{MeasurementContext, SessionFormat, SessionVerifier};
use crate::error::Result;

pub const LAYOUT_SIZE: usize = 320;

const PARAMS: CryptoParams = CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp256r1);

/// Rebuild the bytes a GDF meter signed for one value
pub fn signed_layout(
    meter_id: &str,
    session: &ChargingSession,
    measurement: &Measurement,
    value: &MeasurementValue,
) -> Result<LayoutBuilder> {
    let timestamp = required(value.timestamp.as_ref(), "timestamp")?;
    let obis = required(measurement.obis.as_ref(), "obis")?;
    let auth = required(session.authorization_start.as_ref(), "authorizationStart")?;
    let auth_timestamp = required(auth.timestamp.as_ref(), "authorizationStart.timestamp")?;

    let mut layout = LayoutBuilder::fixed(LAYOUT_SIZE);
    layout
        .hex_at("meterId", 0, meter_id, false)?
        .timestamp32_at("timestamp", 10, timestamp, false)?
        .obis_at("obis", 23, obis)?
        .uint8_at("unitEncoded", 29, u64::from(unit_code(measurement)?))?
        .int8_at("scale", 30, i64::from(measurement.scale))?
        .uint64_at("value", 31, raw_value(value.value, measurement.scale)?, Endian::Big)?
        .hex_at("authorizationStart", 41, &auth.id, false)?
        .timestamp32_at("authorizationStartTimestamp", 169, auth_timestamp, false)?;
    Ok(layout)
}

pub struct GdfVerifier;

impl SessionVerifier for GdfVerifier {
    fn format(&self) -> SessionFormat {
        SessionFormat::Gdf
    }

    fn verify_measurement(&self, ctx: &MeasurementContext<'_>, value: &MeasurementValue) -> CryptoResult {
        let meter = match require_meter(ctx) {
            Ok(meter) => meter,
            Err(result) => return result,
        };
        let params = PARAMS.for_context(ctx);
        match signed_layout(&meter.id, ctx.session, ctx.measurement, value) {
            Ok(layout) => verify_signed_bytes(ctx, value, &params, layout, SignatureDefault::Concatenated),
            Err(e) => layout_failure(&params, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{session_with_meter, sign_rs, TestKey};
    use ctr_core::VerificationStatus;

    const METER: &str = "0901454d4800007f9f3e";

    #[test]
    fn test_layout_offsets() {
        let (session, _) = session_with_meter(SessionFormat::Gdf, METER, &["268.978", "270.5"], -3);
        let layout = signed_layout(METER, &session, &session.measurements[0], &session.measurements[0].values[0]).unwrap();
        let bytes = layout.bytes();
        assert_eq!(bytes.len(), LAYOUT_SIZE);
        assert_eq!(hex::encode(&bytes[0..10]), METER);
        assert_eq!(hex::encode(&bytes[23..29]), "0100010800ff");
        assert_eq!(bytes[29], 30);
        assert_eq!(bytes[30] as i8, -3);
        assert_eq!(u64::from_be_bytes(bytes[31..39].try_into().unwrap()), 268978);
        assert_eq!(&bytes[41..45], &[0x04, 0x12, 0x34, 0x56]);
        assert!(bytes[45..169].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_verify_valid_and_tampered() {
        let key = TestKey::new(Curve::Secp256r1);
        let (mut session, mut resolver) =
            session_with_meter(SessionFormat::Gdf, METER, &["268.978", "270.5"], -3);
        resolver.meter.public_keys.push(key.info_raw());

        for i in 0..2 {
            let layout = signed_layout(METER, &session, &session.measurements[0], &session.measurements[0].values[i]).unwrap();
            let digest = HashAlgorithm::Sha256.digest(layout.bytes());
            session.measurements[0].values[i].signatures = vec![sign_rs(&key, &digest)];
        }

        let result = GdfVerifier.verify_charging_session(&mut session.clone(), &resolver);
        assert_eq!(result.status, VerificationStatus::ValidSignature);

        session.measurements[0].values[1].value = "270.6".parse().unwrap();
        let result = GdfVerifier.verify_charging_session(&mut session, &resolver);
        assert_eq!(result.status, VerificationStatus::InvalidSignature);
        let trace = session.measurements[0].values[1].result.as_ref().unwrap();
        assert_eq!(trace.status, VerificationStatus::InvalidSignature);
        assert_eq!(trace.buffer.as_ref().unwrap().len(), LAYOUT_SIZE * 2);
        assert!(trace.digest.is_some());
        assert!(trace.signature_r.is_some());
    }

    #[test]
    fn test_missing_key_and_missing_fields() {
        let (mut session, resolver) = session_with_meter(SessionFormat::Gdf, METER, &["1", "2"], 0);
        let result = GdfVerifier.verify_charging_session(&mut session, &resolver);
        assert_eq!(result.status, VerificationStatus::PublicKeyNotFound);

        session.authorization_start = None;
        let result = GdfVerifier.verify_charging_session(&mut session, &resolver);
        assert_eq!(result.status, VerificationStatus::ValidationError);
    }
}
