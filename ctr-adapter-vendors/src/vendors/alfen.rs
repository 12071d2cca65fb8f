//! AlfenCrypt01
//!
//! `AP;<version>;<key type>;<public key>;<blob>;<signature>;` with every
//! binary field base32. The blob is the 86 signed bytes, little-endian:
//!
//! | Offset | Width | Field |
//! |--------|-------|-------|
//! | 0 | 10 | adapter id |
//! | 10 | 4 | adapter firmware version (ASCII) |
//! | 14 | 2 | adapter firmware checksum |
//! | 16 | 10 | meter id |
//! | 26 | 4 | meter status |
//! | 30 | 4 | adapter status |
//! | 34 | 4 | second index |
//! | 38 | 4 | timestamp, epoch seconds |
//! | 42 | 6 | OBIS |
//! | 48 | 1 | unit |
//! | 49 | 1 | scale |
//! | 50 | 8 | value |
//! | 58 | 20 | uid (ASCII, zero padded) |
//! | 78 | 4 | session id |
//! | 82 | 4 | paging |
//!
//! Key type 3 is secp192r1, 4 is secp256r1. SHA-256, raw r‖s.

use std::collections::HashMap;

use ctr_core::time::from_epoch;
use ctr_core::{
    codec, Authorization, ChargeTransparencyRecord, ChargingSession, ChargingStation, CryptoResult,
    Curve, Endian, EnergyMeter, Evse, FormatChecks, HashAlgorithm, LayoutBuilder, Measurement,
    MeasurementValue, Message, Obis, ParseOutcome, PublicKeyInfo, SignatureInfos, SignatureValue,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::common::{
    layout_failure, require_meter, scaled_value, verify_signed_bytes, CryptoParams,
    SignatureDefault,
};
use super::{finish_record, MeasurementContext, SessionFormat, SessionVerifier};
use crate::error::{ParseError, Result};

pub const ALFEN_PREFIX: &str = "AP;";
pub const BLOB_SIZE: usize = 86;

const DOCUMENT_CHECKS: u32 = 4;

/// Decoded blob cells, stored on each measurement value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlfenFields {
    pub adapter_id: String,
    pub adapter_firmware_version: String,
    pub adapter_firmware_checksum: u64,
    pub meter_id: String,
    pub meter_status: u64,
    pub adapter_status: u64,
    pub second_index: u64,
    pub timestamp: u64,
    pub obis: Obis,
    pub unit: u8,
    pub scale: i8,
    pub value: u64,
    pub uid: String,
    pub session_id: u64,
    pub paging: u64,
}

impl AlfenFields {
    /// Decode the 86-byte blob
    pub fn decode(blob: &[u8]) -> Result<Self> {
        if blob.len() != BLOB_SIZE {
            return Err(ParseError::format("InvalidAlfenBlob", format!("{} bytes", blob.len())));
        }
        let text = |range: std::ops::Range<usize>| {
            String::from_utf8(blob[range].iter().copied().take_while(|b| *b != 0).collect())
                .map_err(|_| ParseError::from(ctr_core::EncodingError::InvalidUtf8))
        };
        Ok(Self {
            adapter_id: codec::hex_encode(&blob[0..10]),
            adapter_firmware_version: text(10..14)?,
            adapter_firmware_checksum: codec::get_uint16(blob, 14, Endian::Little)?,
            meter_id: codec::hex_encode(&blob[16..26]),
            meter_status: codec::get_uint32(blob, 26, Endian::Little)?,
            adapter_status: codec::get_uint32(blob, 30, Endian::Little)?,
            second_index: codec::get_uint32(blob, 34, Endian::Little)?,
            timestamp: codec::get_uint32(blob, 38, Endian::Little)?,
            obis: Obis::from_bytes(&blob[42..48])?,
            unit: codec::get_uint8(blob, 48)? as u8,
            scale: codec::get_int8(blob, 49)? as i8,
            value: codec::get_uint64(blob, 50, Endian::Little)?,
            uid: text(58..78)?,
            session_id: codec::get_uint32(blob, 78, Endian::Little)?,
            paging: codec::get_uint32(blob, 82, Endian::Little)?,
        })
    }
}

/// Re-encode the signed bytes from decoded cells
pub fn signed_layout(fields: &AlfenFields) -> Result<LayoutBuilder> {
    let mut layout = LayoutBuilder::fixed(BLOB_SIZE);
    layout
        .hex_at("adapterId", 0, &fields.adapter_id, false)?
        .text_at("adapterFirmwareVersion", 10, &fields.adapter_firmware_version)?
        .uint16_at("adapterFirmwareChecksum", 14, fields.adapter_firmware_checksum, Endian::Little)?
        .hex_at("meterId", 16, &fields.meter_id, false)?
        .uint32_at("meterStatus", 26, fields.meter_status, Endian::Little)?
        .uint32_at("adapterStatus", 30, fields.adapter_status, Endian::Little)?
        .uint32_at("secondIndex", 34, fields.second_index, Endian::Little)?
        .uint32_at("timestamp", 38, fields.timestamp, Endian::Little)?
        .obis_at("obis", 42, &fields.obis)?
        .uint8_at("unit", 48, u64::from(fields.unit))?
        .int8_at("scale", 49, i64::from(fields.scale))?
        .uint64_at("value", 50, fields.value, Endian::Little)?
        .text_at("uid", 58, &fields.uid)?
        .uint32_at("sessionId", 78, fields.session_id, Endian::Little)?
        .uint32_at("paging", 82, fields.paging, Endian::Little)?;
    Ok(layout)
}

pub fn curve_for_key_type(key_type: &str) -> Option<Curve> {
    match key_type.trim() {
        "3" => Some(Curve::Secp192r1),
        "4" => Some(Curve::Secp256r1),
        _ => None,
    }
}

/// One `AP;` line, split and decoded
#[derive(Debug, Clone)]
pub struct AlfenDocument {
    pub version: String,
    pub curve: Option<Curve>,
    pub public_key: String,
    pub public_key_len: usize,
    pub blob: Vec<u8>,
    pub signature: String,
    pub fields: AlfenFields,
}

pub fn parse_document(text: &str) -> Result<AlfenDocument> {
    let body = text
        .trim()
        .strip_prefix(ALFEN_PREFIX)
        .ok_or_else(|| ParseError::format("InvalidAlfenFormat", "missing AP; prefix"))?;
    let parts: Vec<&str> = body.trim_end_matches(';').split(';').collect();
    let &[version, key_type, public_key, blob, signature] = parts.as_slice() else {
        return Err(ParseError::format(
            "InvalidAlfenFormat",
            format!("{} fields", parts.len()),
        ));
    };
    let blob = codec::base32_decode(blob)?;
    let fields = AlfenFields::decode(&blob)?;
    let public_key_len = codec::base32_decode(public_key).map(|k| k.len()).unwrap_or(0);
    Ok(AlfenDocument {
        version: version.to_string(),
        curve: curve_for_key_type(key_type),
        public_key: public_key.to_string(),
        public_key_len,
        blob,
        signature: signature.to_string(),
        fields,
    })
}

/// One `AP;` text with what its container knows about it
#[derive(Debug, Clone, Default)]
pub struct AlfenSource {
    pub text: String,
    pub evse_id: Option<String>,
}

impl AlfenSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            evse_id: None,
        }
    }
}

/// Unfinished record so containers can add their own metadata
pub struct AlfenRecord {
    pub ctr: ChargeTransparencyRecord,
    pub checks: FormatChecks,
}

impl AlfenRecord {
    pub fn finish(self) -> ParseOutcome {
        finish_record(self.ctr, self.checks)
    }
}

fn key_info(document: &AlfenDocument, meter_id: &str) -> PublicKeyInfo {
    let curve = document.curve.unwrap_or(Curve::Secp192r1);
    let raw = document.public_key_len == 2 * curve.field_size()
        || document.public_key_len == 2 * curve.field_size() + 1;
    PublicKeyInfo {
        algorithm: Some("ECC".into()),
        curve: Some(curve.name().into()),
        format: Some(if raw { "raw" } else { "DER" }.into()),
        encoding: Some("base32".into()),
        value: document.public_key.clone(),
        meter_id: Some(meter_id.to_string()),
        ..Default::default()
    }
}

fn value_from(document: &AlfenDocument, index: usize, checks: &mut FormatChecks) -> Result<MeasurementValue> {
    let position = index + 1;
    let fields = &document.fields;
    checks.check(!document.version.is_empty(), || {
        Message::new("MissingField").with_param("version").with_param(position)
    });
    checks.check(document.curve.is_some(), || {
        Message::new("InvalidField").with_param("keyType").with_param(position)
    });
    checks.check(document.public_key_len > 0, || {
        Message::new("InvalidField").with_param("publicKey").with_param(position)
    });
    let reencoded = signed_layout(fields)?;
    checks.check(reencoded.bytes() == document.blob.as_slice(), || {
        Message::new("InvalidField").with_param("blob").with_param(position)
    });

    Ok(MeasurementValue {
        timestamp: Some(from_epoch(fields.timestamp as i64, 0)?),
        value: scaled_value(fields.value as i64, fields.scale)?,
        info_status: Some(format!("{:08x}", fields.meter_status)),
        seconds_index: Some(fields.second_index),
        pagination_id: Some(fields.paging.to_string()),
        previous_value: index.checked_sub(1),
        signatures: vec![SignatureValue {
            algorithm: Some("ECDSA".into()),
            format: Some("rs".into()),
            encoding: Some("base32".into()),
            value: Some(document.signature.clone()),
            ..Default::default()
        }],
        vendor: Some(serde_json::to_value(fields)?),
        ..Default::default()
    })
}

/// Parse `AP;` texts into one record; documents are grouped into sessions
/// by meter id and session id
pub fn parse_sources(sources: &[AlfenSource]) -> Result<AlfenRecord> {
    if sources.is_empty() {
        return Err(ParseError::format("InvalidAlfenFormat", "no AP; documents"));
    }
    let mut groups: Vec<Vec<(AlfenDocument, &AlfenSource)>> = Vec::new();
    let mut index: HashMap<(String, u64), usize> = HashMap::new();
    for source in sources {
        let document = parse_document(&source.text)?;
        let key = (document.fields.meter_id.clone(), document.fields.session_id);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push((document, source));
    }

    let mut checks = FormatChecks::new(0);
    let mut ctr = ChargeTransparencyRecord::new();
    for mut group in groups {
        group.sort_by_key(|(document, _)| document.fields.paging);
        checks.add_checks(DOCUMENT_CHECKS * group.len() as u32);

        let values = group
            .iter()
            .enumerate()
            .map(|(i, (document, _))| value_from(document, i, &mut checks))
            .collect::<Result<Vec<_>>>()?;
        let (first, source) = &group[0];
        let fields = &first.fields;
        let curve = first.curve.unwrap_or(Curve::Secp192r1);

        let meter = EnergyMeter {
            id: fields.meter_id.clone(),
            signature_infos: Some(SignatureInfos {
                hash: Some(HashAlgorithm::Sha256.name().into()),
                algorithm: Some("ECDSA".into()),
                curve: Some(curve.name().into()),
                format: Some("rs".into()),
                encoding: Some("base32".into()),
                ..Default::default()
            }),
            public_keys: vec![key_info(first, &fields.meter_id)],
            ..Default::default()
        };
        let evse_id = source.evse_id.clone().unwrap_or_else(|| fields.meter_id.clone());

        let session = ChargingSession {
            id: Some(format!("{}-{}", fields.meter_id, fields.session_id)),
            context: Some(SessionFormat::Alfen.context()),
            begin: values.first().and_then(|v| v.timestamp),
            end: values.last().and_then(|v| v.timestamp),
            evse_id: Some(evse_id.clone()),
            charging_station_id: Some(fields.adapter_id.clone()),
            meter_id: Some(fields.meter_id.clone()),
            authorization_start: (!fields.uid.is_empty()).then(|| Authorization {
                id: fields.uid.clone(),
                auth_type: Some("RFID".into()),
                timestamp: values.first().and_then(|v| v.timestamp),
            }),
            measurements: vec![Measurement {
                energy_meter_id: Some(fields.meter_id.clone()),
                name: Some("ENERGY_TOTAL".into()),
                obis: Some(fields.obis),
                unit_encoded: Some(fields.unit),
                scale: fields.scale,
                values,
                ..Default::default()
            }],
            ..Default::default()
        };
        debug!("Alfen: session {:?} from {} document(s)", session.id, group.len());

        ctr.charging_stations.push(ChargingStation {
            id: fields.adapter_id.clone(),
            firmware_version: Some(fields.adapter_firmware_version.clone()),
            evses: vec![Evse {
                id: evse_id,
                charging_station_id: Some(fields.adapter_id.clone()),
                meters: vec![meter],
                ..Default::default()
            }],
            ..Default::default()
        });
        ctr.begin = match (ctr.begin, session.begin) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        ctr.end = match (ctr.end, session.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        ctr.charging_sessions.push(session);
    }
    ctr.id = ctr.charging_sessions.first().and_then(|s| s.id.clone());
    Ok(AlfenRecord { ctr, checks })
}

pub struct AlfenVerifier;

impl SessionVerifier for AlfenVerifier {
    fn format(&self) -> SessionFormat {
        SessionFormat::Alfen
    }

    fn verify_measurement(&self, ctx: &MeasurementContext<'_>, value: &MeasurementValue) -> CryptoResult {
        if let Err(result) = require_meter(ctx) {
            return result;
        }
        let params = CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp192r1).for_context(ctx);
        let fields = value
            .vendor
            .clone()
            .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "Alfen blob"))
            .and_then(|v| serde_json::from_value::<AlfenFields>(v).map_err(ParseError::from));
        match fields.and_then(|f| signed_layout(&f)) {
            Ok(layout) => verify_signed_bytes(ctx, value, &params, layout, SignatureDefault::Concatenated),
            Err(e) => layout_failure(&params, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::testutil::TestKey;
    use ctr_core::VerificationStatus;

    pub(crate) fn fields(paging: u64, value: u64) -> AlfenFields {
        AlfenFields {
            adapter_id: "0a0b0c0d0e0f10111213".into(),
            adapter_firmware_version: "1.4A".into(),
            adapter_firmware_checksum: 0xbeef,
            meter_id: "0901454d4800007f9f3e".into(),
            meter_status: 0x01,
            adapter_status: 0x00,
            second_index: 5000 + paging,
            timestamp: 1_600_000_000 + 60 * paging,
            obis: Obis::ENERGY_IMPORT,
            unit: 30,
            scale: 0,
            value,
            uid: "04A1B2C3D4".into(),
            session_id: 77,
            paging,
        }
    }

    /// `AP;` line signed with `key`
    pub(crate) fn signed_line(key: &TestKey, fields: &AlfenFields) -> String {
        let blob = signed_layout(fields).unwrap().into_parts().0;
        let digest = HashAlgorithm::Sha256.digest(&blob);
        let key_type = if key.curve == Curve::Secp256r1 { "4" } else { "3" };
        format!(
            "AP;0;{};{};{};{};",
            key_type,
            codec::base32_encode(&key.point()[1..]),
            codec::base32_encode(&blob),
            codec::base32_encode(&key.sign_concatenated(&digest))
        )
    }

    #[test]
    fn test_blob_round_trip() {
        let f = fields(3, 12345);
        let blob = signed_layout(&f).unwrap().into_parts().0;
        assert_eq!(blob.len(), BLOB_SIZE);
        assert_eq!(AlfenFields::decode(&blob).unwrap(), f);
        assert_eq!(&blob[78..82], &[77, 0, 0, 0]);
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        let err = parse_document("AP;0;3;AAAA;").unwrap_err();
        assert_eq!(err.message_key(), "InvalidAlfenFormat");
    }

    #[test]
    fn test_session_verifies_on_secp192r1() {
        let key = TestKey::new(Curve::Secp192r1);
        let sources = [
            AlfenSource::new(signed_line(&key, &fields(2, 2000))),
            AlfenSource::new(signed_line(&key, &fields(1, 1000))),
        ];
        let record = parse_sources(&sources).unwrap();
        assert!(record.checks.errors().is_empty());
        let ParseOutcome::Record(mut ctr) = record.finish() else {
            panic!("expected record");
        };
        let values = &ctr.charging_sessions[0].measurements[0].values;
        assert_eq!(values[0].pagination_id.as_deref(), Some("1"));

        Assembler::new().assemble(&mut ctr);
        assert_eq!(
            ctr.charging_sessions[0].verification_result.as_ref().unwrap().status,
            VerificationStatus::ValidSignature
        );
    }
}
