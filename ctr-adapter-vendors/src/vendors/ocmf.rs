//! Open Charge Metering Format v1.0
//!
//! `OCMF|<payload JSON>|<signature JSON>`. The signature covers the exact
//! payload text, so every measurement value carries that text along and the
//! verifier hashes it unchanged.
//!
//! Grammar enforced while parsing:
//! - `FV` must be `1.0`; other versions are reported, never guessed
//! - `PG` is `T<n>` (transaction) or `F<n>` (fiscal)
//! - `TM` is `yyyy-MM-ddTHH:mm:ss,fff±hhmm <sync>`
//! - `TX`, `RU`, `RT`, `ST` come from fixed letter/unit sets
//!
//! Documents with the same meter serial (`MS`) and identification (`ID`)
//! are joined into one session, readings ordered by pagination.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use ctr_core::{
    Authorization, ChargeTransparencyRecord, ChargingSession, ChargingStation, CryptoField,
    CryptoResult, Curve, EnergyMeter, Evse, FormatChecks, HashAlgorithm, Measurement,
    MeasurementValue, Message, Obis, ParseOutcome, PublicKeyInfo, SignatureValue, TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::common::{
    find_public_key, layout_failure, require_meter, verify_bytes_with_key, CryptoParams,
    SignatureDefault,
};
use super::{finish_record, MeasurementContext, SessionFormat, SessionVerifier};
use crate::error::{ParseError, Result};

pub const OCMF_PREFIX: &str = "OCMF|";
pub const SUPPORTED_VERSION: &str = "1.0";
pub const DEFAULT_SIGNATURE_ALGORITHM: &str = "ECDSA-secp256r1-SHA256";

/// Checks per document, on top of [`READING_CHECKS`] per reading
const DOCUMENT_CHECKS: u32 = 4;
const READING_CHECKS: u32 = 6;

const TRANSACTION_CODES: &str = "BCXELRAPST";
const STATUS_CODES: &str = "GTDRMXIOSEFU";
const SYNC_CODES: &str = "UISR";
const UNITS: [&str; 4] = ["kWh", "Wh", "mOhm", "uOhm"];
const CURRENT_TYPES: [&str; 2] = ["AC", "DC"];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcmfPayload {
    #[serde(rename = "FV", default)]
    pub format_version: Option<String>,
    #[serde(rename = "GI", default)]
    pub gateway_id: Option<String>,
    #[serde(rename = "GS", default)]
    pub gateway_serial: Option<String>,
    #[serde(rename = "GV", default)]
    pub gateway_version: Option<String>,
    #[serde(rename = "PG", default)]
    pub pagination: Option<String>,
    #[serde(rename = "MV", default)]
    pub meter_vendor: Option<String>,
    #[serde(rename = "MM", default)]
    pub meter_model: Option<String>,
    #[serde(rename = "MS", default)]
    pub meter_serial: Option<String>,
    #[serde(rename = "MF", default)]
    pub meter_firmware: Option<String>,
    #[serde(rename = "IS", default)]
    pub identification_status: Option<bool>,
    #[serde(rename = "IL", default)]
    pub identification_level: Option<String>,
    #[serde(rename = "IF", default)]
    pub identification_flags: Vec<String>,
    #[serde(rename = "IT", default)]
    pub identification_type: Option<String>,
    #[serde(rename = "ID", default)]
    pub identification: Option<String>,
    #[serde(rename = "TT", default)]
    pub tariff_text: Option<String>,
    #[serde(rename = "CT", default)]
    pub charge_point_id_type: Option<String>,
    #[serde(rename = "CI", default)]
    pub charge_point_id: Option<String>,
    #[serde(rename = "RD", default)]
    pub readings: Vec<OcmfReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcmfReading {
    #[serde(rename = "TM", default)]
    pub time: Option<String>,
    #[serde(rename = "TX", default)]
    pub transaction: Option<String>,
    #[serde(rename = "RV", with = "ctr_core::types::decimal_text::option", default)]
    pub value: Option<Decimal>,
    #[serde(rename = "RI", default)]
    pub identifier: Option<String>,
    #[serde(rename = "RU", default)]
    pub unit: Option<String>,
    #[serde(rename = "RT", default)]
    pub current_type: Option<String>,
    /// Cumulated loss, kept as an exact decimal
    #[serde(rename = "CL", with = "ctr_core::types::decimal_text::option", default)]
    pub cumulated_loss: Option<Decimal>,
    #[serde(rename = "EF", default)]
    pub error_flags: Option<String>,
    #[serde(rename = "ST", default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcmfSignature {
    #[serde(rename = "SA", default)]
    pub algorithm: Option<String>,
    #[serde(rename = "SE", default)]
    pub encoding: Option<String>,
    #[serde(rename = "SM", default)]
    pub mime_type: Option<String>,
    #[serde(rename = "SD", default)]
    pub data: Option<String>,
}

/// Signed payload text plus signature metadata, stored on every value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcmfSigned {
    pub payload: String,
    pub signature: OcmfSignature,
}

/// One `OCMF|...|...` document
#[derive(Debug, Clone, PartialEq)]
pub struct OcmfDocument {
    pub payload_text: String,
    pub payload: OcmfPayload,
    pub signature: OcmfSignature,
    pub pagination: u64,
    pub transaction_type: TransactionType,
}

// ============================================================================
// Grammar
// ============================================================================

/// Split `PG` into counter kind and number
pub fn parse_pagination(text: &str) -> Result<(TransactionType, u64)> {
    let mut chars = text.chars();
    let kind = match chars.next() {
        Some('T') => TransactionType::Transaction,
        Some('F') => TransactionType::Fiscal,
        _ => return Err(ParseError::format("InvalidPagination", text)),
    };
    let number = chars
        .as_str()
        .parse()
        .map_err(|_| ParseError::format("InvalidPagination", text))?;
    Ok((kind, number))
}

/// `2019-06-26T08:57:44,337+0000 U` → ISO 8601 time plus sync letter
pub fn parse_ocmf_timestamp(text: &str) -> Result<(DateTime<FixedOffset>, Option<char>)> {
    let invalid = || ParseError::format("InvalidTimestamp", text);
    let stamp = text.get(..28).ok_or_else(invalid)?;
    let bytes = stamp.as_bytes();
    let shape_ok = bytes[10] == b'T'
        && bytes[19] == b','
        && (bytes[23] == b'+' || bytes[23] == b'-')
        && stamp.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            13 | 16 => b == b':',
            10 | 19 | 23 => true,
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(invalid());
    }

    let iso = format!("{}:{}", stamp[..26].replace(',', "."), &stamp[26..28]);
    let timestamp = DateTime::parse_from_rfc3339(&iso).map_err(|_| invalid())?;
    let sync = text[28..].trim().chars().next();
    Ok((timestamp, sync))
}

/// `RI` reading identifier. OCMF writes OBIS groups loosely (`1-b:1.8.0`),
/// so any non-numeric group reads as 0 and a missing `*F` as 255.
pub fn parse_reading_identifier(text: &str) -> Option<Obis> {
    let groups: Vec<&str> = text.split(['-', ':', '.', '*']).collect();
    if groups.len() != 5 && groups.len() != 6 {
        return None;
    }
    let mut parts = [0u8, 0, 0, 0, 0, 255];
    for (slot, group) in parts.iter_mut().zip(&groups) {
        *slot = group.trim().parse().unwrap_or(0);
    }
    Some(Obis::new(parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]))
}

/// Curve and hash named by `SA`
pub fn signature_params(algorithm: &str) -> Option<CryptoParams> {
    let mut parts = algorithm.split('-');
    if !parts.next()?.eq_ignore_ascii_case("ECDSA") {
        return None;
    }
    let curve = Curve::from_str(parts.next()?).ok()?;
    let hash = HashAlgorithm::from_str(parts.next()?).ok()?;
    Some(CryptoParams::new(hash, curve))
}

/// Parse one document; grammar violations that make it unreadable reject it
pub fn parse_document(text: &str) -> Result<OcmfDocument> {
    let body = text
        .trim()
        .strip_prefix(OCMF_PREFIX)
        .ok_or_else(|| ParseError::format("InvalidOCMFFormat", "missing OCMF| prefix"))?;
    let (payload_text, signature_text) = body
        .rsplit_once('|')
        .ok_or_else(|| ParseError::format("InvalidOCMFFormat", "missing signature section"))?;

    let payload: OcmfPayload = serde_json::from_str(payload_text)?;
    let signature: OcmfSignature = serde_json::from_str(signature_text.trim())?;

    let version = payload.format_version.as_deref().unwrap_or_default();
    if version != SUPPORTED_VERSION {
        return Err(ParseError::format("UnsupportedOCMFVersion", version));
    }
    let (transaction_type, pagination) =
        parse_pagination(payload.pagination.as_deref().unwrap_or_default())?;

    Ok(OcmfDocument {
        payload_text: payload_text.to_string(),
        payload,
        signature,
        pagination,
        transaction_type,
    })
}

// ============================================================================
// Record building
// ============================================================================

/// One OCMF text with what its container knows about it
#[derive(Debug, Clone, Default)]
pub struct OcmfSource {
    pub text: String,
    pub public_key: Option<PublicKeyInfo>,
    pub evse_id: Option<String>,
}

impl OcmfSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_public_key(mut self, key: PublicKeyInfo) -> Self {
        self.public_key = Some(key);
        self
    }

    pub fn with_evse_id(mut self, evse_id: impl Into<String>) -> Self {
        self.evse_id = Some(evse_id.into());
        self
    }
}

/// Unfinished record so containers can add their own metadata
pub struct OcmfRecord {
    pub ctr: ChargeTransparencyRecord,
    pub checks: FormatChecks,
}

impl OcmfRecord {
    pub fn finish(self) -> ParseOutcome {
        finish_record(self.ctr, self.checks)
    }
}

fn check_reading(reading: &OcmfReading, index: usize, checks: &mut FormatChecks) -> Result<(DateTime<FixedOffset>, Decimal)> {
    let position = index + 1;
    let time = reading
        .time
        .as_deref()
        .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "TM"))?;
    let (timestamp, sync) = parse_ocmf_timestamp(time)?;
    let value = reading
        .value
        .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "RV"))?;

    checks.check(sync.is_some_and(|c| SYNC_CODES.contains(c)), || {
        Message::new("InvalidField").with_param("TM").with_param(position)
    });
    checks.check(
        reading
            .transaction
            .as_deref()
            .is_some_and(|t| t.len() == 1 && TRANSACTION_CODES.contains(t)),
        || Message::new("InvalidField").with_param("TX").with_param(position),
    );
    checks.check(
        reading.unit.as_deref().is_some_and(|u| UNITS.contains(&u)),
        || Message::new("InvalidField").with_param("RU").with_param(position),
    );
    checks.check(
        reading
            .current_type
            .as_deref()
            .map_or(true, |t| CURRENT_TYPES.contains(&t)),
        || Message::new("InvalidField").with_param("RT").with_param(position),
    );
    checks.check(
        reading
            .status
            .as_deref()
            .map_or(true, |s| s.len() == 1 && STATUS_CODES.contains(s)),
        || Message::new("InvalidField").with_param("ST").with_param(position),
    );
    checks.check(
        reading
            .identifier
            .as_deref()
            .map_or(true, |ri| parse_reading_identifier(ri).is_some()),
        || Message::new("InvalidField").with_param("RI").with_param(position),
    );
    Ok((timestamp, value))
}

fn session_from_documents(
    documents: &[(OcmfDocument, &OcmfSource)],
    checks: &mut FormatChecks,
) -> Result<(ChargingSession, EnergyMeter)> {
    let (first, first_source) = &documents[0];
    let meter_id = first.payload.meter_serial.clone().unwrap_or_default();

    let mut values = Vec::new();
    let mut reading_meta: Option<&OcmfReading> = None;
    for (document, _) in documents {
        checks.add_checks(DOCUMENT_CHECKS + READING_CHECKS * document.payload.readings.len() as u32);
        checks.check(!document.payload.readings.is_empty(), || {
            Message::new("MissingField").with_param("RD")
        });
        checks.check(document.signature.data.is_some(), || {
            Message::new("MissingField").with_param("SD")
        });
        checks.check(
            signature_params(document.signature.algorithm.as_deref().unwrap_or(DEFAULT_SIGNATURE_ALGORITHM)).is_some(),
            || Message::new("InvalidField").with_param("SA"),
        );
        checks.check(document.payload.identification.is_some(), || {
            Message::new("MissingField").with_param("ID")
        });

        let signed = serde_json::to_value(OcmfSigned {
            payload: document.payload_text.clone(),
            signature: document.signature.clone(),
        })?;
        for reading in &document.payload.readings {
            let (timestamp, value) = check_reading(reading, values.len(), checks)?;
            reading_meta.get_or_insert(reading);
            values.push(MeasurementValue {
                timestamp: Some(timestamp),
                value,
                info_status: reading.status.clone(),
                pagination_id: Some(document.pagination.to_string()),
                previous_value: values.len().checked_sub(1),
                signatures: vec![SignatureValue {
                    algorithm: document.signature.algorithm.clone(),
                    format: Some(
                        document
                            .signature
                            .mime_type
                            .clone()
                            .unwrap_or_else(|| "application/x-der".into()),
                    ),
                    encoding: Some(document.signature.encoding.clone().unwrap_or_else(|| "hex".into())),
                    value: document.signature.data.clone(),
                    ..Default::default()
                }],
                vendor: Some(signed.clone()),
                ..Default::default()
            });
        }
    }

    let public_keys: Vec<PublicKeyInfo> = documents
        .iter()
        .find_map(|(_, source)| source.public_key.clone())
        .map(|mut key| {
            key.meter_id.get_or_insert_with(|| meter_id.clone());
            key
        })
        .into_iter()
        .collect();

    let meter = EnergyMeter {
        id: meter_id.clone(),
        manufacturer: first.payload.meter_vendor.clone(),
        model: first.payload.meter_model.clone(),
        firmware_version: first.payload.meter_firmware.clone(),
        public_keys,
        ..Default::default()
    };

    let reading = reading_meta.cloned().unwrap_or_default();
    let payload = &first.payload;
    let session = ChargingSession {
        id: Some(format!(
            "{}-{}",
            meter_id,
            payload.identification.as_deref().unwrap_or("unknown")
        )),
        context: Some(SessionFormat::Ocmf.context()),
        begin: values.first().and_then(|v| v.timestamp),
        end: values.last().and_then(|v| v.timestamp),
        evse_id: first_source.evse_id.clone().or_else(|| payload.charge_point_id.clone()),
        meter_id: Some(meter_id.clone()),
        authorization_start: payload.identification.as_ref().map(|id| Authorization {
            id: id.clone(),
            auth_type: payload.identification_type.clone(),
            timestamp: values.first().and_then(|v| v.timestamp),
        }),
        pagination: Some(first.pagination),
        transaction_type: Some(first.transaction_type),
        measurements: vec![Measurement {
            energy_meter_id: Some(meter_id),
            name: Some("ENERGY_TOTAL".into()),
            obis: reading.identifier.as_deref().and_then(parse_reading_identifier),
            unit: reading.unit.clone(),
            value_type: Some("Decimal".into()),
            values,
            ..Default::default()
        }],
        ..Default::default()
    };
    Ok((session, meter))
}

/// Parse OCMF texts into one record; documents are grouped into sessions
/// by meter serial and identification
pub fn parse_sources(sources: &[OcmfSource]) -> Result<OcmfRecord> {
    if sources.is_empty() {
        return Err(ParseError::format("InvalidOCMFFormat", "no OCMF documents"));
    }
    let mut groups: Vec<Vec<(OcmfDocument, &OcmfSource)>> = Vec::new();
    let mut index: HashMap<(Option<String>, Option<String>), usize> = HashMap::new();
    for source in sources {
        let document = parse_document(&source.text)?;
        let key = (
            document.payload.meter_serial.clone(),
            document.payload.identification.clone(),
        );
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push((document, source));
    }

    let mut checks = FormatChecks::new(0);
    let mut ctr = ChargeTransparencyRecord::new();
    for mut group in groups {
        group.sort_by_key(|(document, _)| document.pagination);
        let (mut session, meter) = session_from_documents(&group, &mut checks)?;
        let payload = &group[0].0.payload;
        let station_id = payload
            .gateway_serial
            .clone()
            .or_else(|| payload.gateway_id.clone())
            .unwrap_or_else(|| meter.id.clone());
        let evse_id = session.evse_id.clone().unwrap_or_else(|| meter.id.clone());
        session.evse_id = Some(evse_id.clone());
        session.charging_station_id = Some(station_id.clone());
        debug!(
            "OCMF: session {:?} from {} document(s)",
            session.id,
            group.len()
        );

        ctr.charging_stations.push(ChargingStation {
            id: station_id.clone(),
            serial_number: payload.gateway_serial.clone(),
            firmware_version: payload.gateway_version.clone(),
            evses: vec![Evse {
                id: evse_id,
                charging_station_id: Some(station_id),
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
    Ok(OcmfRecord { ctr, checks })
}

// ============================================================================
// Verification
// ============================================================================

pub struct OcmfVerifier;

impl SessionVerifier for OcmfVerifier {
    fn format(&self) -> SessionFormat {
        SessionFormat::Ocmf
    }

    fn verify_measurement(&self, ctx: &MeasurementContext<'_>, value: &MeasurementValue) -> CryptoResult {
        if let Err(result) = require_meter(ctx) {
            return result;
        }
        let default = CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp256r1);
        let signed = match value
            .vendor
            .clone()
            .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "OCMF payload"))
            .and_then(|v| serde_json::from_value::<OcmfSigned>(v).map_err(ParseError::from))
        {
            Ok(signed) => signed,
            Err(e) => return layout_failure(&default, e),
        };

        let algorithm = signed
            .signature
            .algorithm
            .as_deref()
            .unwrap_or(DEFAULT_SIGNATURE_ALGORITHM);
        let Some(params) = signature_params(algorithm) else {
            return CryptoResult::new(ctr_core::VerificationStatus::UnknownSignatureFormat)
                .with_diagnostic(format!("SA {algorithm}"));
        };
        let params = params.for_context(ctx);

        let bytes = signed.payload.as_bytes();
        let fields = vec![CryptoField {
            name: "payload".into(),
            value: signed.payload.clone(),
            hex: ctr_core::codec::hex_encode(bytes),
        }];
        verify_bytes_with_key(
            &params,
            bytes,
            fields,
            find_public_key(ctx),
            value.signatures.first(),
            SignatureDefault::Der,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::testutil::TestKey;
    use ctr_core::{codec, VerificationStatus};

    pub(crate) const SAMPLE_PAYLOAD: &str = r#"{"FV":"1.0","GI":"KEBA_KCP30","GS":"17619300","GV":"2.8.5","PG":"T9289","MV":"Phoenix Contact","MM":"EEM-350-D-MCB","MS":"BQ27400330016","MF":"1.0","IS":true,"IL":"VERIFIED","IF":["RFID_PLAIN","OCPP_RS_TLS"],"IT":"ISO14443","ID":"1F2D3A4F5506C7","RD":[{"TM":"2019-06-26T08:57:44,337+0000 U","TX":"B","RV":268.978,"RI":"1-b:1.8.0","RU":"kWh","ST":"G"}]}"#;

    /// Sign a payload and wrap it into an OCMF document
    pub(crate) fn signed_document(key: &TestKey, payload: &str) -> String {
        let digest = HashAlgorithm::Sha256.digest(payload.as_bytes());
        let der = key.sign(&digest).to_der().unwrap();
        format!(
            "OCMF|{}|{{\"SA\":\"ECDSA-secp256r1-SHA256\",\"SD\":\"{}\"}}",
            payload,
            codec::hex_encode(&der)
        )
    }

    pub(crate) fn reading_payload(pagination: &str, tx: &str, time: &str, value: &str) -> String {
        format!(
            r#"{{"FV":"1.0","GI":"KEBA_KCP30","GS":"17619300","PG":"{pagination}","MV":"Phoenix Contact","MS":"BQ27400330016","IT":"ISO14443","ID":"1F2D3A4F5506C7","RD":[{{"TM":"{time}","TX":"{tx}","RV":{value},"RI":"1-b:1.8.0","RU":"kWh","ST":"G"}}]}}"#
        )
    }

    #[test]
    fn test_timestamp_grammar() {
        let (ts, sync) = parse_ocmf_timestamp("2019-06-26T08:57:44,337+0000 U").unwrap();
        assert_eq!(ts.to_rfc3339(), "2019-06-26T08:57:44.337+00:00");
        assert_eq!(sync, Some('U'));

        let (ts, _) = parse_ocmf_timestamp("2020-01-01T10:00:00,000+0130 S").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 5400);

        assert!(parse_ocmf_timestamp("2019-06-26T08:57:44.337+00:00 U").is_err());
        assert!(parse_ocmf_timestamp("2019-06-26T08:57:44,337").is_err());
    }

    #[test]
    fn test_pagination_and_identifier() {
        assert_eq!(parse_pagination("T9289").unwrap(), (TransactionType::Transaction, 9289));
        assert_eq!(parse_pagination("F12").unwrap(), (TransactionType::Fiscal, 12));
        assert!(parse_pagination("X12").is_err());
        assert!(parse_pagination("T").is_err());

        assert_eq!(parse_reading_identifier("1-b:1.8.0"), Some(Obis::ENERGY_IMPORT));
        assert_eq!(
            parse_reading_identifier("1-0:2.8.0*255"),
            Some(Obis::new(1, 0, 2, 8, 0, 255))
        );
        assert_eq!(parse_reading_identifier("1.8.0"), None);
    }

    #[test]
    fn test_single_document_session() {
        let text = format!("OCMF|{}|{{\"SD\":\"3044\"}}", SAMPLE_PAYLOAD);
        let record = parse_sources(&[OcmfSource::new(text)]).unwrap();
        let session = &record.ctr.charging_sessions[0];

        let expected = parse_ocmf_timestamp("2019-06-26T08:57:44,337+0000 U").unwrap().0;
        assert_eq!(session.begin, Some(expected));
        assert_eq!(session.end, Some(expected));
        assert_eq!(session.pagination, Some(9289));
        assert_eq!(session.transaction_type, Some(TransactionType::Transaction));
        let measurement = &session.measurements[0];
        assert_eq!(measurement.obis, Some(Obis::ENERGY_IMPORT));
        assert_eq!(measurement.values[0].value, Decimal::from_str("268.978").unwrap());
        assert!(record.checks.errors().is_empty());
    }

    #[test]
    fn test_unsupported_version_is_reported() {
        let payload = SAMPLE_PAYLOAD.replace("\"FV\":\"1.0\"", "\"FV\":\"1.1\"");
        let err = parse_document(&format!("OCMF|{payload}|{{}}")).unwrap_err();
        assert_eq!(err.message_key(), "UnsupportedOCMFVersion");

        let payload = SAMPLE_PAYLOAD.replace("T9289", "Q9289");
        let err = parse_document(&format!("OCMF|{payload}|{{}}")).unwrap_err();
        assert_eq!(err.message_key(), "InvalidPagination");
    }

    #[test]
    fn test_bad_unit_lowers_certainty() {
        let payload = SAMPLE_PAYLOAD.replace("\"RU\":\"kWh\"", "\"RU\":\"kW\"");
        let record = parse_sources(&[OcmfSource::new(format!("OCMF|{payload}|{{\"SD\":\"00\"}}"))]).unwrap();
        assert_eq!(record.checks.errors()[0].params, vec!["RU".to_string(), "1".to_string()]);
        assert!(record.checks.certainty() < 1.0);
    }

    #[test]
    fn test_joined_documents_verify() {
        let key = TestKey::new(Curve::Secp256r1);
        let begin = signed_document(&key, &reading_payload("T2", "B", "2019-06-26T08:57:44,337+0000 S", "268.978"));
        let end = signed_document(&key, &reading_payload("T3", "E", "2019-06-26T09:40:02,000+0000 S", "275.011"));

        // out of order on purpose
        let sources = [
            OcmfSource::new(end).with_public_key(key.info_der()),
            OcmfSource::new(begin),
        ];
        let mut ctr = match parse_sources(&sources).unwrap().finish() {
            ParseOutcome::Record(ctr) => ctr,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(ctr.charging_sessions.len(), 1);
        let values = &ctr.charging_sessions[0].measurements[0].values;
        assert_eq!(values[0].value, Decimal::from_str("268.978").unwrap());
        assert_eq!(values[1].value, Decimal::from_str("275.011").unwrap());

        Assembler::new().assemble(&mut ctr);
        let result = ctr.charging_sessions[0].verification_result.as_ref().unwrap();
        assert_eq!(result.status, VerificationStatus::ValidSignature);
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = TestKey::new(Curve::Secp256r1);
        let begin = signed_document(&key, &reading_payload("T2", "B", "2019-06-26T08:57:44,337+0000 S", "268.978"));
        let end = signed_document(&key, &reading_payload("T3", "E", "2019-06-26T09:40:02,000+0000 S", "275.011"))
            .replace("275.011", "285.011");
        let sources = [
            OcmfSource::new(begin).with_public_key(key.info_der()),
            OcmfSource::new(end),
        ];
        let ParseOutcome::Record(mut ctr) = parse_sources(&sources).unwrap().finish() else {
            panic!("expected record");
        };
        Assembler::new().assemble(&mut ctr);
        let session = &ctr.charging_sessions[0];
        assert_eq!(
            session.verification_result.as_ref().unwrap().status,
            VerificationStatus::InvalidSignature
        );
        assert_eq!(
            session.measurements[0].values[0].result.as_ref().unwrap().status,
            VerificationStatus::ValidSignature
        );
    }
}
