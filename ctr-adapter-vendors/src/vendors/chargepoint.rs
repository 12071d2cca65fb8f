//! ChargePointCrypt01
//!
//! Plain JSON export without `@context`: one meter, one session, a list of
//! individually signed readings. Each reading signs a growable layout:
//!
//! ```text
//! meter serial   text, 4-byte length prefix
//! session id     u64 BE
//! timestamp      u64 BE epoch seconds
//! OBIS           6 bytes
//! unit           u8 (DLMS)
//! scale          i8
//! value          u64 BE register
//! EVSE id        text, 4-byte length prefix
//! ```
//!
//! SHA-256, secp256r1, r‖s hex.

use ctr_core::time::parse_timestamp;
use ctr_core::{
    ChargeTransparencyRecord, ChargingSession, ChargingStation, CryptoResult, Curve, DlmsUnit,
    Endian, EnergyMeter, Evse, FormatChecks, HashAlgorithm, LayoutBuilder, Measurement,
    MeasurementValue, Message, Obis, ParseOutcome, PublicKeyInfo, SignatureValue,
};
use serde::{Deserialize, Serialize};

use super::common::{
    layout_failure, raw_value, require_meter, required, scaled_value, unit_code,
    verify_signed_bytes, CryptoParams, SignatureDefault,
};
use super::{finish_record, into_outcome, JsonFormatParser, MeasurementContext, SessionFormat, SessionVerifier};
use crate::error::{ParseError, Result};

const PARAMS: CryptoParams = CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp256r1);

const EXPORT_CHECKS: u32 = 5;
const READING_CHECKS: u32 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargePointExport {
    #[serde(default)]
    pub meter_serial: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub evse_id: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub readings: Option<Vec<ChargePointReading>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargePointReading {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub obis: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub scale: Option<i8>,
    /// Raw register value
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Station id of an EVSE id: everything before the last `*` group
fn station_of(evse_id: &str) -> &str {
    evse_id.rsplit_once('*').map_or(evse_id, |(station, _)| station)
}

fn parse_export(json: &serde_json::Value) -> Result<ParseOutcome> {
    let export: ChargePointExport = serde_json::from_value(json.clone())?;
    let mut checks = FormatChecks::new(EXPORT_CHECKS);

    let meter_serial = checks.require(export.meter_serial.clone(), "meter_serial").unwrap_or_default();
    let session_id = checks.require(export.session_id, "session_id");
    let evse_id = checks.require(export.evse_id.clone(), "evse_id").unwrap_or_else(|| meter_serial.clone());
    let public_key = checks.require(export.public_key.clone(), "public_key");
    let readings = match export.readings {
        Some(readings) if !readings.is_empty() => readings,
        _ => {
            checks.missing_object("readings", READING_CHECKS);
            Vec::new()
        }
    };
    checks.add_checks(READING_CHECKS * readings.len() as u32);

    let first = readings.first().cloned().unwrap_or_default();
    let scale = first.scale.unwrap_or(0);
    let mut values = Vec::with_capacity(readings.len());
    for (i, reading) in readings.iter().enumerate() {
        let position = i + 1;
        let timestamp = reading.timestamp.as_deref().and_then(|t| parse_timestamp(t).ok());
        checks.check(timestamp.is_some(), || {
            Message::new("MissingField").with_param("timestamp").with_param(position)
        });
        checks.check(
            reading.obis.as_deref().is_some_and(|o| Obis::parse_any(o).is_ok()),
            || Message::new("InvalidField").with_param("obis").with_param(position),
        );
        checks.check(
            reading.unit.as_deref().is_some_and(|u| DlmsUnit::from_name(u).is_some()),
            || Message::new("InvalidField").with_param("unit").with_param(position),
        );
        checks.check(reading.value.is_some(), || {
            Message::new("MissingField").with_param("value").with_param(position)
        });
        checks.check(reading.signature.is_some(), || {
            Message::new("MissingField").with_param("signature").with_param(position)
        });
        if reading.scale.unwrap_or(0) != scale {
            checks.warn(Message::new("InconsistentScale").with_param(position));
        }

        values.push(MeasurementValue {
            timestamp,
            value: scaled_value(reading.value.unwrap_or(0), scale)?,
            previous_value: i.checked_sub(1),
            signatures: reading
                .signature
                .iter()
                .map(|sig| SignatureValue {
                    algorithm: Some("ECDSA".into()),
                    format: Some("rs".into()),
                    encoding: Some("hex".into()),
                    value: Some(sig.clone()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
    }

    let meter = EnergyMeter {
        id: meter_serial.clone(),
        public_keys: public_key
            .into_iter()
            .map(|value| PublicKeyInfo {
                algorithm: Some("ECC".into()),
                curve: Some(Curve::Secp256r1.name().into()),
                encoding: Some("hex".into()),
                value,
                meter_id: Some(meter_serial.clone()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    let station_id = station_of(&evse_id).to_string();

    let session = ChargingSession {
        id: session_id.map(|id| id.to_string()),
        context: Some(SessionFormat::ChargePoint.context()),
        begin: values.first().and_then(|v| v.timestamp),
        end: values.last().and_then(|v| v.timestamp),
        evse_id: Some(evse_id.clone()),
        charging_station_id: Some(station_id.clone()),
        meter_id: Some(meter_serial.clone()),
        measurements: vec![Measurement {
            energy_meter_id: Some(meter_serial),
            name: Some("ENERGY_TOTAL".into()),
            obis: first.obis.as_deref().and_then(|o| Obis::parse_any(o).ok()),
            unit: first.unit.clone(),
            scale,
            values,
            ..Default::default()
        }],
        ..Default::default()
    };

    let mut ctr = ChargeTransparencyRecord::new();
    ctr.id = session.id.clone();
    ctr.begin = session.begin;
    ctr.end = session.end;
    ctr.charging_stations.push(ChargingStation {
        id: station_id.clone(),
        evses: vec![Evse {
            id: evse_id,
            charging_station_id: Some(station_id),
            meters: vec![meter],
            ..Default::default()
        }],
        ..Default::default()
    });
    ctr.charging_sessions.push(session);
    Ok(finish_record(ctr, checks))
}

/// Rebuild the bytes signed for one reading
pub fn signed_layout(
    meter_id: &str,
    session: &ChargingSession,
    measurement: &Measurement,
    value: &MeasurementValue,
) -> Result<LayoutBuilder> {
    let session_id: u64 = required(session.id.as_deref(), "session_id")?
        .parse()
        .map_err(|_| ParseError::format(ctr_core::keys::INVALID_FIELD, "session_id"))?;
    let timestamp = required(value.timestamp.as_ref(), "timestamp")?;
    let obis = required(measurement.obis.as_ref(), "obis")?;
    let evse_id = required(session.evse_id.as_deref(), "evse_id")?;

    let mut layout = LayoutBuilder::growable();
    layout
        .push_text_with_length_prefix("meterSerial", meter_id)?
        .push_uint64("sessionId", session_id, Endian::Big)?
        .push_timestamp("timestamp", timestamp, false)?
        .push_obis("obis", obis)?
        .push_uint8("unitEncoded", u64::from(unit_code(measurement)?))?
        .push_int8("scale", i64::from(measurement.scale))?
        .push_uint64("value", raw_value(value.value, measurement.scale)?, Endian::Big)?
        .push_text_with_length_prefix("evseId", evse_id)?;
    Ok(layout)
}

pub struct ChargePointParser;

impl JsonFormatParser for ChargePointParser {
    fn name(&self) -> &'static str {
        "ChargePoint"
    }

    fn try_parse(&self, json: &serde_json::Value) -> ParseOutcome {
        into_outcome(parse_export(json))
    }
}

pub struct ChargePointVerifier;

impl SessionVerifier for ChargePointVerifier {
    fn format(&self) -> SessionFormat {
        SessionFormat::ChargePoint
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
