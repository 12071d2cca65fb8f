//! BSMCrypt01 (BAUER BSM-WS36A snapshots)
//!
//! Each signed data set is one meter snapshot. The signed bytes are a
//! growable layout:
//!
//! ```text
//! meterId     text, 4-byte length prefix
//! Typ RCR TotWhImp W RCnt OS Epoch TZO EpochSetCnt EpochSetOS DI DO
//!             each: u32 value, i8 scale, u8 unit
//! Meta1 Meta2 Meta3   text, 4-byte length prefix
//! Evt         u32 value, i8 scale, u8 unit
//! ```
//!
//! SHA-256, secp256r1, DER signature, DER SubjectPublicKeyInfo key.
//!
//! Consistency rules across a session's snapshots:
//! - first is `START` or `TURN ON`, last is `END` or `TURN OFF`, the rest
//!   `CURRENT`
//! - `RCnt`, `OS`, `Epoch` strictly increase; `time` and `TotWhImp` never
//!   decrease; the meter id never changes
//! - `Meta1` reads `contract-id: <type>:<id>`

use chrono::{DateTime, FixedOffset};
use ctr_core::time::parse_timestamp;
use ctr_core::{
    ChargeTransparencyRecord, ChargingSession, ChargingStationOperator, Contract, CryptoResult,
    Curve, EnergyMeter, Evse, FormatChecks, HashAlgorithm, LayoutBuilder, Measurement,
    MeasurementValue, Message, Obis, ParseOutcome, PublicKeyInfo, SignatureInfos, SignatureValue,
    Authorization,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::common::{
    layout_failure, require_meter, scaled_value, verify_signed_bytes, CryptoParams,
    SignatureDefault,
};
use super::{finish_record, into_outcome, JsonFormatParser, MeasurementContext, SessionFormat, SessionVerifier};
use crate::error::{ParseError, Result};

/// `@context` carried by every BSM data set
pub const BSM_CONTEXT: &str = "https://www.chargeit-mobility.com/contexts/bsm-ws36a-json-v1";

/// Format checks performed per data set: 21 field checks plus sequencing
pub const CHECKS_PER_DATA_SET: u32 = 22;

/// Key of a snapshot-sequence error; parameter is the 1-based position
pub const INCONSISTENT_VALUE: &str = "Inconsistent_EnergyMeterValueP";

const PARAMS: CryptoParams = CryptoParams::new(HashAlgorithm::Sha256, Curve::Secp256r1);

const ADDITIONAL_CELLS: [&str; 11] = [
    "TotWhImp", "W", "RCnt", "OS", "Epoch", "TZO", "EpochSetCnt", "EpochSetOS", "DI", "DO", "Evt",
];
const ADDITIONAL_TEXTS: [&str; 3] = ["Meta1", "Meta2", "Meta3"];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmDataSet {
    #[serde(rename = "@context", default)]
    pub context: Option<String>,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub meter_info: Option<BsmMeterInfo>,
    #[serde(default)]
    pub contract: Option<BsmContract>,
    #[serde(default)]
    pub measurement_id: Option<u64>,
    #[serde(default)]
    pub value: Option<BsmValue>,
    #[serde(default)]
    pub additional_values: Option<Vec<BsmValue>>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmMeterInfo {
    #[serde(default)]
    pub meter_id: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(rename = "type", default)]
    pub meter_type: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BsmContract {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub contract_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmValue {
    #[serde(default)]
    pub measurand: Option<BsmMeasurand>,
    #[serde(default)]
    pub measured_value: Option<BsmMeasuredValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BsmMeasurand {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmMeasuredValue {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub scale: Option<i8>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_encoded: Option<u8>,
    #[serde(default)]
    pub value_type: Option<String>,
}

impl BsmMeasuredValue {
    fn integer(&self) -> Option<i64> {
        match self.value.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotType {
    #[serde(rename = "CURRENT")]
    Current,
    #[serde(rename = "TURN ON")]
    TurnOn,
    #[serde(rename = "TURN OFF")]
    TurnOff,
    #[serde(rename = "START")]
    Start,
    #[serde(rename = "END")]
    End,
}

impl SnapshotType {
    pub fn code(&self) -> u64 {
        match self {
            SnapshotType::Current => 0,
            SnapshotType::TurnOn => 1,
            SnapshotType::TurnOff => 2,
            SnapshotType::Start => 3,
            SnapshotType::End => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SnapshotType::Current => "CURRENT",
            SnapshotType::TurnOn => "TURN ON",
            SnapshotType::TurnOff => "TURN OFF",
            SnapshotType::Start => "START",
            SnapshotType::End => "END",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "CURRENT" => Some(SnapshotType::Current),
            "TURN ON" => Some(SnapshotType::TurnOn),
            "TURN OFF" => Some(SnapshotType::TurnOff),
            "START" => Some(SnapshotType::Start),
            "END" => Some(SnapshotType::End),
            _ => None,
        }
    }
}

/// Register cell: raw value, scale exponent, DLMS unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BsmCell {
    pub value: i64,
    pub scale: i8,
    pub unit: u8,
}

impl BsmCell {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            scale: 0,
            unit: 255,
        }
    }
}

/// Signed fields of one snapshot, stored on the measurement value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BsmSnapshot {
    pub meter_id: String,
    pub typ: SnapshotType,
    pub rcr: BsmCell,
    pub tot_wh_imp: BsmCell,
    pub w: BsmCell,
    pub rcnt: BsmCell,
    pub os: BsmCell,
    pub epoch: BsmCell,
    pub tzo: BsmCell,
    pub epoch_set_cnt: BsmCell,
    pub epoch_set_os: BsmCell,
    pub di: BsmCell,
    #[serde(rename = "do")]
    pub do_: BsmCell,
    pub meta1: String,
    pub meta2: String,
    pub meta3: String,
    pub evt: BsmCell,
}

impl BsmSnapshot {
    /// Snapshot with zeroed registers
    pub fn new(meter_id: impl Into<String>, typ: SnapshotType) -> Self {
        Self {
            meter_id: meter_id.into(),
            typ,
            rcr: BsmCell::default(),
            tot_wh_imp: BsmCell::default(),
            w: BsmCell::default(),
            rcnt: BsmCell::default(),
            os: BsmCell::default(),
            epoch: BsmCell::default(),
            tzo: BsmCell::default(),
            epoch_set_cnt: BsmCell::default(),
            epoch_set_os: BsmCell::default(),
            di: BsmCell::default(),
            do_: BsmCell::default(),
            meta1: String::new(),
            meta2: String::new(),
            meta3: String::new(),
            evt: BsmCell::default(),
        }
    }

    fn cells(&self) -> [(&'static str, &BsmCell); 11] {
        [
            ("RCR", &self.rcr),
            ("TotWhImp", &self.tot_wh_imp),
            ("W", &self.w),
            ("RCnt", &self.rcnt),
            ("OS", &self.os),
            ("Epoch", &self.epoch),
            ("TZO", &self.tzo),
            ("EpochSetCnt", &self.epoch_set_cnt),
            ("EpochSetOS", &self.epoch_set_os),
            ("DI", &self.di),
            ("DO", &self.do_),
        ]
    }
}

/// Rebuild the signed bytes of a snapshot
pub fn signed_layout(snapshot: &BsmSnapshot) -> Result<LayoutBuilder> {
    let mut layout = LayoutBuilder::growable();
    layout
        .push_text_with_length_prefix("meterId", &snapshot.meter_id)?
        .push_uint32_with_code("Typ", snapshot.typ.code(), 0, 255)?;
    for (name, cell) in snapshot.cells() {
        layout.push_uint32_with_code(name, cell.value as u64, cell.scale, cell.unit)?;
    }
    layout
        .push_text_with_length_prefix("Meta1", &snapshot.meta1)?
        .push_text_with_length_prefix("Meta2", &snapshot.meta2)?
        .push_text_with_length_prefix("Meta3", &snapshot.meta3)?
        .push_uint32_with_code("Evt", snapshot.evt.value as u64, snapshot.evt.scale, snapshot.evt.unit)?;
    Ok(layout)
}

// ============================================================================
// Parsing
// ============================================================================

fn find<'a>(values: &'a [BsmValue], name: &str) -> Option<&'a BsmMeasuredValue> {
    values
        .iter()
        .find(|v| v.measurand.as_ref().and_then(|m| m.name.as_deref()) == Some(name))
        .and_then(|v| v.measured_value.as_ref())
}

fn to_cell(measured: &BsmMeasuredValue) -> Option<BsmCell> {
    Some(BsmCell {
        value: measured.integer()?,
        scale: measured.scale.unwrap_or(0),
        unit: measured.unit_encoded.unwrap_or(255),
    })
}

/// Check one data set and extract its snapshot when complete
fn parse_snapshot(data_set: &BsmDataSet, index: usize, checks: &mut FormatChecks) -> Option<BsmSnapshot> {
    let position = index + 1;
    let mut complete = true;

    let meter_id = match &data_set.meter_info {
        Some(info) => {
            checks.check(info.public_key.is_some(), || {
                Message::new("MissingField").with_param("meterInfo.publicKey").with_param(position)
            });
            checks.require(info.meter_id.clone(), "meterInfo.meterId")
        }
        None => {
            checks.missing_object("meterInfo", 1);
            None
        }
    };
    complete &= meter_id.is_some();

    let rcr = match data_set.value.as_ref().and_then(|v| v.measured_value.as_ref()) {
        Some(measured) => {
            let cell = to_cell(measured);
            checks.check(cell.is_some(), || {
                Message::new("InvalidField").with_param("value").with_param(position)
            });
            cell
        }
        None => {
            checks.error(Message::new("MissingField").with_param("value").with_param(position));
            None
        }
    };
    complete &= rcr.is_some();

    let Some(additional) = data_set.additional_values.as_deref() else {
        checks.missing_object("additionalValues", 14);
        return None;
    };

    let typ = find(additional, "Typ")
        .and_then(BsmMeasuredValue::text)
        .and_then(|label| SnapshotType::from_label(&label));
    complete &= checks.check(typ.is_some(), || {
        Message::new("MissingField").with_param("Typ").with_param(position)
    });

    let mut cells = std::collections::HashMap::new();
    for name in ADDITIONAL_CELLS {
        match find(additional, name).and_then(to_cell) {
            Some(cell) => {
                cells.insert(name, cell);
            }
            None => {
                complete = false;
                checks.error(Message::new("MissingField").with_param(name).with_param(position));
            }
        }
    }
    let mut texts = std::collections::HashMap::new();
    for name in ADDITIONAL_TEXTS {
        match find(additional, name).and_then(BsmMeasuredValue::text) {
            Some(text) => {
                texts.insert(name, text);
            }
            None => {
                complete = false;
                checks.error(Message::new("MissingField").with_param(name).with_param(position));
            }
        }
    }

    if !complete {
        return None;
    }
    let (Some(meter_id), Some(typ), Some(rcr)) = (meter_id, typ, rcr) else {
        return None;
    };
    let cell = |name: &str| cells.get(name).copied().unwrap_or_default();
    let text = |name: &str| texts.get(name).cloned().unwrap_or_default();
    Some(BsmSnapshot {
        meter_id,
        typ,
        rcr,
        tot_wh_imp: cell("TotWhImp"),
        w: cell("W"),
        rcnt: cell("RCnt"),
        os: cell("OS"),
        epoch: cell("Epoch"),
        tzo: cell("TZO"),
        epoch_set_cnt: cell("EpochSetCnt"),
        epoch_set_os: cell("EpochSetOS"),
        di: cell("DI"),
        do_: cell("DO"),
        meta1: text("Meta1"),
        meta2: text("Meta2"),
        meta3: text("Meta3"),
        evt: cell("Evt"),
    })
}

/// Expected `Meta1` for a contract
pub fn contract_meta(contract: &BsmContract) -> String {
    format!(
        "contract-id: {}:{}",
        contract.contract_type.as_deref().unwrap_or_default(),
        contract.id.as_deref().unwrap_or_default()
    )
}

/// Sequencing and cross-field rules over a session's snapshots.
/// `times` runs parallel to `snapshots`.
pub fn check_consistency(
    snapshots: &[BsmSnapshot],
    times: &[Option<DateTime<FixedOffset>>],
    contract: Option<&BsmContract>,
    checks: &mut FormatChecks,
) {
    let indices: Vec<usize> = (0..snapshots.len()).collect();
    check_sequence(snapshots, &indices, snapshots.len(), times, contract, checks);
}

/// Same rules over the snapshots that parsed out of `count` data sets.
/// `indices` holds each snapshot's 0-based data set index; neighbours are
/// compared across the gaps left by incomplete data sets.
fn check_sequence(
    snapshots: &[BsmSnapshot],
    indices: &[usize],
    count: usize,
    times: &[Option<DateTime<FixedOffset>>],
    contract: Option<&BsmContract>,
    checks: &mut FormatChecks,
) {
    for (i, (snapshot, &index)) in snapshots.iter().zip(indices).enumerate() {
        let position = index + 1;
        let allowed = if index == 0 {
            matches!(snapshot.typ, SnapshotType::Start | SnapshotType::TurnOn)
        } else if index + 1 == count {
            matches!(snapshot.typ, SnapshotType::End | SnapshotType::TurnOff)
        } else {
            snapshot.typ == SnapshotType::Current
        };
        checks.check(allowed, || Message::new(INCONSISTENT_VALUE).with_param(position));

        if let Some(contract) = contract {
            checks.check(snapshot.meta1 == contract_meta(contract), || {
                Message::new("Inconsistent_ContractId").with_param(position)
            });
        }

        if i == 0 {
            continue;
        }
        let previous = &snapshots[i - 1];
        checks.check(snapshot.meter_id == previous.meter_id, || {
            Message::new("Inconsistent_MeterId").with_param(position)
        });
        checks.check(snapshot.rcnt.value > previous.rcnt.value, || {
            Message::new("Inconsistent_RCnt").with_param(position)
        });
        checks.check(snapshot.os.value > previous.os.value, || {
            Message::new("Inconsistent_OS").with_param(position)
        });
        checks.check(snapshot.epoch.value > previous.epoch.value, || {
            Message::new("Inconsistent_Epoch").with_param(position)
        });
        checks.check(snapshot.tot_wh_imp.value >= previous.tot_wh_imp.value, || {
            Message::new("Inconsistent_TotWhImp").with_param(position)
        });
        if let (Some(Some(now)), Some(Some(before))) = (times.get(i), times.get(i - 1)) {
            checks.check(now >= before, || Message::new("Inconsistent_Time").with_param(position));
        }
    }
}

/// Session and meter decoded from an ordered list of data sets
#[derive(Debug, Clone)]
pub struct BsmSession {
    pub session: ChargingSession,
    pub meter: EnergyMeter,
}

pub fn parse_data_sets(
    data_sets: &[BsmDataSet],
    evse_id: Option<&str>,
    checks: &mut FormatChecks,
) -> Result<BsmSession> {
    let first = data_sets
        .first()
        .ok_or_else(|| ParseError::format("NoBSMDataSets", "no signed data sets"))?;
    checks.add_checks(CHECKS_PER_DATA_SET * data_sets.len() as u32);

    let mut snapshots = Vec::with_capacity(data_sets.len());
    let mut times = Vec::with_capacity(data_sets.len());
    let mut indices = Vec::with_capacity(data_sets.len());
    let mut values = Vec::with_capacity(data_sets.len());

    for (i, data_set) in data_sets.iter().enumerate() {
        let time = data_set.time.as_deref().and_then(|t| parse_timestamp(t).ok());
        checks.check(time.is_some(), || {
            Message::new("MissingField").with_param("time").with_param(i + 1)
        });
        checks.check(data_set.contract.is_some(), || {
            Message::new("MissingField").with_param("contract").with_param(i + 1)
        });
        checks.check(data_set.signature.is_some(), || {
            Message::new("MissingField").with_param("signature").with_param(i + 1)
        });

        let snapshot = parse_snapshot(data_set, i, checks);
        let rcr = snapshot
            .as_ref()
            .map(|s| s.rcr)
            .or_else(|| data_set.value.as_ref().and_then(|v| v.measured_value.as_ref()).and_then(to_cell))
            .unwrap_or_default();

        values.push(MeasurementValue {
            timestamp: time,
            value: scaled_value(rcr.value, rcr.scale)?,
            pagination_id: data_set.measurement_id.map(|id| id.to_string()),
            previous_value: i.checked_sub(1),
            signatures: data_set
                .signature
                .iter()
                .map(|sig| SignatureValue {
                    algorithm: Some("ECDSA".into()),
                    format: Some("DER".into()),
                    encoding: Some("hex".into()),
                    value: Some(sig.clone()),
                    ..Default::default()
                })
                .collect(),
            vendor: snapshot.as_ref().map(serde_json::to_value).transpose()?,
            ..Default::default()
        });
        match snapshot {
            Some(snapshot) => {
                snapshots.push(snapshot);
                times.push(time);
                indices.push(i);
            }
            // sequencing cannot be checked for this data set
            None => checks.error(Message::new("IncompleteDataSet").with_param(i + 1)),
        }
    }

    check_sequence(&snapshots, &indices, data_sets.len(), &times, first.contract.as_ref(), checks);

    let meter_info = first.meter_info.clone().unwrap_or_default();
    let meter_id = meter_info.meter_id.clone().unwrap_or_default();
    let main_value = first.value.clone().unwrap_or_default();
    let measured = main_value.measured_value.clone().unwrap_or_default();

    let meter = EnergyMeter {
        id: meter_id.clone(),
        manufacturer: meter_info.manufacturer.clone(),
        model: meter_info.meter_type.clone(),
        firmware_version: meter_info.firmware_version.clone(),
        signature_infos: Some(SignatureInfos {
            hash: Some("SHA256".into()),
            algorithm: Some("ECDSA".into()),
            curve: Some("secp256r1".into()),
            format: Some("DER".into()),
            encoding: Some("hex".into()),
            ..Default::default()
        }),
        public_keys: meter_info
            .public_key
            .iter()
            .map(|key| PublicKeyInfo {
                algorithm: Some("ECC".into()),
                curve: Some("secp256r1".into()),
                format: Some("DER".into()),
                encoding: Some("hex".into()),
                value: key.clone(),
                meter_id: Some(meter_id.clone()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let contract = first.contract.as_ref();
    let session = ChargingSession {
        id: first
            .id
            .clone()
            .or_else(|| first.measurement_id.map(|id| format!("{meter_id}-{id}"))),
        context: Some(SessionFormat::Bsm.context()),
        begin: values.first().and_then(|v| v.timestamp),
        end: values.last().and_then(|v| v.timestamp),
        evse_id: evse_id.map(str::to_string),
        meter_id: Some(meter_id.clone()),
        authorization_start: contract.and_then(|c| {
            Some(Authorization {
                id: c.id.clone()?,
                auth_type: c.contract_type.clone(),
                timestamp: values.first().and_then(|v| v.timestamp),
            })
        }),
        measurements: vec![Measurement {
            energy_meter_id: Some(meter_id),
            name: main_value
                .measurand
                .as_ref()
                .and_then(|m| m.name.clone())
                .or_else(|| Some("RCR".into())),
            obis: main_value
                .measurand
                .as_ref()
                .and_then(|m| m.id.as_deref())
                .and_then(|id| Obis::parse_any(id).ok()),
            unit: measured.unit.clone(),
            unit_encoded: measured.unit_encoded,
            value_type: measured.value_type.clone(),
            scale: measured.scale.unwrap_or(0),
            values,
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok(BsmSession { session, meter })
}

/// Record for bare BSM data sets: no station metadata, so the meter hangs
/// off an operator-level EVSE named after it
fn parse_standalone(json: &serde_json::Value) -> Result<ParseOutcome> {
    let data_sets: Vec<BsmDataSet> = match json {
        serde_json::Value::Array(_) => serde_json::from_value(json.clone())?,
        _ => vec![serde_json::from_value(json.clone())?],
    };
    let mut checks = FormatChecks::new(0);
    for (i, data_set) in data_sets.iter().enumerate() {
        checks.check(data_set.context.as_deref() == Some(BSM_CONTEXT), || {
            Message::new("InvalidField").with_param("@context").with_param(i + 1)
        });
    }
    checks.add_checks(data_sets.len() as u32);

    let BsmSession { session, meter } = parse_data_sets(&data_sets, None, &mut checks)?;
    debug!("BSM: {} data set(s) for meter {}", data_sets.len(), meter.id);

    let mut ctr = ChargeTransparencyRecord::new();
    ctr.id = session.id.clone();
    ctr.begin = session.begin;
    ctr.end = session.end;
    ctr.contract = data_sets[0].contract.as_ref().and_then(|c| {
        Some(Contract {
            id: c.id.clone()?,
            contract_type: c.contract_type.clone(),
            username: None,
        })
    });
    ctr.charging_station_operators.push(ChargingStationOperator {
        id: meter.manufacturer.clone().unwrap_or_else(|| "unknown".into()),
        evses: vec![Evse {
            id: meter.id.clone(),
            meters: vec![meter],
            ..Default::default()
        }],
        ..Default::default()
    });
    ctr.charging_sessions.push(session);
    Ok(finish_record(ctr, checks))
}

pub struct BsmParser;

impl JsonFormatParser for BsmParser {
    fn name(&self) -> &'static str {
        "BSM"
    }

    fn try_parse(&self, json: &serde_json::Value) -> ParseOutcome {
        into_outcome(parse_standalone(json))
    }
}

// ============================================================================
// Verification
// ============================================================================

pub struct BsmVerifier;

impl SessionVerifier for BsmVerifier {
    fn format(&self) -> SessionFormat {
        SessionFormat::Bsm
    }

    fn verify_measurement(&self, ctx: &MeasurementContext<'_>, value: &MeasurementValue) -> CryptoResult {
        if let Err(result) = require_meter(ctx) {
            return result;
        }
        let params = PARAMS.for_context(ctx);
        let snapshot = value
            .vendor
            .clone()
            .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "BSM snapshot"))
            .and_then(|v| serde_json::from_value::<BsmSnapshot>(v).map_err(ParseError::from));
        match snapshot.and_then(|s| signed_layout(&s)) {
            Ok(layout) => verify_signed_bytes(ctx, value, &params, layout, SignatureDefault::Der),
            Err(e) => layout_failure(&params, e),
        }
    }
}
