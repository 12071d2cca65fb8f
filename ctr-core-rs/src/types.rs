//! Charge transparency record data model
//!
//! JSON-LD shaped, matching the `CTR+json` document layout:
//! - ownership flows downward: operator → pool → station → EVSE → meter
//! - sessions are listed flat on the record and refer to EVSEs, stations
//!   and meters by id
//! - vendor-specific signed fields ride along on each measurement value as
//!   an opaque JSON extension owned by the verifier that produced them

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::obis::Obis;
use crate::result::{CryptoResult, Message, SessionCryptoResult, VerificationStatus};

/// Context URI of a native charge transparency record
pub const CTR_CONTEXT: &str = "https://open.charging.cloud/contexts/CTR+json";

/// Prefix of every session signature format context
pub const SESSION_FORMAT_CONTEXT_PREFIX: &str =
    "https://open.charging.cloud/contexts/SessionSignatureFormats/";

/// Multilingual text, language code → text
pub type I18nString = BTreeMap<String, String>;

// ============================================================================
// Decimal text (de)serialization
// ============================================================================

/// Decimals are written as JSON strings and read from strings or numbers.
/// Numbers go through their shortest round-trip text, so `268.978` stays
/// `268.978` and never becomes `268.97799999`.
pub mod decimal_text {
    use std::fmt;
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.normalize().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }

    pub(crate) struct DecimalVisitor;

    impl<'de> Visitor<'de> for DecimalVisitor {
        type Value = Decimal;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a decimal number or numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
            Ok(Decimal::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
            Ok(Decimal::from(v))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
            Decimal::from_str(&v.to_string()).map_err(|_| E::custom(format!("invalid decimal {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
            Decimal::from_str(v.trim())
                .or_else(|_| Decimal::from_scientific(v.trim()))
                .map_err(|_| E::custom(format!("invalid decimal '{v}'")))
        }
    }

    /// `Option<Decimal>` flavour
    pub mod option {
        use rust_decimal::Decimal;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] Decimal);
            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(d)| d))
        }
    }
}

// ============================================================================
// Shared building blocks
// ============================================================================

/// `@context`: one URI or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonLdContext {
    Single(String),
    Many(Vec<String>),
}

impl JsonLdContext {
    pub fn contains(&self, uri: &str) -> bool {
        match self {
            JsonLdContext::Single(s) => s == uri,
            JsonLdContext::Many(list) => list.iter().any(|s| s == uri),
        }
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            JsonLdContext::Single(s) => Some(s),
            JsonLdContext::Many(list) => list.first().map(String::as_str),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            JsonLdContext::Single(s) => s.is_empty(),
            JsonLdContext::Many(list) => list.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

// ============================================================================
// Public keys
// ============================================================================

/// A public key and the signatures attesting who authorized it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    /// Key algorithm family, e.g. `ECC`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
    /// `raw`, `DER` or `PEM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// `hex`, `base64`, `base32`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub value: String,
    /// Meter this key was published for, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<PublicKeySignature>,
}

/// Second-order signature over a public key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeySignature {
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Key of the signer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Box<PublicKeyInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VerificationStatus>,
}

// ============================================================================
// Infrastructure hierarchy
// ============================================================================

/// How a meter signs its readings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfos {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_truncation: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
    /// `rs` or `DER`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyMeter {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_infos: Option<SignatureInfos>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_keys: Vec<PublicKeyInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evse {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
    /// Back-reference filled by assembly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meters: Vec<EnergyMeter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStation {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoLocation>,
    #[serde(rename = "EVSEs", default, skip_serializing_if = "Vec::is_empty")]
    pub evses: Vec<Evse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingPool {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charging_stations: Vec<ChargingStation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStationOperator {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charging_pools: Vec<ChargingPool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charging_stations: Vec<ChargingStation>,
    /// Flat feeds hang EVSEs directly off the operator
    #[serde(rename = "EVSEs", default, skip_serializing_if = "Vec::is_empty")]
    pub evses: Vec<Evse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EMobilityProvider {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediationService {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
}

// ============================================================================
// Sessions and measurements
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Pagination counter kind (OCMF `PG` prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transaction,
    Fiscal,
}

/// Signature attached to one measurement value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// `rs` or `DER`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(with = "decimal_text")]
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_book_index: Option<String>,
    /// Index of the preceding value in the same measurement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<SignatureValue>,
    /// Vendor-specific signed fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CryptoResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_meter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obis: Option<Obis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_encoded: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub scale: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_infos: Option<SignatureInfos>,
    #[serde(default)]
    pub values: Vec<MeasurementValue>,
}

/// Cost fields passed through from the source, never computed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Costs {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "decimal_text::option")]
    pub total: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSession {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Signature format of the session, selects the verifier
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(rename = "EVSEId", default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_start: Option<Authorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_stop: Option<Authorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costs: Option<Costs>,
    /// Raw source text the session was parsed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<SessionCryptoResult>,
}

impl ChargingSession {
    /// Number of measurement values across all measurements
    pub fn value_count(&self) -> usize {
        self.measurements.iter().map(|m| m.values.len()).sum()
    }
}

// ============================================================================
// Record root
// ============================================================================

/// Input that could not be turned into a record, kept for traceability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidDataSetKind {
    PublicKey(PublicKeyInfo),
    Failure(SessionCryptoResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidDataSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub result: InvalidDataSetKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeTransparencyRecord {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonLdContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<Contract>,
    #[serde(default)]
    pub charging_station_operators: Vec<ChargingStationOperator>,
    #[serde(default)]
    pub charging_pools: Vec<ChargingPool>,
    #[serde(default)]
    pub charging_stations: Vec<ChargingStation>,
    #[serde(default)]
    pub charging_sessions: Vec<ChargingSession>,
    #[serde(default)]
    pub e_mobility_providers: Vec<EMobilityProvider>,
    #[serde(default)]
    pub mediation_services: Vec<MediationService>,
    #[serde(default)]
    pub public_keys: Vec<PublicKeyInfo>,
    #[serde(default)]
    pub invalid_data_sets: Vec<InvalidDataSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Message>,
}

impl ChargeTransparencyRecord {
    /// Empty record carrying the native CTR context
    pub fn new() -> Self {
        Self {
            context: Some(JsonLdContext::Single(CTR_CONTEXT.to_string())),
            ..Default::default()
        }
    }
}

/// What a parser hands back: a record, or a tagged failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParseOutcome {
    Record(Box<ChargeTransparencyRecord>),
    PublicKey(PublicKeyInfo),
    Failure(SessionCryptoResult),
}

impl ParseOutcome {
    /// Certainty of the interpretation; a bare key lookup is always certain
    pub fn certainty(&self) -> f64 {
        match self {
            ParseOutcome::Record(ctr) => ctr.certainty.unwrap_or(0.0),
            ParseOutcome::PublicKey(_) => 1.0,
            ParseOutcome::Failure(result) => result.certainty,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, ParseOutcome::Record(_))
    }
}
