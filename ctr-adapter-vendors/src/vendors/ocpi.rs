//! OCPI 2.2 charge detail record with `signed_data`
//!
//! The signed values carry OCMF documents. Location, EVSE and token
//! metadata fill in the station and contract; `total_cost` is passed
//! through as the session costs.

use ctr_core::{
    codec, Address, ChargingStation, Contract, Costs, FormatChecks, GeoLocation, Message,
    ParseOutcome, PublicKeyInfo,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ocmf::{parse_sources, OcmfSource};
use super::{into_outcome, JsonFormatParser};
use crate::error::{ParseError, Result};

const CDR_CHECKS: u32 = 6;
const VALUE_CHECKS: u32 = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcpiCdr {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default)]
    pub cdr_token: Option<CdrToken>,
    #[serde(default)]
    pub cdr_location: Option<CdrLocation>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub total_cost: Option<Price>,
    #[serde(default)]
    pub signed_data: Option<SignedData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdrToken {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub contract_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdrLocation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub evse_uid: Option<String>,
    #[serde(default)]
    pub evse_id: Option<String>,
}

/// OCPI writes coordinates as decimal strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Price {
    #[serde(with = "ctr_core::types::decimal_text::option", default)]
    pub excl_vat: Option<Decimal>,
    #[serde(with = "ctr_core::types::decimal_text::option", default)]
    pub incl_vat: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignedData {
    #[serde(default)]
    pub encoding_method: Option<String>,
    #[serde(default)]
    pub encoding_method_version: Option<i64>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub signed_values: Vec<SignedValue>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignedValue {
    #[serde(default)]
    pub nature: Option<String>,
    #[serde(default)]
    pub plain_data: Option<String>,
    #[serde(default)]
    pub signed_data: Option<String>,
}

/// Keys come hex or base64 encoded; hex wins when both would decode
fn public_key_info(text: &str) -> PublicKeyInfo {
    let encoding = if codec::hex_decode(text).is_ok() { "hex" } else { "base64" };
    PublicKeyInfo {
        encoding: Some(encoding.into()),
        value: text.trim().to_string(),
        ..Default::default()
    }
}

fn parse_cdr(json: &serde_json::Value) -> Result<ParseOutcome> {
    let cdr: OcpiCdr = serde_json::from_value(json.clone())?;
    let mut checks = FormatChecks::new(CDR_CHECKS);

    checks.require(cdr.id.as_ref(), "id");
    let location = checks.require(cdr.cdr_location.clone(), "cdr_location").unwrap_or_default();
    let token = checks.require(cdr.cdr_token.clone(), "cdr_token");
    checks.require(cdr.currency.as_ref(), "currency");
    let signed = cdr
        .signed_data
        .clone()
        .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "signed_data"))?;
    checks.check(
        signed
            .encoding_method
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("OCMF")),
        || Message::new("InvalidField").with_param("encoding_method"),
    );
    checks.require(signed.public_key.as_ref(), "public_key");
    checks.add_checks(VALUE_CHECKS * signed.signed_values.len() as u32);

    let public_key = signed.public_key.as_deref().map(public_key_info);
    let mut sources = Vec::new();
    for (i, value) in signed.signed_values.iter().enumerate() {
        checks.require(value.nature.as_ref(), "nature");
        let Some(data) = value.signed_data.as_deref() else {
            checks.error(Message::new("MissingField").with_param("signed_data").with_param(i + 1));
            continue;
        };
        let mut source = OcmfSource::new(data.trim());
        source.public_key = public_key.clone();
        source.evse_id = location.evse_id.clone();
        sources.push(source);
    }

    let mut record = parse_sources(&sources)?;
    let ctr = &mut record.ctr;
    let costs = Costs {
        total: cdr
            .total_cost
            .as_ref()
            .and_then(|p| p.incl_vat.or(p.excl_vat)),
        currency: cdr.currency.clone(),
    };
    for session in &mut ctr.charging_sessions {
        session.costs = Some(costs.clone());
    }

    let address = Address {
        street: location.address.clone(),
        zip_code: location.postal_code.clone(),
        city: location.city.clone(),
        country: location.country.clone(),
    };
    let geo_location = location.coordinates.as_ref().and_then(|c| {
        Some(GeoLocation {
            lat: c.latitude.as_deref()?.trim().parse().ok()?,
            lng: c.longitude.as_deref()?.trim().parse().ok()?,
        })
    });
    for station in &mut ctr.charging_stations {
        fill_station(station, &location, &address, geo_location.as_ref());
    }

    ctr.id = cdr.id.clone().or(ctr.id.take());
    ctr.contract = token.and_then(|t| {
        Some(Contract {
            id: t.contract_id.or(t.uid)?,
            contract_type: t.token_type,
            username: None,
        })
    });
    record.checks.merge(checks);
    Ok(record.finish())
}

fn fill_station(
    station: &mut ChargingStation,
    location: &CdrLocation,
    address: &Address,
    geo_location: Option<&GeoLocation>,
) {
    if let Some(name) = &location.name {
        station
            .description
            .get_or_insert_with(Default::default)
            .entry("en".into())
            .or_insert_with(|| name.clone());
    }
    station.address.get_or_insert_with(|| address.clone());
    if station.geo_location.is_none() {
        station.geo_location = geo_location.cloned();
    }
}

pub struct OcpiParser;

impl JsonFormatParser for OcpiParser {
    fn name(&self) -> &'static str {
        "OCPI"
    }

    fn try_parse(&self, json: &serde_json::Value) -> ParseOutcome {
        into_outcome(parse_cdr(json))
    }
}
