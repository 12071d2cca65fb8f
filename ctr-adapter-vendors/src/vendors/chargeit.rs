//! chargeIT station container
//!
//! Station, EVSE and place metadata wrapped around a list of BSM signed
//! data sets. Produces the pool → station → EVSE → meter shape.

use ctr_core::{
    Address, ChargeTransparencyRecord, ChargingPool, ChargingStation, Contract, Evse,
    FormatChecks, GeoLocation, Message, ParseOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bsm::{parse_data_sets, BsmDataSet, BsmSession};
use super::{finish_record, into_outcome, JsonFormatParser};
use crate::error::Result;

pub const CHARGEIT_CONTEXT: &str =
    "https://www.chargeit-mobility.com/contexts/charging-station-json-v1";

/// Container-level checks on top of the per-data-set ones
const CONTAINER_CHECKS: u32 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeItContainer {
    #[serde(rename = "@context", default)]
    pub context: Option<String>,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub place_info: Option<PlaceInfo>,
    #[serde(default)]
    pub charge_point_info: Option<ChargePointInfo>,
    #[serde(default)]
    pub charging_station_info: Option<ChargingStationInfo>,
    #[serde(default)]
    pub signed_meter_values: Option<Vec<BsmDataSet>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceInfo {
    #[serde(default)]
    pub geo_location: Option<PlaceGeoLocation>,
    #[serde(default)]
    pub address: Option<PlaceAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceGeoLocation {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceAddress {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargePointInfo {
    #[serde(default)]
    pub evse_id: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStationInfo {
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(rename = "type", default)]
    pub station_type: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub controller_software_version: Option<String>,
}

fn parse_container(json: &serde_json::Value) -> Result<ParseOutcome> {
    let container: ChargeItContainer = serde_json::from_value(json.clone())?;
    let mut checks = FormatChecks::new(CONTAINER_CHECKS);

    checks.check(container.context.as_deref() == Some(CHARGEIT_CONTEXT), || {
        Message::new("InvalidField").with_param("@context")
    });
    let place = container.place_info.clone().unwrap_or_default();
    if container.place_info.is_none() {
        checks.missing_object("placeInfo", 0);
    }
    let charge_point = container.charge_point_info.clone().unwrap_or_default();
    let evse_id = checks.require(charge_point.evse_id.clone(), "chargePointInfo.evseId");
    let station_info = container.charging_station_info.clone().unwrap_or_default();
    checks.require(container.charging_station_info.as_ref(), "chargingStationInfo");
    let data_sets = checks
        .require(container.signed_meter_values.clone(), "signedMeterValues")
        .unwrap_or_default();

    let BsmSession { mut session, meter } = parse_data_sets(&data_sets, evse_id.as_deref(), &mut checks)?;

    let station_id = station_info
        .serial_number
        .clone()
        .or_else(|| evse_id.clone())
        .unwrap_or_else(|| meter.id.clone());
    let evse_id = evse_id.unwrap_or_else(|| meter.id.clone());
    session.evse_id = Some(evse_id.clone());
    session.charging_station_id = Some(station_id.clone());
    debug!("chargeIT: EVSE {} with {} data set(s)", evse_id, data_sets.len());

    let address = place.address.map(|a| Address {
        street: a.street,
        zip_code: a.zip_code,
        city: a.town,
        country: a.country,
    });
    let geo_location = place.geo_location.and_then(|g| {
        Some(GeoLocation {
            lat: g.lat?,
            lng: g.lon?,
        })
    });

    let station = ChargingStation {
        id: station_id.clone(),
        manufacturer: station_info.manufacturer,
        model: station_info.station_type,
        serial_number: station_info.serial_number,
        firmware_version: station_info.controller_software_version,
        address: address.clone(),
        geo_location: geo_location.clone(),
        evses: vec![Evse {
            id: evse_id,
            charging_station_id: Some(station_id.clone()),
            meters: vec![meter],
            ..Default::default()
        }],
        ..Default::default()
    };

    let mut ctr = ChargeTransparencyRecord::new();
    ctr.id = container.id.clone().or_else(|| session.id.clone());
    ctr.begin = session.begin;
    ctr.end = session.end;
    ctr.contract = data_sets.first().and_then(|d| d.contract.as_ref()).and_then(|c| {
        Some(Contract {
            id: c.id.clone()?,
            contract_type: c.contract_type.clone(),
            username: None,
        })
    });
    ctr.charging_pools.push(ChargingPool {
        id: charge_point.place_id.unwrap_or(station_id),
        address,
        geo_location,
        charging_stations: vec![station],
        ..Default::default()
    });
    ctr.charging_sessions.push(session);
    Ok(finish_record(ctr, checks))
}

pub struct ChargeItParser;

impl JsonFormatParser for ChargeItParser {
    fn name(&self) -> &'static str {
        "chargeIT"
    }

    fn try_parse(&self, json: &serde_json::Value) -> ParseOutcome {
        into_outcome(parse_container(json))
    }
}
