//! Session assembly
//!
//! Turns a parsed record into a verified one:
//! 1. back-references: `Evse.chargingStationId` from the owning station
//! 2. a flat meter arena over every nesting shape the record may use
//!    (operator → pool → station → EVSE → meter, pool → station → ...,
//!    station → EVSE → meter, operator → EVSE → meter)
//! 3. key attestation checks on every meter and record key
//! 4. one verifier run per session, dispatched by `@context`
//!
//! The arena holds indices, never owning links: meters are looked up by id
//! through hash maps built once per record.

use std::collections::HashMap;

use ctr_core::{
    ChargeTransparencyRecord, ChargingSession, ChargingStation, EnergyMeter, Evse,
    InvalidDataSetKind, Measurement, Message, PublicKeyInfo, VerificationStatus,
};
use tracing::{debug, info, warn};

use crate::chain::verify_key_attestations;
use crate::vendors::{verify_session, MeterResolver};

/// A meter and where it hangs in the hierarchy
#[derive(Debug, Clone, Copy)]
pub struct MeterEntry<'a> {
    pub meter: &'a EnergyMeter,
    pub evse_id: Option<&'a str>,
    pub station_id: Option<&'a str>,
}

/// Flat lookup tables over the meters of one record
#[derive(Debug, Default)]
pub struct MeterArena<'a> {
    entries: Vec<MeterEntry<'a>>,
    by_meter: HashMap<&'a str, usize>,
    by_evse: HashMap<&'a str, usize>,
    by_station: HashMap<&'a str, usize>,
    record_keys: Vec<PublicKeyInfo>,
}

impl<'a> MeterArena<'a> {
    /// Index every meter of `ctr`. Record keys are the record's own keys
    /// plus keys that arrived as separate files.
    pub fn build(ctr: &'a ChargeTransparencyRecord) -> Self {
        let mut arena = MeterArena::default();

        for operator in &ctr.charging_station_operators {
            for pool in &operator.charging_pools {
                arena.add_stations(&pool.charging_stations);
            }
            arena.add_stations(&operator.charging_stations);
            arena.add_evses(&operator.evses, None);
        }
        for pool in &ctr.charging_pools {
            arena.add_stations(&pool.charging_stations);
        }
        arena.add_stations(&ctr.charging_stations);

        arena.record_keys = ctr.public_keys.clone();
        arena.record_keys.extend(ctr.invalid_data_sets.iter().filter_map(|set| {
            match &set.result {
                InvalidDataSetKind::PublicKey(key) => Some(key.clone()),
                InvalidDataSetKind::Failure(_) => None,
            }
        }));
        arena
    }

    fn add_stations(&mut self, stations: &'a [ChargingStation]) {
        for station in stations {
            self.add_evses(&station.evses, Some(station.id.as_str()));
        }
    }

    fn add_evses(&mut self, evses: &'a [Evse], station_id: Option<&'a str>) {
        for evse in evses {
            let station_id = station_id.or(evse.charging_station_id.as_deref());
            for meter in &evse.meters {
                let index = self.entries.len();
                self.entries.push(MeterEntry {
                    meter,
                    evse_id: Some(evse.id.as_str()),
                    station_id,
                });
                // first declaration wins on duplicate ids
                self.by_meter.entry(meter.id.as_str()).or_insert(index);
                self.by_evse.entry(evse.id.as_str()).or_insert(index);
                if let Some(station_id) = station_id {
                    self.by_station.entry(station_id).or_insert(index);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn meter(&self, meter_id: &str) -> Option<&MeterEntry<'a>> {
        self.by_meter.get(meter_id).map(|&i| &self.entries[i])
    }

    pub fn meter_of_evse(&self, evse_id: &str) -> Option<&MeterEntry<'a>> {
        self.by_evse.get(evse_id).map(|&i| &self.entries[i])
    }

    pub fn meter_of_station(&self, station_id: &str) -> Option<&MeterEntry<'a>> {
        self.by_station.get(station_id).map(|&i| &self.entries[i])
    }
}

impl MeterResolver for MeterArena<'_> {
    /// A declared meter id must be in the table; without one the session's
    /// EVSE, then its station, selects the meter
    fn resolve(&self, session: &ChargingSession, measurement: &Measurement) -> Option<&EnergyMeter> {
        let declared = measurement
            .energy_meter_id
            .as_deref()
            .or(session.meter_id.as_deref());
        let entry = match declared {
            Some(meter_id) => self.meter(meter_id),
            None => session
                .evse_id
                .as_deref()
                .and_then(|id| self.meter_of_evse(id))
                .or_else(|| {
                    session
                        .charging_station_id
                        .as_deref()
                        .and_then(|id| self.meter_of_station(id))
                }),
        };
        entry.map(|e| e.meter)
    }

    fn record_keys(&self) -> &[PublicKeyInfo] {
        &self.record_keys
    }
}

/// Fill `Evse.chargingStationId` from the owning station
fn link_stations(stations: &mut [ChargingStation]) {
    for station in stations {
        for evse in &mut station.evses {
            if evse.charging_station_id.is_none() {
                evse.charging_station_id = Some(station.id.clone());
            }
        }
    }
}

fn all_meter_keys(ctr: &mut ChargeTransparencyRecord) -> impl Iterator<Item = &mut PublicKeyInfo> {
    let operators = ctr.charging_station_operators.iter_mut().flat_map(|operator| {
        let pooled = operator
            .charging_pools
            .iter_mut()
            .flat_map(|pool| pool.charging_stations.iter_mut());
        let stations = pooled
            .chain(operator.charging_stations.iter_mut())
            .flat_map(|station| station.evses.iter_mut());
        stations.chain(operator.evses.iter_mut())
    });
    let pools = ctr
        .charging_pools
        .iter_mut()
        .flat_map(|pool| pool.charging_stations.iter_mut())
        .chain(ctr.charging_stations.iter_mut())
        .flat_map(|station| station.evses.iter_mut());
    operators
        .chain(pools)
        .flat_map(|evse| evse.meters.iter_mut())
        .flat_map(|meter| meter.public_keys.iter_mut())
        .chain(ctr.public_keys.iter_mut())
}

/// Per-status session counts of one assembly run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblySummary {
    pub sessions: usize,
    pub valid: usize,
    pub meters: usize,
    pub attested_keys: usize,
}

/// Parser diagnostics sit on the record; every session result carries them too
fn carry_messages(into: &mut Vec<Message>, from: &[Message]) {
    for message in from {
        if !into.contains(message) {
            into.push(message.clone());
        }
    }
}

/// Builds lookups, checks key attestations and verifies every session
#[derive(Debug, Clone)]
pub struct Assembler {
    verify_key_signatures: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self {
            verify_key_signatures: true,
        }
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_attestation(mut self, enabled: bool) -> Self {
        self.verify_key_signatures = enabled;
        self
    }

    pub fn assemble(&self, ctr: &mut ChargeTransparencyRecord) -> AssemblySummary {
        let mut summary = AssemblySummary::default();

        for operator in &mut ctr.charging_station_operators {
            for pool in &mut operator.charging_pools {
                link_stations(&mut pool.charging_stations);
            }
            link_stations(&mut operator.charging_stations);
        }
        for pool in &mut ctr.charging_pools {
            link_stations(&mut pool.charging_stations);
        }
        link_stations(&mut ctr.charging_stations);

        if self.verify_key_signatures {
            for key in all_meter_keys(ctr) {
                match verify_key_attestations(key) {
                    Some(VerificationStatus::ValidSignature) => summary.attested_keys += 1,
                    Some(status) => warn!("Assembler: key attestation failed: {}", status),
                    None => {}
                }
            }
        }

        // sessions are verified against a read-only view of the rest
        let mut sessions = std::mem::take(&mut ctr.charging_sessions);
        {
            let arena = MeterArena::build(ctr);
            summary.meters = arena.len();
            for session in &mut sessions {
                let mut result = verify_session(session, &arena);
                result.certainty = ctr.certainty.unwrap_or(0.0);
                carry_messages(&mut result.errors, &ctr.errors);
                carry_messages(&mut result.warnings, &ctr.warnings);
                debug!("Assembler: session {:?} -> {}", session.id, result.status);
                if result.status.is_valid() {
                    summary.valid += 1;
                }
                session.verification_result = Some(result);
            }
        }
        summary.sessions = sessions.len();
        ctr.charging_sessions = sessions;

        info!(
            "Assembler: {} session(s), {} valid, {} meter(s)",
            summary.sessions, summary.valid, summary.meters
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr_core::{ChargingPool, ChargingStationOperator};

    fn meter(id: &str) -> EnergyMeter {
        EnergyMeter {
            id: id.into(),
            ..Default::default()
        }
    }

    fn evse(id: &str, meter_id: &str) -> Evse {
        Evse {
            id: id.into(),
            meters: vec![meter(meter_id)],
            ..Default::default()
        }
    }

    fn station(id: &str, evses: Vec<Evse>) -> ChargingStation {
        ChargingStation {
            id: id.into(),
            evses,
            ..Default::default()
        }
    }

    fn all_shapes() -> ChargeTransparencyRecord {
        let mut ctr = ChargeTransparencyRecord::new();
        ctr.charging_station_operators.push(ChargingStationOperator {
            id: "OP".into(),
            charging_pools: vec![ChargingPool {
                id: "OP-POOL".into(),
                charging_stations: vec![station("S1", vec![evse("E1", "M1")])],
                ..Default::default()
            }],
            charging_stations: vec![station("S2", vec![evse("E2", "M2")])],
            evses: vec![evse("E3", "M3")],
            ..Default::default()
        });
        ctr.charging_pools.push(ChargingPool {
            id: "POOL".into(),
            charging_stations: vec![station("S4", vec![evse("E4", "M4")])],
            ..Default::default()
        });
        ctr.charging_stations.push(station("S5", vec![evse("E5", "M5")]));
        ctr
    }

    #[test]
    fn test_arena_covers_every_shape() {
        let ctr = all_shapes();
        let arena = MeterArena::build(&ctr);
        assert_eq!(arena.len(), 5);
        for i in 1..=5 {
            assert_eq!(arena.meter(&format!("M{}", i)).unwrap().evse_id, Some(format!("E{}", i).as_str()));
        }
        assert_eq!(arena.meter("M1").unwrap().station_id, Some("S1"));
        assert_eq!(arena.meter("M3").unwrap().station_id, None);
        assert_eq!(arena.meter_of_station("S4").unwrap().meter.id, "M4");
    }

    #[test]
    fn test_back_references_filled() {
        let mut ctr = all_shapes();
        Assembler::new().assemble(&mut ctr);
        let pooled = &ctr.charging_station_operators[0].charging_pools[0].charging_stations[0];
        assert_eq!(pooled.evses[0].charging_station_id.as_deref(), Some("S1"));
        assert_eq!(ctr.charging_stations[0].evses[0].charging_station_id.as_deref(), Some("S5"));
        assert_eq!(ctr.charging_station_operators[0].evses[0].charging_station_id, None);
    }

    #[test]
    fn test_resolve_by_meter_then_evse() {
        let ctr = all_shapes();
        let arena = MeterArena::build(&ctr);
        let measurement = Measurement::default();

        let by_evse = ChargingSession {
            evse_id: Some("E4".into()),
            ..Default::default()
        };
        assert_eq!(arena.resolve(&by_evse, &measurement).unwrap().id, "M4");

        let declared = ChargingSession {
            evse_id: Some("E4".into()),
            meter_id: Some("M2".into()),
            ..Default::default()
        };
        assert_eq!(arena.resolve(&declared, &measurement).unwrap().id, "M2");

        let unknown = ChargingSession {
            meter_id: Some("nope".into()),
            evse_id: Some("E4".into()),
            ..Default::default()
        };
        assert!(arena.resolve(&unknown, &measurement).is_none());
    }

    #[test]
    fn test_unknown_context_session_result() {
        let mut ctr = all_shapes();
        ctr.certainty = Some(0.8);
        ctr.charging_sessions.push(ChargingSession {
            context: Some("urn:unknown".into()),
            ..Default::default()
        });
        let summary = Assembler::new().assemble(&mut ctr);
        assert_eq!(summary.sessions, 1);
        assert_eq!(summary.valid, 0);
        let result = ctr.charging_sessions[0].verification_result.as_ref().unwrap();
        assert_eq!(result.status, VerificationStatus::UnknownSessionFormat);
        assert_eq!(result.certainty, 0.8);
    }

    #[test]
    fn test_session_result_carries_record_diagnostics() {
        let mut ctr = all_shapes();
        ctr.errors.push(Message::new("MissingField").with_param("meterInfo"));
        ctr.warnings.push(Message::new("UnknownEvse"));
        for _ in 0..2 {
            ctr.charging_sessions.push(ChargingSession {
                context: Some("urn:unknown".into()),
                ..Default::default()
            });
        }
        Assembler::new().assemble(&mut ctr);
        for session in &ctr.charging_sessions {
            let result = session.verification_result.as_ref().unwrap();
            assert_eq!(result.errors, ctr.errors);
            assert_eq!(result.warnings, ctr.warnings);
        }
    }

    #[test]
    fn test_record_keys_include_key_files() {
        let mut ctr = all_shapes();
        ctr.invalid_data_sets.push(ctr_core::InvalidDataSet {
            file_name: Some("meter.pem".into()),
            result: InvalidDataSetKind::PublicKey(PublicKeyInfo {
                value: "-----BEGIN PUBLIC KEY-----".into(),
                ..Default::default()
            }),
        });
        let arena = MeterArena::build(&ctr);
        assert_eq!(arena.record_keys().len(), 1);
    }
}
