//! Merging partial records
//!
//! Several input files often describe one charging process: one carries
//! station metadata, another the signed readings. Merge rules:
//!
//! | Field | Rule |
//! |-------|------|
//! | `@id`, `@context`, `description`, `contract` | first non-empty wins |
//! | `begin` / `end` | minimum / maximum |
//! | collections | concatenated in input order, never deduplicated |
//! | `certainty` | minimum |
//! | `warnings`, `errors` | concatenated |
//!
//! Outcomes that are not records (bare public keys, parser failures) are
//! kept as `invalidDataSets` on the merged record.

use chrono::{DateTime, FixedOffset};
use ctr_core::{ChargeTransparencyRecord, InvalidDataSet, InvalidDataSetKind, ParseOutcome};
use tracing::debug;

fn first_non_empty<T>(into: &mut Option<T>, other: Option<T>, is_empty: impl Fn(&T) -> bool) {
    if into.as_ref().map_or(true, &is_empty) {
        if let Some(value) = other.filter(|v| !is_empty(v)) {
            *into = Some(value);
        }
    }
}

fn earliest(a: Option<DateTime<FixedOffset>>, b: Option<DateTime<FixedOffset>>) -> Option<DateTime<FixedOffset>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<FixedOffset>>, b: Option<DateTime<FixedOffset>>) -> Option<DateTime<FixedOffset>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Fold `other` into `into`
pub fn merge_record(into: &mut ChargeTransparencyRecord, other: ChargeTransparencyRecord) {
    first_non_empty(&mut into.id, other.id, String::is_empty);
    first_non_empty(&mut into.context, other.context, |c| c.is_empty());
    first_non_empty(&mut into.description, other.description, |d| d.is_empty());
    first_non_empty(&mut into.contract, other.contract, |c| c.id.is_empty());

    into.begin = earliest(into.begin, other.begin);
    into.end = latest(into.end, other.end);

    into.charging_station_operators.extend(other.charging_station_operators);
    into.charging_pools.extend(other.charging_pools);
    into.charging_stations.extend(other.charging_stations);
    into.charging_sessions.extend(other.charging_sessions);
    into.e_mobility_providers.extend(other.e_mobility_providers);
    into.mediation_services.extend(other.mediation_services);
    into.public_keys.extend(other.public_keys);
    into.invalid_data_sets.extend(other.invalid_data_sets);

    into.certainty = match (into.certainty, other.certainty) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    into.warnings.extend(other.warnings);
    into.errors.extend(other.errors);
}

/// Merge per-file outcomes in input order.
///
/// Returns the merged record, or every outcome as an invalid data set when
/// not a single file produced a record.
pub fn merge_outcomes<I>(outcomes: I) -> Result<ChargeTransparencyRecord, Vec<InvalidDataSet>>
where
    I: IntoIterator<Item = (Option<String>, ParseOutcome)>,
{
    let mut merged: Option<ChargeTransparencyRecord> = None;
    let mut invalid = Vec::new();

    for (file_name, outcome) in outcomes {
        match outcome {
            ParseOutcome::Record(ctr) => match merged.as_mut() {
                Some(into) => merge_record(into, *ctr),
                None => merged = Some(*ctr),
            },
            ParseOutcome::PublicKey(key) => invalid.push(InvalidDataSet {
                file_name,
                result: InvalidDataSetKind::PublicKey(key),
            }),
            ParseOutcome::Failure(result) => invalid.push(InvalidDataSet {
                file_name,
                result: InvalidDataSetKind::Failure(result),
            }),
        }
    }

    match merged {
        Some(mut ctr) => {
            debug!(
                "Merge: {} session(s), {} invalid data set(s)",
                ctr.charging_sessions.len(),
                invalid.len()
            );
            ctr.invalid_data_sets.extend(invalid);
            Ok(ctr)
        }
        None => Err(invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr_core::{
        ChargingSession, ChargingStation, Contract, PublicKeyInfo, SessionCryptoResult,
        VerificationStatus,
    };

    fn ts(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    #[test]
    fn test_stations_and_sessions_combine() {
        let mut stations = ChargeTransparencyRecord::new();
        stations.charging_stations.push(ChargingStation {
            id: "CS1".into(),
            ..Default::default()
        });
        stations.certainty = Some(1.0);
        let mut sessions = ChargeTransparencyRecord::default();
        sessions.id = Some("ctr-2".into());
        sessions.charging_sessions.push(ChargingSession::default());
        sessions.certainty = Some(0.75);

        merge_record(&mut stations, sessions);
        assert_eq!(stations.charging_stations.len(), 1);
        assert_eq!(stations.charging_sessions.len(), 1);
        assert_eq!(stations.id.as_deref(), Some("ctr-2"));
        assert_eq!(stations.certainty, Some(0.75));
    }

    #[test]
    fn test_scalar_precedence_and_time_bounds() {
        let mut a = ChargeTransparencyRecord {
            id: Some(String::new()),
            begin: Some(ts("2019-06-26T09:00:00Z")),
            end: Some(ts("2019-06-26T10:00:00Z")),
            ..Default::default()
        };
        let b = ChargeTransparencyRecord {
            id: Some("b".into()),
            begin: Some(ts("2019-06-26T08:00:00Z")),
            end: Some(ts("2019-06-26T09:30:00Z")),
            contract: Some(Contract {
                id: "DE-123".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        merge_record(&mut a, b);
        assert_eq!(a.id.as_deref(), Some("b"));
        assert_eq!(a.begin, Some(ts("2019-06-26T08:00:00Z")));
        assert_eq!(a.end, Some(ts("2019-06-26T10:00:00Z")));
        assert_eq!(a.contract.unwrap().id, "DE-123");
    }

    #[test]
    fn test_merge_with_itself_doubles_collections() {
        let mut ctr = ChargeTransparencyRecord::new();
        ctr.id = Some("ctr".into());
        ctr.charging_sessions.push(ChargingSession::default());
        ctr.public_keys.push(PublicKeyInfo::default());
        let original = ctr.clone();
        merge_record(&mut ctr, original.clone());
        assert_eq!(ctr.id, original.id);
        assert_eq!(ctr.context, original.context);
        assert_eq!(ctr.charging_sessions.len(), 2);
        assert_eq!(ctr.public_keys.len(), 2);
    }

    #[test]
    fn test_non_records_become_invalid_data_sets() {
        let failure = SessionCryptoResult::invalid_format("boom");
        let outcomes = vec![
            (Some("a.pem".to_string()), ParseOutcome::PublicKey(PublicKeyInfo::default())),
            (Some("b.json".to_string()), ParseOutcome::Record(Box::new(ChargeTransparencyRecord::new()))),
            (Some("c.txt".to_string()), ParseOutcome::Failure(failure)),
        ];
        let ctr = merge_outcomes(outcomes).unwrap();
        assert_eq!(ctr.invalid_data_sets.len(), 2);
        assert_eq!(ctr.invalid_data_sets[0].file_name.as_deref(), Some("a.pem"));
    }

    #[test]
    fn test_all_failures_returned() {
        let outcomes = vec![(
            None,
            ParseOutcome::Failure(SessionCryptoResult::new(VerificationStatus::InvalidSessionFormat)),
        )];
        let invalid = merge_outcomes(outcomes).unwrap_err();
        assert_eq!(invalid.len(), 1);
    }
}
