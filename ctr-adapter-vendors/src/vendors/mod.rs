//! Vendor signature formats
//!
//! Two halves per vendor:
//! - a parser turning the vendor container into a [`ChargeTransparencyRecord`]
//! - a [`SessionVerifier`] that rebuilds the signed bytes of every
//!   measurement value and checks its signature
//!
//! Sessions are routed to verifiers by their `@context`:
//!
//! | Context suffix | Verifier |
//! |----------------|----------|
//! | `GDFCrypt01+json` | [`gdf::GdfVerifier`] |
//! | `EMHCrypt01+json` | [`emh::EmhVerifier`] |
//! | `OCMFv1.0+json` | [`ocmf::OcmfVerifier`] |
//! | `ChargePointCrypt01+json` | [`chargepoint::ChargePointVerifier`] |
//! | `AlfenCrypt01+json` | [`alfen::AlfenVerifier`] |
//! | `bsm-ws36a-v0+json` | [`bsm::BsmVerifier`] |

pub mod common;
pub mod gdf;
pub mod emh;
pub mod bsm;
pub mod chargeit;
pub mod ocmf;
pub mod chargepoint;
pub mod alfen;
pub mod safe_xml;
pub mod xml_container;
pub mod mennekes;
pub mod ocpi;
pub mod native;

use ctr_core::{
    keys, ChargeTransparencyRecord, ChargingSession, CryptoResult, EnergyMeter, Measurement,
    MeasurementValue, Message, ParseOutcome, PublicKeyInfo, SessionCryptoResult,
    VerificationStatus, SESSION_FORMAT_CONTEXT_PREFIX,
};
use tracing::debug;

/// Closed set of session signature formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionFormat {
    Gdf,
    Emh,
    Ocmf,
    ChargePoint,
    Alfen,
    Bsm,
}

impl SessionFormat {
    pub const ALL: [SessionFormat; 6] = [
        SessionFormat::Gdf,
        SessionFormat::Emh,
        SessionFormat::Ocmf,
        SessionFormat::ChargePoint,
        SessionFormat::Alfen,
        SessionFormat::Bsm,
    ];

    pub fn context_suffix(&self) -> &'static str {
        match self {
            SessionFormat::Gdf => "GDFCrypt01+json",
            SessionFormat::Emh => "EMHCrypt01+json",
            SessionFormat::Ocmf => "OCMFv1.0+json",
            SessionFormat::ChargePoint => "ChargePointCrypt01+json",
            SessionFormat::Alfen => "AlfenCrypt01+json",
            SessionFormat::Bsm => "bsm-ws36a-v0+json",
        }
    }

    /// Full context URI
    pub fn context(&self) -> String {
        format!("{}{}", SESSION_FORMAT_CONTEXT_PREFIX, self.context_suffix())
    }

    /// Exact match against the full context URI
    pub fn from_context(context: &str) -> Option<Self> {
        let suffix = context.strip_prefix(SESSION_FORMAT_CONTEXT_PREFIX)?;
        SessionFormat::ALL
            .into_iter()
            .find(|format| format.context_suffix() == suffix)
    }

    pub fn verifier(&self) -> &'static dyn SessionVerifier {
        match self {
            SessionFormat::Gdf => &gdf::GdfVerifier,
            SessionFormat::Emh => &emh::EmhVerifier,
            SessionFormat::Ocmf => &ocmf::OcmfVerifier,
            SessionFormat::ChargePoint => &chargepoint::ChargePointVerifier,
            SessionFormat::Alfen => &alfen::AlfenVerifier,
            SessionFormat::Bsm => &bsm::BsmVerifier,
        }
    }
}

/// Meter lookup provided by the session assembler
pub trait MeterResolver {
    /// Meter a measurement was taken with
    fn resolve(&self, session: &ChargingSession, measurement: &Measurement) -> Option<&EnergyMeter>;

    /// Keys published on the record itself rather than on a meter
    fn record_keys(&self) -> &[PublicKeyInfo];
}

/// Everything a verifier may look at for one measurement value
pub struct MeasurementContext<'a> {
    pub session: &'a ChargingSession,
    pub measurement: &'a Measurement,
    pub meter: Option<&'a EnergyMeter>,
    pub record_keys: &'a [PublicKeyInfo],
    pub value_index: usize,
}

impl<'a> MeasurementContext<'a> {
    /// Meter id as declared by the measurement or session
    pub fn meter_id(&self) -> Option<&'a str> {
        self.measurement
            .energy_meter_id
            .as_deref()
            .or(self.session.meter_id.as_deref())
            .or(self.meter.map(|m| m.id.as_str()))
    }
}

/// Per-format verification capability
pub trait SessionVerifier: Send + Sync {
    fn format(&self) -> SessionFormat;

    /// Rebuild, hash and verify one measurement value
    fn verify_measurement(&self, ctx: &MeasurementContext<'_>, value: &MeasurementValue) -> CryptoResult;

    /// Verify every value of a session, attach the per-value results and
    /// fold them into one session status
    fn verify_charging_session(
        &self,
        session: &mut ChargingSession,
        meters: &dyn MeterResolver,
    ) -> SessionCryptoResult {
        let results: Vec<Vec<CryptoResult>> = {
            let snapshot: &ChargingSession = session;
            snapshot
                .measurements
                .iter()
                .map(|measurement| {
                    let meter = meters.resolve(snapshot, measurement);
                    measurement
                        .values
                        .iter()
                        .enumerate()
                        .map(|(value_index, value)| {
                            let ctx = MeasurementContext {
                                session: snapshot,
                                measurement,
                                meter,
                                record_keys: meters.record_keys(),
                                value_index,
                            };
                            self.verify_measurement(&ctx, value)
                        })
                        .collect()
                })
                .collect()
        };

        let statuses: Vec<VerificationStatus> =
            results.iter().flatten().map(|r| r.status).collect();

        for (measurement, measurement_results) in session.measurements.iter_mut().zip(results) {
            for (value, result) in measurement.values.iter_mut().zip(measurement_results) {
                value.result = Some(result);
            }
        }

        if statuses.len() < 2 {
            debug!(
                "Verifier: session {:?} has {} value(s)",
                session.id,
                statuses.len()
            );
            return SessionCryptoResult::failure(
                VerificationStatus::AtLeastTwoMeasurementsRequired,
                keys::AT_LEAST_TWO_MEASUREMENTS,
            );
        }

        let status = VerificationStatus::fold(statuses);
        let mut result = SessionCryptoResult::new(status);
        if !status.is_valid() {
            result.message = Some(Message::new(format!("{:?}", status)));
        }
        result
    }
}

/// Candidate parser for JSON without a known `@context`.
///
/// Implementations must not share mutable state: the detector runs them
/// concurrently against the same document.
pub trait JsonFormatParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_parse(&self, json: &serde_json::Value) -> ParseOutcome;
}

/// Map a parser error to the tagged failure every entry point returns
pub(crate) fn into_outcome(result: crate::error::Result<ParseOutcome>) -> ParseOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => ParseOutcome::Failure(
            SessionCryptoResult::failure(VerificationStatus::InvalidSessionFormat, e.message_key())
                .with_diagnostic(e),
        ),
    }
}

/// Finish a parsed record: certainty and accumulated messages
pub(crate) fn finish_record(
    mut ctr: ChargeTransparencyRecord,
    checks: ctr_core::FormatChecks,
) -> ParseOutcome {
    ctr.certainty = Some(checks.certainty());
    let (errors, warnings) = checks.into_messages();
    ctr.errors.extend(errors);
    ctr.warnings.extend(warnings);
    ParseOutcome::Record(Box::new(ctr))
}

/// Dispatch a session to its verifier by `@context`
pub fn verify_session(session: &mut ChargingSession, meters: &dyn MeterResolver) -> SessionCryptoResult {
    match session.context.as_deref().and_then(SessionFormat::from_context) {
        Some(format) => format.verifier().verify_charging_session(session, meters),
        None => {
            debug!("Verifier: unknown session context {:?}", session.context);
            SessionCryptoResult::failure(
                VerificationStatus::UnknownSessionFormat,
                keys::UNKNOWN_SESSION_FORMAT,
            )
            .with_diagnostic(session.context.clone().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_round_trip() {
        for format in SessionFormat::ALL {
            assert_eq!(SessionFormat::from_context(&format.context()), Some(format));
            assert_eq!(format.verifier().format(), format);
        }
        assert_eq!(
            SessionFormat::from_context(
                "https://open.charging.cloud/contexts/SessionSignatureFormats/bsm-ws36a-v0+json"
            ),
            Some(SessionFormat::Bsm)
        );
        assert_eq!(SessionFormat::from_context("GDFCrypt01+json"), None);
        assert_eq!(
            SessionFormat::from_context(
                "https://open.charging.cloud/contexts/SessionSignatureFormats/GDFCrypt02+json"
            ),
            None
        );
    }

    struct NoMeters;

    impl MeterResolver for NoMeters {
        fn resolve(&self, _: &ChargingSession, _: &Measurement) -> Option<&EnergyMeter> {
            None
        }
        fn record_keys(&self) -> &[PublicKeyInfo] {
            &[]
        }
    }

    #[test]
    fn test_unknown_context_is_typed_result() {
        let mut session = ChargingSession {
            context: Some("https://example.com/unknown".into()),
            ..Default::default()
        };
        let result = verify_session(&mut session, &NoMeters);
        assert_eq!(result.status, VerificationStatus::UnknownSessionFormat);

        let mut session = ChargingSession::default();
        assert_eq!(
            verify_session(&mut session, &NoMeters).status,
            VerificationStatus::UnknownSessionFormat
        );
    }

    #[test]
    fn test_meter_not_found_folds() {
        let value = MeasurementValue::default();
        let mut session = ChargingSession {
            context: Some(SessionFormat::Gdf.context()),
            measurements: vec![Measurement {
                values: vec![value.clone(), value],
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = verify_session(&mut session, &NoMeters);
        assert_eq!(result.status, VerificationStatus::EnergyMeterNotFound);
        assert!(session.measurements[0].values.iter().all(|v| v.result.is_some()));
    }
}
