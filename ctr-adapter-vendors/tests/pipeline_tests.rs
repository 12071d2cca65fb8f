//! End-to-end tests for the verification pipeline

use chrono::DateTime;
use ctr_adapter_vendors::{
    CancellationToken, FileBuffer, VerificationOutcome, Verifier, VerifierConfig, VerifierError,
};
use ctr_core::{InvalidDataSetKind, TransactionType, VerificationStatus};
use serde_json::Value;

const GDF_SESSION: &str = include_str!("fixtures/gdf_session.json");
const GDF_METER_KEY: &str = include_str!("fixtures/gdf_meter_key.pem");

const OCMF_SAMPLE: &str = r#"OCMF|{"FV":"1.0","GI":"KEBA_KCP30","GS":"17619300","GV":"2.8.5","PG":"T9289","MV":"Phoenix Contact","MM":"EEM-350-D-MCB","MS":"BQ27400330016","MF":"1.0","IS":true,"IL":"VERIFIED","IF":["RFID_PLAIN","OCPP_RS_TLS"],"IT":"ISO14443","ID":"1F2D3A4F5506C7","RD":[{"TM":"2019-06-26T08:57:44,337+0000 U","TX":"B","RV":268.978,"RI":"1-b:1.8.0","RU":"kWh","ST":"G"}]}|{"SD":"304402201234"}"#;

fn json_file(name: &str, value: &Value) -> FileBuffer {
    FileBuffer::new(name, serde_json::to_vec(value).unwrap())
}

fn gdf_fixture() -> Value {
    serde_json::from_str(GDF_SESSION).unwrap()
}

/// Stations-only and sessions-only halves of the GDF fixture
fn gdf_halves() -> (Value, Value) {
    let mut stations = gdf_fixture();
    let mut sessions = gdf_fixture();
    stations.as_object_mut().unwrap().remove("chargingSessions");
    sessions.as_object_mut().unwrap().remove("chargingStations");
    (stations, sessions)
}

async fn verify(files: Vec<FileBuffer>) -> VerificationOutcome {
    Verifier::new(VerifierConfig::default())
        .verify_files(files, None)
        .await
        .unwrap()
}

fn session_status(outcome: &VerificationOutcome) -> VerificationStatus {
    let ctr = outcome.record().expect("record");
    ctr.charging_sessions[0]
        .verification_result
        .as_ref()
        .expect("verified session")
        .status
}

#[tokio::test]
async fn test_gdf_fixture_verifies() {
    let outcome = verify(vec![json_file("gdf.json", &gdf_fixture())]).await;
    assert_eq!(session_status(&outcome), VerificationStatus::ValidSignature);

    let ctr = outcome.record().unwrap();
    let values = &ctr.charging_sessions[0].measurements[0].values;
    for value in values {
        let trace = value.result.as_ref().unwrap();
        assert_eq!(trace.status, VerificationStatus::ValidSignature);
        assert_eq!(trace.buffer.as_ref().unwrap().len(), 640);
    }
    assert_eq!(ctr.certainty, Some(1.0));
}

#[tokio::test]
async fn test_gdf_fixture_tampered_value() {
    let mut fixture = gdf_fixture();
    fixture["chargingSessions"][0]["measurements"][0]["values"][0]["value"] =
        Value::String("268.979".into());
    let outcome = verify(vec![json_file("gdf.json", &fixture)]).await;
    assert_eq!(session_status(&outcome), VerificationStatus::InvalidSignature);

    let values = &outcome.record().unwrap().charging_sessions[0].measurements[0].values;
    assert_eq!(
        values[0].result.as_ref().unwrap().status,
        VerificationStatus::InvalidSignature
    );
    assert_eq!(
        values[1].result.as_ref().unwrap().status,
        VerificationStatus::ValidSignature
    );
}

#[tokio::test]
async fn test_ocmf_text_file() {
    let outcome = verify(vec![FileBuffer::new("ocmf.txt", OCMF_SAMPLE)]).await;
    let session = &outcome.record().unwrap().charging_sessions[0];

    let expected = DateTime::parse_from_rfc3339("2019-06-26T08:57:44.337+00:00").unwrap();
    assert_eq!(session.begin, Some(expected));
    assert_eq!(session.end, Some(expected));
    assert_eq!(session.pagination, Some(9289));
    assert_eq!(session.transaction_type, Some(TransactionType::Transaction));
}

#[tokio::test]
async fn test_bad_text_file_does_not_abort_batch() {
    let unsupported = OCMF_SAMPLE.replace("\"FV\":\"1.0\"", "\"FV\":\"1.1\"");
    let outcome = verify(vec![
        FileBuffer::new("ocmf.txt", OCMF_SAMPLE),
        FileBuffer::new("newer.txt", unsupported),
        FileBuffer::new("alfen.txt", "AP;0;3;truncated;"),
    ])
    .await;

    let ctr = outcome.record().expect("record from the readable file");
    assert_eq!(ctr.charging_sessions.len(), 1);
    assert_eq!(ctr.charging_sessions[0].pagination, Some(9289));

    let names: Vec<_> = ctr
        .invalid_data_sets
        .iter()
        .map(|set| set.file_name.as_deref())
        .collect();
    assert_eq!(names, vec![Some("newer.txt"), Some("alfen.txt")]);
    assert!(ctr
        .invalid_data_sets
        .iter()
        .all(|set| matches!(set.result, InvalidDataSetKind::Failure(_))));
}

#[tokio::test]
async fn test_partial_records_merge_and_verify() {
    let (stations, sessions) = gdf_halves();
    let outcome = verify(vec![
        json_file("stations.json", &stations),
        json_file("sessions.json", &sessions),
    ])
    .await;

    let ctr = outcome.record().unwrap();
    assert_eq!(ctr.charging_stations.len(), 1);
    assert_eq!(ctr.charging_sessions.len(), 1);
    assert!(ctr.invalid_data_sets.is_empty());
    assert_eq!(session_status(&outcome), VerificationStatus::ValidSignature);
    // the stations-only half has no sessions and scores lower
    assert!(ctr.certainty.unwrap() < 1.0);
}

#[tokio::test]
async fn test_separate_pem_key_file() {
    let (mut stations, sessions) = gdf_halves();
    stations["chargingStations"][0]["evses"][0]["meters"][0]
        .as_object_mut()
        .unwrap()
        .remove("publicKeys");

    let without_key = verify(vec![
        json_file("stations.json", &stations),
        json_file("sessions.json", &sessions),
    ])
    .await;
    assert_eq!(session_status(&without_key), VerificationStatus::PublicKeyNotFound);

    let outcome = verify(vec![
        json_file("stations.json", &stations),
        json_file("sessions.json", &sessions),
        FileBuffer::new("meter.pem", GDF_METER_KEY),
    ])
    .await;
    let ctr = outcome.record().unwrap();
    assert_eq!(ctr.invalid_data_sets.len(), 1);
    assert_eq!(ctr.invalid_data_sets[0].file_name.as_deref(), Some("meter.pem"));
    assert!(matches!(
        ctr.invalid_data_sets[0].result,
        InvalidDataSetKind::PublicKey(_)
    ));
    assert_eq!(session_status(&outcome), VerificationStatus::ValidSignature);
}

#[tokio::test]
async fn test_unrecognised_json_same_in_both_modes() {
    let files = vec![json_file("other.json", &serde_json::json!({ "hello": "world" }))];

    let parallel = verify(files.clone()).await;
    let sequential = Verifier::new(VerifierConfig::new().sequential())
        .verify_files(files, None)
        .await
        .unwrap();

    assert_eq!(
        parallel.status(),
        Some(VerificationStatus::NoChargeTransparencyRecordsFound)
    );
    assert_eq!(parallel, sequential);
}

#[tokio::test]
async fn test_cancelled_run_returns_error() {
    let token = CancellationToken::new();
    token.cancel();
    let result = Verifier::new(VerifierConfig::default())
        .verify_files(vec![json_file("gdf.json", &gdf_fixture())], Some(&token))
        .await;
    assert!(matches!(result, Err(VerifierError::Cancelled)));
}

#[tokio::test]
async fn test_outcome_serializes() {
    let outcome = verify(vec![json_file("gdf.json", &gdf_fixture())]).await;
    let json = serde_json::to_value(&outcome).unwrap();
    let session = &json["record"]["chargingSessions"][0];
    assert_eq!(session["verificationResult"]["status"], "ValidSignature");
    assert_eq!(json["record"]["@context"], ctr_core::CTR_CONTEXT);
}
