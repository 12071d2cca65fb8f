//! Mennekes charge controller export: transaction metadata plus OCMF
//! meter values, each optionally with the meter's public key.

use ctr_core::{FormatChecks, Message, ParseOutcome, PublicKeyInfo};
use serde::{Deserialize, Serialize};

use super::ocmf::{parse_sources, OcmfSource};
use super::{into_outcome, JsonFormatParser};
use crate::error::{ParseError, Result};

const EXPORT_CHECKS: u32 = 4;
const VALUE_CHECKS: u32 = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MennekesExport {
    #[serde(default)]
    pub transaction: Option<MennekesTransaction>,
    #[serde(default)]
    pub meter_values: Option<Vec<MennekesMeterValue>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MennekesTransaction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub evse_id: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MennekesMeterValue {
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

fn parse_export(json: &serde_json::Value) -> Result<ParseOutcome> {
    let export: MennekesExport = serde_json::from_value(json.clone())?;
    let mut checks = FormatChecks::new(EXPORT_CHECKS);

    let transaction = match export.transaction {
        Some(transaction) => {
            checks.require(transaction.id.as_ref(), "transaction.id");
            checks.require(transaction.evse_id.as_ref(), "transaction.evseId");
            transaction
        }
        None => {
            checks.missing_object("transaction", 2);
            MennekesTransaction::default()
        }
    };
    let meter_values = checks
        .require(export.meter_values.filter(|v| !v.is_empty()), "meterValues")
        .ok_or_else(|| ParseError::format(ctr_core::keys::MISSING_FIELD, "meterValues"))?;
    checks.add_checks(VALUE_CHECKS * meter_values.len() as u32);

    let mut sources = Vec::new();
    for (i, value) in meter_values.iter().enumerate() {
        let position = i + 1;
        checks.check(value.value_type.as_deref() == Some("OCMF"), || {
            Message::new("InvalidField").with_param("type").with_param(position)
        });
        let Some(data) = checks.require(value.data.clone(), "data") else {
            continue;
        };
        let mut source = OcmfSource::new(data);
        source.evse_id = transaction.evse_id.clone();
        source.public_key = value.public_key.clone().map(|key| PublicKeyInfo {
            encoding: Some("hex".into()),
            value: key,
            ..Default::default()
        });
        sources.push(source);
    }

    let mut record = parse_sources(&sources)?;
    if let (Some(id), [session]) = (&transaction.id, record.ctr.charging_sessions.as_mut_slice()) {
        session.id = Some(id.clone());
    }
    record.ctr.id = transaction.id.or(record.ctr.id);
    record.checks.merge(checks);
    Ok(record.finish())
}

pub struct MennekesParser;

impl JsonFormatParser for MennekesParser {
    fn name(&self) -> &'static str {
        "Mennekes"
    }

    fn try_parse(&self, json: &serde_json::Value) -> ParseOutcome {
        into_outcome(parse_export(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestKey;
    use crate::vendors::ocmf::tests::{reading_payload, signed_document};
    use ctr_core::{codec, Curve};
    use serde_json::json;

    #[test]
    fn test_export_maps_transaction() {
        let key = TestKey::new(Curve::Secp256r1);
        let der = codec::hex_encode(&key.der());
        let doc = json!({
            "transaction": { "id": "TX-4711", "evseId": "DE*MEN*E0001*1", "start": "2019-06-26T08:57:44Z" },
            "meterValues": [
                { "type": "OCMF", "data": signed_document(&key, &reading_payload("T1", "B", "2019-06-26T08:57:44,337+0000 S", "1.5")), "publicKey": der },
                { "type": "OCMF", "data": signed_document(&key, &reading_payload("T2", "E", "2019-06-26T09:57:44,337+0000 S", "9.5")), "publicKey": der }
            ]
        });
        let ParseOutcome::Record(ctr) = MennekesParser.try_parse(&doc) else {
            panic!("expected record");
        };
        assert_eq!(ctr.certainty, Some(1.0));
        assert_eq!(ctr.id.as_deref(), Some("TX-4711"));
        let session = &ctr.charging_sessions[0];
        assert_eq!(session.id.as_deref(), Some("TX-4711"));
        assert_eq!(session.evse_id.as_deref(), Some("DE*MEN*E0001*1"));
    }

    #[test]
    fn test_unrelated_json_fails() {
        let outcome = MennekesParser.try_parse(&json!({ "foo": 1 }));
        assert_eq!(outcome.certainty(), 0.0);
        assert!(!outcome.is_record());
    }
}
