//! Generic XML container
//!
//! Any element whose text starts with `OCMF|` or `AP;` is a signed record.
//! A sibling `publicKey` element supplies the key for OCMF records.

use ctr_core::{ChargeTransparencyRecord, FormatChecks, Message, ParseOutcome, PublicKeyInfo};
use tracing::debug;

use super::alfen::{self, AlfenSource, ALFEN_PREFIX};
use super::finish_record;
use super::ocmf::{self, OcmfSource, OCMF_PREFIX};
use crate::error::{ParseError, Result};
use crate::merge::merge_record;

/// Build one record from collected OCMF and Alfen texts
pub(crate) fn record_from_sources(
    ocmf_sources: &[OcmfSource],
    alfen_sources: &[AlfenSource],
    mut checks: FormatChecks,
) -> Result<ParseOutcome> {
    let mut ctr = ChargeTransparencyRecord::new();
    if !ocmf_sources.is_empty() {
        let record = ocmf::parse_sources(ocmf_sources)?;
        merge_record(&mut ctr, record.ctr);
        checks.merge(record.checks);
    }
    if !alfen_sources.is_empty() {
        let record = alfen::parse_sources(alfen_sources)?;
        merge_record(&mut ctr, record.ctr);
        checks.merge(record.checks);
    }
    if ctr.charging_sessions.is_empty() {
        return Err(ParseError::format("NoSignedDataFound", "no OCMF or Alfen records"));
    }
    Ok(finish_record(ctr, checks))
}

/// Key text of a `publicKey` element
pub(crate) fn public_key_element(node: roxmltree::Node<'_, '_>) -> Option<PublicKeyInfo> {
    let value = node.text()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(PublicKeyInfo {
        encoding: node.attribute("encoding").map(str::to_string),
        format: node.attribute("format").map(str::to_string),
        value: value.to_string(),
        ..Default::default()
    })
}

fn sibling_key(node: roxmltree::Node<'_, '_>) -> Option<PublicKeyInfo> {
    node.parent()?
        .children()
        .filter(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("publicKey"))
        .find_map(public_key_element)
}

pub fn parse_container(text: &str) -> Result<ParseOutcome> {
    let document = roxmltree::Document::parse(text)?;
    let mut ocmf_sources = Vec::new();
    let mut alfen_sources = Vec::new();

    for node in document.descendants().filter(|n| n.is_element()) {
        let Some(content) = node.text().map(str::trim) else {
            continue;
        };
        if content.starts_with(OCMF_PREFIX) {
            let mut source = OcmfSource::new(content);
            source.public_key = sibling_key(node);
            ocmf_sources.push(source);
        } else if content.starts_with(ALFEN_PREFIX) {
            alfen_sources.push(AlfenSource::new(content));
        }
    }
    debug!(
        "XML: {} OCMF and {} Alfen record(s) in <{}>",
        ocmf_sources.len(),
        alfen_sources.len(),
        document.root_element().tag_name().name()
    );

    let mut checks = FormatChecks::new(1);
    checks.check(!ocmf_sources.is_empty() || !alfen_sources.is_empty(), || {
        Message::new("NoSignedDataFound")
    });
    record_from_sources(&ocmf_sources, &alfen_sources, checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendors::alfen::tests::{fields, signed_line};
    use crate::vendors::ocmf::tests::{reading_payload, signed_document};
    use crate::testutil::TestKey;
    use ctr_core::{codec, Curve};

    #[test]
    fn test_collects_nested_records() {
        let key = TestKey::new(Curve::Secp256r1);
        let begin = signed_document(&key, &reading_payload("T1", "B", "2019-06-26T08:57:44,337+0000 S", "1.5"));
        let end = signed_document(&key, &reading_payload("T2", "E", "2019-06-26T09:57:44,337+0000 S", "9.5"));
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<export vendor="any">
  <session>
    <reading><data>{begin}</data><publicKey encoding="hex">{der}</publicKey></reading>
    <reading><data>{end}</data></reading>
  </session>
</export>"#,
            begin = begin.replace('"', "&quot;"),
            end = end.replace('"', "&quot;"),
            der = codec::hex_encode(&key.der()),
        );
        let ParseOutcome::Record(ctr) = parse_container(&xml).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(ctr.charging_sessions.len(), 1);
        assert_eq!(ctr.charging_sessions[0].measurements[0].values.len(), 2);
        let meter = &ctr.charging_stations[0].evses[0].meters[0];
        assert_eq!(meter.public_keys.len(), 1);
    }

    #[test]
    fn test_alfen_lines_in_xml() {
        let key = TestKey::new(Curve::Secp192r1);
        let xml = format!(
            "<root><v>{}</v><v>{}</v></root>",
            signed_line(&key, &fields(1, 100)),
            signed_line(&key, &fields(2, 200))
        );
        let ParseOutcome::Record(ctr) = parse_container(&xml).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(ctr.certainty, Some(1.0));
        assert_eq!(ctr.charging_sessions[0].measurements[0].values.len(), 2);
    }

    #[test]
    fn test_no_records_is_error() {
        let err = parse_container("<root><a>hello</a></root>").unwrap_err();
        assert_eq!(err.message_key(), "NoSignedDataFound");
    }
}
