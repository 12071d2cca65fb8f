//! S.A.F.E. transparency software XML
//!
//! ```xml
//! <values>
//!   <value transactionId="1" context="Transaction.Begin">
//!     <signedData format="OCMF" encoding="plain">OCMF|...|...</signedData>
//!     <publicKey encoding="base16">3059...</publicKey>
//!   </value>
//! </values>
//! ```
//!
//! No namespace. Each value is routed to OCMF or Alfen by `format`.

use ctr_core::{FormatChecks, Message, ParseOutcome, TextEncoding};
use tracing::debug;

use super::alfen::AlfenSource;
use super::ocmf::OcmfSource;
use super::xml_container::{public_key_element, record_from_sources};
use crate::error::{ParseError, Result};

const VALUE_CHECKS: u32 = 3;

/// Root `<values>` without a namespace
pub fn looks_like_safe(document: &roxmltree::Document<'_>) -> bool {
    let root = document.root_element();
    root.tag_name().name() == "values" && root.tag_name().namespace().is_none()
}

fn child<'a, 'input>(node: roxmltree::Node<'a, 'input>, name: &str) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

fn decode_signed_data(node: roxmltree::Node<'_, '_>) -> Option<String> {
    let text = node.text()?.trim();
    let encoding = TextEncoding::from_label(node.attribute("encoding").unwrap_or("plain"))?;
    let bytes = encoding.decode(text).ok()?;
    String::from_utf8(bytes).ok()
}

pub fn parse_safe(text: &str) -> Result<ParseOutcome> {
    let document = roxmltree::Document::parse(text)?;
    if !looks_like_safe(&document) {
        return Err(ParseError::format("InvalidSAFEFormat", "root is not <values>"));
    }

    let values: Vec<_> = document
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "value")
        .collect();
    let mut checks = FormatChecks::new(VALUE_CHECKS * values.len() as u32);
    let mut ocmf_sources = Vec::new();
    let mut alfen_sources = Vec::new();

    for (i, value) in values.iter().enumerate() {
        let position = i + 1;
        let Some(signed) = child(*value, "signedData") else {
            checks.missing_object("signedData", VALUE_CHECKS - 1);
            continue;
        };
        let format = signed.attribute("format").unwrap_or_default().to_ascii_uppercase();
        let known = checks.check(format == "OCMF" || format == "ALFEN", || {
            Message::new("InvalidField").with_param("format").with_param(position)
        });
        let decoded = decode_signed_data(signed);
        checks.check(decoded.is_some(), || {
            Message::new("InvalidField").with_param("encoding").with_param(position)
        });
        let public_key = child(*value, "publicKey").and_then(public_key_element);
        checks.check(public_key.is_some() || format == "ALFEN", || {
            Message::new("MissingField").with_param("publicKey").with_param(position)
        });

        let Some(decoded) = decoded.filter(|_| known) else {
            continue;
        };
        if format == "OCMF" {
            let mut source = OcmfSource::new(decoded);
            source.public_key = public_key;
            ocmf_sources.push(source);
        } else {
            alfen_sources.push(AlfenSource::new(decoded));
        }
    }
    debug!(
        "SAFE: {} value(s), {} OCMF, {} Alfen",
        values.len(),
        ocmf_sources.len(),
        alfen_sources.len()
    );
    record_from_sources(&ocmf_sources, &alfen_sources, checks)
}
