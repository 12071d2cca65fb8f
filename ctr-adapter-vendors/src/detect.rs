//! Format detection
//!
//! Envelope by content sniffing (BOM stripped):
//!
//! | Content | Route |
//! |---------|-------|
//! | `<?xml` / `<` | SAFE XML when the root is a plain `<values>`, else the generic container |
//! | `OCMF` | OCMF text records |
//! | `AP;` | Alfen text records |
//! | `{` / `[` | JSON: known `@context`, else fan-out |
//! | PEM public key | public key lookup |
//! | archive magic | left to the archive expander |
//!
//! JSON without a known `@context` goes to every candidate parser. The
//! candidates run independently (concurrently on the blocking pool unless
//! configured otherwise) and are ranked by certainty; equal certainties are
//! won by the parser registered first, whatever order they finished in.

use std::sync::Arc;

use ctr_core::{keys, FormatChecks, ParseOutcome, SessionCryptoResult, VerificationStatus, CTR_CONTEXT};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::archive::{sniff_archive, ArchiveKind, FileBuffer};
use crate::config::VerifierConfig;
use crate::error::{ParseError, VerifierError};
use crate::vendors::alfen::{self, AlfenSource, ALFEN_PREFIX};
use crate::vendors::bsm::{BsmParser, BSM_CONTEXT};
use crate::vendors::chargeit::{ChargeItParser, CHARGEIT_CONTEXT};
use crate::vendors::chargepoint::ChargePointParser;
use crate::vendors::mennekes::MennekesParser;
use crate::vendors::native::{parse_native, parse_pem_public_key, PEM_PUBLIC_KEY_BEGIN};
use crate::vendors::ocmf::{self, OcmfSource};
use crate::vendors::ocpi::OcpiParser;
use crate::vendors::{into_outcome, safe_xml, xml_container, JsonFormatParser};

/// Outer shape of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Xml,
    OcmfText,
    AlfenText,
    Json,
    PemPublicKey,
    Archive(ArchiveKind),
    Unknown,
}

impl Envelope {
    /// Text records are joined across files before parsing
    pub fn is_text_record(&self) -> bool {
        matches!(self, Envelope::OcmfText | Envelope::AlfenText)
    }
}

pub fn sniff(file: &FileBuffer) -> Envelope {
    let Some(text) = file.text() else {
        return sniff_archive(&file.bytes).map_or(Envelope::Unknown, Envelope::Archive);
    };
    let text = text.trim_start();
    if text.starts_with('<') {
        Envelope::Xml
    } else if text.starts_with("OCMF") {
        Envelope::OcmfText
    } else if text.starts_with(ALFEN_PREFIX) {
        Envelope::AlfenText
    } else if text.starts_with('{') || text.starts_with('[') {
        Envelope::Json
    } else if text.contains(PEM_PUBLIC_KEY_BEGIN) {
        Envelope::PemPublicKey
    } else {
        sniff_archive(&file.bytes).map_or(Envelope::Unknown, Envelope::Archive)
    }
}

/// Parsers tried in this order when a JSON document names no known context
pub fn default_parsers() -> Vec<Arc<dyn JsonFormatParser>> {
    vec![
        Arc::new(ChargeItParser),
        Arc::new(BsmParser),
        Arc::new(ChargePointParser),
        Arc::new(MennekesParser),
        Arc::new(OcpiParser),
    ]
}

/// Every record line of a text file must at least parse as a document
fn screen_text_file(file: &FileBuffer) -> Result<(), ParseError> {
    let text = file
        .text()
        .ok_or_else(|| ParseError::format("InvalidEncoding", "not UTF-8 text"))?;
    for line in text.lines().map(str::trim) {
        if line.starts_with("OCMF") {
            ocmf::parse_document(line)?;
        } else if line.starts_with(ALFEN_PREFIX) {
            alfen::parse_document(line)?;
        }
    }
    Ok(())
}

/// One parser's reading of a document
#[derive(Debug, Clone)]
pub struct Candidate {
    pub parser: &'static str,
    pub outcome: ParseOutcome,
}

/// Highest plausible certainty wins; the earliest candidate wins ties.
/// Failures and candidates at or below `min_plausible` never win.
pub fn rank(candidates: Vec<Candidate>, min_plausible: f64) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        let certainty = candidate.outcome.certainty();
        let plausible = !matches!(candidate.outcome, ParseOutcome::Failure(_)) && certainty > min_plausible;
        debug!(
            "Detector: {} -> certainty {:.3}{}",
            candidate.parser,
            certainty,
            if plausible { "" } else { " (discarded)" }
        );
        if !plausible {
            continue;
        }
        match &best {
            Some(current) if current.outcome.certainty() >= certainty => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn unknown_format(diagnostic: impl ToString) -> ParseOutcome {
    ParseOutcome::Failure(
        SessionCryptoResult::failure(VerificationStatus::InvalidSessionFormat, keys::UNKNOWN_FORMAT)
            .with_diagnostic(diagnostic),
    )
}

/// `@context` of a document, or of the first element of an array
fn json_context(json: &serde_json::Value) -> Vec<&str> {
    let object = match json {
        serde_json::Value::Array(items) => items.first(),
        other => Some(other),
    };
    match object.and_then(|o| o.get("@context")) {
        Some(serde_json::Value::String(s)) => vec![s.as_str()],
        Some(serde_json::Value::Array(list)) => list.iter().filter_map(|v| v.as_str()).collect(),
        _ => Vec::new(),
    }
}

/// Routes input files to vendor parsers
#[derive(Clone)]
pub struct FormatDetector {
    parsers: Vec<Arc<dyn JsonFormatParser>>,
    min_plausible_certainty: f64,
    parallel: bool,
}

impl FormatDetector {
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            parsers: default_parsers(),
            min_plausible_certainty: config.min_plausible_certainty,
            parallel: config.parallel_fan_out,
        }
    }

    /// Replace the candidate list; order decides ties
    pub fn with_parsers(mut self, parsers: Vec<Arc<dyn JsonFormatParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Parse a JSON document: known contexts directly, everything else by
    /// ranked fan-out
    pub async fn detect_json(&self, json: serde_json::Value) -> ParseOutcome {
        let contexts = json_context(&json);
        if contexts.contains(&CTR_CONTEXT) {
            return parse_native(&json);
        }
        if contexts.contains(&CHARGEIT_CONTEXT) {
            return ChargeItParser.try_parse(&json);
        }
        if contexts.contains(&BSM_CONTEXT) {
            return BsmParser.try_parse(&json);
        }

        let candidates = self.fan_out(Arc::new(json)).await;
        let names: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}={:.3}", c.parser, c.outcome.certainty()))
            .collect();
        match rank(candidates, self.min_plausible_certainty) {
            Some(winner) => {
                info!("Detector: JSON recognised as {}", winner.parser);
                winner.outcome
            }
            None => unknown_format(format!("no plausible parser: {}", names.join(", "))),
        }
    }

    async fn fan_out(&self, json: Arc<serde_json::Value>) -> Vec<Candidate> {
        if !self.parallel {
            return self
                .parsers
                .iter()
                .map(|parser| Candidate {
                    parser: parser.name(),
                    outcome: parser.try_parse(&json),
                })
                .collect();
        }

        let names: Vec<&'static str> = self.parsers.iter().map(|p| p.name()).collect();
        let handles = self.parsers.iter().map(|parser| {
            let parser = Arc::clone(parser);
            let json = Arc::clone(&json);
            tokio::task::spawn_blocking(move || parser.try_parse(&json))
        });

        // join_all yields in submission order, not completion order
        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, parser)| Candidate {
                parser,
                outcome: joined.unwrap_or_else(|e| {
                    ParseOutcome::Failure(SessionCryptoResult::invalid_format(VerifierError::Task(
                        e.to_string(),
                    )))
                }),
            })
            .collect()
    }

    /// Join OCMF and Alfen text records from one or more files into a
    /// single record
    /// Text records spread over several files. Each file is screened on its
    /// own and an unreadable one becomes its own failure; the readable files
    /// are joined so begin and end readings in separate files form one
    /// session. If the joined pass fails, the files are read one by one.
    pub fn detect_text_files(&self, files: &[&FileBuffer]) -> Vec<(Option<String>, ParseOutcome)> {
        let mut outcomes = Vec::new();
        let mut readable = Vec::new();
        for file in files {
            match screen_text_file(file) {
                Ok(()) => readable.push(*file),
                Err(e) => {
                    warn!("Detector: {} rejected: {}", file.name, e);
                    outcomes.push((Some(file.name.clone()), into_outcome(Err(e))));
                }
            }
        }
        if readable.is_empty() {
            return outcomes;
        }

        let joined = self.detect_text_records(&readable);
        if joined.is_record() || readable.len() == 1 {
            let names: Vec<&str> = readable.iter().map(|f| f.name.as_str()).collect();
            outcomes.push((Some(names.join(", ")), joined));
        } else {
            debug!(
                "Detector: joined text records failed, reading {} file(s) one by one",
                readable.len()
            );
            for file in readable {
                outcomes.push((Some(file.name.clone()), self.detect_text_records(&[file])));
            }
        }
        outcomes
    }

    pub fn detect_text_records(&self, files: &[&FileBuffer]) -> ParseOutcome {
        let mut ocmf_sources = Vec::new();
        let mut alfen_sources = Vec::new();
        for file in files {
            let Some(text) = file.text() else {
                continue;
            };
            for line in text.lines().map(str::trim) {
                if line.starts_with("OCMF") {
                    ocmf_sources.push(OcmfSource::new(line));
                } else if line.starts_with(ALFEN_PREFIX) {
                    alfen_sources.push(AlfenSource::new(line));
                }
            }
        }
        debug!(
            "Detector: {} OCMF and {} Alfen record(s) in {} file(s)",
            ocmf_sources.len(),
            alfen_sources.len(),
            files.len()
        );
        into_outcome(xml_container::record_from_sources(
            &ocmf_sources,
            &alfen_sources,
            FormatChecks::new(0),
        ))
    }

    fn detect_xml(&self, text: &str) -> ParseOutcome {
        let is_safe = match roxmltree::Document::parse(text) {
            Ok(document) => safe_xml::looks_like_safe(&document),
            Err(e) => return into_outcome(Err(ParseError::from(e))),
        };
        if is_safe {
            match safe_xml::parse_safe(text) {
                Ok(outcome) => return outcome,
                Err(e) => debug!("Detector: not valid SAFE XML ({}), trying generic container", e),
            }
        }
        into_outcome(xml_container::parse_container(text))
    }

    /// Detect and parse one file
    pub async fn detect_file(&self, file: &FileBuffer) -> ParseOutcome {
        let envelope = sniff(file);
        debug!("Detector: {} looks like {:?}", file.name, envelope);
        let text = file.text().unwrap_or_default();
        match envelope {
            Envelope::Xml => self.detect_xml(text),
            Envelope::OcmfText | Envelope::AlfenText => self.detect_text_records(&[file]),
            Envelope::Json => match serde_json::from_str(text) {
                Ok(json) => self.detect_json(json).await,
                Err(e) => into_outcome(Err(ParseError::from(e))),
            },
            Envelope::PemPublicKey => parse_pem_public_key(text),
            Envelope::Archive(kind) => unknown_format(format!("unexpanded {:?} archive", kind)),
            Envelope::Unknown => unknown_format("unrecognised content"),
        }
    }
}
