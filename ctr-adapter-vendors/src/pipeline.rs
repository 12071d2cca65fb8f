//! Verification pipeline
//!
//! ```text
//! files ─▶ expand archives ─▶ detect per file ─▶ merge ─▶ assemble ─▶ localize
//!                                 │
//!                                 └─ OCMF / Alfen text lines of all files
//!                                    are joined into one record
//! ```
//!
//! Cancellation is checked before expansion and before every file; a
//! cancelled run returns [`VerifierError::Cancelled`] and no partial record.

use std::sync::Arc;

use ctr_core::{
    keys, ChargeTransparencyRecord, InvalidDataSet, InvalidDataSetKind, KeyEchoLocalizer,
    Localizer, Message, ParseOutcome, SessionCryptoResult, VerificationStatus,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::archive::{expand_archives, ArchiveExpander, FileBuffer, NoArchiveExpander};
use crate::assembler::Assembler;
use crate::config::VerifierConfig;
use crate::detect::{sniff, FormatDetector};
use crate::error::VerifierError;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation shared between a caller and a running
/// verification
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) was called
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), VerifierError> {
    match cancel {
        Some(token) if token.is_cancelled() => {
            info!("Verifier: cancelled");
            Err(VerifierError::Cancelled)
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Final result of one verification run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationOutcome {
    /// Merged and verified record
    Record(Box<ChargeTransparencyRecord>),
    /// No input produced a record
    #[serde(rename_all = "camelCase")]
    Failure {
        result: SessionCryptoResult,
        invalid_data_sets: Vec<InvalidDataSet>,
    },
}

impl VerificationOutcome {
    pub fn record(&self) -> Option<&ChargeTransparencyRecord> {
        match self {
            VerificationOutcome::Record(ctr) => Some(ctr),
            VerificationOutcome::Failure { .. } => None,
        }
    }

    pub fn status(&self) -> Option<VerificationStatus> {
        match self {
            VerificationOutcome::Record(_) => None,
            VerificationOutcome::Failure { result, .. } => Some(result.status),
        }
    }
}

// ============================================================================
// Localization
// ============================================================================

fn localize_messages(localizer: &dyn Localizer, messages: &mut [Message]) {
    for message in messages {
        localizer.localize(message);
    }
}

fn localize_result(localizer: &dyn Localizer, result: &mut SessionCryptoResult) {
    if let Some(message) = result.message.as_mut() {
        localizer.localize(message);
    }
    localize_messages(localizer, &mut result.errors);
    localize_messages(localizer, &mut result.warnings);
}

fn localize_invalid(localizer: &dyn Localizer, invalid: &mut [InvalidDataSet]) {
    for data_set in invalid {
        if let InvalidDataSetKind::Failure(result) = &mut data_set.result {
            localize_result(localizer, result);
        }
    }
}

fn localize_record(localizer: &dyn Localizer, ctr: &mut ChargeTransparencyRecord) {
    localize_messages(localizer, &mut ctr.errors);
    localize_messages(localizer, &mut ctr.warnings);
    for session in &mut ctr.charging_sessions {
        if let Some(result) = session.verification_result.as_mut() {
            localize_result(localizer, result);
        }
    }
    localize_invalid(localizer, &mut ctr.invalid_data_sets);
}

// ============================================================================
// Verifier
// ============================================================================

/// End-to-end verification of a set of input files
#[derive(Clone)]
pub struct Verifier {
    config: VerifierConfig,
    detector: FormatDetector,
    expander: Arc<dyn ArchiveExpander>,
    localizer: Arc<dyn Localizer>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}

impl Verifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            detector: FormatDetector::new(&config),
            config,
            expander: Arc::new(NoArchiveExpander),
            localizer: Arc::new(KeyEchoLocalizer),
        }
    }

    pub fn with_expander(mut self, expander: Arc<dyn ArchiveExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_detector(mut self, detector: FormatDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn detector(&self) -> &FormatDetector {
        &self.detector
    }

    /// Detect, merge and verify `files`
    pub async fn verify_files(
        &self,
        files: Vec<FileBuffer>,
        cancel: Option<&CancellationToken>,
    ) -> Result<VerificationOutcome, VerifierError> {
        check_cancelled(cancel)?;
        info!("Verifier: {} input file(s)", files.len());

        let expansion =
            expand_archives(files, self.expander.as_ref(), self.config.max_archive_passes).await;
        if expansion.passes > 0 {
            debug!(
                "Verifier: {} archive pass(es), {} file(s) after expansion",
                expansion.passes,
                expansion.files.len()
            );
        }

        let mut outcomes: Vec<(Option<String>, ParseOutcome)> = expansion
            .failures
            .into_iter()
            .map(|(name, error)| {
                let result = SessionCryptoResult::failure(
                    VerificationStatus::InvalidSessionFormat,
                    keys::UNKNOWN_FORMAT,
                )
                .with_diagnostic(error);
                (Some(name), ParseOutcome::Failure(result))
            })
            .collect();

        let text_files: Vec<&FileBuffer> = expansion
            .files
            .iter()
            .filter(|file| sniff(file).is_text_record())
            .collect();
        let mut text_records_done = false;

        for file in &expansion.files {
            check_cancelled(cancel)?;
            if sniff(file).is_text_record() {
                if text_records_done {
                    continue;
                }
                text_records_done = true;
                outcomes.extend(self.detector.detect_text_files(&text_files));
                continue;
            }
            let outcome = self.detector.detect_file(file).await;
            if let ParseOutcome::Failure(result) = &outcome {
                warn!(
                    "Verifier: {} not recognised: {}",
                    file.name,
                    result.diagnostic.as_deref().unwrap_or("-")
                );
            }
            outcomes.push((Some(file.name.clone()), outcome));
        }

        check_cancelled(cancel)?;
        let mut ctr = match crate::merge::merge_outcomes(outcomes) {
            Ok(ctr) => ctr,
            Err(mut invalid_data_sets) => {
                warn!("Verifier: no charge transparency records found");
                let mut result = SessionCryptoResult::failure(
                    VerificationStatus::NoChargeTransparencyRecordsFound,
                    keys::NO_RECORDS_FOUND,
                );
                localize_result(self.localizer.as_ref(), &mut result);
                localize_invalid(self.localizer.as_ref(), &mut invalid_data_sets);
                return Ok(VerificationOutcome::Failure {
                    result,
                    invalid_data_sets,
                });
            }
        };

        let summary = Assembler::new()
            .with_key_attestation(self.config.verify_public_key_signatures)
            .assemble(&mut ctr);
        info!(
            "Verifier: {} of {} session(s) valid",
            summary.valid, summary.sessions
        );

        localize_record(self.localizer.as_ref(), &mut ctr);
        Ok(VerificationOutcome::Record(Box::new(ctr)))
    }
}
