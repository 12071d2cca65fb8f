//! Configuration for the verification pipeline

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Upper bound on archive-expansion passes
    pub max_archive_passes: usize,

    /// Run JSON candidate parsers concurrently on blocking tasks
    pub parallel_fan_out: bool,

    /// Candidates at or below this certainty are discarded
    pub min_plausible_certainty: f64,

    /// Check attestation signatures on every meter public key
    pub verify_public_key_signatures: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_archive_passes: 8,
            parallel_fan_out: true,
            min_plausible_certainty: 0.0,
            verify_public_key_signatures: true,
        }
    }
}

impl VerifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set archive pass limit (at least one pass)
    pub fn with_max_archive_passes(mut self, passes: usize) -> Self {
        self.max_archive_passes = passes.max(1);
        self
    }

    /// Run JSON candidate parsers one after another
    pub fn sequential(mut self) -> Self {
        self.parallel_fan_out = false;
        self
    }

    pub fn with_min_plausible_certainty(mut self, certainty: f64) -> Self {
        self.min_plausible_certainty = certainty.clamp(0.0, 1.0);
        self
    }

    /// Skip public key attestation checks
    pub fn without_key_attestation(mut self) -> Self {
        self.verify_public_key_signatures = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = VerifierConfig::default();
        assert_eq!(config.max_archive_passes, 8);
        assert!(config.parallel_fan_out);
        assert!(config.verify_public_key_signatures);

        let config = VerifierConfig::new()
            .with_max_archive_passes(0)
            .sequential()
            .with_min_plausible_certainty(2.0)
            .without_key_attestation();
        assert_eq!(config.max_archive_passes, 1);
        assert!(!config.parallel_fan_out);
        assert_eq!(config.min_plausible_certainty, 1.0);
        assert!(!config.verify_public_key_signatures);
    }
}
