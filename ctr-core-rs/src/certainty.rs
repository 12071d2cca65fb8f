//! Format-check bookkeeping and certainty scoring
//!
//! Each parser declares how many format checks it performs. Every failed
//! check records an error; a missing sub-object records one error plus
//! `secondary` penalties for the checks that would have run inside it.
//!
//! ```text
//! certainty = (total - errors - secondary) / total,  floored at 0
//! ```

use crate::result::{keys, Message};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatChecks {
    total: u32,
    errors: Vec<Message>,
    warnings: Vec<Message>,
    secondary_errors: u32,
}

impl FormatChecks {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Grow the declared check count, e.g. per data set of a session
    pub fn add_checks(&mut self, n: u32) {
        self.total = self.total.saturating_add(n);
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn errors(&self) -> &[Message] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Message] {
        &self.warnings
    }

    pub fn secondary_errors(&self) -> u32 {
        self.secondary_errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error(&mut self, message: Message) {
        self.errors.push(message);
    }

    pub fn warn(&mut self, message: Message) {
        self.warnings.push(message);
    }

    /// Record a failed check unless `ok`; returns `ok`
    pub fn check(&mut self, ok: bool, message: impl FnOnce() -> Message) -> bool {
        if !ok {
            self.errors.push(message());
        }
        ok
    }

    /// Require a field to be present
    pub fn require<T>(&mut self, value: Option<T>, field: &str) -> Option<T> {
        if value.is_none() {
            self.errors.push(Message::new(keys::MISSING_FIELD).with_param(field));
        }
        value
    }

    /// A whole required sub-object is missing: one error, plus `cascaded`
    /// penalties for the checks that would have run inside it
    pub fn missing_object(&mut self, field: &str, cascaded: u32) {
        self.errors.push(Message::new(keys::MISSING_FIELD).with_param(field));
        self.secondary_errors = self.secondary_errors.saturating_add(cascaded);
    }

    pub fn merge(&mut self, other: FormatChecks) {
        self.total = self.total.saturating_add(other.total);
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.secondary_errors = self.secondary_errors.saturating_add(other.secondary_errors);
    }

    pub fn certainty(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let failed = self.errors.len() as u64 + u64::from(self.secondary_errors);
        let passed = u64::from(self.total).saturating_sub(failed);
        (passed as f64 / f64::from(self.total)).clamp(0.0, 1.0)
    }

    pub fn into_messages(self) -> (Vec<Message>, Vec<Message>) {
        (self.errors, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certainty_formula() {
        let mut checks = FormatChecks::new(10);
        assert_eq!(checks.certainty(), 1.0);

        checks.error(Message::new("a"));
        assert!((checks.certainty() - 0.9).abs() < 1e-9);

        checks.missing_object("meterInfo", 3);
        // 10 - 2 errors - 3 secondary
        assert!((checks.certainty() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_certainty_floor() {
        let mut checks = FormatChecks::new(2);
        checks.missing_object("x", 10);
        checks.error(Message::new("y"));
        assert_eq!(checks.certainty(), 0.0);
        assert_eq!(FormatChecks::new(0).certainty(), 0.0);
    }

    #[test]
    fn test_require_and_check() {
        let mut checks = FormatChecks::new(4);
        assert_eq!(checks.require(Some(3), "a"), Some(3));
        assert_eq!(checks.require::<u8>(None, "b"), None);
        assert!(!checks.check(false, || Message::new("c")));
        assert_eq!(checks.errors().len(), 2);
        assert_eq!(checks.errors()[0].params, vec!["b".to_string()]);
    }
}
