//! Message localization
//!
//! The core only ever emits message keys with positional parameters.
//! Rendering them is the host's job, behind the [`Localizer`] trait.

use std::collections::HashMap;

use crate::result::Message;

pub trait Localizer: Send + Sync {
    /// Render `key` with `params` substituted for `{0}`, `{1}`, ...
    fn get_message(&self, key: &str, params: &[String]) -> String;

    /// Fill in `message.text`
    fn localize(&self, message: &mut Message) {
        message.text = Some(self.get_message(&message.key, &message.params));
    }
}

/// Echoes the key, with parameters appended in parentheses
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyEchoLocalizer;

impl Localizer for KeyEchoLocalizer {
    fn get_message(&self, key: &str, params: &[String]) -> String {
        if params.is_empty() {
            key.to_string()
        } else {
            format!("{}({})", key, params.join(", "))
        }
    }
}

/// Flat `key → template` catalog, falling back to key echo
#[derive(Debug, Clone, Default)]
pub struct CatalogLocalizer {
    templates: HashMap<String, String>,
}

impl CatalogLocalizer {
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Load a catalog from a JSON object of strings
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Localizer for CatalogLocalizer {
    fn get_message(&self, key: &str, params: &[String]) -> String {
        match self.templates.get(key) {
            Some(template) => params
                .iter()
                .enumerate()
                .fold(template.clone(), |text, (i, param)| {
                    text.replace(&format!("{{{}}}", i), param)
                }),
            None => KeyEchoLocalizer.get_message(key, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_echo() {
        assert_eq!(KeyEchoLocalizer.get_message("A", &[]), "A");
        assert_eq!(
            KeyEchoLocalizer.get_message("A", &["1".into(), "x".into()]),
            "A(1, x)"
        );
    }

    #[test]
    fn test_catalog_substitution() {
        let catalog = CatalogLocalizer::from_json(
            r#"{"UnknownOrInvalidChargeTransparencyRecordFormat": "Unbekanntes Transparenzdatensatzformat",
                "Inconsistent_EnergyMeterValueP": "Messwert {0} ist inkonsistent"}"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get_message("UnknownOrInvalidChargeTransparencyRecordFormat", &[]),
            "Unbekanntes Transparenzdatensatzformat"
        );
        let mut message = Message::new("Inconsistent_EnergyMeterValueP").with_param(1);
        catalog.localize(&mut message);
        assert_eq!(message.text.as_deref(), Some("Messwert 1 ist inkonsistent"));
        assert_eq!(catalog.get_message("Missing", &["a".into()]), "Missing(a)");
    }
}
