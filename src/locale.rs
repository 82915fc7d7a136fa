use serde_json::{json, Value};

use crate::error::WorkbenchError;
use crate::settings::QaSettings;

/// Supplies per-locale defaults as a partial settings object (see [`QaSettings::merged`]).
pub trait LocaleRegistry {
    fn defaults_for_locale(&self, lang: &str) -> Value;
}

/// No locale presets at all.
pub struct NoLocales;

impl LocaleRegistry for NoLocales {
    fn defaults_for_locale(&self, _lang: &str) -> Value {
        Value::Null
    }
}

/// Quote, spacing and number conventions for common European locales.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinLocales;

impl LocaleRegistry for BuiltinLocales {
    fn defaults_for_locale(&self, lang: &str) -> Value {
        let primary = primary_subtag(lang);
        match primary.as_str() {
            "fr" => json!({
                "punctuation": {
                    "spacing": [
                        { "symbols": ",.", "before": "no_space", "after": "ignore" },
                        { "symbols": ":;!?", "before": "nbsp", "after": "ignore" }
                    ]
                },
                "quotes": { "allowed_pairs": ["«»", "“”"], "allowed_apostrophes": "’'" },
                "measurements": { "spacing": "nbsp" },
                "numbers": {
                    "decimal_separator": ",",
                    "grouping_separators": ["\u{00A0}", "\u{202F}"],
                    "range_symbol": "–"
                }
            }),
            "de" | "cs" | "pl" | "nl" | "ru" | "es" | "it" | "pt" => {
                let quotes = match primary.as_str() {
                    "de" | "cs" => json!(["„“", "‚‘", "»«"]),
                    "pl" | "nl" => json!(["„”", "«»"]),
                    "ru" => json!(["«»", "„“"]),
                    _ => json!(["«»", "“”", "\"\""]),
                };
                let grouping = match primary.as_str() {
                    "de" | "nl" | "es" | "it" | "pt" => json!(["."]),
                    _ => json!(["\u{00A0}", " "]),
                };
                json!({
                    "quotes": { "allowed_pairs": quotes, "allowed_apostrophes": "’'" },
                    "measurements": { "spacing": "space" },
                    "numbers": {
                        "decimal_separator": ",",
                        "grouping_separators": grouping,
                        "range_symbol": "–"
                    }
                })
            }
            "en" => json!({
                "quotes": { "allowed_pairs": ["“”", "‘’", "\"\""], "allowed_apostrophes": "’'" },
                "numbers": { "decimal_separator": ".", "grouping_separators": [","] }
            }),
            _ => Value::Null,
        }
    }
}

fn primary_subtag(lang: &str) -> String {
    lang.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Global settings with the target locale's defaults layered on top.
pub fn effective_settings(
    global: &QaSettings,
    registry: &dyn LocaleRegistry,
    target_lang: &str,
) -> Result<QaSettings, WorkbenchError> {
    global
        .merged(&registry.defaults_for_locale(target_lang))
        .map_err(|e| WorkbenchError::Settings(format!("locale defaults for {target_lang}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SpacingMode;

    #[test]
    fn french_gets_nbsp_grid() {
        let s = effective_settings(&QaSettings::default(), &BuiltinLocales, "fr-CA").expect("fr");
        let high = s
            .punctuation
            .spacing
            .iter()
            .find(|r| r.symbols.contains('?'))
            .expect("row");
        assert_eq!(high.before, SpacingMode::Nbsp);
        assert_eq!(s.numbers.decimal_separator, ",");
        assert_eq!(s.quotes.allowed_pairs[0], "«»");
    }

    #[test]
    fn unknown_locale_keeps_global() {
        let global = QaSettings::default();
        let s = effective_settings(&global, &BuiltinLocales, "tlh").expect("tlh");
        assert_eq!(s, global);
    }

    #[test]
    fn german_quotes() {
        let s = effective_settings(&QaSettings::default(), &BuiltinLocales, "de_DE").expect("de");
        assert!(s.quotes.allowed_pairs.contains(&"„“".to_string()));
        assert_eq!(s.numbers.grouping_separators, vec![".".to_string()]);
    }
}
