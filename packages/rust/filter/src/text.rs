//! Free-text collection and keyword matching.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Nesting limit for strings that decode to further JSON.
const MAX_REDECODE_DEPTH: usize = 32;

/// Append every string reachable from `value` to `out`.
///
/// Objects contribute their values, arrays their elements. A string
/// contributes itself and, when it parses as JSON, the text of the parsed
/// value as well. Numbers, booleans and nulls contribute nothing.
pub fn collect_text(value: &Value, out: &mut Vec<String>) {
    collect_inner(value, out, 0);
}

fn collect_inner(value: &Value, out: &mut Vec<String>, depth: usize) {
    match value {
        Value::Object(map) => {
            for v in map.values() {
                collect_inner(v, out, depth);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_inner(v, out, depth);
            }
        }
        Value::String(s) => {
            out.push(s.clone());
            if depth < MAX_REDECODE_DEPTH {
                if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                    collect_inner(&parsed, out, depth + 1);
                }
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Lower-case, then strip diacritics.
///
/// Text is canonically decomposed and every combining mark is dropped: the
/// whole `M` category (`Mn`, `Mc`, `Me`), not only nonspacing marks. For
/// Latin text the two are the same.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Substring matcher over normalized text.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    /// Normalize and keep the non-blank keywords.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| normalize_text(k.as_ref().trim()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Whether any keyword occurs in `text` once normalized.
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() || self.keywords.is_empty() {
            return false;
        }
        let content = normalize_text(text);
        self.keywords.iter().any(|k| content.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collected(value: Value) -> Vec<String> {
        let mut out = Vec::new();
        collect_text(&value, &mut out);
        out
    }

    #[test]
    fn walks_objects_and_lists() {
        let texts = collected(json!({
            "a": "one",
            "b": ["two", {"c": "three"}],
            "d": 4,
            "e": null,
            "f": true
        }));
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn decodes_json_encoded_strings() {
        let inner = json!({"nature": "Jugement d'ouverture", "complement": "[\"x\"]"}).to_string();
        let texts = collected(json!({"jugement": inner}));

        assert_eq!(texts[0], inner);
        assert!(texts.contains(&"Jugement d'ouverture".to_string()));
        // Twice-encoded list inside the decoded object.
        assert!(texts.contains(&"x".to_string()));
    }

    #[test]
    fn numeric_strings_add_nothing_extra() {
        assert_eq!(collected(json!("123")), vec!["123"]);
    }

    #[test]
    fn deep_reencoding_is_bounded() {
        // "leaf" wrapped in five layers of string encoding.
        let mut value = json!("leaf");
        for _ in 0..5 {
            value = Value::String(value.to_string());
        }

        assert_eq!(collected(value.clone()).len(), 6);
        assert_eq!(collected(value.clone()).last().map(String::as_str), Some("leaf"));

        // Three layers left before the limit: the outer string plus three decodes.
        let mut out = Vec::new();
        collect_inner(&value, &mut out, MAX_REDECODE_DEPTH - 3);
        assert_eq!(out.len(), 4);
        assert!(!out.contains(&"leaf".to_string()));
    }

    #[test]
    fn normalization_strips_case_and_accents() {
        assert_eq!(
            normalize_text("Clôture pour INSUFFISANCE d'Actifs"),
            "cloture pour insuffisance d'actifs"
        );
        assert_eq!(normalize_text("Société Générale"), "societe generale");
    }

    #[test]
    fn keywords_match_case_and_accent_insensitively() {
        let matcher = KeywordMatcher::new(["liquidation judiciaire", "Clôture pour insuffisance d'actifs"]);
        assert!(matcher.matches("Jugement prononçant la Liquidation Judiciaire"));
        assert!(matcher.matches("clôture pour insuffisance d'actifs"));
        assert!(!matcher.matches("Vente de fonds de commerce"));
        assert!(!matcher.matches(""));
    }

    #[test]
    fn blank_keywords_are_ignored() {
        let matcher = KeywordMatcher::new(["  ", ""]);
        assert!(matcher.is_empty());
        assert!(!matcher.matches("anything"));
    }
}
