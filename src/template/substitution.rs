//! Placeholder substitution engine for message templates

use super::types::{Placeholders, RECORD_ATTRIBUTE_PREFIX};

/// Substitute every placeholder token found in `template`.
///
/// Tokens are matched literally. At each position the longest matching token
/// wins and substituted values are never scanned again, so the output only
/// depends on the template and the mapping. Tokens missing from the mapping
/// are copied through unchanged.
pub fn resolve(template: &str, placeholders: &Placeholders) -> String {
    if template.is_empty() || placeholders.is_empty() {
        return template.to_string();
    }

    let mut tokens: Vec<(&str, String)> = placeholders
        .iter()
        .filter(|(token, _)| !token.is_empty())
        .map(|(token, value)| (token.as_str(), value_to_string(value)))
        .collect();
    tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        if let Some((token, value)) = tokens.iter().find(|(token, _)| rest.starts_with(*token)) {
            output.push_str(value);
            rest = &rest[token.len()..];
            continue;
        }

        let mut chars = rest.chars();
        match chars.next() {
            Some(ch) => {
                output.push(ch);
                rest = chars.as_str();
            }
            None => break,
        }
    }

    output
}

/// String form of a placeholder value
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        // For arrays and objects, use JSON representation
        _ => value.to_string(),
    }
}

/// Names referenced through `{RECORD:<name>}` tokens, in order of first appearance
pub fn record_attribute_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(RECORD_ATTRIBUTE_PREFIX) {
        let after = &rest[start + RECORD_ATTRIBUTE_PREFIX.len()..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty() && !name.contains('{') && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn placeholders(value: serde_json::Value) -> Placeholders {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Placeholders::new(),
        }
    }

    #[test]
    fn test_resolve_simple() {
        let vars = placeholders(json!({ "{OTP}": "123456" }));
        assert_eq!(resolve("Your code: {OTP}", &vars), "Your code: 123456");
    }

    #[test]
    fn test_resolve_repeated_token() {
        let vars = placeholders(json!({ "{APP_NAME}": "Acme" }));
        assert_eq!(
            resolve("{APP_NAME} says hi. Thanks, {APP_NAME}", &vars),
            "Acme says hi. Thanks, Acme"
        );
    }

    #[test]
    fn test_unknown_token_passes_through() {
        let vars = placeholders(json!({ "{OTP}": "987654" }));
        assert_eq!(
            resolve("Code {OTP} for {UNKNOWN}", &vars),
            "Code 987654 for {UNKNOWN}"
        );
    }

    #[test]
    fn test_longest_token_wins() {
        let vars = placeholders(json!({
            "{OTP}": "111111",
            "{OTP_ID}": "otp_abc"
        }));
        assert_eq!(resolve("{OTP_ID}/{OTP}", &vars), "otp_abc/111111");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let vars = placeholders(json!({
            "{RECORD:name}": "{OTP}",
            "{OTP}": "424242"
        }));
        assert_eq!(resolve("Hi {RECORD:name}, {OTP}", &vars), "Hi {OTP}, 424242");
    }

    #[test]
    fn test_value_conversions() {
        let vars = placeholders(json!({
            "{N}": 42,
            "{B}": true,
            "{NULL}": null,
            "{LIST}": [1, 2]
        }));
        assert_eq!(resolve("{N}|{B}|{NULL}|{LIST}", &vars), "42|true||[1,2]");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let vars = placeholders(json!({
            "{A}": "{B}",
            "{B}": "{A}",
            "{OTP}": "000000"
        }));
        let template = "{A}{B}{OTP}{A}";
        let first = resolve(template, &vars);
        for _ in 0..10 {
            assert_eq!(resolve(template, &vars), first);
        }
        assert_eq!(first, "{B}{A}000000{B}");
    }

    #[test]
    fn test_multibyte_text() {
        let vars = placeholders(json!({ "{OTP}": "555" }));
        assert_eq!(
            resolve("Doğrulama kodunuz: *{OTP}* ✓", &vars),
            "Doğrulama kodunuz: *555* ✓"
        );
    }

    #[test]
    fn test_record_attribute_names() {
        let names = record_attribute_names("Hi {RECORD:name}, {RECORD:city} {RECORD:name} {RECORD:");
        assert_eq!(names, vec!["name".to_string(), "city".to_string()]);
        assert!(record_attribute_names("{OTP}").is_empty());
    }
}
