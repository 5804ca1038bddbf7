//! Regex-based redaction applied before text is persisted.

use once_cell::sync::Lazy;
use pipeline::TextSanitizer;
use regex::Regex;
use tracing::debug;

/// One redaction pattern and its replacement text.
#[derive(Debug, Clone)]
struct RedactionRule {
    name: String,
    pattern: Regex,
    replacement: String,
}

impl RedactionRule {
    fn new(name: &str, pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }
}

// Applied in order: credentials first so key material never survives as a
// partial match of a later rule, IPv4 before phone numbers.
static DEFAULT_RULES: Lazy<Vec<RedactionRule>> = Lazy::new(|| {
    [
        (
            "bearer_token",
            r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*",
            "Bearer [REDACTED]",
        ),
        (
            "api_key",
            r"\b(?:sk|pk|rk)-[A-Za-z0-9_-]{16,}",
            "[REDACTED_KEY]",
        ),
        (
            "email",
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            "[REDACTED_EMAIL]",
        ),
        (
            "ipv4",
            r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            "[REDACTED_IP]",
        ),
        (
            "phone",
            r"(?:\+\d{1,3}[ .-]?)?\(?\d{3}\)?[ .-]\d{3}[ .-]\d{4}\b",
            "[REDACTED_PHONE]",
        ),
    ]
    .into_iter()
    .map(|(name, pattern, replacement)| {
        RedactionRule::new(name, pattern, replacement)
            .expect("built-in redaction pattern is valid")
    })
    .collect()
});

/// [`TextSanitizer`] that replaces credentials, e-mail addresses, IPv4
/// addresses, and phone numbers with fixed placeholders.
#[derive(Debug, Clone)]
pub struct RegexSanitizer {
    rules: Vec<RedactionRule>,
}

impl Default for RegexSanitizer {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl RegexSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project-specific rule, applied after the built-in ones.
    pub fn with_rule(
        mut self,
        name: &str,
        pattern: &str,
        replacement: &str,
    ) -> Result<Self, regex::Error> {
        self.rules
            .push(RedactionRule::new(name, pattern, replacement)?);
        Ok(self)
    }
}

impl TextSanitizer for RegexSanitizer {
    fn sanitize(&self, text: &str) -> String {
        let mut result = text.to_string();
        for rule in &self.rules {
            let matches = rule.pattern.find_iter(&result).count();
            if matches > 0 {
                result = rule
                    .pattern
                    .replace_all(&result, rule.replacement.as_str())
                    .into_owned();
                debug!(rule = %rule.name, matches, "Redacted text");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_contact_details_and_credentials() {
        let sanitizer = RegexSanitizer::new();
        let text = "Contact jane.doe@example.com or (555) 123-4567 from 10.0.0.12 \
                    using sk-abcdefghijklmnop1234";
        assert_eq!(
            sanitizer.sanitize(text),
            "Contact [REDACTED_EMAIL] or [REDACTED_PHONE] from [REDACTED_IP] \
             using [REDACTED_KEY]"
        );
    }

    #[test]
    fn redacts_bearer_tokens() {
        let sanitizer = RegexSanitizer::new();
        assert_eq!(
            sanitizer.sanitize("Authorization: Bearer eyJhbGciOi.abc-def"),
            "Authorization: Bearer [REDACTED]"
        );
    }

    #[test]
    fn leaves_ordinary_code_alone() {
        let sanitizer = RegexSanitizer::new();
        let code = "fn main() { let port = 8080; println!(\"v1.2\"); }";
        assert_eq!(sanitizer.sanitize(code), code);
    }

    #[test]
    fn custom_rules_apply_after_builtins() {
        let sanitizer = RegexSanitizer::new()
            .with_rule("ticket", r"ACME-\d+", "[TICKET]")
            .unwrap();
        assert_eq!(sanitizer.sanitize("fixes ACME-42"), "fixes [TICKET]");
        assert!(RegexSanitizer::new().with_rule("bad", "(", "x").is_err());
    }
}
