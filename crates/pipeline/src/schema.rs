//! Structural field/type rules for generator payloads.
//!
//! A [`Schema`] is checked against an untyped [`serde_json::Value`] *before*
//! typed deserialisation, so that a single pass reports every violated field
//! rather than stopping at the first one the way `serde` does. The resulting
//! [`Violation`] list is what the generator sees in a correction request.

use serde_json::Value;

/// A single rule violation: the field path and the specific rule it broke.
///
/// Rendered as `path: rule`, e.g.
/// `acceptanceCriteria: expected at least 1 element, got 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub rule: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rule: rule.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.rule)
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Constraint applied to the keys of a [`Rule::Map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    /// Any string key.
    Any,
    /// A non-empty path relative to the repository root, with no `..`
    /// segments and no leading separator or drive letter.
    RelativePath,
}

/// Type rule for one JSON value.
#[derive(Debug, Clone)]
pub enum Rule {
    String { non_empty: bool },
    Bool,
    Enum(&'static [&'static str]),
    Array { items: Box<Rule>, min_items: usize },
    Map { keys: KeyRule, values: Box<Rule> },
    Object(Schema),
}

impl Rule {
    pub fn string() -> Self {
        Rule::String { non_empty: false }
    }

    pub fn non_empty_string() -> Self {
        Rule::String { non_empty: true }
    }

    pub fn array_of(items: Rule) -> Self {
        Rule::Array {
            items: Box::new(items),
            min_items: 0,
        }
    }

    pub fn non_empty_array_of(items: Rule) -> Self {
        Rule::Array {
            items: Box::new(items),
            min_items: 1,
        }
    }

    pub fn map_of(keys: KeyRule, values: Rule) -> Self {
        Rule::Map {
            keys,
            values: Box::new(values),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Field {
    name: &'static str,
    rule: Rule,
    required: bool,
}

/// The field rules of one JSON object. Fields not listed are ignored.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field that must be present and non-null.
    pub fn required(mut self, name: &'static str, rule: Rule) -> Self {
        self.fields.push(Field {
            name,
            rule,
            required: true,
        });
        self
    }

    /// Adds a field that may be absent or `null`.
    pub fn optional(mut self, name: &'static str, rule: Rule) -> Self {
        self.fields.push(Field {
            name,
            rule,
            required: false,
        });
        self
    }

    /// Checks `value` against this schema and returns every violation found,
    /// in field declaration order.
    pub fn check(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        check_object(self, value, "", &mut violations);
        violations
    }
}

fn check_object(schema: &Schema, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(map) = value.as_object() else {
        out.push(Violation::new(
            display_path(path),
            format!("expected object, got {}", kind_of(value)),
        ));
        return;
    };

    for field in &schema.fields {
        let field_path = if path.is_empty() {
            field.name.to_string()
        } else {
            format!("{path}.{}", field.name)
        };
        match map.get(field.name) {
            None if field.required => {
                out.push(Violation::new(field_path, "required field is missing"));
            }
            None => {}
            Some(Value::Null) if !field.required => {}
            Some(v) => check_rule(&field.rule, v, &field_path, out),
        }
    }
}

fn check_rule(rule: &Rule, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match rule {
        Rule::String { non_empty } => match value.as_str() {
            None => out.push(type_mismatch(path, "string", value)),
            Some(s) if *non_empty && s.trim().is_empty() => {
                out.push(Violation::new(path, "expected a non-empty string"));
            }
            Some(_) => {}
        },
        Rule::Bool => {
            if !value.is_boolean() {
                out.push(type_mismatch(path, "boolean", value));
            }
        }
        Rule::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => out.push(Violation::new(
                path,
                format!("expected one of {}, got \"{s}\"", allowed.join(", ")),
            )),
            None => out.push(type_mismatch(path, "string", value)),
        },
        Rule::Array { items, min_items } => {
            let Some(elements) = value.as_array() else {
                out.push(type_mismatch(path, "array", value));
                return;
            };
            if elements.len() < *min_items {
                out.push(Violation::new(
                    path,
                    format!(
                        "expected at least {min_items} element{}, got {}",
                        if *min_items == 1 { "" } else { "s" },
                        elements.len()
                    ),
                ));
            }
            for (i, element) in elements.iter().enumerate() {
                check_rule(items, element, &format!("{path}[{i}]"), out);
            }
        }
        Rule::Map { keys, values } => {
            let Some(map) = value.as_object() else {
                out.push(type_mismatch(path, "object", value));
                return;
            };
            for (key, element) in map {
                let entry_path = format!("{path}[{key:?}]");
                if *keys == KeyRule::RelativePath {
                    if let Some(problem) = relative_path_problem(key) {
                        out.push(Violation::new(entry_path.clone(), problem));
                    }
                }
                check_rule(values, element, &entry_path, out);
            }
        }
        Rule::Object(schema) => check_object(schema, value, path, out),
    }
}

fn relative_path_problem(key: &str) -> Option<&'static str> {
    if key.trim().is_empty() {
        return Some("expected a non-empty relative path");
    }
    if key.starts_with('/') || key.starts_with('\\') || key.get(1..2) == Some(":") {
        return Some("expected a relative path, got an absolute path");
    }
    if key.split(['/', '\\']).any(|segment| segment == "..") {
        return Some("expected a path inside the repository, got a '..' segment");
    }
    None
}

fn type_mismatch(path: &str, expected: &str, value: &Value) -> Violation {
    Violation::new(path, format!("expected {expected}, got {}", kind_of(value)))
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "(root)"
    } else {
        path
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_like() -> Schema {
        Schema::new()
            .required("title", Rule::non_empty_string())
            .required(
                "acceptanceCriteria",
                Rule::non_empty_array_of(Rule::non_empty_string()),
            )
            .optional("notes", Rule::string())
    }

    fn rendered(violations: &[Violation]) -> Vec<String> {
        violations.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_array_reports_minimum() {
        let v = spec_like().check(&json!({ "title": "x", "acceptanceCriteria": [] }));
        assert_eq!(
            rendered(&v),
            vec!["acceptanceCriteria: expected at least 1 element, got 0"]
        );
    }

    #[test]
    fn every_violation_is_reported() {
        let v = spec_like().check(&json!({ "acceptanceCriteria": [1, ""], "notes": 3 }));
        assert_eq!(
            rendered(&v),
            vec![
                "title: required field is missing",
                "acceptanceCriteria[0]: expected string, got number",
                "acceptanceCriteria[1]: expected a non-empty string",
                "notes: expected string, got number",
            ]
        );
    }

    #[test]
    fn null_optional_field_is_absent() {
        let v = spec_like().check(&json!({ "title": "x", "acceptanceCriteria": ["a"], "notes": null }));
        assert!(v.is_empty());
    }

    #[test]
    fn root_must_be_an_object() {
        let v = spec_like().check(&json!([1, 2]));
        assert_eq!(rendered(&v), vec!["(root): expected object, got array"]);
    }

    #[test]
    fn nested_objects_and_enums_report_full_paths() {
        let schema = Schema::new().required(
            "findings",
            Rule::array_of(Rule::Object(
                Schema::new().required("severity", Rule::Enum(&["critical", "low"])),
            )),
        );
        let v = schema.check(&json!({ "findings": [{ "severity": "low" }, { "severity": "severe" }] }));
        assert_eq!(
            rendered(&v),
            vec!["findings[1].severity: expected one of critical, low, got \"severe\""]
        );
    }

    #[test]
    fn relative_path_keys_are_enforced() {
        let schema = Schema::new().required(
            "files",
            Rule::map_of(KeyRule::RelativePath, Rule::string()),
        );
        let v = schema.check(&json!({
            "files": { "src/ok.rs": "", "/etc/passwd": "", "a/../../b": "", "c": 1 }
        }));
        let paths: Vec<_> = v.iter().map(|x| x.path.as_str()).collect();
        assert!(paths.contains(&"files[\"/etc/passwd\"]"));
        assert!(paths.contains(&"files[\"a/../../b\"]"));
        assert!(paths.contains(&"files[\"c\"]"));
        assert!(!paths.contains(&"files[\"src/ok.rs\"]"));
    }
}
