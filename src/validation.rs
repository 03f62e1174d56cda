//! Building blocks for the request schemas.
//!
//! Every schema reads an untyped JSON value (or query string) and produces
//! either a typed input or a `ValidationErrors` listing every violated rule.
//! Nothing here stops at the first problem.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// ValidationErrors
///
/// Flattened issue map sent back as the `details` of a `validation_error`.
/// Object-level problems land in `formErrors`, everything tied to a key in
/// `fieldErrors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrors {
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_form_error(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.form_errors.extend(other.form_errors);
        for (field, messages) in other.field_errors {
            self.field_errors.entry(field).or_default().extend(messages);
        }
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.field_errors.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Runs two independent validations and reports the union of their errors.
pub fn combine<A, B>(
    first: Result<A, ValidationErrors>,
    second: Result<B, ValidationErrors>,
) -> Result<(A, B), ValidationErrors> {
    match (first, second) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(mut e1), Err(e2)) => {
            e1.merge(e2);
            Err(e1)
        }
    }
}

/// Patch
///
/// Three-state value of an update field. `Absent` leaves the stored value
/// alone, `Null` clears it, `Value` replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Patch::Absent)
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Drops the null/absent distinction (create inputs).
    pub fn into_value(self) -> Option<T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }

    /// `None` when absent, `Some(None)` when cleared.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Patch::Absent => None,
            Patch::Null => Some(None),
            Patch::Value(v) => Some(Some(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Email,
    Url,
    Uuid,
}

/// StringRule
///
/// Length bounds (in characters) and an optional format for one string field.
#[derive(Debug, Clone, Copy)]
pub struct StringRule {
    pub min: usize,
    pub max: usize,
    pub format: Option<Format>,
}

impl StringRule {
    pub const fn length(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            format: None,
        }
    }

    pub const fn format(format: Format) -> Self {
        Self {
            min: 0,
            max: usize::MAX,
            format: Some(format),
        }
    }

    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Returns every violated constraint for `value`.
    pub fn check(&self, value: &str) -> Vec<String> {
        let mut issues = Vec::new();
        let length = value.chars().count();
        if length < self.min {
            issues.push(format!(
                "String must contain at least {} character(s)",
                self.min
            ));
        }
        if length > self.max {
            issues.push(format!(
                "String must contain at most {} character(s)",
                self.max
            ));
        }
        // Postgres text columns cannot hold NUL.
        if value.contains('\0') {
            issues.push("String must not contain NUL characters".to_string());
        }
        match self.format {
            Some(Format::Email) if !is_email(value) => issues.push("Invalid email".to_string()),
            Some(Format::Url) if !is_url(value) => issues.push("Invalid url".to_string()),
            Some(Format::Uuid) if parse_uuid(value).is_none() => {
                issues.push("Invalid uuid".to_string())
            }
            _ => {}
        }
        issues
    }
}

pub fn is_email(value: &str) -> bool {
    !value.starts_with('.') && !value.contains("..") && EMAIL_PATTERN.is_match(value)
}

pub fn is_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

/// Accepts only the hyphenated 8-4-4-4-12 form.
pub fn parse_uuid(value: &str) -> Option<Uuid> {
    if value.len() != 36 {
        return None;
    }
    Uuid::try_parse(value).ok()
}

/// Validates a path identifier, reporting problems under `id`.
pub fn parse_id(raw: &str) -> Result<Uuid, ValidationErrors> {
    parse_uuid(raw).ok_or_else(invalid_id)
}

/// The failure reported for any unusable path identifier.
pub fn invalid_id() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add_field_error("id", "Invalid uuid");
    errors
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// ObjectReader
///
/// Strict reader over a JSON object body. Unknown keys are reported as a form
/// error; each accessor records its own field errors and the caller collects
/// them all with `finish`.
pub struct ObjectReader<'a> {
    map: &'a Map<String, Value>,
    errors: ValidationErrors,
}

impl<'a> ObjectReader<'a> {
    pub fn new(value: &'a Value, allowed: &[&str]) -> Result<Self, ValidationErrors> {
        let Value::Object(map) = value else {
            let mut errors = ValidationErrors::new();
            errors.add_form_error(format!("Expected object, received {}", type_name(value)));
            return Err(errors);
        };

        let mut errors = ValidationErrors::new();
        let unknown: Vec<String> = map
            .keys()
            .filter(|key| !allowed.contains(&key.as_str()))
            .map(|key| format!("'{}'", key))
            .collect();
        if !unknown.is_empty() {
            errors.add_form_error(format!(
                "Unrecognized key(s) in object: {}",
                unknown.join(", ")
            ));
        }

        Ok(Self { map, errors })
    }

    pub fn add_field_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add_field_error(field, message);
    }

    pub fn has_field_error(&self, field: &str) -> bool {
        self.errors.field(field).is_some()
    }

    fn check_string(&mut self, field: &str, raw: &Value, rule: StringRule) -> Option<String> {
        match raw {
            Value::String(s) => {
                let issues = rule.check(s);
                if issues.is_empty() {
                    Some(s.clone())
                } else {
                    for issue in issues {
                        self.errors.add_field_error(field, issue);
                    }
                    None
                }
            }
            other => {
                self.errors.add_field_error(
                    field,
                    format!("Expected string, received {}", type_name(other)),
                );
                None
            }
        }
    }

    /// A field that must be present and non-null. Returns an empty string when
    /// invalid; the recorded error makes `finish` fail.
    pub fn required_string(&mut self, field: &str, rule: StringRule) -> String {
        let map = self.map;
        match map.get(field) {
            None => {
                self.errors.add_field_error(field, "Required");
                String::new()
            }
            Some(raw) => self.check_string(field, raw, rule).unwrap_or_default(),
        }
    }

    /// A field that may be omitted but never set to null.
    pub fn optional_string(&mut self, field: &str, rule: StringRule) -> Option<String> {
        let map = self.map;
        map.get(field)
            .and_then(|raw| self.check_string(field, raw, rule))
    }

    /// A field that may be omitted, set, or explicitly cleared with null.
    pub fn nullable_string(&mut self, field: &str, rule: StringRule) -> Patch<String> {
        let map = self.map;
        match map.get(field) {
            None => Patch::Absent,
            Some(Value::Null) => Patch::Null,
            Some(raw) => match self.check_string(field, raw, rule) {
                Some(s) => Patch::Value(s),
                None => Patch::Absent,
            },
        }
    }

    pub fn nullable_string_list(&mut self, field: &str, item: StringRule) -> Patch<Vec<String>> {
        let map = self.map;
        match map.get(field) {
            None => Patch::Absent,
            Some(Value::Null) => Patch::Null,
            Some(Value::Array(items)) => {
                let mut values = Vec::with_capacity(items.len());
                let mut valid = true;
                for (index, raw) in items.iter().enumerate() {
                    let path = format!("{}.{}", field, index);
                    match self.check_string(&path, raw, item) {
                        Some(s) => values.push(s),
                        None => valid = false,
                    }
                }
                if valid {
                    Patch::Value(values)
                } else {
                    Patch::Absent
                }
            }
            Some(other) => {
                self.errors.add_field_error(
                    field,
                    format!("Expected array, received {}", type_name(other)),
                );
                Patch::Absent
            }
        }
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        self.errors.into_result()
    }
}

/// QueryParams
///
/// Decoded query string that keeps repeated keys (`?tag=a&tag=b`).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Validates the first value of `key` against `rule`.
    pub fn string(
        &self,
        key: &str,
        rule: StringRule,
        errors: &mut ValidationErrors,
    ) -> Option<String> {
        let value = self.get(key)?;
        let issues = rule.check(value);
        if issues.is_empty() {
            Some(value.to_string())
        } else {
            for issue in issues {
                errors.add_field_error(key, issue);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NAME: StringRule = StringRule::length(1, 5);

    #[test]
    fn test_nul_character_is_rejected() {
        let issues = NAME.check("a\0b");
        assert_eq!(issues, ["String must not contain NUL characters"]);
        assert!(NAME.check("ab").is_empty());
    }

    #[test]
    fn test_reader_rejects_non_objects() {
        let body = json!(["not", "an", "object"]);
        let err = ObjectReader::new(&body, &["name"]).err().expect("should fail");
        assert_eq!(err.form_errors, vec!["Expected object, received array"]);
    }

    #[test]
    fn test_reader_collects_every_violation() {
        let body = json!({ "name": "", "website": 42, "extra": true });
        let mut reader = ObjectReader::new(&body, &["name", "website"]).unwrap();
        reader.required_string("name", NAME);
        reader.nullable_string("website", StringRule::format(Format::Url));
        let err = reader.finish().unwrap_err();

        assert_eq!(err.form_errors, vec!["Unrecognized key(s) in object: 'extra'"]);
        assert_eq!(
            err.field("name").unwrap(),
            ["String must contain at least 1 character(s)"]
        );
        assert_eq!(
            err.field("website").unwrap(),
            ["Expected string, received number"]
        );
    }

    #[test]
    fn test_nullable_string_distinguishes_null_from_absent() {
        let body = json!({ "a": null, "b": "x" });
        let mut reader = ObjectReader::new(&body, &["a", "b", "c"]).unwrap();
        assert_eq!(reader.nullable_string("a", NAME), Patch::Null);
        assert_eq!(reader.nullable_string("b", NAME), Patch::Value("x".to_string()));
        assert_eq!(reader.nullable_string("c", NAME), Patch::Absent);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_optional_string_rejects_null() {
        let body = json!({ "name": null });
        let mut reader = ObjectReader::new(&body, &["name"]).unwrap();
        assert_eq!(reader.optional_string("name", NAME), None);
        let err = reader.finish().unwrap_err();
        assert_eq!(err.field("name").unwrap(), ["Expected string, received null"]);
    }

    #[test]
    fn test_string_list_reports_item_paths() {
        let body = json!({ "tags": ["ok", "", 7] });
        let mut reader = ObjectReader::new(&body, &["tags"]).unwrap();
        assert_eq!(reader.nullable_string_list("tags", NAME), Patch::Absent);
        let err = reader.finish().unwrap_err();
        assert!(err.field("tags.1").is_some());
        assert!(err.field("tags.2").is_some());
    }

    #[test]
    fn test_formats() {
        assert!(is_email("jane.doe+crm@example.co.uk"));
        assert!(!is_email("jane..doe@example.com"));
        assert!(!is_email(".jane@example.com"));
        assert!(!is_email("jane@example"));
        assert!(is_url("https://acme.test/about"));
        assert!(!is_url("acme.test"));
        assert!(parse_uuid("11111111-1111-1111-1111-111111111111").is_some());
        assert!(parse_uuid("11111111111111111111111111111111").is_none());
    }

    #[test]
    fn test_query_params_keep_repeated_keys() {
        let query = QueryParams::parse(Some("tag=vip&tag=partner%20a&segment=smb"));
        assert_eq!(query.get("tag"), Some("vip"));
        assert_eq!(query.get_all("tag"), vec!["vip", "partner a"]);
        assert_eq!(query.get("missing"), None);
    }

    #[test]
    fn test_combine_merges_both_sides() {
        let mut a = ValidationErrors::new();
        a.add_field_error("page", "bad");
        let mut b = ValidationErrors::new();
        b.add_field_error("search", "bad");
        let err = combine::<(), ()>(Err(a), Err(b)).unwrap_err();
        assert!(err.field("page").is_some());
        assert!(err.field("search").is_some());
    }
}
