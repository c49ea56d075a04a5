use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while populating a prompt template
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopulateError {
    #[error("required placeholder '{0}' could not be resolved")]
    MissingMandatoryPlaceholder(String),
    #[error("invalid path '{0}' in placeholder")]
    InvalidPlaceholderPath(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
}

/// Replaces placeholders in `template` with values from `input`.
///
/// Supports:
/// - Mandatory: `{{input.prop_name}}`
/// - Optional: `{{input.prop_name?}}` (removed when absent)
/// - Nested: `{{input.prop1.prop2}}`
///
/// String values are inserted verbatim; other values as compact JSON.
/// Inserted text is never rescanned for placeholders.
pub fn populate(template: &str, input: &Value) -> Result<String, PopulateError> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(PopulateError::Unterminated(consumed + start));
        };

        let placeholder = after_open[..end].trim();
        let (path, is_optional) = match placeholder.strip_suffix('?') {
            Some(path) => (path, true),
            None => (placeholder, false),
        };

        match resolve_path(input, path)? {
            Some(value) => result.push_str(&render(value)),
            None if is_optional => {}
            None => return Err(PopulateError::MissingMandatoryPlaceholder(path.to_string())),
        }

        let advance = start + 2 + end + 2;
        consumed += advance;
        rest = &rest[advance..];
    }
    result.push_str(rest);

    Ok(result)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolves a dotted path such as `input.prop1.prop2`.
fn resolve_path<'a>(value: &'a Value, path: &str) -> Result<Option<&'a Value>, PopulateError> {
    let mut parts = path.split('.');
    if parts.next() != Some("input") {
        return Err(PopulateError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}
