use serde::Deserialize;
use serde_json::Value;

/// List endpoints answer either with a bare array or a paginated page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListEnvelope<T> {
    Plain(Vec<T>),
    Paginated { results: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Plain(items) => items,
            ListEnvelope::Paginated { results } => results,
        }
    }
}

/// Pulls a human readable message out of an error body.
///
/// Looks at `error`, `message` and `detail` in that order, then falls back to
/// field-level validation errors (`{"amount": ["..."]}`).
pub(crate) fn error_message(body: &Value) -> Option<String> {
    if let Value::String(text) = body {
        return non_empty(text);
    }

    let object = body.as_object()?;
    for key in ["error", "message", "detail"] {
        if let Some(message) = object.get(key).and_then(first_text) {
            return Some(message);
        }
    }

    let field_errors: Vec<String> = object
        .iter()
        .filter_map(|(field, value)| first_text(value).map(|message| format!("{field}: {message}")))
        .collect();
    (!field_errors.is_empty()).then(|| field_errors.join("; "))
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_empty(text),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
