//! Required request field checks.
//!
//! Every mutating request names the fields it needs. A field that is absent
//! is reported separately from one that is present but empty, in a single
//! combined message with the missing fields first.

use serde_json::{Map, Value};
use tracing::error;

use crate::error::{LeaseError, Result};

pub const JSON_BODY_EXPECTED: &str = "JSON body expected";

/// Check that `body` carries a non-empty string for each of `fields`.
///
/// Returns the field values in the order of `fields`. Values that are null,
/// empty strings, or not strings at all count as empty.
pub fn require_fields(body: Option<&Value>, fields: &[&str]) -> Result<Vec<String>> {
    let object = match body {
        Some(Value::Object(object)) if !object.is_empty() => object,
        _ => {
            error!("{JSON_BODY_EXPECTED}");
            return Err(LeaseError::InvalidInput(JSON_BODY_EXPECTED.to_owned()));
        }
    };

    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    let empty: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| object.contains_key(*field) && string_field(object, field).is_none())
        .collect();

    check(&missing, &empty)?;
    Ok(fields
        .iter()
        .filter_map(|field| string_field(object, field))
        .map(str::to_owned)
        .collect())
}

/// Check already-extracted values, reporting the empty ones.
pub fn require_non_empty(values: &[(&str, &str)]) -> Result<()> {
    let empty: Vec<&str> = values
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| *field)
        .collect();
    check(&[], &empty)
}

fn string_field<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn check(missing: &[&str], empty: &[&str]) -> Result<()> {
    let mut messages = vec![];
    if !missing.is_empty() {
        let message = format!("Missing parameters: {}", missing.join(", "));
        error!("{message}");
        messages.push(message);
    }
    if !empty.is_empty() {
        let message = format!("Empty parameters: {}", empty.join(", "));
        error!("{message}");
        messages.push(message);
    }
    if messages.is_empty() {
        Ok(())
    } else {
        Err(LeaseError::InvalidInput(messages.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(result: Result<Vec<String>>) -> String {
        match result {
            Err(LeaseError::InvalidInput(message)) => message,
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn returns_values_in_field_order() {
        let body = json!({"username": "alice", "device": "D1", "extra": 1});
        let values = require_fields(Some(&body), &["device", "username"]).unwrap();
        assert_eq!(values, vec!["D1", "alice"]);
    }

    #[test]
    fn missing_body() {
        assert_eq!(message(require_fields(None, &["device"])), JSON_BODY_EXPECTED);
        assert_eq!(
            message(require_fields(Some(&json!({})), &["device"])),
            JSON_BODY_EXPECTED
        );
        assert_eq!(
            message(require_fields(Some(&json!(["device"])), &["device"])),
            JSON_BODY_EXPECTED
        );
    }

    #[test]
    fn missing_fields() {
        let body = json!({"device": "D1"});
        assert_eq!(
            message(require_fields(Some(&body), &["device", "model"])),
            "Missing parameters: model"
        );
    }

    #[test]
    fn empty_fields() {
        let body = json!({"device": "", "model": null});
        assert_eq!(
            message(require_fields(Some(&body), &["device", "model"])),
            "Empty parameters: device, model"
        );
    }

    #[test]
    fn missing_before_empty() {
        let body = json!({"model": ""});
        assert_eq!(
            message(require_fields(Some(&body), &["device", "model", "username"])),
            "Missing parameters: device, username, Empty parameters: model"
        );
    }

    #[test]
    fn non_string_counts_as_empty() {
        let body = json!({"device": 42});
        assert_eq!(
            message(require_fields(Some(&body), &["device"])),
            "Empty parameters: device"
        );
    }

    #[test]
    fn non_empty_values() {
        assert!(require_non_empty(&[("device", "D1")]).is_ok());
        assert!(matches!(
            require_non_empty(&[("device", "D1"), ("username", "")]),
            Err(LeaseError::InvalidInput(m)) if m == "Empty parameters: username"
        ));
    }
}
