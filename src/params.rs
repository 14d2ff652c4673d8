//! Check parameters.
//!
//! Anomalo returns check parameters as arbitrary JSON values. They are
//! modelled as `String -> String` from the moment they are deserialized:
//! every non-null value becomes its textual form and null entries are
//! dropped. Two keys are reserved because the API gives them meaning on
//! `create_check`: [`REFERENCE_KEY`] and [`STATIC_ID_KEY`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::Diagnostic;

/// Check parameters, ordered by key.
pub type Params = BTreeMap<String, String>;

/// Parameter key carrying the check's reference label.
pub const REFERENCE_KEY: &str = "reference";

/// Parameter key that turns `create_check` into "replace this check".
pub const STATIC_ID_KEY: &str = "check_static_id";

/// Textual form of an API value. `None` for null.
///
/// Strings are taken verbatim, scalars use their JSON spelling and
/// arrays/objects are kept as compact JSON.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Normalize a raw JSON parameter object.
pub fn normalize(raw: serde_json::Map<String, Value>) -> Params {
    raw.into_iter()
        .filter_map(|(key, value)| value_to_text(&value).map(|text| (key, text)))
        .collect()
}

/// `deserialize_with` adapter: accepts an object of any values, or null.
pub fn deserialize_normalized<'de, D>(deserializer: D) -> Result<Params, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Map<String, Value>>::deserialize(deserializer)?;
    Ok(raw.map(normalize).unwrap_or_default())
}

/// Fold a top-level reference into the parameters.
///
/// A non-empty top-level reference wins over an embedded one; when both are
/// set and differ a warning is returned. Returns the reference that will be
/// sent, if any.
pub fn merge_reference(
    params: &mut Params,
    reference: Option<&str>,
) -> (Option<String>, Option<Diagnostic>) {
    let reference = reference.filter(|r| !r.is_empty());
    match reference {
        Some(top_level) => {
            let warning = match params.get(REFERENCE_KEY) {
                Some(embedded) if embedded != top_level => Some(
                    Diagnostic::warning("Check reference overridden")
                        .with_detail(format!(
                            "params.{key} is {embedded:?} but reference is {top_level:?}; \
                             sending {top_level:?}. Remove {key} from params to silence this warning.",
                            key = REFERENCE_KEY,
                        ))
                        .with_attribute("reference"),
                ),
                _ => None,
            };
            params.insert(REFERENCE_KEY.to_string(), top_level.to_string());
            (Some(top_level.to_string()), warning)
        }
        None => (
            params.get(REFERENCE_KEY).filter(|r| !r.is_empty()).cloned(),
            None,
        ),
    }
}

/// Static id embedded in the parameters, if any. Zero counts as absent.
pub fn embedded_static_id(params: &Params) -> Result<Option<i64>, ProviderError> {
    match params.get(STATIC_ID_KEY).map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(|id| (id != 0).then_some(id))
            .map_err(|_| {
                ProviderError::InvalidInput(format!(
                    "params.{} must be an integer, got {:?}",
                    STATIC_ID_KEY, raw
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default, deserialize_with = "deserialize_normalized")]
        params: Params,
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("abc")), Some("abc".to_string()));
        assert_eq!(value_to_text(&json!(42)), Some("42".to_string()));
        assert_eq!(value_to_text(&json!(0.5)), Some("0.5".to_string()));
        assert_eq!(value_to_text(&json!(true)), Some("true".to_string()));
        assert_eq!(value_to_text(&json!(["a", 1])), Some(r#"["a",1]"#.to_string()));
        assert_eq!(value_to_text(&Value::Null), None);
    }

    #[test]
    fn test_deserialize_normalizes_and_drops_nulls() {
        let wrapper: Wrapper = serde_json::from_value(json!({
            "params": {"column": "id", "limit": 10, "strict": false, "where": null}
        }))
        .unwrap();

        assert_eq!(wrapper.params.len(), 3);
        assert_eq!(wrapper.params["column"], "id");
        assert_eq!(wrapper.params["limit"], "10");
        assert_eq!(wrapper.params["strict"], "false");
        assert!(!wrapper.params.contains_key("where"));
    }

    #[test]
    fn test_deserialize_null_or_missing_params() {
        let wrapper: Wrapper = serde_json::from_value(json!({"params": null})).unwrap();
        assert!(wrapper.params.is_empty());

        let wrapper: Wrapper = serde_json::from_value(json!({})).unwrap();
        assert!(wrapper.params.is_empty());
    }

    #[test]
    fn test_merge_reference_top_level_wins_with_warning() {
        let mut params = Params::from([(REFERENCE_KEY.to_string(), "old".to_string())]);
        let (resolved, warning) = merge_reference(&mut params, Some("new"));

        assert_eq!(resolved.as_deref(), Some("new"));
        assert_eq!(params[REFERENCE_KEY], "new");
        let warning = warning.expect("expected a warning");
        assert!(!warning.is_error());
        assert_eq!(warning.attribute.as_deref(), Some("reference"));
    }

    #[test]
    fn test_merge_reference_same_value_no_warning() {
        let mut params = Params::from([(REFERENCE_KEY.to_string(), "same".to_string())]);
        let (resolved, warning) = merge_reference(&mut params, Some("same"));
        assert_eq!(resolved.as_deref(), Some("same"));
        assert!(warning.is_none());
    }

    #[test]
    fn test_merge_reference_embedded_only() {
        let mut params = Params::from([(REFERENCE_KEY.to_string(), "embedded".to_string())]);
        let (resolved, warning) = merge_reference(&mut params, None);
        assert_eq!(resolved.as_deref(), Some("embedded"));
        assert!(warning.is_none());
        assert_eq!(params[REFERENCE_KEY], "embedded");

        let mut empty = Params::new();
        let (resolved, _) = merge_reference(&mut empty, Some(""));
        assert!(resolved.is_none());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_embedded_static_id() {
        let mut params = Params::new();
        assert_eq!(embedded_static_id(&params).unwrap(), None);

        params.insert(STATIC_ID_KEY.to_string(), "0".to_string());
        assert_eq!(embedded_static_id(&params).unwrap(), None);

        params.insert(STATIC_ID_KEY.to_string(), "17".to_string());
        assert_eq!(embedded_static_id(&params).unwrap(), Some(17));

        params.insert(STATIC_ID_KEY.to_string(), "seventeen".to_string());
        assert!(matches!(
            embedded_static_id(&params),
            Err(ProviderError::InvalidInput(_))
        ));
    }
}
