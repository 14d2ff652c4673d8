//! Schema validation helpers.
//!
//! Validates a resource or provider configuration (`serde_json::Value`)
//! against its [`Schema`] and reports every problem as a [`Diagnostic`].
//!
//! # Example
//!
//! ```
//! use anomalo_provider::schema::{Attribute, Schema};
//! use anomalo_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("table_name", Attribute::required_string())
//!     .with_attribute("notification_channel_id", Attribute::required_int64());
//!
//! let diagnostics = validate(&schema, &json!({
//!     "table_name": "warehouse.public.orders",
//!     "notification_channel_id": 7
//! }));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({
//!     "table_name": "warehouse.public.orders",
//!     "notification_channel_id": "seven"
//! }));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("notification_channel_id".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a configuration value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes must not be configured
/// - Attributes not in the schema are rejected
/// - Attribute types must match the schema
/// - Strings restricted by `allowed_values` must be one of them
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return diagnostics,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    for name in obj.keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not part of the schema")
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate a configuration value, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a configuration value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            if !attr.flags.configurable() {
                diagnostics.push(
                    Diagnostic::error(format!("Attribute '{}' cannot be configured", path))
                        .with_detail("This value is computed by Anomalo")
                        .with_attribute(path),
                );
                return;
            }
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if !attr.allowed_values.is_empty() {
                if let Some(s) = v.as_str() {
                    if !attr.allowed_values.iter().any(|allowed| allowed == s) {
                        diagnostics.push(
                            Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                                .with_detail(format!(
                                    "Got {:?}, expected one of {:?}",
                                    s, attr.allowed_values
                                ))
                                .with_attribute(path),
                        );
                    }
                }
            }
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        }
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            if n.as_i64().is_some() {
                true
            } else if let Some(f) = n.as_f64() {
                f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
            } else {
                false
            }
        }
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
    use serde_json::json;

    fn check_schema() -> Schema {
        Schema::v0()
            .with_attribute("table_id", Attribute::optional_int64())
            .with_attribute("check_type", Attribute::required_string())
            .with_attribute(
                "params",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::required(),
                ),
            )
            .with_attribute("check_id", Attribute::computed_int64())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "test"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_optional_attribute() {
        let schema = check_schema();
        let diagnostics = validate(&schema, &json!({"check_type": "NullCheck", "params": {}}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = check_schema();
        assert!(is_valid(
            &schema,
            &json!({"table_id": 5, "check_type": "t", "params": {}})
        ));
        assert!(is_valid(
            &schema,
            &json!({"table_id": 5.0, "check_type": "t", "params": {}})
        ));

        let diagnostics = validate(
            &schema,
            &json!({"table_id": 5.5, "check_type": "t", "params": {}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("table_id"));
    }

    #[test]
    fn test_validate_map_values() {
        let schema = check_schema();
        let diagnostics = validate(
            &schema,
            &json!({"check_type": "t", "params": {"column": "id", "threshold": 3}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("params.threshold".to_string()));
    }

    #[test]
    fn test_validate_list() {
        let schema = Schema::v0().with_attribute(
            "time_columns",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::optional_computed(),
            ),
        );
        assert!(is_valid(&schema, &json!({"time_columns": ["created_at"]})));

        let diagnostics = validate(&schema, &json!({"time_columns": ["created_at", 1]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("time_columns.1".to_string()));

        let diagnostics = validate(&schema, &json!({"time_columns": "created_at"}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_computed_only_rejected() {
        let schema = check_schema();
        let diagnostics = validate(
            &schema,
            &json!({"check_type": "t", "params": {}, "check_id": 4}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("check_id".to_string()));
    }

    #[test]
    fn test_validate_unsupported_attribute() {
        let schema = check_schema();
        let diagnostics = validate(
            &schema,
            &json!({"check_type": "t", "params": {}, "colour": "blue"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Unsupported"));
    }

    #[test]
    fn test_validate_allowed_values() {
        let schema = Schema::v0().with_attribute(
            "check_cadence_type",
            Attribute::optional_string().with_allowed_values(["", "daily", "data_freshness_gated"]),
        );
        assert!(is_valid(&schema, &json!({"check_cadence_type": "daily"})));
        assert!(is_valid(&schema, &json!({"check_cadence_type": ""})));
        assert!(is_valid(&schema, &json!({})));

        let diagnostics = validate(&schema, &json!({"check_cadence_type": "hourly"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].detail.as_ref().unwrap().contains("hourly"));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = check_schema();
        let diagnostics = validate(&schema, &json!({"table_id": "five"}));
        // bad table_id, missing check_type, missing params
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = check_schema();
        assert!(validate_result(&schema, &json!({"check_type": "t", "params": {}})).is_ok());
        let err = validate_result(&schema, &json!({})).unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = check_schema();
        let diagnostics = validate(&schema, &json!([1, 2]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(validate(&schema, &Value::Null).is_empty());
    }
}
