//! Value types exchanged between the host and the provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Diagnostic;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation (null when destroying).
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource must be destroyed and created again.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether applying this plan does anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// State produced by a create or update, plus any non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    /// The new state to persist.
    pub state: Value,
    /// Warnings raised while applying.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplyResult {
    /// An apply result with no diagnostics.
    pub fn new(state: Value) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }

    /// Attach diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata: the names of everything the provider manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("check_type", json!("NullCheck"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("NullCheck")));

        let removed = AttributeChange::removed("reference", json!("orders_not_null"));
        assert_eq!(removed.before, Some(json!("orders_not_null")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("table_id", json!(1), json!(2));
        assert_eq!(modified.before, Some(json!(1)));
        assert_eq!(modified.after, Some(json!(2)));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"table_id": 1}));
        assert!(!no_change.has_changes());
        assert!(!no_change.requires_replace);

        let with_changes = PlanResult::with_changes(
            json!({"table_id": 2}),
            vec![AttributeChange::modified("table_id", json!(1), json!(2))],
            true,
        );
        assert!(with_changes.has_changes());
        assert!(with_changes.requires_replace);
    }

    #[test]
    fn test_apply_result() {
        let result = ApplyResult::new(json!({"check_static_id": 9}))
            .with_diagnostics(vec![Diagnostic::warning("reference overridden")]);
        assert_eq!(result.state["check_static_id"], 9);
        assert_eq!(result.diagnostics.len(), 1);

        let encoded = serde_json::to_value(ApplyResult::new(json!({}))).unwrap();
        assert!(encoded.get("diagnostics").is_none());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("anomalo_check", json!({"table_id": 5}));
        assert_eq!(imported.resource_type, "anomalo_check");
        assert_eq!(imported.state["table_id"], 5);
    }
}
