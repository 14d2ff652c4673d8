//! Schema-driven planning.
//!
//! Resources here have no custom plan logic; everything follows from the
//! schema:
//!
//! - unconfigured attributes with a default plan to the default
//! - computed attributes left out of the proposal keep their prior value
//! - a changed `force_new` attribute that is set in configuration forces
//!   replacement, and then unconfigured computed values are planned as
//!   unknown (null) since the replacement will compute them again

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};

/// Plan a resource from its prior state, the proposed state and the raw
/// configuration. A null `proposed` plans a delete.
pub fn plan_resource(
    schema: &Schema,
    prior: Option<&Value>,
    proposed: &Value,
    config: &Value,
) -> PlanResult {
    let prior = prior.filter(|p| !p.is_null());
    match prior {
        None => plan_create(schema, proposed, config),
        Some(prior) if proposed.is_null() => plan_delete(schema, prior),
        Some(prior) => plan_update(schema, prior, proposed, config),
    }
}

fn plan_create(schema: &Schema, proposed: &Value, config: &Value) -> PlanResult {
    let mut planned = Map::new();
    let mut changes = Vec::new();

    for (name, attr) in &schema.attributes {
        let value = match non_null(proposed, name) {
            Some(value) => value.clone(),
            None if !is_configured(config, name) => attr.default.clone().unwrap_or(Value::Null),
            None => Value::Null,
        };
        if !value.is_null() {
            changes.push(AttributeChange::added(name.as_str(), value.clone()));
        }
        planned.insert(name.clone(), value);
    }

    PlanResult::with_changes(Value::Object(planned), changes, false)
}

fn plan_delete(schema: &Schema, prior: &Value) -> PlanResult {
    let changes = schema
        .attributes
        .keys()
        .filter_map(|name| non_null(prior, name).map(|v| AttributeChange::removed(name.as_str(), v.clone())))
        .collect();
    PlanResult::with_changes(Value::Null, changes, false)
}

fn plan_update(schema: &Schema, prior: &Value, proposed: &Value, config: &Value) -> PlanResult {
    let mut planned = Map::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.attributes {
        let configured = is_configured(config, name);
        let value = match non_null(proposed, name) {
            Some(value) => value.clone(),
            None if !configured && attr.default.is_some() => {
                attr.default.clone().unwrap_or(Value::Null)
            }
            None if attr.flags.computed => prior.get(name).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        };

        let before = prior.get(name).unwrap_or(&Value::Null);
        if attr.force_new && configured && *before != value {
            requires_replace = true;
        }
        planned.insert(name.clone(), value);
    }

    if requires_replace {
        for (name, attr) in &schema.attributes {
            if attr.flags.computed && !is_configured(config, name) {
                planned.insert(name.clone(), Value::Null);
            }
        }
    }

    let changes = diff(schema, prior, &planned);
    if changes.is_empty() {
        return PlanResult::no_change(Value::Object(planned));
    }
    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn diff(schema: &Schema, prior: &Value, planned: &Map<String, Value>) -> Vec<AttributeChange> {
    schema
        .attributes
        .keys()
        .filter_map(|name| {
            let before = non_null(prior, name);
            let after = planned.get(name).filter(|v| !v.is_null());
            match (before, after) {
                (None, None) => None,
                (Some(b), Some(a)) if b == a => None,
                (None, Some(a)) => Some(AttributeChange::added(name.as_str(), a.clone())),
                (Some(b), None) => Some(AttributeChange::removed(name.as_str(), b.clone())),
                (Some(b), Some(a)) => Some(AttributeChange::modified(name.as_str(), b.clone(), a.clone())),
            }
        })
        .collect()
}

fn non_null<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    value.get(name).filter(|v| !v.is_null())
}

fn is_configured(config: &Value, name: &str) -> bool {
    non_null(config, name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, AttributeType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "id",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_force_new(),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "cadence",
                Attribute::optional_string().with_default(json!("")),
            )
            .with_attribute(
                "owner",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_force_new(),
            )
    }

    #[test]
    fn test_create_applies_defaults() {
        let config = json!({"name": "orders"});
        let plan = plan_resource(&schema(), None, &config, &config);

        assert_eq!(plan.planned_state["cadence"], "");
        assert!(plan.planned_state["id"].is_null());
        assert!(!plan.requires_replace);
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["cadence", "name"]);
    }

    #[test]
    fn test_update_keeps_computed_values() {
        let prior = json!({"id": 7, "name": "orders", "cadence": "", "owner": 3});
        let config = json!({"name": "orders"});
        let plan = plan_resource(&schema(), Some(&prior), &config, &config);

        assert!(!plan.has_changes());
        assert_eq!(plan.planned_state["id"], 7);
        assert_eq!(plan.planned_state["owner"], 3);
    }

    #[test]
    fn test_update_in_place() {
        let prior = json!({"id": 7, "name": "orders", "cadence": "", "owner": 3});
        let config = json!({"name": "orders", "cadence": "daily"});
        let plan = plan_resource(&schema(), Some(&prior), &config, &config);

        assert!(!plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "cadence");
    }

    #[test]
    fn test_removed_attribute_returns_to_default() {
        let prior = json!({"id": 7, "name": "orders", "cadence": "daily", "owner": 3});
        let config = json!({"name": "orders"});
        let plan = plan_resource(&schema(), Some(&prior), &config, &config);

        assert_eq!(plan.planned_state["cadence"], "");
        assert_eq!(plan.changes[0].path, "cadence");
    }

    #[test]
    fn test_configured_force_new_change_replaces() {
        let prior = json!({"id": 7, "name": "orders", "cadence": "", "owner": 3});
        let config = json!({"name": "orders", "owner": 4});
        let plan = plan_resource(&schema(), Some(&prior), &config, &config);

        assert!(plan.requires_replace);
        assert!(plan.planned_state["id"].is_null());
        assert_eq!(plan.planned_state["owner"], 4);
    }

    #[test]
    fn test_unconfigured_force_new_does_not_replace() {
        let prior = json!({"id": 7, "name": "orders", "cadence": "", "owner": 3});
        let proposed = json!({"name": "orders", "owner": 3});
        let config = json!({"name": "orders"});
        let plan = plan_resource(&schema(), Some(&prior), &proposed, &config);
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_delete() {
        let prior = json!({"id": 7, "name": "orders", "cadence": "", "owner": null});
        let plan = plan_resource(&schema(), Some(&prior), &Value::Null, &Value::Null);

        assert!(plan.planned_state.is_null());
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["cadence", "id", "name"]);
    }
}
