//! Check reconciliation.
//!
//! Anomalo has no in-place check update. Changing a check means creating a
//! new one with the old static id in its parameters, which Anomalo treats as
//! "replace this check": the old object is retired and the new one gets a
//! fresh static id. [`CheckReconciler`] hides that behind
//! create/read/update/delete so the host sees one managed check throughout.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api::{CheckApi, CheckRecord, CreateCheckRequest, CreatedCheck};
use crate::error::ProviderError;
use crate::import::CheckImportId;
use crate::params::{self, deserialize_normalized, Params, REFERENCE_KEY, STATIC_ID_KEY};
use crate::plan::plan_resource;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::types::PlanResult;

/// Resource type name of a check.
pub const CHECK_RESOURCE: &str = "anomalo_check";

/// A check as tracked in state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Check {
    /// Owning table. Never changes in place.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub table_id: i64,
    /// Stable identity. `0` means not created yet.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub check_static_id: i64,
    /// Kind of check.
    pub check_type: String,
    /// Table-scoped label.
    #[serde(default)]
    pub reference: Option<String>,
    /// Parameters for the check type.
    #[serde(default, deserialize_with = "deserialize_normalized")]
    pub params: Params,
}

impl Check {
    /// Schema of the `anomalo_check` resource.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description(
                "An Anomalo check. Updates are applied by replacing the check upstream and \
                 recording the replacement's check_static_id.",
            )
            .with_attribute(
                "check_static_id",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_description(
                        "Id of the check, assigned by Anomalo. Set it only when importing.",
                    ),
            )
            .with_attribute(
                "table_id",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_description(
                        "Id of the table the check belongs to, ex `anomalo_table.<name>.table_id`. \
                         Changing it replaces the check.",
                    ),
            )
            .with_attribute(
                "check_type",
                Attribute::required_string().with_description(
                    "Type of check, as accepted by the Anomalo `create_check` endpoint.",
                ),
            )
            .with_attribute(
                "reference",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .with_description(
                        "Label unique within the table. Takes precedence over params.reference.",
                    ),
            )
            .with_attribute(
                "params",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::required(),
                )
                .with_description("Parameters for the check type."),
            )
    }

    /// Decode a state or planned-state object.
    pub fn from_state(state: &Value) -> Result<Self, ProviderError> {
        let mut check: Self = serde_json::from_value(state.clone())?;
        check.reference = check.reference.filter(|r| !r.is_empty());
        Ok(check)
    }

    /// Encode as a state object.
    pub fn to_state(&self) -> Value {
        serde_json::json!({
            "table_id": self.table_id,
            "check_static_id": self.check_static_id,
            "check_type": self.check_type,
            "reference": self.reference,
            "params": self.params,
        })
    }

    /// Plan a check.
    ///
    /// When `params.reference` is configured and the top-level `reference`
    /// is not, the planned `reference` follows the embedded one instead of
    /// keeping the value from prior state.
    pub fn plan(prior: Option<&Value>, mut proposed: Value, config: &Value) -> PlanResult {
        let top_level = config
            .get("reference")
            .and_then(params::value_to_text)
            .filter(|r| !r.is_empty());
        let embedded = config
            .get("params")
            .and_then(|p| p.get(REFERENCE_KEY))
            .and_then(params::value_to_text)
            .filter(|r| !r.is_empty());
        if let (None, Some(embedded), Some(proposed)) = (top_level, embedded, proposed.as_object_mut()) {
            proposed.insert("reference".to_string(), Value::String(embedded));
        }
        plan_resource(&Self::schema(), prior, &proposed, config)
    }

    /// Restore the reserved parameter entries the prior state carried.
    ///
    /// Anomalo keeps the reference and static id as identity, not as
    /// parameters, so a refreshed check never has them in `params`. An
    /// embedded `reference` is restored with the live value so drift still
    /// shows up in the plan; an embedded `check_static_id` is kept as is.
    pub fn with_reserved_params_from(mut self, prior: &Check) -> Self {
        if prior.params.contains_key(REFERENCE_KEY) {
            if let Some(reference) = &self.reference {
                self.params
                    .insert(REFERENCE_KEY.to_string(), reference.clone());
            }
        }
        if let Some(static_id) = prior.params.get(STATIC_ID_KEY) {
            self.params
                .insert(STATIC_ID_KEY.to_string(), static_id.clone());
        }
        self
    }

    fn from_record(table_id: i64, record: CheckRecord) -> Self {
        let mut params = record.params;
        params.remove(REFERENCE_KEY);
        params.remove(STATIC_ID_KEY);
        Self {
            table_id,
            check_static_id: record.check_static_id,
            check_type: record.check_type,
            reference: record.reference,
            params,
        }
    }

    /// Static id the caller asked for: top-level first, then the one
    /// embedded in the parameters.
    fn requested_static_id(&self) -> Result<Option<i64>, ProviderError> {
        if self.check_static_id != 0 {
            return Ok(Some(self.check_static_id));
        }
        params::embedded_static_id(&self.params)
    }
}

/// Result of a create or update: the new check plus any warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// The check as it now exists upstream.
    pub check: Check,
    /// Non-fatal diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives checks through Anomalo's create/replace/delete API.
pub struct CheckReconciler<'a, C: CheckApi + ?Sized> {
    api: &'a C,
}

impl<'a, C: CheckApi + ?Sized> CheckReconciler<'a, C> {
    /// Create a reconciler over an API handle.
    pub fn new(api: &'a C) -> Self {
        Self { api }
    }

    /// Create a new check.
    ///
    /// A check that already has a static id must be imported instead.
    #[instrument(skip(self, desired), fields(table_id = desired.table_id, check_type = %desired.check_type))]
    pub async fn create(&self, desired: &Check) -> Result<CheckOutcome, ProviderError> {
        if desired.table_id == 0 {
            return Err(ProviderError::InvalidInput(
                "table_id is required to create a check".to_string(),
            ));
        }
        if let Some(static_id) = desired.requested_static_id()? {
            return Err(ProviderError::InvalidInput(format!(
                "check_static_id {static_id} was set on a check that does not exist yet. \
                 To manage an existing check, import it with \"<table_id>,<check_static_id>\" \
                 (here \"{table},{static_id}\") or remove check_static_id.",
                table = desired.table_id,
            )));
        }

        let mut params = desired.params.clone();
        let (reference, warning) = params::merge_reference(&mut params, desired.reference.as_deref());

        let request = CreateCheckRequest {
            table_id: desired.table_id,
            check_type: desired.check_type.clone(),
            params,
        };
        let created = self.api.create_check(&request).await.map_err(|e| {
            ProviderError::upstream(
                format!(
                    "creating {} check on table {}",
                    desired.check_type, desired.table_id
                ),
                e,
            )
        })?;
        let created = require_static_id(created, "create_check", desired.table_id)?;

        info!(
            check_static_id = created.check_static_id,
            check_id = created.check_id,
            "Created check"
        );

        Ok(outcome(desired, created, reference, warning))
    }

    /// Read a check by static id, or by reference when no static id is known.
    #[instrument(skip(self))]
    pub async fn read(
        &self,
        table_id: i64,
        check_static_id: Option<i64>,
        reference: Option<&str>,
    ) -> Result<Check, ProviderError> {
        let record = self
            .lookup(table_id, check_static_id, reference)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "no check matching {} on table {}",
                    describe(check_static_id, reference),
                    table_id
                ))
            })?;
        debug!(check_id = record.check_id, "Read check");
        Ok(Check::from_record(table_id, record))
    }

    /// Apply `desired` to the check currently at `current_static_id`.
    ///
    /// The live check is verified first, then replaced. There is no undo: if
    /// the replace fails the upstream state is unknown until the next read.
    #[instrument(skip(self, desired), fields(table_id = desired.table_id, check_type = %desired.check_type))]
    pub async fn update(
        &self,
        current_static_id: i64,
        desired: &Check,
    ) -> Result<CheckOutcome, ProviderError> {
        if let Some(requested) = desired.requested_static_id()? {
            if requested != current_static_id {
                return Err(ProviderError::InvalidInput(format!(
                    "check_static_id cannot change from {current_static_id} to {requested}. \
                     Delete and recreate the check, or import check {requested} instead."
                )));
            }
        }

        let live = self
            .lookup(desired.table_id, Some(current_static_id), None)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "check {} on table {} no longer exists; remove it from state and create it again",
                    current_static_id, desired.table_id
                ))
            })?;

        let mut params = desired.params.clone();
        params.insert(STATIC_ID_KEY.to_string(), live.check_static_id.to_string());
        let (reference, warning) = params::merge_reference(&mut params, desired.reference.as_deref());

        let request = CreateCheckRequest {
            table_id: desired.table_id,
            check_type: desired.check_type.clone(),
            params,
        };
        let created = self.api.create_check(&request).await.map_err(|e| {
            ProviderError::upstream(
                format!(
                    "replacing check {} on table {}",
                    live.check_static_id, desired.table_id
                ),
                e,
            )
        })?;
        let created = require_static_id(created, "create_check", desired.table_id)?;

        info!(
            check_static_id = created.check_static_id,
            check_id = created.check_id,
            replaced_static_id = live.check_static_id,
            replaced_check_id = live.check_id,
            "Replaced check"
        );

        Ok(outcome(desired, created, reference, warning))
    }

    /// Delete the check with `check_static_id`.
    ///
    /// The check is looked up first and deleted by its current object id. A
    /// check that is already gone is an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, table_id: i64, check_static_id: i64) -> Result<(), ProviderError> {
        let live = self
            .lookup(table_id, Some(check_static_id), None)
            .await?
            .ok_or_else(|| {
                ProviderError::RaceCondition(format!(
                    "check {} on table {} disappeared before it could be deleted",
                    check_static_id, table_id
                ))
            })?;

        self.api
            .delete_check(table_id, live.check_id)
            .await
            .map_err(|e| {
                ProviderError::upstream(
                    format!("deleting check {} on table {}", check_static_id, table_id),
                    e,
                )
            })?;

        info!(check_id = live.check_id, "Deleted check");
        Ok(())
    }

    /// Import a check from `<table_id>,<check_static_id>` or
    /// `<table_id>,,<reference>`.
    #[instrument(skip(self))]
    pub async fn import(&self, id: &str) -> Result<Check, ProviderError> {
        let id = CheckImportId::parse(id)?;
        self.read(id.table_id, id.static_id(), id.reference()).await
    }

    async fn lookup(
        &self,
        table_id: i64,
        check_static_id: Option<i64>,
        reference: Option<&str>,
    ) -> Result<Option<CheckRecord>, ProviderError> {
        let context = || format!("reading check {} on table {}", describe(check_static_id, reference), table_id);
        match (
            check_static_id.filter(|id| *id != 0),
            reference.filter(|r| !r.is_empty()),
        ) {
            (Some(static_id), _) => self
                .api
                .get_check_by_static_id(table_id, static_id)
                .await
                .map_err(|e| ProviderError::upstream(context(), e)),
            (None, Some(reference)) => self
                .api
                .get_check_by_reference(table_id, reference)
                .await
                .map_err(|e| ProviderError::upstream(context(), e)),
            (None, None) => Err(ProviderError::InvalidState(format!(
                "check on table {} has neither a check_static_id nor a reference; \
                 re-import it with \"<table_id>,<check_static_id>\"",
                table_id
            ))),
        }
    }
}

// Planned state carries null for values not known yet.
fn null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

fn require_static_id(
    created: CreatedCheck,
    endpoint: &str,
    table_id: i64,
) -> Result<CreatedCheck, ProviderError> {
    if created.check_static_id == 0 {
        return Err(ProviderError::Upstream(format!(
            "{} on table {} returned no check_static_id (check_id {})",
            endpoint, table_id, created.check_id
        )));
    }
    Ok(created)
}

fn outcome(
    desired: &Check,
    created: CreatedCheck,
    sent_reference: Option<String>,
    warning: Option<Diagnostic>,
) -> CheckOutcome {
    if warning.is_some() {
        warn!(table_id = desired.table_id, "Top-level reference overrides params.reference");
    }
    CheckOutcome {
        check: Check {
            table_id: desired.table_id,
            check_static_id: created.check_static_id,
            check_type: desired.check_type.clone(),
            reference: created.reference.or(sent_reference),
            params: desired.params.clone(),
        },
        diagnostics: warning.into_iter().collect(),
    }
}

fn describe(check_static_id: Option<i64>, reference: Option<&str>) -> String {
    match (check_static_id.filter(|id| *id != 0), reference) {
        (Some(id), _) => format!("check_static_id {}", id),
        (None, Some(reference)) => format!("reference {:?}", reference),
        (None, None) => "no identity".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAnomalo, FakeCall};
    use serde_json::json;
    use std::collections::HashSet;
    use tokio_test::{assert_err, assert_ok};

    fn check(table_id: i64, check_type: &str, params: &[(&str, &str)]) -> Check {
        Check {
            table_id,
            check_type: check_type.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_static_ids() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let mut seen = HashSet::new();
        for _ in 0..5 {
            let outcome = assert_ok!(reconciler.create(&check(1, "NullCheck", &[])).await);
            assert_ne!(outcome.check.check_static_id, 0);
            assert!(seen.insert(outcome.check.check_static_id));
            assert!(outcome.diagnostics.is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_then_read_round_trips() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let created = reconciler
            .create(&check(1, "RowCount", &[("a", "b")]))
            .await
            .unwrap();
        let read = reconciler
            .read(1, Some(created.check.check_static_id), None)
            .await
            .unwrap();

        assert_eq!(read.check_type, "RowCount");
        assert_eq!(read.params, Params::from([("a".to_string(), "b".to_string())]));
        assert_eq!(read, created.check);
    }

    #[tokio::test]
    async fn test_create_with_static_id_is_invalid_input() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let mut desired = check(5, "NullCheck", &[]);
        desired.check_static_id = 12;
        let err = reconciler.create(&desired).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert!(err.message().contains("\"5,12\""));

        let embedded = check(5, "NullCheck", &[(STATIC_ID_KEY, "12")]);
        assert!(matches!(
            reconciler.create(&embedded).await,
            Err(ProviderError::InvalidInput(_))
        ));
        assert!(api.create_requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_reference_precedence_warns_once() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let mut desired = check(1, "NullCheck", &[(REFERENCE_KEY, "embedded")]);
        desired.reference = Some("top".to_string());
        let outcome = reconciler.create(&desired).await.unwrap();

        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(!outcome.diagnostics[0].is_error());
        assert_eq!(outcome.check.reference.as_deref(), Some("top"));
        let sent = &api.create_requests()[0];
        assert_eq!(sent.params[REFERENCE_KEY], "top");
    }

    #[tokio::test]
    async fn test_create_keeps_minted_reference() {
        let api = FakeAnomalo::new().with_minted_references();
        let reconciler = CheckReconciler::new(&api);

        let outcome = reconciler.create(&check(1, "NullCheck", &[])).await.unwrap();
        assert!(outcome.check.reference.is_some());
    }

    #[tokio::test]
    async fn test_create_upstream_failure_has_context() {
        let api = FakeAnomalo::new();
        api.fail_on(FakeCall::CreateCheck);
        let reconciler = CheckReconciler::new(&api);

        let err = reconciler
            .create(&check(7, "NullCheck", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(_)));
        assert!(err.message().contains("table 7"));
        assert!(err.message().contains("NullCheck"));
    }

    #[tokio::test]
    async fn test_create_requires_table_id() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        assert_err!(reconciler.create(&check(0, "NullCheck", &[])).await);
    }

    #[tokio::test]
    async fn test_read_absent_is_not_found() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let err = reconciler.read(1, Some(99), None).await.unwrap_err();
        assert!(err.is_not_found());

        let err = reconciler.read(1, None, Some("nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_transport_failure_is_upstream() {
        let api = FakeAnomalo::new();
        api.fail_on(FakeCall::GetChecks);
        let reconciler = CheckReconciler::new(&api);

        let err = reconciler.read(1, Some(99), None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_read_without_identity_is_invalid_state() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        for (static_id, reference) in [(None, None), (Some(0), None), (Some(0), Some(""))] {
            let err = reconciler.read(1, static_id, reference).await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidState(_)));
        }
    }

    #[tokio::test]
    async fn test_read_by_reference() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let mut desired = check(2, "NullCheck", &[("column", "id")]);
        desired.reference = Some("orders_id".to_string());
        let created = reconciler.create(&desired).await.unwrap();

        let read = reconciler.read(2, None, Some("orders_id")).await.unwrap();
        assert_eq!(read.check_static_id, created.check.check_static_id);
        assert_eq!(read.params, desired.params);

        // Reference lookups are scoped to the table.
        let err = reconciler.read(3, None, Some("orders_id")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_replaces_with_prior_static_id() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let created = reconciler
            .create(&check(1, "NullCheck", &[("column", "id")]))
            .await
            .unwrap();
        let static_id = created.check.check_static_id;

        let desired = check(1, "NullCheck", &[("column", "order_id")]);
        let updated = reconciler.update(static_id, &desired).await.unwrap();

        let sent = api.create_requests().last().cloned().unwrap();
        assert_eq!(sent.params[STATIC_ID_KEY], static_id.to_string());
        assert_eq!(sent.params["column"], "order_id");
        assert_ne!(updated.check.check_static_id, 0);
        assert_eq!(updated.check.params, desired.params);

        let read = reconciler
            .read(1, Some(updated.check.check_static_id), None)
            .await
            .unwrap();
        assert_eq!(read.params["column"], "order_id");
    }

    #[tokio::test]
    async fn test_update_with_different_static_id_is_invalid_input() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let mut desired = check(1, "NullCheck", &[]);
        desired.check_static_id = 42;
        let err = reconciler.update(41, &desired).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
        assert!(api.create_requests().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_vanished_check_is_not_found() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);

        let err = reconciler
            .update(77, &check(1, "NullCheck", &[]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(api.create_requests().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_is_fatal() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let created = reconciler.create(&check(1, "NullCheck", &[])).await.unwrap();

        api.fail_on(FakeCall::CreateCheck);
        let err = reconciler
            .update(created.check.check_static_id, &check(1, "NullCheck", &[("x", "y")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(_)));
        assert!(err.message().contains("replacing check"));
    }

    #[tokio::test]
    async fn test_update_reference_precedence() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let created = reconciler.create(&check(1, "NullCheck", &[])).await.unwrap();

        let mut desired = check(1, "NullCheck", &[(REFERENCE_KEY, "embedded")]);
        desired.reference = Some("top".to_string());
        let updated = reconciler
            .update(created.check.check_static_id, &desired)
            .await
            .unwrap();

        assert_eq!(updated.diagnostics.len(), 1);
        assert_eq!(updated.check.reference.as_deref(), Some("top"));
    }

    #[tokio::test]
    async fn test_delete_uses_current_check_id() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let created = reconciler.create(&check(1, "NullCheck", &[])).await.unwrap();
        let updated = reconciler
            .update(created.check.check_static_id, &check(1, "NullCheck", &[("a", "b")]))
            .await
            .unwrap();

        let live = api
            .get_check_by_static_id(1, updated.check.check_static_id)
            .await
            .unwrap()
            .unwrap();
        assert_ok!(reconciler.delete(1, updated.check.check_static_id).await);
        assert_eq!(api.deleted_check_ids(), vec![live.check_id]);

        let err = reconciler
            .read(1, Some(updated.check.check_static_id), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_of_vanished_check_is_race_condition() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let created = reconciler.create(&check(1, "NullCheck", &[])).await.unwrap();
        let static_id = created.check.check_static_id;

        reconciler.delete(1, static_id).await.unwrap();
        let err = reconciler.delete(1, static_id).await.unwrap_err();
        assert!(matches!(err, ProviderError::RaceCondition(_)));
    }

    #[tokio::test]
    async fn test_delete_transport_failure_is_upstream() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let created = reconciler.create(&check(1, "NullCheck", &[])).await.unwrap();

        api.fail_on(FakeCall::DeleteCheck);
        let err = reconciler
            .delete(1, created.check.check_static_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_import_by_static_id_and_reference() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let mut desired = check(5, "NullCheck", &[("column", "id")]);
        desired.reference = Some("myref".to_string());
        let created = reconciler.create(&desired).await.unwrap();
        let static_id = created.check.check_static_id;

        let by_id = reconciler.import(&format!("5,{}", static_id)).await.unwrap();
        let by_ref = reconciler.import("5,,myref").await.unwrap();
        assert_eq!(by_id, by_ref);
        assert_eq!(by_id.table_id, 5);

        assert!(matches!(
            reconciler.import("5").await,
            Err(ProviderError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_read_keeps_configured_reserved_params() {
        let api = FakeAnomalo::new();
        let reconciler = CheckReconciler::new(&api);
        let created = reconciler
            .create(&check(1, "NullCheck", &[(REFERENCE_KEY, "x"), ("column", "id")]))
            .await
            .unwrap();

        let read = reconciler
            .read(1, Some(created.check.check_static_id), None)
            .await
            .unwrap();
        assert!(!read.params.contains_key(REFERENCE_KEY));
        assert_eq!(read.reference.as_deref(), Some("x"));

        let refreshed = read.with_reserved_params_from(&created.check);
        assert_eq!(refreshed, created.check);
    }

    #[test]
    fn test_reserved_params_follow_live_reference() {
        let prior = check(1, "NullCheck", &[(REFERENCE_KEY, "x"), (STATIC_ID_KEY, "4")]);
        let mut live = check(1, "NullCheck", &[]);
        live.reference = Some("renamed".to_string());

        let refreshed = live.with_reserved_params_from(&prior);
        assert_eq!(refreshed.params[REFERENCE_KEY], "renamed");
        assert_eq!(refreshed.params[STATIC_ID_KEY], "4");

        let untouched = check(1, "NullCheck", &[]).with_reserved_params_from(&check(1, "NullCheck", &[]));
        assert!(untouched.params.is_empty());
    }

    #[test]
    fn test_plan_follows_embedded_reference() {
        let prior = json!({
            "table_id": 1,
            "check_static_id": 9,
            "check_type": "NullCheck",
            "reference": "x",
            "params": {"reference": "x"}
        });
        let config = json!({"table_id": 1, "check_type": "NullCheck", "params": {"reference": "y"}});
        let plan = Check::plan(Some(&prior), config.clone(), &config);
        assert_eq!(plan.planned_state["reference"], "y");
        assert!(!plan.requires_replace);

        let mut config = config;
        config["reference"] = json!("top");
        let plan = Check::plan(Some(&prior), config.clone(), &config);
        assert_eq!(plan.planned_state["reference"], "top");

        let config = json!({"table_id": 1, "check_type": "NullCheck", "params": {}});
        let plan = Check::plan(Some(&prior), config.clone(), &config);
        assert_eq!(plan.planned_state["reference"], "x");
    }

    #[test]
    fn test_state_encoding() {
        let state = json!({
            "table_id": 3,
            "check_static_id": 9,
            "check_type": "NullCheck",
            "reference": "",
            "params": {"column": "id"}
        });
        let check = Check::from_state(&state).unwrap();
        assert!(check.reference.is_none());

        let planned = Check::from_state(&json!({
            "table_id": 3,
            "check_static_id": null,
            "check_type": "NullCheck",
            "reference": null,
            "params": {}
        }))
        .unwrap();
        assert_eq!(planned.check_static_id, 0);
        assert_eq!(check.params["column"], "id");

        let encoded = check.to_state();
        assert_eq!(encoded["check_static_id"], 9);
        assert!(encoded["reference"].is_null());
    }

    #[test]
    fn test_schema_flags() {
        let schema = Check::schema();
        assert!(schema.attribute("table_id").unwrap().force_new);
        assert!(schema.attribute("check_static_id").unwrap().flags.computed);
        assert!(schema.attribute("check_type").unwrap().flags.required);
    }
}
