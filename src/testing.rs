//! Testing utilities.
//!
//! [`ProviderTester`] drives a [`ProviderService`] through the same calls the
//! host makes, and [`FakeAnomalo`] stands in for the Anomalo API so the
//! whole provider can be exercised without a network.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use anomalo_provider::testing::{FakeAnomalo, ProviderTester};
//! use anomalo_provider::AnomaloProvider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let api = Arc::new(FakeAnomalo::new());
//! let tester = ProviderTester::new(AnomaloProvider::with_client(api.clone()));
//!
//! let state = tester
//!     .lifecycle_create("anomalo_check", json!({
//!         "table_id": 1,
//!         "check_type": "NullCheck",
//!         "params": {"column": "id"}
//!     }))
//!     .await
//!     .unwrap();
//! assert_ne!(state["check_static_id"], 0);
//! # });
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{
    AnomaloApi, CheckApi, CheckRecord, ConfigureTableRequest, CreateCheckRequest, CreatedCheck,
    NotificationChannel, Organization, TableConfig, TableInformation, Warehouse,
};
use crate::error::ProviderError;
use crate::params::{self, REFERENCE_KEY, STATIC_ID_KEY};
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::types::{ApplyResult, ImportedResource, PlanResult};

/// A test harness around a provider.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration. Error diagnostics become `Err`.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider. Error diagnostics become `Err`.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, config.clone(), config)
            .await
    }

    /// Plan a resource update where the proposal is the configuration.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ApplyResult, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource. `None` means it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ApplyResult, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Plan, create, then read back. Returns the state after the read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read_existing(resource_type, created.state).await
    }

    /// Plan, update (or replace), then read back. Returns the state after the
    /// read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config.clone())
            .await?;

        let applied = if plan.requires_replace {
            self.delete(resource_type, prior_state).await?;
            let plan = self.plan_create(resource_type, config).await?;
            self.create(resource_type, plan.planned_state).await?
        } else {
            self.update(resource_type, prior_state, plan.planned_state)
                .await?
        };

        self.read_existing(resource_type, applied.state).await
    }

    /// Plan a delete, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Create, update, then delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone())
            .await?;
        Ok(updated)
    }

    async fn read_existing(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.read(resource_type, state).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("{} vanished right after apply", resource_type))
        })
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation returned error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed outright.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        plan.has_changes(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan changes nothing.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "Expected no changes, but got {:?}",
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan can be applied in place.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes `path`.
///
/// # Panics
///
/// Panics if `path` is not among the changes.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {:?}",
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic's summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.summary.contains(substring)),
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain exactly `count` warnings.
///
/// # Panics
///
/// Panics on any other number of warnings.
pub fn assert_warning_count(diagnostics: &[Diagnostic], count: usize) {
    let warnings: Vec<_> = diagnostics.iter().filter(|d| !d.is_error()).collect();
    assert_eq!(
        warnings.len(),
        count,
        "Expected {} warning(s), got {:?}",
        count,
        warnings.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory Anomalo
// =========================================================================

/// API calls [`FakeAnomalo`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    /// `create_check`
    CreateCheck,
    /// `get_checks_for_table`, behind both check lookups
    GetChecks,
    /// `delete_check`
    DeleteCheck,
    /// `ping`
    Ping,
    /// `get_table_information`
    GetTableInformation,
    /// `configure_table`
    ConfigureTable,
    /// `list_notification_channels`
    ListNotificationChannels,
    /// `organizations`
    GetOrganization,
    /// `organization`
    ChangeOrganization,
}

#[derive(Default)]
struct FakeState {
    last_id: i64,
    checks: Vec<(i64, CheckRecord)>,
    tables: Vec<TableInformation>,
    channels: Vec<NotificationChannel>,
    organizations: Vec<Organization>,
    active_organization: Option<i64>,
    create_requests: Vec<CreateCheckRequest>,
    configure_requests: Vec<ConfigureTableRequest>,
    deleted_check_ids: Vec<i64>,
    failures: HashSet<FakeCall>,
    mint_references: bool,
}

impl FakeState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn check(&mut self, call: FakeCall) -> Result<(), ProviderError> {
        if self.failures.contains(&call) {
            return Err(ProviderError::Api(format!(
                "HTTP 500 from {:?}: injected failure",
                call
            )));
        }
        Ok(())
    }

    fn find_check(&self, table_id: i64, pred: impl Fn(&CheckRecord) -> bool) -> Option<CheckRecord> {
        self.checks
            .iter()
            .find(|(table, check)| *table == table_id && pred(check))
            .map(|(_, check)| check.clone())
    }
}

/// An in-memory Anomalo.
///
/// Replaces behave like the real API: a `create_check` carrying
/// `check_static_id` retires that check and issues a new static id and
/// check id. Every create request and deleted check id is logged.
#[derive(Default)]
pub struct FakeAnomalo {
    state: Mutex<FakeState>,
}

impl FakeAnomalo {
    /// An empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a reference for checks created without one.
    pub fn with_minted_references(self) -> Self {
        self.state().mint_references = true;
        self
    }

    /// Seed a table. `full_name` is `schema.table`.
    pub fn with_table(self, id: i64, warehouse: &str, full_name: &str) -> Self {
        self.state().tables.push(TableInformation {
            id,
            full_name: full_name.to_string(),
            warehouse: Warehouse {
                id: None,
                name: warehouse.to_string(),
            },
            config: None,
        });
        self
    }

    /// Seed a notification channel.
    pub fn with_notification_channel(self, id: i64, channel_type: &str, description: &str) -> Self {
        self.state().channels.push(NotificationChannel {
            id,
            channel_type: channel_type.to_string(),
            description: description.to_string(),
        });
        self
    }

    /// Seed an organization.
    pub fn with_organization(self, id: i64, name: &str) -> Self {
        self.state().organizations.push(Organization {
            id,
            name: name.to_string(),
        });
        self
    }

    /// Make every subsequent `call` fail.
    pub fn fail_on(&self, call: FakeCall) {
        self.state().failures.insert(call);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Remove a check behind the provider's back.
    pub fn remove_check(&self, table_id: i64, check_static_id: i64) {
        self.state()
            .checks
            .retain(|(table, c)| !(*table == table_id && c.check_static_id == check_static_id));
    }

    /// Every `create_check` request received, in order.
    pub fn create_requests(&self) -> Vec<CreateCheckRequest> {
        self.state().create_requests.clone()
    }

    /// Every `configure_table` request received, in order.
    pub fn configure_requests(&self) -> Vec<ConfigureTableRequest> {
        self.state().configure_requests.clone()
    }

    /// Check ids passed to `delete_check`, in order.
    pub fn deleted_check_ids(&self) -> Vec<i64> {
        self.state().deleted_check_ids.clone()
    }

    /// Organization the token was last switched to.
    pub fn active_organization(&self) -> Option<i64> {
        self.state().active_organization
    }

    /// Number of checks currently stored.
    pub fn check_count(&self) -> usize {
        self.state().checks.len()
    }
}

#[async_trait]
impl CheckApi for FakeAnomalo {
    async fn create_check(
        &self,
        request: &CreateCheckRequest,
    ) -> Result<CreatedCheck, ProviderError> {
        let mut state = self.state();
        state.create_requests.push(request.clone());
        state.check(FakeCall::CreateCheck)?;

        let mut params = request.params.clone();
        let replaced = match params::embedded_static_id(&params)? {
            Some(static_id) => {
                let old = state
                    .find_check(request.table_id, |c| c.check_static_id == static_id)
                    .ok_or_else(|| {
                        ProviderError::Api(format!(
                            "HTTP 400 from create_check: no check {} on table {}",
                            static_id, request.table_id
                        ))
                    })?;
                state.checks.retain(|(table, c)| {
                    !(*table == request.table_id && c.check_static_id == static_id)
                });
                Some(old)
            }
            None => None,
        };
        params.remove(STATIC_ID_KEY);

        let check_id = state.next_id();
        let check_static_id = state.next_id();
        let reference = params
            .remove(REFERENCE_KEY)
            .filter(|r| !r.is_empty())
            .or_else(|| replaced.and_then(|old| old.reference))
            .or_else(|| {
                state
                    .mint_references
                    .then(|| format!("check_{}", check_static_id))
            });

        let record = CheckRecord {
            check_id,
            check_static_id,
            check_type: request.check_type.clone(),
            reference: reference.clone(),
            params,
        };
        state.checks.push((request.table_id, record));

        Ok(CreatedCheck {
            check_id,
            check_static_id,
            reference,
        })
    }

    async fn get_check_by_static_id(
        &self,
        table_id: i64,
        check_static_id: i64,
    ) -> Result<Option<CheckRecord>, ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::GetChecks)?;
        Ok(state.find_check(table_id, |c| c.check_static_id == check_static_id))
    }

    async fn get_check_by_reference(
        &self,
        table_id: i64,
        reference: &str,
    ) -> Result<Option<CheckRecord>, ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::GetChecks)?;
        Ok(state.find_check(table_id, |c| c.reference.as_deref() == Some(reference)))
    }

    async fn delete_check(&self, table_id: i64, check_id: i64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::DeleteCheck)?;
        let before = state.checks.len();
        state
            .checks
            .retain(|(table, c)| !(*table == table_id && c.check_id == check_id));
        if state.checks.len() == before {
            return Err(ProviderError::Api(format!(
                "HTTP 404 from delete_check: no check {} on table {}",
                check_id, table_id
            )));
        }
        state.deleted_check_ids.push(check_id);
        Ok(())
    }
}

#[async_trait]
impl AnomaloApi for FakeAnomalo {
    async fn ping(&self) -> Result<(), ProviderError> {
        self.state().check(FakeCall::Ping)
    }

    async fn get_table_information(
        &self,
        table_name: &str,
    ) -> Result<Option<TableInformation>, ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::GetTableInformation)?;
        Ok(state
            .tables
            .iter()
            .find(|t| t.qualified_name() == table_name)
            .cloned())
    }

    async fn configure_table(
        &self,
        request: &ConfigureTableRequest,
    ) -> Result<i64, ProviderError> {
        let mut state = self.state();
        state.configure_requests.push(request.clone());
        state.check(FakeCall::ConfigureTable)?;

        let table = state
            .tables
            .iter_mut()
            .find(|t| t.id == request.table_id)
            .ok_or_else(|| {
                ProviderError::Api(format!(
                    "HTTP 404 from configure_table: no table {}",
                    request.table_id
                ))
            })?;
        table.config = Some(TableConfig {
            check_cadence_type: request.check_cadence_type.clone(),
            check_cadence_run_at_duration: Some(request.check_cadence_run_at_duration.clone()),
            notification_channel_id: Some(request.notification_channel_id),
            definition: Some(request.definition.clone()),
            time_column_type: Some(request.time_column_type.clone()),
            notify_after: Some(request.notify_after.clone()),
            fresh_after: Some(request.fresh_after.clone()),
            interval_skip_expr: Some(request.interval_skip_expr.clone()),
            always_alert_on_errors: Some(request.always_alert_on_errors),
            time_columns: Some(
                request
                    .time_columns
                    .iter()
                    .flatten()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        });
        Ok(request.table_id)
    }

    async fn list_notification_channels(
        &self,
    ) -> Result<Vec<NotificationChannel>, ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::ListNotificationChannels)?;
        Ok(state.channels.clone())
    }

    async fn get_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Organization>, ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::GetOrganization)?;
        Ok(state.organizations.iter().find(|o| o.name == name).cloned())
    }

    async fn change_organization(&self, organization_id: i64) -> Result<i64, ProviderError> {
        let mut state = self.state();
        state.check(FakeCall::ChangeOrganization)?;
        if !state.organizations.iter().any(|o| o.id == organization_id) {
            return Err(ProviderError::Api(format!(
                "HTTP 404 from organization: no organization {}",
                organization_id
            )));
        }
        state.active_organization = Some(organization_id);
        Ok(organization_id)
    }
}
