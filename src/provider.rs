//! The provider surface the host drives.
//!
//! [`ProviderService`] is the operation set a declarative-infrastructure host
//! calls: schema, configure, validate, plan, create/read/update/delete,
//! import and data source reads. [`AnomaloProvider`] implements it by
//! dispatching on the resource type to the check and table reconcilers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use anomalo_provider::testing::FakeAnomalo;
//! use anomalo_provider::{AnomaloProvider, ProviderService};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let provider = AnomaloProvider::with_client(Arc::new(FakeAnomalo::new()));
//! let applied = provider
//!     .create("anomalo_check", json!({
//!         "table_id": 1,
//!         "check_type": "RowCount",
//!         "params": {}
//!     }))
//!     .await
//!     .unwrap();
//! assert!(applied.diagnostics.is_empty());
//! # });
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::api::AnomaloApi;
use crate::check::{Check, CheckReconciler, CHECK_RESOURCE};
use crate::client::AnomaloClient;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::notification_channel::{
    read_notification_channel, NotificationChannelQuery, NOTIFICATION_CHANNEL_DATA_SOURCE,
};
use crate::plan::plan_resource;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::table::{Table, TableReconciler, TABLE_RESOURCE};
use crate::types::{ApplyResult, ImportedResource, PlanResult, ProviderMetadata};
use crate::validation::validate;

/// Operations a provider exposes to the host.
///
/// Validation defaults to the schema, so an implementation supplies the
/// schema, configuration, planning and the CRUD operations.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Names of all resources and data sources, derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider block against its schema.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.schema().provider, &config))
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration against its schema.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let resource = schema
            .resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        Ok(validate(resource, &config))
    }

    /// Plan changes for a resource. A null `proposed_state` plans a delete.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ApplyResult, ProviderError>;

    /// Read the current state of a resource. `None` means it was deleted
    /// outside the provider and should be dropped from state.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ApplyResult, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value)
        -> Result<(), ProviderError>;

    /// Bring an existing object under management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration against its schema.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let data_source = schema
            .data_sources
            .get(data_source_type)
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))?;
        Ok(validate(data_source, &config))
    }

    /// Read a data source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The Anomalo provider.
///
/// Holds the API handle created by [`ProviderService::configure`]; nothing is
/// global, so several providers can run side by side.
pub struct AnomaloProvider {
    client: RwLock<Option<Arc<dyn AnomaloApi>>>,
    injected: Option<Arc<dyn AnomaloApi>>,
    env: EnvLookup,
}

impl Default for AnomaloProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomaloProvider {
    /// A provider that builds an HTTP client when configured and reads
    /// fallbacks from the process environment.
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            injected: None,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// A provider that talks to `api` instead of building an HTTP client.
    ///
    /// The provider is usable immediately; `configure` still validates the
    /// configuration, pings and switches organization on `api`.
    pub fn with_client(api: Arc<dyn AnomaloApi>) -> Self {
        Self {
            client: RwLock::new(Some(api.clone())),
            injected: Some(api),
            ..Self::new()
        }
    }

    /// Replace the environment lookup used for configuration fallbacks.
    pub fn with_environment<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Whether an API handle is available.
    pub fn is_configured(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn api(&self) -> Result<Arc<dyn AnomaloApi>, ProviderError> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                ProviderError::Configuration(
                    "the provider has not been configured; call configure first".to_string(),
                )
            })
    }

    fn set_api(&self, api: Option<Arc<dyn AnomaloApi>>) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = api;
    }

    async fn connect(&self, config: Value) -> Result<Arc<dyn AnomaloApi>, Vec<Diagnostic>> {
        let config = ProviderConfig::from_value(config).map_err(|e| {
            vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
        })?;
        let settings = config.resolve(|name| (self.env)(name))?;
        debug!(?settings, "Resolved provider settings");

        let api: Arc<dyn AnomaloApi> = match &self.injected {
            Some(api) => api.clone(),
            None => Arc::new(AnomaloClient::new(&settings).map_err(|e| vec![Diagnostic::from(e)])?),
        };

        api.ping().await.map_err(|e| {
            vec![Diagnostic::error("Unable to connect to Anomalo").with_detail(format!(
                "Could not reach {} with the configured token: {}",
                settings.host, e
            ))]
        })?;

        if let Some(name) = &settings.organization {
            let organization = api
                .get_organization_by_name(name)
                .await
                .map_err(|e| {
                    vec![Diagnostic::error("Unable to look up organization")
                        .with_detail(e.to_string())
                        .with_attribute("organization")]
                })?
                .ok_or_else(|| {
                    vec![Diagnostic::error("Organization not found")
                        .with_detail(format!("No organization is named {:?}", name))
                        .with_attribute("organization")]
                })?;
            let active = api.change_organization(organization.id).await.map_err(|e| {
                vec![Diagnostic::error("Unable to switch organization")
                    .with_detail(e.to_string())
                    .with_attribute("organization")]
            })?;
            if active != organization.id {
                return Err(vec![Diagnostic::error("Unable to switch organization")
                    .with_detail(format!(
                        "Asked for organization {} ({:?}) but {} is active",
                        organization.id, name, active
                    ))
                    .with_attribute("organization")]);
            }
            info!(organization = %name, id = active, "Switched organization");
        }

        Ok(api)
    }
}

fn unknown_resource(resource_type: &str) -> ProviderError {
    ProviderError::UnknownResource(resource_type.to_string())
}

fn log_failure<T>(operation: &str, result: &Result<T, ProviderError>) {
    if let Err(e) = result {
        error!(operation, error = %e, "Operation failed");
    }
}

#[async_trait::async_trait]
impl ProviderService for AnomaloProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(CHECK_RESOURCE, Check::schema())
            .with_resource(TABLE_RESOURCE, Table::schema())
            .with_data_source(
                NOTIFICATION_CHANNEL_DATA_SOURCE,
                NotificationChannelQuery::schema(),
            )
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        match self.connect(config).await {
            Ok(api) => {
                self.set_api(Some(api));
                info!("Provider configured");
                Ok(vec![])
            }
            Err(diagnostics) => {
                warn!(count = diagnostics.len(), "Provider configuration failed");
                Ok(diagnostics)
            }
        }
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), ProviderError> {
        self.set_api(self.injected.clone());
        info!("Provider stopped");
        Ok(())
    }

    #[instrument(skip(self, prior_state, proposed_state, config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        match resource_type {
            CHECK_RESOURCE => Ok(Check::plan(prior_state.as_ref(), proposed_state, &config)),
            TABLE_RESOURCE => Ok(plan_resource(
                &Table::schema(),
                prior_state.as_ref(),
                &proposed_state,
                &config,
            )),
            other => Err(unknown_resource(other)),
        }
    }

    #[instrument(skip(self, planned_state))]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ApplyResult, ProviderError> {
        let api = self.api()?;
        let result = match resource_type {
            CHECK_RESOURCE => {
                let desired = Check::from_state(&planned_state)?;
                CheckReconciler::new(api.as_ref())
                    .create(&desired)
                    .await
                    .map(|outcome| {
                        ApplyResult::new(outcome.check.to_state())
                            .with_diagnostics(outcome.diagnostics)
                    })
            }
            TABLE_RESOURCE => {
                let desired = Table::from_state(&planned_state)?;
                let table = TableReconciler::new(api.as_ref()).create(&desired).await?;
                Ok(ApplyResult::new(table.to_state()?))
            }
            other => Err(unknown_resource(other)),
        };
        log_failure("create", &result);
        result
    }

    #[instrument(skip(self, current_state))]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let api = self.api()?;
        let result = match resource_type {
            CHECK_RESOURCE => {
                let current = Check::from_state(&current_state)?;
                match CheckReconciler::new(api.as_ref())
                    .read(
                        current.table_id,
                        Some(current.check_static_id),
                        current.reference.as_deref(),
                    )
                    .await
                {
                    Ok(check) => Ok(Some(check.with_reserved_params_from(&current).to_state())),
                    Err(e) if e.is_not_found() => {
                        warn!(
                            table_id = current.table_id,
                            check_static_id = current.check_static_id,
                            "Check no longer exists, removing it from state"
                        );
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            TABLE_RESOURCE => {
                let current = Table::from_state(&current_state)?;
                match TableReconciler::new(api.as_ref()).read(&current).await? {
                    Some(table) => table.to_state().map(Some),
                    None => {
                        warn!(table_name = %current.table_name, "Table no longer exists, removing it from state");
                        Ok(None)
                    }
                }
            }
            other => Err(unknown_resource(other)),
        };
        log_failure("read", &result);
        result
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ApplyResult, ProviderError> {
        let api = self.api()?;
        let result = match resource_type {
            CHECK_RESOURCE => {
                let prior = Check::from_state(&prior_state)?;
                let desired = Check::from_state(&planned_state)?;
                CheckReconciler::new(api.as_ref())
                    .update(prior.check_static_id, &desired)
                    .await
                    .map(|outcome| {
                        ApplyResult::new(outcome.check.to_state())
                            .with_diagnostics(outcome.diagnostics)
                    })
            }
            TABLE_RESOURCE => {
                let prior = Table::from_state(&prior_state)?;
                let desired = Table::from_state(&planned_state)?;
                let table = TableReconciler::new(api.as_ref())
                    .update(&prior, &desired)
                    .await?;
                Ok(ApplyResult::new(table.to_state()?))
            }
            other => Err(unknown_resource(other)),
        };
        log_failure("update", &result);
        result
    }

    #[instrument(skip(self, current_state))]
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let api = self.api()?;
        let result = match resource_type {
            CHECK_RESOURCE => {
                let current = Check::from_state(&current_state)?;
                CheckReconciler::new(api.as_ref())
                    .delete(current.table_id, current.check_static_id)
                    .await
            }
            TABLE_RESOURCE => {
                let current = Table::from_state(&current_state)?;
                TableReconciler::new(api.as_ref()).delete(&current).await
            }
            other => Err(unknown_resource(other)),
        };
        log_failure("delete", &result);
        result
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let api = self.api()?;
        let state = match resource_type {
            CHECK_RESOURCE => CheckReconciler::new(api.as_ref())
                .import(id)
                .await
                .map(|check| check.to_state()),
            TABLE_RESOURCE => TableReconciler::new(api.as_ref())
                .import(id)
                .await
                .and_then(|table| table.to_state()),
            other => Err(unknown_resource(other)),
        };
        log_failure("import", &state);
        Ok(vec![ImportedResource::new(resource_type, state?)])
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let api = self.api()?;
        let result = match data_source_type {
            NOTIFICATION_CHANNEL_DATA_SOURCE => read_notification_channel(api.as_ref(), config).await,
            other => Err(unknown_resource(other)),
        };
        log_failure("read_data_source", &result);
        result
    }
}
