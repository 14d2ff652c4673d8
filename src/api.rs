//! The Anomalo API as seen by the reconcilers.
//!
//! [`CheckApi`] is the minimal surface the check reconciler needs;
//! [`AnomaloApi`] adds tables, notification channels and organizations.
//! [`crate::client::AnomaloClient`] implements both over HTTP and
//! [`crate::testing::FakeAnomalo`] implements both in memory. The provider
//! holds the client as an injected handle; nothing here is global.
//!
//! Lookups return `Ok(None)` when the object does not exist so callers can
//! tell "gone" apart from a failed request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::params::Params;

/// A check as stored by Anomalo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    /// Id of the underlying object. Changes every time the check is replaced.
    pub check_id: i64,
    /// Stable identity of the check.
    pub check_static_id: i64,
    /// Kind of check.
    pub check_type: String,
    /// Table-scoped label, if one is set.
    pub reference: Option<String>,
    /// Normalized parameters.
    pub params: Params,
}

/// Body of a `create_check` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateCheckRequest {
    /// Owning table.
    pub table_id: i64,
    /// Kind of check.
    #[serde(rename = "check")]
    pub check_type: String,
    /// Parameters, including any reserved keys.
    pub params: Params,
}

/// Identity Anomalo assigned to a created check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCheck {
    /// Id of the new object.
    pub check_id: i64,
    /// Static id of the check.
    pub check_static_id: i64,
    /// Reference recorded by Anomalo, which may have been minted server side.
    pub reference: Option<String>,
}

/// Monitoring configuration of a table, as reported by Anomalo.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct TableConfig {
    /// `daily`, `data_freshness_gated`, or unset when monitoring is off.
    #[serde(default)]
    pub check_cadence_type: Option<String>,
    /// Time of day daily checks run at.
    #[serde(default)]
    pub check_cadence_run_at_duration: Option<String>,
    /// Where alerts go.
    #[serde(default)]
    pub notification_channel_id: Option<i64>,
    /// SQL definition for views.
    #[serde(default)]
    pub definition: Option<String>,
    /// Type of the time columns.
    #[serde(default)]
    pub time_column_type: Option<String>,
    /// Delay before notifying.
    #[serde(default)]
    pub notify_after: Option<String>,
    /// Delay after which data counts as fresh.
    #[serde(default)]
    pub fresh_after: Option<String>,
    /// Expression selecting intervals to skip.
    #[serde(default)]
    pub interval_skip_expr: Option<String>,
    /// Alert on check errors as well as failures.
    #[serde(default)]
    pub always_alert_on_errors: Option<bool>,
    /// Time columns, as strings or arbitrary values.
    #[serde(default)]
    pub time_columns: Option<Vec<serde_json::Value>>,
}

/// Warehouse a table lives in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Warehouse {
    /// Warehouse id.
    #[serde(default)]
    pub id: Option<i64>,
    /// Warehouse name, the first component of a qualified table name.
    pub name: String,
}

/// A table known to Anomalo.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableInformation {
    /// Table id.
    pub id: i64,
    /// `schema.table`, without the warehouse.
    pub full_name: String,
    /// Owning warehouse.
    pub warehouse: Warehouse,
    /// Monitoring configuration, absent for unconfigured tables.
    #[serde(default)]
    pub config: Option<TableConfig>,
}

impl TableInformation {
    /// `warehouse.schema.table`, the form used as the resource's `table_name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.warehouse.name, self.full_name)
    }
}

/// Body of a `configure_table` call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConfigureTableRequest {
    /// Table to configure.
    pub table_id: i64,
    /// `None` switches monitoring off.
    pub check_cadence_type: Option<String>,
    /// Time of day daily checks run at.
    pub check_cadence_run_at_duration: String,
    /// Where alerts go.
    pub notification_channel_id: i64,
    /// SQL definition for views.
    pub definition: String,
    /// Alert on check errors as well as failures.
    pub always_alert_on_errors: bool,
    /// Type of the time columns.
    pub time_column_type: String,
    /// Delay before notifying.
    pub notify_after: String,
    /// Delay after which data counts as fresh.
    pub fresh_after: String,
    /// Expression selecting intervals to skip.
    pub interval_skip_expr: String,
    /// Time columns. Omitted from the body when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_columns: Option<Vec<String>>,
}

/// A destination for alerts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationChannel {
    /// Channel id.
    pub id: i64,
    /// Kind of channel, e.g. `email` or `slack`.
    pub channel_type: String,
    /// Free-form name shown in the UI.
    #[serde(default)]
    pub description: String,
}

/// An Anomalo organization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    /// Organization id.
    pub id: i64,
    /// Organization name.
    pub name: String,
}

/// Check operations used by [`crate::check::CheckReconciler`].
#[async_trait]
pub trait CheckApi: Send + Sync {
    /// Create a check. A [`crate::params::STATIC_ID_KEY`] entry in the params
    /// asks Anomalo to replace that check.
    async fn create_check(&self, request: &CreateCheckRequest)
        -> Result<CreatedCheck, ProviderError>;

    /// Find a check on a table by static id.
    async fn get_check_by_static_id(
        &self,
        table_id: i64,
        check_static_id: i64,
    ) -> Result<Option<CheckRecord>, ProviderError>;

    /// Find a check on a table by reference.
    async fn get_check_by_reference(
        &self,
        table_id: i64,
        reference: &str,
    ) -> Result<Option<CheckRecord>, ProviderError>;

    /// Delete a check by its object id.
    async fn delete_check(&self, table_id: i64, check_id: i64) -> Result<(), ProviderError>;
}

/// Everything else the provider talks to Anomalo about.
#[async_trait]
pub trait AnomaloApi: CheckApi {
    /// Verify host and token by calling `ping`.
    async fn ping(&self) -> Result<(), ProviderError>;

    /// Look up a table by its `warehouse.schema.table` name.
    async fn get_table_information(
        &self,
        table_name: &str,
    ) -> Result<Option<TableInformation>, ProviderError>;

    /// Apply a table configuration. Returns the table id.
    async fn configure_table(&self, request: &ConfigureTableRequest)
        -> Result<i64, ProviderError>;

    /// List all notification channels.
    async fn list_notification_channels(&self) -> Result<Vec<NotificationChannel>, ProviderError>;

    /// Find an organization by exact name.
    async fn get_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Organization>, ProviderError>;

    /// Switch the token's active organization. Returns the now active id.
    async fn change_organization(&self, organization_id: i64) -> Result<i64, ProviderError>;
}
