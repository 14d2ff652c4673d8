//! The `anomalo_table` resource.
//!
//! Tables are never created or deleted in Anomalo by this provider; they must
//! already be visible to Anomalo. "Create" configures monitoring on an
//! existing table and "delete" switches monitoring off again.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::api::{AnomaloApi, ConfigureTableRequest, TableInformation};
use crate::error::ProviderError;
use crate::params::value_to_text;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Resource type name of a table.
pub const TABLE_RESOURCE: &str = "anomalo_table";

/// Accepted values of `check_cadence_type`. Empty turns monitoring off.
pub const CHECK_CADENCE_TYPES: [&str; 3] = ["", "daily", "data_freshness_gated"];

/// A table's monitoring configuration as tracked in state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    /// `warehouse.schema.table`.
    pub table_name: String,
    /// Anomalo's id for the table. `0` when not known yet.
    #[serde(default, deserialize_with = "null_as_default")]
    pub table_id: i64,
    /// `""`, `daily` or `data_freshness_gated`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub check_cadence_type: String,
    /// Time of day daily checks run at.
    #[serde(default, deserialize_with = "null_as_default")]
    pub check_cadence_run_at_duration: String,
    /// Where alerts go.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notification_channel_id: i64,
    /// SQL definition for views.
    #[serde(default, deserialize_with = "null_as_default")]
    pub definition: String,
    /// Type of the time columns.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_column_type: String,
    /// Delay before notifying.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notify_after: String,
    /// Delay after which data counts as fresh.
    #[serde(default, deserialize_with = "null_as_default")]
    pub fresh_after: String,
    /// Expression selecting intervals to skip.
    #[serde(default, deserialize_with = "null_as_default")]
    pub interval_skip_expr: String,
    /// Alert on check errors as well as failures.
    #[serde(default, deserialize_with = "null_as_default")]
    pub always_alert_on_errors: bool,
    /// Time columns.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_columns: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_string(description: &str) -> Attribute {
    Attribute::optional_string()
        .with_default(json!(""))
        .with_description(description)
}

impl Table {
    /// Schema of the `anomalo_table` resource.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description(
                "Monitoring configuration of a table that already exists in Anomalo. \
                 Maps closely to the `configure_table` endpoint.",
            )
            .with_attribute(
                "table_id",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_description(
                        "Id of the table. Optional only to make imports more forgiving.",
                    ),
            )
            .with_attribute(
                "table_name",
                Attribute::required_string().with_description(
                    "Fully qualified name including the warehouse, ex warehouse.schema.table.",
                ),
            )
            .with_attribute(
                "check_cadence_type",
                optional_string(
                    "How often checks run. Leave unset to turn checks off for the table.",
                )
                .with_allowed_values(CHECK_CADENCE_TYPES),
            )
            .with_attribute(
                "check_cadence_run_at_duration",
                optional_string("Time of day daily checks run at."),
            )
            .with_attribute(
                "notification_channel_id",
                Attribute::required_int64().with_description(
                    "Channel alerts go to, ex `anomalo_notification_channel.<name>.id`.",
                ),
            )
            .with_attribute("definition", optional_string("SQL definition for views."))
            .with_attribute("time_column_type", optional_string("Type of the time columns."))
            .with_attribute("notify_after", optional_string("Delay before notifying."))
            .with_attribute(
                "fresh_after",
                optional_string("Delay after which data counts as fresh."),
            )
            .with_attribute(
                "interval_skip_expr",
                optional_string("Expression selecting intervals to skip."),
            )
            .with_attribute(
                "always_alert_on_errors",
                Attribute::new(AttributeType::Bool, AttributeFlags::optional())
                    .with_default(json!(false))
                    .with_description("Alert on check errors as well as failures."),
            )
            .with_attribute(
                "time_columns",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                )
                .with_default(json!([]))
                .with_description("Time columns of the table."),
            )
    }

    /// Decode a state or planned-state object.
    pub fn from_state(state: &Value) -> Result<Self, ProviderError> {
        Ok(serde_json::from_value(state.clone())?)
    }

    /// Encode as a state object.
    pub fn to_state(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Request that applies this configuration to `table_id`.
    ///
    /// An empty cadence is sent as null, which switches monitoring off.
    fn configure_request(&self, table_id: i64, omit_empty_time_columns: bool) -> ConfigureTableRequest {
        let time_columns = if omit_empty_time_columns && self.time_columns.is_empty() {
            None
        } else {
            Some(self.time_columns.clone())
        };
        ConfigureTableRequest {
            table_id,
            check_cadence_type: Some(self.check_cadence_type.clone()).filter(|c| !c.is_empty()),
            check_cadence_run_at_duration: self.check_cadence_run_at_duration.clone(),
            notification_channel_id: self.notification_channel_id,
            definition: self.definition.clone(),
            always_alert_on_errors: self.always_alert_on_errors,
            time_column_type: self.time_column_type.clone(),
            notify_after: self.notify_after.clone(),
            fresh_after: self.fresh_after.clone(),
            interval_skip_expr: self.interval_skip_expr.clone(),
            time_columns,
        }
    }

    fn from_information(info: TableInformation, fallback: &Table) -> Self {
        let table_name = info.qualified_name();
        let config = info.config.unwrap_or_default();
        Self {
            table_name,
            table_id: info.id,
            check_cadence_type: config.check_cadence_type.unwrap_or_default(),
            check_cadence_run_at_duration: config.check_cadence_run_at_duration.unwrap_or_default(),
            notification_channel_id: config
                .notification_channel_id
                .unwrap_or(fallback.notification_channel_id),
            definition: config.definition.unwrap_or_default(),
            time_column_type: config.time_column_type.unwrap_or_default(),
            notify_after: config.notify_after.unwrap_or_default(),
            fresh_after: config.fresh_after.unwrap_or_default(),
            interval_skip_expr: config.interval_skip_expr.unwrap_or_default(),
            always_alert_on_errors: config.always_alert_on_errors.unwrap_or_default(),
            time_columns: config
                .time_columns
                .unwrap_or_default()
                .iter()
                .filter_map(value_to_text)
                .collect(),
        }
    }
}

/// Applies table configuration through the Anomalo API.
pub struct TableReconciler<'a, A: AnomaloApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: AnomaloApi + ?Sized> TableReconciler<'a, A> {
    /// Create a reconciler over an API handle.
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Configure monitoring on an existing table.
    #[instrument(skip(self, planned), fields(table_name = %planned.table_name))]
    pub async fn create(&self, planned: &Table) -> Result<Table, ProviderError> {
        let info = self.lookup(&planned.table_name).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "table {} is not known to Anomalo; tables must already exist in Anomalo \
                 before they can be configured",
                planned.table_name
            ))
        })?;

        let table_id = self
            .configure(&planned.configure_request(info.id, true), &planned.table_name)
            .await?;
        info!(table_id, "Configured table");

        Ok(Table {
            table_id,
            ..planned.clone()
        })
    }

    /// Refresh from Anomalo. `None` when the table no longer exists.
    #[instrument(skip(self, current), fields(table_name = %current.table_name))]
    pub async fn read(&self, current: &Table) -> Result<Option<Table>, ProviderError> {
        Ok(self
            .lookup(&current.table_name)
            .await?
            .map(|info| Table::from_information(info, current)))
    }

    /// Apply `planned` to the table tracked by `prior`.
    #[instrument(skip(self, prior, planned), fields(table_name = %planned.table_name))]
    pub async fn update(&self, prior: &Table, planned: &Table) -> Result<Table, ProviderError> {
        let table_id = self.table_id_for(prior).await?;
        let table_id = self
            .configure(&planned.configure_request(table_id, false), &planned.table_name)
            .await?;
        info!(table_id, "Reconfigured table");

        Ok(Table {
            table_id,
            ..planned.clone()
        })
    }

    /// Switch monitoring off. The table itself stays in Anomalo.
    #[instrument(skip(self, current), fields(table_name = %current.table_name))]
    pub async fn delete(&self, current: &Table) -> Result<(), ProviderError> {
        let table_id = self.table_id_for(current).await?;
        let request = ConfigureTableRequest {
            table_id,
            ..Default::default()
        };
        self.configure(&request, &current.table_name).await?;
        info!(table_id, "Turned off checks for table");
        Ok(())
    }

    /// Import by table name.
    #[instrument(skip(self))]
    pub async fn import(&self, table_name: &str) -> Result<Table, ProviderError> {
        let current = Table {
            table_name: table_name.to_string(),
            ..Default::default()
        };
        self.read(&current).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("table {} is not known to Anomalo", table_name))
        })
    }

    async fn table_id_for(&self, table: &Table) -> Result<i64, ProviderError> {
        if table.table_id > 0 {
            return Ok(table.table_id);
        }
        self.lookup(&table.table_name)
            .await?
            .map(|info| info.id)
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "could not resolve the id of table {}",
                    table.table_name
                ))
            })
    }

    async fn lookup(&self, table_name: &str) -> Result<Option<TableInformation>, ProviderError> {
        self.api
            .get_table_information(table_name)
            .await
            .map_err(|e| ProviderError::upstream(format!("fetching table {}", table_name), e))
    }

    async fn configure(
        &self,
        request: &ConfigureTableRequest,
        table_name: &str,
    ) -> Result<i64, ProviderError> {
        self.api
            .configure_table(request)
            .await
            .map_err(|e| ProviderError::upstream(format!("configuring table {}", table_name), e))
    }
}
