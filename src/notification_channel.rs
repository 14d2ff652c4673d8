//! The `anomalo_notification_channel` data source.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::api::{AnomaloApi, NotificationChannel};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// Data source type name.
pub const NOTIFICATION_CHANNEL_DATA_SOURCE: &str = "anomalo_notification_channel";

/// Channel types Anomalo supports.
pub const CHANNEL_TYPES: [&str; 5] = ["slack", "msteams", "pagerduty", "email", "email_all"];

/// Query and result of the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannelQuery {
    /// Kind of channel to match exactly.
    pub channel_type: String,
    /// Substring of the channel's description.
    pub name: String,
    /// Id of the matched channel.
    #[serde(default)]
    pub id: Option<i64>,
}

impl NotificationChannelQuery {
    /// Schema of the data source.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description(
                "A destination for alerts from failed checks, e.g. a Slack channel or an email address.",
            )
            .with_attribute(
                "channel_type",
                Attribute::required_string()
                    .with_allowed_values(CHANNEL_TYPES)
                    .with_description("Type of channel."),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description(
                    "Name of the channel, e.g. \"@oncall\". Matched as a substring of the \
                     description, so it must not be part of several channels of the same type.",
                ),
            )
            .with_attribute(
                "id",
                Attribute::computed_int64().with_description("Id assigned by Anomalo."),
            )
    }

    /// First channel of the requested type whose description contains the name.
    pub fn find<'c>(&self, channels: &'c [NotificationChannel]) -> Option<&'c NotificationChannel> {
        channels
            .iter()
            .find(|c| c.channel_type == self.channel_type && c.description.contains(&self.name))
    }
}

/// Resolve a notification channel query against the API.
#[instrument(skip(api, config))]
pub async fn read_notification_channel<A: AnomaloApi + ?Sized>(
    api: &A,
    config: Value,
) -> Result<Value, ProviderError> {
    let mut query: NotificationChannelQuery = serde_json::from_value(config)?;

    let channels = api.list_notification_channels().await.map_err(|e| {
        ProviderError::upstream(
            format!(
                "searching for {} notification channel {:?}",
                query.channel_type, query.name
            ),
            e,
        )
    })?;

    let channel = query.find(&channels).ok_or_else(|| {
        ProviderError::NotFound(format!(
            "no {} notification channel with a name containing {:?}",
            query.channel_type, query.name
        ))
    })?;
    debug!(id = channel.id, "Found notification channel");

    query.id = Some(channel.id);
    Ok(serde_json::to_value(query)?)
}
