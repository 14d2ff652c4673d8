//! HTTP client for the Anomalo public API.
//!
//! Requests are authenticated with the `X-Anomalo-Token` header and go to
//! `<host>/api/public/v1/<endpoint>`. Non-2xx responses become
//! [`ProviderError::Api`] carrying the status and response body. There are
//! no retries here; the host retries whole plan/apply cycles.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::api::{
    AnomaloApi, CheckApi, CheckRecord, ConfigureTableRequest, CreateCheckRequest, CreatedCheck,
    NotificationChannel, Organization, TableInformation,
};
use crate::config::ClientSettings;
use crate::error::ProviderError;
use crate::params::{deserialize_normalized, Params};

const API_PREFIX: &str = "/api/public/v1";
const TOKEN_HEADER: &str = "x-anomalo-token";

/// Anomalo REST client.
#[derive(Clone)]
pub struct AnomaloClient {
    http: Client,
    base_url: String,
}

// -- Anomalo REST API payloads --

#[derive(Deserialize)]
struct PingResponse {
    ping: String,
}

#[derive(Deserialize)]
struct ChecksForTableResponse {
    #[serde(default)]
    checks: Vec<CheckPayload>,
}

#[derive(Deserialize)]
struct CheckPayload {
    check_id: i64,
    check_static_id: i64,
    #[serde(default, alias = "ref")]
    reference: Option<String>,
    config: CheckConfigPayload,
}

#[derive(Deserialize)]
struct CheckConfigPayload {
    check: String,
    #[serde(default, deserialize_with = "deserialize_normalized")]
    params: Params,
}

impl From<CheckPayload> for CheckRecord {
    fn from(payload: CheckPayload) -> Self {
        Self {
            check_id: payload.check_id,
            check_static_id: payload.check_static_id,
            check_type: payload.config.check,
            reference: payload.reference.filter(|r| !r.is_empty()),
            params: payload.config.params,
        }
    }
}

#[derive(Deserialize)]
struct CreateCheckResponse {
    check_id: i64,
    #[serde(default)]
    check_static_id: Option<i64>,
    #[serde(default, alias = "ref")]
    reference: Option<String>,
}

#[derive(Serialize)]
struct DeleteCheckRequest {
    table_id: i64,
    check_id: i64,
}

#[derive(Deserialize)]
struct ConfigureTableResponse {
    id: i64,
}

#[derive(Deserialize)]
struct NotificationChannelsResponse {
    #[serde(default)]
    notification_channels: Vec<NotificationChannel>,
}

#[derive(Serialize)]
struct ChangeOrganizationRequest {
    id: i64,
}

#[derive(Deserialize)]
struct ChangeOrganizationResponse {
    id: i64,
}

impl AnomaloClient {
    /// Build a client from resolved settings.
    pub fn new(settings: &ClientSettings) -> Result<Self, ProviderError> {
        let mut token = HeaderValue::from_str(&settings.token).map_err(|_| {
            ProviderError::Configuration("token contains characters not allowed in a header".into())
        })?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.host.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}/{}", self.base_url, API_PREFIX, endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http.request(method, self.endpoint_url(endpoint))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "Anomalo API response");
        let body = response.text().await?;
        decode_response(endpoint, status, &body)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        self.send(endpoint, self.request(Method::GET, endpoint).query(query))
            .await
    }

    async fn write<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        self.send(endpoint, self.request(method, endpoint).json(body))
            .await
    }

    async fn checks_for_table(&self, table_id: i64) -> Result<Vec<CheckRecord>, ProviderError> {
        let response: ChecksForTableResponse = self
            .get("get_checks_for_table", &[("table_id", table_id.to_string())])
            .await?;
        Ok(response.checks.into_iter().map(CheckRecord::from).collect())
    }
}

#[async_trait]
impl CheckApi for AnomaloClient {
    #[instrument(skip(self, request), fields(table_id = request.table_id, check_type = %request.check_type))]
    async fn create_check(
        &self,
        request: &CreateCheckRequest,
    ) -> Result<CreatedCheck, ProviderError> {
        let response: CreateCheckResponse =
            self.write(Method::POST, "create_check", request).await?;
        Ok(CreatedCheck {
            check_id: response.check_id,
            // check_static_id matches check_id on a fresh check
            check_static_id: response.check_static_id.unwrap_or(response.check_id),
            reference: response.reference.filter(|r| !r.is_empty()),
        })
    }

    #[instrument(skip(self))]
    async fn get_check_by_static_id(
        &self,
        table_id: i64,
        check_static_id: i64,
    ) -> Result<Option<CheckRecord>, ProviderError> {
        Ok(self
            .checks_for_table(table_id)
            .await?
            .into_iter()
            .find(|c| c.check_static_id == check_static_id))
    }

    #[instrument(skip(self))]
    async fn get_check_by_reference(
        &self,
        table_id: i64,
        reference: &str,
    ) -> Result<Option<CheckRecord>, ProviderError> {
        Ok(self
            .checks_for_table(table_id)
            .await?
            .into_iter()
            .find(|c| c.reference.as_deref() == Some(reference)))
    }

    #[instrument(skip(self))]
    async fn delete_check(&self, table_id: i64, check_id: i64) -> Result<(), ProviderError> {
        let _: serde_json::Value = self
            .write(
                Method::POST,
                "delete_check",
                &DeleteCheckRequest { table_id, check_id },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AnomaloApi for AnomaloClient {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), ProviderError> {
        let response: PingResponse = self.get("ping", &[]).await?;
        if response.ping == "pong" {
            Ok(())
        } else {
            Err(ProviderError::Api(format!(
                "expected \"pong\" from ping, got {:?}",
                response.ping
            )))
        }
    }

    #[instrument(skip(self))]
    async fn get_table_information(
        &self,
        table_name: &str,
    ) -> Result<Option<TableInformation>, ProviderError> {
        let response: serde_json::Value = self
            .get(
                "get_table_information",
                &[("table_name", table_name.to_string())],
            )
            .await?;
        table_information(response)
    }

    #[instrument(skip(self, request), fields(table_id = request.table_id))]
    async fn configure_table(
        &self,
        request: &ConfigureTableRequest,
    ) -> Result<i64, ProviderError> {
        let response: ConfigureTableResponse =
            self.write(Method::POST, "configure_table", request).await?;
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn list_notification_channels(
        &self,
    ) -> Result<Vec<NotificationChannel>, ProviderError> {
        let response: NotificationChannelsResponse =
            self.get("list_notification_channels", &[]).await?;
        Ok(response.notification_channels)
    }

    #[instrument(skip(self))]
    async fn get_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Organization>, ProviderError> {
        let organizations: Vec<Organization> = self.get("organizations", &[]).await?;
        Ok(organizations.into_iter().find(|org| org.name == name))
    }

    #[instrument(skip(self))]
    async fn change_organization(&self, organization_id: i64) -> Result<i64, ProviderError> {
        let response: ChangeOrganizationResponse = self
            .write(
                Method::PUT,
                "organization",
                &ChangeOrganizationRequest {
                    id: organization_id,
                },
            )
            .await?;
        Ok(response.id)
    }
}

/// Decode a response body, turning non-2xx statuses into
/// [`ProviderError::Api`].
fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, ProviderError> {
    if !status.is_success() {
        return Err(ProviderError::Api(format!(
            "HTTP {} from {}: {}",
            status.as_u16(),
            endpoint,
            body.trim()
        )));
    }
    Ok(serde_json::from_str(body)?)
}

// Unknown tables come back as an object without an id.
fn table_information(
    response: serde_json::Value,
) -> Result<Option<TableInformation>, ProviderError> {
    if response.get("id").map_or(true, serde_json::Value::is_null) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(response)?))
}
