/// Control-plane client for the customers API
///
/// The feed only needs two calls from it: read the distribution flag for a package
/// and ask the upstream to start distributing.

use crate::decoder::Decoder;
use crate::error::{ConfigError, ControlPlaneError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistributionStatus {
    pub is_on: bool,
    pub consumers: Vec<String>,
    pub messages_in_queue: Option<i64>,
    pub messages_per_second: Option<f64>,
}

#[async_trait]
pub trait DistributionApi: Send + Sync {
    async fn distribution_status(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DistributionStatus, ControlPlaneError>;

    async fn start_distribution(&self, cancel: &CancellationToken) -> Result<(), ControlPlaneError>;
}

/// Credentials the customers API expects in every request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCredentials {
    pub package_id: i64,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PackageRequest<'a> {
    package_id: i64,
    user_name: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    header: Option<ApiHeader>,
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiHeader {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    is_distribution_on: bool,
    #[serde(default)]
    consumers: Vec<String>,
    number_messages_in_queue: Option<i64>,
    messages_per_second: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StartBody {
    message: Option<String>,
}

pub struct HttpDistributionApi {
    client: reqwest::Client,
    base_url: String,
    credentials: PackageCredentials,
}

impl HttpDistributionApi {
    pub fn new(base_url: &str, credentials: PackageCredentials) -> Result<Self, ConfigError> {
        reqwest::Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl {
            field: "CustomersApi.BaseUrl",
            value: base_url.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn request_body(&self) -> PackageRequest<'_> {
        PackageRequest {
            package_id: self.credentials.package_id,
            user_name: &self.credentials.username,
            password: &self.credentials.password,
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T, ControlPlaneError> {
        let url = format!("{}/{}", self.base_url, path);
        let request = self.client.post(&url).json(&self.request_body()).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlPlaneError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ControlPlaneError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlPlaneError::Cancelled),
            bytes = response.bytes() => bytes?,
        };
        parse_response(&bytes)
    }
}

fn parse_response<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ControlPlaneError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ControlPlaneError::Rejected(e.to_string()))?;
    let response: ApiResponse<T> =
        Decoder::decode_value(value).map_err(|e| ControlPlaneError::Rejected(e.to_string()))?;

    if let Some(header) = &response.header {
        if !header.errors.is_empty() {
            let messages: Vec<String> = header
                .errors
                .iter()
                .filter_map(|e| e.message.clone())
                .collect();
            return Err(ControlPlaneError::Rejected(messages.join("; ")));
        }
    }

    response
        .body
        .ok_or_else(|| ControlPlaneError::Rejected("response carried no body".to_string()))
}

#[async_trait]
impl DistributionApi for HttpDistributionApi {
    async fn distribution_status(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DistributionStatus, ControlPlaneError> {
        let body: StatusBody = self.post("Distribution/Get", cancel).await?;
        Ok(DistributionStatus {
            is_on: body.is_distribution_on,
            consumers: body.consumers,
            messages_in_queue: body.number_messages_in_queue,
            messages_per_second: body.messages_per_second,
        })
    }

    async fn start_distribution(&self, cancel: &CancellationToken) -> Result<(), ControlPlaneError> {
        let body: StartBody = self.post("Distribution/Start", cancel).await?;
        tracing::debug!(
            package_id = self.credentials.package_id,
            reply = body.message.as_deref().unwrap_or_default(),
            "start distribution acknowledged"
        );
        Ok(())
    }
}
