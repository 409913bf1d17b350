//! Azure Resource Manager REST client
//!
//! Direct ARM API implementation of [`ResourceClient`] with bearer token
//! authentication and long-running-operation polling.

use crate::client::{ClientFactory, Operation, PollKind, ResourceClient};
use crate::credentials::Credentials;
use crate::error::{AzureError, Result};
use crate::resources::ResourceId;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// Configuration for the ARM client
#[derive(Debug, Clone)]
pub struct ArmConfig {
    pub endpoint: String,
    pub authority_host: String,
    /// Delay between long-running-operation polls
    pub poll_interval: Duration,
    /// Upper bound for waiting on one long-running operation
    pub operation_timeout: Duration,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            poll_interval: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ArmConfig {
    /// Create ArmConfig from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("AZURE_RESOURCE_MANAGER_ENDPOINT") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Ok(host) = std::env::var("AZURE_AUTHORITY_HOST") {
            config.authority_host = host.trim_end_matches('/').to_string();
        }
        if let Some(secs) = secs_from_env("AZURE_POLL_INTERVAL_SECS")? {
            config.poll_interval = secs;
        }
        if let Some(secs) = secs_from_env("AZURE_OPERATION_TIMEOUT_SECS")? {
            config.operation_timeout = secs;
        }

        Ok(config)
    }
}

fn secs_from_env(var: &str) -> Result<Option<Duration>> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| AzureError::InvalidConfig(format!("{} must be seconds, got {:?}", var, value))),
        Err(_) => Ok(None),
    }
}

/// Source of ARM bearer tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A fixed token
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// OAuth2 client-credentials grant for a service principal
pub struct ClientSecretToken {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl ClientSecretToken {
    pub fn new(http: reqwest::Client, config: &ArmConfig, credentials: &Credentials) -> Self {
        Self {
            http,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                config.authority_host, credentials.tenant_id
            ),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            scope: format!("{}/.default", config.endpoint),
            cached: Mutex::new(None),
        }
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", &self.scope)
            .finish();

        let response = self
            .http
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AzureError::Api {
                status: status.as_u16(),
                code: "TokenRequestFailed".to_string(),
                message: token_error_message(&body),
            });
        }

        Ok(response.json().await?)
    }
}

fn token_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct TokenError {
        error: String,
        #[serde(default)]
        error_description: String,
    }

    match serde_json::from_str::<TokenError>(body) {
        Ok(e) if e.error_description.is_empty() => e.error,
        Ok(e) => format!("{}: {}", e.error, e.error_description),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl TokenSource for ClientSecretToken {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("Requesting ARM access token");
        let response = self.request_token().await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }
}

/// ARM error envelope
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Body of an `Azure-AsyncOperation` status URL
#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorBody>,
}

/// Azure Resource Manager client
pub struct ArmClient {
    http: reqwest::Client,
    config: ArmConfig,
    token: Arc<dyn TokenSource>,
}

impl ArmClient {
    pub fn new(http: reqwest::Client, config: ArmConfig, token: Arc<dyn TokenSource>) -> Self {
        Self { http, config, token }
    }

    fn resource_url(&self, id: &ResourceId) -> String {
        format!(
            "{}{}?api-version={}",
            self.config.endpoint,
            id.path(),
            id.api_version()
        )
    }

    async fn send(&self, method: Method, id: &ResourceId, body: Option<Value>) -> Result<Response> {
        let url = self.resource_url(id);
        let token = self.token.token().await?;

        tracing::debug!("{} {}", method, id);
        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        check_status(response, &id.path()).await
    }

    async fn poll(&self, poll_url: &str, kind: PollKind) -> Result<()> {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let token = self.token.token().await?;
            let response = self.http.get(poll_url).bearer_auth(token).send().await?;
            let response = check_status(response, poll_url).await?;

            match kind {
                PollKind::AsyncOperation => {
                    let status: OperationStatus = response.json().await?;
                    match status.status.as_str() {
                        "Succeeded" => return Ok(()),
                        "Failed" | "Canceled" => {
                            return Err(AzureError::OperationFailed {
                                status: status.status.clone(),
                                message: status
                                    .error
                                    .map(|e| format!("{}: {}", e.code, e.message))
                                    .unwrap_or_default(),
                            });
                        }
                        other => tracing::debug!("Operation still {}: {}", other, poll_url),
                    }
                }
                PollKind::Location => {
                    if response.status() != StatusCode::ACCEPTED {
                        return Ok(());
                    }
                    tracing::debug!("Operation still running: {}", poll_url);
                }
            }
        }
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (status.to_string(), body),
    };

    if status == StatusCode::NOT_FOUND {
        return Err(AzureError::NotFound(format!("{} ({}: {})", what, code, message)));
    }

    Err(AzureError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn operation_from_headers(headers: &HeaderMap) -> Operation {
    let header = |name: &'static str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(poll_url) = header(ASYNC_OPERATION_HEADER) {
        return Operation::Pending {
            poll_url,
            kind: PollKind::AsyncOperation,
        };
    }
    if let Some(poll_url) = header(LOCATION_HEADER) {
        return Operation::Pending {
            poll_url,
            kind: PollKind::Location,
        };
    }
    Operation::Completed
}

#[async_trait]
impl ResourceClient for ArmClient {
    async fn get(&self, id: &ResourceId) -> Result<Value> {
        let response = self.send(Method::GET, id, None).await?;
        Ok(response.json().await?)
    }

    async fn create_or_update(&self, id: &ResourceId, body: Value) -> Result<Operation> {
        let response = self.send(Method::PUT, id, Some(body)).await?;
        Ok(operation_from_headers(response.headers()))
    }

    async fn delete(&self, id: &ResourceId) -> Result<Operation> {
        let response = self.send(Method::DELETE, id, None).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Operation::Completed);
        }
        Ok(operation_from_headers(response.headers()))
    }

    async fn wait(&self, operation: Operation) -> Result<()> {
        let Operation::Pending { poll_url, kind } = operation else {
            return Ok(());
        };

        tokio::time::timeout(self.config.operation_timeout, self.poll(&poll_url, kind))
            .await
            .map_err(|_| {
                AzureError::Timeout(format!(
                    "operation {} did not finish within {:?}",
                    poll_url, self.config.operation_timeout
                ))
            })?
    }
}

/// Builds [`ArmClient`]s authenticated as the given service principal
pub struct ArmClientFactory {
    http: reqwest::Client,
    config: ArmConfig,
}

impl ArmClientFactory {
    pub fn new(config: ArmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ArmConfig::from_env()?)
    }
}

impl ClientFactory for ArmClientFactory {
    fn client(&self, credentials: &Credentials) -> Result<Arc<dyn ResourceClient>> {
        let token = ClientSecretToken::new(self.http.clone(), &self.config, credentials);
        Ok(Arc::new(ArmClient::new(
            self.http.clone(),
            self.config.clone(),
            Arc::new(token),
        )))
    }
}
