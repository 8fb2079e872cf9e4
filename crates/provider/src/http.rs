//! HTTP implementation of [`VmProvider`] for the CloudWM-style REST API.
//!
//! Authentication is a bearer token obtained from `POST /authenticate`
//! and cached until shortly before its expiry. VM creation is
//! asynchronous on the provider side: `POST /server` returns a queue
//! command id which is polled until completion.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::{ImageInfo, NetworkInfo, PowerAction, VmProvider, VmSpec};
use crate::error::ProviderError;
use crate::retry::{with_retry, RetryConfig};

/// Refresh the cached token this long before the provider-reported expiry.
const TOKEN_SLACK: chrono::Duration = chrono::Duration::seconds(60);

/// How often the VM-creation queue command is polled.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connection settings for one provider account.
#[derive(Debug, Clone)]
pub struct HttpVmProviderConfig {
    /// Base API URL, e.g. `https://console.example.com/service`.
    pub api_url: String,
    pub client_id: String,
    pub secret: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Upper bound on waiting for an async create command to complete.
    pub create_timeout: Duration,
    pub retry: RetryConfig,
}

impl HttpVmProviderConfig {
    pub fn new(api_url: impl Into<String>, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            client_id: client_id.into(),
            secret: secret.into(),
            request_timeout: Duration::from_secs(30),
            create_timeout: Duration::from_secs(300),
            retry: RetryConfig::default(),
        }
    }
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// [`VmProvider`] over the vendor REST API.
pub struct HttpVmProvider {
    config: HttpVmProviderConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    cancel: CancellationToken,
}

impl HttpVmProvider {
    /// Build a provider client. `cancel` aborts in-flight retry loops on
    /// shutdown.
    pub fn new(config: HttpVmProviderConfig, cancel: CancellationToken) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
            cancel,
        })
    }

    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.config.request_timeout)
        } else {
            ProviderError::Unavailable(e.to_string())
        }
    }

    fn status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            ProviderError::Auth(detail)
        } else if status.is_client_error() {
            ProviderError::Rejected(detail)
        } else {
            ProviderError::Unavailable(detail)
        }
    }

    /// Return a valid bearer token, authenticating if the cached one is
    /// missing or about to expire.
    async fn bearer_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if Utc::now() < t.expires_at - TOKEN_SLACK {
                return Ok(t.token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/authenticate", self.base_url()))
            .json(&json!({ "clientId": self.config.client_id, "secret": self.config.secret }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Unavailable(format!("Bad authenticate response: {e}")))?;
        let token = data["authentication"]
            .as_str()
            .ok_or_else(|| ProviderError::Auth("Authenticate response had no token".into()))?
            .to_string();
        let expires_at = data["expires"]
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Single authenticated GET returning the parsed JSON body.
    async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(format!("{}{path}", self.base_url()))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Unavailable(format!("Bad response body: {e}")))
    }

    /// Single authenticated POST returning the parsed JSON body.
    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, ProviderError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(format!("{}{path}", self.base_url()))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Unavailable(format!("Bad response body: {e}")))
    }

    /// Poll a queue command until it completes, fails, or the create
    /// timeout elapses. Returns the command's final payload.
    async fn wait_for_command(&self, command_id: i64) -> Result<Value, ProviderError> {
        let deadline = tokio::time::Instant::now() + self.config.create_timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Timeout(self.config.create_timeout));
            }

            match self.get_json(&format!("/queue/{command_id}")).await {
                Ok(data) => match data["status"].as_str().unwrap_or("") {
                    "complete" => return Ok(data),
                    "error" => {
                        return Err(ProviderError::Rejected(format!(
                            "Command {command_id} failed: {}",
                            data["log"].as_str().unwrap_or("")
                        )))
                    }
                    _ => {}
                },
                // A failed poll is not a failed command; keep polling.
                Err(e) if e.is_retryable() => {
                    tracing::warn!(command_id, error = %e, "Queue poll failed");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
            }
        }
    }
}

#[async_trait]
impl VmProvider for HttpVmProvider {
    async fn create_vm(&self, spec: &VmSpec) -> Result<String, ProviderError> {
        let payload = json!({
            "name": spec.name,
            "datacenter": spec.datacenter,
            "disk_src_0": spec.image_id,
            "disk_size_0": spec.disk_gb,
            "cpu": spec.cpu,
            "ram": spec.ram_mb,
            "network_name_0": spec.network_name,
            "password": spec.admin_password,
            "billing": "hourly",
        });

        let data = with_retry(&self.config.retry, &self.cancel, "create_vm", || {
            self.post_json("/server", &payload)
        })
        .await?;

        // The create endpoint answers with a list of queue command ids.
        let command_id = data
            .as_array()
            .and_then(|a| a.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ProviderError::Rejected("Create response had no command id".into())
            })?;

        tracing::info!(command_id, name = %spec.name, "VM creation started");

        let done = self.wait_for_command(command_id).await?;
        done["server_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::Rejected(format!(
                    "Command {command_id} completed without a server id"
                ))
            })
    }

    async fn delete_vm(&self, server_id: &str) -> Result<(), ProviderError> {
        with_retry(&self.config.retry, &self.cancel, "delete_vm", || async {
            let token = self.bearer_token().await?;
            let response = self
                .http
                .delete(format!("{}/server/{server_id}", self.base_url()))
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::status_error(status, &body));
            }
            Ok(())
        })
        .await
    }

    async fn power(&self, server_id: &str, action: PowerAction) -> Result<(), ProviderError> {
        let path = format!("/server/{server_id}/power");
        let payload = json!({ "power": action.wire_value() });

        with_retry(&self.config.retry, &self.cancel, "power", || {
            self.post_json(&path, &payload)
        })
        .await?;

        tracing::info!(server_id, action = action.wire_value(), "Power command accepted");
        Ok(())
    }

    async fn get_state(&self, server_id: &str) -> Result<String, ProviderError> {
        let path = format!("/server/{server_id}");
        let data = with_retry(&self.config.retry, &self.cancel, "get_state", || {
            self.get_json(&path)
        })
        .await?;

        Ok(data["power"].as_str().unwrap_or("").to_lowercase())
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>, ProviderError> {
        let data = with_retry(&self.config.retry, &self.cancel, "list_images", || {
            self.get_json("/server")
        })
        .await?;

        let images = data["diskImages"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|img| ImageInfo {
                        id: img["id"].as_str().unwrap_or("").to_string(),
                        description: img["description"].as_str().unwrap_or("").to_string(),
                        size_gb: img["sizeGB"].as_i64().unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(images)
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, ProviderError> {
        let data = with_retry(&self.config.retry, &self.cancel, "list_networks", || {
            self.get_json("/server")
        })
        .await?;

        let networks = data["networks"]
            .as_object()
            .map(|map| {
                map.iter()
                    // Public WAN segments are not placement targets.
                    .filter(|(name, _)| !name.starts_with("wan"))
                    .map(|(name, subnet)| NetworkInfo {
                        name: name.clone(),
                        subnet: subnet.as_str().unwrap_or("").to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(networks)
    }
}
