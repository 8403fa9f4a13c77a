//! Credential and call-history service port
//!
//! The session talks to the operator service through [`CredentialProvider`].
//! [`HttpCredentialProvider`] is the JSON-over-HTTP adapter; every response
//! carries a `success` flag and either a payload or an `error` string.

use crate::error::{DialerError, DialerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Operator record returned by `login`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub call_sid: Option<String>,
}

/// A freshly issued access credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialGrant {
    pub token: String,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
}

/// One row of recent call history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHistoryEntry {
    pub call_sid: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub direction: Option<String>,
    pub status: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub duration: u64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub price_unit: Option<String>,
}

/// Server-side view of an operator's availability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStatus {
    pub client_name: String,
    #[serde(default)]
    pub number: Option<String>,
    pub status: String,
    #[serde(default)]
    pub is_available: bool,
    #[serde(default)]
    pub is_busy: bool,
    #[serde(default)]
    pub current_call_sid: Option<String>,
}

/// Durations arrive as numbers or numeric strings
fn lenient_u64<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Operator service consumed by the session
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn login(&self, name: &str) -> DialerResult<OperatorRecord>;

    async fn get_credential(&self, name: &str) -> DialerResult<CredentialGrant>;

    async fn get_call_history(&self, name: &str, limit: usize) -> DialerResult<Vec<CallHistoryEntry>>;

    async fn logout(&self, name: &str) -> DialerResult<()>;

    async fn get_call_status(&self, name: &str) -> DialerResult<OperatorStatus>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    client: OperatorRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPayload {
    call_history: Vec<CallHistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: OperatorStatus,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// JSON adapter for the operator service
#[derive(Clone)]
pub struct HttpCredentialProvider {
    http: Client,
    base_url: String,
}

impl HttpCredentialProvider {
    pub fn new(base_url: impl Into<String>) -> DialerResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DialerError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: DeserializeOwned>(&self, operation: &str, path: &str, name: &str) -> DialerResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(operation, %url, "credential service request");
        let response = self
            .http
            .post(url)
            .json(&json!({ "clientName": name }))
            .send()
            .await?;
        Self::unwrap(operation, response).await
    }

    async fn get<T: DeserializeOwned>(&self, operation: &str, url: String) -> DialerResult<T> {
        debug!(operation, %url, "credential service request");
        let response = self.http.get(url).send().await?;
        Self::unwrap(operation, response).await
    }

    async fn unwrap<T: DeserializeOwned>(operation: &str, response: reqwest::Response) -> DialerResult<T> {
        let status = response.status();
        let body = response.text().await?;
        parse_envelope(operation, &body).map_err(|e| match e {
            DialerError::Provider { reason, .. } if !status.is_success() => {
                DialerError::provider(operation, format!("{} ({})", reason, status))
            }
            other => other,
        })
    }
}

fn parse_envelope<T: DeserializeOwned>(operation: &str, body: &str) -> DialerResult<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| DialerError::provider(operation, format!("malformed response: {}", e)))?;
    if !envelope.success {
        let reason = envelope.error.unwrap_or_else(|| "Request failed".to_string());
        return Err(DialerError::provider(operation, reason));
    }
    envelope
        .payload
        .ok_or_else(|| DialerError::provider(operation, "response missing payload"))
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn login(&self, name: &str) -> DialerResult<OperatorRecord> {
        let payload: LoginPayload = self.post("login", "/api/auth/login", name).await?;
        Ok(payload.client)
    }

    async fn get_credential(&self, name: &str) -> DialerResult<CredentialGrant> {
        self.post("token", "/api/auth/token", name).await
    }

    async fn get_call_history(&self, name: &str, limit: usize) -> DialerResult<Vec<CallHistoryEntry>> {
        let url = format!("{}/api/calls/history/{}?limit={}", self.base_url, name, limit);
        let payload: HistoryPayload = self.get("history", url).await?;
        Ok(payload.call_history)
    }

    async fn logout(&self, name: &str) -> DialerResult<()> {
        let _: Empty = self.post("logout", "/api/auth/logout", name).await?;
        Ok(())
    }

    async fn get_call_status(&self, name: &str) -> DialerResult<OperatorStatus> {
        let url = format!("{}/api/calls/status/{}", self.base_url, name);
        let payload: StatusPayload = self.get("status", url).await?;
        Ok(payload.status)
    }
}
