//! HTTP collaborators
//!
//! Thin client over the platform's REST surface. The channel carries the
//! real-time flow; this covers the handful of request/response calls the
//! session needs: status resync, trader info, market admission.
//!
//! Responses come in two shapes depending on the endpoint's age: wrapped
//! `{"status": "success", "data": {...}}` or the payload flat at the top
//! level. `unwrap_envelope` normalizes both.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::session::SessionStatus;

/// Request timeout for all calls
const HTTP_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Response payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusResponse {
    pub status: SessionStatus,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraderInfo {
    pub trader_id: String,
    #[serde(default)]
    pub goal: Option<i64>,
    #[serde(default)]
    pub goal_progress: Option<i64>,
    #[serde(default)]
    pub shares: Option<f64>,
    #[serde(default)]
    pub cash: Option<f64>,
    /// Server-side timestamp of the snapshot, ms since epoch
    #[serde(default)]
    pub as_of_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketAdmission {
    #[serde(default)]
    pub market_id: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Authoritative session status, used by the navigation guard's
    /// one-shot resync.
    pub async fn session_status(&self, participant_id: &str) -> Result<SessionStatusResponse> {
        let url = format!("{}/session/{}/status", self.base_url, participant_id);
        self.get_json(&url).await
    }

    pub async fn trader_info(&self, participant_id: &str) -> Result<TraderInfo> {
        let url = format!("{}/trader/{}", self.base_url, participant_id);
        self.get_json(&url).await
    }

    /// Ask to join the next market. Capacity refusals surface as
    /// `AppError::Api` with the server's message.
    pub async fn start_market(&self, participant_id: &str) -> Result<MarketAdmission> {
        let url = format!("{}/market/start", self.base_url);
        let body = serde_json::json!({ "trader_id": participant_id });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Api(format!("start_market request failed: {}", e)))?;
        Self::parse_response(response).await
    }

    pub async fn reset_for_new_market(&self, participant_id: &str) -> Result<()> {
        let url = format!("{}/trader/{}/reset", self.base_url, participant_id);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| AppError::Api(format!("reset request failed: {}", e)))?;
        let _: Value = Self::parse_response(response).await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Api(format!("request to {} failed: {}", url, e)))?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Api(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Prefer the server's human-readable message when present
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .or_else(|| v.get("detail"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(text);
            return Err(AppError::Api(format!("{}: {}", status, message)));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::Api(format!("invalid JSON response: {} - {}", e, text)))?;
        let payload = unwrap_envelope(value);
        serde_json::from_value(payload).map_err(AppError::from)
    }
}

/// Peel the `{status, data}` envelope when present, otherwise pass the
/// value through untouched.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(ref obj) if obj.contains_key("status") && obj.contains_key("data") => {
            obj.get("data").cloned().unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_status_wrapped_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/session/p-1/status")
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"status":"waiting","is_admin":false}}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let status = client.session_status("p-1").await.unwrap();
        assert_eq!(status.status, SessionStatus::Waiting);
        assert!(!status.is_admin);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_trader_info_flat_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/trader/p-1")
            .with_status(200)
            .with_body(r#"{"trader_id":"p-1","goal":5,"cash":1000.0,"as_of_ms":123}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let info = client.trader_info("p-1").await.unwrap();
        assert_eq!(info.trader_id, "p-1");
        assert_eq!(info.goal, Some(5));
        assert_eq!(info.as_of_ms, Some(123));
    }

    #[tokio::test]
    async fn test_capacity_error_surfaces_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/market/start")
            .with_status(409)
            .with_body(r#"{"message":"market is full"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let err = client.start_market("p-1").await.unwrap_err();
        match err {
            AppError::Api(msg) => assert!(msg.contains("market is full"), "msg: {}", msg),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_passes_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/session/p-1/status")
            .with_status(503)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let err = client.session_status("p-1").await.unwrap_err();
        match err {
            AppError::Api(msg) => assert!(msg.contains("upstream down")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_unwrap_envelope_only_peels_wrapped() {
        let wrapped: Value =
            serde_json::from_str(r#"{"status":"success","data":{"x":1}}"#).unwrap();
        assert_eq!(unwrap_envelope(wrapped), serde_json::json!({"x": 1}));

        let flat: Value = serde_json::from_str(r#"{"trader_id":"t"}"#).unwrap();
        assert_eq!(unwrap_envelope(flat.clone()), flat);
    }
}
