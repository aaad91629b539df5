use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::error::{AppError, AppResult};

// ============================================================================
// Control-API Client
// ============================================================================

pub const DEFAULT_CONTROL_API: &str = "http://127.0.0.1:9090";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_DELAY_TEST_URL: &str = "http://www.gstatic.com/generate_204";
const DEFAULT_DELAY_TEST_TIMEOUT_MS: u32 = 5000;

/// Thin forwarding client for the engine's local REST endpoint. One call
/// per operation; no retries, no caching.
#[derive(Debug, Clone)]
pub struct ControlApi {
    base_url: String,
}

impl ControlApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn client(&self, timeout: Duration) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn encode_segment(segment: &str) -> String {
        utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
    }

    async fn get_json(&self, path: &str) -> AppResult<Value> {
        let response = self
            .client(REQUEST_TIMEOUT)?
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))
    }

    pub async fn get_proxies(&self) -> AppResult<Value> {
        self.get_json("/proxies").await
    }

    pub async fn get_configs(&self) -> AppResult<Value> {
        self.get_json("/configs").await
    }

    pub async fn get_traffic(&self) -> AppResult<Value> {
        self.get_json("/traffic").await
    }

    pub async fn get_logs(&self) -> AppResult<Value> {
        self.get_json("/logs").await
    }

    pub async fn switch_proxy(&self, group: &str, name: &str) -> AppResult<()> {
        let response = self
            .client(REQUEST_TIMEOUT)?
            .put(self.endpoint(&format!("/proxies/{}", Self::encode_segment(group))))
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))?;
        Self::require_success(&response)
    }

    pub async fn patch_configs(&self, patch: &Value) -> AppResult<()> {
        let response = self
            .client(REQUEST_TIMEOUT)?
            .patch(self.endpoint("/configs"))
            .json(patch)
            .send()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))?;
        Self::require_success(&response)
    }

    pub async fn toggle_tun(&self, enabled: bool) -> AppResult<()> {
        self.patch_configs(&tun_patch(enabled)).await
    }

    /// Delay test for a single proxy; mihomo performs the measurement.
    pub async fn proxy_delay(
        &self,
        name: &str,
        test_url: Option<&str>,
        timeout_ms: Option<u32>,
    ) -> AppResult<Value> {
        let response = self
            .client(REQUEST_TIMEOUT)?
            .get(self.endpoint(&format!("/proxies/{}/delay", Self::encode_segment(name))))
            .query(&[
                (
                    "timeout",
                    timeout_ms.unwrap_or(DEFAULT_DELAY_TEST_TIMEOUT_MS).to_string(),
                ),
                (
                    "url",
                    test_url.unwrap_or(DEFAULT_DELAY_TEST_URL).to_string(),
                ),
            ])
            .send()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))?;
        Self::require_success(&response)?;
        response
            .json()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))
    }

    /// Delay test for a whole group; updates the engine's internal history.
    pub async fn group_delay(&self, group: &str) -> AppResult<()> {
        let response = self
            .client(REQUEST_TIMEOUT)?
            .get(self.endpoint(&format!("/group/{}/delay", Self::encode_segment(group))))
            .query(&[
                ("timeout", DEFAULT_DELAY_TEST_TIMEOUT_MS.to_string()),
                ("url", DEFAULT_DELAY_TEST_URL.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ControlApiUnreachable(e.to_string()))?;
        Self::require_success(&response)
    }

    /// Short-timeout reachability probe used by the status endpoint. An
    /// unreachable control API is not an error here, just `None`.
    pub async fn probe(&self) -> Option<Value> {
        let client = self.client(PROBE_TIMEOUT).ok()?;
        let response = client.get(self.endpoint("/configs")).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    fn require_success(response: &reqwest::Response) -> AppResult<()> {
        if !response.status().is_success() {
            return Err(AppError::ControlApiUnreachable(format!(
                "Mihomo API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub fn tun_patch(enabled: bool) -> Value {
    json!({ "tun": { "enable": enabled } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_names_are_percent_encoded() {
        assert_eq!(ControlApi::encode_segment("My Group"), "My%20Group");
        assert_eq!(ControlApi::encode_segment("节点"), "%E8%8A%82%E7%82%B9");
    }

    #[test]
    fn endpoints_are_rooted_at_the_base_url() {
        let api = ControlApi::new(DEFAULT_CONTROL_API);
        assert_eq!(api.endpoint("/proxies"), "http://127.0.0.1:9090/proxies");
    }

    #[test]
    fn tun_patch_shape() {
        assert_eq!(tun_patch(true), json!({"tun": {"enable": true}}));
        assert_eq!(tun_patch(false), json!({"tun": {"enable": false}}));
    }

    #[tokio::test]
    async fn probe_is_none_when_nothing_listens() {
        // Port 9 on localhost refuses connections immediately.
        let api = ControlApi::new("http://127.0.0.1:9");
        assert!(api.probe().await.is_none());
    }

    #[tokio::test]
    async fn requests_fail_as_unreachable_when_engine_is_down() {
        let api = ControlApi::new("http://127.0.0.1:9");
        let err = api.get_proxies().await.unwrap_err();
        assert!(matches!(err, AppError::ControlApiUnreachable(_)));
    }
}
