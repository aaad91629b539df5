use std::time::Duration;

use base64::Engine;
use reqwest::header;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

// ============================================================================
// Fetcher / Parser
// ============================================================================

pub const DEFAULT_USER_AGENT: &str = "clash";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSubscription {
    #[schema(value_type = Vec<Object>)]
    pub proxies: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub proxy_groups: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub rules: Vec<Value>,
    #[schema(value_type = Object)]
    pub raw_config: Value,
}

/// Fetch a subscription URL and extract its proxy lists.
///
/// Decoding is an ordered fallback: JSON (when the response says so), raw
/// YAML, then base64-wrapped YAML. Transport failures and non-2xx statuses
/// are fatal for the call.
pub async fn parse_subscription(url: &str, user_agent: Option<&str>) -> AppResult<ParsedSubscription> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| AppError::Fetch(e.to_string()))?;

    let response = client
        .get(url)
        .header(
            header::USER_AGENT,
            user_agent.unwrap_or(DEFAULT_USER_AGENT),
        )
        .send()
        .await
        .map_err(|e| AppError::Fetch(e.to_string()))?
        .error_for_status()
        .map_err(|e| AppError::Fetch(e.to_string()))?;

    let json_content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    let body = response
        .text()
        .await
        .map_err(|e| AppError::Fetch(e.to_string()))?;

    let config = decode_subscription(&body, json_content_type)?;
    Ok(extract(config))
}

/// Decode a subscription body into a configuration document.
///
/// The YAML steps only succeed on a mapping: a base64 blob happily parses
/// as a YAML plain scalar, which must fall through to the base64 branch.
pub fn decode_subscription(body: &str, json_content_type: bool) -> AppResult<Value> {
    if json_content_type {
        if let Ok(config) = serde_json::from_str::<Value>(body) {
            return Ok(config);
        }
    }

    if let Ok(config) = serde_yaml::from_str::<Value>(body) {
        if config.is_object() {
            return Ok(config);
        }
    }

    if let Ok(decoded) = base64_decode(body) {
        if let Ok(text) = String::from_utf8(decoded) {
            if let Ok(config) = serde_yaml::from_str::<Value>(&text) {
                if config.is_object() {
                    return Ok(config);
                }
            }
        }
    }

    Err(AppError::UnparsableSubscription)
}

/// Pass-through extraction: absent keys become empty lists, entries are not
/// validated individually.
fn extract(config: Value) -> ParsedSubscription {
    let array_of = |key: &str| -> Vec<Value> {
        config
            .get(key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    };

    ParsedSubscription {
        proxies: array_of("proxies"),
        proxy_groups: array_of("proxy-groups"),
        rules: array_of("rules"),
        raw_config: config,
    }
}

/// Handle URL-safe base64 as well; subscription payloads are frequently
/// line-wrapped, so whitespace is stripped before decoding.
fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let input: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if input.contains('_') || input.contains('-') {
        base64::engine::general_purpose::URL_SAFE.decode(&input)
    } else {
        base64::engine::general_purpose::STANDARD.decode(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CLASH_YAML: &str = "proxies:\n  - name: p1\n    type: ss\nproxy-groups:\n  - name: PROXY\n    type: select\n    proxies: [p1]\nrules:\n  - MATCH,PROXY\n";

    #[test]
    fn decodes_json_body_with_json_content_type() {
        let body = r#"{"proxies":[{"name":"p1"}],"proxy-groups":[],"rules":[]}"#;
        let config = decode_subscription(body, true).unwrap();
        let parsed = extract(config);
        assert_eq!(parsed.proxies.len(), 1);
        assert_eq!(parsed.proxies[0]["name"], json!("p1"));
    }

    #[test]
    fn decodes_raw_yaml_body() {
        let config = decode_subscription(CLASH_YAML, false).unwrap();
        let parsed = extract(config);
        assert_eq!(parsed.proxies.len(), 1);
        assert_eq!(parsed.proxy_groups.len(), 1);
        assert_eq!(parsed.rules.len(), 1);
    }

    #[test]
    fn falls_back_to_base64_wrapped_yaml() {
        let body = base64::engine::general_purpose::STANDARD.encode(CLASH_YAML);
        // Sanity: the encoded form is not a JSON document and YAML sees a
        // plain scalar, not a mapping.
        assert!(serde_json::from_str::<Value>(&body).is_err());
        assert!(!serde_yaml::from_str::<Value>(&body).unwrap().is_object());

        let config = decode_subscription(&body, false).unwrap();
        let parsed = extract(config);
        assert_eq!(parsed.proxies.len(), 1);
    }

    #[test]
    fn decodes_line_wrapped_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(CLASH_YAML);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let config = decode_subscription(&wrapped, false).unwrap();
        assert!(config.get("proxies").is_some());
    }

    #[test]
    fn url_safe_base64_is_accepted() {
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(CLASH_YAML);
        if encoded.contains('-') || encoded.contains('_') {
            let config = decode_subscription(&encoded, false).unwrap();
            assert!(config.is_object());
        }
        // The helper itself must pick the URL-safe alphabet.
        let decoded = base64_decode("fn8-_w==").unwrap();
        assert_eq!(decoded, vec![0x7e, 0x7f, 0x3e, 0xff]);
    }

    #[test]
    fn rejects_undecodable_body() {
        let err = decode_subscription("%%% not a config %%%", false).unwrap_err();
        assert!(matches!(err, AppError::UnparsableSubscription));
    }

    #[test]
    fn missing_keys_extract_as_empty_lists() {
        let config = decode_subscription("port: 7890\nmode: rule\n", false).unwrap();
        let parsed = extract(config);
        assert!(parsed.proxies.is_empty());
        assert!(parsed.proxy_groups.is_empty());
        assert!(parsed.rules.is_empty());
        assert_eq!(parsed.raw_config["port"], json!(7890));
    }
}
