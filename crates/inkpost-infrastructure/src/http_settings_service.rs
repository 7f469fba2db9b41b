//! HTTP origin service.
//!
//! Talks to the content backend:
//!
//! - `GET  {base}/api/settings` returns the canonical settings
//! - `PUT  {base}/api/settings` applies a partial update and returns the result
//! - `GET  {base}/health` reports backend and model-server health
//!
//! Transport failures and 5xx responses are retried with exponential backoff
//! (1s, 2s, 4s, ...) up to `max_retries` times. 4xx responses are returned
//! immediately.

use async_trait::async_trait;
use inkpost_core::config::OriginConfig;
use inkpost_core::error::{InkpostError, Result};
use inkpost_core::settings::{ConnectionProbe, Settings, SettingsPatch, SettingsService};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const SETTINGS_PATH: &str = "/api/settings";
const HEALTH_PATH: &str = "/health";

/// Body of the backend health endpoint.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    components: HashMap<String, String>,
    #[serde(default)]
    lm_studio_models: Vec<String>,
    #[serde(default)]
    lm_studio_error: Option<String>,
}

impl HealthResponse {
    fn into_probe(self) -> Result<ConnectionProbe> {
        let model_server = self.components.get("lm_studio").map(String::as_str);
        match model_server {
            Some("ok") | None if self.status != "error" => Ok(ConnectionProbe {
                models: self.lm_studio_models,
            }),
            _ => Err(InkpostError::origin(
                None,
                self.lm_studio_error
                    .unwrap_or_else(|| format!("backend reported status '{}'", self.status)),
            )),
        }
    }
}

pub struct HttpSettingsService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl HttpSettingsService {
    pub fn new(config: &OriginConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InkpostError::config(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(
            "[HttpSettingsService] Origin service at {} (timeout {}s, retries {})",
            config.base_url,
            config.timeout_secs,
            config.max_retries
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = self.url(path);
        let mut attempt = 0u32;

        loop {
            tracing::debug!(
                "[HttpSettingsService] {} {} attempt {}/{}",
                method,
                url,
                attempt + 1,
                self.max_retries + 1
            );

            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header("Accept", "application/json");
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let last_error = match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            InkpostError::origin(
                                Some(status.as_u16()),
                                format!("Failed to parse response: {}", e),
                            )
                        });
                    }
                    let text = response.text().await.unwrap_or_default();
                    let err = InkpostError::origin(Some(status.as_u16()), error_message(&text));
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => InkpostError::from(e),
            };

            if attempt >= self.max_retries {
                tracing::error!(
                    "[HttpSettingsService] Request failed after {} attempts: {}",
                    attempt + 1,
                    last_error
                );
                return Err(last_error);
            }

            let backoff = backoff_delay(attempt);
            tracing::warn!(
                "[HttpSettingsService] {}. Retrying in {} seconds...",
                last_error,
                backoff.as_secs()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl SettingsService for HttpSettingsService {
    async fn get_settings(&self) -> Result<Settings> {
        self.request(Method::GET, SETTINGS_PATH, None).await
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let body = serde_json::to_value(patch)?;
        self.request(Method::PUT, SETTINGS_PATH, Some(&body)).await
    }

    async fn probe(&self) -> Result<ConnectionProbe> {
        let health: HealthResponse = self.request(Method::GET, HEALTH_PATH, None).await?;
        health.into_probe()
    }
}

/// `2^attempt` seconds.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Extracts `error.message`, `error` or `message` from a JSON error body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("error"))
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    from_json.unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_trims_trailing_slash() {
        let config = OriginConfig {
            base_url: "http://backend:5000/".to_string(),
            ..OriginConfig::default()
        };
        let service = HttpSettingsService::new(&config).unwrap();
        assert_eq!(service.url(SETTINGS_PATH), "http://backend:5000/api/settings");
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error": {"message": "model not loaded"}}"#),
            "model not loaded"
        );
        assert_eq!(error_message(r#"{"error": "bad key"}"#), "bad key");
        assert_eq!(error_message("  plain text  "), "plain text");
    }

    #[test]
    fn test_health_ok_yields_models() {
        let health: HealthResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "components": {"database": "ok", "lm_studio": "ok"},
                "lm_studio_models": ["llama-3-8b", "mistral-7b"]
            }"#,
        )
        .unwrap();
        let probe = health.into_probe().unwrap();
        assert_eq!(probe.models, vec!["llama-3-8b", "mistral-7b"]);
    }

    #[test]
    fn test_health_degraded_model_server_fails() {
        let health: HealthResponse = serde_json::from_str(
            r#"{
                "status": "degraded",
                "components": {"database": "ok", "lm_studio": "error"},
                "lm_studio_error": "Status code: 503"
            }"#,
        )
        .unwrap();
        let err = health.into_probe().unwrap_err();
        assert!(err.to_string().contains("Status code: 503"));
    }
}
