//! Kismet REST Client
//!
//! Pulls device records changed since a timestamp. Kismet's
//! `last-time` endpoint is inclusive, so the sync loop dedups on its side.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::record::{field_selection, RawDeviceRecord};
use super::TelemetrySource;
use crate::config::KismetConfig;
use crate::error::{Dependency, DependencyError, FatalConfigError};
use crate::logic::retry::RetryPolicy;

const SERVICE: Dependency = Dependency::Telemetry;

/// Kismet API client
pub struct KismetClient {
    base_url: String,
    api_key: Option<String>,
    basic: Option<(String, String)>,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl KismetClient {
    pub fn new(config: &KismetConfig, retry: RetryPolicy) -> Result<Self, FatalConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FatalConfigError::HttpClient {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let basic = match (&config.username, &config.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            basic,
            retry,
            http_client,
        })
    }

    fn devices_url(&self, since: i64) -> String {
        format!("{}/devices/last-time/{}/devices.json", self.base_url, since)
    }

    async fn fetch_once(&self, since: i64) -> Result<Vec<RawDeviceRecord>, DependencyError> {
        let selection = field_selection().to_string();
        let mut request = self
            .http_client
            .post(self.devices_url(since))
            .form(&[("json", selection.as_str())]);

        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::COOKIE, format!("KISMET={}", key));
        } else if let Some((user, pass)) = &self.basic {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::from_status(SERVICE, status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        match body {
            Value::Array(items) => Ok(items.into_iter().map(RawDeviceRecord::from_value).collect()),
            other => Err(DependencyError::invalid(
                SERVICE,
                format!("expected a JSON array of devices, got {}", json_kind(&other)),
            )),
        }
    }
}

#[async_trait]
impl TelemetrySource for KismetClient {
    async fn fetch_since(&self, since: i64) -> Result<Vec<RawDeviceRecord>, DependencyError> {
        let records = self
            .retry
            .run("kismet.fetch_since", || self.fetch_once(since))
            .await?;
        tracing::debug!(since, count = records.len(), "fetched devices from kismet");
        Ok(records)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
