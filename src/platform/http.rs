//! JSON REST platform client
//!
//! Static API key in a configurable header, configurable base URL. Failure
//! statuses are classified into the execution-error taxonomy here so the
//! executor can surface a category-tagged message without inspecting HTTP
//! internals.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{CreatedWorkflow, PlatformClient, PlatformCredential, WorkflowPayload, WorkflowSummary};
use crate::config::PlatformConfig;
use crate::{Error, ExecutionErrorCategory, Result};

pub struct HttpPlatformClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("platform API key not configured".to_string()))?;

        let header_name = HeaderName::from_bytes(config.api_key_header.as_bytes())
            .map_err(|e| Error::Config(format!("invalid API key header name: {}", e)))?;
        let header_value = HeaderValue::from_str(&api_key)
            .map_err(|e| Error::Config(format!("invalid API key value: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header_name, header_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        // The platform wraps list responses in {"data": [...]}; accept a
        // bare array too.
        let value: serde_json::Value = response.json().await.map_err(request_error)?;
        let items = match value.get("data") {
            Some(data) => data.clone(),
            None => value,
        };
        Ok(serde_json::from_value(items)?)
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        self.get_list("/api/v1/workflows").await
    }

    async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<CreatedWorkflow> {
        let url = format!("{}/api/v1/workflows", self.base_url);
        debug!(workflow = %payload.name, nodes = payload.nodes.len(), "creating workflow");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        // The id arrives either at the top level or under "data"
        let value: serde_json::Value = response.json().await.map_err(request_error)?;
        let id = value
            .get("id")
            .or_else(|| value.get("data").and_then(|d| d.get("id")))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| Error::Execution {
                category: ExecutionErrorCategory::Unknown,
                message: "platform response carried no workflow id".to_string(),
            })?;

        Ok(CreatedWorkflow { id })
    }

    async fn list_credentials(&self) -> Result<Vec<PlatformCredential>> {
        self.get_list("/api/v1/credentials").await
    }

    fn workflow_url(&self, id: &str) -> String {
        format!("{}/workflow/{}", self.base_url, id)
    }

    fn credential_setup_url(&self, credential_type: &str) -> String {
        format!("{}/credentials/new?type={}", self.base_url, credential_type)
    }
}

/// Classify a transport-level failure
fn request_error(e: reqwest::Error) -> Error {
    let category = if e.is_timeout() {
        ExecutionErrorCategory::Timeout
    } else if e.is_connect() || e.is_request() {
        ExecutionErrorCategory::Network
    } else {
        ExecutionErrorCategory::Unknown
    };
    Error::Execution {
        category,
        message: e.to_string(),
    }
}

/// Classify a non-success status
fn status_error(status: StatusCode, body: &str) -> Error {
    let category = match status {
        StatusCode::UNAUTHORIZED => ExecutionErrorCategory::Authentication,
        StatusCode::FORBIDDEN => ExecutionErrorCategory::Authorization,
        s if s.is_server_error() => ExecutionErrorCategory::Server,
        _ => ExecutionErrorCategory::Unknown,
    };
    let message = if body.is_empty() {
        format!("platform returned {}", status)
    } else {
        format!("platform returned {}: {}", status, body)
    };
    Error::Execution { category, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let auth = status_error(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(
            auth,
            Error::Execution {
                category: ExecutionErrorCategory::Authentication,
                ..
            }
        ));

        let forbidden = status_error(StatusCode::FORBIDDEN, "no");
        assert!(matches!(
            forbidden,
            Error::Execution {
                category: ExecutionErrorCategory::Authorization,
                ..
            }
        ));

        let server = status_error(StatusCode::BAD_GATEWAY, "");
        assert!(matches!(
            server,
            Error::Execution {
                category: ExecutionErrorCategory::Server,
                ..
            }
        ));

        let other = status_error(StatusCode::UNPROCESSABLE_ENTITY, "bad nodes");
        assert!(matches!(
            other,
            Error::Execution {
                category: ExecutionErrorCategory::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_urls() {
        let config = PlatformConfig {
            base_url: "http://localhost:5678/".to_string(),
            api_key: Some("key".to_string()),
            ..PlatformConfig::default()
        };
        let client = HttpPlatformClient::new(&config).unwrap();
        assert_eq!(client.workflow_url("42"), "http://localhost:5678/workflow/42");
        assert_eq!(
            client.credential_setup_url("slackApi"),
            "http://localhost:5678/credentials/new?type=slackApi"
        );
    }
}
