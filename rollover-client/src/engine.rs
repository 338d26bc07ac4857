//! Engine HTTP API client
//!
//! Used when the runtime is reached over TCP (`RUNTIME_HOST` / `RUNTIME_PORT`).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rollover_core::domain::container::{ContainerDetails, ContainerSummary};
use rollover_core::dto::container::{EngineContainerInspect, EngineContainerSummary};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::ContainerRuntime;
use crate::error::{ClientError, Result};

/// HTTP client for the container Engine API
#[derive(Debug, Clone)]
pub struct EngineClient {
    /// Base URL of the engine (e.g., "http://localhost:2375")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl EngineClient {
    /// Create a new engine client
    ///
    /// # Example
    /// ```
    /// use rollover_client::EngineClient;
    ///
    /// let client = EngineClient::new("http://localhost:2375");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new engine client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the engine
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize a JSON body
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        id: Option<&str>,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            return Err(Self::error_from(response, id).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code of a body-less action (stop/start)
    ///
    /// 304 means the container was already in the requested state.
    async fn handle_action_response(&self, response: reqwest::Response, id: &str) -> Result<()> {
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!("Container {} already in requested state", id);
            return Ok(());
        }

        if !status.is_success() {
            return Err(Self::error_from(response, Some(id)).await);
        }

        Ok(())
    }

    async fn error_from(response: reqwest::Response, id: Option<&str>) -> ClientError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => ClientError::NotFound(id.to_string()),
            _ => ClientError::api_error(status.as_u16(), error_text),
        }
    }
}

#[async_trait]
impl ContainerRuntime for EngineClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let url = format!("{}/containers/json", self.base_url);
        let response = self.client.get(&url).send().await?;

        let containers: Vec<EngineContainerSummary> = self.handle_response(response, None).await?;
        Ok(containers.into_iter().map(Into::into).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let url = format!("{}/containers/{}/json", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        let inspect: EngineContainerInspect = self.handle_response(response, Some(id)).await?;
        Ok(inspect.into())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let url = format!("{}/containers/{}/stop", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        self.handle_action_response(response, id).await
    }

    async fn start(&self, id: &str) -> Result<()> {
        let url = format!("{}/containers/{}/start", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        self.handle_action_response(response, id).await
    }
}
