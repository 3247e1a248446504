//! HTTP client for the game-server dashboard backend.
//!
//! A thin reqwest wrapper over the authenticated metrics, server-list and
//! server-control endpoints, plus the wire types both transports share.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod frame;
mod types;

pub use error::{Error, Result};
pub use frame::Frame;
pub use types::{
    ControlAction, ControlRequest, CreateServerRequest, DiskUsage, NetworkThroughput,
    ServerDescriptor, ServerStatus, SystemMetrics,
};

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Client for the dashboard's authenticated HTTP endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client rooted at `base_url`, e.g. `http://host:8080/api`.
    ///
    /// # Errors
    ///
    /// Returns an error when `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // A trailing slash makes `join` treat the last path segment as a
        // directory instead of replacing it.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            auth_token: None,
        })
    }

    /// Attaches a pre-obtained bearer token, sent with every request.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Fetches the current system-wide metrics.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails, the backend answers with a
    /// non-success status, or the body cannot be decoded.
    pub async fn get_metrics(&self) -> Result<SystemMetrics> {
        self.get("metrics").await
    }

    /// Fetches the list of managed servers.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails, the backend answers with a
    /// non-success status, or the body cannot be decoded.
    pub async fn get_servers(&self) -> Result<Vec<ServerDescriptor>> {
        self.get("servers").await
    }

    /// Sends a start/stop/restart command for one server.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the backend rejects the
    /// command.
    pub async fn control_server(&self, server_id: &str, action: ControlAction) -> Result<()> {
        let url = self.endpoint("server/control")?;
        let request = ControlRequest {
            server_id: server_id.to_owned(),
            action,
        };
        debug!(server_id, %action, "sending server control command");
        let response = self
            .authorize(self.client.post(url).json(&request))
            .send()
            .await?;
        Self::success(response).await?;
        Ok(())
    }

    /// Creates a new managed server and returns its descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails, the backend rejects the
    /// creation, or the body cannot be decoded.
    pub async fn create_server(&self, request: &CreateServerRequest) -> Result<ServerDescriptor> {
        let url = self.endpoint("servers")?;
        let response = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await?;
        let response = Self::success(response).await?;
        Ok(response.json().await?)
    }

    /// Deletes a managed server by name.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the backend rejects the
    /// deletion.
    pub async fn delete_server(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&format!("servers/{name}"))?;
        let response = self.authorize(self.client.delete(url)).send().await?;
        Self::success(response).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let response = Self::success(response).await?;
        Ok(response.json().await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Passes successful responses through; turns everything else into
    /// [`Error::Api`], surfacing the JSON `message`/`error` body when the
    /// backend provides one.
    async fn success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .ok()
            .as_deref()
            .and_then(extract_error_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            });

        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}
