//! SwitchBot cloud API client.

use super::{CommandRequest, DeviceGateway, StatusResponse};
use crate::config::ApiConfig;
use crate::error::{BridgeError, Result};
use crate::shadow::DeviceId;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

/// HTTPS gateway for `https://api.switch-bot.com/v1.0/devices`.
pub struct SwitchBotClient {
    http: Client,
    base_url: String,
    open_token: Option<String>,
    timeout: Duration,
}

impl SwitchBotClient {
    /// Create a new client from configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| BridgeError::TransportFailure(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            open_token: config.open_token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn status_url(&self, device: &DeviceId) -> String {
        format!("{}/{}/status", self.base_url, device)
    }

    fn commands_url(&self, device: &DeviceId) -> String {
        format!("{}/{}/commands", self.base_url, device)
    }

    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .timeout(self.timeout)
            .header("Content-Type", "application/json; charset=utf8");
        match &self.open_token {
            Some(token) => request.header("Authorization", token.as_str()),
            None => request,
        }
    }

    async fn decode(response: Response) -> Result<StatusResponse> {
        if !response.status().is_success() {
            return Err(BridgeError::TransportFailure(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        response
            .json::<StatusResponse>()
            .await
            .map_err(|e| BridgeError::TransportFailure(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl DeviceGateway for SwitchBotClient {
    async fn read_status(&self, device: &DeviceId) -> Result<StatusResponse> {
        let url = self.status_url(device);
        debug!("[SwitchBot] GET {}", url);

        let response = self
            .prepare(self.http.get(&url))
            .send()
            .await
            .map_err(|e| BridgeError::TransportFailure(format!("HTTP request failed: {}", e)))?;

        Self::decode(response).await
    }

    async fn write_command(
        &self,
        device: &DeviceId,
        command: &CommandRequest,
    ) -> Result<StatusResponse> {
        let url = self.commands_url(device);
        debug!("[SwitchBot] POST {} {:?}", url, command);

        let response = self
            .prepare(self.http.post(&url))
            .json(command)
            .send()
            .await
            .map_err(|e| BridgeError::TransportFailure(format!("HTTP command failed: {}", e)))?;

        Self::decode(response).await
    }
}
