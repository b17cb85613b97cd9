//! Remote device gateways.
//!
//! A gateway is anything that can read a device's status and send it a
//! command. Two implementations are provided:
//! - `switchbot`: the SwitchBot cloud API over HTTPS
//! - `simulation`: an in-process cloud with simulated motors and sensors

pub mod simulation;
pub mod switchbot;

use crate::error::{BridgeError, Result};
use crate::shadow::DeviceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use simulation::SimulatedCloud;
pub use switchbot::SwitchBotClient;

/// The `message` value the API uses for a successful call.
pub const SUCCESS_MESSAGE: &str = "success";

/// Envelope returned by both status reads and command writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub body: Value,
}

impl StatusResponse {
    /// A successful response carrying `body`.
    pub fn success(body: Value) -> Self {
        Self {
            status_code: 100,
            message: SUCCESS_MESSAGE.to_string(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.message == SUCCESS_MESSAGE
    }

    /// The body on success, an `ApiFailure` otherwise.
    pub fn into_success(self) -> Result<Value> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(BridgeError::ApiFailure {
                status_code: self.status_code,
                message: self.message,
            })
        }
    }
}

/// Command payload for a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub command_type: String,
    pub command: String,
    pub parameter: String,
}

impl CommandRequest {
    /// A plain `commandType: "command"` request.
    pub fn command(command: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            command_type: "command".to_string(),
            command: command.into(),
            parameter: parameter.into(),
        }
    }
}

/// Remote device gateway.
///
/// Both calls return `Err(TransportFailure)` when the request could not be
/// completed, and `Ok` with whatever envelope the API produced otherwise.
/// Callers decide success by [`StatusResponse::is_success`].
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn read_status(&self, device: &DeviceId) -> Result<StatusResponse>;

    async fn write_command(
        &self,
        device: &DeviceId,
        command: &CommandRequest,
    ) -> Result<StatusResponse>;
}
