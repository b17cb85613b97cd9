//! Infrared air purifier profile.
//!
//! IR remotes have no status endpoint. The device is commanded blind and
//! the engine echoes each successful write back as the observed state.

use super::DeviceProfile;
use crate::error::Result;
use crate::input::CommandRequest;
use crate::shadow::{DeviceKind, Observed, Target};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Momentary remote buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum RemoteKey {
    VolumeUp,
    VolumeDown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AirPurifierProfile;

impl DeviceProfile for AirPurifierProfile {
    fn kind(&self) -> DeviceKind {
        DeviceKind::AirPurifier
    }

    fn is_pollable(&self) -> bool {
        false
    }

    fn decode_status(&self, _body: &Value) -> Result<Observed> {
        Ok(Observed::default())
    }

    fn validate_target(&self, target: Target) -> std::result::Result<Target, String> {
        match target {
            Target::Power(_) => Ok(target),
            Target::Position(_) => Err("air purifiers accept on/off targets only".to_string()),
        }
    }

    fn command_for(&self, target: Target) -> Option<CommandRequest> {
        match target {
            Target::Power(true) => Some(CommandRequest::command("turnOn", "default")),
            Target::Power(false) => Some(CommandRequest::command("turnOff", "default")),
            Target::Position(_) => None,
        }
    }

    fn key_command(&self, key: RemoteKey) -> Option<CommandRequest> {
        let command = match key {
            RemoteKey::VolumeUp => "volumeAdd",
            RemoteKey::VolumeDown => "volumeSub",
        };
        Some(CommandRequest::command(command, "default"))
    }
}
