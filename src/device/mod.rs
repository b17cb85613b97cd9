//! Device profiles.
//!
//! A profile knows how one device kind talks to the cloud: how to turn a
//! status body into an [`Observed`] snapshot, which targets it accepts, and
//! which command realizes a target. The engine is otherwise kind-agnostic.

pub mod air_purifier;
pub mod curtain;
pub mod meter;

use crate::config::OptionsConfig;
use crate::engine::ClampPolicy;
use crate::input::CommandRequest;
use crate::shadow::{DeviceKind, Observed, Target};
use serde_json::Value;
use std::sync::Arc;

pub use air_purifier::{AirPurifierProfile, RemoteKey};
pub use curtain::CurtainProfile;
pub use meter::MeterProfile;

/// Kind-specific behaviour plugged into a device engine.
pub trait DeviceProfile: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Whether the cloud exposes a status endpoint for this device.
    /// Write-only devices are never polled.
    fn is_pollable(&self) -> bool {
        true
    }

    fn clamp(&self) -> ClampPolicy {
        ClampPolicy::default()
    }

    /// Decode the `body` of a successful status response.
    fn decode_status(&self, body: &Value) -> crate::error::Result<Observed>;

    /// Normalize a requested target, or explain why it is refused.
    fn validate_target(&self, target: Target) -> Result<Target, String>;

    /// The command that drives the device to `target`. `None` if the
    /// device cannot be commanded.
    fn command_for(&self, target: Target) -> Option<CommandRequest>;

    /// The command for a momentary remote key, if this device has one.
    fn key_command(&self, _key: RemoteKey) -> Option<CommandRequest> {
        None
    }
}

/// Build the profile for `kind` from the global options.
pub fn profile_for(kind: DeviceKind, options: &OptionsConfig) -> Arc<dyn DeviceProfile> {
    match kind {
        DeviceKind::Curtain => Arc::new(CurtainProfile::from_options(&options.curtain)),
        DeviceKind::Meter => Arc::new(MeterProfile::from_options(&options.meter)),
        DeviceKind::AirPurifier => Arc::new(AirPurifierProfile),
    }
}
