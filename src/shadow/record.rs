//! Shadow record: the local view of one remote device.
//!
//! A shadow pairs what the cloud last reported (`observed`) with what the
//! host last asked for (`intended_target`), plus the derived motion state
//! and the in-flight guards used by the poller and the command coalescer.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString, IntoStaticStr};

/// Opaque device identifier as issued by the cloud API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Capability class a device kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    PositionalCover,
    Sensor,
    Switch,
}

/// Supported device kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum DeviceKind {
    Curtain,
    Meter,
    AirPurifier,
}

impl DeviceKind {
    pub fn capability(&self) -> Capability {
        match self {
            DeviceKind::Curtain => Capability::PositionalCover,
            DeviceKind::Meter => Capability::Sensor,
            DeviceKind::AirPurifier => Capability::Switch,
        }
    }
}

/// Immutable identity of a bridged device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<DeviceId>, kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
        }
    }

    /// Name used in log lines, e.g. "Living Room curtain".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.kind)
    }
}

/// A locally requested target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Cover position, 0 (closed) to 100 (open).
    Position(u8),
    /// On/off state for switch-like devices.
    Power(bool),
}

impl Target {
    /// True when `observed` already matches this target.
    pub fn is_satisfied_by(&self, observed: &Observed) -> bool {
        match *self {
            Target::Position(p) => observed.position == Some(p),
            Target::Power(on) => observed.power == Some(on),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Position(p) => write!(f, "position {}%", p),
            Target::Power(true) => f.write_str("on"),
            Target::Power(false) => f.write_str("off"),
        }
    }
}

/// Last state reported by the cloud. `None` means "never reported",
/// which is distinct from a reported zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    pub position: Option<u8>,
    pub moving: Option<bool>,
    pub power: Option<bool>,
    pub temperature: Option<f32>,
    pub humidity: Option<u8>,
    pub battery: Option<u8>,
    pub low_battery: Option<bool>,
}

impl Observed {
    /// Overlay every field reported in `update`; unreported fields keep
    /// their previous value.
    pub fn merge(&mut self, update: &Observed) {
        fn overlay<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        overlay(&mut self.position, update.position);
        overlay(&mut self.moving, update.moving);
        overlay(&mut self.power, update.power);
        overlay(&mut self.temperature, update.temperature);
        overlay(&mut self.humidity, update.humidity);
        overlay(&mut self.battery, update.battery);
        overlay(&mut self.low_battery, update.low_battery);
    }
}

/// Direction of motion as derived by the reconciler.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
pub enum MotionState {
    #[default]
    Idle,
    Increasing,
    Decreasing,
}

/// Most recent poll or push failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LastError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// The per-device shadow record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub observed: Observed,
    pub intended_target: Option<Target>,
    /// Engine view of the motion direction.
    pub motion_state: MotionState,
    /// Motion state shown to the host. Equals `motion_state` except while
    /// an unconfirmed motion is masked by a stale idle report.
    pub reported_motion: MotionState,
    /// Set while the settle timer runs after a diverging intent.
    pub assumed_motion: bool,
    /// Identifies the current settle timer; bumped on every start/cancel.
    pub settle_epoch: u64,
    pub poll_in_flight: bool,
    pub push_in_flight: bool,
    pub last_error: Option<LastError>,
    /// Incremented on every change visible to the facade.
    pub version: u64,
}

impl Shadow {
    /// The target the host should display: the pending intent, or the
    /// observed state once the intent has been settled.
    pub fn effective_target(&self) -> Option<Target> {
        self.intended_target.or_else(|| {
            self.observed
                .position
                .map(Target::Position)
                .or_else(|| self.observed.power.map(Target::Power))
        })
    }

    /// True if anything the facade renders differs between `self` and `other`.
    pub fn differs_observably(&self, other: &Shadow) -> bool {
        self.observed != other.observed
            || self.intended_target != other.intended_target
            || self.motion_state != other.motion_state
            || self.reported_motion != other.reported_motion
            || self.last_error.as_ref().map(|e| (&e.kind, &e.message))
                != other.last_error.as_ref().map(|e| (&e.kind, &e.message))
    }
}
