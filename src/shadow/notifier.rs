//! Shadow change notifications for the device facade.
//!
//! When a shadow changes, the host needs to hear about it right away so its
//! live characteristic model can be updated. The engine calls into a
//! [`ShadowListener`] after every committed change and on every failure.

use super::record::{DeviceId, Shadow};
use crate::error::ErrorKind;
use log::{debug, warn};
use tokio::sync::mpsc;

/// Callbacks the engine invokes towards the host side.
///
/// Called outside of any shadow lock; implementations must not block.
pub trait ShadowListener: Send + Sync {
    /// `observed`, the motion state, the target or the error changed.
    fn on_shadow_updated(&self, device: &DeviceId, shadow: &Shadow);

    /// A poll, push or configuration step failed for `device`.
    fn on_error(&self, device: &DeviceId, kind: ErrorKind, message: &str);
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl ShadowListener for LoggingListener {
    fn on_shadow_updated(&self, device: &DeviceId, shadow: &Shadow) {
        debug!(
            "[Shadow] {} v{}: observed={:?} target={:?} motion={} reported={}",
            device,
            shadow.version,
            shadow.observed,
            shadow.effective_target(),
            shadow.motion_state,
            shadow.reported_motion
        );
    }

    fn on_error(&self, device: &DeviceId, kind: ErrorKind, message: &str) {
        warn!("[Shadow] {} {} error: {}", device, kind, message);
    }
}

/// Event forwarded by [`ChannelListener`].
#[derive(Debug, Clone)]
pub enum ShadowEvent {
    Updated {
        device: DeviceId,
        shadow: Shadow,
    },
    Error {
        device: DeviceId,
        kind: ErrorKind,
        message: String,
    },
}

impl ShadowEvent {
    pub fn device(&self) -> &DeviceId {
        match self {
            ShadowEvent::Updated { device, .. } | ShadowEvent::Error { device, .. } => device,
        }
    }
}

/// Listener that forwards every notification through an unbounded channel.
///
/// Unbounded so that the engine never waits on a slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ShadowEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ShadowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ShadowEvent) {
        if self.tx.send(event).is_err() {
            debug!("[Shadow] event receiver dropped");
        }
    }
}

impl ShadowListener for ChannelListener {
    fn on_shadow_updated(&self, device: &DeviceId, shadow: &Shadow) {
        self.send(ShadowEvent::Updated {
            device: device.clone(),
            shadow: shadow.clone(),
        });
    }

    fn on_error(&self, device: &DeviceId, kind: ErrorKind, message: &str) {
        self.send(ShadowEvent::Error {
            device: device.clone(),
            kind,
            message: message.to_string(),
        });
    }
}
