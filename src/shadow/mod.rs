//! Device shadows: the local record of each remote device's state.
//!
//! The store is the only shared mutable resource in the engine. The poller,
//! command coalescer and reconciler all go through it; the host side only
//! reads snapshots and is told about changes through a [`ShadowListener`].

pub mod notifier;
pub mod record;
pub mod store;

pub use notifier::{ChannelListener, LoggingListener, ShadowEvent, ShadowListener};
pub use record::{
    Capability, DeviceId, DeviceIdentity, DeviceKind, LastError, MotionState, Observed, Shadow,
    Target,
};
pub use store::{ShadowHandle, ShadowStore};
