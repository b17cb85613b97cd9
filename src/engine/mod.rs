//! Device shadow synchronization engine.
//!
//! - `reconciler`: pure motion state machine
//! - `poller`: skip-on-busy status polling
//! - `coalescer`: debounced single-flight command pushes
//! - `device`: the per-device task set tying them together
//! - `bridge`: the orchestrator hosts talk to

pub mod bridge;
mod coalescer;
pub mod device;
mod poller;
pub mod reconciler;

pub use bridge::Bridge;
pub use device::DeviceEngine;
pub use reconciler::{ClampPolicy, SettleAction};
