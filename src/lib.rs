//! SwitchBot shadow bridge library.
//!
//! Keeps a local shadow of each SwitchBot cloud device in sync with the
//! device itself: periodic status polling, debounced command pushes and a
//! motion state machine reconciling the two.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod input;
pub mod shadow;
