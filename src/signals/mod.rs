//! Per-frame motion signals and their broadcast hub.

pub mod hub;
pub mod snapshot;

pub use hub::{HubConfig, SignalCallback, SignalHub};
pub use snapshot::SignalSnapshot;
