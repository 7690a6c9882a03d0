//! vidlink runtime: wires discovery, connection monitoring, deduplication and
//! queue reconciliation into one [`Bridge`] and drives them on timers.

pub mod bridge;

pub use bridge::{Bridge, BridgeHandle};
