//! Serial device protocol: command framing, routing, pump status polling.

pub mod channel;
pub mod pump;
pub mod status;

pub use channel::{Channel, DeviceDriver, LinkSettings};
