//! Peripheral drivers
//!
//! All drivers here share one structure: logical instances created by
//! `configure`, per-peripheral arbitration slots guarding in-flight
//! operations, asynchronous submissions completed by backend events
//! pumped through `process`, and blocking wrappers that poll. The model
//! itself lives in [`arbiter`].

pub mod arbiter;

pub mod adc;
pub mod serial;

pub use adc::{AdcDriver, AdcEvent, AdcHandler, AdcInstance, AdcOps};
pub use arbiter::{alloc_instance_id, SharedSlot, Slot};
pub use serial::{
    SerialDriver, SerialEvent, SerialHandler, SerialInstance, SerialOps, RX_RING_BYTES,
    RX_STAGE_BYTES, TX_STAGE_BYTES,
};
