#![cfg_attr(not(test), no_std)]

//! sense_badge - peripheral I/O and non-volatile storage core for a
//! battery-powered wearable sensor badge
//!
//! This library provides the infrastructure the badge firmware is built on:
//! the arbitration model that lets several logical clients share one
//! physical peripheral, the interrupt-driven serial transport, flash and
//! EEPROM storage with verified asynchronous writes, and the deferred
//! execution substrate (event queue plus software timers) that hands work
//! from interrupt context to the application main loop without an RTOS.
//!
//! Hardware access is isolated behind the backend traits in
//! [`platform::traits`]; the drivers themselves are hardware-free and run
//! on the host against the mock backends in [`platform::mock`].

// Mock backends are host-only and need std for buffers and dump files.
#[cfg(all(feature = "mock", not(test)))]
extern crate std;

// Platform abstraction layer (backend traits, errors, mocks)
pub mod platform;

// Core infrastructure (event queue, software timers, logging)
pub mod core;

// Peripheral drivers built on the arbitration model
pub mod drivers;

// Non-volatile storage layer (flash + EEPROM)
pub mod storage;

// Serial command console
pub mod communication;

// Re-export the error type and result alias at crate root
pub use platform::error::{DriverError, Result};
