//! Platform abstraction layer
//!
//! This module isolates all hardware access behind backend traits. The
//! drivers above it never touch registers directly: they program a backend
//! and consume its completion events, so the same driver code runs against
//! real peripherals on the badge and against the mock backends on the host.

pub mod error;
pub mod traits;

// Host-only simulation backends
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use error::{DriverError, Result};
pub use traits::{
    AdcBackend, AdcConfig, EepromBackend, FlashBackend, FlashConfig, SerialBus, SerialConfig,
    TickSource,
};
