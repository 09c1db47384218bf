//! Mock platform backends for testing and simulation
//!
//! In-memory implementations of every backend trait, with the injection
//! and inspection hooks the driver tests need: burst logs, scripted
//! samples, manual completion stepping, error and power-loss injection.
//! The flash and EEPROM mocks can externalize their contents to a
//! human-readable hex dump file.
//!
//! # Feature gate
//!
//! Host-only. Available during test builds and behind the `mock` feature
//! for simulation binaries; either way it pulls in std.
//!
//! # Completion model
//!
//! By default the mocks complete every accepted operation immediately: the
//! completion event is queued as the operation is submitted and the driver
//! picks it up on its next `process()` pump. Tests that need to observe
//! the busy window switch a mock to manual completion and fire events
//! explicitly (`complete_write`, `complete_next`).

#![cfg(any(test, feature = "mock"))]

mod adc;
mod dump;
mod eeprom;
mod flash;
mod serial;
mod ticker;

pub use adc::MockAdc;
pub use eeprom::MockEeprom;
pub use flash::MockFlash;
pub use serial::MockSerial;
pub use ticker::MockTicker;
