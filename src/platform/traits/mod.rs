//! Backend traits
//!
//! This module defines the traits a platform backend must provide. Each
//! trait models one physical peripheral class the way the badge hardware
//! exposes it: a byte-burst serial unit, a page-oriented flash controller
//! with asynchronous completion, a synchronous SPI EEPROM, a one-shot ADC
//! and a free-running tick counter.
//!
//! Backend methods take `&self`: implementations are shared between the
//! application main loop and interrupt handlers and are expected to use
//! interior mutability (hardware registers, or `RefCell` state in mocks).

pub mod adc;
pub mod eeprom;
pub mod flash;
pub mod serial;
pub mod ticker;

// Re-export trait interfaces and their configs
pub use adc::{AdcBackend, AdcBackendEvent, AdcConfig, AdcReference};
pub use eeprom::EepromBackend;
pub use flash::{FlashBackend, FlashBackendEvent, FlashConfig};
pub use serial::{Parity, SerialBus, SerialBusEvent, SerialConfig, MAX_BURST_LEN};
pub use ticker::TickSource;
