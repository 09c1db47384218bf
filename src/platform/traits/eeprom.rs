//! External EEPROM backend abstraction
//!
//! The badge carries a serial EEPROM on the SPI bus. Unlike the internal
//! flash, transfers finish before the call returns; the storage layer
//! still presents the same asynchronous-looking contract on top so that
//! callers handle both stores identically.

use crate::platform::Result;

/// EEPROM hardware backend
///
/// A flat byte-addressed space. Implementations handle the device's page
/// boundaries and write-enable sequencing internally; callers may pass
/// arbitrary in-range byte ranges.
pub trait EepromBackend {
    /// Usable size in bytes
    fn capacity(&self) -> usize;

    /// Write `data` starting at `addr`; complete when the call returns
    fn write(&self, addr: usize, data: &[u8]) -> Result<()>;

    /// Read `out.len()` bytes starting at `addr`
    fn read(&self, addr: usize, out: &mut [u8]) -> Result<()>;
}
