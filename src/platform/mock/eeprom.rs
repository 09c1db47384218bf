//! Mock EEPROM backend for testing
//!
//! A flat byte array with a write log. EEPROM writes overwrite in place,
//! so unlike [`MockFlash`](super::MockFlash) there is no erase step to
//! simulate.

use super::dump;
use crate::platform::{traits::EepromBackend, DriverError, Result};
use core::cell::{Cell, RefCell};
use std::io;
use std::path::Path;
use std::vec::Vec;

const DEFAULT_CAPACITY: usize = 256 * 1024;

/// Mock EEPROM backend
///
/// # Example
///
/// ```
/// use sense_badge::platform::mock::MockEeprom;
/// use sense_badge::platform::traits::EepromBackend;
///
/// let eeprom = MockEeprom::new();
/// eeprom.write(262100, b"Test data!").unwrap();
/// let mut out = [0u8; 10];
/// eeprom.read(262100, &mut out).unwrap();
/// assert_eq!(&out, b"Test data!");
/// ```
#[derive(Debug)]
pub struct MockEeprom {
    bytes: RefCell<Vec<u8>>,
    writes: RefCell<Vec<(usize, usize)>>,
    fail_next_write: Cell<bool>,
}

impl MockEeprom {
    /// Create a mock with the badge's 256 KiB part
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a mock with explicit capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let mut bytes = Vec::new();
        bytes.resize(capacity, 0xFF);
        Self {
            bytes: RefCell::new(bytes),
            writes: RefCell::new(Vec::new()),
            fail_next_write: Cell::new(false),
        }
    }

    /// Fail the next write with `Internal`
    pub fn fail_next_write(&self) {
        self.fail_next_write.set(true);
    }

    /// Every accepted write as `(addr, len)`, in order
    pub fn writes(&self) -> Vec<(usize, usize)> {
        self.writes.borrow().clone()
    }

    /// Save the array as a human-readable hexdump
    pub fn save_dump<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        dump::save(path, &self.bytes.borrow())
    }
}

impl Default for MockEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl EepromBackend for MockEeprom {
    fn capacity(&self) -> usize {
        self.bytes.borrow().len()
    }

    fn write(&self, addr: usize, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.borrow_mut();
        if addr + data.len() > bytes.len() {
            return Err(DriverError::InvalidParam);
        }
        if self.fail_next_write.take() {
            return Err(DriverError::Internal);
        }
        bytes[addr..addr + data.len()].copy_from_slice(data);
        self.writes.borrow_mut().push((addr, data.len()));
        Ok(())
    }

    fn read(&self, addr: usize, out: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.borrow();
        if addr + out.len() > bytes.len() {
            return Err(DriverError::InvalidParam);
        }
        out.copy_from_slice(&bytes[addr..addr + out.len()]);
        Ok(())
    }
}
