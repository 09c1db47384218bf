//! External EEPROM store
//!
//! Byte-addressed storage over the serial EEPROM. The SPI transfer
//! finishes before the backend call returns, but the store keeps the
//! same shape as [`FlashStore`](super::FlashStore): claim the busy bit,
//! perform the operation, latch the status, invoke the handler. Callers
//! written against one store work against the other.
//!
//! EEPROM cells overwrite in place, so there is no erase operation and
//! no verification pass.

use super::{status_from_ops, StorageOperation, StorageOps, StoreEvent, StoreHandler};
use crate::drivers::arbiter::SharedSlot;
use crate::platform::traits::EepromBackend;
use crate::platform::{DriverError, Result};

/// EEPROM store over backend `B`
#[derive(Debug)]
pub struct EepromStore<B> {
    backend: B,
    slot: SharedSlot<StorageOps>,
}

impl<B: EepromBackend> EepromStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slot: SharedSlot::new(),
        }
    }

    /// The backend, mainly for test inspection
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Usable size in bytes
    pub fn capacity(&self) -> usize {
        self.backend.capacity()
    }

    /// Current status; error variants latch until the next accepted store
    pub fn operation(&self) -> StorageOperation {
        self.slot.with(|slot| status_from_ops(slot.ops()))
    }

    /// Store `data` at `addr` with the asynchronous contract
    ///
    /// The transfer itself is synchronous, so the handler has run by the
    /// time this returns. A backend failure is reported through the
    /// handler and the latched status, not the return value; `Err` here
    /// means the request was rejected before any I/O.
    pub fn store_async(
        &self,
        addr: usize,
        data: &[u8],
        handler: Option<StoreHandler>,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(DriverError::InvalidParam);
        }
        let capacity = self.backend.capacity();
        if addr >= capacity || data.len() > capacity - addr {
            return Err(DriverError::InvalidParam);
        }

        self.slot.with(|slot| {
            slot.claim(StorageOps::STORE, StorageOps::BUSY)?;
            slot.release(StorageOps::LATCHED);
            Ok::<(), DriverError>(())
        })?;

        let ok = self.backend.write(addr, data).is_ok();
        self.slot.with(|slot| {
            slot.release(StorageOps::STORE);
            if !ok {
                slot.latch(StorageOps::STORE_ERROR);
            }
        });

        if let Some(handler) = handler {
            handler(if ok { StoreEvent::Done } else { StoreEvent::Error });
        }
        Ok(())
    }

    /// Synchronous read of `out.len()` bytes starting at `addr`
    pub fn read(&self, addr: usize, out: &mut [u8]) -> Result<()> {
        let capacity = self.backend.capacity();
        if addr >= capacity || out.len() > capacity - addr {
            return Err(DriverError::InvalidParam);
        }
        self.backend.read(addr, out)
    }

    /// Blocking store; surfaces a latched failure as `StoreError`
    pub fn store(&self, addr: usize, data: &[u8]) -> Result<()> {
        self.store_async(addr, data, None)?;
        self.slot.with(|slot| {
            if slot.is_set(StorageOps::STORE_ERROR) {
                slot.release(StorageOps::STORE_ERROR);
                Err(DriverError::StoreError)
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockEeprom;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> EepromStore<MockEeprom> {
        EepromStore::new(MockEeprom::with_capacity(1024))
    }

    #[test]
    fn test_store_and_read_back() {
        let eeprom = store();
        eeprom.store(100, b"badge config v4").unwrap();
        let mut out = [0u8; 15];
        eeprom.read(100, &mut out).unwrap();
        assert_eq!(&out, b"badge config v4");
        assert_eq!(eeprom.operation(), StorageOperation::None);
    }

    #[test]
    fn test_overwrite_in_place() {
        let eeprom = store();
        eeprom.store(0, &[0x00]).unwrap();
        eeprom.store(0, &[0xFF]).unwrap();
        let mut out = [0u8; 1];
        eeprom.read(0, &mut out).unwrap();
        assert_eq!(out[0], 0xFF);
    }

    #[test]
    fn test_range_rejected_without_mutation() {
        let eeprom = store();
        assert_eq!(
            eeprom.store_async(1020, &[0; 5], None),
            Err(DriverError::InvalidParam)
        );
        assert_eq!(
            eeprom.store_async(1024, &[0], None),
            Err(DriverError::InvalidParam)
        );
        assert!(eeprom.backend().writes().is_empty());
    }

    #[test]
    fn test_empty_store_rejected() {
        let eeprom = store();
        assert_eq!(
            eeprom.store_async(0, &[], None),
            Err(DriverError::InvalidParam)
        );
    }

    #[test]
    fn test_backend_failure_latches_status() {
        static ERRORS: AtomicUsize = AtomicUsize::new(0);
        fn on_store(event: StoreEvent) {
            if event == StoreEvent::Error {
                ERRORS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let eeprom = store();
        eeprom.backend().fail_next_write();
        eeprom.store_async(0, &[1], Some(on_store)).unwrap();
        assert_eq!(ERRORS.load(Ordering::SeqCst), 1);
        assert_eq!(eeprom.operation(), StorageOperation::StoreError);
        // Latch clears when the next submission is accepted
        eeprom.store_async(0, &[1], None).unwrap();
        assert_eq!(eeprom.operation(), StorageOperation::None);
    }

    #[test]
    fn test_blocking_store_surfaces_failure_once() {
        let eeprom = store();
        eeprom.backend().fail_next_write();
        assert_eq!(eeprom.store(0, &[1]), Err(DriverError::StoreError));
        assert_eq!(eeprom.operation(), StorageOperation::None);
    }

    #[test]
    fn test_handler_runs_before_return() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        fn on_store(event: StoreEvent) {
            if event == StoreEvent::Done {
                DONE.fetch_add(1, Ordering::SeqCst);
            }
        }

        let eeprom = store();
        eeprom.store_async(10, b"x", Some(on_store)).unwrap();
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
    }
}
