//! Non-volatile storage layer
//!
//! Two stores with one contract: the word-addressed internal flash
//! ([`flash::FlashStore`]) and the byte-addressed external EEPROM
//! ([`eeprom::EepromStore`]). Both expose a non-blocking `store_async`
//! completed through a handler, a synchronous `read`, blocking
//! wrappers, and a polled [`StorageOperation`] status. Store and erase
//! are mutually exclusive per store; a failed asynchronous operation
//! latches an error status that holds until the next accepted
//! submission.

pub mod eeprom;
pub mod flash;

use bitflags::bitflags;

bitflags! {
    /// In-flight operation and latched status bits of one store
    ///
    /// The error bits are latched status, not operations: they never
    /// conflict with a claim and are cleared when the next submission
    /// is accepted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StorageOps: u8 {
        const STORE = 1 << 0;
        const ERASE = 1 << 1;
        const STORE_ERROR = 1 << 2;
        const ERASE_ERROR = 1 << 3;

        const BUSY = Self::STORE.bits() | Self::ERASE.bits();
        const LATCHED = Self::STORE_ERROR.bits() | Self::ERASE_ERROR.bits();
    }
}

/// Caller-visible status of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageOperation {
    /// Idle, last operation (if any) succeeded
    None,
    /// A store is in flight (including its verification read-back)
    Store,
    /// An erase is in flight
    Erase,
    /// The last store failed; latched until the next accepted submission
    StoreError,
    /// The last erase failed; latched until the next accepted submission
    EraseError,
}

/// Completion events delivered to store handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreEvent {
    Done,
    Error,
}

/// Completion handler for asynchronous store and erase
pub type StoreHandler = fn(StoreEvent);

fn status_from_ops(ops: StorageOps) -> StorageOperation {
    if ops.contains(StorageOps::STORE) {
        StorageOperation::Store
    } else if ops.contains(StorageOps::ERASE) {
        StorageOperation::Erase
    } else if ops.contains(StorageOps::STORE_ERROR) {
        StorageOperation::StoreError
    } else if ops.contains(StorageOps::ERASE_ERROR) {
        StorageOperation::EraseError
    } else {
        StorageOperation::None
    }
}

pub use eeprom::EepromStore;
pub use flash::{FlashStore, STORE_STAGE_WORDS};
