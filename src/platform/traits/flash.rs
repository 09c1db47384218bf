//! Flash backend abstraction
//!
//! The badge's internal flash is word-addressed and page-erased, and both
//! program and erase complete asynchronously (on the real part they are
//! reported through the radio stack's system events). Program operations
//! follow NOR semantics: bits only clear, so storing over unerased words
//! silently loses the 0->1 transitions. The storage layer compensates by
//! re-reading and verifying after every store when
//! [`FlashConfig::verify_writes`] is enabled.

use crate::platform::Result;

/// Flash storage configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashConfig {
    /// Re-read and compare every store against its source once the
    /// backend reports success. Catches silently failed writes at the
    /// cost of one extra read per store.
    pub verify_writes: bool,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            verify_writes: true,
        }
    }
}

/// Completion events reported by a flash backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashBackendEvent {
    /// A page erase finished
    EraseDone {
        /// False when the backend itself reported failure
        success: bool,
    },
    /// A word program finished
    ProgramDone {
        /// False when the backend itself reported failure
        success: bool,
    },
}

/// Flash hardware backend
///
/// Addresses are in 32-bit words from the start of the storage region.
/// `start_erase` and `start_program` return as soon as the operation is
/// submitted; exactly one completion event follows each accepted call.
/// Reads are local and synchronous.
pub trait FlashBackend {
    /// Page size in words
    fn page_size_words(&self) -> usize;

    /// Number of pages in the storage region
    fn page_count(&self) -> usize;

    /// Begin erasing one page (all bits to 1)
    fn start_erase(&self, page: usize) -> Result<()>;

    /// Begin programming `words` at `word_addr`. The backend consumes the
    /// slice during the call; the storage layer keeps its own staged copy
    /// for verification until the completion event.
    fn start_program(&self, word_addr: usize, words: &[u32]) -> Result<()>;

    /// Synchronous read of `out.len()` words starting at `word_addr`
    fn read_words(&self, word_addr: usize, out: &mut [u32]) -> Result<()>;

    /// Take the next pending completion event, if any
    fn poll_event(&self) -> Option<FlashBackendEvent>;
}
