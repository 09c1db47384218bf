//! Internal flash store
//!
//! Word-addressed storage over a page-erased NOR flash backend. Erase
//! and program run asynchronously; the completion events arrive through
//! the backend and are pumped by [`FlashStore::process`]. Multi-page
//! erases are chained one page at a time from each completion.
//!
//! NOR programming only clears bits, so storing over an unerased region
//! silently loses the 0-to-1 transitions and the backend still reports
//! success. With [`FlashConfig::verify_writes`] enabled (the default)
//! the store re-reads the region after the program completes and
//! compares it against its staged copy of the source; a mismatch
//! latches [`StorageOperation::StoreError`].

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use super::{status_from_ops, StorageOperation, StorageOps, StoreEvent, StoreHandler};
use crate::drivers::arbiter::Slot;
use crate::platform::traits::{FlashBackend, FlashBackendEvent, FlashConfig};
use crate::platform::{DriverError, Result};

/// Store staging capacity in words; also the largest single store
pub const STORE_STAGE_WORDS: usize = 256;

/// Words compared per verification read-back chunk
const VERIFY_CHUNK_WORDS: usize = 32;

#[derive(Debug)]
struct FlashState {
    slot: Slot<StorageOps>,
    staged: Vec<u32, STORE_STAGE_WORDS>,
    store_addr: usize,
    erase_next: usize,
    erase_remaining: usize,
    handler: Option<StoreHandler>,
}

enum FlashAction {
    Ignore,
    EraseNext(usize),
    Verify,
    Finish(Option<StoreHandler>, StoreEvent),
}

/// Flash store over backend `B`
#[derive(Debug)]
pub struct FlashStore<B> {
    backend: B,
    config: FlashConfig,
    state: Mutex<RefCell<FlashState>>,
}

impl<B: FlashBackend> FlashStore<B> {
    pub fn new(backend: B, config: FlashConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(RefCell::new(FlashState {
                slot: Slot::new(),
                staged: Vec::new(),
                store_addr: 0,
                erase_next: 0,
                erase_remaining: 0,
                handler: None,
            })),
        }
    }

    /// The backend, mainly for test inspection
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Total capacity in words
    pub fn capacity_words(&self) -> usize {
        self.backend.page_size_words() * self.backend.page_count()
    }

    pub fn page_size_words(&self) -> usize {
        self.backend.page_size_words()
    }

    pub fn page_count(&self) -> usize {
        self.backend.page_count()
    }

    /// Current status; error variants latch until the next accepted
    /// store or erase
    pub fn operation(&self) -> StorageOperation {
        critical_section::with(|cs| status_from_ops(self.state.borrow_ref(cs).slot.ops()))
    }

    /// Begin erasing `count` pages starting at `page`
    ///
    /// Rejected with `Busy` while a store or erase is outstanding. The
    /// handler gets [`StoreEvent::Done`] after the last page, or
    /// [`StoreEvent::Error`] if any page fails (the remainder is not
    /// erased).
    pub fn erase_async(
        &self,
        page: usize,
        count: usize,
        handler: Option<StoreHandler>,
    ) -> Result<()> {
        if count == 0 || page >= self.backend.page_count() {
            return Err(DriverError::InvalidParam);
        }
        if count > self.backend.page_count() - page {
            return Err(DriverError::InvalidParam);
        }

        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.slot.claim(StorageOps::ERASE, StorageOps::BUSY)?;
            st.slot.release(StorageOps::LATCHED);
            st.erase_next = page + 1;
            st.erase_remaining = count - 1;
            st.handler = handler;
            Ok::<(), DriverError>(())
        })?;

        if let Err(e) = self.backend.start_erase(page) {
            critical_section::with(|cs| {
                let mut st = self.state.borrow_ref_mut(cs);
                st.slot.release(StorageOps::ERASE);
                st.handler = None;
            });
            return Err(e);
        }
        Ok(())
    }

    /// Begin storing `words` at `word_addr`
    ///
    /// The words are staged in the driver, so the caller's slice is not
    /// borrowed past this call. Rejected with `Busy` while a store or
    /// erase is outstanding, `InvalidParam` on an empty or out-of-range
    /// request, `InvalidLength` beyond the staging capacity.
    pub fn store_async(
        &self,
        word_addr: usize,
        words: &[u32],
        handler: Option<StoreHandler>,
    ) -> Result<()> {
        if words.is_empty() {
            return Err(DriverError::InvalidParam);
        }
        if words.len() > STORE_STAGE_WORDS {
            return Err(DriverError::InvalidLength);
        }
        let capacity = self.capacity_words();
        if word_addr >= capacity || words.len() > capacity - word_addr {
            return Err(DriverError::InvalidParam);
        }

        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.slot.claim(StorageOps::STORE, StorageOps::BUSY)?;
            st.slot.release(StorageOps::LATCHED);
            st.staged.clear();
            // Length checked above, cannot fail
            let _ = st.staged.extend_from_slice(words);
            st.store_addr = word_addr;
            st.handler = handler;
            Ok::<(), DriverError>(())
        })?;

        // The backend consumes the slice during the call; the staged
        // copy is only needed later, for verification
        if let Err(e) = self.backend.start_program(word_addr, words) {
            critical_section::with(|cs| {
                let mut st = self.state.borrow_ref_mut(cs);
                st.slot.release(StorageOps::STORE);
                st.staged.clear();
                st.handler = None;
            });
            return Err(e);
        }
        Ok(())
    }

    /// Synchronous read of `out.len()` words starting at `word_addr`
    pub fn read(&self, word_addr: usize, out: &mut [u32]) -> Result<()> {
        let capacity = self.capacity_words();
        if word_addr >= capacity || out.len() > capacity - word_addr {
            return Err(DriverError::InvalidParam);
        }
        self.backend.read_words(word_addr, out)
    }

    /// Blocking erase; surfaces a latched failure as `EraseError`
    pub fn erase(&self, page: usize, count: usize) -> Result<()> {
        self.erase_async(page, count, None)?;
        self.wait_done()
    }

    /// Blocking store; surfaces a latched failure as `StoreError`
    pub fn store(&self, word_addr: usize, words: &[u32]) -> Result<()> {
        self.store_async(word_addr, words, None)?;
        self.wait_done()
    }

    /// Drain and dispatch pending backend completion events
    ///
    /// On hardware this runs from the system-event dispatch; the
    /// blocking wrappers call it while they poll.
    pub fn process(&self) {
        while let Some(event) = self.backend.poll_event() {
            self.handle_event(event);
        }
    }

    fn handle_event(&self, event: FlashBackendEvent) {
        let action = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            match event {
                FlashBackendEvent::EraseDone { success } => {
                    if !st.slot.is_set(StorageOps::ERASE) {
                        return FlashAction::Ignore;
                    }
                    if !success {
                        st.slot.release(StorageOps::ERASE);
                        st.slot.latch(StorageOps::ERASE_ERROR);
                        return FlashAction::Finish(st.handler.take(), StoreEvent::Error);
                    }
                    if st.erase_remaining == 0 {
                        st.slot.release(StorageOps::ERASE);
                        return FlashAction::Finish(st.handler.take(), StoreEvent::Done);
                    }
                    let next = st.erase_next;
                    st.erase_next += 1;
                    st.erase_remaining -= 1;
                    FlashAction::EraseNext(next)
                }
                FlashBackendEvent::ProgramDone { success } => {
                    if !st.slot.is_set(StorageOps::STORE) {
                        return FlashAction::Ignore;
                    }
                    if !success {
                        st.slot.release(StorageOps::STORE);
                        st.slot.latch(StorageOps::STORE_ERROR);
                        st.staged.clear();
                        return FlashAction::Finish(st.handler.take(), StoreEvent::Error);
                    }
                    if self.config.verify_writes {
                        // Keep the store bit set through the read-back
                        FlashAction::Verify
                    } else {
                        st.slot.release(StorageOps::STORE);
                        st.staged.clear();
                        FlashAction::Finish(st.handler.take(), StoreEvent::Done)
                    }
                }
            }
        });

        match action {
            FlashAction::Ignore => {}
            FlashAction::EraseNext(page) => {
                if self.backend.start_erase(page).is_err() {
                    let handler = critical_section::with(|cs| {
                        let mut st = self.state.borrow_ref_mut(cs);
                        st.slot.release(StorageOps::ERASE);
                        st.slot.latch(StorageOps::ERASE_ERROR);
                        st.handler.take()
                    });
                    if let Some(handler) = handler {
                        handler(StoreEvent::Error);
                    }
                }
            }
            FlashAction::Verify => self.run_verification(),
            FlashAction::Finish(handler, event) => {
                if let Some(handler) = handler {
                    handler(event);
                }
            }
        }
    }

    /// Compare the programmed region against the staged source
    fn run_verification(&self) {
        let (addr, len) = critical_section::with(|cs| {
            let st = self.state.borrow_ref(cs);
            (st.store_addr, st.staged.len())
        });

        let mut ok = true;
        let mut offset = 0;
        let mut buf = [0u32; VERIFY_CHUNK_WORDS];
        while offset < len {
            let n = (len - offset).min(VERIFY_CHUNK_WORDS);
            if self.backend.read_words(addr + offset, &mut buf[..n]).is_err() {
                ok = false;
                break;
            }
            let matches = critical_section::with(|cs| {
                let st = self.state.borrow_ref(cs);
                st.staged[offset..offset + n] == buf[..n]
            });
            if !matches {
                ok = false;
                break;
            }
            offset += n;
        }

        let handler = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.slot.release(StorageOps::STORE);
            if !ok {
                st.slot.latch(StorageOps::STORE_ERROR);
            }
            st.staged.clear();
            st.handler.take()
        });

        if !ok {
            crate::log_warn!("Flash: store verification failed at word {}", addr);
        }
        if let Some(handler) = handler {
            handler(if ok { StoreEvent::Done } else { StoreEvent::Error });
        }
    }

    /// Poll the operation to completion, consuming a latched error once
    fn wait_done(&self) -> Result<()> {
        loop {
            self.process();
            let done = critical_section::with(|cs| {
                let mut st = self.state.borrow_ref_mut(cs);
                if st.slot.is_set(StorageOps::BUSY) {
                    return None;
                }
                if st.slot.is_set(StorageOps::STORE_ERROR) {
                    st.slot.release(StorageOps::STORE_ERROR);
                    return Some(Err(DriverError::StoreError));
                }
                if st.slot.is_set(StorageOps::ERASE_ERROR) {
                    st.slot.release(StorageOps::ERASE_ERROR);
                    return Some(Err(DriverError::EraseError));
                }
                Some(Ok(()))
            });
            if let Some(result) = done {
                return result;
            }
        }
    }
}
