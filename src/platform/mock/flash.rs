//! Mock flash backend for testing
//!
//! Simulates NOR flash: erase sets a whole page to `0xFFFF_FFFF`,
//! program can only clear bits. Completions are queued as events the
//! way the radio stack delivers them on the real part, and tests can
//! hold them back, fail them, or cut power mid-program.

use super::dump;
use crate::platform::{
    traits::{FlashBackend, FlashBackendEvent},
    DriverError, Result,
};
use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::vec::Vec;

const DEFAULT_PAGE_SIZE_WORDS: usize = 256;
const DEFAULT_PAGE_COUNT: usize = 30;

/// Mock flash backend
///
/// # Example
///
/// ```
/// use sense_badge::platform::mock::MockFlash;
/// use sense_badge::platform::traits::FlashBackend;
///
/// let flash = MockFlash::new();
/// flash.start_program(0, &[0xDEAD_BEEF]).unwrap();
/// let mut out = [0u32; 1];
/// flash.read_words(0, &mut out).unwrap();
/// assert_eq!(out[0], 0xDEAD_BEEF);
/// ```
#[derive(Debug)]
pub struct MockFlash {
    words: RefCell<Vec<u32>>,
    page_size_words: usize,
    page_count: usize,
    pending: RefCell<VecDeque<FlashBackendEvent>>,
    held: RefCell<VecDeque<FlashBackendEvent>>,
    manual_completion: Cell<bool>,
    erase_counts: RefCell<Vec<u32>>,
    fail_next_erase: Cell<bool>,
    fail_next_program: Cell<bool>,
    power_loss_after: Cell<Option<usize>>,
}

impl MockFlash {
    /// Create a mock with the badge's flash geometry (30 pages of 256 words)
    pub fn new() -> Self {
        Self::with_geometry(DEFAULT_PAGE_SIZE_WORDS, DEFAULT_PAGE_COUNT)
    }

    /// Create a mock with explicit geometry
    pub fn with_geometry(page_size_words: usize, page_count: usize) -> Self {
        let mut words = Vec::new();
        words.resize(page_size_words * page_count, 0xFFFF_FFFF);
        let mut erase_counts = Vec::new();
        erase_counts.resize(page_count, 0);
        Self {
            words: RefCell::new(words),
            page_size_words,
            page_count,
            pending: RefCell::new(VecDeque::new()),
            held: RefCell::new(VecDeque::new()),
            manual_completion: Cell::new(false),
            erase_counts: RefCell::new(erase_counts),
            fail_next_erase: Cell::new(false),
            fail_next_program: Cell::new(false),
            power_loss_after: Cell::new(None),
        }
    }

    /// Hold completions back until [`complete_next`](Self::complete_next)
    pub fn set_manual_completion(&self, manual: bool) {
        self.manual_completion.set(manual);
    }

    /// Release the oldest held completion
    pub fn complete_next(&self) {
        if let Some(ev) = self.held.borrow_mut().pop_front() {
            self.pending.borrow_mut().push_back(ev);
        }
    }

    /// Report failure for the next erase
    pub fn fail_next_erase(&self) {
        self.fail_next_erase.set(true);
    }

    /// Report failure for the next program
    pub fn fail_next_program(&self) {
        self.fail_next_program.set(true);
    }

    /// Cut power during the next program: only the first `words` words
    /// reach the array, but the completion still claims success. Only a
    /// read-back verification can tell.
    pub fn set_power_loss_after(&self, words: usize) {
        self.power_loss_after.set(Some(words));
    }

    /// Overwrite words directly, bypassing NOR semantics (test seeding)
    pub fn preload(&self, word_addr: usize, words: &[u32]) {
        let mut mem = self.words.borrow_mut();
        mem[word_addr..word_addr + words.len()].copy_from_slice(words);
    }

    /// How many times a page has been erased
    pub fn erase_count(&self, page: usize) -> u32 {
        self.erase_counts.borrow()[page]
    }

    /// Save the array as a human-readable hexdump, words little-endian
    pub fn save_dump<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let words = self.words.borrow();
        let mut bytes = Vec::new();
        for w in words.iter() {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        dump::save(path, &bytes)
    }

    fn push_event(&self, ev: FlashBackendEvent) {
        if self.manual_completion.get() {
            self.held.borrow_mut().push_back(ev);
        } else {
            self.pending.borrow_mut().push_back(ev);
        }
    }
}

impl Default for MockFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashBackend for MockFlash {
    fn page_size_words(&self) -> usize {
        self.page_size_words
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn start_erase(&self, page: usize) -> Result<()> {
        if page >= self.page_count {
            return Err(DriverError::InvalidParam);
        }
        if self.fail_next_erase.take() {
            self.push_event(FlashBackendEvent::EraseDone { success: false });
            return Ok(());
        }
        {
            let mut mem = self.words.borrow_mut();
            let start = page * self.page_size_words;
            for w in mem[start..start + self.page_size_words].iter_mut() {
                *w = 0xFFFF_FFFF;
            }
        }
        self.erase_counts.borrow_mut()[page] += 1;
        self.push_event(FlashBackendEvent::EraseDone { success: true });
        Ok(())
    }

    fn start_program(&self, word_addr: usize, words: &[u32]) -> Result<()> {
        let mut mem = self.words.borrow_mut();
        if word_addr + words.len() > mem.len() {
            return Err(DriverError::InvalidParam);
        }
        if self.fail_next_program.take() {
            drop(mem);
            self.push_event(FlashBackendEvent::ProgramDone { success: false });
            return Ok(());
        }
        let retained = match self.power_loss_after.take() {
            Some(n) => n.min(words.len()),
            None => words.len(),
        };
        for (i, &w) in words[..retained].iter().enumerate() {
            // NOR program: bits only clear
            mem[word_addr + i] &= w;
        }
        drop(mem);
        self.push_event(FlashBackendEvent::ProgramDone { success: true });
        Ok(())
    }

    fn read_words(&self, word_addr: usize, out: &mut [u32]) -> Result<()> {
        let mem = self.words.borrow();
        if word_addr + out.len() > mem.len() {
            return Err(DriverError::InvalidParam);
        }
        out.copy_from_slice(&mem[word_addr..word_addr + out.len()]);
        Ok(())
    }

    fn poll_event(&self) -> Option<FlashBackendEvent> {
        self.pending.borrow_mut().pop_front()
    }
}
