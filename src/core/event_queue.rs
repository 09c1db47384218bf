//! Deferred-execution event queue
//!
//! Interrupt handlers on the badge do as little as possible: they push a
//! handler plus a small payload here and return. The application main
//! loop calls [`EventQueue::drain`] to run everything that accumulated,
//! in arrival order, outside interrupt context.
//!
//! Payload bytes are copied into queue-owned storage at enqueue time, so
//! producers never leave a pointer behind. Capacity and the per-entry
//! payload limit are const parameters.
//!
//! # Example
//!
//! ```
//! use sense_badge::core::event_queue::EventQueue;
//!
//! static QUEUE: EventQueue<8, 16> = EventQueue::new();
//!
//! fn on_sample(payload: &[u8]) {
//!     // runs in the main loop
//!     let _ = payload;
//! }
//!
//! QUEUE.enqueue(on_sample, &[0x12, 0x34]).unwrap();
//! QUEUE.drain();
//! assert!(QUEUE.is_empty());
//! ```

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::{Deque, Vec};

use crate::platform::{DriverError, Result};

/// Deferred event handler, invoked with the payload captured at enqueue
pub type EventHandler = fn(&[u8]);

#[derive(Clone)]
struct Entry<const MAX_PAYLOAD: usize> {
    handler: EventHandler,
    payload: Vec<u8, MAX_PAYLOAD>,
}

/// FIFO of deferred events, safe to fill from interrupt context
pub struct EventQueue<const CAP: usize, const MAX_PAYLOAD: usize> {
    entries: Mutex<RefCell<Deque<Entry<MAX_PAYLOAD>, CAP>>>,
}

impl<const CAP: usize, const MAX_PAYLOAD: usize> EventQueue<CAP, MAX_PAYLOAD> {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// How many more events fit right now
    pub fn space_remaining(&self) -> usize {
        CAP - self.len()
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.entries.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an event; the payload is copied into the queue
    ///
    /// Fails with `InvalidLength` when the payload exceeds the per-entry
    /// limit and `NoMemory` when the queue is full. Callable from
    /// interrupt context.
    pub fn enqueue(&self, handler: EventHandler, payload: &[u8]) -> Result<()> {
        let mut entry = Entry {
            handler,
            payload: Vec::new(),
        };
        entry
            .payload
            .extend_from_slice(payload)
            .map_err(|_| DriverError::InvalidLength)?;
        critical_section::with(|cs| {
            self.entries
                .borrow_ref_mut(cs)
                .push_back(entry)
                .map_err(|_| DriverError::NoMemory)
        })
    }

    /// Run and remove every queued event in FIFO order until empty
    ///
    /// Events enqueued by a running handler are drained in the same
    /// call. An entry's slot is freed only after its handler returns, so
    /// a handler inspecting the queue still sees its own entry counted.
    /// Call from the main loop only; not reentrant from a handler.
    pub fn drain(&self) {
        loop {
            let entry = critical_section::with(|cs| self.entries.borrow_ref(cs).front().cloned());
            let Some(entry) = entry else {
                break;
            };
            (entry.handler)(&entry.payload);
            critical_section::with(|cs| {
                self.entries.borrow_ref_mut(cs).pop_front();
            });
        }
    }
}

impl<const CAP: usize, const MAX_PAYLOAD: usize> Default for EventQueue<CAP, MAX_PAYLOAD> {
    fn default() -> Self {
        Self::new()
    }
}
