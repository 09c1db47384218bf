//! Core infrastructure
//!
//! The deferred-execution substrate that hands work from interrupt
//! context to the application main loop: the event queue, the software
//! timer service, and the logging macros.

pub mod event_queue;
pub mod logging;
pub mod timer;

pub use event_queue::{EventHandler, EventQueue};
pub use timer::{TimerId, TimerMode, TimerService, TimeoutHandler};
