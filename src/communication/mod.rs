//! Communication interfaces
//!
//! The badge talks to the outside world over serial; the command
//! console in [`console`] is the debug/maintenance surface on top of
//! the transport's ring-receive mode.

pub mod console;

pub use console::{Command, Console, MAX_LINE_LEN};
