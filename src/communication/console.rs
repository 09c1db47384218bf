//! Serial command console
//!
//! Line-oriented ASCII command dispatch for bench debugging and field
//! maintenance. Bytes arrive through the serial transport's ring-receive
//! mode; the main loop drains the ring into the console, which
//! accumulates a line, matches it against a static command table on the
//! terminator, and invokes the matched handler.
//!
//! Lines are at most [`MAX_LINE_LEN`] characters. Overlong input is
//! discarded up to the next terminator so a flood of garbage cannot
//! smear into the following command. Matching is exact and
//! case-sensitive; unmatched lines are logged and ignored.
//!
//! # Example
//!
//! ```
//! use sense_badge::communication::console::{Command, Console};
//!
//! fn restart() { /* reset the badge */ }
//!
//! static COMMANDS: &[Command] = &[Command {
//!     name: "restart",
//!     handler: restart,
//! }];
//!
//! let mut console = Console::new(COMMANDS);
//! for b in b"restart\n" {
//!     console.feed(*b);
//! }
//! ```

use heapless::Vec;

use crate::drivers::serial::{SerialDriver, SerialInstance};
use crate::platform::traits::SerialBus;

/// Longest accepted command line, terminator excluded
pub const MAX_LINE_LEN: usize = 32;

/// One console command
#[derive(Debug, Clone, Copy)]
pub struct Command {
    /// Exact line that triggers the handler
    pub name: &'static str,
    pub handler: fn(),
}

/// Line accumulator and dispatcher over a static command table
#[derive(Debug)]
pub struct Console {
    commands: &'static [Command],
    line: Vec<u8, MAX_LINE_LEN>,
    discarding: bool,
}

impl Console {
    pub fn new(commands: &'static [Command]) -> Self {
        Self {
            commands,
            line: Vec::new(),
            discarding: false,
        }
    }

    /// Drain the instance's receive ring into the console
    ///
    /// Call from the main loop; the ring must have been armed with
    /// [`SerialDriver::receive_into_ring_async`].
    pub fn pump<B: SerialBus, const N: usize>(
        &mut self,
        serial: &SerialDriver<B, N>,
        instance: &SerialInstance,
    ) {
        while let Some(byte) = serial.ring_pop(instance) {
            self.feed(byte);
        }
    }

    /// Feed one received byte
    pub fn feed(&mut self, byte: u8) {
        if byte == b'\n' || byte == b'\r' {
            if self.discarding {
                // The bad line is over; accept input again
                self.discarding = false;
            } else if !self.line.is_empty() {
                self.dispatch();
            }
            self.line.clear();
            return;
        }
        if self.discarding {
            return;
        }
        if self.line.push(byte).is_err() {
            crate::log_warn!("Console: line too long, discarding");
            self.line.clear();
            self.discarding = true;
        }
    }

    fn dispatch(&mut self) {
        let matched = self
            .commands
            .iter()
            .find(|command| command.name.as_bytes() == self.line.as_slice());
        match matched {
            Some(command) => (command.handler)(),
            None => {
                let text = core::str::from_utf8(&self.line).unwrap_or("<binary>");
                crate::log_info!("Console: unmatched command '{}'", text);
            }
        }
    }
}
