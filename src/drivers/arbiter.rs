//! Operation arbitration model
//!
//! Every physical peripheral on the badge is single-owner hardware, but
//! several logical clients want to use it: the console and the sensor
//! uplink share one serial unit, battery monitoring and microphone
//! sampling share the ADC. Instead of queueing requests, each driver
//! keeps one [`Slot`] per peripheral: a bitmask of in-flight operations
//! plus the id of the logical instance whose configuration is currently
//! programmed into the hardware.
//!
//! A submission claims its operation bit and is rejected with
//! [`DriverError::Busy`](crate::DriverError::Busy) if a conflicting bit
//! is already set; nothing is ever queued. When a different instance
//! takes over an idle peripheral ([`Slot::adopt`]), the driver
//! reprograms the hardware with that instance's configuration before
//! starting the operation.
//!
//! Slots are mutated inside `critical_section::with` so interrupt
//! handlers and application code see consistent state. The critical
//! section covers only the bitmask read-modify-write, never hardware
//! access.

use core::cell::{Cell, RefCell};

use bitflags::Flags;
use critical_section::Mutex;

use crate::platform::{DriverError, Result};

static NEXT_INSTANCE_ID: Mutex<Cell<u32>> = Mutex::new(Cell::new(1));

/// Allocate a fresh logical instance id
///
/// Ids are process-wide monotonic and start at 1; id 0 always means
/// "unconfigured" and is never handed out.
pub fn alloc_instance_id() -> u32 {
    critical_section::with(|cs| {
        let next = NEXT_INSTANCE_ID.borrow(cs);
        let id = next.get();
        // 0 stays reserved even if the counter ever wraps
        next.set(match id.wrapping_add(1) {
            0 => 1,
            n => n,
        });
        id
    })
}

/// Arbitration state of one physical peripheral
///
/// `K` is the driver's operation-kind bitflags type. At most one bit per
/// operation class may be set; which kinds conflict is the caller's call
/// via the `conflicts` mask passed to [`claim`](Self::claim).
#[derive(Debug)]
pub struct Slot<K> {
    resident: u32,
    ops: K,
}

impl<K: Flags + Copy> Slot<K> {
    pub fn new() -> Self {
        Self {
            resident: 0,
            ops: K::empty(),
        }
    }

    /// Claim `kind`, failing with `Busy` if any bit in `conflicts` is set
    pub fn claim(&mut self, kind: K, conflicts: K) -> Result<()> {
        if self.ops.intersects(conflicts) {
            return Err(DriverError::Busy);
        }
        self.ops.insert(kind);
        Ok(())
    }

    /// Clear `kind`; idempotent
    pub fn release(&mut self, kind: K) {
        self.ops.remove(kind);
    }

    /// Set a latched status bit outside the conflict protocol
    pub fn latch(&mut self, kind: K) {
        self.ops.insert(kind);
    }

    /// Whether any bit of `kind` is set
    pub fn is_set(&self, kind: K) -> bool {
        self.ops.intersects(kind)
    }

    /// Current operation bits
    pub fn ops(&self) -> K {
        self.ops
    }

    /// Clear and return all operation bits
    pub fn take_ops(&mut self) -> K {
        core::mem::replace(&mut self.ops, K::empty())
    }

    /// Make `instance_id` the resident instance
    ///
    /// Returns true when the resident changed, meaning the caller must
    /// reprogram the peripheral with the new instance's configuration
    /// before use.
    pub fn adopt(&mut self, instance_id: u32) -> bool {
        let changed = self.resident != instance_id;
        self.resident = instance_id;
        changed
    }

    /// Id of the resident instance, 0 when none
    pub fn resident(&self) -> u32 {
        self.resident
    }

    /// True when no operation is in flight
    pub fn idle(&self) -> bool {
        self.ops.is_empty()
    }
}

impl<K: Flags + Copy> Default for Slot<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Slot`] shared between interrupt and application context
///
/// All access goes through [`with`](Self::with), which runs the closure
/// inside a critical section. Drivers whose per-peripheral state is just
/// the slot use this directly; drivers with more state embed a plain
/// [`Slot`] in their own protected state instead.
#[derive(Debug)]
pub struct SharedSlot<K> {
    inner: Mutex<RefCell<Slot<K>>>,
}

impl<K: Flags + Copy> SharedSlot<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Slot::new())),
        }
    }

    /// Run `f` on the slot inside a critical section
    ///
    /// Keep `f` short and never touch hardware from it.
    pub fn with<R>(&self, f: impl FnOnce(&mut Slot<K>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}

impl<K: Flags + Copy> Default for SharedSlot<K> {
    fn default() -> Self {
        Self::new()
    }
}
