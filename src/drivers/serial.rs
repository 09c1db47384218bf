//! Serial transport driver
//!
//! Non-blocking transmit and receive over the badge's shared serial
//! peripherals, built on the arbitration model in
//! [`arbiter`](crate::drivers::arbiter). The hardware moves at most
//! [`MAX_BURST_LEN`] bytes per transfer, so longer transmissions are
//! staged in the driver and sent as a chain of bursts, each programmed
//! from the previous burst's completion event.
//!
//! Three operation kinds exist per peripheral: `TRANSMIT`, fixed-length
//! `RECEIVE`, and `RECEIVE_RING` (open-ended reception into a ring
//! buffer, used by the command console). Transmit may run alongside
//! either receive kind; two operations of the same class are rejected
//! with `Busy`.
//!
//! Callers' buffers are copied into per-peripheral staging at submit
//! time, so no caller memory is borrowed across the asynchronous
//! operation. Completion handlers are plain `fn` pointers invoked
//! outside the critical section, from whichever context pumps
//! [`SerialDriver::process`].
//!
//! # Example
//!
//! ```
//! use sense_badge::drivers::serial::SerialDriver;
//! use sense_badge::platform::mock::MockSerial;
//! use sense_badge::platform::traits::SerialConfig;
//!
//! let driver: SerialDriver<MockSerial, 2> = SerialDriver::new(MockSerial::new(2));
//! let console = driver.configure(0, SerialConfig::default()).unwrap();
//! driver.transmit(&console, b"badge ready\r\n").unwrap();
//! assert_eq!(driver.bus().written(0), b"badge ready\r\n");
//! ```

use core::cell::RefCell;

use bitflags::bitflags;
use critical_section::Mutex;
use heapless::spsc::Queue;
use heapless::Vec;

use crate::drivers::arbiter::{alloc_instance_id, Slot};
use crate::platform::traits::{SerialBus, SerialBusEvent, SerialConfig, MAX_BURST_LEN};
use crate::platform::{DriverError, Result};

/// Transmit staging capacity per peripheral
pub const TX_STAGE_BYTES: usize = 512;

/// Fixed-length receive staging capacity per peripheral
pub const RX_STAGE_BYTES: usize = MAX_BURST_LEN;

/// Ring buffer slots per peripheral; one slot stays unused to tell
/// full from empty, so `RX_RING_BYTES - 1` bytes are buffered at most
pub const RX_RING_BYTES: usize = 128;

bitflags! {
    /// In-flight operation kinds of one serial peripheral
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SerialOps: u8 {
        const TRANSMIT = 1 << 0;
        const RECEIVE = 1 << 1;
        const RECEIVE_RING = 1 << 2;
    }
}

const RECEIVE_CLASS: SerialOps = SerialOps::RECEIVE.union(SerialOps::RECEIVE_RING);

/// Completion events delivered to serial handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialEvent<'a> {
    /// The staged transmission went out completely
    TxDone,
    /// A fixed-length receive completed; the payload is only valid for
    /// the duration of the call
    RxDone(&'a [u8]),
    /// A byte was appended to the receive ring
    RingByte(u8),
    /// The operation was torn down by a hardware error
    Error,
}

/// Completion handler; may be invoked from interrupt context
pub type SerialHandler = fn(SerialEvent<'_>);

/// A logical client of one serial peripheral
///
/// Created by [`SerialDriver::configure`]; carries the configuration the
/// driver programs into the hardware when this instance takes the
/// peripheral over from another one.
#[derive(Debug, Clone)]
pub struct SerialInstance {
    id: u32,
    peripheral: usize,
    config: SerialConfig,
}

impl SerialInstance {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn peripheral(&self) -> usize {
        self.peripheral
    }
}

#[derive(Debug)]
struct TxTransfer {
    data: Vec<u8, TX_STAGE_BYTES>,
    cursor: usize,
    burst: usize,
}

#[derive(Debug)]
struct RxTransfer {
    data: Vec<u8, RX_STAGE_BYTES>,
    wanted: usize,
}

#[derive(Debug)]
struct PeripheralState {
    slot: Slot<SerialOps>,
    tx: TxTransfer,
    rx: RxTransfer,
    ring: Queue<u8, RX_RING_BYTES>,
    ring_dropped: u32,
    tx_handler: Option<SerialHandler>,
    rx_handler: Option<SerialHandler>,
    ring_handler: Option<SerialHandler>,
    error_latch: SerialOps,
}

impl PeripheralState {
    fn new() -> Self {
        Self {
            slot: Slot::new(),
            tx: TxTransfer {
                data: Vec::new(),
                cursor: 0,
                burst: 0,
            },
            rx: RxTransfer {
                data: Vec::new(),
                wanted: 0,
            },
            ring: Queue::new(),
            ring_dropped: 0,
            tx_handler: None,
            rx_handler: None,
            ring_handler: None,
            error_latch: SerialOps::empty(),
        }
    }
}

enum TxAction {
    NextBurst,
    Done(Option<SerialHandler>),
    Ignore,
}

enum RxAction {
    Done(Option<SerialHandler>, usize),
    Notify(Option<SerialHandler>, u8),
    Ignore,
}

/// Serial transport driver for `N` peripherals sharing one bus backend
#[derive(Debug)]
pub struct SerialDriver<B, const N: usize> {
    bus: B,
    states: [Mutex<RefCell<PeripheralState>>; N],
}

impl<B: SerialBus, const N: usize> SerialDriver<B, N> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            states: core::array::from_fn(|_| Mutex::new(RefCell::new(PeripheralState::new()))),
        }
    }

    /// The backend, mainly for test inspection
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Create a logical instance targeting `peripheral`
    ///
    /// Allocates a fresh instance id; does not touch the hardware. The
    /// config is programmed lazily, when the instance's first operation
    /// takes the peripheral over.
    pub fn configure(&self, peripheral: usize, config: SerialConfig) -> Result<SerialInstance> {
        if peripheral >= N {
            return Err(DriverError::InvalidParam);
        }
        Ok(SerialInstance {
            id: alloc_instance_id(),
            peripheral,
            config,
        })
    }

    /// Submit an asynchronous transmission of `data`
    ///
    /// Claims the transmit bit (`Busy` if a transmission is in flight),
    /// stages a copy of `data` and programs the first burst. `handler`,
    /// if any, is invoked with [`SerialEvent::TxDone`] after the last
    /// burst, or [`SerialEvent::Error`] if the bus fails underway.
    pub fn transmit_async(
        &self,
        instance: &SerialInstance,
        data: &[u8],
        handler: Option<SerialHandler>,
    ) -> Result<()> {
        self.check_instance(instance)?;
        if data.is_empty() {
            return Err(DriverError::InvalidParam);
        }
        if data.len() > TX_STAGE_BYTES {
            return Err(DriverError::InvalidLength);
        }
        let p = instance.peripheral;

        let needs_config = critical_section::with(|cs| {
            let mut st = self.states[p].borrow_ref_mut(cs);
            st.slot.claim(SerialOps::TRANSMIT, SerialOps::TRANSMIT)?;
            st.error_latch.remove(SerialOps::TRANSMIT);
            st.tx.data.clear();
            // Length checked above, cannot fail
            let _ = st.tx.data.extend_from_slice(data);
            st.tx.cursor = 0;
            st.tx.burst = 0;
            st.tx_handler = handler;
            Ok::<bool, DriverError>(st.slot.adopt(instance.id))
        })?;

        if needs_config {
            if let Err(e) = self.bus.apply_config(p, &instance.config) {
                self.unwind_claim(p, SerialOps::TRANSMIT);
                return Err(e);
            }
        }
        if let Err(e) = self.start_next_burst(p) {
            self.unwind_claim(p, SerialOps::TRANSMIT);
            return Err(e);
        }
        Ok(())
    }

    /// Submit an asynchronous fixed-length receive of `len` bytes
    ///
    /// Bytes accumulate in driver staging; on completion `handler` gets
    /// [`SerialEvent::RxDone`] with the received bytes. Without a
    /// handler the bytes stay staged for [`take_received`](Self::take_received).
    pub fn receive_async(
        &self,
        instance: &SerialInstance,
        len: usize,
        handler: Option<SerialHandler>,
    ) -> Result<()> {
        self.check_instance(instance)?;
        if len == 0 {
            return Err(DriverError::InvalidParam);
        }
        if len > RX_STAGE_BYTES {
            return Err(DriverError::InvalidLength);
        }
        let p = instance.peripheral;

        let needs_config = critical_section::with(|cs| {
            let mut st = self.states[p].borrow_ref_mut(cs);
            st.slot.claim(SerialOps::RECEIVE, RECEIVE_CLASS)?;
            st.error_latch.remove(SerialOps::RECEIVE);
            st.rx.data.clear();
            st.rx.wanted = len;
            st.rx_handler = handler;
            Ok::<bool, DriverError>(st.slot.adopt(instance.id))
        })?;

        if needs_config {
            if let Err(e) = self.bus.apply_config(p, &instance.config) {
                self.unwind_claim(p, SerialOps::RECEIVE);
                return Err(e);
            }
        }
        if let Err(e) = self.bus.enable_receiver(p) {
            self.unwind_claim(p, SerialOps::RECEIVE);
            return Err(e);
        }
        Ok(())
    }

    /// Arm open-ended reception into the peripheral's ring buffer
    ///
    /// Stays armed until [`abort`](Self::abort) or a bus error. Each
    /// appended byte notifies `handler` with [`SerialEvent::RingByte`];
    /// bytes arriving while the ring is full are dropped. Ring contents
    /// survive re-arming, so a consumer can drain at its own pace.
    pub fn receive_into_ring_async(
        &self,
        instance: &SerialInstance,
        handler: Option<SerialHandler>,
    ) -> Result<()> {
        self.check_instance(instance)?;
        let p = instance.peripheral;

        let needs_config = critical_section::with(|cs| {
            let mut st = self.states[p].borrow_ref_mut(cs);
            st.slot.claim(SerialOps::RECEIVE_RING, RECEIVE_CLASS)?;
            st.error_latch.remove(SerialOps::RECEIVE_RING);
            st.ring_handler = handler;
            Ok::<bool, DriverError>(st.slot.adopt(instance.id))
        })?;

        if needs_config {
            if let Err(e) = self.bus.apply_config(p, &instance.config) {
                self.unwind_claim(p, SerialOps::RECEIVE_RING);
                return Err(e);
            }
        }
        if let Err(e) = self.bus.enable_receiver(p) {
            self.unwind_claim(p, SerialOps::RECEIVE_RING);
            return Err(e);
        }
        Ok(())
    }

    /// Cancel everything this instance has in flight
    ///
    /// Fails with `InvalidState` unless `instance` is the resident one.
    /// Clears all operation bits and tears the hardware operation down
    /// without invoking any handler. Ring contents are preserved.
    pub fn abort(&self, instance: &SerialInstance) -> Result<()> {
        self.check_instance(instance)?;
        let p = instance.peripheral;

        let ops = critical_section::with(|cs| {
            let mut st = self.states[p].borrow_ref_mut(cs);
            if st.slot.resident() != instance.id {
                return Err(DriverError::InvalidState);
            }
            let ops = st.slot.take_ops();
            st.tx_handler = None;
            st.rx_handler = None;
            st.ring_handler = None;
            st.tx.data.clear();
            st.tx.cursor = 0;
            st.tx.burst = 0;
            st.rx.data.clear();
            st.rx.wanted = 0;
            Ok(ops)
        })?;

        if ops.contains(SerialOps::TRANSMIT) {
            self.bus.cancel_write(p);
        }
        if ops.intersects(RECEIVE_CLASS) {
            self.bus.disable_receiver(p);
        }
        Ok(())
    }

    /// Blocking transmit; loops staged slices so any length goes out
    pub fn transmit(&self, instance: &SerialInstance, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(DriverError::InvalidParam);
        }
        for chunk in data.chunks(TX_STAGE_BYTES) {
            self.transmit_async(instance, chunk, None)?;
            self.wait_idle(instance.peripheral, SerialOps::TRANSMIT)?;
        }
        Ok(())
    }

    /// Blocking receive of exactly `buf.len()` bytes
    pub fn receive(&self, instance: &SerialInstance, buf: &mut [u8]) -> Result<usize> {
        self.receive_async(instance, buf.len(), None)?;
        self.wait_idle(instance.peripheral, SerialOps::RECEIVE)?;
        Ok(self.take_received(instance, buf))
    }

    /// Copy out and clear the bytes staged by a completed receive
    ///
    /// Returns how many bytes were copied. Intended for callers that
    /// submitted [`receive_async`](Self::receive_async) without a
    /// handler and polled for completion themselves.
    pub fn take_received(&self, instance: &SerialInstance, buf: &mut [u8]) -> usize {
        critical_section::with(|cs| {
            let mut st = self.states[instance.peripheral].borrow_ref_mut(cs);
            let n = st.rx.data.len().min(buf.len());
            buf[..n].copy_from_slice(&st.rx.data[..n]);
            st.rx.data.clear();
            n
        })
    }

    /// Pop the oldest byte from the peripheral's receive ring
    pub fn ring_pop(&self, instance: &SerialInstance) -> Option<u8> {
        critical_section::with(|cs| {
            self.states[instance.peripheral]
                .borrow_ref_mut(cs)
                .ring
                .dequeue()
        })
    }

    /// How many bytes the ring currently holds
    pub fn ring_len(&self, instance: &SerialInstance) -> usize {
        critical_section::with(|cs| self.states[instance.peripheral].borrow_ref(cs).ring.len())
    }

    /// How many received bytes were dropped because the ring was full
    pub fn ring_dropped(&self, instance: &SerialInstance) -> u32 {
        critical_section::with(|cs| {
            self.states[instance.peripheral]
                .borrow_ref(cs)
                .ring_dropped
        })
    }

    /// Drain and dispatch all pending backend events for `peripheral`
    ///
    /// The blocking wrappers call this while they poll; on hardware the
    /// interrupt handler calls it via [`on_interrupt`](Self::on_interrupt).
    pub fn process(&self, peripheral: usize) {
        while let Some(event) = self.bus.poll_event(peripheral) {
            self.handle_event(peripheral, event);
        }
    }

    /// Interrupt entry point for `peripheral`
    pub fn on_interrupt(&self, peripheral: usize) {
        self.process(peripheral);
    }

    fn check_instance(&self, instance: &SerialInstance) -> Result<()> {
        if instance.id == 0 {
            return Err(DriverError::InvalidInstance);
        }
        if instance.peripheral >= N {
            return Err(DriverError::InvalidParam);
        }
        Ok(())
    }

    /// Roll a failed submission back so the slot is usable again
    fn unwind_claim(&self, peripheral: usize, kind: SerialOps) {
        critical_section::with(|cs| {
            let mut st = self.states[peripheral].borrow_ref_mut(cs);
            st.slot.release(kind);
            match kind {
                SerialOps::TRANSMIT => st.tx_handler = None,
                SerialOps::RECEIVE => st.rx_handler = None,
                _ => st.ring_handler = None,
            }
            // The config may be half-applied; force a reprogram next time
            st.slot.adopt(0);
        });
    }

    /// Program the next staged chunk, at most one hardware burst
    fn start_next_burst(&self, peripheral: usize) -> Result<()> {
        let mut chunk = [0u8; MAX_BURST_LEN];
        let len = critical_section::with(|cs| {
            let mut st = self.states[peripheral].borrow_ref_mut(cs);
            let remaining = st.tx.data.len() - st.tx.cursor;
            let len = remaining.min(MAX_BURST_LEN);
            chunk[..len].copy_from_slice(&st.tx.data[st.tx.cursor..st.tx.cursor + len]);
            st.tx.burst = len;
            len
        });
        self.bus.start_write(peripheral, &chunk[..len])
    }

    fn handle_event(&self, peripheral: usize, event: SerialBusEvent) {
        match event {
            SerialBusEvent::WriteDone => self.on_write_done(peripheral),
            SerialBusEvent::ByteReceived(byte) => self.on_byte(peripheral, byte),
            SerialBusEvent::Error => self.on_bus_error(peripheral),
        }
    }

    fn on_write_done(&self, peripheral: usize) {
        let action = critical_section::with(|cs| {
            let mut st = self.states[peripheral].borrow_ref_mut(cs);
            if !st.slot.is_set(SerialOps::TRANSMIT) {
                return TxAction::Ignore;
            }
            st.tx.cursor += core::mem::take(&mut st.tx.burst);
            if st.tx.cursor >= st.tx.data.len() {
                st.slot.release(SerialOps::TRANSMIT);
                st.tx.data.clear();
                st.tx.cursor = 0;
                TxAction::Done(st.tx_handler.take())
            } else {
                TxAction::NextBurst
            }
        });

        match action {
            TxAction::NextBurst => {
                if self.start_next_burst(peripheral).is_err() {
                    self.fail_op(peripheral, SerialOps::TRANSMIT);
                }
            }
            TxAction::Done(handler) => {
                if let Some(handler) = handler {
                    handler(SerialEvent::TxDone);
                }
            }
            TxAction::Ignore => {}
        }
    }

    fn on_byte(&self, peripheral: usize, byte: u8) {
        let mut done_buf = [0u8; RX_STAGE_BYTES];
        let action = critical_section::with(|cs| {
            let mut st = self.states[peripheral].borrow_ref_mut(cs);
            if st.slot.is_set(SerialOps::RECEIVE) {
                // Wanted length was validated at submit, push cannot fail
                let _ = st.rx.data.push(byte);
                if st.rx.data.len() >= st.rx.wanted {
                    st.slot.release(SerialOps::RECEIVE);
                    let handler = st.rx_handler.take();
                    if handler.is_some() {
                        let n = st.rx.data.len();
                        done_buf[..n].copy_from_slice(&st.rx.data);
                        st.rx.data.clear();
                        return RxAction::Done(handler, n);
                    }
                    // No handler: leave the bytes staged for take_received
                    return RxAction::Done(None, 0);
                }
                RxAction::Ignore
            } else if st.slot.is_set(SerialOps::RECEIVE_RING) {
                if st.ring.enqueue(byte).is_ok() {
                    RxAction::Notify(st.ring_handler, byte)
                } else {
                    st.ring_dropped = st.ring_dropped.wrapping_add(1);
                    RxAction::Ignore
                }
            } else {
                // Receiver was torn down with this byte already in flight
                RxAction::Ignore
            }
        });

        match action {
            RxAction::Done(handler, n) => {
                self.bus.disable_receiver(peripheral);
                if let Some(handler) = handler {
                    handler(SerialEvent::RxDone(&done_buf[..n]));
                }
            }
            RxAction::Notify(handler, byte) => {
                if let Some(handler) = handler {
                    handler(SerialEvent::RingByte(byte));
                }
            }
            RxAction::Ignore => {}
        }
    }

    /// Hardware error: tear down every in-flight operation and notify
    /// each owner exactly once
    fn on_bus_error(&self, peripheral: usize) {
        let (ops, handlers) = critical_section::with(|cs| {
            let mut st = self.states[peripheral].borrow_ref_mut(cs);
            let ops = st.slot.take_ops();
            st.error_latch.insert(ops);
            let handlers = [
                ops.contains(SerialOps::TRANSMIT)
                    .then(|| st.tx_handler.take())
                    .flatten(),
                ops.contains(SerialOps::RECEIVE)
                    .then(|| st.rx_handler.take())
                    .flatten(),
                ops.contains(SerialOps::RECEIVE_RING)
                    .then(|| st.ring_handler.take())
                    .flatten(),
            ];
            st.tx.data.clear();
            st.tx.cursor = 0;
            st.tx.burst = 0;
            st.rx.data.clear();
            st.rx.wanted = 0;
            (ops, handlers)
        });

        if ops.is_empty() {
            return;
        }
        crate::log_warn!("Serial: bus error on peripheral {}", peripheral);
        if ops.contains(SerialOps::TRANSMIT) {
            self.bus.cancel_write(peripheral);
        }
        if ops.intersects(RECEIVE_CLASS) {
            self.bus.disable_receiver(peripheral);
        }
        for handler in handlers.into_iter().flatten() {
            handler(SerialEvent::Error);
        }
    }

    /// A chained burst failed to start; end the operation with an error
    fn fail_op(&self, peripheral: usize, kind: SerialOps) {
        let handler = critical_section::with(|cs| {
            let mut st = self.states[peripheral].borrow_ref_mut(cs);
            st.slot.release(kind);
            st.error_latch.insert(kind);
            st.tx.data.clear();
            st.tx.cursor = 0;
            st.tx.burst = 0;
            st.tx_handler.take()
        });
        if let Some(handler) = handler {
            handler(SerialEvent::Error);
        }
    }

    /// Busy-poll until `kind` clears, pumping backend events; surfaces
    /// an error ending at most once
    fn wait_idle(&self, peripheral: usize, kind: SerialOps) -> Result<()> {
        loop {
            self.process(peripheral);
            let state = critical_section::with(|cs| {
                let mut st = self.states[peripheral].borrow_ref_mut(cs);
                if st.slot.is_set(kind) {
                    return None;
                }
                let failed = st.error_latch.intersects(kind);
                st.error_latch.remove(kind);
                Some(failed)
            });
            match state {
                Some(true) => return Err(DriverError::Internal),
                Some(false) => return Ok(()),
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockSerial;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn driver() -> SerialDriver<MockSerial, 2> {
        SerialDriver::new(MockSerial::new(2))
    }

    #[test]
    fn test_transmit_chunks_into_bursts() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        let data = [0xA5u8; 300];
        drv.transmit(&inst, &data).unwrap();
        assert_eq!(drv.bus().written(0), &data[..]);
        assert_eq!(drv.bus().bursts(0), vec![255, 45]);
    }

    #[test]
    fn test_transmit_exact_burst_is_single() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.transmit(&inst, &[1u8; 255]).unwrap();
        assert_eq!(drv.bus().bursts(0), vec![255]);
    }

    #[test]
    fn test_blocking_transmit_exceeding_staging_loops() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        let data = [7u8; TX_STAGE_BYTES + 100];
        drv.transmit(&inst, &data).unwrap();
        assert_eq!(drv.bus().written(0).len(), data.len());
        assert_eq!(drv.bus().bursts(0), vec![255, 255, 2, 100]);
    }

    #[test]
    fn test_transmit_async_rejects_oversized() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        let data = [0u8; TX_STAGE_BYTES + 1];
        assert_eq!(
            drv.transmit_async(&inst, &data, None),
            Err(DriverError::InvalidLength)
        );
    }

    #[test]
    fn test_transmit_busy_until_completion() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.bus().set_manual_completion(true);
        drv.transmit_async(&inst, b"first", None).unwrap();
        assert_eq!(
            drv.transmit_async(&inst, b"second", None),
            Err(DriverError::Busy)
        );
        drv.bus().complete_write(0);
        drv.process(0);
        drv.transmit_async(&inst, b"second", None).unwrap();
        drv.bus().complete_write(0);
        drv.process(0);
        assert_eq!(drv.bus().written(0), b"firstsecond");
    }

    #[test]
    fn test_adoption_reprograms_config_on_owner_change_only() {
        let drv = driver();
        let a = drv
            .configure(
                0,
                SerialConfig {
                    baud_rate: 9_600,
                    ..SerialConfig::default()
                },
            )
            .unwrap();
        let b = drv
            .configure(
                0,
                SerialConfig {
                    baud_rate: 115_200,
                    ..SerialConfig::default()
                },
            )
            .unwrap();

        drv.transmit(&a, b"1").unwrap();
        drv.transmit(&a, b"2").unwrap();
        drv.transmit(&b, b"3").unwrap();
        drv.transmit(&b, b"4").unwrap();

        let bauds: std::vec::Vec<u32> = drv.bus().configs(0).iter().map(|c| c.baud_rate).collect();
        assert_eq!(bauds, vec![9_600, 115_200]);
    }

    #[test]
    fn test_transmit_and_receive_ring_coexist() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.receive_into_ring_async(&inst, None).unwrap();
        drv.transmit(&inst, b"out").unwrap();
        drv.bus().inject_rx(0, b"in");
        drv.process(0);
        assert_eq!(drv.ring_pop(&inst), Some(b'i'));
        assert_eq!(drv.ring_pop(&inst), Some(b'n'));
    }

    #[test]
    fn test_two_receives_conflict() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.receive_into_ring_async(&inst, None).unwrap();
        assert_eq!(
            drv.receive_async(&inst, 4, None),
            Err(DriverError::Busy)
        );
    }

    #[test]
    fn test_blocking_receive_round_trip() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.bus().set_manual_completion(true);
        drv.receive_async(&inst, 4, None).unwrap();
        drv.bus().inject_rx(0, b"wxyz");
        drv.process(0);
        let mut buf = [0u8; 4];
        assert_eq!(drv.take_received(&inst, &mut buf), 4);
        assert_eq!(&buf, b"wxyz");
        // Completion released the receive bit
        drv.receive_async(&inst, 1, None).unwrap();
    }

    #[test]
    fn test_receive_handler_gets_payload() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        fn on_rx(event: SerialEvent<'_>) {
            if let SerialEvent::RxDone(bytes) = event {
                assert_eq!(bytes, b"ok");
                SEEN.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.receive_async(&inst, 2, Some(on_rx)).unwrap();
        drv.bus().inject_rx(0, b"ok");
        drv.process(0);
        assert_eq!(SEEN.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ring_saturates_at_capacity_minus_one() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.receive_into_ring_async(&inst, None).unwrap();

        let mut flood = vec![0u8; RX_RING_BYTES + 50];
        for (i, b) in flood.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        drv.bus().inject_rx(0, &flood);
        drv.process(0);

        assert_eq!(drv.ring_len(&inst), RX_RING_BYTES - 1);
        assert_eq!(drv.ring_dropped(&inst), 51);
        // Oldest bytes are the ones preserved
        for expected in flood.iter().take(RX_RING_BYTES - 1) {
            assert_eq!(drv.ring_pop(&inst), Some(*expected));
        }
        assert_eq!(drv.ring_pop(&inst), None);
    }

    #[test]
    fn test_abort_requires_residency() {
        let drv = driver();
        let a = drv.configure(0, SerialConfig::default()).unwrap();
        let b = drv.configure(0, SerialConfig::default()).unwrap();
        drv.bus().set_manual_completion(true);
        drv.transmit_async(&a, b"hold", None).unwrap();
        assert_eq!(drv.abort(&b), Err(DriverError::InvalidState));
        drv.abort(&a).unwrap();
        // Slot is free again
        drv.transmit_async(&a, b"next", None).unwrap();
    }

    #[test]
    fn test_abort_does_not_invoke_handler() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn on_tx(_event: SerialEvent<'_>) {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.bus().set_manual_completion(true);
        drv.transmit_async(&inst, b"doomed", Some(on_tx)).unwrap();
        drv.abort(&inst).unwrap();
        drv.bus().complete_write(0);
        drv.process(0);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bus_error_notifies_each_operation_once() {
        static ERRORS: AtomicUsize = AtomicUsize::new(0);
        fn on_event(event: SerialEvent<'_>) {
            if event == SerialEvent::Error {
                ERRORS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.bus().set_manual_completion(true);
        drv.transmit_async(&inst, b"x", Some(on_event)).unwrap();
        drv.receive_into_ring_async(&inst, Some(on_event)).unwrap();
        drv.bus().raise_error(0);
        drv.process(0);
        assert_eq!(ERRORS.load(Ordering::SeqCst), 2);
        // Both classes are free again after the teardown
        drv.transmit_async(&inst, b"y", None).unwrap();
        drv.receive_async(&inst, 1, None).unwrap();
    }

    #[test]
    fn test_blocking_transmit_surfaces_bus_error() {
        let drv = driver();
        let inst = drv.configure(0, SerialConfig::default()).unwrap();
        drv.transmit(&inst, b"warmup").unwrap();
        drv.bus().set_fail_writes(true);
        assert_eq!(drv.transmit(&inst, b"z"), Err(DriverError::Internal));
        drv.bus().set_fail_writes(false);
        // The failed submission released the slot
        drv.transmit(&inst, b"again").unwrap();
    }

    #[test]
    fn test_peripherals_are_independent() {
        let drv = driver();
        let a = drv.configure(0, SerialConfig::default()).unwrap();
        let b = drv.configure(1, SerialConfig::default()).unwrap();
        drv.bus().set_manual_completion(true);
        drv.transmit_async(&a, b"one", None).unwrap();
        // Peripheral 1 is not affected by 0 being busy
        drv.transmit_async(&b, b"two", None).unwrap();
        assert_eq!(drv.bus().written(1), b"two");
    }

    #[test]
    fn test_configure_rejects_bad_peripheral() {
        let drv = driver();
        assert_eq!(
            drv.configure(2, SerialConfig::default()).err(),
            Some(DriverError::InvalidParam)
        );
    }
}
