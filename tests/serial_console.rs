//! End-to-end exercises of the serial transport, console, deferred
//! execution and timers cooperating the way the badge main loop drives
//! them: interrupt-side handlers only record work, the loop performs it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use sense_badge::communication::console::{Command, Console};
use sense_badge::core::event_queue::EventQueue;
use sense_badge::core::timer::{TimerMode, TimerService};
use sense_badge::drivers::serial::{SerialDriver, SerialEvent, RX_RING_BYTES};
use sense_badge::platform::mock::{MockSerial, MockTicker};
use sense_badge::platform::traits::SerialConfig;

#[test]
fn test_console_command_drives_main_loop_response() {
    static STATUS_REQUESTED: AtomicBool = AtomicBool::new(false);
    fn on_status() {
        STATUS_REQUESTED.store(true, Ordering::Relaxed);
    }
    static COMMANDS: &[Command] = &[Command {
        name: "status",
        handler: on_status,
    }];

    let drv = SerialDriver::<MockSerial, 1>::new(MockSerial::new(1));
    let inst = drv.configure(0, SerialConfig::default()).unwrap();
    let mut console = Console::new(COMMANDS);

    drv.receive_into_ring_async(&inst, None).unwrap();
    drv.bus().inject_rx(0, b"status\n");

    // Interrupt side fills the ring, main loop drains and reacts
    drv.process(0);
    console.pump(&drv, &inst);
    assert!(STATUS_REQUESTED.swap(false, Ordering::Relaxed));

    drv.transmit(&inst, b"ok\r\n").unwrap();
    assert_eq!(drv.bus().written(0), b"ok\r\n");
}

#[test]
fn test_received_frame_echoed_through_deferred_queue() {
    static QUEUE: EventQueue<8, 64> = EventQueue::new();
    static ECHOED: Mutex<Vec<u8>> = Mutex::new(Vec::new());

    fn store_frame(payload: &[u8]) {
        ECHOED.lock().unwrap().extend_from_slice(payload);
    }
    fn on_rx(event: SerialEvent<'_>) {
        if let SerialEvent::RxDone(bytes) = event {
            // Defer: the payload is copied, nothing runs here
            QUEUE.enqueue(store_frame, bytes).unwrap();
        }
    }

    let drv = SerialDriver::<MockSerial, 1>::new(MockSerial::new(1));
    let inst = drv.configure(0, SerialConfig::default()).unwrap();

    drv.receive_async(&inst, 4, Some(on_rx)).unwrap();
    drv.bus().inject_rx(0, b"ping");
    drv.process(0);

    // Nothing has been echoed until the main loop drains
    assert!(ECHOED.lock().unwrap().is_empty());
    QUEUE.drain();

    let frame = ECHOED.lock().unwrap().clone();
    assert_eq!(frame, b"ping");
    drv.transmit(&inst, &frame).unwrap();
    assert_eq!(drv.bus().written(0), b"ping");
}

#[test]
fn test_repeating_timer_paces_telemetry_frames() {
    static PENDING_FRAMES: AtomicUsize = AtomicUsize::new(0);
    fn on_beat(_context: usize) {
        PENDING_FRAMES.fetch_add(1, Ordering::Relaxed);
    }

    let timers = TimerService::<MockTicker, 4>::new(MockTicker::new());
    let drv = SerialDriver::<MockSerial, 1>::new(MockSerial::new(1));
    let inst = drv.configure(0, SerialConfig::default()).unwrap();

    let beat = timers.create(TimerMode::Repeating, on_beat).unwrap();
    let period = timers.ms_to_ticks(100);
    assert_eq!(period, 3_277);
    timers.start(beat, period, 0).unwrap();

    for _ in 0..3 {
        timers.source().advance(period);
        timers.poll();
        while PENDING_FRAMES.load(Ordering::Relaxed) > 0 {
            drv.transmit(&inst, b"beat\n").unwrap();
            PENDING_FRAMES.fetch_sub(1, Ordering::Relaxed);
        }
    }
    timers.stop(beat).unwrap();

    assert_eq!(drv.bus().written(0), b"beat\nbeat\nbeat\n");
    assert_eq!(drv.bus().bursts(0), vec![5, 5, 5]);
}

#[test]
fn test_garbage_flood_then_valid_command() {
    static PINGS: AtomicUsize = AtomicUsize::new(0);
    fn on_ping() {
        PINGS.fetch_add(1, Ordering::Relaxed);
    }
    static COMMANDS: &[Command] = &[Command {
        name: "ping",
        handler: on_ping,
    }];

    let drv = SerialDriver::<MockSerial, 1>::new(MockSerial::new(1));
    let inst = drv.configure(0, SerialConfig::default()).unwrap();
    let mut console = Console::new(COMMANDS);

    drv.receive_into_ring_async(&inst, None).unwrap();

    // 200 unterminated bytes: the ring keeps the first 127, drops 73
    let garbage = vec![b'#'; 200];
    drv.bus().inject_rx(0, &garbage);
    drv.process(0);
    assert_eq!(drv.ring_len(&inst), RX_RING_BYTES - 1);
    assert_eq!(drv.ring_dropped(&inst), 73);

    // The console gives up on the oversized line without dispatching
    console.pump(&drv, &inst);
    assert_eq!(drv.ring_len(&inst), 0);
    assert_eq!(PINGS.load(Ordering::Relaxed), 0);

    // A terminator ends the bad line, then a real command gets through
    drv.bus().inject_rx(0, b"\nping\n");
    drv.process(0);
    console.pump(&drv, &inst);
    assert_eq!(PINGS.load(Ordering::Relaxed), 1);
}
