//! Two fibers taking turns on the host, driven by the wall clock.
//!
//! `ping` prints, naps, then wakes `pong`; `pong` does the same back until the
//! rally is over. Build with `--features log_trace` to watch every switch.

use std::{
    io::Write,
    sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time,
};

use cofiber::{Clock, Duration, Fiber, FiberError, Instant, Scheduler, Stack, Start};
use cofiber_log::{ConsoleWrite, println_info, println_warn, set_console};
use static_cell::StaticCell;

/// The host's `std` machinery needs more room than a bare-metal fiber.
const STACK_SIZE: usize = 16 * 1024;
const RALLY: usize = 5;
const NAP: Duration = Duration::from_millis(200);

struct Stdout;

impl ConsoleWrite for Stdout {
    fn write(&self, s: &str) {
        let _ = std::io::stdout().lock().write_all(s.as_bytes());
    }
}

struct HostClock;

static EPOCH: OnceLock<time::Instant> = OnceLock::new();

impl Clock for HostClock {
    fn now(&self) -> Instant {
        let epoch = EPOCH.get_or_init(time::Instant::now);
        Instant::from_micros(epoch.elapsed().as_micros() as u64)
    }

    fn wait_until(&self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

static SCHEDULER: Scheduler = Scheduler::new(&HostClock);

static PING: OnceLock<&'static Fiber> = OnceLock::new();
static PONG: OnceLock<&'static Fiber> = OnceLock::new();
static VOLLEYS: AtomicUsize = AtomicUsize::new(0);

fn ping() {
    println_info!("ping at {}ms", SCHEDULER.now().as_millis());
    SCHEDULER.sleep_for(NAP);

    if let Some(pong) = PONG.get() {
        pong.start();
    }
}

fn pong() {
    println_info!("pong at {}ms", SCHEDULER.now().as_millis());
    SCHEDULER.sleep_for(NAP);

    if VOLLEYS.fetch_add(1, Ordering::Relaxed) + 1 < RALLY {
        if let Some(ping) = PING.get() {
            ping.start();
        }
    }
}

fn report(name: &str, fiber: &Fiber) -> Result<(), FiberError> {
    let used = fiber.stack_usage()?;
    println_info!("{name} used {used} of {} stack bytes", fiber.stack_size());

    if fiber.stack_overflowed()? {
        println_warn!("{name} overflowed its stack");
    }

    Ok(())
}

fn main() -> Result<(), FiberError> {
    static PING_STACK: StaticCell<Stack<STACK_SIZE>> = StaticCell::new();
    static PONG_STACK: StaticCell<Stack<STACK_SIZE>> = StaticCell::new();
    static PING_ENTRY: StaticCell<fn()> = StaticCell::new();
    static PONG_ENTRY: StaticCell<fn()> = StaticCell::new();
    static PING_FIBER: StaticCell<Fiber> = StaticCell::new();
    static PONG_FIBER: StaticCell<Fiber> = StaticCell::new();

    set_console(&Stdout);

    let ping_fiber = Fiber::new(
        &SCHEDULER,
        PING_STACK.init(Stack::new()).as_mut_slice(),
        PING_ENTRY.init(ping),
    )
    .spawn(PING_FIBER.uninit(), Start::Later);

    let pong_fiber = Fiber::new(
        &SCHEDULER,
        PONG_STACK.init(Stack::new()).as_mut_slice(),
        PONG_ENTRY.init(pong),
    )
    .spawn(PONG_FIBER.uninit(), Start::Later);

    let _ = PING.set(ping_fiber);
    let _ = PONG.set(pong_fiber);

    ping_fiber.watermark_stack()?;
    pong_fiber.watermark_stack()?;

    ping_fiber.start();
    SCHEDULER.run();

    println_info!("rally over after {} volleys", VOLLEYS.load(Ordering::Relaxed));
    report("ping", ping_fiber)?;
    report("pong", pong_fiber)?;

    Ok(())
}
