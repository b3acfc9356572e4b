#![allow(dead_code)]

use std::{
    mem::MaybeUninit,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use cofiber_runtime::{Clock, Duration, Fiber, Instant, Scheduler, Stack, Start};

pub const STACK_SIZE: usize = 64 * 1024;

/// Time only moves when a test says so, or when the scheduler waits for a
/// sleeper, in which case it jumps straight to the deadline.
pub struct MockClock(AtomicU64);

impl MockClock {
    pub fn advance(&self, duration: Duration) {
        self.0
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.0.load(Ordering::SeqCst))
    }

    fn wait_until(&self, deadline: Instant) {
        self.0.fetch_max(deadline.as_micros(), Ordering::SeqCst);
    }
}

/// Ordered record of what fiber bodies did, checked from the test thread.
pub struct Log(Mutex<Vec<&'static str>>);

impl Log {
    pub fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Every test gets a private scheduler so tests can run in parallel.
pub struct Harness {
    pub clock: &'static MockClock,
    pub scheduler: &'static Scheduler,
    pub log: &'static Log,
}

pub fn harness() -> Harness {
    let clock: &'static MockClock = Box::leak(Box::new(MockClock(AtomicU64::new(0))));

    Harness {
        clock,
        scheduler: Box::leak(Box::new(Scheduler::new(clock))),
        log: Box::leak(Box::new(Log(Mutex::new(Vec::new())))),
    }
}

impl Harness {
    pub fn fiber(&self, body: impl FnMut() + 'static) -> Fiber {
        let stack: &'static mut Stack<STACK_SIZE> = Box::leak(Box::new(Stack::new()));
        let entry: &'static mut dyn FnMut() = Box::leak(Box::new(body));

        Fiber::new(self.scheduler, stack.as_mut_slice(), entry)
    }

    pub fn spawn(&self, start: Start, body: impl FnMut() + 'static) -> &'static Fiber {
        let slot: &'static mut MaybeUninit<Fiber> = Box::leak(Box::new(MaybeUninit::uninit()));
        self.fiber(body).spawn(slot, start)
    }
}
