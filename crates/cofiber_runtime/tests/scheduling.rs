mod common;

use std::{
    mem::MaybeUninit,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
};

use cofiber_runtime::{Clock, Duration, Fiber, FiberState, Instant, Scheduler, Stack, Start};
use common::harness;

#[test]
fn ready_fibers_run_in_fifo_order() {
    for order in [["a", "b", "c"], ["c", "a", "b"], ["b", "c", "a"]] {
        let h = harness();

        for name in order {
            let (scheduler, log) = (h.scheduler, h.log);
            h.spawn(Start::Now, move || {
                log.push(name);
                scheduler.yield_now();
                log.push(name);
            });
        }

        assert_eq!(h.scheduler.ready_len(), 3);
        h.scheduler.run();

        let expected: Vec<_> = order.iter().chain(order.iter()).copied().collect();
        assert_eq!(h.log.take(), expected);
        assert!(h.scheduler.is_idle());
    }
}

#[test]
fn yielding_fibers_interleave() {
    let h = harness();

    for name in ["x", "y"] {
        let (scheduler, log) = (h.scheduler, h.log);
        h.spawn(Start::Now, move || {
            for _ in 0..3 {
                log.push(name);
                scheduler.yield_now();
            }
        });
    }

    h.scheduler.run();

    assert_eq!(h.log.take(), ["x", "y", "x", "y", "x", "y"]);
}

#[test]
fn lone_fiber_yield_returns_immediately() {
    let h = harness();
    let (scheduler, log) = (h.scheduler, h.log);

    let fiber = h.spawn(Start::Now, move || {
        log.push("before");
        scheduler.yield_now();
        log.push("after");
    });

    h.scheduler.run_until_idle();

    assert_eq!(h.log.take(), ["before", "after"]);
    assert_eq!(fiber.state(), FiberState::Finished);
}

#[test]
fn yield_outside_a_fiber_is_a_no_op() {
    let h = harness();

    h.scheduler.yield_now();

    assert!(h.scheduler.current().is_none());
    assert!(h.scheduler.is_idle());
}

#[test]
fn current_names_the_running_fiber() {
    let h = harness();
    let scheduler = h.scheduler;
    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let seen_inside = seen.clone();

    let fiber = h.spawn(Start::Now, move || {
        let id = scheduler.current().map_or(usize::MAX, |f| f.id().as_u32() as usize);
        seen_inside.store(id, Ordering::SeqCst);
    });

    assert!(h.scheduler.current().is_none());
    h.scheduler.run();

    assert_eq!(seen.load(Ordering::SeqCst), fiber.id().as_u32() as usize);
    assert!(h.scheduler.current().is_none());
}

#[test]
fn sleep_for_waits_at_least_the_duration() {
    let h = harness();
    let (scheduler, clock, log) = (h.scheduler, h.clock, h.log);
    let slept = Arc::new(AtomicUsize::new(0));
    let slept_inside = slept.clone();

    let fiber = h.spawn(Start::Now, move || {
        let before = scheduler.now();
        log.push("asleep");
        scheduler.sleep_for(Duration::from_millis(10));
        log.push("awake");
        slept_inside.store((scheduler.now() - before).as_micros() as usize, Ordering::SeqCst);
    });

    h.scheduler.run_until_idle();
    assert_eq!(fiber.state(), FiberState::Sleeping);
    assert_eq!(h.scheduler.sleeping_len(), 1);

    clock.advance(Duration::from_millis(5));
    h.scheduler.run_until_idle();
    assert_eq!(fiber.state(), FiberState::Sleeping);

    clock.advance(Duration::from_millis(5));
    h.scheduler.run_until_idle();

    assert_eq!(h.log.take(), ["asleep", "awake"]);
    assert_eq!(fiber.state(), FiberState::Finished);
    assert!(slept.load(Ordering::SeqCst) >= 10_000);
}

#[test]
fn run_waits_on_the_clock_for_sleepers() {
    let h = harness();
    let scheduler = h.scheduler;

    let fiber = h.spawn(Start::Now, move || {
        scheduler.sleep_for(Duration::from_secs(1));
    });

    h.scheduler.run();

    assert_eq!(fiber.state(), FiberState::Finished);
    assert!(h.scheduler.now() >= Instant::from_millis(1000));
}

#[test]
fn sleepers_wake_by_deadline_then_arrival() {
    let h = harness();

    for (name, deadline) in [("a", 10), ("b", 5), ("c", 10), ("d", 5)] {
        let (scheduler, log) = (h.scheduler, h.log);
        h.spawn(Start::Now, move || {
            scheduler.sleep_until(Instant::from_millis(deadline));
            log.push(name);
        });
    }

    h.scheduler.run_until_idle();
    assert_eq!(h.scheduler.sleeping_len(), 4);

    h.scheduler.run();

    assert_eq!(h.log.take(), ["b", "d", "a", "c"]);
}

#[test]
fn elapsed_deadline_does_not_suspend_for_long() {
    let h = harness();
    let (scheduler, clock, log) = (h.scheduler, h.clock, h.log);
    clock.advance(Duration::from_millis(20));

    h.spawn(Start::Now, move || {
        scheduler.sleep_until(Instant::from_millis(10));
        log.push("late");
    });
    h.spawn(Start::Now, move || log.push("other"));

    h.scheduler.run_until_idle();

    assert_eq!(h.log.take(), ["other", "late"]);
    assert_eq!(h.scheduler.now(), Instant::from_millis(20));
}

#[test]
fn sleep_outside_a_fiber_blocks_on_the_clock() {
    let h = harness();

    h.scheduler.sleep_for(Duration::from_millis(7));

    assert_eq!(h.scheduler.now(), Instant::from_millis(7));
}

#[test]
fn poll_for_times_out() {
    let h = harness();
    let (scheduler, clock) = (h.scheduler, h.clock);
    let result = Arc::new(AtomicUsize::new(0));
    let result_inside = result.clone();

    h.spawn(Start::Now, move || {
        let met = scheduler.poll_for(Duration::from_millis(3), || false);
        result_inside.store(if met { 1 } else { 2 }, Ordering::SeqCst);
    });
    h.spawn(Start::Now, move || {
        for _ in 0..10 {
            clock.advance(Duration::from_millis(1));
            scheduler.yield_now();
        }
    });

    h.scheduler.run();

    assert_eq!(result.load(Ordering::SeqCst), 2);
}

#[test]
fn poll_returns_once_the_condition_holds() {
    let h = harness();
    let (scheduler, log) = (h.scheduler, h.log);
    let flag = Arc::new(AtomicBool::new(false));
    let (waiter_flag, setter_flag) = (flag.clone(), flag.clone());
    let met = Arc::new(AtomicBool::new(false));
    let met_inside = met.clone();

    h.spawn(Start::Now, move || {
        let ok = scheduler.poll_for(Duration::from_secs(1), || waiter_flag.load(Ordering::SeqCst));
        met_inside.store(ok, Ordering::SeqCst);
        log.push("waiter");
    });
    h.spawn(Start::Now, move || {
        scheduler.yield_now();
        setter_flag.store(true, Ordering::SeqCst);
        log.push("setter");
    });
    h.spawn(Start::Now, move || {
        scheduler.poll(|| flag.load(Ordering::SeqCst));
        log.push("poller");
    });

    h.scheduler.run();

    assert!(met.load(Ordering::SeqCst));
    assert_eq!(h.log.take(), ["setter", "poller", "waiter"]);
}

/// Holds `wait_until` until the test opens the gate.
struct GatedClock {
    micros: AtomicU64,
    waiting: AtomicBool,
    open: AtomicBool,
}

impl Clock for GatedClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.load(Ordering::SeqCst))
    }

    fn wait_until(&self, deadline: Instant) {
        self.waiting.store(true, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        self.micros.fetch_max(deadline.as_micros(), Ordering::SeqCst);
    }
}

#[test]
fn second_driver_is_rejected_while_run_waits() {
    let clock: &'static GatedClock = Box::leak(Box::new(GatedClock {
        micros: AtomicU64::new(0),
        waiting: AtomicBool::new(false),
        open: AtomicBool::new(false),
    }));
    let scheduler: &'static Scheduler = Box::leak(Box::new(Scheduler::new(clock)));

    let sleeper = {
        let stack: &'static mut Stack<{ common::STACK_SIZE }> = Box::leak(Box::new(Stack::new()));
        let entry: &'static mut dyn FnMut() =
            Box::leak(Box::new(move || scheduler.sleep_for(Duration::from_millis(1))));
        let slot: &'static mut MaybeUninit<Fiber> = Box::leak(Box::new(MaybeUninit::uninit()));

        Fiber::new(scheduler, stack.as_mut_slice(), entry).spawn(slot, Start::Now)
    };

    let driver = thread::spawn(move || scheduler.run());
    while !clock.waiting.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    let second = panic::catch_unwind(AssertUnwindSafe(|| scheduler.run_until_idle()));
    assert!(second.is_err());
    assert_eq!(sleeper.state(), FiberState::Sleeping);

    clock.open.store(true, Ordering::SeqCst);
    driver.join().unwrap();

    assert_eq!(sleeper.state(), FiberState::Finished);

    // The flag is released once the first driver returns.
    scheduler.run_until_idle();
}
