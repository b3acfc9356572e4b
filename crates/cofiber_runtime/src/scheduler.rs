use core::{
    ptr,
    sync::atomic::{AtomicBool, Ordering},
};

use cofiber_log::{println_debug, println_trace};
use spin::{Lazy, Mutex};

use crate::{
    context::ExecutionContext,
    error::FiberError,
    fiber::{Fiber, FiberState},
    ready_queue::{FifoReadyQueue, ReadyQueue},
    sleep_set::SleepSet,
    time::{Clock, Duration, Instant},
};

struct Queues {
    ready: FifoReadyQueue,
    sleeping: SleepSet,
    /// The fiber on the CPU, `None` while the scheduler's own context runs.
    current: Option<&'static Fiber>,
}

impl Queues {
    fn new() -> Mutex<Self> {
        Mutex::new(Self {
            ready: FifoReadyQueue::new(),
            sleeping: SleepSet::new(),
            current: None,
        })
    }

    /// Move every sleeper whose deadline has passed to the back of the ready queue.
    fn wake_elapsed(&mut self, now: Instant) {
        while let Some(fiber) = self.sleeping.pop_elapsed(now) {
            println_trace!("trace_scheduler", "fiber {} woke at {}us", fiber.id(), now.as_micros());

            fiber.state.set(FiberState::Ready);
            self.ready.put(fiber);
        }
    }

    /// Pop the next fiber to run and make it current. Clears `current` if there is
    /// nothing to run.
    fn pick_next(&mut self, now: Instant) -> Option<&'static Fiber> {
        self.wake_elapsed(now);

        let next = self.ready.get();
        if let Some(next) = next {
            next.mark_running();
        }

        self.current = next;
        next
    }
}

/// Held while a thread is inside `run()` or `run_until_idle()`. There is only one
/// scheduler context to save into, so only one thread may drive at a time.
struct Driver<'a>(&'a AtomicBool);

impl<'a> Driver<'a> {
    fn acquire(driving: &'a AtomicBool) -> Self {
        assert!(
            driving
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok(),
            "Scheduler should be driven by one thread at a time"
        );

        Self(driving)
    }
}

impl Drop for Driver<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs fibers one at a time on the calling thread until they run out of work.
///
/// There is normally exactly one scheduler, in a `static`, created before the
/// first fiber and never dropped. Fibers cooperate through [`Scheduler::yield_now`]
/// and the sleep functions; nothing is ever preempted.
pub struct Scheduler {
    clock: &'static dyn Clock,
    queues: Lazy<Mutex<Queues>>,
    driving: AtomicBool,
    /// Where `run()` was called from. Fibers switch back here when nothing else is
    /// ready or when they finish.
    context: ExecutionContext,
}

impl Scheduler {
    pub const fn new(clock: &'static dyn Clock) -> Self {
        Self {
            clock,
            queues: Lazy::new(Queues::new),
            driving: AtomicBool::new(false),
            context: ExecutionContext::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// The fiber executing right now, if called from inside one.
    pub fn current(&self) -> Option<&'static Fiber> {
        self.queues.lock().current
    }

    pub fn ready_len(&self) -> usize {
        self.queues.lock().ready.len()
    }

    pub fn sleeping_len(&self) -> usize {
        self.queues.lock().sleeping.len()
    }

    /// No fiber is ready or sleeping.
    pub fn is_idle(&self) -> bool {
        let queues = self.queues.lock();
        queues.ready.is_empty() && queues.sleeping.is_empty()
    }

    /// Run fibers until every one of them has finished or been stopped.
    ///
    /// While all remaining fibers sleep, the clock is asked to wait for the nearest
    /// deadline. On a device whose fibers loop forever this never returns.
    pub fn run(&self) {
        self.assert_outside_fiber();
        let _driver = Driver::acquire(&self.driving);

        loop {
            self.drain_ready();

            let Some(deadline) = self.queues.lock().sleeping.next_deadline() else {
                break;
            };

            println_trace!("trace_scheduler", "idle until {}us", deadline.as_micros());
            self.clock.wait_until(deadline);
        }
    }

    /// Run fibers until the ready queue is empty, even if some fibers still sleep.
    pub fn run_until_idle(&self) {
        self.assert_outside_fiber();
        let _driver = Driver::acquire(&self.driving);

        self.drain_ready();
    }

    fn assert_outside_fiber(&self) {
        assert!(
            self.current().is_none(),
            "Scheduler::run() must not be called from inside a fiber"
        );
    }

    fn drain_ready(&self) {
        loop {
            let now = self.clock.now();
            let Some(next) = self.queues.lock().pick_next(now) else {
                break;
            };

            println_trace!("trace_scheduler", "switching to fiber {}", next.id());

            unsafe {
                // SAFETY: `next` is off every queue and not executing anywhere.
                self.context.start(&next.context);
            }

            // Whoever switched back here has already cleared `current`.
        }
    }

    /// Let every other ready fiber run once before the caller continues.
    ///
    /// Returns right away if the caller is the only ready fiber, and does nothing
    /// outside of a fiber.
    pub fn yield_now(&self) {
        let Some(current) = self.current() else {
            return;
        };

        {
            let mut queues = self.queues.lock();

            if current.take_stop_request() {
                current.state.set(FiberState::Stopped);
            } else {
                current.state.set(FiberState::Ready);
                queues.ready.put(current);
            }
        }

        self.switch_away(current);
    }

    /// Suspend the calling fiber for at least `duration`.
    pub fn sleep_for(&self, duration: Duration) {
        self.sleep_until(self.clock.now() + duration);
    }

    /// Suspend the calling fiber until `deadline` has passed.
    ///
    /// The fiber is never resumed early, but may be resumed late: wake-ups are only
    /// noticed when the scheduler gets control. Outside of a fiber this blocks on
    /// the clock.
    pub fn sleep_until(&self, deadline: Instant) {
        let Some(current) = self.current() else {
            self.clock.wait_until(deadline);
            return;
        };

        // A fiber stopped while asleep can be started again early, hence the loop.
        loop {
            {
                let mut queues = self.queues.lock();

                if current.take_stop_request() {
                    current.state.set(FiberState::Stopped);
                } else {
                    current.state.set(FiberState::Sleeping);
                    queues.sleeping.insert(current, deadline);
                }
            }

            self.switch_away(current);

            if self.clock.now() >= deadline {
                break;
            }
        }
    }

    /// Yield until `condition` holds.
    pub fn poll(&self, mut condition: impl FnMut() -> bool) {
        while !condition() {
            self.yield_now();
        }
    }

    /// Yield until `condition` holds or `deadline` passes. Returns whether the
    /// condition was met.
    pub fn poll_until(&self, deadline: Instant, mut condition: impl FnMut() -> bool) -> bool {
        loop {
            if condition() {
                return true;
            }

            if self.clock.now() >= deadline {
                return false;
            }

            self.yield_now();
        }
    }

    /// Yield until `condition` holds or `timeout` elapses. Returns whether the
    /// condition was met.
    pub fn poll_for(&self, timeout: Duration, condition: impl FnMut() -> bool) -> bool {
        self.poll_until(self.clock.now() + timeout, condition)
    }

    /// Drop every queued fiber, leaving them `Stopped`, so the scheduler can be
    /// reused from a clean slate. Meant for test harnesses.
    pub fn reset(&self) {
        let mut queues = self.queues.lock();
        assert!(
            queues.current.is_none(),
            "Scheduler::reset() must not be called from inside a fiber"
        );

        let mut detached = 0;

        while let Some(fiber) = queues.ready.get() {
            fiber.state.set(FiberState::Stopped);
            detached += 1;
        }

        while let Some(fiber) = queues.sleeping.pop_front() {
            fiber.state.set(FiberState::Stopped);
            detached += 1;
        }

        queues.sleeping.reset_sequence();

        println_debug!("scheduler reset, {} fibers detached", detached);
    }

    pub(crate) fn activate(&self, fiber: &'static Fiber) {
        let mut queues = self.queues.lock();

        match fiber.state.get() {
            FiberState::Ready | FiberState::Sleeping => {}
            FiberState::Running => {
                fiber.take_stop_request();
            }
            FiberState::Unstarted | FiberState::Stopped => {
                fiber.state.set(FiberState::Ready);
                queues.ready.put(fiber);
            }
            FiberState::Finished => {
                unsafe {
                    // SAFETY: A finished fiber has left its stack for good.
                    fiber.make_context();
                }

                fiber.state.set(FiberState::Ready);
                queues.ready.put(fiber);
            }
        }

        println_trace!("trace_scheduler", "fiber {} started: {:?}", fiber.id(), fiber.state());
    }

    pub(crate) fn deactivate(&self, fiber: &'static Fiber) {
        let mut queues = self.queues.lock();

        match fiber.state.get() {
            FiberState::Ready => {
                queues.ready.remove(fiber);
                fiber.state.set(FiberState::Stopped);
            }
            FiberState::Sleeping => {
                queues.sleeping.remove(fiber);
                fiber.state.set(FiberState::Stopped);
            }
            FiberState::Running => fiber.request_stop(),
            FiberState::Unstarted | FiberState::Stopped | FiberState::Finished => {}
        }

        println_trace!("trace_scheduler", "fiber {} stopped: {:?}", fiber.id(), fiber.state());
    }

    pub(crate) fn rearm(&self, fiber: &'static Fiber) -> Result<(), FiberError> {
        let mut queues = self.queues.lock();

        match fiber.state.get() {
            FiberState::Running => return Err(FiberError::Running),
            FiberState::Ready => queues.ready.remove(fiber),
            FiberState::Sleeping => queues.sleeping.remove(fiber),
            FiberState::Unstarted | FiberState::Stopped | FiberState::Finished => {}
        }

        unsafe {
            // SAFETY: The fiber is not running, so nothing executes on its stack.
            fiber.make_context();
        }

        fiber.take_stop_request();
        fiber.state.set(FiberState::Ready);
        queues.ready.put(fiber);

        println_trace!("trace_scheduler", "fiber {} restarted", fiber.id());
        Ok(())
    }

    /// Give the CPU away from `from`, which must be the current fiber and must
    /// already be queued, parked or stopped as it should be. Returns once someone
    /// picks `from` again.
    fn switch_away(&self, from: &'static Fiber) {
        let now = self.clock.now();
        let next = self.queues.lock().pick_next(now);

        match next {
            Some(next) if ptr::eq(next, from) => {}
            Some(next) => {
                println_trace!("trace_scheduler", "fiber {} -> fiber {}", from.id(), next.id());

                unsafe {
                    // SAFETY: `from` is executing right now and `next` is off every
                    //         queue.
                    from.context.switch_to(&next.context);
                }
            }
            None => unsafe {
                // SAFETY: The scheduler context was saved by the `run()` that
                //         started the current chain of fibers.
                from.context.switch_to(&self.context);
            },
        }
    }

    /// Called on the stack of a fiber whose entry closure has returned.
    pub(crate) fn finish_current(&self) -> ! {
        {
            let mut queues = self.queues.lock();
            let fiber = queues
                .current
                .take()
                .expect("Finishing fiber should be current");

            fiber.take_stop_request();
            fiber.state.set(FiberState::Finished);

            println_trace!("trace_scheduler", "fiber {} finished", fiber.id());
        }

        unsafe {
            // SAFETY: The finished stack is never switched into again before it is
            //         rebuilt by `make_context`.
            self.context.switch_noreturn()
        }
    }
}
