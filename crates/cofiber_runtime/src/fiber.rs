mod adapter;
mod state;

use core::{
    cell::Cell,
    fmt,
    mem::MaybeUninit,
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use cofiber_log::println_trace;
use intrusive_collections::{LinkedListAtomicLink, RBTreeAtomicLink};

use crate::{
    config::STACK_WATERMARK,
    context::ExecutionContext,
    error::FiberError,
    scheduler::Scheduler,
    stack::FiberStack,
    time::Instant,
};

pub(crate) use adapter::{FiberRqAdapter, FiberSleepAdapter};
pub use state::FiberState;
pub(crate) use state::StateCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(u32);

impl FiberId {
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a fiber does right after it has been placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Start {
    /// Put it on the ready queue immediately.
    Now,
    /// Leave it unstarted until someone calls [`Fiber::start`].
    Later,
}

/// Position in the sleep set: wake deadline first, then the order in which the
/// fibers went to sleep, so equal deadlines wake first-come first-served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct WakeKey {
    pub deadline: Instant,
    pub sequence: u64,
}

/// A cooperatively scheduled thread of execution with its own stack.
///
/// Fibers live in `'static` storage because the scheduler links them into its
/// queues by reference. Build one with [`Fiber::new`] and hand it over with
/// [`Fiber::spawn`]:
///
/// ```no_run
/// use core::mem::MaybeUninit;
/// use cofiber_runtime::{Clock, Fiber, Instant, Scheduler, Stack, Start};
/// use static_cell::StaticCell;
///
/// struct Ticks;
/// impl Clock for Ticks {
///     fn now(&self) -> Instant {
///         Instant::ZERO
///     }
/// }
///
/// static SCHEDULER: Scheduler = Scheduler::new(&Ticks);
/// static STACK: StaticCell<Stack<2048>> = StaticCell::new();
/// static BLINK: StaticCell<fn()> = StaticCell::new();
/// static FIBER: StaticCell<Fiber> = StaticCell::new();
///
/// fn blink() {
///     loop {
///         // toggle a pin
///         SCHEDULER.yield_now();
///     }
/// }
///
/// let fiber = Fiber::new(
///     &SCHEDULER,
///     STACK.init(Stack::new()).as_mut_slice(),
///     BLINK.init(blink),
/// );
/// fiber.spawn(FIBER.uninit(), Start::Now);
///
/// SCHEDULER.run();
/// ```
pub struct Fiber {
    /// Unique identifier of the fiber.
    id: FiberId,
    /// The scheduler whose queues this fiber goes into.
    scheduler: &'static Scheduler,
    pub(crate) state: StateCell,
    /// `stop()` was called while the fiber was running.
    stop_requested: AtomicBool,
    /// The stack has been executed on since the context was last made.
    has_run: AtomicBool,
    watermarked: AtomicBool,
    pub(crate) context: ExecutionContext,
    stack: FiberStack,
    entry: NonNull<dyn FnMut()>,
    /// Only meaningful while linked into the sleep set.
    wake_key: Cell<WakeKey>,
    /// Link in the ready queue.
    link_ready_queue: LinkedListAtomicLink,
    /// Link in the sleep set.
    link_sleep_set: RBTreeAtomicLink,
}

// SAFETY: Fibers are only touched from the single thread of control that runs
//         their scheduler. The entry closure and `wake_key` are never accessed
//         concurrently.
unsafe impl Send for Fiber {}
unsafe impl Sync for Fiber {}

unsafe extern "C" fn fiber_entry(scheduler: usize) {
    // SAFETY: `scheduler` was taken from a `&'static Scheduler` in `make_context`.
    let scheduler = unsafe { &*(scheduler as *const Scheduler) };
    let fiber = scheduler
        .current()
        .expect("A fiber is only switched into while it is current");

    println_trace!("trace_scheduler", "fiber {} entered", fiber.id);

    unsafe {
        // SAFETY: We are executing on the fiber's own stack, so nothing else can be
        //         calling the entry closure right now.
        (*fiber.entry.as_ptr())();
    }
}

unsafe extern "C" fn fiber_exit(scheduler: usize) -> ! {
    // SAFETY: See `fiber_entry`.
    let scheduler = unsafe { &*(scheduler as *const Scheduler) };
    scheduler.finish_current()
}

impl Fiber {
    /// Build an unstarted fiber running `entry` on `stack`.
    ///
    /// Panics if `stack` is smaller than [`crate::config::MIN_STACK_SIZE`] once
    /// its edges are aligned.
    pub fn new(
        scheduler: &'static Scheduler,
        stack: &'static mut [u8],
        entry: &'static mut dyn FnMut(),
    ) -> Self {
        static ID: AtomicU32 = AtomicU32::new(0);

        let fiber = Self {
            id: FiberId(ID.fetch_add(1, Ordering::Relaxed)),
            scheduler,
            state: StateCell::new(FiberState::Unstarted),
            stop_requested: AtomicBool::new(false),
            has_run: AtomicBool::new(false),
            watermarked: AtomicBool::new(false),
            context: ExecutionContext::new(),
            stack: FiberStack::new(stack),
            entry: NonNull::from(entry),
            wake_key: Cell::new(WakeKey {
                deadline: Instant::ZERO,
                sequence: 0,
            }),
            link_ready_queue: LinkedListAtomicLink::new(),
            link_sleep_set: RBTreeAtomicLink::new(),
        };

        unsafe {
            // SAFETY: The stack has never been executed on.
            fiber.make_context();
        }

        fiber
    }

    /// Move the fiber into its final storage and apply the start policy.
    pub fn spawn(self, slot: &'static mut MaybeUninit<Fiber>, start: Start) -> &'static Fiber {
        let fiber: &'static Fiber = slot.write(self);

        if start == Start::Now {
            fiber.start();
        }

        fiber
    }

    /// # Safety
    /// The fiber must not be running.
    pub(crate) unsafe fn make_context(&self) {
        unsafe {
            self.context.make(
                &self.stack,
                fiber_entry,
                fiber_exit,
                self.scheduler as *const Scheduler as usize,
            );
        }

        self.has_run.store(false, Ordering::Relaxed);
    }

    pub fn id(&self) -> FiberId {
        self.id
    }

    pub fn state(&self) -> FiberState {
        self.state.get()
    }

    /// Whether the scheduler will run the fiber without anyone calling
    /// [`Fiber::start`]: it is ready, sleeping or running.
    pub fn is_active(&self) -> bool {
        self.state.get().is_active()
    }

    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    pub fn scheduler(&self) -> &'static Scheduler {
        self.scheduler
    }

    /// Hand the fiber to the scheduler.
    ///
    /// Does nothing if the fiber is ready, sleeping or running (other than
    /// cancelling a pending [`Fiber::stop`] on the running fiber). A stopped fiber
    /// resumes where it was suspended, a finished one starts over from its entry.
    pub fn start(&'static self) {
        self.scheduler.activate(self);
    }

    /// Take the fiber off the scheduler.
    ///
    /// The running fiber keeps running until its next yield or sleep, where it is
    /// parked instead of requeued.
    pub fn stop(&'static self) {
        self.scheduler.deactivate(self);
    }

    /// Throw away the fiber's progress and queue it to run its entry from the top.
    ///
    /// Locals of a suspended body are not dropped. Fails on the running fiber.
    pub fn restart(&'static self) -> Result<(), FiberError> {
        self.scheduler.rearm(self)
    }

    /// Paint the unused part of the stack so [`Fiber::stack_usage`] can measure
    /// how deep the fiber went. Must come before the fiber first runs.
    pub fn watermark_stack(&self) -> Result<(), FiberError> {
        if self.has_run.load(Ordering::Acquire) || self.state.get() == FiberState::Running {
            return Err(FiberError::AlreadyStarted);
        }

        unsafe {
            // SAFETY: Nothing has executed on the stack since the context was
            //         made, so everything below the initial frame is unused.
            self.stack
                .fill(self.context.stack_pointer(), STACK_WATERMARK);
        }

        self.watermarked.store(true, Ordering::Release);
        Ok(())
    }

    /// Deepest stack use observed so far, in bytes. A diagnostic only.
    pub fn stack_usage(&self) -> Result<usize, FiberError> {
        if !self.watermarked.load(Ordering::Acquire) {
            return Err(FiberError::NotWatermarked);
        }

        Ok(self.stack.used(STACK_WATERMARK))
    }

    /// Whether the fiber has reached the very bottom of its stack, in which case
    /// it has most likely overflowed into whatever lies below.
    pub fn stack_overflowed(&self) -> Result<bool, FiberError> {
        if !self.watermarked.load(Ordering::Acquire) {
            return Err(FiberError::NotWatermarked);
        }

        Ok(self.stack.bottom_touched(STACK_WATERMARK))
    }

    pub(crate) fn mark_running(&self) {
        let old = self.state.swap(FiberState::Running);
        assert_eq!(old, FiberState::Ready, "Next fiber should be in Ready state");

        self.has_run.store(true, Ordering::Release);
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_wake_key(&self, key: WakeKey) {
        self.wake_key.set(key);
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.wake_key.get().deadline
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("stack_size", &self.stack.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{stack::Stack, time::Clock};

    struct Frozen;

    impl Clock for Frozen {
        fn now(&self) -> Instant {
            Instant::ZERO
        }
    }

    fn scheduler() -> &'static Scheduler {
        Box::leak(Box::new(Scheduler::new(&Frozen)))
    }

    fn fiber(scheduler: &'static Scheduler) -> Fiber {
        let stack: &'static mut Stack<8192> = Box::leak(Box::new(Stack::new()));
        let entry: &'static mut dyn FnMut() = Box::leak(Box::new(|| {}));

        Fiber::new(scheduler, stack.as_mut_slice(), entry)
    }

    fn slot() -> &'static mut MaybeUninit<Fiber> {
        Box::leak(Box::new(MaybeUninit::uninit()))
    }

    #[test]
    fn ids_are_unique() {
        let scheduler = scheduler();
        let a = fiber(scheduler);
        let b = fiber(scheduler);

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn start_policy() {
        let scheduler = scheduler();

        let later = fiber(scheduler).spawn(slot(), Start::Later);
        assert_eq!(later.state(), FiberState::Unstarted);
        assert_eq!(scheduler.ready_len(), 0);

        let now = fiber(scheduler).spawn(slot(), Start::Now);
        assert_eq!(now.state(), FiberState::Ready);
        assert_eq!(scheduler.ready_len(), 1);
    }

    #[test]
    fn watermark_before_run() {
        let scheduler = scheduler();
        let fiber = fiber(scheduler).spawn(slot(), Start::Later);

        assert_eq!(fiber.stack_usage(), Err(FiberError::NotWatermarked));
        assert_eq!(fiber.stack_overflowed(), Err(FiberError::NotWatermarked));

        fiber.watermark_stack().unwrap();

        // Only the initial frame is in use.
        let usage = fiber.stack_usage().unwrap();
        assert!(usage > 0 && usage <= 256, "initial frame uses {usage} bytes");
        assert_eq!(fiber.stack_overflowed(), Ok(false));
    }

    #[test]
    fn debug_output() {
        let scheduler = scheduler();
        let fiber = fiber(scheduler);

        let debug = format!("{fiber:?}");
        assert!(debug.contains("Unstarted"));
        assert!(debug.contains(&format!("{}", fiber.stack_size())));
    }
}
