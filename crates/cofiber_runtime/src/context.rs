use core::cell::UnsafeCell;

use cofiber_hal::context::{ArchContext, Context, EntryFn, FinishFn, RawContextSwitch};

use crate::stack::FiberStack;

/// A [`Context`] that can be switched into and out of through shared references.
///
/// The scheduler owns one for its own calling context and every fiber owns one
/// for its stack. Only one context is ever executing, which is what makes the
/// interior mutability here sound.
#[derive(Debug)]
pub struct ExecutionContext(UnsafeCell<Context>);

unsafe impl Sync for ExecutionContext {}

impl ExecutionContext {
    pub const fn new() -> Self {
        Self(UnsafeCell::new(Context::empty()))
    }

    /// Lay out a fresh frame on `stack` that calls `entry(arg)` then `on_finish(arg)`.
    ///
    /// # Safety
    /// The stack must not be executing, and whatever was suspended on it is
    /// abandoned without being dropped.
    pub(crate) unsafe fn make(
        &self,
        stack: &FiberStack,
        entry: EntryFn,
        on_finish: FinishFn,
        arg: usize,
    ) {
        let Self(context) = self;

        unsafe {
            *context.get() = ArchContext::make(stack.base(), stack.size(), entry, on_finish, arg);
        }
    }

    /// Leave the scheduler context saved in `self` and run `to`.
    ///
    /// # Safety
    /// `to` must be runnable, see [`RawContextSwitch::start`].
    pub(crate) unsafe fn start(&self, to: &Self) {
        let Self(from_ctx) = self;
        let Self(to_ctx) = to;

        unsafe { ArchContext::start(from_ctx.get(), to_ctx.get()) }
    }

    /// Suspend the running code into `self` and resume `to`.
    ///
    /// # Safety
    /// `self` must be the context of the code that is executing right now and `to`
    /// must be runnable.
    pub(crate) unsafe fn switch_to(&self, to: &Self) {
        let Self(from_ctx) = self;
        let Self(to_ctx) = to;

        unsafe { ArchContext::jump(from_ctx.get(), to_ctx.get()) }
    }

    /// Resume `self` and never come back to the caller's stack.
    ///
    /// # Safety
    /// `self` must be runnable and the calling stack must be finished.
    pub(crate) unsafe fn switch_noreturn(&self) -> ! {
        let Self(to_ctx) = self;

        unsafe { ArchContext::end(to_ctx.get()) }
    }

    pub fn stack_pointer(&self) -> usize {
        unsafe { (*self.0.get()).stack_pointer() }
    }

    pub fn stack_size(&self) -> usize {
        unsafe { (*self.0.get()).stack_size() }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
