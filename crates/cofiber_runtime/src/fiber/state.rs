use core::sync::atomic::{AtomicU8, Ordering};

/// Where a fiber is in its life, as far as the scheduler is concerned.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Built but never handed to the scheduler.
    Unstarted = 0,
    /// Waiting in the ready queue.
    Ready = 1,
    /// Executing on the CPU.
    Running = 2,
    /// Waiting in the sleep set for its deadline.
    Sleeping = 3,
    /// Taken off the scheduler by `stop()`, suspended where it last yielded.
    Stopped = 4,
    /// The entry closure returned.
    Finished = 5,
}

impl FiberState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unstarted,
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Sleeping,
            4 => Self::Stopped,
            5 => Self::Finished,
            _ => unreachable!(),
        }
    }

    /// Ready, running or sleeping: the scheduler will get to it without help.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Ready | Self::Running | Self::Sleeping)
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new(state: FiberState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> FiberState {
        FiberState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: FiberState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn swap(&self, state: FiberState) -> FiberState {
        FiberState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}
