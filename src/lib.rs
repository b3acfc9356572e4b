#![no_std]

//! Cooperative fibers for single-core targets.
//!
//! Each fiber owns a fixed stack and runs until it yields, sleeps or returns.
//! Hand it to a [`Scheduler`] living in a `static` and call [`Scheduler::run`]
//! from `main`. The context switch is a few instructions of assembly per
//! architecture, see [`hal::context::RawContextSwitch`].

pub mod prelude;

pub use cofiber_hal as hal;
pub use cofiber_log as log;
pub use cofiber_runtime::{
    Clock, Duration, Fiber, FiberError, FiberId, FiberState, Instant, Scheduler, Stack, Start,
    config,
};
