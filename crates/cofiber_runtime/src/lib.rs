#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod context;
pub mod error;
pub mod fiber;
mod ready_queue;
pub mod scheduler;
mod sleep_set;
pub mod stack;
pub mod time;

pub use error::FiberError;
pub use fiber::{Fiber, FiberId, FiberState, Start};
pub use scheduler::Scheduler;
pub use stack::Stack;
pub use time::{Clock, Duration, Instant};
