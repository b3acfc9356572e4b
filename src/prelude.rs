pub use crate::config::DEFAULT_STACK_SIZE;
pub use crate::{Clock, Duration, Fiber, FiberError, FiberState, Instant, Scheduler, Stack, Start};

pub use cofiber_log::{print, println, println_debug, println_fatal, println_info, println_warn};
