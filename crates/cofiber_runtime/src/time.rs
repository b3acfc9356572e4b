use core::ops::{Add, AddAssign, Sub};

pub use core::time::Duration;

/// Monotonic timestamp with microsecond resolution.
///
/// Only differences between instants mean anything; the epoch is whatever the
/// [`Clock`] counts from, usually boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant(u64);

impl Instant {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1000))
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    pub const fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let micros = u64::try_from(duration.as_micros()).ok()?;
        self.0.checked_add(micros).map(Self)
    }

    pub fn checked_duration_since(self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_micros)
    }

    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.checked_duration_since(earlier).unwrap_or(Duration::ZERO)
    }
}

/// Saturates at [`Instant::MAX`], so a huge timeout means "never".
impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        self.checked_add(duration).unwrap_or(Self::MAX)
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, duration: Duration) {
        *self = *self + duration;
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.saturating_duration_since(earlier)
    }
}

/// Monotonic time source supplied by the application.
///
/// Timed sleeps are the only users. The scheduler asks for [`Clock::now`] on every
/// scheduling decision and calls [`Clock::wait_until`] when nothing is ready to
/// run but some fiber sleeps.
pub trait Clock: Sync {
    fn now(&self) -> Instant;

    /// Block until `deadline` has passed.
    ///
    /// The default spins on [`Clock::now`]. Implementations backed by a timer with
    /// a compare interrupt can arm it and sleep the core instead (`wfi` and
    /// friends), as long as that interrupt is guaranteed to fire.
    fn wait_until(&self, deadline: Instant) {
        while self.now() < deadline {
            core::hint::spin_loop();
        }
    }
}
