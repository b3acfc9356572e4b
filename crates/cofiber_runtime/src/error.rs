use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FiberError {
    /// The operation needs the fiber to be off the CPU, but it is the running one.
    Running,
    /// The stack has already been executed on since its context was made.
    AlreadyStarted,
    /// Stack usage was requested without a prior `watermark_stack()`.
    NotWatermarked,
}

impl FiberError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "fiber is currently running",
            Self::AlreadyStarted => "fiber has already started executing",
            Self::NotWatermarked => "fiber stack was never watermarked",
        }
    }
}

impl fmt::Debug for FiberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::AlreadyStarted => write!(f, "AlreadyStarted"),
            Self::NotWatermarked => write!(f, "NotWatermarked"),
        }
    }
}

impl fmt::Display for FiberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for FiberError {}
