use cofiber_hal::context::{ArchContext, RawContextSwitch};

/// Pattern `Fiber::watermark_stack` paints over unused stack words.
pub const STACK_WATERMARK: u32 = 0xDEAD_BEEF;

/// Stack size that comfortably fits a fiber doing formatted logging.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Smallest stack a fiber may be built on, after alignment trimming.
pub const MIN_STACK_SIZE: usize = ArchContext::MIN_STACK_SIZE;

/// Alignment of the stack top required by the context switch backend.
pub const STACK_ALIGN: usize = ArchContext::STACK_ALIGN;
