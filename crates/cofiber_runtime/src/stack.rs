use core::ptr::NonNull;

use cofiber_hal::traits::context::{align_down, align_up};

use crate::config::{MIN_STACK_SIZE, STACK_ALIGN};

/// Stack memory with the strictest alignment any backend needs, suitable for a
/// `static` or a `StaticCell`.
///
/// ```no_run
/// use cofiber_runtime::Stack;
/// use static_cell::StaticCell;
///
/// static STACK: StaticCell<Stack<2048>> = StaticCell::new();
///
/// let memory: &'static mut [u8] = STACK.init(Stack::new()).as_mut_slice();
/// ```
#[repr(C, align(16))]
pub struct Stack<const N: usize>([u8; N]);

impl<const N: usize> Stack<N> {
    pub const fn new() -> Self {
        Self([0; N])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl<const N: usize> Default for Stack<N> {
    fn default() -> Self {
        Self::new()
    }
}

const WORD: usize = size_of::<u32>();

/// The part of a caller supplied buffer a fiber actually runs on: base rounded up
/// to a word, top rounded down to the backend's stack alignment.
#[derive(Debug)]
pub(crate) struct FiberStack {
    base: NonNull<u8>,
    size: usize,
}

impl FiberStack {
    pub fn new(memory: &'static mut [u8]) -> Self {
        let start = memory.as_mut_ptr() as usize;
        let base = align_up(start, WORD);
        let top = align_down(start + memory.len(), STACK_ALIGN);

        assert!(
            top > base && top - base >= MIN_STACK_SIZE,
            "Fiber stack of {} bytes is below the minimum of {MIN_STACK_SIZE}",
            memory.len(),
        );

        Self {
            // SAFETY: `base` lies inside `memory`, which is not null.
            base: unsafe { NonNull::new_unchecked(base as *mut u8) },
            size: top - base,
        }
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn word(&self, offset: usize) -> *mut u32 {
        debug_assert!(offset % WORD == 0 && offset < self.size);
        (self.base.as_ptr() as usize + offset) as *mut u32
    }

    /// Paint `[base, end)` with `pattern`.
    ///
    /// # Safety
    /// Nothing may live in that range, i.e. the fiber must not have run yet and
    /// `end` must not exceed the initial frame.
    pub unsafe fn fill(&self, end: usize, pattern: u32) {
        let len = align_down(end.saturating_sub(self.base.as_ptr() as usize), WORD).min(self.size);

        for offset in (0..len).step_by(WORD) {
            unsafe {
                // SAFETY: `offset` is within the stack.
                self.word(offset).write_volatile(pattern);
            }
        }
    }

    /// Bytes between the top of the stack and the lowest word that no longer holds
    /// `pattern`.
    pub fn used(&self, pattern: u32) -> usize {
        for offset in (0..self.size).step_by(WORD) {
            // SAFETY: `offset` is within the stack. A suspended fiber's stack is
            //         plain memory we are allowed to read.
            if unsafe { self.word(offset).read_volatile() } != pattern {
                return self.size - offset;
            }
        }

        0
    }

    /// Whether the lowest word of the stack has been written over.
    pub fn bottom_touched(&self, pattern: u32) -> bool {
        // SAFETY: The stack is at least `MIN_STACK_SIZE` long.
        unsafe { self.word(0).read_volatile() != pattern }
    }
}
