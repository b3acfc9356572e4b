use core::ptr::NonNull;

/// Function a fresh context starts executing, called with the `arg` given to
/// [`RawContextSwitch::make`].
pub type EntryFn = unsafe extern "C" fn(usize);

/// Function called on the fiber stack after [`EntryFn`] returns. It must switch
/// away for good, usually through [`RawContextSwitch::end`].
pub type FinishFn = unsafe extern "C" fn(usize) -> !;

/// Saved execution state of a suspended stack.
///
/// Registers live on the stack itself, so the handle only needs to remember
/// where the stack pointer was left and how large the stack region is. The
/// layout is shared with the assembly in every architecture backend: `sp` must
/// stay the first field.
#[repr(C)]
#[derive(Debug)]
pub struct Context {
    sp: usize,
    size: usize,
}

impl Context {
    /// A context that has never been saved into.
    ///
    /// Switching into an empty context is undefined behavior. It is only valid as
    /// the `from` side of a switch.
    pub const fn empty() -> Self {
        Self { sp: 0, size: 0 }
    }

    /// # Safety
    /// `sp` must point at a frame laid out by the backend that is going to switch
    /// into this context, inside a stack region of `size` bytes.
    pub const unsafe fn from_raw_parts(sp: usize, size: usize) -> Self {
        Self { sp, size }
    }

    pub const fn stack_pointer(&self) -> usize {
        self.sp
    }

    pub const fn stack_size(&self) -> usize {
        self.size
    }

    pub const fn is_empty(&self) -> bool {
        self.sp == 0
    }
}

/// The four context switch operations every architecture backend provides.
///
/// Everything above this trait is architecture independent. A backend saves its
/// ABI's callee-saved registers and return address on the current stack and
/// records the resulting stack pointer in a [`Context`].
pub trait RawContextSwitch {
    /// Required alignment of the stack top, in bytes.
    const STACK_ALIGN: usize;

    /// Smallest stack the backend accepts. This covers the initial frame and a
    /// shallow call into the entry function, nothing more.
    const MIN_STACK_SIZE: usize;

    /// Lay out an initial frame at the top of `stack` so that switching into the
    /// returned context calls `entry(arg)`, then `on_finish(arg)` once `entry`
    /// returns.
    ///
    /// # Safety
    /// `stack` must be valid for writes of `size` bytes, `stack + size` must be
    /// aligned to [`Self::STACK_ALIGN`] and `size` must be at least
    /// [`Self::MIN_STACK_SIZE`]. Nothing checks that the stack is deep enough for
    /// what `entry` ends up calling.
    unsafe fn make(
        stack: NonNull<u8>,
        size: usize,
        entry: EntryFn,
        on_finish: FinishFn,
        arg: usize,
    ) -> Context;

    /// Leave the calling context, saving it into `caller`, and run `to`.
    ///
    /// This does not return until someone switches back into `caller` with
    /// [`Self::jump`] or [`Self::end`].
    ///
    /// # Safety
    /// Same as [`Self::jump`].
    unsafe fn start(caller: *mut Context, to: *const Context) {
        unsafe { Self::jump(caller, to) }
    }

    /// Save the current execution state into `from` and resume `to`.
    ///
    /// # Safety
    /// `to` must hold a context made by [`Self::make`] or saved by a previous
    /// switch, whose stack is still alive and not executing anywhere else.
    /// `from` must stay valid until something switches back into it.
    unsafe fn jump(from: *mut Context, to: *const Context);

    /// Resume `to` and throw away the current execution state.
    ///
    /// # Safety
    /// Same requirements on `to` as [`Self::jump`]. The current stack must never
    /// be switched into again unless it is rebuilt with [`Self::make`].
    unsafe fn end(to: *const Context) -> !;
}

/// Writes machine words downward from the top of a stack while an initial frame
/// is being laid out.
pub struct FrameBuilder {
    base: usize,
    top: usize,
    sp: usize,
}

impl FrameBuilder {
    /// # Safety
    /// `stack` must be valid for writes of `size` bytes.
    pub unsafe fn new(stack: NonNull<u8>, size: usize, align: usize) -> Self {
        let base = stack.as_ptr() as usize;
        let top = align_down(base + size, align);

        Self { base, top, sp: top }
    }

    /// Reserve `words` machine words below the current position and return the
    /// new position.
    pub fn reserve(&mut self, words: usize) -> usize {
        self.sp -= words * size_of::<usize>();
        assert!(self.sp >= self.base, "Stack too small for the initial frame");
        self.sp
    }

    /// Write `value` into slot `index` of the frame reserved last, counting
    /// upward from the stack pointer.
    pub fn set(&mut self, index: usize, value: usize) {
        let slot = self.sp + index * size_of::<usize>();
        debug_assert!(slot < self.top);

        unsafe {
            // SAFETY: `slot` lies between `base` and `top`, which the caller
            //         promised to be writable.
            (slot as *mut usize).write(value);
        }
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn finish(self) -> Context {
        Context {
            sp: self.sp,
            size: self.top - self.base,
        }
    }
}

pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x1007, 16), 0x1000);
        assert_eq!(align_up(0x1001, 16), 0x1010);
        assert_eq!(align_up(0x1000, 16), 0x1000);
    }

    #[test]
    fn frame_builder_writes_downward() {
        #[repr(align(16))]
        struct Buf([usize; 8]);

        let mut buf = Buf([0; 8]);
        let size = size_of_val(&buf.0);
        let base = NonNull::new(buf.0.as_mut_ptr() as *mut u8).unwrap();

        let mut frame = unsafe { FrameBuilder::new(base, size, 16) };
        let sp = frame.reserve(2);
        frame.set(0, 0xaa);
        frame.set(1, 0xbb);

        assert_eq!(sp, frame.top() - 2 * size_of::<usize>());

        let context = frame.finish();
        assert_eq!(context.stack_pointer(), sp);
        assert_eq!(context.stack_size(), size);
        assert_eq!(&buf.0[6..], &[0xaa, 0xbb]);
    }

    #[test]
    fn empty_context() {
        let context = Context::empty();
        assert!(context.is_empty());
        assert_eq!(context.stack_size(), 0);
    }
}
