use core::{arch::naked_asm, ptr::NonNull};

use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, FrameBuilder, RawContextSwitch};

/// AAPCS64 context switch.
///
/// Frame saved on the stack, lowest address first:
/// `x19..x28 x29 x30 d8..d15`, 160 bytes in total so `sp` stays 16-byte aligned.
pub struct ArchContext;

const FRAME_WORDS: usize = 20;

const X19: usize = 0;
const X20: usize = 1;
const X21: usize = 2;
const X29: usize = 10;
const X30: usize = 11;

impl ArchContext {
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        // `from` in x0, `to` in x1.
        naked_asm!(
            "sub  sp, sp, #0xa0",
            "stp  x19, x20, [sp, #0x00]",
            "stp  x21, x22, [sp, #0x10]",
            "stp  x23, x24, [sp, #0x20]",
            "stp  x25, x26, [sp, #0x30]",
            "stp  x27, x28, [sp, #0x40]",
            "stp  x29, x30, [sp, #0x50]",
            "stp  d8,  d9,  [sp, #0x60]",
            "stp  d10, d11, [sp, #0x70]",
            "stp  d12, d13, [sp, #0x80]",
            "stp  d14, d15, [sp, #0x90]",
            "mov  x9, sp",
            "str  x9, [x0]",
            "",
            "ldr  x9, [x1]",
            "mov  sp, x9",
            "ldp  x19, x20, [sp, #0x00]",
            "ldp  x21, x22, [sp, #0x10]",
            "ldp  x23, x24, [sp, #0x20]",
            "ldp  x25, x26, [sp, #0x30]",
            "ldp  x27, x28, [sp, #0x40]",
            "ldp  x29, x30, [sp, #0x50]",
            "ldp  d8,  d9,  [sp, #0x60]",
            "ldp  d10, d11, [sp, #0x70]",
            "ldp  d12, d13, [sp, #0x80]",
            "ldp  d14, d15, [sp, #0x90]",
            "add  sp, sp, #0xa0",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ldr  x9, [x0]",
            "mov  sp, x9",
            "ldp  x19, x20, [sp, #0x00]",
            "ldp  x21, x22, [sp, #0x10]",
            "ldp  x23, x24, [sp, #0x20]",
            "ldp  x25, x26, [sp, #0x30]",
            "ldp  x27, x28, [sp, #0x40]",
            "ldp  x29, x30, [sp, #0x50]",
            "ldp  d8,  d9,  [sp, #0x60]",
            "ldp  d10, d11, [sp, #0x70]",
            "ldp  d12, d13, [sp, #0x80]",
            "ldp  d14, d15, [sp, #0x90]",
            "add  sp, sp, #0xa0",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_do_call() -> ! {
        naked_asm!(
            "mov  x0, x20", // arg
            "blr  x19",     // entry
            "mov  x0, x20",
            "blr  x21", // on_finish
            "brk  #0x1",
        );
    }
}

impl RawContextSwitch for ArchContext {
    const STACK_ALIGN: usize = 16;
    const MIN_STACK_SIZE: usize = 512;

    unsafe fn make(
        stack: NonNull<u8>,
        size: usize,
        entry: EntryFn,
        on_finish: FinishFn,
        arg: usize,
    ) -> Context {
        let mut frame = unsafe { FrameBuilder::new(stack, size, Self::STACK_ALIGN) };

        frame.reserve(FRAME_WORDS);
        for slot in 0..FRAME_WORDS {
            frame.set(slot, 0);
        }

        frame.set(X19, entry as usize);
        frame.set(X20, arg);
        frame.set(X21, on_finish as usize);
        frame.set(X29, 0); // Set frame pointer to 0.
        frame.set(X30, Self::__fiber_do_call as *const () as usize);

        frame.finish()
    }

    #[inline(always)]
    unsafe fn jump(from: *mut Context, to: *const Context) {
        unsafe { Self::__fiber_jump(from, to) }
    }

    #[inline(always)]
    unsafe fn end(to: *const Context) -> ! {
        unsafe { Self::__fiber_end(to) }
    }
}
