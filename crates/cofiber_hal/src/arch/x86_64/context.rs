use core::{arch::naked_asm, ptr::NonNull};

use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, FrameBuilder, RawContextSwitch};

/// System V AMD64 context switch.
///
/// Frame saved on the stack, lowest address first:
/// `r15 r14 r13 r12 rbx rbp <return address>`.
pub struct ArchContext;

const FRAME_WORDS: usize = 7;

const R13: usize = 2;
const R12: usize = 3;
const RBX: usize = 4;
const RBP: usize = 5;
const RIP: usize = 6;

impl ArchContext {
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        // `from` in rdi, `to` in rsi.
        naked_asm!(
            "push %rbp",
            "push %rbx",
            "push %r12",
            "push %r13",
            "push %r14",
            "push %r15",
            "mov %rsp, (%rdi)",
            "",
            "mov (%rsi), %rsp",
            "pop %r15",
            "pop %r14",
            "pop %r13",
            "pop %r12",
            "pop %rbx",
            "pop %rbp",
            "ret",
            options(att_syntax),
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "mov (%rdi), %rsp",
            "pop %r15",
            "pop %r14",
            "pop %r13",
            "pop %r12",
            "pop %rbx",
            "pop %rbp",
            "ret",
            options(att_syntax),
        );
    }

    /// First code a fresh context runs. The stack is 16-byte aligned here, so both
    /// `call`s enter their callee with the alignment the ABI expects.
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_do_call() -> ! {
        naked_asm!(
            "mov %r12, %rdi", // arg
            "call *%rbx",     // entry
            "mov %r12, %rdi",
            "call *%r13", // on_finish
            "ud2",
            options(att_syntax),
        );
    }
}

impl RawContextSwitch for ArchContext {
    const STACK_ALIGN: usize = 16;
    const MIN_STACK_SIZE: usize = 256;

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

        frame.set(R13, on_finish as usize);
        frame.set(R12, arg);
        frame.set(RBX, entry as usize);
        frame.set(RBP, 0); // NULL previous stack frame
        frame.set(RIP, Self::__fiber_do_call as *const () as usize);

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
