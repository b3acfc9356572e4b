use core::{arch::naked_asm, ptr::NonNull};

use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, FrameBuilder, RawContextSwitch};

/// ILP32 context switch for microcontroller cores without an FPU (`imc`/`imac`).
///
/// Frame saved on the stack, lowest address first: `ra s0..s11 <pad x3>`, 64
/// bytes so `sp` keeps its 16-byte alignment.
pub struct ArchContext;

#[cfg(target_feature = "f")]
compile_error!("riscv32 targets with hardware floating point are not supported yet");

const FRAME_WORDS: usize = 16;

const RA: usize = 0;
const S0: usize = 1;
const S1: usize = 2;
const S2: usize = 3;
const S3: usize = 4;

impl ArchContext {
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        // `from` in a0, `to` in a1.
        naked_asm!(
            "addi sp, sp, -64",
            "sw   ra,  0(sp)",
            "sw   s0,  4(sp)",
            "sw   s1,  8(sp)",
            "sw   s2, 12(sp)",
            "sw   s3, 16(sp)",
            "sw   s4, 20(sp)",
            "sw   s5, 24(sp)",
            "sw   s6, 28(sp)",
            "sw   s7, 32(sp)",
            "sw   s8, 36(sp)",
            "sw   s9, 40(sp)",
            "sw  s10, 44(sp)",
            "sw  s11, 48(sp)",
            "sw   sp,  0(a0)",
            "",
            "lw   sp,  0(a1)",
            "lw   ra,  0(sp)",
            "lw   s0,  4(sp)",
            "lw   s1,  8(sp)",
            "lw   s2, 12(sp)",
            "lw   s3, 16(sp)",
            "lw   s4, 20(sp)",
            "lw   s5, 24(sp)",
            "lw   s6, 28(sp)",
            "lw   s7, 32(sp)",
            "lw   s8, 36(sp)",
            "lw   s9, 40(sp)",
            "lw  s10, 44(sp)",
            "lw  s11, 48(sp)",
            "addi sp, sp, 64",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "lw   sp,  0(a0)",
            "lw   ra,  0(sp)",
            "lw   s0,  4(sp)",
            "lw   s1,  8(sp)",
            "lw   s2, 12(sp)",
            "lw   s3, 16(sp)",
            "lw   s4, 20(sp)",
            "lw   s5, 24(sp)",
            "lw   s6, 28(sp)",
            "lw   s7, 32(sp)",
            "lw   s8, 36(sp)",
            "lw   s9, 40(sp)",
            "lw  s10, 44(sp)",
            "lw  s11, 48(sp)",
            "addi sp, sp, 64",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_do_call() -> ! {
        naked_asm!(
            "mv   a0, s2", // arg
            "jalr s1",     // entry
            "mv   a0, s2",
            "jalr s3", // on_finish
            "unimp",
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

        frame.set(RA, Self::__fiber_do_call as *const () as usize);
        frame.set(S0, 0); // Frame pointer.
        frame.set(S1, entry as usize);
        frame.set(S2, arg);
        frame.set(S3, on_finish as usize);

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
