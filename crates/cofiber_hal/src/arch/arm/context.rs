use core::{arch::naked_asm, ptr::NonNull};

use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, FrameBuilder, RawContextSwitch};

/// AAPCS context switch for Cortex-M cores.
///
/// Thumb-2 cores (ARMv7-M, ARMv8-M mainline) save, lowest address first:
/// `[s16..s31] r3 r4..r11 lr`. The `s16..s31` block exists on hard-float
/// targets only.
///
/// Baseline cores (ARMv6-M, ARMv8-M baseline) can only push low registers, so
/// `r8..r11` are moved through `r4..r7` and saved below them:
/// `r8..r11 r3 r4..r7 lr`.
///
/// `r3` is only pushed to keep the frame a multiple of 8 bytes.
pub struct ArchContext;

#[cfg(all(target_abi = "eabihf", not(target_feature = "thumb2")))]
compile_error!("hard-float ARM targets without Thumb-2 are not supported");

#[cfg(target_feature = "thumb2")]
mod layout {
    #[cfg(target_abi = "eabihf")]
    const FPU_WORDS: usize = 16;
    #[cfg(not(target_abi = "eabihf"))]
    const FPU_WORDS: usize = 0;

    pub const FRAME_WORDS: usize = FPU_WORDS + 10;

    pub const R4: usize = FPU_WORDS + 1;
    pub const R5: usize = FPU_WORDS + 2;
    pub const R6: usize = FPU_WORDS + 3;
    pub const R7: usize = FPU_WORDS + 4;
    pub const R11: usize = FPU_WORDS + 8;
    pub const LR: usize = FPU_WORDS + 9;
}

#[cfg(not(target_feature = "thumb2"))]
mod layout {
    pub const FRAME_WORDS: usize = 10;

    pub const R11: usize = 3;
    pub const R4: usize = 5;
    pub const R5: usize = 6;
    pub const R6: usize = 7;
    pub const R7: usize = 8;
    pub const LR: usize = 9;
}

use layout::*;

impl ArchContext {
    #[cfg(all(target_feature = "thumb2", not(target_abi = "eabihf")))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        // `from` in r0, `to` in r1.
        naked_asm!(
            "push {{r3-r11, lr}}",
            "mov  r2, sp",
            "str  r2, [r0]",
            "",
            "ldr  r2, [r1]",
            "mov  sp, r2",
            "pop  {{r3-r11, pc}}",
        );
    }

    #[cfg(all(target_feature = "thumb2", target_abi = "eabihf"))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        naked_asm!(
            "push  {{r3-r11, lr}}",
            "vpush {{s16-s31}}",
            "mov   r2, sp",
            "str   r2, [r0]",
            "",
            "ldr   r2, [r1]",
            "mov   sp, r2",
            "vpop  {{s16-s31}}",
            "pop   {{r3-r11, pc}}",
        );
    }

    #[cfg(not(target_feature = "thumb2"))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        naked_asm!(
            "push {{r3-r7, lr}}",
            "mov  r4, r8",
            "mov  r5, r9",
            "mov  r6, r10",
            "mov  r7, r11",
            "push {{r4-r7}}",
            "mov  r2, sp",
            "str  r2, [r0]",
            "",
            "ldr  r2, [r1]",
            "mov  sp, r2",
            "pop  {{r4-r7}}",
            "mov  r8, r4",
            "mov  r9, r5",
            "mov  r10, r6",
            "mov  r11, r7",
            "pop  {{r3-r7, pc}}",
        );
    }

    #[cfg(all(target_feature = "thumb2", not(target_abi = "eabihf")))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ldr  r2, [r0]",
            "mov  sp, r2",
            "pop  {{r3-r11, pc}}",
        );
    }

    #[cfg(all(target_feature = "thumb2", target_abi = "eabihf"))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ldr   r2, [r0]",
            "mov   sp, r2",
            "vpop  {{s16-s31}}",
            "pop   {{r3-r11, pc}}",
        );
    }

    #[cfg(not(target_feature = "thumb2"))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ldr  r2, [r0]",
            "mov  sp, r2",
            "pop  {{r4-r7}}",
            "mov  r8, r4",
            "mov  r9, r5",
            "mov  r10, r6",
            "mov  r11, r7",
            "pop  {{r3-r7, pc}}",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_do_call() -> ! {
        naked_asm!(
            "mov  r0, r5", // arg
            "blx  r4",     // entry
            "mov  r0, r5",
            "blx  r6", // on_finish
            "udf  #0",
        );
    }
}

impl RawContextSwitch for ArchContext {
    const STACK_ALIGN: usize = 8;
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

        // Function addresses keep the Thumb bit, so `pop {pc}` and `blx` stay in
        // Thumb state.
        frame.set(R4, entry as usize);
        frame.set(R5, arg);
        frame.set(R6, on_finish as usize);
        frame.set(R7, 0); // Thumb frame pointer.
        frame.set(R11, 0);
        frame.set(LR, Self::__fiber_do_call as *const () as usize);

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_keeps_eight_byte_alignment() {
        assert_eq!(FRAME_WORDS * size_of::<usize>() % 8, 0);
        assert!(LR == FRAME_WORDS - 1);
        assert!(R4 < R5 && R5 < R6 && R6 < R7 && R7 < LR);
    }
}
