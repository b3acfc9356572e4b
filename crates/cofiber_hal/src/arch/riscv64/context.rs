use core::{arch::naked_asm, ptr::NonNull};

use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, FrameBuilder, RawContextSwitch};

/// LP64 / LP64D context switch.
///
/// Frame saved on the stack, lowest address first:
/// `ra s0..s11 <pad> [fs0..fs11]`. The floating point block is only present
/// when the target has the D extension.
pub struct ArchContext;

const CORE_WORDS: usize = 14;

#[cfg(target_feature = "d")]
const FRAME_WORDS: usize = CORE_WORDS + 12;
#[cfg(not(target_feature = "d"))]
const FRAME_WORDS: usize = CORE_WORDS;

const RA: usize = 0;
const S0: usize = 1;
const S1: usize = 2;
const S2: usize = 3;
const S3: usize = 4;

impl ArchContext {
    #[cfg(not(target_feature = "d"))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        // `from` in a0, `to` in a1.
        naked_asm!(
            "addi sp, sp, -112",
            "sd   ra,   0(sp)",
            "sd   s0,   8(sp)",
            "sd   s1,  16(sp)",
            "sd   s2,  24(sp)",
            "sd   s3,  32(sp)",
            "sd   s4,  40(sp)",
            "sd   s5,  48(sp)",
            "sd   s6,  56(sp)",
            "sd   s7,  64(sp)",
            "sd   s8,  72(sp)",
            "sd   s9,  80(sp)",
            "sd  s10,  88(sp)",
            "sd  s11,  96(sp)",
            "sd   sp,   0(a0)",
            "",
            "ld   sp,   0(a1)",
            "ld   ra,   0(sp)",
            "ld   s0,   8(sp)",
            "ld   s1,  16(sp)",
            "ld   s2,  24(sp)",
            "ld   s3,  32(sp)",
            "ld   s4,  40(sp)",
            "ld   s5,  48(sp)",
            "ld   s6,  56(sp)",
            "ld   s7,  64(sp)",
            "ld   s8,  72(sp)",
            "ld   s9,  80(sp)",
            "ld  s10,  88(sp)",
            "ld  s11,  96(sp)",
            "addi sp, sp, 112",
            "ret",
        );
    }

    #[cfg(target_feature = "d")]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        naked_asm!(
            "addi sp, sp, -208",
            "sd   ra,   0(sp)",
            "sd   s0,   8(sp)",
            "sd   s1,  16(sp)",
            "sd   s2,  24(sp)",
            "sd   s3,  32(sp)",
            "sd   s4,  40(sp)",
            "sd   s5,  48(sp)",
            "sd   s6,  56(sp)",
            "sd   s7,  64(sp)",
            "sd   s8,  72(sp)",
            "sd   s9,  80(sp)",
            "sd  s10,  88(sp)",
            "sd  s11,  96(sp)",
            "fsd fs0, 112(sp)",
            "fsd fs1, 120(sp)",
            "fsd fs2, 128(sp)",
            "fsd fs3, 136(sp)",
            "fsd fs4, 144(sp)",
            "fsd fs5, 152(sp)",
            "fsd fs6, 160(sp)",
            "fsd fs7, 168(sp)",
            "fsd fs8, 176(sp)",
            "fsd fs9, 184(sp)",
            "fsd fs10, 192(sp)",
            "fsd fs11, 200(sp)",
            "sd   sp,   0(a0)",
            "",
            "ld   sp,   0(a1)",
            "ld   ra,   0(sp)",
            "ld   s0,   8(sp)",
            "ld   s1,  16(sp)",
            "ld   s2,  24(sp)",
            "ld   s3,  32(sp)",
            "ld   s4,  40(sp)",
            "ld   s5,  48(sp)",
            "ld   s6,  56(sp)",
            "ld   s7,  64(sp)",
            "ld   s8,  72(sp)",
            "ld   s9,  80(sp)",
            "ld  s10,  88(sp)",
            "ld  s11,  96(sp)",
            "fld fs0, 112(sp)",
            "fld fs1, 120(sp)",
            "fld fs2, 128(sp)",
            "fld fs3, 136(sp)",
            "fld fs4, 144(sp)",
            "fld fs5, 152(sp)",
            "fld fs6, 160(sp)",
            "fld fs7, 168(sp)",
            "fld fs8, 176(sp)",
            "fld fs9, 184(sp)",
            "fld fs10, 192(sp)",
            "fld fs11, 200(sp)",
            "addi sp, sp, 208",
            "ret",
        );
    }

    #[cfg(not(target_feature = "d"))]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ld   sp,   0(a0)",
            "ld   ra,   0(sp)",
            "ld   s0,   8(sp)",
            "ld   s1,  16(sp)",
            "ld   s2,  24(sp)",
            "ld   s3,  32(sp)",
            "ld   s4,  40(sp)",
            "ld   s5,  48(sp)",
            "ld   s6,  56(sp)",
            "ld   s7,  64(sp)",
            "ld   s8,  72(sp)",
            "ld   s9,  80(sp)",
            "ld  s10,  88(sp)",
            "ld  s11,  96(sp)",
            "addi sp, sp, 112",
            "ret",
        );
    }

    #[cfg(target_feature = "d")]
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ld   sp,   0(a0)",
            "ld   ra,   0(sp)",
            "ld   s0,   8(sp)",
            "ld   s1,  16(sp)",
            "ld   s2,  24(sp)",
            "ld   s3,  32(sp)",
            "ld   s4,  40(sp)",
            "ld   s5,  48(sp)",
            "ld   s6,  56(sp)",
            "ld   s7,  64(sp)",
            "ld   s8,  72(sp)",
            "ld   s9,  80(sp)",
            "ld  s10,  88(sp)",
            "ld  s11,  96(sp)",
            "fld fs0, 112(sp)",
            "fld fs1, 120(sp)",
            "fld fs2, 128(sp)",
            "fld fs3, 136(sp)",
            "fld fs4, 144(sp)",
            "fld fs5, 152(sp)",
            "fld fs6, 160(sp)",
            "fld fs7, 168(sp)",
            "fld fs8, 176(sp)",
            "fld fs9, 184(sp)",
            "fld fs10, 192(sp)",
            "fld fs11, 200(sp)",
            "addi sp, sp, 208",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_do_call() -> ! {
        naked_asm!(
            "mv   a0, s2",   // arg
            "mv   fp, zero", // Set frame pointer to 0.
            "jalr s1",       // entry
            "mv   a0, s2",
            "jalr s3", // on_finish
            "unimp",
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

        frame.set(RA, Self::__fiber_do_call as *const () as usize);
        frame.set(S0, 0);
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
