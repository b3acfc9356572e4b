use core::{arch::naked_asm, ptr::NonNull};

use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, FrameBuilder, RawContextSwitch};

/// LP64D context switch.
///
/// Frame saved on the stack, lowest address first:
/// `ra fp s0..s8 <pad> fs0..fs7`, 160 bytes.
pub struct ArchContext;

#[cfg(not(target_feature = "d"))]
compile_error!("loongarch64 soft-float targets are not supported yet");

const FRAME_WORDS: usize = 20;

const RA: usize = 0;
const FP: usize = 1;
const S0: usize = 2;
const S1: usize = 3;
const S2: usize = 4;

impl ArchContext {
    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_jump(from: *mut Context, to: *const Context) {
        // `from` in a0, `to` in a1.
        naked_asm!(
            "addi.d $sp, $sp, -160",
            "st.d   $ra,  $sp,   0",
            "st.d   $fp,  $sp,   8",
            "st.d   $s0,  $sp,  16",
            "st.d   $s1,  $sp,  24",
            "st.d   $s2,  $sp,  32",
            "st.d   $s3,  $sp,  40",
            "st.d   $s4,  $sp,  48",
            "st.d   $s5,  $sp,  56",
            "st.d   $s6,  $sp,  64",
            "st.d   $s7,  $sp,  72",
            "st.d   $s8,  $sp,  80",
            "fst.d  $fs0, $sp,  96",
            "fst.d  $fs1, $sp, 104",
            "fst.d  $fs2, $sp, 112",
            "fst.d  $fs3, $sp, 120",
            "fst.d  $fs4, $sp, 128",
            "fst.d  $fs5, $sp, 136",
            "fst.d  $fs6, $sp, 144",
            "fst.d  $fs7, $sp, 152",
            "st.d   $sp,  $a0,   0",
            "",
            "ld.d   $sp,  $a1,   0",
            "ld.d   $ra,  $sp,   0",
            "ld.d   $fp,  $sp,   8",
            "ld.d   $s0,  $sp,  16",
            "ld.d   $s1,  $sp,  24",
            "ld.d   $s2,  $sp,  32",
            "ld.d   $s3,  $sp,  40",
            "ld.d   $s4,  $sp,  48",
            "ld.d   $s5,  $sp,  56",
            "ld.d   $s6,  $sp,  64",
            "ld.d   $s7,  $sp,  72",
            "ld.d   $s8,  $sp,  80",
            "fld.d  $fs0, $sp,  96",
            "fld.d  $fs1, $sp, 104",
            "fld.d  $fs2, $sp, 112",
            "fld.d  $fs3, $sp, 120",
            "fld.d  $fs4, $sp, 128",
            "fld.d  $fs5, $sp, 136",
            "fld.d  $fs6, $sp, 144",
            "fld.d  $fs7, $sp, 152",
            "addi.d $sp, $sp, 160",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_end(to: *const Context) -> ! {
        naked_asm!(
            "ld.d   $sp,  $a0,   0",
            "ld.d   $ra,  $sp,   0",
            "ld.d   $fp,  $sp,   8",
            "ld.d   $s0,  $sp,  16",
            "ld.d   $s1,  $sp,  24",
            "ld.d   $s2,  $sp,  32",
            "ld.d   $s3,  $sp,  40",
            "ld.d   $s4,  $sp,  48",
            "ld.d   $s5,  $sp,  56",
            "ld.d   $s6,  $sp,  64",
            "ld.d   $s7,  $sp,  72",
            "ld.d   $s8,  $sp,  80",
            "fld.d  $fs0, $sp,  96",
            "fld.d  $fs1, $sp, 104",
            "fld.d  $fs2, $sp, 112",
            "fld.d  $fs3, $sp, 120",
            "fld.d  $fs4, $sp, 128",
            "fld.d  $fs5, $sp, 136",
            "fld.d  $fs6, $sp, 144",
            "fld.d  $fs7, $sp, 152",
            "addi.d $sp, $sp, 160",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn __fiber_do_call() -> ! {
        naked_asm!(
            "move $a0, $s1", // arg
            "jirl $ra, $s0, 0", // entry
            "move $a0, $s1",
            "jirl $ra, $s2, 0", // on_finish
            "break 0",
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
        frame.set(FP, 0); // Set frame pointer to 0.
        frame.set(S0, entry as usize);
        frame.set(S1, arg);
        frame.set(S2, on_finish as usize);

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
