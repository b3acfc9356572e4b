use core::arch::asm;

#[inline(always)]
pub fn halt() {
    unsafe {
        asm!("idle 0", options(nomem, nostack));
    }
}
