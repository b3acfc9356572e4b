use core::arch::asm;

/// Stop the core until the next interrupt. Privileged: only usable on bare metal.
#[inline(always)]
pub fn halt() {
    unsafe {
        asm!("hlt", options(att_syntax, nomem, nostack));
    }
}
