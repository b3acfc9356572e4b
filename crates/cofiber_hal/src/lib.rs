#![cfg_attr(not(test), no_std)]

pub(crate) mod arch;

pub mod context {
    pub use crate::arch::context::ArchContext;
    pub use cofiber_hal_traits::context::{Context, EntryFn, FinishFn, RawContextSwitch};
}

/// Low-power waiting, for `Clock::wait_until` implementations on real hardware.
pub mod processor {
    pub use crate::arch::processor::halt;
}

pub use cofiber_hal_traits as traits;

#[cfg(test)]
mod tests {
    use crate::context::{ArchContext, Context, RawContextSwitch};
    use core::ptr::NonNull;

    const STACK_SIZE: usize = 64 * 1024;

    #[repr(C, align(16))]
    struct TestStack([u8; STACK_SIZE]);

    struct Shared {
        main: Context,
        fiber: Context,
        steps: usize,
        float: f64,
    }

    unsafe extern "C" fn entry(arg: usize) {
        let shared = arg as *mut Shared;

        unsafe {
            (*shared).steps += 1;
            (*shared).float *= 2.0;
            ArchContext::jump(&raw mut (*shared).fiber, &raw const (*shared).main);
            (*shared).steps += 10;
        }
    }

    unsafe extern "C" fn finish(arg: usize) -> ! {
        let shared = arg as *mut Shared;

        unsafe {
            (*shared).steps += 100;
            ArchContext::end(&raw const (*shared).main)
        }
    }

    fn setup() -> (*mut TestStack, *mut Shared) {
        let stack = Box::into_raw(Box::new(TestStack([0; STACK_SIZE])));
        let shared = Box::into_raw(Box::new(Shared {
            main: Context::empty(),
            fiber: Context::empty(),
            steps: 0,
            float: 1.5,
        }));

        unsafe {
            let base = NonNull::new((*stack).0.as_mut_ptr()).unwrap();
            (*shared).fiber = ArchContext::make(base, STACK_SIZE, entry, finish, shared as usize);
        }

        (stack, shared)
    }

    fn teardown(stack: *mut TestStack, shared: *mut Shared) {
        unsafe {
            drop(Box::from_raw(shared));
            drop(Box::from_raw(stack));
        }
    }

    #[test]
    fn make_does_not_run_entry() {
        let (stack, shared) = setup();

        unsafe {
            let fiber = &(*shared).fiber;
            let top = (*stack).0.as_ptr() as usize + STACK_SIZE;

            assert!(!fiber.is_empty());
            assert!(fiber.stack_pointer() < top);
            assert_eq!(fiber.stack_pointer() % size_of::<usize>(), 0);
            assert_eq!(fiber.stack_size(), STACK_SIZE);
            assert_eq!((*shared).steps, 0);
        }

        teardown(stack, shared);
    }

    #[test]
    fn start_jump_end() {
        let (stack, shared) = setup();
        let local = 7u64;

        unsafe {
            ArchContext::start(&raw mut (*shared).main, &raw const (*shared).fiber);
            assert_eq!((*shared).steps, 1);
            assert_eq!((*shared).float, 3.0);

            ArchContext::jump(&raw mut (*shared).main, &raw const (*shared).fiber);
            assert_eq!((*shared).steps, 111);
        }

        // Callee-saved state of this stack survived both round trips.
        assert_eq!(core::hint::black_box(local), 7);

        teardown(stack, shared);
    }

    #[test]
    fn remade_context_starts_over() {
        let (stack, shared) = setup();

        unsafe {
            ArchContext::start(&raw mut (*shared).main, &raw const (*shared).fiber);
            assert_eq!((*shared).steps, 1);

            let base = NonNull::new((*stack).0.as_mut_ptr()).unwrap();
            (*shared).fiber = ArchContext::make(base, STACK_SIZE, entry, finish, shared as usize);

            ArchContext::start(&raw mut (*shared).main, &raw const (*shared).fiber);
            assert_eq!((*shared).steps, 2);
        }

        teardown(stack, shared);
    }
}
