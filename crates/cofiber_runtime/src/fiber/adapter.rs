use super::{Fiber, WakeKey};
use intrusive_collections::{KeyAdapter, LinkedListAtomicLink, RBTreeAtomicLink, intrusive_adapter};

intrusive_adapter!(pub(crate) FiberRqAdapter = &'static Fiber: Fiber { link_ready_queue: LinkedListAtomicLink });
intrusive_adapter!(pub(crate) FiberSleepAdapter = &'static Fiber: Fiber { link_sleep_set: RBTreeAtomicLink });

impl<'a> KeyAdapter<'a> for FiberSleepAdapter {
    type Key = WakeKey;
    fn get_key(&self, fiber: &'a Fiber) -> Self::Key {
        fiber.wake_key.get()
    }
}
