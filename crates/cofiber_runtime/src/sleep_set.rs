use crate::{
    fiber::{Fiber, FiberSleepAdapter, WakeKey},
    time::Instant,
};
use intrusive_collections::RBTree;

/// Sleeping fibers ordered by deadline, then by the order they went to sleep.
pub struct SleepSet {
    fibers: RBTree<FiberSleepAdapter>,
    sequence: u64,
}

impl SleepSet {
    pub fn new() -> Self {
        Self {
            fibers: RBTree::new(FiberSleepAdapter::new()),
            sequence: 0,
        }
    }

    pub fn insert(&mut self, fiber: &'static Fiber, deadline: Instant) {
        fiber.set_wake_key(WakeKey {
            deadline,
            sequence: self.sequence,
        });

        self.sequence += 1;
        self.fibers.insert(fiber);
    }

    pub fn remove(&mut self, fiber: &Fiber) {
        unsafe {
            // SAFETY: Callers only remove fibers in the `Sleeping` state, which are
            //         linked into this set.
            self.fibers.cursor_mut_from_ptr(fiber).remove();
        }
    }

    /// Take out the earliest sleeper if its deadline is not after `now`.
    pub fn pop_elapsed(&mut self, now: Instant) -> Option<&'static Fiber> {
        let mut front = self.fibers.front_mut();

        match front.get() {
            Some(fiber) if fiber.deadline() <= now => front.remove(),
            _ => None,
        }
    }

    pub fn pop_front(&mut self) -> Option<&'static Fiber> {
        self.fibers.front_mut().remove()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.fibers.front().get().map(Fiber::deadline)
    }

    pub fn len(&self) -> usize {
        self.fibers.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Forget the registration order. Only valid while the set is empty.
    pub fn reset_sequence(&mut self) {
        debug_assert!(self.fibers.is_empty());
        self.sequence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scheduler::Scheduler, stack::Stack, time::Clock};

    struct Frozen;

    impl Clock for Frozen {
        fn now(&self) -> Instant {
            Instant::ZERO
        }
    }

    fn fibers<const N: usize>() -> [&'static Fiber; N] {
        let scheduler: &'static Scheduler = Box::leak(Box::new(Scheduler::new(&Frozen)));

        core::array::from_fn(|_| {
            let stack: &'static mut Stack<4096> = Box::leak(Box::new(Stack::new()));
            let entry: &'static mut dyn FnMut() = Box::leak(Box::new(|| {}));
            let fiber: &'static Fiber =
                Box::leak(Box::new(Fiber::new(scheduler, stack.as_mut_slice(), entry)));
            fiber
        })
    }

    #[test]
    fn keyed_by_deadline_then_sequence() {
        let [a, b, c] = fibers();
        let mut set = SleepSet::new();

        set.insert(a, Instant::from_millis(10));
        set.insert(b, Instant::from_millis(5));
        set.insert(c, Instant::from_millis(10));

        assert_eq!(set.len(), 3);
        assert_eq!(set.next_deadline(), Some(Instant::from_millis(5)));
        assert!(set.pop_elapsed(Instant::from_millis(4)).is_none());

        let woken: Vec<_> = core::iter::from_fn(|| set.pop_elapsed(Instant::from_millis(10)))
            .map(Fiber::id)
            .collect();

        assert_eq!(woken, [b.id(), a.id(), c.id()]);
        assert!(set.is_empty());
    }

    #[test]
    fn remove_unlinks_a_sleeper() {
        let [a, b] = fibers();
        let mut set = SleepSet::new();

        set.insert(a, Instant::from_millis(1));
        set.insert(b, Instant::from_millis(2));
        set.remove(a);

        assert_eq!(set.len(), 1);
        assert_eq!(set.pop_front().map(Fiber::id), Some(b.id()));

        set.reset_sequence();
        assert_eq!(set.next_deadline(), None);
    }
}
