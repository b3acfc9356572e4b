use crate::fiber::{Fiber, FiberRqAdapter};
use intrusive_collections::LinkedList;

pub trait ReadyQueue {
    fn get(&mut self) -> Option<&'static Fiber>;
    fn put(&mut self, fiber: &'static Fiber);
    fn remove(&mut self, fiber: &Fiber);
}

/// First in, first out. There are no priorities.
pub struct FifoReadyQueue {
    fibers: LinkedList<FiberRqAdapter>,
}

impl FifoReadyQueue {
    pub fn new() -> Self {
        FifoReadyQueue {
            fibers: LinkedList::new(FiberRqAdapter::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.fibers.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }
}

impl ReadyQueue for FifoReadyQueue {
    fn get(&mut self) -> Option<&'static Fiber> {
        self.fibers.pop_front()
    }

    fn put(&mut self, fiber: &'static Fiber) {
        self.fibers.push_back(fiber);
    }

    fn remove(&mut self, fiber: &Fiber) {
        unsafe {
            // SAFETY: Callers only remove fibers in the `Ready` state, which are
            //         linked into this queue.
            self.fibers.cursor_mut_from_ptr(fiber).remove();
        }
    }
}
