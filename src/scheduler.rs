//! Cooperative frame scheduler
//!
//! Everything in the display runs on one thread. Redraws are coalesced per
//! animation tick with [`Scheduler::enqueue`]; interaction handlers that need
//! immediate visual feedback use [`Scheduler::call_now`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A schedulable callback. Identity is the allocation, so clones of the same
/// task coalesce in the queue.
#[derive(Clone)]
pub struct Task(Rc<dyn Fn()>);

impl Task {
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Self(Rc::new(callback))
    }

    pub fn run(&self) {
        (self.0)()
    }

    pub fn same_as(&self, other: &Task) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({:p})", Rc::as_ptr(&self.0))
    }
}

pub trait Scheduler {
    /// Run `task` on the next tick. Enqueuing a task that is already pending
    /// is a no-op.
    fn enqueue(&self, task: &Task);

    /// Run `task` synchronously
    fn call_now(&self, task: &Task);
}

/// Queue drained once per animation tick by the host
#[derive(Debug, Default)]
pub struct FrameScheduler {
    queue: RefCell<Vec<Task>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every task queued before this call. Tasks enqueued while running
    /// land in the next frame.
    pub fn run_frame(&self) -> usize {
        let tasks = std::mem::take(&mut *self.queue.borrow_mut());
        for task in &tasks {
            task.run();
        }
        tasks.len()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl Scheduler for FrameScheduler {
    fn enqueue(&self, task: &Task) {
        let mut queue = self.queue.borrow_mut();
        if !queue.iter().any(|queued| queued.same_as(task)) {
            queue.push(task.clone());
        }
    }

    fn call_now(&self, task: &Task) {
        task.run();
    }
}
