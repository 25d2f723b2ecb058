//! Task Context
//!
//! The task context tracks which scheduled task is currently running on this
//! thread. Graph writes consult it so that every published attribute change
//! can be attributed to the task that caused it.
//!
//! # Implementation
//!
//! We use a thread-local stack of task ids. The scheduler pushes the id of a
//! task before stepping it and pops it when the step returns. The stack shape
//! tolerates an embedding host that drives a nested scheduler from inside a
//! task, where the inner task should win attribution.

use std::cell::RefCell;

use super::TaskId;

thread_local! {
    static TASK_STACK: RefCell<Vec<TaskId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the task context when dropped.
///
/// This ensures the stack stays balanced even if the task panics.
pub struct TaskScope {
    task: TaskId,
}

impl TaskScope {
    /// Mark `task` as the running task until the returned guard is dropped.
    pub fn enter(task: TaskId) -> Self {
        TASK_STACK.with(|stack| stack.borrow_mut().push(task));
        Self { task }
    }

    /// The innermost running task on this thread, if any.
    pub fn current() -> Option<TaskId> {
        TASK_STACK.with(|stack| stack.borrow().last().copied())
    }

    pub fn is_active() -> bool {
        TASK_STACK.with(|stack| !stack.borrow().is_empty())
    }

    pub fn task(&self) -> TaskId {
        self.task
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        TASK_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.task),
                "TaskScope mismatch: expected {:?}, got {:?}",
                self.task,
                popped
            );
        });
    }
}
