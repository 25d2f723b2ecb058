//! Task Scheduler
//!
//! The scheduler serializes all work onto one logical timeline. It owns two
//! worklists:
//!
//! - the **queue** (FIFO): independent tasks submitted from outside;
//! - the **stack** (LIFO): tasks spawned while another task was running.
//!
//! # Algorithm
//!
//! Each turn of the loop:
//!
//! 1. Drain the inbound channel into the queue and stack. Block (with a
//!    periodic timeout) only when both lists are empty.
//! 2. Deliver a pending interrupt, if any.
//! 3. Pop the stack top, or else the queue front.
//! 4. Fresh task: run its body. If it returns a resumable computation, push
//!    that onto the stack; its first step runs next turn.
//! 5. Resumable: advance one step. Yielding pushes it back onto the stack.
//!
//! Because the stack always wins, work caused by a task completes before any
//! independently submitted work starts. Propagation through the graph is
//! depth-first.
//!
//! # Failures
//!
//! A cancellation is reported and the remaining work is kept. Any other error
//! (or panic) escaping a task clears the queue and the stack, including work
//! the failing task had already spawned, and is then reported. The loop keeps
//! running either way.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, trace, warn};

use super::context::TaskScope;
use super::interrupt::{Control, NoInterrupt};
use super::task::{Outcome, Resumable, Step, Task, TaskId};
use crate::config::SchedulerConfig;
use crate::error::TaskError;

/// A failure reported to the scheduler's failure callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The task that failed. `None` for an interrupt delivered while idle.
    pub task: Option<TaskId>,
    pub name: Option<String>,
    pub error: TaskError,
}

impl Failure {
    pub fn is_cancellation(&self) -> bool {
        self.error.is_cancellation()
    }
}

type FailureSink = Box<dyn FnMut(&Failure) + Send>;

enum Inbound<S> {
    Submit {
        id: TaskId,
        task: Task<S>,
        to_stack: bool,
    },
    Clear,
    Wake,
}

type Body<S> = Box<dyn FnOnce(&mut S) -> Result<Outcome<S>, TaskError> + Send>;

enum Work<S> {
    Fresh {
        id: TaskId,
        name: Cow<'static, str>,
        body: Body<S>,
    },
    Running {
        id: TaskId,
        name: Cow<'static, str>,
        resumable: Box<dyn Resumable<S>>,
    },
}

impl<S> Work<S> {
    fn identity(&self) -> (TaskId, Cow<'static, str>) {
        match self {
            Self::Fresh { id, name, .. } | Self::Running { id, name, .. } => (*id, name.clone()),
        }
    }

    /// Run the work once. Returns the continuation to push back, if any.
    fn advance(self, state: &mut S) -> Result<Option<Work<S>>, TaskError> {
        match self {
            Self::Fresh { id, name, body } => match body(state)? {
                Outcome::Done => Ok(None),
                Outcome::Resume(resumable) => Ok(Some(Self::Running {
                    id,
                    name,
                    resumable,
                })),
            },
            Self::Running {
                id,
                name,
                mut resumable,
            } => match resumable.step(state)? {
                Step::Yield => Ok(Some(Self::Running {
                    id,
                    name,
                    resumable,
                })),
                Step::Complete => Ok(None),
            },
        }
    }
}

/// Cloneable, thread-safe handle for talking to a [`Scheduler`].
///
/// This is the only way other threads interact with the timeline.
pub struct SchedulerHandle<S> {
    tx: Sender<Inbound<S>>,
    control: Arc<Control>,
}

impl<S> SchedulerHandle<S> {
    /// Hand a task to the scheduler. Never blocks.
    ///
    /// `to_stack` selects the stack (nested work) over the queue.
    pub fn submit_to(&self, task: Task<S>, to_stack: bool) -> TaskId {
        let id = self.control.next_task_id();
        trace!(task = %id, name = task.name(), to_stack, "submit");
        if self
            .tx
            .send(Inbound::Submit { id, task, to_stack })
            .is_err()
        {
            warn!(task = %id, "scheduler is gone; task dropped");
        }
        id
    }

    /// Append a task to the queue.
    pub fn submit(&self, task: Task<S>) -> TaskId {
        self.submit_to(task, false)
    }

    /// Push a task onto the stack so it runs before any queued work.
    pub fn spawn(&self, task: Task<S>) -> TaskId {
        self.submit_to(task, true)
    }

    /// Raise an interrupt against the running step.
    pub fn interrupt(&self) {
        if self.control.raise() {
            self.wake();
        }
    }

    /// Stop the loop after the current step.
    pub fn exit(&self) {
        self.control.request_exit();
        self.wake();
    }

    /// Ask the loop to drop all pending work.
    ///
    /// The request is ordered with submissions: tasks submitted through this
    /// handle before the call are cleared, tasks submitted after it are not.
    pub fn clear_pending(&self) {
        let _ = self.tx.send(Inbound::Clear);
    }

    /// Cancellation checkpoint for cooperative task code.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        self.control.checkpoint()
    }

    /// Shield the caller from interrupts until the guard is dropped.
    pub fn no_interrupt(&self) -> NoInterrupt {
        NoInterrupt::enter(Arc::clone(&self.control))
    }

    /// The task currently running on this thread, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        TaskScope::current()
    }

    fn wake(&self) {
        let _ = self.tx.send(Inbound::Wake);
    }
}

impl<S> Clone for SchedulerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            control: Arc::clone(&self.control),
        }
    }
}

impl<S> fmt::Debug for SchedulerHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("inbound", &self.tx.len())
            .finish()
    }
}

/// The single-timeline task scheduler.
pub struct Scheduler<S> {
    config: SchedulerConfig,
    tx: Sender<Inbound<S>>,
    rx: Receiver<Inbound<S>>,
    control: Arc<Control>,
    queue: VecDeque<Work<S>>,
    stack: Vec<Work<S>>,
    on_failure: FailureSink,
}

impl<S: 'static> Scheduler<S> {
    pub fn new(config: SchedulerConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            config,
            tx,
            rx,
            control: Arc::new(Control::default()),
            queue: VecDeque::new(),
            stack: Vec::new(),
            on_failure: Box::new(log_failure),
        }
    }

    pub fn handle(&self) -> SchedulerHandle<S> {
        SchedulerHandle {
            tx: self.tx.clone(),
            control: Arc::clone(&self.control),
        }
    }

    /// Register the sink for cancellations and fatal failures.
    pub fn on_failure<F>(&mut self, sink: F)
    where
        F: FnMut(&Failure) + Send + 'static,
    {
        self.on_failure = Box::new(sink);
    }

    pub fn submit(&self, task: Task<S>, to_stack: bool) -> TaskId {
        self.handle().submit_to(task, to_stack)
    }

    pub fn interrupt(&self) {
        self.handle().interrupt();
    }

    pub fn exit(&self) {
        self.handle().exit();
    }

    pub fn no_interrupt(&self) -> NoInterrupt {
        self.handle().no_interrupt()
    }

    /// Drop everything in the queue and the stack.
    pub fn clear_pending(&mut self) {
        let dropped = self.queue.len() + self.stack.len();
        self.queue.clear();
        self.stack.clear();
        if dropped > 0 {
            debug!(dropped, "cleared pending work");
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// True when both worklists and the inbound channel are empty.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.stack.is_empty() && self.rx.is_empty()
    }

    /// Run until [`exit`](SchedulerHandle::exit) is requested.
    pub fn run(&mut self, state: &mut S) {
        info!("scheduler started");
        while !self.control.exit_requested() {
            self.turn_inner(state, true);
        }
        self.control.reset_exit();
        info!(
            queued = self.queue.len(),
            stacked = self.stack.len(),
            "scheduler stopped"
        );
    }

    /// One non-blocking turn. Returns `false` if there was nothing to do.
    pub fn turn(&mut self, state: &mut S) -> bool {
        self.turn_inner(state, false)
    }

    /// Run turns until no work remains. Returns the number of turns taken.
    ///
    /// Also stops early if exit is requested.
    pub fn run_until_idle(&mut self, state: &mut S) -> usize {
        let mut turns = 0;
        while !self.control.exit_requested() && self.turn(state) {
            turns += 1;
        }
        self.control.reset_exit();
        turns
    }

    fn turn_inner(&mut self, state: &mut S, block: bool) -> bool {
        self.drain(block);

        if self.control.take_pending() {
            self.report(Failure {
                task: None,
                name: None,
                error: TaskError::Cancelled,
            });
            return true;
        }

        let Some(work) = self.stack.pop().or_else(|| self.queue.pop_front()) else {
            return false;
        };
        self.execute(work, state);
        true
    }

    fn drain(&mut self, block: bool) {
        if block && self.queue.is_empty() && self.stack.is_empty() {
            match self.rx.recv_timeout(self.config.poll_interval()) {
                Ok(message) => self.accept(message),
                Err(RecvTimeoutError::Timeout) => return,
                // Unreachable while `self.tx` is alive.
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        self.drain_available();
    }

    /// Accept what is in the channel now, without waiting for more.
    fn drain_available(&mut self) {
        let available = self.rx.len();
        for _ in 0..available {
            match self.rx.try_recv() {
                Ok(message) => self.accept(message),
                Err(_) => break,
            }
        }
    }

    fn accept(&mut self, message: Inbound<S>) {
        match message {
            Inbound::Submit { id, task, to_stack } => {
                let (name, body) = task.into_parts();
                let work = Work::Fresh { id, name, body };
                if to_stack {
                    self.stack.push(work);
                } else {
                    self.queue.push_back(work);
                }
            }
            Inbound::Clear => self.clear_pending(),
            Inbound::Wake => {}
        }
    }

    fn execute(&mut self, work: Work<S>, state: &mut S) {
        let (id, name) = work.identity();
        trace!(task = %id, name = %name, "step");

        let result = {
            let _scope = TaskScope::enter(id);
            if self.config.catch_panics {
                panic::catch_unwind(AssertUnwindSafe(|| work.advance(state)))
                    .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))))
            } else {
                work.advance(state)
            }
        };

        match result {
            Ok(Some(next)) => self.stack.push(next),
            Ok(None) => trace!(task = %id, "finished"),
            Err(TaskError::Cancelled) => {
                self.report(Failure {
                    task: Some(id),
                    name: Some(name.into_owned()),
                    error: TaskError::Cancelled,
                });
            }
            Err(error) => {
                // Work the failed task spawned is still in the channel.
                self.drain_available();
                error!(
                    task = %id,
                    name = %name,
                    queued = self.queue.len(),
                    stacked = self.stack.len(),
                    "task failed; abandoning pending work"
                );
                self.clear_pending();
                self.report(Failure {
                    task: Some(id),
                    name: Some(name.into_owned()),
                    error,
                });
            }
        }
    }

    fn report(&mut self, failure: Failure) {
        (self.on_failure)(&failure);
    }
}

impl<S> fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .field("stacked", &self.stack.len())
            .field("inbound", &self.rx.len())
            .finish()
    }
}

fn log_failure(failure: &Failure) {
    let task = failure.task.map(|id| id.to_string());
    if failure.is_cancellation() {
        warn!(task = ?task, name = ?failure.name, "interrupted");
    } else {
        error!(task = ?task, name = ?failure.name, error = %failure.error, "task failed");
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;

    type Log = Vec<&'static str>;

    fn scheduler() -> (Scheduler<Log>, Arc<Mutex<Vec<Failure>>>) {
        let mut scheduler = Scheduler::new(SchedulerConfig {
            poll_interval_ms: 5,
            catch_panics: true,
        });
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        scheduler.on_failure(move |failure| sink.lock().push(failure.clone()));
        (scheduler, failures)
    }

    fn record(label: &'static str) -> Task<Log> {
        Task::new(label, move |log: &mut Log| {
            log.push(label);
            Ok(())
        })
    }

    #[test]
    fn stack_runs_before_queue() {
        let (mut scheduler, _) = scheduler();
        let handle = scheduler.handle();

        let spawner = handle.clone();
        handle.submit(Task::new("A", move |log: &mut Log| {
            log.push("A");
            spawner.spawn(record("B"));
            spawner.submit(record("C"));
            Ok(())
        }));
        handle.submit(record("D"));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn nested_spawns_are_lifo() {
        let (mut scheduler, _) = scheduler();
        let handle = scheduler.handle();

        let spawner = handle.clone();
        handle.submit(Task::new("root", move |log: &mut Log| {
            log.push("root");
            spawner.spawn(record("first"));
            spawner.spawn(record("second"));
            Ok(())
        }));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["root", "second", "first"]);
    }

    #[test]
    fn resumable_first_step_runs_next_turn() {
        let (mut scheduler, _) = scheduler();
        scheduler.submit(
            Task::resumable("count", |log: &mut Log| {
                log.push("start");
                let mut steps = 0;
                Ok(move |log: &mut Log| -> Result<Step, TaskError> {
                    steps += 1;
                    log.push("step");
                    Ok(if steps == 3 { Step::Complete } else { Step::Yield })
                })
            }),
            false,
        );

        let mut log = Log::new();
        assert!(scheduler.turn(&mut log));
        assert_eq!(log, vec!["start"]);
        assert_eq!(scheduler.stack_len(), 1);

        assert!(scheduler.turn(&mut log));
        assert_eq!(log, vec!["start", "step"]);

        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["start", "step", "step", "step"]);
        assert_eq!(scheduler.stack_len(), 0);
    }

    #[test]
    fn resumable_interleaves_with_spawned_work() {
        let (mut scheduler, _) = scheduler();
        let handle = scheduler.handle();
        let spawner = handle.clone();
        let mut remaining = 2;

        handle.submit(Task::resumable("loop", move |_: &mut Log| {
            Ok(move |log: &mut Log| -> Result<Step, TaskError> {
                log.push("iteration");
                spawner.spawn(record("reaction"));
                remaining -= 1;
                Ok(if remaining == 0 { Step::Complete } else { Step::Yield })
            })
        }));
        handle.submit(record("later"));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(
            log,
            vec!["iteration", "reaction", "iteration", "reaction", "later"]
        );
    }

    #[test]
    fn cancellation_preserves_pending_work() {
        let (mut scheduler, failures) = scheduler();
        let handle = scheduler.handle();

        let control = handle.clone();
        let cancelled = handle.submit(Task::new("long", move |log: &mut Log| {
            log.push("long:start");
            control.spawn(record("spawned"));
            control.interrupt();
            control.checkpoint()?;
            log.push("long:end");
            Ok(())
        }));
        handle.submit(record("next"));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);

        assert_eq!(log, vec!["long:start", "spawned", "next"]);
        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].is_cancellation());
        assert_eq!(failures[0].task, Some(cancelled));
    }

    #[test]
    fn fatal_failure_clears_pending_work() {
        let (mut scheduler, failures) = scheduler();
        let handle = scheduler.handle();

        let control = handle.clone();
        handle.submit(Task::new("bad", move |log: &mut Log| {
            log.push("bad");
            control.spawn(record("spawned"));
            control.submit(record("queued-by-bad"));
            Err(TaskError::failed("node logic error"))
        }));
        handle.submit(record("independent"));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["bad"]);
        assert_eq!(scheduler.queue_len(), 0);
        assert_eq!(scheduler.stack_len(), 0);
        assert_eq!(
            failures.lock()[0].error,
            TaskError::Failed("node logic error".into())
        );

        // The loop keeps accepting work.
        handle.submit(record("after"));
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["bad", "after"]);
    }

    #[test]
    fn panics_are_fatal_failures() {
        let (mut scheduler, failures) = scheduler();
        let handle = scheduler.handle();
        handle.submit(Task::new("panics", |_: &mut Log| -> Result<(), TaskError> {
            panic!("kaboom")
        }));
        handle.submit(record("dropped"));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert!(log.is_empty());
        assert_eq!(
            failures.lock()[0].error,
            TaskError::Panicked("kaboom".into())
        );
    }

    #[test]
    fn no_interrupt_section_suppresses_cancellation() {
        let (mut scheduler, failures) = scheduler();
        let handle = scheduler.handle();

        let control = handle.clone();
        handle.submit(Task::new("critical", move |log: &mut Log| {
            let _section = control.no_interrupt();
            control.interrupt();
            control.checkpoint()?;
            log.push("swapped");
            Ok(())
        }));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["swapped"]);
        assert!(failures.lock().is_empty());

        // Delivery resumes once the section is over.
        handle.interrupt();
        assert!(handle.checkpoint().is_err());
    }

    #[test]
    fn idle_interrupt_is_reported_without_a_task() {
        let (mut scheduler, failures) = scheduler();
        scheduler.interrupt();
        scheduler.submit(record("kept"), false);

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["kept"]);
        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, None);
    }

    #[test]
    fn clear_pending_request_is_ordered_with_submissions() {
        let (mut scheduler, _) = scheduler();
        let handle = scheduler.handle();
        handle.submit(record("before"));
        handle.clear_pending();
        handle.submit(record("after"));

        let mut log = Log::new();
        scheduler.run_until_idle(&mut log);
        assert_eq!(log, vec!["after"]);
    }

    #[test]
    fn task_scope_matches_submitted_id() {
        let (mut scheduler, _) = scheduler();
        let handle = scheduler.handle();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        let probe = handle.clone();
        let id = handle.submit(Task::new("probe", move |_: &mut Log| {
            *slot.lock() = probe.current_task();
            Ok(())
        }));

        scheduler.run_until_idle(&mut Log::new());
        assert_eq!(*seen.lock(), Some(id));
        assert_eq!(handle.current_task(), None);
    }

    #[test]
    fn run_exits_when_requested_from_another_thread() {
        let (mut scheduler, _) = scheduler();
        let handle = scheduler.handle();

        let producer = thread::spawn(move || {
            handle.submit(record("remote-1"));
            handle.submit(record("remote-2"));
            let exit = handle.clone();
            handle.submit(Task::new("stop", move |log: &mut Log| {
                log.push("stop");
                exit.exit();
                Ok(())
            }));
        });

        let mut log = Log::new();
        scheduler.run(&mut log);
        producer.join().unwrap();
        assert_eq!(log, vec!["remote-1", "remote-2", "stop"]);
    }
}
