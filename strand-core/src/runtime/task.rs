//! Tasks
//!
//! A task is a unit of work that runs on the scheduler timeline with
//! exclusive access to the timeline state `S` (for the dataflow runtime, the
//! [`Graph`](crate::graph::Graph)).
//!
//! Tasks come in two shapes:
//!
//! - run-to-completion: the body runs once and the task is finished;
//! - resumable: the body returns a [`Resumable`] computation that the
//!   scheduler steps once per turn until it reports [`Step::Complete`].
//!
//! Resumables are explicit state machines rather than language-level
//! generators, so the scheduler only has to know about `step`.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Identifier assigned to a task when it is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Result of advancing a resumable computation by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains; the computation is pushed back onto the stack.
    Yield,
    /// The computation is finished and will be dropped.
    Complete,
}

/// A computation that can be advanced step by step.
pub trait Resumable<S>: Send {
    /// Advance by one step.
    fn step(&mut self, state: &mut S) -> Result<Step, TaskError>;
}

impl<S, F> Resumable<S> for F
where
    F: FnMut(&mut S) -> Result<Step, TaskError> + Send,
{
    fn step(&mut self, state: &mut S) -> Result<Step, TaskError> {
        self(state)
    }
}

/// What a task body produced.
pub enum Outcome<S> {
    Done,
    Resume(Box<dyn Resumable<S>>),
}

impl<S> fmt::Debug for Outcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Resume(_) => f.write_str("Resume(..)"),
        }
    }
}

type Body<S> = Box<dyn FnOnce(&mut S) -> Result<Outcome<S>, TaskError> + Send>;

/// A unit of schedulable work.
pub struct Task<S> {
    name: Cow<'static, str>,
    body: Body<S>,
}

impl<S: 'static> Task<S> {
    /// A run-to-completion task.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: FnOnce(&mut S) -> Result<(), TaskError> + Send + 'static,
    {
        Self::from_outcome(name, move |state| body(state).map(|()| Outcome::Done))
    }

    /// A task whose body returns a resumable computation.
    ///
    /// The body runs in one turn; the first step of the returned computation
    /// runs on the following turn.
    pub fn resumable<F, R>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: FnOnce(&mut S) -> Result<R, TaskError> + Send + 'static,
        R: Resumable<S> + 'static,
    {
        Self::from_outcome(name, move |state| {
            body(state).map(|resumable| Outcome::Resume(Box::new(resumable)))
        })
    }

    /// A task whose body decides at run time whether it needs more steps.
    pub fn from_outcome<F>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: FnOnce(&mut S) -> Result<Outcome<S>, TaskError> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl<S> Task<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (Cow<'static, str>, Body<S>) {
        (self.name, self.body)
    }
}

impl<S> fmt::Debug for Task<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}
