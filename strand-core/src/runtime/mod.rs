//! Cooperative Task Runtime
//!
//! This module implements the single execution timeline: tasks, the
//! scheduler that orders them, interrupt delivery, and the per-thread task
//! context used for attributing side effects.
//!
//! # Concepts
//!
//! ## Tasks
//!
//! A [`Task`] either runs to completion in one scheduler turn, or returns a
//! [`Resumable`] computation that is advanced one [`Step`] per turn. Long
//! running node computations must be resumable, otherwise they stall the
//! whole timeline.
//!
//! ## Queue and Stack
//!
//! Independently submitted tasks wait in a FIFO queue. Tasks spawned while
//! another task runs go onto a LIFO stack, which is always drained first.
//!
//! ## Interrupts
//!
//! Interrupts are raised from any thread and delivered at checkpoints. They
//! cancel the running step but keep every other pending task. A
//! [`NoInterrupt`] guard shields a critical sequence.
//!
//! # Thread Safety
//!
//! The [`Scheduler`] and the state it drives live on one thread. Other
//! threads only hold a [`SchedulerHandle`], whose operations never block.

mod context;
mod interrupt;
mod scheduler;
mod task;

pub use context::TaskScope;
pub use interrupt::NoInterrupt;
pub use scheduler::{Failure, Scheduler, SchedulerHandle};
pub use task::{Outcome, Resumable, Step, Task, TaskId};
