//! Interrupt Control
//!
//! Interrupts are raised asynchronously (from any thread) and delivered
//! cooperatively: a pending interrupt only takes effect at a checkpoint,
//! either between scheduler steps or where task code calls
//! [`SchedulerHandle::checkpoint`](super::SchedulerHandle::checkpoint).
//!
//! A [`NoInterrupt`] guard shields a critical sequence. While any guard is
//! alive, newly raised interrupts are logged and dropped instead of being
//! queued for delivery.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::TaskId;
use crate::error::TaskError;

/// Flags shared between the scheduler loop and its handles.
#[derive(Debug, Default)]
pub(crate) struct Control {
    interrupt: AtomicBool,
    shielded: AtomicUsize,
    exit: AtomicBool,
    next_task: AtomicU64,
}

impl Control {
    /// Raise an interrupt. Returns `false` if a no-interrupt section dropped it.
    pub(crate) fn raise(&self) -> bool {
        if self.shielded.load(Ordering::SeqCst) > 0 {
            warn!("interrupt suppressed inside no-interrupt section");
            return false;
        }
        self.interrupt.store(true, Ordering::SeqCst);
        true
    }

    /// Consume a pending interrupt, unless a section is shielding delivery.
    pub(crate) fn take_pending(&self) -> bool {
        if self.is_shielded() {
            return false;
        }
        self.interrupt.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn checkpoint(&self) -> Result<(), TaskError> {
        if self.take_pending() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_shielded(&self) -> bool {
        self.shielded.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_exit(&self) {
        self.exit.store(false, Ordering::SeqCst);
    }

    pub(crate) fn next_task_id(&self) -> TaskId {
        TaskId::from(self.next_task.fetch_add(1, Ordering::Relaxed))
    }
}

/// Guard for a scoped no-interrupt section.
///
/// Sections nest; interrupts are shielded until the outermost guard drops.
/// Dropping during a panic still restores normal delivery.
#[must_use = "the section ends as soon as the guard is dropped"]
pub struct NoInterrupt {
    control: Arc<Control>,
}

impl NoInterrupt {
    pub(crate) fn enter(control: Arc<Control>) -> Self {
        control.shielded.fetch_add(1, Ordering::SeqCst);
        Self { control }
    }
}

impl Drop for NoInterrupt {
    fn drop(&mut self) {
        self.control.shielded.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for NoInterrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoInterrupt")
            .field("depth", &self.control.shielded.load(Ordering::SeqCst))
            .finish()
    }
}
