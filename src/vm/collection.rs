use crate::scheme::HeapPhase;
use crate::util::error::{Result, TeleError};

/// Control over the target process, provided by the debugger's process-control layer.
///
/// The inspector never halts or resumes the target itself. It only needs to know that the
/// target is halted while it looks, and to ask for a halt at the one moment per collection
/// where forwarding information is complete but has not yet been reclaimed.
pub trait ProcessControl {
    /// Try to take the process-wide inspection lock without blocking. Returns false if another
    /// party holds it or the target is running.
    fn try_lock_process(&self) -> bool;

    /// Release the inspection lock taken by a successful [`ProcessControl::try_lock_process`].
    fn unlock_process(&self);

    /// Ask the process-control layer to halt the target every time the heap enters `phase`.
    ///
    /// Returns [`TeleError::Busy`] if the breakpoint cannot be installed right now.
    fn add_gc_phase_breakpoint(&self, phase: HeapPhase) -> Result<()>;
}

/// Holds the inspection lock of a [`ProcessControl`] until dropped.
pub struct ProcessLock<'a, P: ProcessControl + ?Sized> {
    process: &'a P,
}

impl<'a, P: ProcessControl + ?Sized> ProcessLock<'a, P> {
    /// Take the inspection lock or fail with [`TeleError::Busy`].
    pub fn acquire(process: &'a P) -> Result<Self> {
        if process.try_lock_process() {
            Ok(ProcessLock { process })
        } else {
            Err(TeleError::Busy)
        }
    }
}

impl<P: ProcessControl + ?Sized> Drop for ProcessLock<'_, P> {
    fn drop(&mut self) {
        self.process.unlock_process();
    }
}
