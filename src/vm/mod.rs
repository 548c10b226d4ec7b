//! The boundary between the heap inspector and the debugger that embeds it.
//!
//! The debugger provides three services, each as a trait: raw remote memory reads
//! ([`RemoteMemory`]), access to the collector's bookkeeping through the target's class
//! metadata ([`CollectorInspection`]), and process control ([`ProcessControl`]).
//! [`RemoteVM`] bundles them; any type implementing the three traits is a `RemoteVM`.

mod collection;
mod heap_access;
mod memory;

pub use self::collection::{ProcessControl, ProcessLock};
pub use self::heap_access::{CollectorField, CollectorInspection, RemoteFieldAccess};
pub use self::memory::RemoteMemory;

/// Everything the inspector needs from the debugger for one attached target VM.
pub trait RemoteVM:
    RemoteMemory + CollectorInspection + ProcessControl + Send + Sync + 'static
{
}

impl<T> RemoteVM for T where
    T: RemoteMemory + CollectorInspection + ProcessControl + Send + Sync + 'static
{
}

#[cfg(test)]
mod tests;
