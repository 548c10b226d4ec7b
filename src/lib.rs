//! Out-of-process model of a managed runtime's garbage-collected heap.
//!
//! A debugger attached to a running VM cannot watch its collector work. It only gets to look
//! at the target while it is halted. This crate keeps an up-to-date model of the target's heap
//! across those halts: which regions exist, which addresses hold live objects, which objects
//! have been relocated and where to, and which memory is free.
//!
//! The main parts are:
//! * [`HeapInspector`]: the session driver, refreshed once per halt ("epoch").
//! * [`scheme`]: one [`RemoteHeapScheme`] per collector algorithm, reconciling the model with
//!   the collector's phase and counters.
//! * [`reference`]: the local stand-ins for remote objects, with their state machines.
//! * [`policy`]: the region descriptors the collectors allocate in.
//! * [`vm`]: the traits the debugger implements to give the crate access to the target.

pub mod inspector;
pub mod policy;
pub mod reference;
pub mod scheme;
pub mod util;
pub mod vm;

pub use crate::inspector::HeapInspector;
pub use crate::reference::{ObjectStatus, RemoteRef, RemoteReference};
pub use crate::scheme::{Epoch, HeapPhase, RemoteHeapScheme};
pub use crate::util::error::{Result, TeleError};
pub use crate::util::options::{HeapSchemeSelector, Options};
pub use crate::util::Address;
