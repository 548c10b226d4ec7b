//! Local representations of objects observed in the remote heap.
//!
//! A remote reference stands for one object (or quasi-object) at a remembered location in the
//! target. It carries a small state machine describing what is currently known about that
//! object: live, reachability undetermined, forwarded, dead, or free. Each collector family has
//! its own set of states ([`semispace`], [`gen_semispace`], [`marksweep`], [`gen_marksweep`]);
//! all of them share the storage and bookkeeping in [`SchemeReference`].
//!
//! References are mutated in place as their state advances. A reference handed out to a client
//! keeps reporting the up-to-date state until it becomes [`ObjectStatus::Dead`], after which
//! the owning scheme no longer tracks it.

pub mod gen_marksweep;
pub mod gen_semispace;
mod map;
pub mod marksweep;
pub mod semispace;

pub use self::map::WeakReferenceMap;

use crate::util::error::{Result, TeleError};
use crate::util::Address;
use atomic_refcell::AtomicRefCell;
use enum_map::Enum;
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// What is known about the object at a location.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, Display, EnumIter, IntoStaticStr)]
pub enum ObjectStatus {
    /// An ordinary object that is known to be live.
    #[strum(serialize = "LIVE")]
    Live,
    /// A quasi-object: the stale old copy of a relocated object, now holding only a forwarding
    /// pointer to the new copy.
    #[strum(serialize = "FORWARDER")]
    Forwarder,
    /// An ordinary object whose reachability the collector has not decided yet. Only seen
    /// while the heap is [`crate::HeapPhase::Analyzing`].
    #[strum(serialize = "UNKNOWN")]
    Unknown,
    /// No object (any longer). Terminal.
    #[strum(serialize = "DEAD")]
    Dead,
    /// A quasi-object: an explicitly formatted chunk of free space.
    #[strum(serialize = "FREE")]
    Free,
}

impl ObjectStatus {
    /// Short label for reports.
    pub fn label(self) -> &'static str {
        self.into()
    }

    /// Is this an ordinary object that may be live (LIVE or UNKNOWN)?
    pub fn is_not_dead_object(self) -> bool {
        matches!(self, ObjectStatus::Live | ObjectStatus::Unknown)
    }

    /// Is this one of the quasi-object kinds?
    pub fn is_quasi(self) -> bool {
        matches!(self, ObjectStatus::Forwarder | ObjectStatus::Free)
    }

    pub fn is_dead(self) -> bool {
        self == ObjectStatus::Dead
    }
}

/// The client-facing view of a remote reference.
pub trait RemoteReference: fmt::Debug + Send + Sync {
    /// The current, authoritative location of the object in the target.
    fn origin(&self) -> Address;
    /// What is currently known about the object.
    fn status(&self) -> ObjectStatus;
    /// The status before the most recent state transition, if there has been one.
    fn prior_status(&self) -> Option<ObjectStatus>;
    /// For a relocated object: where it was before the collection in progress moved it.
    fn forwarded_from(&self) -> Option<Address>;
    /// For a forwarder: where the object it forwards to now lives.
    fn forwarded_to(&self) -> Option<Address>;
    /// A description of the reference's collector-specific state, for diagnostics.
    fn gc_description(&self) -> String;
}

/// A shared handle to a remote reference, as handed to clients.
pub type RemoteRef = Arc<dyn RemoteReference>;

/// Hand out a tracked reference to a client.
pub fn share<R: RemoteReference + 'static>(reference: &Arc<R>) -> RemoteRef {
    reference.clone()
}

/// How a state interprets the alternate address a reference carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlternateRole {
    /// The state carries no alternate address.
    None,
    /// The alternate address is the object's location before it was relocated.
    ForwardedFrom,
    /// The alternate address is where the forwarder points.
    ForwardedTo,
}

/// One state of a collector family's reference state machine.
pub trait RefState: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Name of the collector family, used in [`RemoteReference::gc_description`].
    const FAMILY: &'static str;
    fn status(self) -> ObjectStatus;
    fn label(self) -> &'static str;
    fn alternate_role(self) -> AlternateRole;
}

#[derive(Debug)]
pub(crate) struct RefData<S: RefState> {
    pub(crate) origin: Address,
    pub(crate) alternate: Option<Address>,
    pub(crate) state: S,
    pub(crate) prior_status: Option<ObjectStatus>,
}

/// Storage shared by every reference family: the origin, an optional alternate address (the
/// other end of a forwarding relationship) and the current state, behind an atomic refcell so
/// that clients can share the reference while the update pass mutates it in place.
pub struct SchemeReference<S: RefState> {
    data: AtomicRefCell<RefData<S>>,
}

impl<S: RefState> SchemeReference<S> {
    pub(crate) fn new(origin: Address, alternate: Option<Address>, state: S) -> Arc<Self> {
        debug_assert!(!origin.is_zero());
        Arc::new(SchemeReference {
            data: AtomicRefCell::new(RefData {
                origin,
                alternate,
                state,
                prior_status: None,
            }),
        })
    }

    /// The current state.
    pub fn state(&self) -> S {
        self.data.borrow().state
    }

    pub(crate) fn alternate(&self) -> Option<Address> {
        self.data.borrow().alternate
    }

    /// Apply a state transition. `apply` returns false if the current state does not accept
    /// `event`, in which case nothing changes and an [`TeleError::IllegalTransition`] is returned.
    pub(crate) fn transition<F>(&self, event: &'static str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RefData<S>) -> bool,
    {
        let mut data = self.data.borrow_mut();
        let before = data.state;
        let before_origin = data.origin;
        let before_alternate = data.alternate;
        if apply(&mut data) {
            data.prior_status = Some(before.status());
            Ok(())
        } else {
            data.state = before;
            data.origin = before_origin;
            data.alternate = before_alternate;
            Err(TeleError::IllegalTransition {
                state: before.label(),
                event,
            })
        }
    }

    /// Unconditionally retire the reference. Used when the observer has lost track of the
    /// collector (a missed collection cycle) and can no longer vouch for the object.
    pub(crate) fn declare_dead(&self, dead: S) {
        debug_assert!(dead.status().is_dead());
        let mut data = self.data.borrow_mut();
        data.prior_status = Some(data.state.status());
        data.state = dead;
        data.alternate = None;
    }
}

impl<S: RefState> RemoteReference for SchemeReference<S> {
    fn origin(&self) -> Address {
        self.data.borrow().origin
    }

    fn status(&self) -> ObjectStatus {
        self.data.borrow().state.status()
    }

    fn prior_status(&self) -> Option<ObjectStatus> {
        self.data.borrow().prior_status
    }

    fn forwarded_from(&self) -> Option<Address> {
        let data = self.data.borrow();
        match data.state.alternate_role() {
            AlternateRole::ForwardedFrom => data.alternate,
            _ => None,
        }
    }

    fn forwarded_to(&self) -> Option<Address> {
        let data = self.data.borrow();
        match data.state.alternate_role() {
            AlternateRole::ForwardedTo => data.alternate,
            _ => None,
        }
    }

    fn gc_description(&self) -> String {
        format!("{} state={}", S::FAMILY, self.data.borrow().state.label())
    }
}

impl<S: RefState> fmt::Debug for SchemeReference<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = self.data.borrow();
        write!(f, "{} origin: {}", data.state.label(), data.origin)?;
        if let Some(alternate) = data.alternate {
            write!(f, " alt: {}", alternate)?;
        }
        Ok(())
    }
}

/// The operations the shared forwarding-discovery pass needs from a reference family.
pub(crate) trait Relocatable: RemoteReference + Sized {
    /// Is this an unforwarded reference into the space being evacuated?
    fn awaits_forwarding(&self) -> bool;
    /// The object was found to have been copied to `to`; the reference follows it.
    fn discover_forwarded(&self, to: Address) -> Result<()>;
    /// Could this reference be the new copy of an object whose old location is not known yet?
    fn awaits_forwarder(&self) -> bool;
    /// A reference already tracking the new copy learns where the object came from.
    fn discover_forwarder(&self, from: Address) -> Result<()>;
    /// The reference stays at its old location and becomes the forwarder to `to`, because
    /// another reference already tracks the new copy.
    fn become_forwarder(&self, to: Address) -> Result<()>;
    /// Create the forwarder quasi-reference left behind at the old location of a relocated
    /// reference.
    fn create_forwarder(&self) -> Result<Arc<Self>>;
}
