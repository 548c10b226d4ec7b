//! Discovery of objects relocated by a copying collection.
//!
//! A copying collector overwrites the hub word of each evacuated object with a tagged pointer
//! to the new copy. At every halt during analysis, the tracked references that still point into
//! the evacuated space are checked for such a forwarding word; each one found is moved to the
//! map of the space it was copied to, and a forwarder quasi-reference takes its place.

use crate::reference::{Relocatable, RemoteReference, WeakReferenceMap};
use crate::util::error::Result;
use crate::util::log::trace;
use crate::util::object_probe::HeaderLayout;
use crate::util::Address;
use crate::vm::RemoteMemory;
use std::sync::Arc;

/// Outcome of one discovery pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardingSummary {
    /// References that followed their object to its new copy.
    pub forwarded: usize,
    /// References that became forwarders because the new copy was already tracked.
    pub merged: usize,
    /// Forwarding words pointing outside the destination space, ignored.
    pub rejected: usize,
}

impl ForwardingSummary {
    pub fn add(&mut self, other: ForwardingSummary) {
        self.forwarded += other.forwarded;
        self.merged += other.merged;
        self.rejected += other.rejected;
    }
}

/// Check every reference in `from_refs` that awaits forwarding.
///
/// `destination` maps the decoded new origin to the index in `to_refs` of the map that tracks
/// it, or `None` if the address is not in the allocated part of a destination space (in which
/// case the forwarding word is not trusted).
pub(crate) fn discover_forwarding<R, M, F>(
    memory: &M,
    layout: &HeaderLayout,
    from_refs: &mut WeakReferenceMap<R>,
    to_refs: &mut [&mut WeakReferenceMap<R>],
    destination: F,
) -> Result<ForwardingSummary>
where
    R: Relocatable,
    M: RemoteMemory + ?Sized,
    F: Fn(Address) -> Option<usize>,
{
    let mut summary = ForwardingSummary::default();
    let candidates: Vec<_> = from_refs
        .snapshot()
        .into_iter()
        .filter(|(_, r)| r.awaits_forwarding())
        .collect();

    for (from, reference) in candidates {
        let Some(to) = layout.forwarding_address(memory, from) else {
            continue;
        };
        let Some(index) = destination(to) else {
            trace!("Ignoring forwarding word at {} pointing to {}", from, to);
            summary.rejected += 1;
            continue;
        };
        if let Some(existing) = to_refs.iter().find_map(|map| map.get(to)) {
            // The new copy is already tracked: it keeps the identity, the old one forwards.
            existing.discover_forwarder(from)?;
            reference.become_forwarder(to)?;
            summary.merged += 1;
        } else {
            from_refs.remove(from);
            reference.discover_forwarded(to)?;
            to_refs[index].put(to, reference.clone())?;
            from_refs.put(from, reference.create_forwarder()?)?;
            summary.forwarded += 1;
        }
        trace!("Forwarded {} -> {}: {:?}", from, to, reference);
    }
    debug_assert!(from_refs
        .values()
        .all(|r| r.awaits_forwarding() || r.forwarded_to().is_some()));
    Ok(summary)
}

/// A forwarder quasi-reference from `from` has just been created. The reference already tracking
/// the new copy, if any, learns where the object came from.
pub(crate) fn link_forwarder<R: Relocatable>(copy: Option<&Arc<R>>, from: Address) -> Result<()> {
    match copy {
        Some(copy) if copy.awaits_forwarder() => {
            trace!("Linking {} to forwarder {}", copy.origin(), from);
            copy.discover_forwarder(from)
        }
        _ => Ok(()),
    }
}

/// A reference to a copy in to-space has just been created. If a tracked forwarder points at
/// it, the copy learns where the object came from.
pub(crate) fn link_copy<R: Relocatable>(copy: &R, from_refs: &WeakReferenceMap<R>) -> Result<()> {
    if !copy.awaits_forwarder() {
        return Ok(());
    }
    let to = copy.origin();
    match from_refs.iter().find(|(_, r)| r.forwarded_to() == Some(to)) {
        Some((from, _)) => {
            trace!("Linking {} to forwarder {}", to, from);
            copy.discover_forwarder(from)
        }
        None => Ok(()),
    }
}
