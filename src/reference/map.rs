use super::{share, ObjectStatus, RemoteRef, RemoteReference};
use crate::util::error::{Result, TeleError};
use crate::util::Address;
use enum_map::EnumMap;
use std::collections::HashMap;
use std::sync::Arc;

/// References known to a scheme, keyed by origin address.
///
/// The map owns one strong handle to each reference. Clients get clones of that handle; an entry
/// no client holds any more is dropped by [`WeakReferenceMap::sweep`], which the schemes run at
/// the start of every update pass. Each origin maps to at most one reference: inserting at an
/// occupied origin is an inconsistency in the caller.
#[derive(Debug)]
pub struct WeakReferenceMap<R: RemoteReference> {
    name: &'static str,
    refs: HashMap<Address, Arc<R>>,
}

impl<R: RemoteReference> WeakReferenceMap<R> {
    pub fn new(name: &'static str) -> Self {
        WeakReferenceMap {
            name,
            refs: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, origin: Address) -> Option<&Arc<R>> {
        self.refs.get(&origin)
    }

    pub fn contains(&self, origin: Address) -> bool {
        self.refs.contains_key(&origin)
    }

    /// Insert a reference at `origin`. Fails if another reference is already tracked there.
    pub fn put(&mut self, origin: Address, reference: Arc<R>) -> Result<()> {
        if let Some(existing) = self.refs.get(&origin) {
            return Err(TeleError::Inconsistent(format!(
                "{}: origin {} already tracked by {:?}, cannot add {:?}",
                self.name, origin, existing, reference
            )));
        }
        self.refs.insert(origin, reference);
        Ok(())
    }

    pub fn remove(&mut self, origin: Address) -> Option<Arc<R>> {
        self.refs.remove(&origin)
    }

    /// Exchange entries with `other`; each map keeps its name.
    pub fn swap_contents(&mut self, other: &mut WeakReferenceMap<R>) {
        std::mem::swap(&mut self.refs, &mut other.refs);
    }

    /// Remove every entry, returning them.
    pub fn take_all(&mut self) -> Vec<Arc<R>> {
        self.refs.drain().map(|(_, r)| r).collect()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, &Arc<R>)> + '_ {
        self.refs.iter().map(|(origin, r)| (*origin, r))
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<R>> + '_ {
        self.refs.values()
    }

    /// The entries as client handles, each with the name of this map.
    pub fn shared(&self) -> impl Iterator<Item = (&'static str, Address, RemoteRef)> + '_
    where
        R: 'static,
    {
        self.refs
            .iter()
            .map(|(origin, r)| (self.name, *origin, share(r)))
    }

    /// A snapshot of the entries, so that the map can be mutated while walking them.
    pub fn snapshot(&self) -> Vec<(Address, Arc<R>)> {
        self.refs.iter().map(|(a, r)| (*a, r.clone())).collect()
    }

    /// Drop entries nobody but this map holds. Returns how many were dropped.
    pub fn sweep(&mut self) -> usize {
        let before = self.refs.len();
        self.refs.retain(|_, r| Arc::strong_count(r) > 1);
        before - self.refs.len()
    }

    /// Drop entries whose reference has died.
    pub fn remove_dead(&mut self) -> usize {
        let before = self.refs.len();
        self.refs.retain(|_, r| !r.status().is_dead());
        before - self.refs.len()
    }

    /// Number of entries per status.
    pub fn status_counts(&self) -> EnumMap<ObjectStatus, usize> {
        let mut counts = EnumMap::default();
        for r in self.refs.values() {
            counts[r.status()] += 1;
        }
        counts
    }

    /// Every entry must be keyed by its own origin, satisfy `allowed`, and not be dead.
    pub fn check_entries<F>(&self, allowed: F) -> Result<()>
    where
        F: Fn(Address, &R) -> bool,
    {
        for (origin, r) in self.refs.iter() {
            if r.status().is_dead() {
                return Err(TeleError::Inconsistent(format!(
                    "{}: dead reference {:?} still mapped",
                    self.name, r
                )));
            }
            if r.origin() != *origin {
                return Err(TeleError::Inconsistent(format!(
                    "{}: reference {:?} mapped at {}",
                    self.name, r, origin
                )));
            }
            if !allowed(*origin, r) {
                return Err(TeleError::Inconsistent(format!(
                    "{}: reference {:?} does not belong in this map",
                    self.name, r
                )));
            }
        }
        Ok(())
    }
}
