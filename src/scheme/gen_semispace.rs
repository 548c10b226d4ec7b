//! Remote model of a generational collector with a non-aging nursery and a semispace old
//! generation.
//!
//! Every collection evacuates the nursery into the old generation's to-space, above the
//! evacuation mark. A full collection also flips the old generation's semispaces and evacuates
//! the old from-space. Whether a collection is full is decided when its analysis begins, from
//! the target's full-collection counter.

use super::forwarding::{discover_forwarding, link_copy, link_forwarder, ForwardingSummary};
use super::global::{
    is_startup_gap, read_count, CommonScheme, CreateSchemeArgs, Epoch, HeapCounters, HeapPhase,
    PlannedUpdate, RemoteHeapScheme,
};
use super::info::{MemoryManagementInfo, RegionRole};
use super::stats::{MapStats, RegionStats, SchemeStats};
use crate::policy::HeapRegion;
use crate::reference::gen_semispace::{CollectionKind, GenSemiSpaceRef, GenSemiSpaceRefState};
use crate::reference::{share, ObjectStatus, RemoteRef, RemoteReference, WeakReferenceMap};
use crate::util::error::{tele_check, Result};
use crate::util::log::{debug, warn};
use crate::util::options::HeapSchemeSelector;
use crate::util::Address;
use crate::vm::{CollectorField, RemoteFieldAccess, RemoteVM};
use std::sync::Arc;

/// Region geometry and collector bookkeeping read at one halt.
struct GenerationSnapshot {
    nursery: HeapRegion,
    old: (HeapRegion, HeapRegion),
    evacuation_mark: Address,
    full_count: u64,
}

pub struct GenSemiSpaceScheme<VM: RemoteVM> {
    common: CommonScheme<VM>,
    nursery: Option<HeapRegion>,
    /// (old to-space, old from-space)
    old: Option<(HeapRegion, HeapRegion)>,
    evacuation_mark: Address,
    last_full_count: u64,
    /// Kind of the collection being tracked.
    cycle_kind: Option<CollectionKind>,
    nursery_refs: WeakReferenceMap<GenSemiSpaceRef>,
    old_to_refs: WeakReferenceMap<GenSemiSpaceRef>,
    /// Objects found above the evacuation mark during a minor collection.
    promoted_refs: WeakReferenceMap<GenSemiSpaceRef>,
    old_from_refs: WeakReferenceMap<GenSemiSpaceRef>,
}

impl<VM: RemoteVM> GenSemiSpaceScheme<VM> {
    pub fn new(args: CreateSchemeArgs<VM>) -> Self {
        GenSemiSpaceScheme {
            common: CommonScheme::new(args),
            nursery: None,
            old: None,
            evacuation_mark: Address::ZERO,
            last_full_count: 0,
            cycle_kind: None,
            nursery_refs: WeakReferenceMap::new("nursery"),
            old_to_refs: WeakReferenceMap::new("old to-space"),
            promoted_refs: WeakReferenceMap::new("promoted"),
            old_from_refs: WeakReferenceMap::new("old from-space"),
        }
    }

    pub fn nursery(&self) -> Option<&HeapRegion> {
        self.nursery.as_ref()
    }

    pub fn old_to_space(&self) -> Option<&HeapRegion> {
        self.old.as_ref().map(|(to, _)| to)
    }

    pub fn old_from_space(&self) -> Option<&HeapRegion> {
        self.old.as_ref().map(|(_, from)| from)
    }

    pub fn evacuation_mark(&self) -> Address {
        self.evacuation_mark
    }

    /// Kind of the collection in progress, if one is being tracked.
    pub fn collection_kind(&self) -> Option<CollectionKind> {
        self.cycle_kind
    }

    pub fn nursery_refs(&self) -> &WeakReferenceMap<GenSemiSpaceRef> {
        &self.nursery_refs
    }

    pub fn old_to_refs(&self) -> &WeakReferenceMap<GenSemiSpaceRef> {
        &self.old_to_refs
    }

    pub fn promoted_refs(&self) -> &WeakReferenceMap<GenSemiSpaceRef> {
        &self.promoted_refs
    }

    pub fn old_from_refs(&self) -> &WeakReferenceMap<GenSemiSpaceRef> {
        &self.old_from_refs
    }

    fn lookup(&self, origin: Address) -> Option<&Arc<GenSemiSpaceRef>> {
        self.nursery_refs
            .get(origin)
            .or_else(|| self.old_to_refs.get(origin))
            .or_else(|| self.promoted_refs.get(origin))
            .or_else(|| self.old_from_refs.get(origin))
    }

    fn is_full_collection(&self) -> bool {
        self.cycle_kind == Some(CollectionKind::Full)
    }

    fn read_snapshot(&self, scheme_object: Address, epoch: Epoch) -> Result<GenerationSnapshot> {
        let nursery = self.common.read_region(
            self.nursery.as_ref(),
            "nursery",
            scheme_object,
            CollectorField::YoungSpace,
            epoch,
        )?;
        let (old, flipped) = self.common.read_region_pair(
            self.old.as_ref(),
            ("old to-space", "old from-space"),
            scheme_object,
            (CollectorField::OldToSpace, CollectorField::OldFromSpace),
            epoch,
        )?;
        if flipped {
            debug!("Old generation flipped: to-space is now {}", old.0);
        }
        let evacuation_mark = self
            .common
            .vm
            .read_address_field(scheme_object, CollectorField::EvacuationMark)?;
        let full_count = read_count(
            &*self.common.vm,
            scheme_object,
            CollectorField::FullCollectionCount,
        )?;
        Ok(GenerationSnapshot {
            nursery,
            old,
            evacuation_mark,
            full_count,
        })
    }

    fn begin_analysis(&mut self, kind: CollectionKind) -> Result<()> {
        tele_check!(
            self.promoted_refs.is_empty() && self.old_from_refs.is_empty(),
            "promoted or old from-space references left when a collection starts"
        );
        for reference in self.nursery_refs.values() {
            reference.analysis_begins(kind)?;
        }
        if kind == CollectionKind::Full {
            self.old_to_refs.swap_contents(&mut self.old_from_refs);
            for reference in self.old_from_refs.values() {
                reference.analysis_begins(kind)?;
            }
        } else {
            for reference in self.old_to_refs.values() {
                reference.analysis_begins(kind)?;
            }
        }
        self.cycle_kind = Some(kind);
        Ok(())
    }

    fn discover(&mut self) -> Result<ForwardingSummary> {
        let Some((old_to, _)) = &self.old else {
            return Ok(ForwardingSummary::default());
        };
        let vm = &*self.common.vm;
        let layout = &self.common.layout;
        let mut summary = ForwardingSummary::default();
        match self.cycle_kind {
            Some(CollectionKind::Minor) => {
                let mark = self.evacuation_mark;
                summary.add(discover_forwarding(
                    vm,
                    layout,
                    &mut self.nursery_refs,
                    &mut [&mut self.promoted_refs, &mut self.old_to_refs],
                    |a| (old_to.contains_in_allocated(a) && a >= mark).then_some(0),
                )?);
            }
            Some(CollectionKind::Full) => {
                let destination = |a: Address| old_to.contains_in_allocated(a).then_some(0);
                summary.add(discover_forwarding(
                    vm,
                    layout,
                    &mut self.nursery_refs,
                    &mut [&mut self.old_to_refs],
                    destination,
                )?);
                summary.add(discover_forwarding(
                    vm,
                    layout,
                    &mut self.old_from_refs,
                    &mut [&mut self.old_to_refs],
                    destination,
                )?);
            }
            None => {}
        }
        Ok(summary)
    }

    fn reclaim(&mut self) -> Result<usize> {
        let Some(kind) = self.cycle_kind else {
            return Ok(0);
        };
        for reference in self.old_to_refs.values() {
            reference.analysis_ends(kind)?;
        }
        for reference in self.promoted_refs.take_all() {
            reference.analysis_ends(kind)?;
            self.old_to_refs.put(reference.origin(), reference)?;
        }
        let mut died = self.nursery_refs.take_all();
        died.extend(self.old_from_refs.take_all());
        for reference in &died {
            reference.analysis_ends(kind)?;
        }
        Ok(died.len())
    }

    fn end_cycle(&mut self) -> Result<()> {
        for reference in self.old_to_refs.values().chain(self.nursery_refs.values()) {
            reference.cycle_ends()?;
        }
        self.cycle_kind = None;
        Ok(())
    }

    /// Give up on the young generation, or on everything.
    fn lose_track(&mut self, old_generation_too: bool) -> usize {
        let mut lost = self.nursery_refs.take_all();
        lost.extend(self.promoted_refs.take_all());
        lost.extend(self.old_from_refs.take_all());
        if old_generation_too {
            lost.extend(self.old_to_refs.take_all());
        }
        for reference in &lost {
            reference.declare_dead(GenSemiSpaceRefState::Dead);
        }
        lost.len()
    }

    fn check_maps(&self, phase: HeapPhase) -> Result<()> {
        let (Some(nursery), Some((old_to, old_from))) = (&self.nursery, &self.old) else {
            return Ok(());
        };
        self.nursery_refs
            .check_entries(|origin, r| nursery.contains(origin) && r.is_young())?;
        self.old_to_refs
            .check_entries(|origin, r| old_to.contains(origin) && r.status() == ObjectStatus::Live)?;
        self.promoted_refs.check_entries(|origin, _| {
            phase == HeapPhase::Analyzing && old_to.contains(origin)
        })?;
        self.old_from_refs.check_entries(|origin, _| {
            phase == HeapPhase::Analyzing && old_from.contains(origin)
        })
    }

    fn apply(&mut self, update: &PlannedUpdate, full_count: u64) -> Result<String> {
        let work = update.work;
        // The first update only records the full-collection count.
        let attaching = self.common.epoch_state.last_update_epoch.is_none();
        let full_advanced = !attaching && full_count > self.last_full_count;
        let mut forwarding = ForwardingSummary::default();
        let mut died = 0;
        if work.missed_reclaim {
            if work.missed_cycle || work.begin_analysis {
                warn!("Lost track of a generational collection, dropping all references");
                died += self.lose_track(true);
            } else {
                warn!("Missed the reclaiming halt of a collection, reconciling from remaining forwarding words");
                forwarding.add(self.discover()?);
                died += self.reclaim()?;
            }
        }
        if work.end_cycle {
            self.end_cycle()?;
        }
        if work.missed_cycle {
            warn!(
                "Collections completed unobserved (completed count now {}), dropping {} references",
                update.counters.gc_completed,
                if full_advanced { "all" } else { "young" }
            );
            died += self.lose_track(full_advanced);
        }
        if work.begin_analysis {
            // On attach, or after unobserved collections, the counter cannot tell whether this
            // one is full. As a minor collection, nothing in old from-space is trusted to be
            // evacuating.
            let kind = if full_advanced && !work.missed_cycle {
                CollectionKind::Full
            } else {
                CollectionKind::Minor
            };
            self.begin_analysis(kind)?;
        }
        if work.discover {
            forwarding.add(self.discover()?);
        }
        if work.reclaim {
            died += self.reclaim()?;
        }
        self.check_maps(update.counters.phase)?;
        Ok(format!(
            "{:?} collection, nursery {} old {} promoted {} old-from {} refs, {:?}, {} died",
            self.cycle_kind,
            self.nursery_refs.len(),
            self.old_to_refs.len(),
            self.promoted_refs.len(),
            self.old_from_refs.len(),
            forwarding,
            died
        ))
    }

    fn regions(&self) -> Vec<&HeapRegion> {
        let mut regions = vec![];
        regions.extend(self.nursery.as_ref());
        if let Some((to, from)) = &self.old {
            regions.push(to);
            regions.push(from);
        }
        regions
    }
}

impl<VM: RemoteVM> RemoteHeapScheme for GenSemiSpaceScheme<VM> {
    fn name(&self) -> &'static str {
        "GenSemiSpace"
    }

    fn selector(&self) -> HeapSchemeSelector {
        HeapSchemeSelector::GenSemiSpace
    }

    fn heap_regions(&self) -> Vec<&HeapRegion> {
        self.regions()
    }

    fn phase(&self) -> HeapPhase {
        self.common.phase()
    }

    fn counters(&self) -> HeapCounters {
        self.common.counters()
    }

    fn last_update_epoch(&self) -> Option<Epoch> {
        self.common.epoch_state.last_update_epoch
    }

    fn update_memory_status(&mut self, epoch: Epoch) -> Result<()> {
        let Some(update) = self.common.plan_update(epoch)? else {
            return Ok(());
        };
        let snapshot = match self.read_snapshot(update.scheme_object, epoch) {
            Ok(snapshot) => snapshot,
            Err(e) if self.nursery.is_none() && is_startup_gap(&e) => {
                debug!("Generations not available yet: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.nursery = Some(snapshot.nursery);
        self.old = Some(snapshot.old);
        self.evacuation_mark = snapshot.evacuation_mark;
        if self.common.options.sweep_unreferenced {
            let swept = self.nursery_refs.sweep()
                + self.old_to_refs.sweep()
                + self.promoted_refs.sweep()
                + self.old_from_refs.sweep();
            if swept > 0 {
                debug!("Dropped {} unreferenced entries", swept);
            }
        }
        let summary = self.apply(&update, snapshot.full_count)?;
        self.last_full_count = snapshot.full_count;
        self.common.commit(&update);
        self.common.log_update(self.name(), &update, &summary);
        Ok(())
    }

    fn object_status_at(&self, origin: Address) -> ObjectStatus {
        if let Some(r) = self.lookup(origin) {
            return r.status();
        }
        let (Some(nursery), Some((old_to, old_from))) = (&self.nursery, &self.old) else {
            return ObjectStatus::Dead;
        };
        let regions = [nursery, old_to, old_from];
        let plausible = || self.common.is_plausible_origin(origin, &regions);
        let phase = self.common.phase();
        let evacuating = if nursery.contains_in_allocated(origin) {
            match phase {
                HeapPhase::Analyzing => true,
                HeapPhase::Reclaiming => return ObjectStatus::Dead,
                _ => false,
            }
        } else if old_to.contains_in_allocated(origin) {
            false
        } else if old_from.contains_in_allocated(origin)
            && phase == HeapPhase::Analyzing
            && self.is_full_collection()
        {
            true
        } else {
            return ObjectStatus::Dead;
        };
        if evacuating {
            if self.forwarding_address(origin).is_some() {
                ObjectStatus::Forwarder
            } else if plausible() {
                ObjectStatus::Unknown
            } else {
                ObjectStatus::Dead
            }
        } else if plausible() {
            ObjectStatus::Live
        } else {
            ObjectStatus::Dead
        }
    }

    fn make_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.lookup(origin) {
            return Ok(Some(share(r)));
        }
        let status = self.object_status_at(origin);
        let in_nursery = self
            .nursery
            .as_ref()
            .map_or(false, |n| n.contains(origin));
        let analyzing = self.common.is_analyzing();
        let (reference, map) = match status {
            ObjectStatus::Live if in_nursery => {
                (GenSemiSpaceRef::young_live(origin), &mut self.nursery_refs)
            }
            ObjectStatus::Live => match self.cycle_kind {
                Some(CollectionKind::Minor) if analyzing && origin >= self.evacuation_mark => {
                    (GenSemiSpaceRef::old_promoted(origin), &mut self.promoted_refs)
                }
                Some(CollectionKind::Full) if analyzing => {
                    (GenSemiSpaceRef::old_to(origin), &mut self.old_to_refs)
                }
                _ => (GenSemiSpaceRef::old_live(origin), &mut self.old_to_refs),
            },
            ObjectStatus::Unknown if in_nursery => {
                (GenSemiSpaceRef::young_from(origin), &mut self.nursery_refs)
            }
            ObjectStatus::Unknown => (GenSemiSpaceRef::old_from(origin), &mut self.old_from_refs),
            ObjectStatus::Forwarder => return self.make_quasi_reference(origin),
            _ => return Ok(None),
        };
        map.put(origin, reference.clone())?;
        link_copy(&*reference, &self.nursery_refs)?;
        link_copy(&*reference, &self.old_from_refs)?;
        Ok(Some(share(&reference)))
    }

    fn make_quasi_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.lookup(origin) {
            return Ok(r.status().is_quasi().then(|| share(r)));
        }
        let Some(to) = self.forwarding_address(origin) else {
            return Ok(None);
        };
        let in_nursery = self
            .nursery
            .as_ref()
            .map_or(false, |n| n.contains(origin));
        let (reference, map) = if in_nursery {
            (
                GenSemiSpaceRef::young_forwarder(origin, to),
                &mut self.nursery_refs,
            )
        } else {
            (
                GenSemiSpaceRef::old_forwarder(origin, to),
                &mut self.old_from_refs,
            )
        };
        map.put(origin, reference.clone())?;
        let copy = self
            .promoted_refs
            .get(to)
            .or_else(|| self.old_to_refs.get(to));
        link_forwarder(copy, origin)?;
        Ok(Some(share(&reference)))
    }

    fn forwarding_address(&self, origin: Address) -> Option<Address> {
        if let Some(r) = self.lookup(origin) {
            return r.forwarded_to();
        }
        if !self.common.is_analyzing() {
            return None;
        }
        let nursery = self.nursery.as_ref()?;
        let (old_to, old_from) = self.old.as_ref()?;
        let evacuated = nursery.contains_in_allocated(origin)
            || (self.is_full_collection() && old_from.contains_in_allocated(origin));
        if !evacuated {
            return None;
        }
        self.common
            .forwarding_address(origin)
            .filter(|new| old_to.contains_in_allocated(*new))
    }

    fn memory_management_info(&self, address: Address) -> MemoryManagementInfo {
        let phase = self.phase();
        let collecting_role = |evacuated_now: bool| match phase {
            HeapPhase::Analyzing if evacuated_now => RegionRole::Evacuating,
            HeapPhase::Reclaiming if evacuated_now => RegionRole::Evacuated,
            _ => RegionRole::Allocating,
        };
        let mut located = None;
        if let Some(nursery) = self.nursery.as_ref().filter(|n| n.contains(address)) {
            located = Some((nursery, collecting_role(true)));
        } else if let Some((old_to, old_from)) = &self.old {
            if old_to.contains(address) {
                located = Some((old_to, RegionRole::Allocating));
            } else if old_from.contains(address) {
                let role = if self.is_full_collection() && phase == HeapPhase::Analyzing {
                    RegionRole::Evacuating
                } else {
                    RegionRole::Evacuated
                };
                located = Some((old_from, role));
            }
        }
        let tlabs = self.common.vm.tlab_free_ranges().unwrap_or_default();
        MemoryManagementInfo::describe(address, located, phase, &tlabs)
    }

    fn stats(&self) -> SchemeStats {
        SchemeStats {
            scheme: self.name(),
            counters: self.counters(),
            last_update_epoch: self.last_update_epoch(),
            regions: self.regions().into_iter().map(RegionStats::of).collect(),
            maps: vec![
                MapStats::of(&self.nursery_refs),
                MapStats::of(&self.old_to_refs),
                MapStats::of(&self.promoted_refs),
                MapStats::of(&self.old_from_refs),
            ],
        }
    }

    fn tracked_references(&self) -> Vec<(&'static str, Address, RemoteRef)> {
        self.nursery_refs
            .shared()
            .chain(self.old_to_refs.shared())
            .chain(self.promoted_refs.shared())
            .chain(self.old_from_refs.shared())
            .collect()
    }
}
