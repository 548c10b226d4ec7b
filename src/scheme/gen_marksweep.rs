//! Remote model of a generational collector with a copying nursery and a non-moving mark-sweep
//! old generation laid out as a region table.
//!
//! Every collection evacuates the nursery into free space of the old generation. A full
//! collection also marks the old generation and sweeps what stays unmarked. Old objects never
//! move, so the old generation is reconciled the way [`super::marksweep`] reconciles its heap.

use super::forwarding::{discover_forwarding, link_copy, link_forwarder, ForwardingSummary};
use super::global::{
    is_startup_gap, read_count, CommonScheme, CreateSchemeArgs, Epoch, HeapCounters, HeapPhase,
    PlannedUpdate, RemoteHeapScheme,
};
use super::info::{MemoryManagementInfo, MemoryStatus, RegionRole};
use super::stats::{MapStats, RegionStats, SchemeStats};
use crate::policy::{HeapRegion, RegionTable};
use crate::reference::gen_marksweep::{GenMarkSweepRef, GenMarkSweepRefState};
use crate::reference::gen_semispace::CollectionKind;
use crate::reference::{share, ObjectStatus, RemoteRef, RemoteReference, WeakReferenceMap};
use crate::util::error::Result;
use crate::util::log::{debug, warn};
use crate::util::options::HeapSchemeSelector;
use crate::util::Address;
use crate::vm::{CollectorField, RemoteVM};
use std::sync::Arc;

pub struct GenMarkSweepScheme<VM: RemoteVM> {
    common: CommonScheme<VM>,
    nursery: Option<HeapRegion>,
    old: RegionTable,
    last_full_count: u64,
    cycle_kind: Option<CollectionKind>,
    nursery_refs: WeakReferenceMap<GenMarkSweepRef>,
    old_refs: WeakReferenceMap<GenMarkSweepRef>,
    free_refs: WeakReferenceMap<GenMarkSweepRef>,
}

impl<VM: RemoteVM> GenMarkSweepScheme<VM> {
    pub fn new(args: CreateSchemeArgs<VM>) -> Self {
        GenMarkSweepScheme {
            common: CommonScheme::new(args),
            nursery: None,
            old: RegionTable::new(),
            last_full_count: 0,
            cycle_kind: None,
            nursery_refs: WeakReferenceMap::new("nursery"),
            old_refs: WeakReferenceMap::new("old generation"),
            free_refs: WeakReferenceMap::new("free chunks"),
        }
    }

    pub fn nursery(&self) -> Option<&HeapRegion> {
        self.nursery.as_ref()
    }

    pub fn collection_kind(&self) -> Option<CollectionKind> {
        self.cycle_kind
    }

    pub fn nursery_refs(&self) -> &WeakReferenceMap<GenMarkSweepRef> {
        &self.nursery_refs
    }

    pub fn old_refs(&self) -> &WeakReferenceMap<GenMarkSweepRef> {
        &self.old_refs
    }

    pub fn free_chunk_refs(&self) -> &WeakReferenceMap<GenMarkSweepRef> {
        &self.free_refs
    }

    fn lookup(&self, origin: Address) -> Option<&Arc<GenMarkSweepRef>> {
        self.nursery_refs
            .get(origin)
            .or_else(|| self.old_refs.get(origin))
            .or_else(|| self.free_refs.get(origin))
    }

    fn is_full_collection(&self) -> bool {
        self.cycle_kind == Some(CollectionKind::Full)
    }

    fn regions(&self) -> Vec<&HeapRegion> {
        self.nursery
            .iter()
            .chain(self.old.regions().iter())
            .collect()
    }

    fn is_plausible(&self, origin: Address) -> bool {
        self.common.is_plausible_origin(origin, &self.regions())
    }

    fn still_an_old_object(&self, origin: Address) -> bool {
        self.old.contains_in_allocated(origin)
            && !self.common.is_free_chunk(origin)
            && self.is_plausible(origin)
    }

    fn begin_analysis(&mut self, kind: CollectionKind) -> Result<()> {
        for reference in self.nursery_refs.values().chain(self.old_refs.values()) {
            reference.analysis_begins(kind)?;
        }
        self.cycle_kind = Some(kind);
        Ok(())
    }

    fn discover(&mut self) -> Result<(ForwardingSummary, usize)> {
        let old = &self.old;
        let forwarding = discover_forwarding(
            &*self.common.vm,
            &self.common.layout,
            &mut self.nursery_refs,
            &mut [&mut self.old_refs],
            |a| old.contains_in_allocated(a).then_some(0),
        )?;
        let mut marked = 0;
        if self.is_full_collection() {
            for (origin, reference) in self.old_refs.iter() {
                if reference.is_unmarked() && self.common.mark_bit(origin) == Some(true) {
                    reference.mark_observed()?;
                    marked += 1;
                }
            }
        }
        Ok((forwarding, marked))
    }

    fn reclaim(&mut self) -> Result<usize> {
        let Some(kind) = self.cycle_kind else {
            return Ok(0);
        };
        for (origin, reference) in self.old_refs.iter() {
            let marked = !reference.is_unmarked()
                || self.common.mark_bit(origin).unwrap_or(true);
            reference.analysis_ends(kind, marked)?;
        }
        let nursery = self.nursery_refs.take_all();
        for reference in &nursery {
            reference.analysis_ends(kind, false)?;
        }
        Ok(nursery.len() + self.old_refs.remove_dead())
    }

    fn end_cycle(&mut self) -> Result<usize> {
        for reference in self.old_refs.values().chain(self.nursery_refs.values()) {
            reference.cycle_ends()?;
        }
        self.cycle_kind = None;
        Ok(self.revalidate_old())
    }

    fn revalidate_old(&mut self) -> usize {
        for (origin, reference) in self.old_refs.iter() {
            if !self.still_an_old_object(origin) {
                debug!("{} no longer holds an old object", origin);
                reference.declare_dead(GenMarkSweepRefState::Dead);
            }
        }
        self.old_refs.remove_dead()
    }

    /// Drop the nursery; settle the old generation as live and keep what is still present.
    fn lose_track(&mut self) -> Result<usize> {
        let nursery = self.nursery_refs.take_all();
        for reference in &nursery {
            reference.declare_dead(GenMarkSweepRefState::Dead);
        }
        for reference in self.old_refs.values() {
            if matches!(
                reference.state(),
                GenMarkSweepRefState::OldUnmarked | GenMarkSweepRefState::OldMarked
            ) {
                reference.analysis_ends(CollectionKind::Full, true)?;
            }
            reference.cycle_ends()?;
        }
        self.cycle_kind = None;
        Ok(nursery.len() + self.revalidate_old())
    }

    fn reconcile_free_chunks(&mut self) -> Result<usize> {
        for (origin, reference) in self.free_refs.iter() {
            if !self.common.is_free_chunk(origin) || !self.old.contains_in_allocated(origin) {
                reference.free_chunk_consumed()?;
            }
        }
        Ok(self.free_refs.remove_dead())
    }

    fn check_maps(&self) -> Result<()> {
        let Some(nursery) = &self.nursery else {
            return Ok(());
        };
        self.nursery_refs
            .check_entries(|origin, r| nursery.contains(origin) && r.is_young())?;
        self.old_refs
            .check_entries(|origin, r| self.old.contains(origin) && !r.is_young() && !r.is_free_chunk())?;
        self.free_refs
            .check_entries(|origin, r| self.old.contains(origin) && r.is_free_chunk())
    }

    fn apply(&mut self, update: &PlannedUpdate, full_count: u64) -> Result<String> {
        let work = update.work;
        // The first update only records the full-collection count.
        let attaching = self.common.epoch_state.last_update_epoch.is_none();
        let full_advanced = !attaching && full_count > self.last_full_count;
        let mut forwarding = ForwardingSummary::default();
        let mut marked = 0;
        let mut died = 0;
        if work.missed_reclaim {
            if work.missed_cycle || work.begin_analysis || self.is_full_collection() {
                warn!("Lost track of a generational collection, keeping only old objects still present");
                died += self.lose_track()?;
            } else {
                warn!("Missed the reclaiming halt of a minor collection, reconciling from remaining forwarding words");
                forwarding.add(self.discover()?.0);
                died += self.reclaim()?;
            }
        }
        if work.end_cycle {
            died += self.end_cycle()?;
        }
        if work.missed_cycle {
            warn!(
                "Collections completed unobserved (completed count now {}), dropping the nursery",
                update.counters.gc_completed
            );
            died += self.lose_track()?;
        }
        if work.begin_analysis {
            // On attach, or after unobserved collections, the counter cannot tell whether this
            // one is full. As a minor collection, old objects it sweeps are caught by
            // revalidation when the cycle ends.
            let kind = if full_advanced && !work.missed_cycle {
                CollectionKind::Full
            } else {
                CollectionKind::Minor
            };
            self.begin_analysis(kind)?;
        }
        if work.discover {
            let (found, newly_marked) = self.discover()?;
            forwarding.add(found);
            marked += newly_marked;
        }
        if work.reclaim {
            died += self.reclaim()?;
        }
        let consumed = self.reconcile_free_chunks()?;
        self.check_maps()?;
        Ok(format!(
            "{:?} collection, refs: nursery {} old {} free chunks {}, {:?}, {} marked, {} died, {} chunks consumed",
            self.cycle_kind,
            self.nursery_refs.len(),
            self.old_refs.len(),
            self.free_refs.len(),
            forwarding,
            marked,
            died,
            consumed
        ))
    }
}

impl<VM: RemoteVM> RemoteHeapScheme for GenMarkSweepScheme<VM> {
    fn name(&self) -> &'static str {
        "GenMarkSweep"
    }

    fn selector(&self) -> HeapSchemeSelector {
        HeapSchemeSelector::GenMarkSweep
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
        let read = self
            .common
            .read_region(
                self.nursery.as_ref(),
                "nursery",
                update.scheme_object,
                CollectorField::YoungSpace,
                epoch,
            )
            .and_then(|nursery| {
                let old = self
                    .old
                    .read(&*self.common.vm, update.scheme_object, epoch)?;
                let full_count = read_count(
                    &*self.common.vm,
                    update.scheme_object,
                    CollectorField::FullCollectionCount,
                )?;
                Ok((nursery, old, full_count))
            });
        let (nursery, old, full_count) = match read {
            Ok(read) => read,
            Err(e) if self.nursery.is_none() && is_startup_gap(&e) => {
                debug!("Generations not available yet: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.nursery = Some(nursery);
        self.old = old;
        if self.common.options.sweep_unreferenced {
            let swept =
                self.nursery_refs.sweep() + self.old_refs.sweep() + self.free_refs.sweep();
            if swept > 0 {
                debug!("Dropped {} unreferenced entries", swept);
            }
        }
        let summary = self.apply(&update, full_count)?;
        self.last_full_count = full_count;
        self.common.commit(&update);
        self.common.log_update(self.name(), &update, &summary);
        Ok(())
    }

    fn object_status_at(&self, origin: Address) -> ObjectStatus {
        if let Some(r) = self.lookup(origin) {
            return r.status();
        }
        let Some(nursery) = &self.nursery else {
            return ObjectStatus::Dead;
        };
        let phase = self.phase();
        if nursery.contains_in_allocated(origin) {
            return match phase {
                HeapPhase::Reclaiming => ObjectStatus::Dead,
                HeapPhase::Analyzing if self.forwarding_address(origin).is_some() => {
                    ObjectStatus::Forwarder
                }
                _ if !self.is_plausible(origin) => ObjectStatus::Dead,
                HeapPhase::Analyzing => ObjectStatus::Unknown,
                _ => ObjectStatus::Live,
            };
        }
        if !self.old.contains_in_allocated(origin) {
            return ObjectStatus::Dead;
        }
        if self.common.is_free_chunk(origin) {
            return ObjectStatus::Free;
        }
        if !self.is_plausible(origin) {
            return ObjectStatus::Dead;
        }
        if !self.is_full_collection() {
            return ObjectStatus::Live;
        }
        let marked = self.common.mark_bit(origin);
        match phase {
            HeapPhase::Analyzing if marked != Some(true) => ObjectStatus::Unknown,
            HeapPhase::Reclaiming if marked == Some(false) => ObjectStatus::Dead,
            _ => ObjectStatus::Live,
        }
    }

    fn make_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.lookup(origin) {
            return Ok((!r.status().is_quasi()).then(|| share(r)));
        }
        let in_nursery = self
            .nursery
            .as_ref()
            .map_or(false, |n| n.contains(origin));
        let marking = self.is_full_collection() && self.common.is_analyzing();
        let (reference, map) = match self.object_status_at(origin) {
            ObjectStatus::Live if in_nursery => {
                (GenMarkSweepRef::young_live(origin), &mut self.nursery_refs)
            }
            ObjectStatus::Live if marking => {
                (GenMarkSweepRef::old_analyzing(origin, true), &mut self.old_refs)
            }
            ObjectStatus::Live => (GenMarkSweepRef::old_live(origin), &mut self.old_refs),
            ObjectStatus::Unknown if in_nursery => {
                (GenMarkSweepRef::young_from(origin), &mut self.nursery_refs)
            }
            ObjectStatus::Unknown => (
                GenMarkSweepRef::old_analyzing(origin, false),
                &mut self.old_refs,
            ),
            ObjectStatus::Forwarder => return self.make_quasi_reference(origin),
            _ => return Ok(None),
        };
        map.put(origin, reference.clone())?;
        link_copy(&*reference, &self.nursery_refs)?;
        Ok(Some(share(&reference)))
    }

    fn make_quasi_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.lookup(origin) {
            return Ok(r.status().is_quasi().then(|| share(r)));
        }
        let (reference, map) = match self.object_status_at(origin) {
            ObjectStatus::Forwarder => match self.forwarding_address(origin) {
                Some(to) => (
                    GenMarkSweepRef::young_forwarder(origin, to),
                    &mut self.nursery_refs,
                ),
                None => return Ok(None),
            },
            ObjectStatus::Free => (GenMarkSweepRef::free_chunk(origin), &mut self.free_refs),
            _ => return Ok(None),
        };
        map.put(origin, reference.clone())?;
        if let Some(to) = reference.forwarded_to() {
            link_forwarder(self.old_refs.get(to), origin)?;
        }
        Ok(Some(share(&reference)))
    }

    fn forwarding_address(&self, origin: Address) -> Option<Address> {
        if let Some(r) = self.lookup(origin) {
            return r.forwarded_to();
        }
        let nursery = self.nursery.as_ref()?;
        if !self.common.is_analyzing() || !nursery.contains_in_allocated(origin) {
            return None;
        }
        self.common
            .forwarding_address(origin)
            .filter(|new| self.old.contains_in_allocated(*new))
    }

    fn memory_management_info(&self, address: Address) -> MemoryManagementInfo {
        let phase = self.phase();
        let located = if let Some(nursery) = self.nursery.as_ref().filter(|n| n.contains(address))
        {
            let role = match phase {
                HeapPhase::Analyzing => RegionRole::Evacuating,
                HeapPhase::Reclaiming => RegionRole::Evacuated,
                _ => RegionRole::Allocating,
            };
            Some((nursery, role))
        } else {
            self.old.find(address).map(|(_, region)| {
                let role = if self.is_full_collection() {
                    RegionRole::Marking
                } else {
                    RegionRole::Allocating
                };
                (region, role)
            })
        };
        let tlabs = self.common.vm.tlab_free_ranges().unwrap_or_default();
        let mut info = MemoryManagementInfo::describe(address, located, phase, &tlabs);
        if info.status != MemoryStatus::Free
            && self.old.contains_in_allocated(address)
            && self.common.is_free_chunk(address)
        {
            info.status = MemoryStatus::Free;
            info.terse = "chunk";
            info.description = format!("{}: free chunk", info.region.as_deref().unwrap_or("?"));
        }
        info
    }

    fn stats(&self) -> SchemeStats {
        SchemeStats {
            scheme: self.name(),
            counters: self.counters(),
            last_update_epoch: self.last_update_epoch(),
            regions: self.regions().into_iter().map(RegionStats::of).collect(),
            maps: vec![
                MapStats::of(&self.nursery_refs),
                MapStats::of(&self.old_refs),
                MapStats::of(&self.free_refs),
            ],
        }
    }

    fn tracked_references(&self) -> Vec<(&'static str, Address, RemoteRef)> {
        self.nursery_refs
            .shared()
            .chain(self.old_refs.shared())
            .chain(self.free_refs.shared())
            .collect()
    }

    fn region_table(&self) -> Option<&RegionTable> {
        Some(&self.old)
    }
}
