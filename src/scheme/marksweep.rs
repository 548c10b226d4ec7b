//! Remote model of a non-moving mark-sweep collector.
//!
//! Objects never move. While the collector analyzes, a tracked object is `UNKNOWN` until its
//! mark bit is seen set; whatever is still unmarked when the collection reaches
//! [`HeapPhase::Reclaiming`] is swept. The sweeper formats free space as free chunks, which
//! are tracked as `FREE` quasi-objects until the allocator consumes them.
//!
//! Two layouts are supported: a single contiguous space, and a table of fixed regions that may
//! grow as the heap expands.

use super::global::{
    is_startup_gap, CommonScheme, CreateSchemeArgs, Epoch, HeapCounters, HeapPhase,
    PlannedUpdate, RemoteHeapScheme,
};
use super::info::{MemoryManagementInfo, MemoryStatus, RegionRole};
use super::stats::{MapStats, RegionStats, SchemeStats};
use crate::policy::{HeapRegion, RegionTable};
use crate::reference::marksweep::{MarkSweepRef, MarkSweepRefState};
use crate::reference::{share, ObjectStatus, RemoteRef, RemoteReference, WeakReferenceMap};
use crate::util::error::Result;
use crate::util::log::{debug, warn};
use crate::util::options::HeapSchemeSelector;
use crate::util::Address;
use crate::vm::{CollectorField, RemoteVM};

/// How the collector lays out its space.
enum SpaceLayout {
    Contiguous(Option<HeapRegion>),
    Table(RegionTable),
}

impl SpaceLayout {
    fn regions(&self) -> Vec<&HeapRegion> {
        match self {
            SpaceLayout::Contiguous(space) => space.iter().collect(),
            SpaceLayout::Table(table) => table.regions().iter().collect(),
        }
    }

    fn find(&self, address: Address) -> Option<&HeapRegion> {
        match self {
            SpaceLayout::Contiguous(space) => space.as_ref().filter(|s| s.contains(address)),
            SpaceLayout::Table(table) => table.find(address).map(|(_, r)| r),
        }
    }

    fn contains_in_allocated(&self, address: Address) -> bool {
        self.find(address)
            .map_or(false, |r| r.contains_in_allocated(address))
    }

    fn is_discovered(&self) -> bool {
        match self {
            SpaceLayout::Contiguous(space) => space.is_some(),
            SpaceLayout::Table(table) => !table.is_empty(),
        }
    }
}

pub struct MarkSweepScheme<VM: RemoteVM> {
    common: CommonScheme<VM>,
    layout: SpaceLayout,
    object_refs: WeakReferenceMap<MarkSweepRef>,
    free_refs: WeakReferenceMap<MarkSweepRef>,
}

impl<VM: RemoteVM> MarkSweepScheme<VM> {
    /// A mark-sweep collector managing a single contiguous space.
    pub fn contiguous(args: CreateSchemeArgs<VM>) -> Self {
        Self::new(args, SpaceLayout::Contiguous(None))
    }

    /// A mark-sweep collector managing a table of regions.
    pub fn with_region_table(args: CreateSchemeArgs<VM>) -> Self {
        Self::new(args, SpaceLayout::Table(RegionTable::new()))
    }

    fn new(args: CreateSchemeArgs<VM>, layout: SpaceLayout) -> Self {
        MarkSweepScheme {
            common: CommonScheme::new(args),
            layout,
            object_refs: WeakReferenceMap::new("objects"),
            free_refs: WeakReferenceMap::new("free chunks"),
        }
    }

    pub fn object_refs(&self) -> &WeakReferenceMap<MarkSweepRef> {
        &self.object_refs
    }

    pub fn free_chunk_refs(&self) -> &WeakReferenceMap<MarkSweepRef> {
        &self.free_refs
    }

    fn lookup(&self, origin: Address) -> Option<&std::sync::Arc<MarkSweepRef>> {
        self.object_refs
            .get(origin)
            .or_else(|| self.free_refs.get(origin))
    }

    fn read_layout(&self, scheme_object: Address, epoch: Epoch) -> Result<SpaceLayout> {
        Ok(match &self.layout {
            SpaceLayout::Contiguous(space) => SpaceLayout::Contiguous(Some(self.common.read_region(
                space.as_ref(),
                "mark-sweep space",
                scheme_object,
                CollectorField::MarkSweepSpace,
                epoch,
            )?)),
            SpaceLayout::Table(table) => {
                let table = table.read(&*self.common.vm, scheme_object, epoch)?;
                if table.len() > self.layout.regions().len() {
                    debug!("Region table now has {} regions", table.len());
                }
                SpaceLayout::Table(table)
            }
        })
    }

    /// Is there still an ordinary object at `origin`?
    fn still_an_object(&self, origin: Address) -> bool {
        self.layout.contains_in_allocated(origin)
            && !self.common.is_free_chunk(origin)
            && self
                .common
                .is_plausible_origin(origin, &self.layout.regions())
    }

    fn begin_analysis(&mut self) -> Result<()> {
        for reference in self.object_refs.values() {
            reference.analysis_begins()?;
        }
        Ok(())
    }

    /// Returns the number of marks newly observed.
    fn observe_marks(&mut self) -> Result<usize> {
        let mut observed = 0;
        for (origin, reference) in self.object_refs.iter() {
            if reference.is_unmarked() && self.common.mark_bit(origin) == Some(true) {
                reference.mark_observed()?;
                observed += 1;
            }
        }
        Ok(observed)
    }

    /// Returns the number of references swept.
    fn reclaim(&mut self) -> Result<usize> {
        for (origin, reference) in self.object_refs.iter() {
            // Without mark bits, keep the object and let revalidation decide at cycle end.
            let marked = !reference.is_unmarked()
                || self.common.mark_bit(origin).unwrap_or(true);
            reference.analysis_ends(marked)?;
        }
        Ok(self.object_refs.remove_dead())
    }

    /// Drop tracked objects that are no longer there: swept and reused, or coalesced into a
    /// free chunk. Returns the number dropped.
    fn revalidate(&mut self) -> usize {
        for (origin, reference) in self.object_refs.iter() {
            if !self.still_an_object(origin) {
                debug!("{} no longer holds an object", origin);
                reference.declare_dead(MarkSweepRefState::Dead);
            }
        }
        self.object_refs.remove_dead()
    }

    /// Retire free chunks the allocator has consumed. Returns the number retired.
    fn reconcile_free_chunks(&mut self) -> Result<usize> {
        for (origin, reference) in self.free_refs.iter() {
            if !self.common.is_free_chunk(origin) || !self.layout.contains_in_allocated(origin) {
                reference.free_chunk_consumed()?;
            }
        }
        Ok(self.free_refs.remove_dead())
    }

    /// Settle every tracked object of a collection we could not follow as live, then keep only
    /// those still present.
    fn lose_track(&mut self) -> Result<usize> {
        for reference in self.object_refs.values() {
            if reference.is_unmarked() || reference.state() == MarkSweepRefState::Marked {
                reference.analysis_ends(true)?;
            }
        }
        Ok(self.revalidate())
    }

    fn check_maps(&self, phase: HeapPhase) -> Result<()> {
        self.object_refs.check_entries(|origin, r| {
            self.layout.find(origin).is_some()
                && match r.status() {
                    ObjectStatus::Live => true,
                    ObjectStatus::Unknown => phase == HeapPhase::Analyzing,
                    _ => false,
                }
        })?;
        self.free_refs
            .check_entries(|origin, r| self.layout.find(origin).is_some() && r.is_free_chunk())
    }

    fn apply(&mut self, update: &PlannedUpdate) -> Result<String> {
        let work = update.work;
        let mut swept = 0;
        let mut marked = 0;
        if work.missed_reclaim {
            // Mark bits of a completed collection are stale; only the objects still present
            // can be trusted.
            warn!("Missed the reclaiming halt of a mark-sweep collection, keeping only objects still present");
            swept += self.lose_track()?;
        }
        if work.end_cycle {
            swept += self.revalidate();
        }
        if work.missed_cycle {
            warn!(
                "Collections completed unobserved (completed count now {}), revalidating objects",
                update.counters.gc_completed
            );
            swept += self.revalidate();
        }
        if work.begin_analysis {
            self.begin_analysis()?;
        }
        if work.discover {
            marked += self.observe_marks()?;
        }
        if work.reclaim {
            swept += self.reclaim()?;
        }
        let consumed = self.reconcile_free_chunks()?;
        self.check_maps(update.counters.phase)?;
        Ok(format!(
            "{} object refs, {} free chunk refs, {} marked, {} swept, {} chunks consumed",
            self.object_refs.len(),
            self.free_refs.len(),
            marked,
            swept,
            consumed
        ))
    }
}

impl<VM: RemoteVM> RemoteHeapScheme for MarkSweepScheme<VM> {
    fn name(&self) -> &'static str {
        match self.layout {
            SpaceLayout::Contiguous(_) => "MarkSweep",
            SpaceLayout::Table(_) => "RegionMarkSweep",
        }
    }

    fn selector(&self) -> HeapSchemeSelector {
        match self.layout {
            SpaceLayout::Contiguous(_) => HeapSchemeSelector::MarkSweep,
            SpaceLayout::Table(_) => HeapSchemeSelector::RegionMarkSweep,
        }
    }

    fn heap_regions(&self) -> Vec<&HeapRegion> {
        self.layout.regions()
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
        let layout = match self.read_layout(update.scheme_object, epoch) {
            Ok(layout) => layout,
            Err(e) if !self.layout.is_discovered() && is_startup_gap(&e) => {
                debug!("Mark-sweep space not available yet: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.layout = layout;
        if self.common.options.sweep_unreferenced {
            let swept = self.object_refs.sweep() + self.free_refs.sweep();
            if swept > 0 {
                debug!("Dropped {} unreferenced entries", swept);
            }
        }
        let summary = self.apply(&update)?;
        self.common.commit(&update);
        self.common.log_update(self.name(), &update, &summary);
        Ok(())
    }

    fn object_status_at(&self, origin: Address) -> ObjectStatus {
        if let Some(r) = self.lookup(origin) {
            return r.status();
        }
        if !self.layout.contains_in_allocated(origin) {
            return ObjectStatus::Dead;
        }
        if self.common.is_free_chunk(origin) {
            return ObjectStatus::Free;
        }
        if !self
            .common
            .is_plausible_origin(origin, &self.layout.regions())
        {
            return ObjectStatus::Dead;
        }
        let marked = self.common.mark_bit(origin);
        match self.phase() {
            HeapPhase::Analyzing if marked != Some(true) => ObjectStatus::Unknown,
            HeapPhase::Reclaiming if marked == Some(false) => ObjectStatus::Dead,
            _ => ObjectStatus::Live,
        }
    }

    fn make_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.object_refs.get(origin) {
            return Ok(Some(share(r)));
        }
        let analyzing = self.common.is_analyzing();
        let reference = match self.object_status_at(origin) {
            ObjectStatus::Live if analyzing => MarkSweepRef::analyzing(origin, true),
            ObjectStatus::Live => MarkSweepRef::live(origin),
            ObjectStatus::Unknown => MarkSweepRef::analyzing(origin, false),
            _ => return Ok(None),
        };
        self.object_refs.put(origin, reference.clone())?;
        Ok(Some(share(&reference)))
    }

    fn make_quasi_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.free_refs.get(origin) {
            return Ok(Some(share(r)));
        }
        if self.object_status_at(origin) != ObjectStatus::Free {
            return Ok(None);
        }
        let reference = MarkSweepRef::free_chunk(origin);
        self.free_refs.put(origin, reference.clone())?;
        Ok(Some(share(&reference)))
    }

    fn memory_management_info(&self, address: Address) -> MemoryManagementInfo {
        let role = if self.phase().is_collecting() {
            RegionRole::Marking
        } else {
            RegionRole::Allocating
        };
        let located = self.layout.find(address).map(|r| (r, role));
        let tlabs = self.common.vm.tlab_free_ranges().unwrap_or_default();
        let mut info = MemoryManagementInfo::describe(address, located, self.phase(), &tlabs);
        if info.status != MemoryStatus::Free
            && located.is_some()
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
            regions: self
                .layout
                .regions()
                .into_iter()
                .map(RegionStats::of)
                .collect(),
            maps: vec![MapStats::of(&self.object_refs), MapStats::of(&self.free_refs)],
        }
    }

    fn tracked_references(&self) -> Vec<(&'static str, Address, RemoteRef)> {
        self.object_refs
            .shared()
            .chain(self.free_refs.shared())
            .collect()
    }

    fn region_table(&self) -> Option<&RegionTable> {
        match &self.layout {
            SpaceLayout::Table(table) => Some(table),
            SpaceLayout::Contiguous(_) => None,
        }
    }
}
