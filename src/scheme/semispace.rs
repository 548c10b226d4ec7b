//! Remote model of a two-space copying collector.
//!
//! Outside a collection every object lives in to-space. A collection starts by flipping the
//! spaces; during analysis the collector evacuates reachable objects from from-space into the
//! new to-space, leaving a forwarding pointer in the old copy. Once the collection reaches
//! [`HeapPhase::Reclaiming`] everything left in from-space is garbage.

use super::forwarding::{discover_forwarding, link_copy, link_forwarder, ForwardingSummary};
use super::global::{
    is_startup_gap, CommonScheme, CreateSchemeArgs, Epoch, HeapCounters, HeapPhase,
    PlannedUpdate, RemoteHeapScheme,
};
use super::info::{MemoryManagementInfo, RegionRole};
use super::stats::{MapStats, RegionStats, SchemeStats};
use crate::policy::HeapRegion;
use crate::reference::semispace::{SemiSpaceRef, SemiSpaceRefState};
use crate::reference::{share, ObjectStatus, RemoteRef, RemoteReference, WeakReferenceMap};
use crate::util::error::{tele_check, Result};
use crate::util::log::{debug, warn};
use crate::util::options::HeapSchemeSelector;
use crate::util::Address;
use crate::vm::{CollectorField, RemoteVM};

pub struct SemiSpaceScheme<VM: RemoteVM> {
    common: CommonScheme<VM>,
    /// (to-space, from-space), once the target has created them.
    spaces: Option<(HeapRegion, HeapRegion)>,
    to_refs: WeakReferenceMap<SemiSpaceRef>,
    from_refs: WeakReferenceMap<SemiSpaceRef>,
}

impl<VM: RemoteVM> SemiSpaceScheme<VM> {
    pub fn new(args: CreateSchemeArgs<VM>) -> Self {
        SemiSpaceScheme {
            common: CommonScheme::new(args),
            spaces: None,
            to_refs: WeakReferenceMap::new("to-space"),
            from_refs: WeakReferenceMap::new("from-space"),
        }
    }

    pub fn to_space(&self) -> Option<&HeapRegion> {
        self.spaces.as_ref().map(|(to, _)| to)
    }

    pub fn from_space(&self) -> Option<&HeapRegion> {
        self.spaces.as_ref().map(|(_, from)| from)
    }

    pub fn to_space_refs(&self) -> &WeakReferenceMap<SemiSpaceRef> {
        &self.to_refs
    }

    pub fn from_space_refs(&self) -> &WeakReferenceMap<SemiSpaceRef> {
        &self.from_refs
    }

    fn begin_analysis(&mut self) -> Result<()> {
        tele_check!(
            self.from_refs.is_empty(),
            "{} references left in from-space when a collection starts",
            self.from_refs.len()
        );
        self.to_refs.swap_contents(&mut self.from_refs);
        for reference in self.from_refs.values() {
            reference.analysis_begins()?;
        }
        Ok(())
    }

    fn discover(&mut self) -> Result<ForwardingSummary> {
        let Some((to, _)) = &self.spaces else {
            return Ok(ForwardingSummary::default());
        };
        discover_forwarding(
            &*self.common.vm,
            &self.common.layout,
            &mut self.from_refs,
            &mut [&mut self.to_refs],
            |address| to.contains_in_allocated(address).then_some(0),
        )
    }

    /// Returns the number of references that died.
    fn reclaim(&mut self) -> Result<usize> {
        for reference in self.to_refs.values() {
            reference.analysis_ends()?;
        }
        let from = self.from_refs.take_all();
        for reference in &from {
            reference.analysis_ends()?;
        }
        Ok(from.len())
    }

    fn end_cycle(&mut self) -> Result<()> {
        for reference in self.to_refs.values() {
            reference.cycle_ends()?;
        }
        Ok(())
    }

    /// Give up on every tracked reference.
    fn lose_track(&mut self) -> usize {
        let lost: Vec<_> = self
            .to_refs
            .take_all()
            .into_iter()
            .chain(self.from_refs.take_all())
            .collect();
        for reference in &lost {
            reference.declare_dead(SemiSpaceRefState::Dead);
        }
        lost.len()
    }

    fn check_maps(&self, phase: HeapPhase) -> Result<()> {
        let Some((to, from)) = &self.spaces else {
            return Ok(());
        };
        self.to_refs
            .check_entries(|origin, r| to.contains(origin) && r.status() == ObjectStatus::Live)?;
        self.from_refs.check_entries(|origin, r| {
            phase == HeapPhase::Analyzing
                && from.contains(origin)
                && matches!(r.status(), ObjectStatus::Unknown | ObjectStatus::Forwarder)
        })
    }

    fn apply(&mut self, update: &PlannedUpdate) -> Result<String> {
        let work = update.work;
        let mut forwarding = ForwardingSummary::default();
        let mut died = 0;
        if work.missed_reclaim {
            if work.missed_cycle || work.begin_analysis {
                warn!("Lost track of a semispace collection, dropping all references");
                died += self.lose_track();
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
                "Collections completed unobserved (completed count now {}), dropping all references",
                update.counters.gc_completed
            );
            died += self.lose_track();
        }
        if work.begin_analysis {
            self.begin_analysis()?;
        }
        if work.discover {
            forwarding.add(self.discover()?);
        }
        if work.reclaim {
            died += self.reclaim()?;
        }
        self.check_maps(update.counters.phase)?;
        Ok(format!(
            "{} to-space refs, {} from-space refs, {:?}, {} died",
            self.to_refs.len(),
            self.from_refs.len(),
            forwarding,
            died
        ))
    }

    fn regions(&self) -> Vec<&HeapRegion> {
        match &self.spaces {
            Some((to, from)) => vec![to, from],
            None => vec![],
        }
    }
}

impl<VM: RemoteVM> RemoteHeapScheme for SemiSpaceScheme<VM> {
    fn name(&self) -> &'static str {
        "SemiSpace"
    }

    fn selector(&self) -> HeapSchemeSelector {
        HeapSchemeSelector::SemiSpace
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
        let (spaces, flipped) = match self.common.read_region_pair(
            self.spaces.as_ref(),
            ("to-space", "from-space"),
            update.scheme_object,
            (CollectorField::ToSpace, CollectorField::FromSpace),
            epoch,
        ) {
            Ok(read) => read,
            Err(e) if self.spaces.is_none() && is_startup_gap(&e) => {
                debug!("Semispaces not available yet: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if flipped {
            debug!("Semispaces flipped: to-space is now {}", spaces.0);
        }
        self.spaces = Some(spaces);
        if self.common.options.sweep_unreferenced {
            let swept = self.to_refs.sweep() + self.from_refs.sweep();
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
        if let Some(r) = self.to_refs.get(origin).or_else(|| self.from_refs.get(origin)) {
            return r.status();
        }
        let Some((to, from)) = &self.spaces else {
            return ObjectStatus::Dead;
        };
        let regions = [to, from];
        if to.contains_in_allocated(origin) {
            if self.common.is_plausible_origin(origin, &regions) {
                return ObjectStatus::Live;
            }
        } else if from.contains_in_allocated(origin) && self.common.is_analyzing() {
            if self.forwarding_address(origin).is_some() {
                return ObjectStatus::Forwarder;
            }
            if self.common.is_plausible_origin(origin, &regions) {
                return ObjectStatus::Unknown;
            }
        }
        ObjectStatus::Dead
    }

    fn make_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.to_refs.get(origin).or_else(|| self.from_refs.get(origin)) {
            return Ok(Some(share(r)));
        }
        let analyzing = self.common.is_analyzing();
        let reference = match self.object_status_at(origin) {
            ObjectStatus::Live => {
                let r = if analyzing {
                    SemiSpaceRef::to_new(origin)
                } else {
                    SemiSpaceRef::live(origin)
                };
                self.to_refs.put(origin, r.clone())?;
                link_copy(&*r, &self.from_refs)?;
                r
            }
            ObjectStatus::Unknown => {
                let r = SemiSpaceRef::from_unknown(origin);
                self.from_refs.put(origin, r.clone())?;
                r
            }
            ObjectStatus::Forwarder => return self.make_quasi_reference(origin),
            _ => return Ok(None),
        };
        Ok(Some(share(&reference)))
    }

    fn make_quasi_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        if let Some(r) = self.from_refs.get(origin) {
            return Ok(r.status().is_quasi().then(|| share(r)));
        }
        match self.forwarding_address(origin) {
            Some(to) => {
                let r = SemiSpaceRef::forwarder(origin, to);
                self.from_refs.put(origin, r.clone())?;
                link_forwarder(self.to_refs.get(to), origin)?;
                Ok(Some(share(&r)))
            }
            None => Ok(None),
        }
    }

    fn forwarding_address(&self, origin: Address) -> Option<Address> {
        if let Some(r) = self.from_refs.get(origin) {
            return r.forwarded_to();
        }
        let (to, from) = self.spaces.as_ref()?;
        if !self.common.is_analyzing() || !from.contains_in_allocated(origin) {
            return None;
        }
        self.common
            .forwarding_address(origin)
            .filter(|new| to.contains_in_allocated(*new))
    }

    fn memory_management_info(&self, address: Address) -> MemoryManagementInfo {
        let located = self.spaces.as_ref().and_then(|(to, from)| {
            if to.contains(address) {
                Some((to, RegionRole::Allocating))
            } else if from.contains(address) {
                let role = if self.common.is_analyzing() {
                    RegionRole::Evacuating
                } else {
                    RegionRole::Evacuated
                };
                Some((from, role))
            } else {
                None
            }
        });
        let tlabs = self.common.vm.tlab_free_ranges().unwrap_or_default();
        MemoryManagementInfo::describe(address, located, self.phase(), &tlabs)
    }

    fn stats(&self) -> SchemeStats {
        SchemeStats {
            scheme: self.name(),
            counters: self.counters(),
            last_update_epoch: self.last_update_epoch(),
            regions: self.regions().into_iter().map(RegionStats::of).collect(),
            maps: vec![MapStats::of(&self.to_refs), MapStats::of(&self.from_refs)],
        }
    }

    fn tracked_references(&self) -> Vec<(&'static str, Address, RemoteRef)> {
        self.to_refs.shared().chain(self.from_refs.shared()).collect()
    }
}
