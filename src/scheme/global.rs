//! The abstract heap scheme and the state shared by every scheme.

use super::info::MemoryManagementInfo;
use super::stats::SchemeStats;
use crate::policy::{HeapRegion, RegionGeometry, RegionTable};
use crate::reference::{ObjectStatus, RemoteRef};
use crate::util::error::{tele_check, Result, TeleError};
use crate::util::log::{debug, info, Level};
use crate::util::object_probe::HeaderLayout;
use crate::util::options::{HeapSchemeSelector, Options};
use crate::util::Address;
use crate::vm::{CollectorField, RemoteFieldAccess, RemoteVM};
use downcast_rs::{impl_downcast, Downcast};
use std::ops::Range;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// A monotonically increasing stamp identifying one halt of the target. Supplied by the
/// debugger with every refresh request.
pub type Epoch = u64;

/// The collector's current activity, as recorded in the target.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum HeapPhase {
    /// The mutator is running and allocating; the collector is idle.
    Allocating,
    /// The mutator is running; the collector is idle.
    #[default]
    Mutating,
    /// The collector is determining reachability and (for copying collectors) relocating.
    Analyzing,
    /// Analysis is complete; the collector is releasing memory.
    Reclaiming,
}

impl HeapPhase {
    /// Decode the phase ordinal stored in the target.
    pub fn from_ordinal(ordinal: i32) -> Option<HeapPhase> {
        match ordinal {
            0 => Some(HeapPhase::Allocating),
            1 => Some(HeapPhase::Mutating),
            2 => Some(HeapPhase::Analyzing),
            3 => Some(HeapPhase::Reclaiming),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i32 {
        match self {
            HeapPhase::Allocating => 0,
            HeapPhase::Mutating => 1,
            HeapPhase::Analyzing => 2,
            HeapPhase::Reclaiming => 3,
        }
    }

    /// Is a collection in progress?
    pub fn is_collecting(self) -> bool {
        matches!(self, HeapPhase::Analyzing | HeapPhase::Reclaiming)
    }

    pub fn label(self) -> &'static str {
        self.into()
    }
}

/// The collector's phase and collection counters, read together at one halt.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapCounters {
    pub phase: HeapPhase,
    pub gc_started: u64,
    pub gc_completed: u64,
}

impl HeapCounters {
    pub fn read<VM: RemoteFieldAccess + ?Sized>(vm: &VM, scheme_object: Address) -> Result<Self> {
        let ordinal = vm.read_int_field(scheme_object, CollectorField::HeapPhase)?;
        let phase = HeapPhase::from_ordinal(ordinal).ok_or_else(|| {
            TeleError::Inconsistent(format!("unknown heap phase ordinal {}", ordinal))
        })?;
        let gc_started = read_count(vm, scheme_object, CollectorField::GcStartedCount)?;
        let gc_completed = read_count(vm, scheme_object, CollectorField::GcCompletedCount)?;
        let counters = HeapCounters {
            phase,
            gc_started,
            gc_completed,
        };
        counters.validate()?;
        Ok(counters)
    }

    /// Completed never exceeds started, and they differ exactly while a collection runs.
    pub fn validate(&self) -> Result<()> {
        tele_check!(
            self.gc_completed <= self.gc_started,
            "{} collections completed but only {} started",
            self.gc_completed,
            self.gc_started
        );
        tele_check!(
            self.phase.is_collecting() == (self.gc_started > self.gc_completed),
            "phase {} with {} collections started and {} completed",
            self.phase,
            self.gc_started,
            self.gc_completed
        );
        Ok(())
    }
}

pub(crate) fn read_count<VM: RemoteFieldAccess + ?Sized>(
    vm: &VM,
    object: Address,
    field: CollectorField,
) -> Result<u64> {
    let count = vm.read_long_field(object, field)?;
    u64::try_from(count).map_err(|_| {
        let name: &'static str = field.into();
        TeleError::Inconsistent(format!("negative collection count {} = {}", name, count))
    })
}

/// What one update pass has to do, in the order the scheme applies it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseWork {
    /// The halt that would have let us reconcile the tracked collection's forwarding before it
    /// was reclaimed never happened.
    pub missed_reclaim: bool,
    /// The tracked collection has completed.
    pub end_cycle: bool,
    /// At least one collection started and completed entirely between two halts.
    pub missed_cycle: bool,
    /// A new collection has started since the last halt.
    pub begin_analysis: bool,
    /// The current collection is still analyzing (or just entered reclaiming): look for newly
    /// forwarded or marked objects.
    pub discover: bool,
    /// The current collection has entered reclaiming for the first time.
    pub reclaim: bool,
}

impl PhaseWork {
    pub fn is_empty(&self) -> bool {
        *self == PhaseWork::default()
    }
}

/// Where the observer stands relative to the collector's progress.
///
/// The state is advanced purely: [`HeapEpochState::advance`] computes the successor state and
/// the [`PhaseWork`] for the transition, and the scheme commits the successor only once all
/// of the work has been applied.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapEpochState {
    /// The epoch of the last committed update.
    pub last_update_epoch: Option<Epoch>,
    /// Counters read at the last committed update.
    pub counters: HeapCounters,
    /// The number of the collection whose analysis we last began.
    pub last_analyzing_count: u64,
    /// The number of the collection whose reclaiming we last processed.
    pub last_reclaiming_count: u64,
    /// The number of the collection we last saw complete.
    pub last_cycle_end_count: u64,
}

impl HeapEpochState {
    /// The collection we are tracking: analysis began but we have not yet seen it end.
    pub fn tracked_cycle(&self) -> Option<u64> {
        (self.last_analyzing_count > self.last_cycle_end_count).then_some(self.last_analyzing_count)
    }

    /// Has an update already been committed for `epoch` (or a later one)?
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.last_update_epoch.map_or(false, |last| epoch <= last)
    }

    /// Compute the successor state for new counters observed at `epoch`. Returns `None` if
    /// `epoch` has already been processed.
    pub fn advance(
        &self,
        epoch: Epoch,
        observed: HeapCounters,
    ) -> Result<Option<(HeapEpochState, PhaseWork)>> {
        if self.is_current(epoch) {
            return Ok(None);
        }
        observed.validate()?;
        let first = self.last_update_epoch.is_none();
        let prev = self.counters;
        if !first {
            tele_check!(
                observed.gc_started >= prev.gc_started && observed.gc_completed >= prev.gc_completed,
                "collection counters went backwards: started {} -> {}, completed {} -> {}",
                prev.gc_started,
                observed.gc_started,
                prev.gc_completed,
                observed.gc_completed
            );
        }

        let mut next = *self;
        next.last_update_epoch = Some(epoch);
        next.counters = observed;
        let mut work = PhaseWork::default();

        if let Some(cycle) = self.tracked_cycle() {
            if observed.gc_completed >= cycle {
                work.missed_reclaim = self.last_reclaiming_count < cycle;
                work.end_cycle = true;
                next.last_cycle_end_count = cycle;
            }
        }

        if !first && observed.gc_completed > prev.gc_started {
            work.missed_cycle = true;
        }

        if observed.phase.is_collecting() {
            let cycle = observed.gc_started;
            if next.last_analyzing_count < cycle {
                work.begin_analysis = true;
                next.last_analyzing_count = cycle;
            }
            if next.last_reclaiming_count < cycle {
                work.discover = true;
                if observed.phase == HeapPhase::Reclaiming {
                    work.reclaim = true;
                    next.last_reclaiming_count = cycle;
                }
            }
        }
        // A cycle that was already complete when we attached is not ours to end.
        if first && !observed.phase.is_collecting() {
            next.last_analyzing_count = observed.gc_started;
            next.last_reclaiming_count = observed.gc_started;
            next.last_cycle_end_count = observed.gc_started;
        }
        Ok(Some((next, work)))
    }
}

/// A local model of the remote heap for one collector algorithm.
///
/// Every query is answered from the state committed by the last
/// [`RemoteHeapScheme::update_memory_status`], except where it has to look at object headers
/// in the target.
pub trait RemoteHeapScheme: 'static + Send + Sync + Downcast {
    /// The scheme's name, for reports.
    fn name(&self) -> &'static str;

    fn selector(&self) -> HeapSchemeSelector;

    /// The regions the collector currently allocates in. Empty until the target has started
    /// far enough for the regions to be discovered.
    fn heap_regions(&self) -> Vec<&HeapRegion>;

    fn phase(&self) -> HeapPhase;

    fn counters(&self) -> HeapCounters;

    fn last_update_epoch(&self) -> Option<Epoch>;

    /// Reconcile the local model with the target as of `epoch`. The caller holds the process
    /// lock. Calling this again with an epoch that has already been processed is a no-op.
    fn update_memory_status(&mut self, epoch: Epoch) -> Result<()>;

    /// What is at `origin` right now, from the maps or, for untracked locations, from memory.
    fn object_status_at(&self, origin: Address) -> ObjectStatus;

    /// A reference to the ordinary object at `origin`, reusing the tracked one if there is one.
    fn make_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>>;

    /// A reference to the quasi-object (forwarder or free chunk) at `origin`.
    fn make_quasi_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>>;

    /// If the object at `origin` has been forwarded by the collection in progress, the origin
    /// of the new copy.
    fn forwarding_address(&self, _origin: Address) -> Option<Address> {
        None
    }

    /// What the collector is doing with the memory at `address`.
    fn memory_management_info(&self, address: Address) -> MemoryManagementInfo;

    fn stats(&self) -> SchemeStats;

    /// Every tracked reference, keyed as in its map, with the map's name.
    fn tracked_references(&self) -> Vec<(&'static str, Address, RemoteRef)> {
        vec![]
    }

    /// Does the scheme need the target to halt when a collection enters
    /// [`HeapPhase::Reclaiming`]?
    fn needs_reclaiming_halt(&self) -> bool {
        true
    }

    /// The scheme's region table, if it manages its heap that way.
    fn region_table(&self) -> Option<&RegionTable> {
        None
    }
}

impl_downcast!(RemoteHeapScheme);

/// Arguments every scheme constructor takes.
pub struct CreateSchemeArgs<VM: RemoteVM> {
    pub vm: Arc<VM>,
    pub options: Arc<Options>,
}

/// Resolve [`HeapSchemeSelector::Auto`] from the collector name the target reports.
pub fn resolve_selector<VM: RemoteVM>(selector: HeapSchemeSelector, vm: &VM) -> HeapSchemeSelector {
    match selector {
        HeapSchemeSelector::Auto => match vm.heap_scheme_name() {
            Some(name) => {
                let resolved = HeapSchemeSelector::from_collector_name(&name);
                if resolved == HeapSchemeSelector::Unknown {
                    info!("No remote model for heap scheme {}, using a non-moving fallback", name);
                }
                resolved
            }
            None => HeapSchemeSelector::Unknown,
        },
        other => other,
    }
}

/// Create the scheme for `selector`.
pub fn create_scheme<VM: RemoteVM>(
    selector: HeapSchemeSelector,
    args: CreateSchemeArgs<VM>,
) -> Box<dyn RemoteHeapScheme> {
    let selector = resolve_selector(selector, &*args.vm);
    let scheme = match selector {
        HeapSchemeSelector::SemiSpace => Box::new(super::semispace::SemiSpaceScheme::new(args))
            as Box<dyn RemoteHeapScheme>,
        HeapSchemeSelector::GenSemiSpace => {
            Box::new(super::gen_semispace::GenSemiSpaceScheme::new(args))
                as Box<dyn RemoteHeapScheme>
        }
        HeapSchemeSelector::MarkSweep => {
            Box::new(super::marksweep::MarkSweepScheme::contiguous(args))
                as Box<dyn RemoteHeapScheme>
        }
        HeapSchemeSelector::RegionMarkSweep => {
            Box::new(super::marksweep::MarkSweepScheme::with_region_table(args))
                as Box<dyn RemoteHeapScheme>
        }
        HeapSchemeSelector::GenMarkSweep => {
            Box::new(super::gen_marksweep::GenMarkSweepScheme::new(args))
                as Box<dyn RemoteHeapScheme>
        }
        HeapSchemeSelector::Auto | HeapSchemeSelector::Unknown => {
            Box::new(super::unknown::UnknownScheme::new(args)) as Box<dyn RemoteHeapScheme>
        }
    };
    info!("Inspecting the remote heap with the {} scheme", scheme.name());
    scheme
}

/// An update pass the scheme has decided to run: the counters it read and the successor
/// epoch state to commit once the work is done.
#[derive(Copy, Clone, Debug)]
pub struct PlannedUpdate {
    pub epoch: Epoch,
    pub scheme_object: Address,
    pub counters: HeapCounters,
    pub next: HeapEpochState,
    pub work: PhaseWork,
}

/// Level of the reconciliation summary logged after every update.
pub(crate) fn summary_level(options: &Options) -> Level {
    if options.trace_reference_updates {
        Level::Info
    } else {
        Level::Debug
    }
}

/// State and helpers shared by every scheme.
pub struct CommonScheme<VM: RemoteVM> {
    pub vm: Arc<VM>,
    pub options: Arc<Options>,
    pub layout: HeaderLayout,
    pub epoch_state: HeapEpochState,
    scheme_object: Option<Address>,
    boot_regions: Vec<Range<Address>>,
}

impl<VM: RemoteVM> CommonScheme<VM> {
    pub fn new(args: CreateSchemeArgs<VM>) -> Self {
        CommonScheme {
            layout: HeaderLayout::new(&args.options),
            vm: args.vm,
            options: args.options,
            epoch_state: HeapEpochState::default(),
            scheme_object: None,
            boot_regions: vec![],
        }
    }

    /// The remote scheme object, looked up until the target has created it.
    pub fn scheme_object(&mut self) -> Option<Address> {
        if self.scheme_object.is_none() {
            self.scheme_object = self.vm.heap_scheme_object().filter(|a| !a.is_zero());
            if let Some(object) = self.scheme_object {
                self.boot_regions = self.vm.boot_regions();
                debug!("Found heap scheme object at {}", object);
            }
        }
        self.scheme_object
    }

    pub fn phase(&self) -> HeapPhase {
        self.epoch_state.counters.phase
    }

    pub fn counters(&self) -> HeapCounters {
        self.epoch_state.counters
    }

    pub fn is_analyzing(&self) -> bool {
        self.phase() == HeapPhase::Analyzing
    }

    /// Decide what the update for `epoch` has to do. Returns `None` if there is nothing to do:
    /// the epoch has been processed, or the target has not created its heap scheme yet.
    pub fn plan_update(&mut self, epoch: Epoch) -> Result<Option<PlannedUpdate>> {
        if self.epoch_state.is_current(epoch) {
            return Ok(None);
        }
        let Some(scheme_object) = self.scheme_object() else {
            debug!("Heap scheme not available yet at epoch {}", epoch);
            return Ok(None);
        };
        let counters = HeapCounters::read(&*self.vm, scheme_object)?;
        Ok(self
            .epoch_state
            .advance(epoch, counters)?
            .map(|(next, work)| PlannedUpdate {
                epoch,
                scheme_object,
                counters,
                next,
                work,
            }))
    }

    /// Commit the epoch state of a completed update.
    pub fn commit(&mut self, update: &PlannedUpdate) {
        self.epoch_state = update.next;
    }

    /// Report how an update went. The collector's state is logged at DEBUG. The reconciliation
    /// summary goes to INFO if `trace_reference_updates` is set, otherwise to DEBUG.
    pub fn log_update(&self, scheme: &str, update: &PlannedUpdate, summary: &str) {
        let counters = update.counters;
        debug!(
            "{} epoch {}: {} (gc started {}, completed {}) {:?}",
            scheme,
            update.epoch,
            counters.phase,
            counters.gc_started,
            counters.gc_completed,
            update.work
        );
        match summary_level(&self.options) {
            Level::Info => info!("{} epoch {}: {}", scheme, update.epoch, summary),
            _ => debug!("{} epoch {}: {}", scheme, update.epoch, summary),
        }
    }

    pub fn is_in_boot_region(&self, address: Address) -> bool {
        self.boot_regions.iter().any(|r| r.contains(&address))
    }

    /// Is `origin` the origin of an object, judged from its hub chain? Hubs must live in one of
    /// `regions` or the boot regions.
    pub fn is_plausible_origin(&self, origin: Address, regions: &[&HeapRegion]) -> bool {
        self.layout.is_plausible_origin(&*self.vm, origin, |hub| {
            self.is_in_boot_region(hub) || regions.iter().any(|r| r.contains_in_allocated(hub))
        })
    }

    pub fn forwarding_address(&self, origin: Address) -> Option<Address> {
        self.layout.forwarding_address(&*self.vm, origin)
    }

    /// Is `origin` formatted as a free chunk?
    pub fn is_free_chunk(&self, origin: Address) -> bool {
        match self.vm.free_chunk_hub() {
            Some(free_hub) => matches!(
                self.layout.read_hub(&*self.vm, origin),
                Ok(Some(hub)) if hub == free_hub
            ),
            None => false,
        }
    }

    /// The object's mark bit, or `None` if it cannot be read. Marks are read after an update
    /// has started moving references through their states, so a failed read is never an error
    /// here; callers count an unknown bit as marked.
    pub fn mark_bit(&self, origin: Address) -> Option<bool> {
        match self.vm.is_marked(origin) {
            Ok(marked) => Some(marked),
            Err(TeleError::Unavailable(_)) => None,
            Err(e) => {
                debug!("Mark bit of {} unreadable: {}", origin, e);
                None
            }
        }
    }

    /// Read the descriptor address held in a scheme field.
    pub fn region_descriptor(&self, scheme_object: Address, field: CollectorField) -> Result<Address> {
        self.vm.read_address_field(scheme_object, field)
    }

    /// Read the current state of a single named region. An existing region keeps its identity
    /// if the descriptor is unchanged.
    pub fn read_region(
        &self,
        current: Option<&HeapRegion>,
        name: &str,
        scheme_object: Address,
        field: CollectorField,
        epoch: Epoch,
    ) -> Result<HeapRegion> {
        let descriptor = self.region_descriptor(scheme_object, field)?;
        let mut region = match current {
            Some(region) if region.descriptor() == descriptor => region.clone(),
            _ => HeapRegion::new(name, descriptor),
        };
        region.commit(RegionGeometry::read(&*self.vm, descriptor)?, epoch);
        Ok(region)
    }

    /// Read the current state of a pair of regions the collector flips, such as two
    /// semispaces. If the collector has exchanged them, the local regions exchange identities.
    /// Returns the pair and whether a flip was seen.
    pub fn read_region_pair(
        &self,
        current: Option<&(HeapRegion, HeapRegion)>,
        names: (&str, &str),
        scheme_object: Address,
        fields: (CollectorField, CollectorField),
        epoch: Epoch,
    ) -> Result<((HeapRegion, HeapRegion), bool)> {
        let first = self.region_descriptor(scheme_object, fields.0)?;
        let second = self.region_descriptor(scheme_object, fields.1)?;
        let (mut pair, flipped) = match current {
            Some((a, b)) if a.descriptor() == second && b.descriptor() == first => {
                let (mut a, mut b) = (a.clone(), b.clone());
                a.swap_identity(&mut b);
                ((a, b), true)
            }
            Some((a, b)) if a.descriptor() == first && b.descriptor() == second => {
                ((a.clone(), b.clone()), false)
            }
            _ => (
                (HeapRegion::new(names.0, first), HeapRegion::new(names.1, second)),
                false,
            ),
        };
        pair.0.commit(RegionGeometry::read(&*self.vm, first)?, epoch);
        pair.1.commit(RegionGeometry::read(&*self.vm, second)?, epoch);
        Ok((pair, flipped))
    }
}

/// Is this error the target not having started far enough to describe its heap?
pub(crate) fn is_startup_gap(error: &TeleError) -> bool {
    matches!(error, TeleError::Unavailable(_) | TeleError::RemoteAccess(_))
}
