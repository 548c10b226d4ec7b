use crate::policy::{HeapRegion, RegionTable};
use crate::reference::{ObjectStatus, RemoteRef};
use crate::scheme::{
    create_scheme, CreateSchemeArgs, Epoch, HeapPhase, MemoryManagementInfo, RemoteHeapScheme,
    SchemeStats,
};
use crate::util::error::Result;
use crate::util::log::info;
use crate::util::options::Options;
use crate::util::Address;
use crate::vm::{ProcessLock, RemoteVM};
use std::sync::Arc;

/// One inspection session of one target VM.
///
/// The inspector owns the remote heap scheme selected for the target's collector. The debugger
/// calls [`HeapInspector::update_memory_status`] at every halt of the target with a fresh
/// epoch, and resolves addresses through the query methods in between.
pub struct HeapInspector<VM: RemoteVM> {
    vm: Arc<VM>,
    options: Arc<Options>,
    scheme: Box<dyn RemoteHeapScheme>,
    initialized: bool,
}

impl<VM: RemoteVM> HeapInspector<VM> {
    /// Create an inspector, selecting the heap scheme from `options.heap_scheme` (by default,
    /// from the collector name the target reports).
    pub fn new(vm: Arc<VM>, options: Options) -> Self {
        let options = Arc::new(options);
        let scheme = create_scheme(
            options.heap_scheme,
            CreateSchemeArgs {
                vm: vm.clone(),
                options: options.clone(),
            },
        );
        HeapInspector {
            vm,
            options,
            scheme,
            initialized: false,
        }
    }

    /// Hook the inspector up once the target's class metadata is readable: refresh once, then
    /// ask the debugger to halt the target every time a collection enters
    /// [`HeapPhase::Reclaiming`], the last moment at which forwarding information is complete.
    ///
    /// If the breakpoint cannot be installed the error is returned and the call can be retried;
    /// the refresh for `epoch` is not repeated.
    pub fn initialize(&mut self, epoch: Epoch) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.update_memory_status(epoch)?;
        if self.scheme.needs_reclaiming_halt() {
            self.vm.add_gc_phase_breakpoint(HeapPhase::Reclaiming)?;
        }
        self.initialized = true;
        info!(
            "Heap inspector initialized at epoch {} with the {} scheme",
            epoch,
            self.scheme.name()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Refresh the model for the halt identified by `epoch`. Fails with
    /// [`crate::TeleError::Busy`], changing nothing, if the target cannot be locked.
    pub fn update_memory_status(&mut self, epoch: Epoch) -> Result<()> {
        let _lock = ProcessLock::acquire(&*self.vm)?;
        self.scheme.update_memory_status(epoch)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn get_scheme(&self) -> &dyn RemoteHeapScheme {
        &*self.scheme
    }

    /// The scheme as its concrete type, e.g. to look at its maps.
    pub fn downcast_scheme<T: RemoteHeapScheme>(&self) -> Option<&T> {
        self.scheme.downcast_ref::<T>()
    }

    pub fn heap_regions(&self) -> Vec<&HeapRegion> {
        self.scheme.heap_regions()
    }

    pub fn region_table(&self) -> Option<&RegionTable> {
        self.scheme.region_table()
    }

    pub fn phase(&self) -> HeapPhase {
        self.scheme.phase()
    }

    pub fn last_update_epoch(&self) -> Option<Epoch> {
        self.scheme.last_update_epoch()
    }

    pub fn object_status_at(&self, origin: Address) -> ObjectStatus {
        self.scheme.object_status_at(origin)
    }

    pub fn make_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        self.scheme.make_reference(origin)
    }

    pub fn make_quasi_reference(&mut self, origin: Address) -> Result<Option<RemoteRef>> {
        self.scheme.make_quasi_reference(origin)
    }

    pub fn forwarding_address(&self, origin: Address) -> Option<Address> {
        self.scheme.forwarding_address(origin)
    }

    pub fn memory_management_info(&self, address: Address) -> MemoryManagementInfo {
        self.scheme.memory_management_info(address)
    }

    pub fn stats(&self) -> SchemeStats {
        self.scheme.stats()
    }
}
