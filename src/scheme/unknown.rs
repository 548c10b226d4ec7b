//! Fallback for collectors this crate has no model of.
//!
//! Nothing is known about the layout of the heap, so no address is claimed to hold an object
//! and no reference is ever created. Updates only record the epoch.

use super::global::{CommonScheme, CreateSchemeArgs, Epoch, HeapCounters, HeapPhase, RemoteHeapScheme};
use super::info::MemoryManagementInfo;
use super::stats::SchemeStats;
use crate::policy::HeapRegion;
use crate::reference::{ObjectStatus, RemoteRef};
use crate::util::error::Result;
use crate::util::log::debug;
use crate::util::options::HeapSchemeSelector;
use crate::util::Address;
use crate::vm::RemoteVM;

pub struct UnknownScheme<VM: RemoteVM> {
    common: CommonScheme<VM>,
}

impl<VM: RemoteVM> UnknownScheme<VM> {
    pub fn new(args: CreateSchemeArgs<VM>) -> Self {
        UnknownScheme {
            common: CommonScheme::new(args),
        }
    }
}

impl<VM: RemoteVM> RemoteHeapScheme for UnknownScheme<VM> {
    fn name(&self) -> &'static str {
        "Unknown"
    }

    fn selector(&self) -> HeapSchemeSelector {
        HeapSchemeSelector::Unknown
    }

    fn heap_regions(&self) -> Vec<&HeapRegion> {
        vec![]
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
        if self.common.epoch_state.is_current(epoch) {
            return Ok(());
        }
        debug!("Unknown heap scheme at epoch {}: nothing to refresh", epoch);
        self.common.epoch_state.last_update_epoch = Some(epoch);
        Ok(())
    }

    fn object_status_at(&self, _origin: Address) -> ObjectStatus {
        ObjectStatus::Dead
    }

    fn make_reference(&mut self, _origin: Address) -> Result<Option<RemoteRef>> {
        Ok(None)
    }

    fn make_quasi_reference(&mut self, _origin: Address) -> Result<Option<RemoteRef>> {
        Ok(None)
    }

    fn memory_management_info(&self, address: Address) -> MemoryManagementInfo {
        MemoryManagementInfo::unknown(address)
    }

    fn stats(&self) -> SchemeStats {
        SchemeStats {
            scheme: self.name(),
            counters: self.counters(),
            last_update_epoch: self.last_update_epoch(),
            regions: vec![],
            maps: vec![],
        }
    }

    fn needs_reclaiming_halt(&self) -> bool {
        false
    }
}
