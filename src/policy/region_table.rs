use super::heap_region::{HeapRegion, RegionGeometry};
use crate::scheme::Epoch;
use crate::util::constants::BYTES_IN_ADDRESS;
use crate::util::error::{Result, TeleError};
use crate::util::Address;
use crate::vm::{CollectorField, RemoteFieldAccess, RemoteMemory};

/// Region descriptors are read from a table of descriptor references held by the scheme
/// object. Regions are fixed once created: the table may grow between epochs, but an existing
/// entry never changes identity.
#[derive(Clone, Debug, Default)]
pub struct RegionTable {
    table: Address,
    regions: Vec<HeapRegion>,
}

impl RegionTable {
    /// Upper bound on the number of entries accepted from the target.
    pub const MAX_REGIONS: usize = 1 << 20;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[HeapRegion] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&HeapRegion> {
        self.regions.get(index)
    }

    /// The region containing `address`, with its index in the table.
    pub fn find(&self, address: Address) -> Option<(usize, &HeapRegion)> {
        self.regions
            .iter()
            .enumerate()
            .find(|(_, r)| r.contains(address))
    }

    pub fn contains(&self, address: Address) -> bool {
        self.find(address).is_some()
    }

    pub fn contains_in_allocated(&self, address: Address) -> bool {
        self.find(address)
            .map_or(false, |(_, r)| r.contains_in_allocated(address))
    }

    pub fn total_size(&self) -> usize {
        self.regions.iter().map(|r| r.size()).sum()
    }

    pub fn total_used(&self) -> usize {
        self.regions.iter().map(|r| r.used()).sum()
    }

    /// Read the table as it is now. Nothing is committed unless every entry can be read.
    pub fn read<VM>(&self, vm: &VM, scheme_object: Address, epoch: Epoch) -> Result<RegionTable>
    where
        VM: RemoteFieldAccess + RemoteMemory + ?Sized,
    {
        let table = vm.read_address_field(scheme_object, CollectorField::RegionTable)?;
        let count = vm.read_int_field(scheme_object, CollectorField::RegionCount)?;
        let count = usize::try_from(count)
            .map_err(|_| TeleError::Inconsistent(format!("negative region count {}", count)))?;
        if count > Self::MAX_REGIONS {
            return Err(TeleError::Inconsistent(format!(
                "implausible region count {}",
                count
            )));
        }
        if count > 0 && table.is_zero() {
            return Err(TeleError::Unavailable("region table"));
        }
        if !self.table.is_zero() && table != self.table {
            return Err(TeleError::Inconsistent(format!(
                "region table moved from {} to {}",
                self.table, table
            )));
        }
        if count < self.regions.len() {
            return Err(TeleError::Inconsistent(format!(
                "region table shrank from {} to {} entries",
                self.regions.len(),
                count
            )));
        }

        let mut regions = Vec::with_capacity(count);
        for index in 0..count {
            let slot = table + index * BYTES_IN_ADDRESS;
            let descriptor = vm.read_address(slot)?;
            if let Some(known) = self.regions.get(index) {
                if known.descriptor() != descriptor {
                    return Err(TeleError::Inconsistent(format!(
                        "region {} changed descriptor from {} to {}",
                        index,
                        known.descriptor(),
                        descriptor
                    )));
                }
            }
            let mut region = HeapRegion::new(format!("region-{}", index), descriptor);
            region.commit(RegionGeometry::read(vm, descriptor)?, epoch);
            regions.push(region);
        }
        Ok(RegionTable { table, regions })
    }
}
