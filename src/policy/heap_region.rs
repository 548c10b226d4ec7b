use crate::scheme::Epoch;
use crate::util::conversions::{bytes_to_formatted_string, usage_percent};
use crate::util::error::{Result, TeleError};
use crate::util::Address;
use crate::vm::{CollectorField, RemoteFieldAccess};
use std::fmt;
use std::ops::Range;

/// Start, size and allocation mark of a region, as last read from its remote descriptor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionGeometry {
    pub start: Address,
    pub size: usize,
    pub mark: Address,
}

impl RegionGeometry {
    /// Read the geometry from the remote descriptor object at `descriptor`.
    pub fn read<VM: RemoteFieldAccess + ?Sized>(vm: &VM, descriptor: Address) -> Result<Self> {
        if descriptor.is_zero() {
            return Err(TeleError::Unavailable("region descriptor"));
        }
        let start = vm.read_address_field(descriptor, CollectorField::RegionStart)?;
        let size = vm
            .read_address_field(descriptor, CollectorField::RegionSize)?
            .as_usize();
        let mark = vm.read_address_field(descriptor, CollectorField::RegionMark)?;
        let geometry = RegionGeometry { start, size, mark };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }

    fn validate(&self) -> Result<()> {
        let end = self.start.checked_add(self.size).ok_or_else(|| {
            TeleError::Inconsistent(format!("region at {} overflows with size {}", self.start, self.size))
        })?;
        // A region that has not been allocated into yet may still report a zero mark.
        if !self.mark.is_zero() && (self.mark < self.start || self.mark > end) {
            return Err(TeleError::Inconsistent(format!(
                "allocation mark {} outside region [{}, {})",
                self.mark, self.start, end
            )));
        }
        Ok(())
    }
}

/// A local mirror of one contiguous memory region the collector allocates objects in.
///
/// The region is identified by the remote descriptor object that describes it; its name is the
/// role the scheme gives it ("to-space", "nursery", ...). The geometry is refreshed at most once
/// per epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapRegion {
    name: String,
    descriptor: Address,
    geometry: RegionGeometry,
    refreshed: Option<Epoch>,
}

impl HeapRegion {
    pub fn new(name: impl Into<String>, descriptor: Address) -> Self {
        HeapRegion {
            name: name.into(),
            descriptor,
            geometry: RegionGeometry::default(),
            refreshed: None,
        }
    }

    /// Create a region and read its geometry.
    pub fn bind<VM: RemoteFieldAccess + ?Sized>(
        name: impl Into<String>,
        descriptor: Address,
        vm: &VM,
        epoch: Epoch,
    ) -> Result<Self> {
        let mut region = HeapRegion::new(name, descriptor);
        region.refresh(vm, epoch)?;
        Ok(region)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> Address {
        self.descriptor
    }

    pub fn geometry(&self) -> RegionGeometry {
        self.geometry
    }

    pub fn start(&self) -> Address {
        self.geometry.start
    }

    pub fn end(&self) -> Address {
        self.geometry.end()
    }

    pub fn size(&self) -> usize {
        self.geometry.size
    }

    /// The allocation mark. Objects occupy `[start, mark)`.
    pub fn mark(&self) -> Address {
        if self.geometry.mark.is_zero() {
            self.geometry.start
        } else {
            self.geometry.mark
        }
    }

    pub fn used(&self) -> usize {
        self.mark() - self.start()
    }

    pub fn range(&self) -> Range<Address> {
        self.start()..self.end()
    }

    pub fn allocated_range(&self) -> Range<Address> {
        self.start()..self.mark()
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.start() && address < self.end()
    }

    pub fn contains_in_allocated(&self, address: Address) -> bool {
        address >= self.start() && address < self.mark()
    }

    pub fn last_refreshed(&self) -> Option<Epoch> {
        self.refreshed
    }

    /// Re-read the geometry, unless it has already been read in this epoch.
    pub fn refresh<VM: RemoteFieldAccess + ?Sized>(&mut self, vm: &VM, epoch: Epoch) -> Result<()> {
        if self.refreshed.map_or(false, |last| last >= epoch) {
            return Ok(());
        }
        let geometry = RegionGeometry::read(vm, self.descriptor)?;
        self.commit(geometry, epoch);
        Ok(())
    }

    /// Install geometry that has already been read and validated.
    pub fn commit(&mut self, geometry: RegionGeometry, epoch: Epoch) {
        self.geometry = geometry;
        self.refreshed = Some(epoch);
    }

    /// Exchange the identity (descriptor and geometry) of two regions, keeping their roles.
    /// Used when the collector flips two spaces.
    pub fn swap_identity(&mut self, other: &mut HeapRegion) {
        std::mem::swap(&mut self.descriptor, &mut other.descriptor);
        std::mem::swap(&mut self.geometry, &mut other.geometry);
        std::mem::swap(&mut self.refreshed, &mut other.refreshed);
    }
}

impl fmt::Display for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}) used {} of {} ({}%)",
            self.name,
            self.start(),
            self.end(),
            bytes_to_formatted_string(self.used()),
            bytes_to_formatted_string(self.size()),
            usage_percent(self.used(), self.size())
        )
    }
}
