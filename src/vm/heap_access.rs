use super::RemoteMemory;
use crate::util::error::{Result, TeleError};
use crate::util::Address;
use std::ops::Range;
use strum_macros::IntoStaticStr;

/// Named bookkeeping fields of collector objects in the target.
///
/// The first group are fields of the VM object that implements the heap scheme; the second
/// group are fields of the remote region descriptor objects the scheme points to. The inspector
/// only knows the names; [`CollectorInspection::field_offset`] resolves them to offsets using the
/// target's class metadata.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum CollectorField {
    /// Current heap phase, an `int` holding the ordinal of [`crate::HeapPhase`].
    HeapPhase,
    /// Number of collections started (`long`).
    GcStartedCount,
    /// Number of collections completed (`long`).
    GcCompletedCount,
    /// Number of full collections started (`long`), generational schemes only.
    FullCollectionCount,
    /// Reference to the to-space region descriptor.
    ToSpace,
    /// Reference to the from-space region descriptor.
    FromSpace,
    /// Reference to the nursery (young space) region descriptor.
    YoungSpace,
    /// Reference to the old generation's to-space region descriptor.
    OldToSpace,
    /// Reference to the old generation's from-space region descriptor.
    OldFromSpace,
    /// Address in the old generation separating objects present before the current collection
    /// from objects evacuated into it during the collection.
    EvacuationMark,
    /// Reference to the single mark-sweep space region descriptor.
    MarkSweepSpace,
    /// Address of an array of region descriptor references.
    RegionTable,
    /// Number of entries in the region table (`int`).
    RegionCount,
    /// Region descriptor: first address of the region.
    RegionStart,
    /// Region descriptor: size of the region in bytes.
    RegionSize,
    /// Region descriptor: allocation mark; the occupied part of the region ends here.
    RegionMark,
}

/// Access to the collector's own bookkeeping in the target, on top of class metadata the
/// debugger already owns.
pub trait CollectorInspection {
    /// The simple name of the heap scheme class configured into the target VM, if it can be read.
    fn heap_scheme_name(&self) -> Option<String>;

    /// The VM object that implements the heap scheme. This is `None` until enough of the
    /// target has started (and enough of its class metadata is readable) to locate it.
    fn heap_scheme_object(&self) -> Option<Address>;

    /// The offset of a named field from the origin of the object holding it, or `None` if the
    /// target's class metadata does not (yet) describe the field.
    fn field_offset(&self, field: CollectorField) -> Option<usize>;

    /// Memory regions outside the collected heap that hold objects, such as the boot image.
    /// Type descriptors (hubs) usually live there.
    fn boot_regions(&self) -> Vec<Range<Address>>;

    /// The hub shared by every free-space chunk, for collectors that format free space as
    /// pseudo-objects.
    fn free_chunk_hub(&self) -> Option<Address> {
        None
    }

    /// Whether the collector has marked the object at `origin` in the current collection.
    /// Only mark-sweep collectors provide this.
    fn is_marked(&self, _origin: Address) -> Result<bool> {
        Err(TeleError::Unavailable("mark bits"))
    }

    /// The unused tails `[mark, top)` of every thread-local allocation buffer. Memory in these
    /// ranges is inside the allocated part of a region but holds no objects.
    fn tlab_free_ranges(&self) -> Result<Vec<Range<Address>>> {
        Ok(vec![])
    }
}

/// Typed reads of [`CollectorField`]s, for any VM that can both resolve field offsets and read
/// remote memory.
pub trait RemoteFieldAccess: CollectorInspection + RemoteMemory {
    /// The remote location of `field` in the object at `object`.
    fn field_location(&self, object: Address, field: CollectorField) -> Result<Address> {
        let offset = self
            .field_offset(field)
            .ok_or(TeleError::Unavailable(field.into()))?;
        object
            .checked_add(offset)
            .ok_or(TeleError::RemoteAccess(object))
    }

    fn read_address_field(&self, object: Address, field: CollectorField) -> Result<Address> {
        self.read_address(self.field_location(object, field)?)
    }

    fn read_long_field(&self, object: Address, field: CollectorField) -> Result<i64> {
        self.read_long(self.field_location(object, field)?)
    }

    fn read_int_field(&self, object: Address, field: CollectorField) -> Result<i32> {
        self.read_int(self.field_location(object, field)?)
    }
}

impl<T: CollectorInspection + RemoteMemory + ?Sized> RemoteFieldAccess for T {}
