//! Local mirrors of the memory regions a remote collector manages.
//!
//! A region is a contiguous range of the target's address space with an allocation mark. The
//! schemes either name their regions individually (semispaces, nursery, old generation) or
//! read them from a [`RegionTable`].

pub mod heap_region;
pub mod region_table;

pub use self::heap_region::{HeapRegion, RegionGeometry};
pub use self::region_table::RegionTable;
