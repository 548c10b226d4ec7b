use super::global::HeapPhase;
use crate::policy::HeapRegion;
use crate::util::Address;
use std::fmt;
use std::ops::Range;
use strum_macros::{Display, IntoStaticStr};

/// The collector's view of a memory location, independent of whether an object starts there.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum MemoryStatus {
    /// Allocated memory the collector considers in use.
    #[strum(serialize = "LIVE")]
    Live,
    /// Memory available for allocation.
    #[strum(serialize = "FREE")]
    Free,
    /// Memory holding only garbage, about to be (or already) reclaimed.
    #[strum(serialize = "DEAD")]
    Dead,
    /// Not managed by the heap scheme, or not decided yet.
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

/// How the collector treats a region's allocated memory in the current phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionRole {
    /// Objects here are in use.
    Allocating,
    /// Objects here are being evacuated by the collection in progress.
    Evacuating,
    /// Objects here have been evacuated; the memory is garbage until the region is reset.
    Evacuated,
    /// Objects here are being marked by the collection in progress.
    Marking,
}

/// What the collector is doing with one address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryManagementInfo {
    pub address: Address,
    pub status: MemoryStatus,
    /// The heap region containing the address, if any.
    pub region: Option<String>,
    /// A short description, suitable for a table cell.
    pub terse: &'static str,
    /// A longer description, suitable for a tooltip.
    pub description: String,
}

impl MemoryManagementInfo {
    pub fn unknown(address: Address) -> Self {
        MemoryManagementInfo {
            address,
            status: MemoryStatus::Unknown,
            region: None,
            terse: "",
            description: "not in a heap region".to_string(),
        }
    }

    /// Describe `address`, given the region containing it and the role of that region.
    pub(crate) fn describe(
        address: Address,
        located: Option<(&HeapRegion, RegionRole)>,
        phase: HeapPhase,
        tlab_free: &[Range<Address>],
    ) -> Self {
        let Some((region, role)) = located else {
            return Self::unknown(address);
        };
        let (status, terse, detail) = if !region.contains_in_allocated(address) {
            (MemoryStatus::Free, "free", "unallocated".to_string())
        } else if tlab_free.iter().any(|r| r.contains(&address)) {
            (
                MemoryStatus::Free,
                "tlab",
                "unused part of a thread-local allocation buffer".to_string(),
            )
        } else {
            match role {
                RegionRole::Allocating => (MemoryStatus::Live, "live", "allocated".to_string()),
                RegionRole::Evacuating => (
                    MemoryStatus::Unknown,
                    "evac",
                    format!("being evacuated ({})", phase),
                ),
                RegionRole::Evacuated => (
                    MemoryStatus::Dead,
                    "dead",
                    "evacuated, awaiting reuse".to_string(),
                ),
                RegionRole::Marking => (
                    MemoryStatus::Unknown,
                    "mark",
                    format!("being marked ({})", phase),
                ),
            }
        };
        MemoryManagementInfo {
            address,
            status,
            region: Some(region.name().to_string()),
            terse,
            description: format!("{}: {}", region.name(), detail),
        }
    }
}

impl fmt::Display for MemoryManagementInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.address, self.status, self.description)
    }
}
