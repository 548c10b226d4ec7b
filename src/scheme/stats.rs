use super::global::{Epoch, HeapCounters};
use crate::policy::HeapRegion;
use crate::reference::{ObjectStatus, RemoteReference, WeakReferenceMap};
use crate::util::conversions::{bytes_to_formatted_string, usage_percent};
use crate::util::Address;
use enum_map::EnumMap;
use itertools::Itertools;
use std::fmt;
use strum::IntoEnumIterator;

/// Occupancy of one region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionStats {
    pub name: String,
    pub start: Address,
    pub size: usize,
    pub used: usize,
}

impl RegionStats {
    pub fn of(region: &HeapRegion) -> Self {
        RegionStats {
            name: region.name().to_string(),
            start: region.start(),
            size: region.size(),
            used: region.used(),
        }
    }

    pub fn usage_percent(&self) -> usize {
        usage_percent(self.used, self.size)
    }
}

/// Number of tracked references per status in one map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapStats {
    pub name: &'static str,
    pub counts: EnumMap<ObjectStatus, usize>,
}

impl MapStats {
    pub fn of<R: RemoteReference>(map: &WeakReferenceMap<R>) -> Self {
        MapStats {
            name: map.name(),
            counts: map.status_counts(),
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// A snapshot of the scheme's state for the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemeStats {
    pub scheme: &'static str,
    pub counters: HeapCounters,
    pub last_update_epoch: Option<Epoch>,
    pub regions: Vec<RegionStats>,
    pub maps: Vec<MapStats>,
}

impl SchemeStats {
    pub fn total_references(&self) -> usize {
        self.maps.iter().map(|m| m.total()).sum()
    }

    pub fn count(&self, status: ObjectStatus) -> usize {
        self.maps.iter().map(|m| m.counts[status]).sum()
    }
}

impl fmt::Display for SchemeStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} heap, phase {}, collections started {} completed {}, last update {}",
            self.scheme,
            self.counters.phase,
            self.counters.gc_started,
            self.counters.gc_completed,
            self.last_update_epoch
                .map_or_else(|| "never".to_string(), |e| format!("at epoch {}", e))
        )?;
        for region in &self.regions {
            writeln!(
                f,
                "  region {} at {}: {} used of {} ({}%)",
                region.name,
                region.start,
                bytes_to_formatted_string(region.used),
                bytes_to_formatted_string(region.size),
                region.usage_percent()
            )?;
        }
        for map in &self.maps {
            let counts = ObjectStatus::iter()
                .filter(|s| map.counts[*s] > 0)
                .map(|s| format!("{}={}", s, map.counts[s]))
                .join(", ");
            writeln!(f, "  {} refs: {} [{}]", map.name, map.total(), counts)?;
        }
        Ok(())
    }
}
