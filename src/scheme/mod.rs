//! Remote models of the heap schemes a target VM may be configured with.
//!
//! Each scheme implements [`RemoteHeapScheme`] for one collector algorithm:
//! * it owns the [`HeapRegion`](crate::policy::HeapRegion)s the collector allocates in, re-read
//!   at every epoch,
//! * it owns one [`WeakReferenceMap`](crate::reference::WeakReferenceMap) per population of
//!   objects the algorithm distinguishes (to-space, from-space, nursery, ...),
//! * and it reconciles both against the collector's phase and counters in
//!   [`RemoteHeapScheme::update_memory_status`], following the [`PhaseWork`] computed by the
//!   shared [`HeapEpochState`].
//!
//! [`create_scheme`] picks the implementation for the collector reported by the target.

mod forwarding;
pub(crate) mod global;
mod info;
mod stats;

pub mod gen_marksweep;
pub mod gen_semispace;
pub mod marksweep;
pub mod semispace;
pub mod unknown;

pub use self::forwarding::ForwardingSummary;
pub use self::global::create_scheme;
pub use self::global::resolve_selector;
pub use self::global::CreateSchemeArgs;
pub use self::global::Epoch;
pub use self::global::HeapCounters;
pub use self::global::HeapEpochState;
pub use self::global::HeapPhase;
pub use self::global::PhaseWork;
pub use self::global::RemoteHeapScheme;
pub use self::info::MemoryManagementInfo;
pub use self::info::MemoryStatus;
pub use self::info::RegionRole;
pub use self::stats::MapStats;
pub use self::stats::RegionStats;
pub use self::stats::SchemeStats;

pub use self::gen_marksweep::GenMarkSweepScheme;
pub use self::gen_semispace::GenSemiSpaceScheme;
pub use self::marksweep::MarkSweepScheme;
pub use self::semispace::SemiSpaceScheme;
pub use self::unknown::UnknownScheme;
