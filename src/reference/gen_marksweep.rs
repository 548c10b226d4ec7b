//! References into a generational heap with a copying nursery and a non-moving mark-sweep old
//! generation.
//!
//! Young objects behave as in the generational semispace heap: they are promoted out of the
//! nursery and leave forwarders behind. Old objects never move; during a full collection they
//! go through the mark-sweep states.

use super::gen_semispace::CollectionKind;
use super::{AlternateRole, ObjectStatus, RefState, Relocatable, SchemeReference};
use crate::util::error::{Result, TeleError};
use crate::util::Address;
use std::sync::Arc;
use strum_macros::IntoStaticStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum GenMarkSweepRefState {
    #[strum(serialize = "YOUNG_LIVE")]
    YoungLive,
    #[strum(serialize = "YOUNG_FROM")]
    YoungFrom,
    #[strum(serialize = "YOUNG_FORWARDER")]
    YoungForwarder,
    /// Promoted into the old generation; remembers the nursery address until the cycle ends.
    #[strum(serialize = "PROMOTED")]
    Promoted,
    #[strum(serialize = "OLD_LIVE")]
    OldLive,
    /// Old object during a full collection, mark bit not (yet) set.
    #[strum(serialize = "OLD_UNMARKED")]
    OldUnmarked,
    /// Old object during a full collection, mark bit set.
    #[strum(serialize = "OLD_MARKED")]
    OldMarked,
    #[strum(serialize = "FREE_CHUNK")]
    Free,
    #[strum(serialize = "DEAD")]
    Dead,
}

impl RefState for GenMarkSweepRefState {
    const FAMILY: &'static str = "generational mark-sweep";

    fn status(self) -> ObjectStatus {
        use GenMarkSweepRefState::*;
        match self {
            YoungLive | Promoted | OldLive | OldMarked => ObjectStatus::Live,
            YoungFrom | OldUnmarked => ObjectStatus::Unknown,
            YoungForwarder => ObjectStatus::Forwarder,
            Free => ObjectStatus::Free,
            Dead => ObjectStatus::Dead,
        }
    }

    fn label(self) -> &'static str {
        self.into()
    }

    fn alternate_role(self) -> AlternateRole {
        match self {
            GenMarkSweepRefState::Promoted => AlternateRole::ForwardedFrom,
            GenMarkSweepRefState::YoungForwarder => AlternateRole::ForwardedTo,
            _ => AlternateRole::None,
        }
    }
}

pub type GenMarkSweepRef = SchemeReference<GenMarkSweepRefState>;

impl SchemeReference<GenMarkSweepRefState> {
    pub fn young_live(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenMarkSweepRefState::YoungLive)
    }

    pub fn young_from(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenMarkSweepRefState::YoungFrom)
    }

    pub fn young_forwarder(origin: Address, forwarded_to: Address) -> Arc<Self> {
        Self::new(origin, Some(forwarded_to), GenMarkSweepRefState::YoungForwarder)
    }

    pub fn old_live(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenMarkSweepRefState::OldLive)
    }

    /// An old-generation reference created while a full collection analyzes.
    pub fn old_analyzing(origin: Address, marked: bool) -> Arc<Self> {
        let state = if marked {
            GenMarkSweepRefState::OldMarked
        } else {
            GenMarkSweepRefState::OldUnmarked
        };
        Self::new(origin, None, state)
    }

    pub fn free_chunk(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenMarkSweepRefState::Free)
    }

    pub fn is_young(&self) -> bool {
        use GenMarkSweepRefState::*;
        matches!(self.state(), YoungLive | YoungFrom | YoungForwarder)
    }

    pub fn is_unmarked(&self) -> bool {
        self.state() == GenMarkSweepRefState::OldUnmarked
    }

    pub fn is_free_chunk(&self) -> bool {
        self.state() == GenMarkSweepRefState::Free
    }

    pub fn analysis_begins(&self, kind: CollectionKind) -> Result<()> {
        self.transition("analysis begins", |data| {
            use GenMarkSweepRefState::*;
            match (data.state, kind) {
                (YoungLive, _) => data.state = YoungFrom,
                (OldLive, CollectionKind::Full) => data.state = OldUnmarked,
                (OldLive, CollectionKind::Minor) | (Free, _) => {}
                _ => return false,
            }
            true
        })
    }

    pub fn mark_observed(&self) -> Result<()> {
        self.transition("mark observed", |data| match data.state {
            GenMarkSweepRefState::OldUnmarked => {
                data.state = GenMarkSweepRefState::OldMarked;
                true
            }
            _ => false,
        })
    }

    /// Analysis is over. `marked` is the final state of the object's mark bit; it only matters
    /// for old objects at the end of a full collection.
    pub fn analysis_ends(&self, kind: CollectionKind, marked: bool) -> Result<()> {
        self.transition("analysis ends", |data| {
            use GenMarkSweepRefState::*;
            match (data.state, kind) {
                (YoungFrom, _) | (YoungForwarder, _) => {
                    data.state = Dead;
                    data.alternate = None;
                }
                (OldUnmarked, CollectionKind::Full) => {
                    data.state = if marked { OldLive } else { Dead };
                }
                (OldMarked, CollectionKind::Full) => data.state = OldLive,
                (OldLive, CollectionKind::Minor) | (Promoted, _) | (Free, _) => {}
                _ => return false,
            }
            true
        })
    }

    pub fn cycle_ends(&self) -> Result<()> {
        self.transition("cycle ends", |data| {
            use GenMarkSweepRefState::*;
            match data.state {
                Promoted => {
                    data.state = OldLive;
                    data.alternate = None;
                }
                OldLive | YoungLive | Free => {}
                _ => return false,
            }
            true
        })
    }

    pub fn free_chunk_consumed(&self) -> Result<()> {
        self.transition("free chunk consumed", |data| match data.state {
            GenMarkSweepRefState::Free => {
                data.state = GenMarkSweepRefState::Dead;
                true
            }
            _ => false,
        })
    }
}

impl Relocatable for SchemeReference<GenMarkSweepRefState> {
    fn awaits_forwarding(&self) -> bool {
        self.state() == GenMarkSweepRefState::YoungFrom
    }

    fn discover_forwarded(&self, to: Address) -> Result<()> {
        self.transition("forwarding discovered", |data| match data.state {
            GenMarkSweepRefState::YoungFrom => {
                data.alternate = Some(data.origin);
                data.origin = to;
                data.state = GenMarkSweepRefState::Promoted;
                true
            }
            _ => false,
        })
    }

    fn awaits_forwarder(&self) -> bool {
        use GenMarkSweepRefState::*;
        matches!(self.state(), OldLive | OldUnmarked | OldMarked)
    }

    fn discover_forwarder(&self, from: Address) -> Result<()> {
        self.transition("forwarder discovered", |data| {
            use GenMarkSweepRefState::*;
            match data.state {
                OldLive | OldUnmarked | OldMarked => {
                    data.alternate = Some(from);
                    data.state = Promoted;
                    true
                }
                _ => false,
            }
        })
    }

    fn become_forwarder(&self, to: Address) -> Result<()> {
        self.transition("becomes forwarder", |data| match data.state {
            GenMarkSweepRefState::YoungFrom => {
                data.alternate = Some(to);
                data.state = GenMarkSweepRefState::YoungForwarder;
                true
            }
            _ => false,
        })
    }

    fn create_forwarder(&self) -> Result<Arc<Self>> {
        use super::RemoteReference;
        match (self.state(), self.alternate()) {
            (GenMarkSweepRefState::Promoted, Some(from)) => {
                Ok(Self::young_forwarder(from, self.origin()))
            }
            (state, _) => Err(TeleError::IllegalTransition {
                state: state.label(),
                event: "create forwarder",
            }),
        }
    }
}
