//! References into a generational heap with a copying nursery and a semispace old generation.
//!
//! Young objects are always evacuated (promoted) into the old generation's to-space, above the
//! evacuation mark. A full collection additionally flips the old generation and evacuates its
//! live objects into the new old to-space. Which transitions are legal depends on the kind of
//! collection in progress, so the collection events carry a [`CollectionKind`].

use super::{AlternateRole, ObjectStatus, RefState, Relocatable, SchemeReference};
use crate::util::error::{Result, TeleError};
use crate::util::Address;
use std::sync::Arc;
use strum_macros::IntoStaticStr;

/// Kind of the collection in progress.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    /// Nursery only.
    Minor,
    /// Nursery and old generation.
    Full,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum GenSemiSpaceRefState {
    /// In the nursery, outside of a collection.
    #[strum(serialize = "YOUNG_REF_LIVE")]
    YoungLive,
    /// In the nursery during a collection, not yet known to be promoted.
    #[strum(serialize = "YOUNG_REF_FROM")]
    YoungFrom,
    /// In the promotion area of old to-space; the nursery copy it came from is unknown.
    #[strum(serialize = "OLD_PROMOTED_REF")]
    OldPromoted,
    /// Promoted from the nursery; remembers the nursery address until the cycle ends.
    #[strum(serialize = "PROMOTED_REF")]
    Promoted,
    /// Quasi-object: a nursery copy that has been promoted.
    #[strum(serialize = "YOUNG_FORWARDER")]
    YoungForwarder,
    /// Quasi-object: an old from-space copy that has been evacuated.
    #[strum(serialize = "OLD_FORWARDER")]
    OldForwarder,
    /// In old to-space, outside of a full collection's evacuation.
    #[strum(serialize = "OLD_REF_LIVE")]
    OldLive,
    /// In old from-space during a full collection, not yet known to be evacuated.
    #[strum(serialize = "OLD_REF_FROM")]
    OldFrom,
    /// In old to-space during a full collection; the from-space copy is unknown.
    #[strum(serialize = "OLD_REF_TO")]
    OldTo,
    /// Evacuated during a full collection; remembers the old from-space address.
    #[strum(serialize = "OLD_REF_FROM_TO")]
    OldFromTo,
    #[strum(serialize = "REF_DEAD")]
    Dead,
}

impl RefState for GenSemiSpaceRefState {
    const FAMILY: &'static str = "generational semispace";

    fn status(self) -> ObjectStatus {
        use GenSemiSpaceRefState::*;
        match self {
            YoungLive | OldPromoted | Promoted | OldLive | OldTo | OldFromTo => ObjectStatus::Live,
            YoungFrom | OldFrom => ObjectStatus::Unknown,
            YoungForwarder | OldForwarder => ObjectStatus::Forwarder,
            Dead => ObjectStatus::Dead,
        }
    }

    fn label(self) -> &'static str {
        self.into()
    }

    fn alternate_role(self) -> AlternateRole {
        use GenSemiSpaceRefState::*;
        match self {
            Promoted | OldFromTo => AlternateRole::ForwardedFrom,
            YoungForwarder | OldForwarder => AlternateRole::ForwardedTo,
            _ => AlternateRole::None,
        }
    }
}

pub type GenSemiSpaceRef = SchemeReference<GenSemiSpaceRefState>;

impl SchemeReference<GenSemiSpaceRefState> {
    pub fn young_live(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenSemiSpaceRefState::YoungLive)
    }

    pub fn young_from(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenSemiSpaceRefState::YoungFrom)
    }

    pub fn old_live(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenSemiSpaceRefState::OldLive)
    }

    pub fn old_promoted(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenSemiSpaceRefState::OldPromoted)
    }

    pub fn old_from(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenSemiSpaceRefState::OldFrom)
    }

    pub fn old_to(origin: Address) -> Arc<Self> {
        Self::new(origin, None, GenSemiSpaceRefState::OldTo)
    }

    pub fn young_forwarder(origin: Address, forwarded_to: Address) -> Arc<Self> {
        Self::new(origin, Some(forwarded_to), GenSemiSpaceRefState::YoungForwarder)
    }

    pub fn old_forwarder(origin: Address, forwarded_to: Address) -> Arc<Self> {
        Self::new(origin, Some(forwarded_to), GenSemiSpaceRefState::OldForwarder)
    }

    pub fn is_young(&self) -> bool {
        use GenSemiSpaceRefState::*;
        matches!(self.state(), YoungLive | YoungFrom | YoungForwarder)
    }

    pub fn analysis_begins(&self, kind: CollectionKind) -> Result<()> {
        self.transition("analysis begins", |data| {
            use GenSemiSpaceRefState::*;
            match (data.state, kind) {
                (YoungLive, _) => data.state = YoungFrom,
                (OldLive, CollectionKind::Minor) => {}
                (OldLive, CollectionKind::Full) => data.state = OldFrom,
                _ => return false,
            }
            true
        })
    }

    pub fn analysis_ends(&self, kind: CollectionKind) -> Result<()> {
        self.transition("analysis ends", |data| {
            use GenSemiSpaceRefState::*;
            match (data.state, kind) {
                (YoungFrom, _) | (YoungForwarder, _) | (OldForwarder, CollectionKind::Full) => {
                    data.state = Dead;
                    data.alternate = None;
                }
                (OldFrom, CollectionKind::Full) => data.state = Dead,
                (OldPromoted, _) | (OldTo, CollectionKind::Full) => data.state = OldLive,
                (OldLive, CollectionKind::Minor) => {}
                (Promoted, _) | (OldFromTo, CollectionKind::Full) => {}
                _ => return false,
            }
            true
        })
    }

    pub fn cycle_ends(&self) -> Result<()> {
        self.transition("cycle ends", |data| {
            use GenSemiSpaceRefState::*;
            match data.state {
                Promoted | OldFromTo | OldLive => {
                    data.state = OldLive;
                    data.alternate = None;
                }
                YoungLive => {}
                _ => return false,
            }
            true
        })
    }
}

impl Relocatable for SchemeReference<GenSemiSpaceRefState> {
    fn awaits_forwarding(&self) -> bool {
        matches!(
            self.state(),
            GenSemiSpaceRefState::YoungFrom | GenSemiSpaceRefState::OldFrom
        )
    }

    fn discover_forwarded(&self, to: Address) -> Result<()> {
        self.transition("forwarding discovered", |data| {
            use GenSemiSpaceRefState::*;
            data.state = match data.state {
                YoungFrom => Promoted,
                OldFrom => OldFromTo,
                _ => return false,
            };
            data.alternate = Some(data.origin);
            data.origin = to;
            true
        })
    }

    fn awaits_forwarder(&self) -> bool {
        matches!(
            self.state(),
            GenSemiSpaceRefState::OldPromoted | GenSemiSpaceRefState::OldTo
        )
    }

    fn discover_forwarder(&self, from: Address) -> Result<()> {
        self.transition("forwarder discovered", |data| {
            use GenSemiSpaceRefState::*;
            data.state = match data.state {
                OldPromoted => Promoted,
                OldTo => OldFromTo,
                _ => return false,
            };
            data.alternate = Some(from);
            true
        })
    }

    fn become_forwarder(&self, to: Address) -> Result<()> {
        self.transition("becomes forwarder", |data| {
            use GenSemiSpaceRefState::*;
            data.state = match data.state {
                YoungFrom => YoungForwarder,
                OldFrom => OldForwarder,
                _ => return false,
            };
            data.alternate = Some(to);
            true
        })
    }

    fn create_forwarder(&self) -> Result<Arc<Self>> {
        use super::RemoteReference;
        match (self.state(), self.alternate()) {
            (GenSemiSpaceRefState::Promoted, Some(from)) => {
                Ok(Self::young_forwarder(from, self.origin()))
            }
            (GenSemiSpaceRefState::OldFromTo, Some(from)) => {
                Ok(Self::old_forwarder(from, self.origin()))
            }
            (state, _) => Err(TeleError::IllegalTransition {
                state: state.label(),
                event: "create forwarder",
            }),
        }
    }
}
