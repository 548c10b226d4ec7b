//! References into a two-space copying heap.
//!
//! ```text
//!             analysis begins        forwarding discovered        cycle ends
//!   LIVE ------------------> FROM ----------------------> TO_FORWARDED -------> LIVE
//!                              |  \                             ^
//!            analysis ends     |   \ other ref tracks copy      | forwarder discovered
//!                              v    v                           |
//!                            DEAD  FORWARDER --analysis ends--> DEAD      TO_NEW
//! ```
//!
//! `TO_NEW` references are created for objects found in to-space while the collector is still
//! analyzing; they become `LIVE` when analysis ends. A relocated reference keeps its
//! forwarded-from address until the end of the collection cycle.

use super::{AlternateRole, ObjectStatus, RefState, Relocatable, SchemeReference};
use crate::util::error::Result;
use crate::util::Address;
use std::sync::Arc;
use strum_macros::IntoStaticStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum SemiSpaceRefState {
    /// In to-space, outside of a collection.
    #[strum(serialize = "LIVE")]
    Live,
    /// In from-space while the collector analyzes; not known to be forwarded yet.
    #[strum(serialize = "FROM_UNKNOWN")]
    FromUnknown,
    /// In to-space during a collection, copied from the forwarded-from address.
    #[strum(serialize = "TO_FORWARDED")]
    ToForwarded,
    /// In to-space during a collection, with no known from-space origin.
    #[strum(serialize = "TO_NEW")]
    ToNew,
    /// Quasi-object: the old from-space copy of a forwarded object.
    #[strum(serialize = "FORWARDER")]
    Forwarder,
    #[strum(serialize = "DEAD")]
    Dead,
}

impl RefState for SemiSpaceRefState {
    const FAMILY: &'static str = "semispace";

    fn status(self) -> ObjectStatus {
        match self {
            SemiSpaceRefState::Live | SemiSpaceRefState::ToForwarded | SemiSpaceRefState::ToNew => {
                ObjectStatus::Live
            }
            SemiSpaceRefState::FromUnknown => ObjectStatus::Unknown,
            SemiSpaceRefState::Forwarder => ObjectStatus::Forwarder,
            SemiSpaceRefState::Dead => ObjectStatus::Dead,
        }
    }

    fn label(self) -> &'static str {
        self.into()
    }

    fn alternate_role(self) -> AlternateRole {
        match self {
            SemiSpaceRefState::ToForwarded => AlternateRole::ForwardedFrom,
            SemiSpaceRefState::Forwarder => AlternateRole::ForwardedTo,
            _ => AlternateRole::None,
        }
    }
}

pub type SemiSpaceRef = SchemeReference<SemiSpaceRefState>;

impl SchemeReference<SemiSpaceRefState> {
    pub fn live(origin: Address) -> Arc<Self> {
        Self::new(origin, None, SemiSpaceRefState::Live)
    }

    pub fn from_unknown(origin: Address) -> Arc<Self> {
        Self::new(origin, None, SemiSpaceRefState::FromUnknown)
    }

    pub fn to_new(origin: Address) -> Arc<Self> {
        Self::new(origin, None, SemiSpaceRefState::ToNew)
    }

    pub fn forwarder(origin: Address, forwarded_to: Address) -> Arc<Self> {
        Self::new(origin, Some(forwarded_to), SemiSpaceRefState::Forwarder)
    }

    /// The spaces have been flipped; a to-space reference now points into from-space.
    pub fn analysis_begins(&self) -> Result<()> {
        self.transition("analysis begins", |data| match data.state {
            SemiSpaceRefState::Live => {
                data.state = SemiSpaceRefState::FromUnknown;
                true
            }
            _ => false,
        })
    }

    /// Evacuation is over: unforwarded from-space objects are garbage, and forwarders go away
    /// with the space that held them.
    pub fn analysis_ends(&self) -> Result<()> {
        self.transition("analysis ends", |data| match data.state {
            SemiSpaceRefState::FromUnknown | SemiSpaceRefState::Forwarder => {
                data.state = SemiSpaceRefState::Dead;
                data.alternate = None;
                true
            }
            SemiSpaceRefState::ToNew => {
                data.state = SemiSpaceRefState::Live;
                true
            }
            SemiSpaceRefState::ToForwarded => true,
            _ => false,
        })
    }

    /// The collection has completed; forwarding metadata is dropped.
    pub fn cycle_ends(&self) -> Result<()> {
        self.transition("cycle ends", |data| match data.state {
            SemiSpaceRefState::ToForwarded | SemiSpaceRefState::Live => {
                data.state = SemiSpaceRefState::Live;
                data.alternate = None;
                true
            }
            _ => false,
        })
    }
}

impl Relocatable for SchemeReference<SemiSpaceRefState> {
    fn awaits_forwarding(&self) -> bool {
        self.state() == SemiSpaceRefState::FromUnknown
    }

    fn discover_forwarded(&self, to: Address) -> Result<()> {
        self.transition("forwarding discovered", |data| match data.state {
            SemiSpaceRefState::FromUnknown => {
                data.alternate = Some(data.origin);
                data.origin = to;
                data.state = SemiSpaceRefState::ToForwarded;
                true
            }
            _ => false,
        })
    }

    fn awaits_forwarder(&self) -> bool {
        self.state() == SemiSpaceRefState::ToNew
    }

    fn discover_forwarder(&self, from: Address) -> Result<()> {
        self.transition("forwarder discovered", |data| match data.state {
            SemiSpaceRefState::ToNew => {
                data.alternate = Some(from);
                data.state = SemiSpaceRefState::ToForwarded;
                true
            }
            _ => false,
        })
    }

    fn become_forwarder(&self, to: Address) -> Result<()> {
        self.transition("becomes forwarder", |data| match data.state {
            SemiSpaceRefState::FromUnknown => {
                data.alternate = Some(to);
                data.state = SemiSpaceRefState::Forwarder;
                true
            }
            _ => false,
        })
    }

    fn create_forwarder(&self) -> Result<Arc<Self>> {
        match (self.state(), self.alternate()) {
            (SemiSpaceRefState::ToForwarded, Some(from)) => {
                Ok(Self::forwarder(from, super::RemoteReference::origin(self)))
            }
            (state, _) => Err(crate::util::error::TeleError::IllegalTransition {
                state: state.label(),
                event: "create forwarder",
            }),
        }
    }
}
