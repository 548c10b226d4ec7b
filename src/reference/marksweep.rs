//! References into a non-moving mark-sweep heap.
//!
//! Objects never move, so there are no forwarders. While the collector analyzes, every tracked
//! object is `UNKNOWN` until its mark bit is observed; whatever is still unmarked when analysis
//! ends is swept. Free chunks formatted by the sweeper are tracked as `FREE` quasi-objects until
//! the allocator consumes them.

use super::{AlternateRole, ObjectStatus, RefState, SchemeReference};
use crate::util::error::Result;
use crate::util::Address;
use std::sync::Arc;
use strum_macros::IntoStaticStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum MarkSweepRefState {
    #[strum(serialize = "LIVE")]
    Live,
    /// During analysis, mark bit not (yet) set.
    #[strum(serialize = "UNMARKED")]
    Unmarked,
    /// During analysis, mark bit set.
    #[strum(serialize = "MARKED")]
    Marked,
    /// Quasi-object: a free chunk.
    #[strum(serialize = "FREE_CHUNK")]
    Free,
    #[strum(serialize = "DEAD")]
    Dead,
}

impl RefState for MarkSweepRefState {
    const FAMILY: &'static str = "mark-sweep";

    fn status(self) -> ObjectStatus {
        match self {
            MarkSweepRefState::Live | MarkSweepRefState::Marked => ObjectStatus::Live,
            MarkSweepRefState::Unmarked => ObjectStatus::Unknown,
            MarkSweepRefState::Free => ObjectStatus::Free,
            MarkSweepRefState::Dead => ObjectStatus::Dead,
        }
    }

    fn label(self) -> &'static str {
        self.into()
    }

    fn alternate_role(self) -> AlternateRole {
        AlternateRole::None
    }
}

pub type MarkSweepRef = SchemeReference<MarkSweepRefState>;

impl SchemeReference<MarkSweepRefState> {
    pub fn live(origin: Address) -> Arc<Self> {
        Self::new(origin, None, MarkSweepRefState::Live)
    }

    /// A reference created while analysis is in progress.
    pub fn analyzing(origin: Address, marked: bool) -> Arc<Self> {
        let state = if marked {
            MarkSweepRefState::Marked
        } else {
            MarkSweepRefState::Unmarked
        };
        Self::new(origin, None, state)
    }

    pub fn free_chunk(origin: Address) -> Arc<Self> {
        Self::new(origin, None, MarkSweepRefState::Free)
    }

    pub fn analysis_begins(&self) -> Result<()> {
        self.transition("analysis begins", |data| match data.state {
            MarkSweepRefState::Live => {
                data.state = MarkSweepRefState::Unmarked;
                true
            }
            MarkSweepRefState::Free => true,
            _ => false,
        })
    }

    pub fn mark_observed(&self) -> Result<()> {
        self.transition("mark observed", |data| match data.state {
            MarkSweepRefState::Unmarked => {
                data.state = MarkSweepRefState::Marked;
                true
            }
            _ => false,
        })
    }

    /// Analysis is over. `marked` is the final state of the object's mark bit.
    pub fn analysis_ends(&self, marked: bool) -> Result<()> {
        self.transition("analysis ends", |data| match data.state {
            MarkSweepRefState::Unmarked => {
                data.state = if marked {
                    MarkSweepRefState::Live
                } else {
                    MarkSweepRefState::Dead
                };
                true
            }
            MarkSweepRefState::Marked => {
                data.state = MarkSweepRefState::Live;
                true
            }
            MarkSweepRefState::Free => true,
            _ => false,
        })
    }

    /// The allocator has reused a free chunk.
    pub fn free_chunk_consumed(&self) -> Result<()> {
        self.transition("free chunk consumed", |data| match data.state {
            MarkSweepRefState::Free => {
                data.state = MarkSweepRefState::Dead;
                true
            }
            _ => false,
        })
    }

    pub fn is_unmarked(&self) -> bool {
        self.state() == MarkSweepRefState::Unmarked
    }

    pub fn is_free_chunk(&self) -> bool {
        self.state() == MarkSweepRefState::Free
    }
}
