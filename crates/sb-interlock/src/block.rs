//! Block state classification.
//!
//! A block state describes how usable a route (or a single section of it) is
//! for a given train, from completely available to completely unavailable.

use serde::{Deserialize, Serialize};

/// Availability of a route, totally ordered from best to worst.
///
/// The order is fixed by [`BlockState::severity`]; folding over a route keeps
/// the worst state seen so far, see [`BlockState::worst`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockState {
    /// Every section is reserved for (or occupied by) the requesting train.
    Reserved,
    /// Every section is free and may be reserved.
    Reservable,
    /// Occupied by a train moving the same way, or standing still.
    OccupiedSameDirection,
    /// Reserved by another train or locked by another signal.
    ReservedOther,
    /// The requesting train has been told to wait here.
    ForcedWait,
    /// Occupied against the signal with no requesting train to compare to.
    OccupiedOppositeDirection,
    /// Occupied by an opposing train or claimed by another train first.
    Open,
    /// Unusable: misaligned points, deadlock trap or an active hold.
    Blocked,
}

impl BlockState {
    /// Every state, best first.
    pub const ALL: [BlockState; 8] = [
        BlockState::Reserved,
        BlockState::Reservable,
        BlockState::OccupiedSameDirection,
        BlockState::ReservedOther,
        BlockState::ForcedWait,
        BlockState::OccupiedOppositeDirection,
        BlockState::Open,
        BlockState::Blocked,
    ];

    /// Position in the availability order: 0 is completely available.
    pub const fn severity(self) -> u8 {
        match self {
            BlockState::Reserved => 0,
            BlockState::Reservable => 1,
            BlockState::OccupiedSameDirection => 2,
            BlockState::ReservedOther => 3,
            BlockState::ForcedWait => 4,
            BlockState::OccupiedOppositeDirection => 5,
            BlockState::Open => 6,
            BlockState::Blocked => 7,
        }
    }

    /// The less available of two states.
    pub fn worst(self, other: BlockState) -> BlockState {
        if other.is_worse_than(self) { other } else { self }
    }

    /// Strictly less available than `other`.
    pub fn is_worse_than(self, other: BlockState) -> bool {
        self.severity() > other.severity()
    }

    /// No worse than `limit`.
    pub fn is_at_most(self, limit: BlockState) -> bool {
        self.severity() <= limit.severity()
    }

    /// Route may be used in full (reserved or reservable).
    pub fn is_clear(self) -> bool {
        self.is_at_most(BlockState::Reservable)
    }

    /// Coarse view exposed to head extensions.
    pub fn signal_view(self) -> SignalBlockState {
        match self {
            BlockState::Reserved | BlockState::Reservable => SignalBlockState::Clear,
            BlockState::OccupiedSameDirection => SignalBlockState::Occupied,
            _ => SignalBlockState::Obstructed,
        }
    }
}

impl PartialOrd for BlockState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlockState {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.severity().cmp(&other.severity())
    }
}

/// Three-way block classification used by aspect logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalBlockState {
    Clear,
    Occupied,
    Obstructed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_strictly_increasing() {
        for pair in BlockState::ALL.windows(2) {
            assert!(pair[1].is_worse_than(pair[0]));
        }
    }

    #[test]
    fn worst_picks_less_available() {
        assert_eq!(
            BlockState::Reservable.worst(BlockState::OccupiedSameDirection),
            BlockState::OccupiedSameDirection
        );
        assert_eq!(BlockState::Blocked.worst(BlockState::Reserved), BlockState::Blocked);
        assert_eq!(BlockState::Reserved.worst(BlockState::Reserved), BlockState::Reserved);
    }

    #[test]
    fn signal_view_mapping() {
        assert_eq!(BlockState::Reservable.signal_view(), SignalBlockState::Clear);
        assert_eq!(
            BlockState::OccupiedSameDirection.signal_view(),
            SignalBlockState::Occupied
        );
        assert_eq!(BlockState::ForcedWait.signal_view(), SignalBlockState::Obstructed);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_state() -> impl Strategy<Value = BlockState> {
        (0usize..8).prop_map(|i| BlockState::ALL[i])
    }

    proptest! {
        #[test]
        fn folding_never_improves(states in prop::collection::vec(any_state(), 1..30)) {
            let mut aggregate = BlockState::Reserved;
            for state in states {
                let next = aggregate.worst(state);
                prop_assert!(!aggregate.is_worse_than(next));
                prop_assert!(!state.is_worse_than(next));
                aggregate = next;
            }
        }
    }
}
