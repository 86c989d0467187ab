//! Track circuit state: the reservation ledger attached to each section.
//!
//! Everything here is bookkeeping on a single section. Side effects that
//! reach beyond the section (point alignment, signal enabling, deadlock traps)
//! are applied by the interlocking around these calls.

use std::collections::VecDeque;

use sb_core::{SignalId, TrainId};
use sb_graph::TrackDirection;
use serde::{Deserialize, Serialize};

use crate::route::RoutedTrain;

/// A train physically on a section, with its direction of travel there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub train: RoutedTrain,
    pub direction: TrackDirection,
}

/// Returned when a reservation is refused because another train holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveConflict {
    pub holder: RoutedTrain,
}

/// Occupancy and reservation state of one section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackCircuitState {
    occupants: Vec<Occupant>,
    reserved: Option<RoutedTrain>,
    signal_reserved: Option<SignalId>,
    pre_reserved: VecDeque<RoutedTrain>,
    claimed: VecDeque<RoutedTrain>,
    forced: bool,
}

impl TrackCircuitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `train` the exclusive reservation.
    ///
    /// Fails if a different train already holds it. On success the train's
    /// own claim and pre-reservation are fulfilled and dropped.
    pub fn reserve(&mut self, train: RoutedTrain) -> Result<(), ReserveConflict> {
        if let Some(holder) = self.reserved {
            if holder.train != train.train {
                return Err(ReserveConflict { holder });
            }
        }
        self.reserved = Some(train);
        self.drop_from_queues(train.train);
        Ok(())
    }

    /// Queue a claim for `train` unless it already holds or claims the section.
    pub fn claim(&mut self, train: RoutedTrain) {
        if self.is_reserved_by(train.train) || self.claimed.iter().any(|t| t.train == train.train) {
            return;
        }
        self.claimed.push_back(train);
    }

    /// Queue a pre-reservation for `train` unless already present.
    pub fn pre_reserve(&mut self, train: RoutedTrain) {
        if self.is_reserved_by(train.train)
            || self.pre_reserved.iter().any(|t| t.train == train.train)
        {
            return;
        }
        self.pre_reserved.push_back(train);
    }

    /// Release everything `train` holds here short of physical occupancy.
    ///
    /// Returns true if the train held the reservation.
    pub fn unreserve_train(&mut self, train: TrainId) -> bool {
        let owned = self.is_reserved_by(train);
        if owned {
            self.reserved = None;
        }
        self.drop_from_queues(train);
        owned
    }

    /// Clear the signal lock.
    pub fn unreserve(&mut self) {
        self.signal_reserved = None;
    }

    /// Lock the section for a signal.
    pub fn set_signal_reserved(&mut self, signal: SignalId) {
        self.signal_reserved = Some(signal);
    }

    /// Record `train` as physically present.
    pub fn add_occupant(&mut self, train: RoutedTrain, direction: TrackDirection) {
        if let Some(existing) = self
            .occupants
            .iter_mut()
            .find(|o| o.train.train == train.train)
        {
            existing.train = train;
            existing.direction = direction;
            return;
        }
        self.occupants.push(Occupant { train, direction });
    }

    /// Remove `train` from the occupants. Returns true if it was present.
    pub fn remove_occupant(&mut self, train: TrainId) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|o| o.train.train != train);
        before != self.occupants.len()
    }

    pub fn set_forced(&mut self, forced: bool) {
        self.forced = forced;
    }

    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    pub fn reserved(&self) -> Option<RoutedTrain> {
        self.reserved
    }

    pub fn signal_reserved(&self) -> Option<SignalId> {
        self.signal_reserved
    }

    pub fn pre_reserved(&self) -> impl Iterator<Item = &RoutedTrain> {
        self.pre_reserved.iter()
    }

    pub fn claimed(&self) -> impl Iterator<Item = &RoutedTrain> {
        self.claimed.iter()
    }

    /// Train at the head of the claim queue.
    pub fn claim_head(&self) -> Option<RoutedTrain> {
        self.claimed.front().copied()
    }

    pub fn forced(&self) -> bool {
        self.forced
    }

    pub fn is_reserved_by(&self, train: TrainId) -> bool {
        self.reserved.is_some_and(|t| t.train == train)
    }

    pub fn is_claimed_by(&self, train: TrainId) -> bool {
        self.claimed.iter().any(|t| t.train == train)
    }

    pub fn is_pre_reserved_by(&self, train: TrainId) -> bool {
        self.pre_reserved.iter().any(|t| t.train == train)
    }

    pub fn occupied_by(&self, train: TrainId) -> bool {
        self.occupants.iter().any(|o| o.train.train == train)
    }

    pub fn has_trains(&self) -> bool {
        !self.occupants.is_empty()
    }

    /// Occupied by any train other than `train`.
    pub fn has_other_trains(&self, train: TrainId) -> bool {
        self.occupants.iter().any(|o| o.train.train != train)
    }

    /// Nothing held here at all: no occupant, holder, lock or queue entry.
    pub fn is_idle(&self) -> bool {
        self.occupants.is_empty()
            && self.reserved.is_none()
            && self.signal_reserved.is_none()
            && self.pre_reserved.is_empty()
            && self.claimed.is_empty()
    }

    fn drop_from_queues(&mut self, train: TrainId) {
        self.claimed.retain(|t| t.train != train);
        self.pre_reserved.retain(|t| t.train != train);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::Id;

    fn train(n: u32) -> RoutedTrain {
        RoutedTrain::new(Id::from_index(n), 0)
    }

    #[test]
    fn reserve_is_exclusive() {
        let mut state = TrackCircuitState::new();
        state.reserve(train(1)).unwrap();
        let conflict = state.reserve(train(2)).unwrap_err();
        assert_eq!(conflict.holder, train(1));
        // same train, other route direction, may re-reserve
        state.reserve(RoutedTrain::new(Id::from_index(1), 1)).unwrap();
    }

    #[test]
    fn losing_reservation_falls_back_to_claim() {
        let mut state = TrackCircuitState::new();
        assert!(state.reserve(train(1)).is_ok());
        if state.reserve(train(2)).is_err() {
            state.claim(train(2));
        }
        assert!(state.is_reserved_by(Id::from_index(1)));
        assert_eq!(state.claim_head(), Some(train(2)));
    }

    #[test]
    fn reserve_fulfils_own_claims() {
        let mut state = TrackCircuitState::new();
        state.claim(train(1));
        state.claim(train(2));
        state.pre_reserve(train(1));
        state.reserve(train(1)).unwrap();
        assert!(!state.is_claimed_by(Id::from_index(1)));
        assert!(!state.is_pre_reserved_by(Id::from_index(1)));
        assert_eq!(state.claim_head(), Some(train(2)));
    }

    #[test]
    fn queues_have_no_duplicates() {
        let mut state = TrackCircuitState::new();
        state.claim(train(3));
        state.claim(train(3));
        state.pre_reserve(train(3));
        state.pre_reserve(train(3));
        assert_eq!(state.claimed().count(), 1);
        assert_eq!(state.pre_reserved().count(), 1);
    }

    #[test]
    fn unreserve_train_only_releases_owner() {
        let mut state = TrackCircuitState::new();
        state.reserve(train(1)).unwrap();
        assert!(!state.unreserve_train(Id::from_index(2)));
        assert!(state.is_reserved_by(Id::from_index(1)));
        assert!(state.unreserve_train(Id::from_index(1)));
        assert!(state.reserved().is_none());
    }

    #[test]
    fn signal_lock_and_occupancy() {
        let mut state = TrackCircuitState::new();
        state.set_signal_reserved(Id::from_index(4));
        state.add_occupant(train(1), TrackDirection::Ahead);
        state.add_occupant(train(1), TrackDirection::Reverse);
        assert_eq!(state.occupants().len(), 1);
        assert!(state.has_other_trains(Id::from_index(2)));
        assert!(!state.has_other_trains(Id::from_index(1)));
        state.unreserve();
        assert!(state.signal_reserved().is_none());
        assert!(state.remove_occupant(Id::from_index(1)));
        assert!(state.is_idle());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use sb_core::Id;

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u32),
        Claim(u32),
        PreReserve(u32),
        Unreserve(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..5).prop_map(Op::Reserve),
            (1u32..5).prop_map(Op::Claim),
            (1u32..5).prop_map(Op::PreReserve),
            (1u32..5).prop_map(Op::Unreserve),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_holder(ops in prop::collection::vec(op(), 1..60)) {
            let mut state = TrackCircuitState::new();
            for op in ops {
                let before = state.reserved();
                match op {
                    Op::Reserve(n) => {
                        let t = RoutedTrain::new(Id::from_index(n), 0);
                        let result = state.reserve(t);
                        if let Some(holder) = before {
                            if holder.train != t.train {
                                prop_assert!(result.is_err());
                                prop_assert_eq!(state.reserved(), before);
                            }
                        }
                    }
                    Op::Claim(n) => state.claim(RoutedTrain::new(Id::from_index(n), 0)),
                    Op::PreReserve(n) => state.pre_reserve(RoutedTrain::new(Id::from_index(n), 0)),
                    Op::Unreserve(n) => {
                        state.unreserve_train(Id::from_index(n));
                    }
                }
                if let Some(holder) = state.reserved() {
                    prop_assert!(!state.is_claimed_by(holder.train));
                }
            }
        }
    }
}
