//! The train side of the boundary.
//!
//! Movement, braking and path following live elsewhere; the interlocking only
//! reads a train's routes, position and speed and writes back authority
//! bookkeeping (last reserved section, claim state, control mode).

use std::collections::{BTreeMap, BTreeSet};

use sb_core::{Length, SectionId, SignalId, TrainId, Velocity, m, meters_per_second, mps};
use sb_graph::TrackDirection;
use serde::{Deserialize, Serialize};

use crate::route::{RoutedTrain, TrackRoute};

/// How a train is being controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ControlMode {
    /// Runs on signal authority.
    #[default]
    AutoSignal,
    /// Runs on node-control authority; used after a clearance race.
    AutoNode,
    /// Driver-controlled; may request permission to pass signals.
    Manual,
    /// Unrouted exploration; no propagation.
    Explorer,
    Inactive,
}

impl ControlMode {
    pub fn is_auto(self) -> bool {
        matches!(self, ControlMode::AutoSignal | ControlMode::AutoNode)
    }
}

/// Where a train end is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainPosition {
    pub section: SectionId,
    pub offset: Length,
    pub direction: TrackDirection,
    /// Index of `section` in the active route.
    pub route_index: usize,
}

/// One entry of a train's deadlock information: while entering the owning
/// section, `other` must not be allowed past `end_section`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlockLink {
    pub other: TrainId,
    pub end_section: SectionId,
}

/// A train as seen by the interlocking.
#[derive(Debug, Clone)]
pub struct Train {
    pub id: TrainId,
    pub name: String,
    pub control_mode: ControlMode,
    pub speed: Velocity,
    pub length: Length,
    /// Route per direction of travel; index 0 is forward.
    pub routes: [TrackRoute; 2],
    pub route_index: usize,
    pub position: TrainPosition,
    pub last_reserved: [Option<SectionId>; 2],
    pub next_signal: [Option<SignalId>; 2],
    pub claim_state: bool,
    /// Signals the train is timetabled to stop at.
    pub holding_signals: Vec<SignalId>,
    /// Sections where the train must wait (timetable conditions).
    pub wait_sections: BTreeSet<SectionId>,
    /// Alternative routes for path-based passing.
    pub alternative_paths: Vec<TrackRoute>,
    pub active_subpath: u32,
    /// Sections leading into a train pool; routes must not be built into them.
    pub pool_access: BTreeSet<SectionId>,
    pub deadlock_info: BTreeMap<SectionId, Vec<DeadlockLink>>,
    /// Forced sections found on the route; the routing side should reroute.
    pub reroute_requests: Vec<SectionId>,
}

impl Train {
    /// A train standing at the start of `route`.
    pub fn new(id: TrainId, name: impl Into<String>, route: TrackRoute) -> Self {
        let (section, direction) = route
            .first()
            .map(|e| (e.section, e.direction))
            .unwrap_or((SectionId::from_index(0), TrackDirection::Ahead));
        Self {
            id,
            name: name.into(),
            control_mode: ControlMode::AutoSignal,
            speed: mps(0.0),
            length: m(200.0),
            routes: [route, TrackRoute::new()],
            route_index: 0,
            position: TrainPosition {
                section,
                offset: m(0.0),
                direction,
                route_index: 0,
            },
            last_reserved: [None, None],
            next_signal: [None, None],
            claim_state: false,
            holding_signals: Vec::new(),
            wait_sections: BTreeSet::new(),
            alternative_paths: Vec::new(),
            active_subpath: 0,
            pool_access: BTreeSet::new(),
            deadlock_info: BTreeMap::new(),
            reroute_requests: Vec::new(),
        }
    }

    /// The train with its active route direction.
    pub fn routed(&self) -> RoutedTrain {
        RoutedTrain::new(self.id, self.route_index)
    }

    pub fn route(&self, index: usize) -> &TrackRoute {
        &self.routes[index.min(1)]
    }

    pub fn route_mut(&mut self, index: usize) -> &mut TrackRoute {
        &mut self.routes[index.min(1)]
    }

    pub fn is_stationary(&self, threshold_mps: f64) -> bool {
        meters_per_second(self.speed).abs() <= threshold_mps
    }

    pub fn is_auto(&self) -> bool {
        self.control_mode.is_auto()
    }

    /// Fall back to node control after a clearance race.
    pub fn switch_to_node_control(&mut self) {
        if self.control_mode != ControlMode::Explorer {
            self.control_mode = ControlMode::AutoNode;
        }
        self.next_signal = [None, None];
    }
}

/// Trains known to the interlocking, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TrainTable {
    trains: BTreeMap<TrainId, Train>,
}

impl TrainTable {
    pub fn insert(&mut self, train: Train) -> Option<Train> {
        self.trains.insert(train.id, train)
    }

    pub fn remove(&mut self, id: TrainId) -> Option<Train> {
        self.trains.remove(&id)
    }

    pub fn get(&self, id: TrainId) -> Option<&Train> {
        self.trains.get(&id)
    }

    pub fn get_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::Id;

    #[test]
    fn new_train_stands_at_route_start() {
        let route = TrackRoute::from_steps([
            (Id::from_index(3), TrackDirection::Reverse),
            (Id::from_index(2), TrackDirection::Reverse),
        ]);
        let train = Train::new(Id::from_index(7), "7", route);
        assert_eq!(train.position.section, Id::from_index(3));
        assert_eq!(train.position.direction, TrackDirection::Reverse);
        assert_eq!(train.routed(), RoutedTrain::new(Id::from_index(7), 0));
        assert!(train.is_stationary(0.5));
    }

    #[test]
    fn node_control_keeps_explorer() {
        let mut train = Train::new(Id::from_index(1), "1", TrackRoute::new());
        train.switch_to_node_control();
        assert_eq!(train.control_mode, ControlMode::AutoNode);
        train.control_mode = ControlMode::Explorer;
        train.switch_to_node_control();
        assert_eq!(train.control_mode, ControlMode::Explorer);
    }
}
