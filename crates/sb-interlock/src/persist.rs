//! Snapshot and restore of the mutable interlocking state.
//!
//! The static layout (graph, placements, signal types, passing-area paths)
//! is not part of a snapshot; it is rebuilt from the layout definition and
//! the snapshot is applied on top.

use std::collections::BTreeMap;

use sb_core::{SectionId, SignalId, TrainId};
use sb_graph::PinPair;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aspect::{Aspect, SignalFunction};
use crate::block::BlockState;
use crate::circuit::TrackCircuitState;
use crate::deadlock::Assignment;
use crate::error::{InterlockError, InterlockResult};
use crate::interlocking::Interlocking;
use crate::route::{RoutedTrain, TrackRoute};
use crate::section::DeadlockTraps;
use crate::signal::{HoldState, NextSignals, Permission, TrainLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSnapshot {
    pub state: TrackCircuitState,
    pub active_pins: [PinPair; 2],
    pub deadlock: DeadlockTraps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSnapshot {
    pub aspect: Aspect,
    pub draw_state: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text_aspect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub enabled_train: Option<RoutedTrain>,
    pub route: TrackRoute,
    pub full_route: bool,
    pub train_route_index: Option<usize>,
    pub block_state: BlockState,
    pub hold_state: HoldState,
    pub permission: Permission,
    pub next_signals: Vec<(SignalFunction, SignalId)>,
    pub propagated: bool,
    pub is_propagated: bool,
    pub force_propagation: bool,
    pub req_clear_ahead: i32,
    pub clear_ahead_active: i32,
    pub approach_control_cleared: bool,
    pub approach_control_set: bool,
    pub force_prop_on_approach_control: bool,
    pub claim_locked: bool,
    pub station_hold: bool,
    pub call_on_manually_allowed: bool,
    pub junctions_passed: Vec<SectionId>,
    pub locks: Vec<TrainLock>,
    #[serde(default)]
    pub local_storage: BTreeMap<i32, i32>,
    pub heads: Vec<HeadSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockSnapshot {
    pub assignments: Vec<Assignment>,
    pub waiting: Vec<TrainId>,
}

/// Mutable state of an interlocking at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlockSnapshot {
    pub section_count: usize,
    pub sections: Vec<SectionSnapshot>,
    pub signals: Vec<SignalSnapshot>,
    pub deadlocks: Vec<DeadlockSnapshot>,
}

impl Interlocking {
    pub fn snapshot(&self) -> InterlockSnapshot {
        let sections = self
            .sections
            .iter()
            .map(|s| SectionSnapshot {
                state: s.state.clone(),
                active_pins: s.active_pins,
                deadlock: s.deadlock.clone(),
            })
            .collect();
        let signals = self
            .signals
            .iter()
            .map(|s| SignalSnapshot {
                enabled_train: s.enabled_train,
                route: s.route.clone(),
                full_route: s.full_route,
                train_route_index: s.train_route_index,
                block_state: s.block_state,
                hold_state: s.hold_state,
                permission: s.permission,
                next_signals: s.next_signals.iter().collect(),
                propagated: s.propagated,
                is_propagated: s.is_propagated,
                force_propagation: s.force_propagation,
                req_clear_ahead: s.req_clear_ahead,
                clear_ahead_active: s.clear_ahead_active,
                approach_control_cleared: s.approach_control_cleared,
                approach_control_set: s.approach_control_set,
                force_prop_on_approach_control: s.force_prop_on_approach_control,
                claim_locked: s.claim_locked,
                station_hold: s.station_hold,
                call_on_manually_allowed: s.call_on_manually_allowed,
                junctions_passed: s.junctions_passed.clone(),
                locks: s.locks.clone(),
                local_storage: s.local_storage.clone(),
                heads: s
                    .heads
                    .iter()
                    .map(|h| HeadSnapshot {
                        aspect: h.aspect,
                        draw_state: h.draw_state,
                        text_aspect: h.text_aspect.clone(),
                    })
                    .collect(),
            })
            .collect();
        let deadlocks = self
            .deadlocks
            .iter()
            .map(|d| DeadlockSnapshot {
                assignments: d.assignments().collect(),
                waiting: d.waiting().collect(),
            })
            .collect();
        InterlockSnapshot {
            section_count: self.sections.len(),
            sections,
            signals,
            deadlocks,
        }
    }

    /// Apply a snapshot taken from an interlocking built from the same
    /// layout.
    ///
    /// Shape mismatches are rejected before anything is changed.
    pub fn restore(&mut self, snapshot: &InterlockSnapshot) -> InterlockResult<()> {
        let built = self.sections.len();
        if snapshot.section_count != built || snapshot.sections.len() != built {
            return Err(InterlockError::SectionCountMismatch {
                saved: snapshot.section_count,
                built,
            });
        }
        if snapshot.signals.len() != self.signals.len() {
            return Err(InterlockError::SignalCountMismatch {
                saved: snapshot.signals.len(),
                built: self.signals.len(),
            });
        }
        if snapshot.deadlocks.len() != self.deadlocks.len() {
            return Err(InterlockError::InvalidArg {
                what: format!(
                    "snapshot has {} passing areas, layout has {}",
                    snapshot.deadlocks.len(),
                    self.deadlocks.len()
                ),
            });
        }
        let heads_match = snapshot
            .signals
            .iter()
            .zip(&self.signals)
            .all(|(saved, live)| saved.heads.len() == live.heads.len());
        if !heads_match {
            return Err(InterlockError::InvalidArg {
                what: "snapshot head layout differs from the signal layout".into(),
            });
        }

        for (runtime, saved) in self.sections.iter_mut().zip(&snapshot.sections) {
            runtime.state = saved.state.clone();
            runtime.active_pins = saved.active_pins;
            runtime.deadlock = saved.deadlock.clone();
            runtime.signals_passing_routes.clear();
        }
        for (object, saved) in self.signals.iter_mut().zip(&snapshot.signals) {
            object.enabled_train = saved.enabled_train;
            object.route = saved.route.clone();
            object.full_route = saved.full_route;
            object.train_route_index = saved.train_route_index;
            object.block_state = saved.block_state;
            object.hold_state = saved.hold_state;
            object.permission = saved.permission;
            object.next_signals = NextSignals::from_pairs(saved.next_signals.iter().copied());
            object.propagated = saved.propagated;
            object.is_propagated = saved.is_propagated;
            object.force_propagation = saved.force_propagation;
            object.req_clear_ahead = saved.req_clear_ahead;
            object.clear_ahead_active = saved.clear_ahead_active;
            object.approach_control_cleared = saved.approach_control_cleared;
            object.approach_control_set = saved.approach_control_set;
            object.force_prop_on_approach_control = saved.force_prop_on_approach_control;
            object.claim_locked = saved.claim_locked;
            object.station_hold = saved.station_hold;
            object.call_on_manually_allowed = saved.call_on_manually_allowed;
            object.junctions_passed = saved.junctions_passed.clone();
            object.locks = saved.locks.clone();
            object.local_storage = saved.local_storage.clone();
            for (head, saved_head) in object.heads.iter_mut().zip(&saved.heads) {
                head.aspect = saved_head.aspect;
                head.draw_state = saved_head.draw_state;
                head.text_aspect = saved_head.text_aspect.clone();
            }
        }
        for slot in 0..self.signals.len() {
            let junctions = self.signals[slot].junctions_passed.clone();
            for junction in junctions {
                if let Some(runtime) = self.sections.get_mut(junction.slot()) {
                    runtime.signals_passing_routes.push(SignalId::from_usize(slot));
                }
            }
        }
        for (info, saved) in self.deadlocks.iter_mut().zip(&snapshot.deadlocks) {
            info.restore_assignments(&saved.assignments, &saved.waiting);
        }
        info!(
            sections = built,
            signals = self.signals.len(),
            "interlocking state restored"
        );
        Ok(())
    }
}
