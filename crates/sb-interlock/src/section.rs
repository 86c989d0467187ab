//! Per-section runtime state and the section-level operations of the
//! interlocking: reservation, occupancy, availability, section state and
//! junction alignment.

use std::collections::{BTreeMap, BTreeSet};

use sb_core::{DeadlockId, SectionId, SignalId, TrainId};
use sb_graph::{Pin, PinPair, SectionKind, TrackDirection, TrackSection};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::block::BlockState;
use crate::circuit::TrackCircuitState;
use crate::config::PassingPathMode;
use crate::error::{InterlockError, InterlockResult};
use crate::interlocking::Interlocking;
use crate::route::{RoutedTrain, TrackRoute};

/// Deadlock bookkeeping kept on the end section of a passing area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockTraps {
    /// Trapped train -> trains that set the trap.
    pub traps: BTreeMap<TrainId, Vec<TrainId>>,
    /// Trains that set at least one trap here.
    pub actives: BTreeSet<TrainId>,
    /// Trains waiting for a trap here to clear.
    pub awaited: BTreeSet<TrainId>,
}

impl DeadlockTraps {
    pub fn is_trapped(&self, train: TrainId) -> bool {
        self.traps.contains_key(&train)
    }

    pub fn set(&mut self, setter: TrainId, trapped: TrainId) {
        let setters = self.traps.entry(trapped).or_default();
        if !setters.contains(&setter) {
            setters.push(setter);
        }
        self.actives.insert(setter);
    }

    /// Drop every trap set by `train` and stop waiting on its behalf.
    pub fn clear(&mut self, train: TrainId) {
        if self.actives.remove(&train) {
            for setters in self.traps.values_mut() {
                setters.retain(|t| *t != train);
            }
            self.traps.retain(|_, setters| !setters.is_empty());
        }
        self.awaited.remove(&train);
    }

    /// Another train than `train` is waiting here.
    pub fn awaited_by_other(&self, train: TrainId) -> bool {
        self.awaited.iter().any(|t| *t != train)
    }

    pub fn is_empty(&self) -> bool {
        self.traps.is_empty() && self.actives.is_empty() && self.awaited.is_empty()
    }
}

/// Mutable state of one track circuit section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRuntime {
    pub(crate) state: TrackCircuitState,
    pub(crate) active_pins: [PinPair; 2],
    pub(crate) deadlock: DeadlockTraps,
    pub(crate) deadlock_reference: Option<DeadlockId>,
    pub(crate) signals_passing_routes: Vec<SignalId>,
}

impl SectionRuntime {
    /// Fresh runtime state; junctions start aligned to their main route.
    pub fn new(section: &TrackSection) -> Self {
        let mut active_pins = section.pins;
        if section.kind.is_switchable() {
            for pins in active_pins.iter_mut() {
                if pins[1].is_some() {
                    pins[1] = None;
                }
            }
        }
        Self {
            state: TrackCircuitState::new(),
            active_pins,
            deadlock: DeadlockTraps::default(),
            deadlock_reference: None,
            signals_passing_routes: Vec::new(),
        }
    }

    pub fn state(&self) -> &TrackCircuitState {
        &self.state
    }

    pub fn active_pins(&self, direction: TrackDirection) -> &PinPair {
        &self.active_pins[direction.index()]
    }

    pub fn deadlock(&self) -> &DeadlockTraps {
        &self.deadlock
    }

    pub fn deadlock_reference(&self) -> Option<DeadlockId> {
        self.deadlock_reference
    }

    pub fn signals_passing_routes(&self) -> &[SignalId] {
        &self.signals_passing_routes
    }
}

impl Interlocking {
    pub(crate) fn check_section(&self, section: SectionId) -> InterlockResult<()> {
        if section.slot() < self.sections.len() {
            Ok(())
        } else {
            Err(InterlockError::UnknownSection { section })
        }
    }

    /// Runtime state of a section.
    pub fn section(&self, section: SectionId) -> Option<&SectionRuntime> {
        self.sections.get(section.slot())
    }

    /// Reservation ledger of a section.
    pub fn circuit_state(&self, section: SectionId) -> Option<&TrackCircuitState> {
        self.section(section).map(|s| &s.state)
    }

    /// Exit currently usable when leaving `section` in `direction`.
    ///
    /// Plain sections use their static link; junctions and crossovers use the
    /// aligned overlay, so an unset switch yields None.
    pub fn aligned_next(&self, section: SectionId, direction: TrackDirection) -> Option<Pin> {
        let static_section = self.graph.section(section)?;
        if !static_section.kind.is_switchable() {
            return static_section.pins[direction.index()][0];
        }
        self.section(section)?.active_pins[direction.index()]
            .iter()
            .flatten()
            .next()
            .copied()
    }

    fn is_stationary(&self, train: TrainId) -> bool {
        self.trains
            .get(train)
            .is_some_and(|t| t.is_stationary(self.config.stationary_speed_mps))
    }

    /// Reserve `section` for `train` as part of `route`.
    ///
    /// Returns false when another train holds the reservation. On success
    /// junction pins are aligned along the route, signals routed through the
    /// junction are reset, non-NORMAL signals on the section are enabled for
    /// the train and any deadlock traps the train carries for this section
    /// are set.
    pub fn reserve_section(
        &mut self,
        section: SectionId,
        train: RoutedTrain,
        route: &TrackRoute,
    ) -> InterlockResult<bool> {
        self.check_section(section)?;
        Ok(self.reserve(section, train, route))
    }

    pub(crate) fn reserve(&mut self, section: SectionId, train: RoutedTrain, route: &TrackRoute) -> bool {
        let slot = section.slot();
        if self.sections[slot].state.occupied_by(train.train) {
            return true;
        }
        if let Err(conflict) = self.sections[slot].state.reserve(train) {
            trace!(
                section = %section,
                train = %train.train,
                holder = %conflict.holder.train,
                "reservation refused"
            );
            return false;
        }

        let index = route.index_of(section, 0);
        let switchable = self
            .graph
            .kind(section)
            .is_some_and(SectionKind::is_switchable);
        if switchable && !self.sections[slot].state.forced() {
            if let Some(index) = index {
                if index > 0 {
                    self.align_switch_pins(section, route[index - 1].section);
                }
                if index + 1 < route.len() {
                    self.align_switch_pins(section, route[index + 1].section);
                }
            }
            let passing = std::mem::take(&mut self.sections[slot].signals_passing_routes);
            for signal in passing {
                self.reset_route(signal, section);
            }
        }

        let Some(index) = index else {
            return true;
        };
        let element = route[index].clone();

        let placed: Vec<SignalId> = self
            .placements
            .all_signals(section, element.direction)
            .collect();
        for signal in placed {
            if let Some(object) = self.signals.get_mut(signal.slot()) {
                if !object.is_normal() {
                    object.enabled_train = Some(train);
                }
            }
        }

        if !self.train_waits_at(train.train, section) {
            self.set_deadlock_trap(train.train, section);
        }

        match self.config.passing_paths {
            PassingPathMode::PathBased => {
                if let Some(alternative) = element.alternative {
                    self.arm_end_section(train.train, alternative.end_section);
                }
            }
            PassingPathMode::LocationBased => {
                let subpath = self.trains.get(train.train).map(|t| t.active_subpath);
                if let (true, Some(area), Some(subpath)) = (
                    element.facing_point,
                    self.sections[slot].deadlock_reference,
                    subpath,
                ) {
                    let end = self
                        .deadlocks
                        .get(area.slot())
                        .and_then(|info| info.committed_end_section(train.train, subpath));
                    if let Some(end) = end {
                        self.arm_end_section(train.train, end);
                    }
                }
            }
        }
        true
    }

    /// Set the traps the train carries for `end`, or wait on an existing trap.
    fn arm_end_section(&mut self, train: TrainId, end: SectionId) {
        let carries = self
            .trains
            .get(train)
            .is_some_and(|t| t.deadlock_info.contains_key(&end));
        if carries {
            if !self.train_waits_at(train, end) {
                self.set_deadlock_trap(train, end);
            }
        } else if let Some(runtime) = self.sections.get_mut(end.slot()) {
            if runtime.deadlock.is_trapped(train) {
                runtime.deadlock.awaited.insert(train);
            }
        }
    }

    fn train_waits_at(&self, train: TrainId, section: SectionId) -> bool {
        self.trains
            .get(train)
            .is_some_and(|t| t.wait_sections.contains(&section))
    }

    /// Queue a claim for `train` on `section`.
    pub fn claim_section(&mut self, section: SectionId, train: RoutedTrain) -> InterlockResult<()> {
        self.check_section(section)?;
        self.sections[section.slot()].state.claim(train);
        if !self.train_waits_at(train.train, section) {
            self.set_deadlock_trap(train.train, section);
        }
        Ok(())
    }

    /// Queue a pre-reservation for `train` on `section`.
    pub fn pre_reserve_section(&mut self, section: SectionId, train: RoutedTrain) -> InterlockResult<()> {
        self.check_section(section)?;
        self.sections[section.slot()].state.pre_reserve(train);
        Ok(())
    }

    /// Release the train's reservation and queued claims on `section`.
    pub fn unreserve_section_train(&mut self, section: SectionId, train: TrainId) -> InterlockResult<bool> {
        self.check_section(section)?;
        Ok(self.sections[section.slot()].state.unreserve_train(train))
    }

    /// Clear the signal lock on `section`.
    pub fn unreserve_section(&mut self, section: SectionId) -> InterlockResult<()> {
        self.check_section(section)?;
        self.sections[section.slot()].state.unreserve();
        Ok(())
    }

    /// Record that `train` now physically occupies `section`.
    pub fn set_occupied(
        &mut self,
        section: SectionId,
        train: RoutedTrain,
        direction: TrackDirection,
    ) -> InterlockResult<()> {
        self.check_section(section)?;
        let state = &mut self.sections[section.slot()].state;
        state.add_occupant(train, direction);
        state.unreserve_train(train.train);
        debug!(section = %section, train = %train.train, ?direction, "section occupied");
        Ok(())
    }

    /// Remove `train` from `section`: occupancy, reservation, claims and traps.
    ///
    /// Leaving the end section of a committed passing path releases the
    /// train's commitment in that deadlock area.
    pub fn remove_train(&mut self, section: SectionId, train: TrainId) -> InterlockResult<()> {
        self.check_section(section)?;
        self.release_section(section, train);
        Ok(())
    }

    pub(crate) fn release_section(&mut self, section: SectionId, train: TrainId) {
        let Some(runtime) = self.sections.get_mut(section.slot()) else {
            return;
        };
        let was_on = runtime.state.remove_occupant(train);
        runtime.state.unreserve_train(train);
        runtime.deadlock.clear(train);
        if was_on {
            for info in self.deadlocks.iter_mut() {
                if info.release_at_end(train, section) {
                    debug!(area = %info.id, train = %train, "passing path released");
                }
            }
        }
    }

    /// Availability test used by partial reservation and node control.
    pub fn is_section_available(&mut self, section: SectionId, train: RoutedTrain) -> bool {
        let Some(runtime) = self.sections.get_mut(section.slot()) else {
            return false;
        };
        let state = &runtime.state;
        if state.occupied_by(train.train) {
            return true;
        }
        if state.has_other_trains(train.train) {
            return false;
        }
        if let Some(holder) = state.reserved() {
            return holder.train == train.train;
        }
        if state.signal_reserved().is_some() {
            return false;
        }
        if let Some(head) = state.claim_head() {
            return head.train == train.train;
        }
        if runtime.deadlock.is_trapped(train.train) {
            runtime.deadlock.awaited.insert(train.train);
            return false;
        }

        let Some(element) = self.trains.get(train.train).and_then(|t| {
            let route = t.route(train.route_index);
            route.index_of(section, 0).map(|i| route[i].clone())
        }) else {
            return true;
        };
        match self.config.passing_paths {
            PassingPathMode::PathBased => match element.alternative {
                Some(alternative) => !self
                    .sections
                    .get(alternative.end_section.slot())
                    .is_some_and(|end| end.deadlock.awaited_by_other(train.train)),
                None => true,
            },
            PassingPathMode::LocationBased => {
                let area = self.section(section).and_then(|s| s.deadlock_reference);
                match (element.facing_point, area) {
                    (true, Some(area)) => !self.available_paths(area, section, train.train).is_empty(),
                    _ => true,
                }
            }
        }
    }

    /// Contribution of one section to a route's block state, folded with
    /// `aggregate`: the result is never better than `aggregate`.
    ///
    /// `train` is the requesting train; `route` is used to check the
    /// alignment of occupied junctions; `signal` is the asking signal, whose
    /// own lock does not count against it.
    pub fn section_state(
        &mut self,
        section: SectionId,
        train: Option<RoutedTrain>,
        direction: TrackDirection,
        aggregate: BlockState,
        route: Option<&TrackRoute>,
        signal: Option<SignalId>,
    ) -> BlockState {
        let Some(static_section) = self.graph.section(section) else {
            return BlockState::Blocked;
        };
        let Some(runtime) = self.sections.get(section.slot()) else {
            return BlockState::Blocked;
        };
        let state = &runtime.state;
        let mut local = BlockState::Reservable;
        let mut set = false;

        let own = train.is_some_and(|t| state.occupied_by(t.train));
        if own {
            local = BlockState::Reserved;
            set = true;
        } else if state
            .occupants()
            .iter()
            .any(|o| o.direction == direction || self.is_stationary(o.train.train))
        {
            local = BlockState::OccupiedSameDirection;
            set = true;
        } else if state.has_trains() {
            local = if train.is_some() {
                BlockState::Open
            } else {
                BlockState::OccupiedOppositeDirection
            };
            set = true;
        }

        if static_section.kind.is_switchable() && state.has_trains() {
            let misaligned = match route {
                None => true,
                Some(route) => switch_misaligned(static_section, &runtime.active_pins, route),
            };
            if misaligned {
                local = BlockState::Blocked;
                set = true;
            }
        }

        if !set {
            if let (Some(holder), Some(train)) = (state.reserved(), train) {
                local = if holder.train == train.train {
                    BlockState::Reserved
                } else {
                    BlockState::ReservedOther
                };
                set = true;
            }
        }

        if let Some(lock) = state.signal_reserved() {
            if Some(lock) != signal {
                local = BlockState::ReservedOther;
                set = true;
            }
        }

        if !set {
            if let (Some(head), Some(train)) = (state.claim_head(), train) {
                if head.train != train.train {
                    local = BlockState::Open;
                    set = true;
                }
            }
        }

        let trapped = train.is_some_and(|t| runtime.deadlock.is_trapped(t.train));

        if let Some(train) = train {
            if self.train_waits_at(train.train, section)
                && (!set || local.is_at_most(BlockState::ReservedOther))
            {
                local = BlockState::ForcedWait;
                if let Some(t) = self.trains.get_mut(train.train) {
                    t.claim_state = false;
                }
            }
            if local != BlockState::ForcedWait && trapped {
                local = BlockState::Blocked;
                self.sections[section.slot()].deadlock.awaited.insert(train.train);
            }
        }

        local.worst(aggregate)
    }

    /// Align the active pins of `section` towards `linked`, and the matching
    /// pin on `linked` back towards `section`.
    pub fn align_switch_pins(&mut self, section: SectionId, linked: SectionId) {
        let Some(static_section) = self.graph.section(section) else {
            return;
        };
        let found = TrackDirection::BOTH
            .iter()
            .find_map(|d| static_section.exit_slot(*d, linked).map(|slot| (*d, slot)));
        let Some((direction, slot)) = found else {
            return;
        };
        let pin = static_section.pins[direction.index()][slot];
        let runtime = &mut self.sections[section.slot()];
        runtime.active_pins[direction.index()] = [None, None];
        runtime.active_pins[direction.index()][slot] = pin;

        if let Some(linked_static) = self.graph.section(linked) {
            for d in TrackDirection::BOTH {
                if let Some(back) = linked_static.exit_slot(d, section) {
                    self.sections[linked.slot()].active_pins[d.index()][back] =
                        linked_static.pins[d.index()][back];
                }
            }
        }
        trace!(section = %section, toward = %linked, "switch aligned");
    }

    /// Unset every switchable end of `section`.
    pub fn dealign_switch_pins(&mut self, section: SectionId) {
        let Some(static_section) = self.graph.section(section) else {
            return;
        };
        for direction in TrackDirection::BOTH {
            let pins = static_section.pins[direction.index()];
            if pins[1].is_none() {
                continue;
            }
            self.sections[section.slot()].active_pins[direction.index()] = [None, None];
            for pin in pins.iter().flatten() {
                if let Some(linked_static) = self.graph.section(pin.link) {
                    let back_direction = pin.direction.reverse();
                    if let Some(back) = linked_static.exit_slot(back_direction, section) {
                        self.sections[pin.link.slot()].active_pins[back_direction.index()][back] = None;
                    }
                }
            }
        }
    }

    /// Dispatcher override: set a junction towards `linked` and mark it forced.
    pub fn force_switch(&mut self, section: SectionId, linked: SectionId) -> InterlockResult<()> {
        self.check_section(section)?;
        self.check_section(linked)?;
        let switchable = self
            .graph
            .kind(section)
            .is_some_and(SectionKind::is_switchable);
        if !switchable {
            return Err(InterlockError::InvalidArg {
                what: format!("section {section} is not a junction or crossover"),
            });
        }
        self.align_switch_pins(section, linked);
        self.sections[section.slot()].state.set_forced(true);
        let passing = std::mem::take(&mut self.sections[section.slot()].signals_passing_routes);
        for signal in passing {
            self.reset_route(signal, section);
        }
        Ok(())
    }

    /// Set the traps `train` carries for `section` on the far end sections.
    pub(crate) fn set_deadlock_trap(&mut self, train: TrainId, section: SectionId) {
        let Some(train_ref) = self.trains.get(train) else {
            return;
        };
        let Some(links) = train_ref.deadlock_info.get(&section) else {
            return;
        };
        let route = train_ref.route(train_ref.route_index);
        let from = train_ref.position.route_index;
        let links: Vec<_> = links
            .iter()
            .filter(|l| route.index_of(l.end_section, from).is_some())
            .copied()
            .collect();
        for link in links {
            let Some(end) = self.sections.get(link.end_section.slot()) else {
                continue;
            };
            let other_set = end.state.is_reserved_by(link.other) || end.state.occupied_by(link.other);
            if other_set {
                break;
            }
            let own_trap = self
                .sections
                .get(section.slot())
                .and_then(|s| s.deadlock.traps.get(&train))
                .is_some_and(|setters| setters.contains(&link.other));
            if own_trap {
                break;
            }
            self.sections[link.end_section.slot()].deadlock.set(train, link.other);
            debug!(section = %link.end_section, train = %train, trapped = %link.other, "deadlock trap set");
        }
    }

    /// Drop every trap `train` set on `section`.
    pub fn clear_deadlock_trap(&mut self, section: SectionId, train: TrainId) -> InterlockResult<()> {
        self.check_section(section)?;
        self.sections[section.slot()].deadlock.clear(train);
        Ok(())
    }

    /// Whether a train other than `train` waits on a trap at `section`.
    pub fn check_deadlock_awaited(&self, section: SectionId, train: TrainId) -> bool {
        self.section(section)
            .is_some_and(|s| s.deadlock.awaited_by_other(train))
    }
}

/// An occupied junction blocks a route when the route's exit is not the
/// aligned one.
fn switch_misaligned(section: &TrackSection, active: &[PinPair; 2], route: &TrackRoute) -> bool {
    let Some(end) = TrackDirection::BOTH
        .into_iter()
        .find(|d| section.pins[d.index()][1].is_some())
    else {
        return false;
    };
    let pins = section.pins[end.index()];
    let wanted = (0..2).find(|slot| {
        pins[*slot].is_some_and(|p| route.contains_section(p.link))
    });
    match wanted {
        None => true,
        Some(slot) => {
            let other = 1 - slot;
            active[end.index()][slot].is_none() && active[end.index()][other].is_some()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traps_clear_only_own_entries() {
        let mut traps = DeadlockTraps::default();
        let a = TrainId::from_index(1);
        let b = TrainId::from_index(2);
        let c = TrainId::from_index(3);
        traps.set(a, b);
        traps.set(c, b);
        assert!(traps.is_trapped(b));
        traps.clear(a);
        assert!(traps.is_trapped(b));
        traps.clear(c);
        assert!(!traps.is_trapped(b));
        assert!(traps.is_empty());
    }

    #[test]
    fn awaited_ignores_self() {
        let mut traps = DeadlockTraps::default();
        let a = TrainId::from_index(1);
        traps.awaited.insert(a);
        assert!(!traps.awaited_by_other(a));
        assert!(traps.awaited_by_other(TrainId::from_index(2)));
    }
}
