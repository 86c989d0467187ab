//! Signal clearance: the request / route check / propagation / reset cycle.
//!
//! A request enables a signal for a train, builds the signal's route from
//! the train's route, derives the block state and reserves or claims what
//! the block state allows. A cleared signal then passes the request on to
//! the next NORMAL signal, bounded by the clear-ahead budget.

use std::collections::BTreeSet;

use sb_core::{SectionId, SignalId, TrainId};
use sb_graph::SectionKind;
use tracing::{debug, trace, warn};

use crate::aspect::{Aspect, SignalFunction};
use crate::block::BlockState;
use crate::error::{InterlockError, InterlockResult};
use crate::extension::SignalEvent;
use crate::interlocking::Interlocking;
use crate::route::{RoutedTrain, TrackRoute};
use crate::signal::{HoldState, Permission, TrainLock};
use crate::train::ControlMode;

/// Where the route of a clearance request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RouteSource {
    /// The requesting train's own route.
    Train,
    /// The signal's fixed route; used when clearing ahead opportunistically.
    Fixed,
}

/// Why building a signal route failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RouteAbort {
    NoNextSection,
    PoolAccess,
    Loop,
}

/// A signal route cut from a longer route.
#[derive(Debug, Clone)]
pub(crate) struct BuiltRoute {
    pub route: TrackRoute,
    /// Index in the source route of the first section beyond the signal.
    pub first_index: usize,
    pub next_signal: Option<SignalId>,
    /// Ends at a signal or at end of track.
    pub full: bool,
}

impl Interlocking {
    /// Ask `signal` to clear for `train`.
    ///
    /// `clear_next` is the remaining clear-ahead budget passed on by a
    /// previous signal (0 for a fresh request). Returns whether the signal
    /// now shows better than STOP.
    pub fn request_clear_signal(
        &mut self,
        signal: SignalId,
        train: RoutedTrain,
        clear_next: i32,
        propagated: bool,
    ) -> InterlockResult<bool> {
        self.check_signal(signal)?;
        self.check_train(train.train)?;
        Ok(self.request_clear(signal, train, RouteSource::Train, clear_next, propagated, None))
    }

    pub(crate) fn request_clear(
        &mut self,
        signal: SignalId,
        train: RoutedTrain,
        source: RouteSource,
        clear_next: i32,
        propagated: bool,
        last_signal: Option<SignalId>,
    ) -> bool {
        let slot = signal.slot();
        let Some(object) = self.signals.get_mut(slot) else {
            return false;
        };
        object.is_propagated = propagated;
        object.propagated = false;

        if let Some(current) = object.enabled_train.filter(|t| t.train != train.train) {
            warn!(
                signal = %object.name,
                enabled = %current.train,
                requesting = %train.train,
                "clear request for a signal enabled for another train"
            );
            self.resolve_double_enable(signal, current, train);
            return false;
        }

        let Some((subpath, position_index, train_route)) = self.trains.get(train.train).map(|t| {
            (
                t.active_subpath,
                t.position.route_index,
                t.route(train.route_index).clone(),
            )
        }) else {
            return false;
        };
        let resume_from = last_signal
            .and_then(|s| self.signals.get(s.slot()))
            .and_then(|s| s.train_route_index);
        let object = &mut self.signals[slot];
        if object.has_lock_for(train.train, subpath) {
            trace!(signal = %object.name, train = %train.train, "signal locked for train");
            return false;
        }
        let new_allocation = object.enabled_train != Some(train);
        if new_allocation {
            object.next_signals = object.default_next.clone();
        }
        object.enabled_train = Some(train);
        object.route.clear();

        let (source_route, start) = match source {
            RouteSource::Train => (train_route.clone(), resume_from.unwrap_or(position_index)),
            RouteSource::Fixed => (object.fixed_route.clone(), 0),
        };

        let built = match self.build_signal_route(signal, &source_route, start, Some(train)) {
            Ok(built) => built,
            Err(abort) => {
                let holds_here = self
                    .trains
                    .get(train.train)
                    .is_some_and(|t| t.holding_signals.contains(&signal));
                let object = &mut self.signals[slot];
                object.enabled_train = None;
                object.route.clear();
                if abort == RouteAbort::NoNextSection
                    && holds_here
                    && object.hold_state == HoldState::None
                {
                    object.hold_state = HoldState::StationStop;
                }
                debug!(signal = %object.name, train = %train.train, ?abort, "signal route not built");
                return false;
            }
        };

        let passed = built.route.iter().any(|e| {
            self.circuit_state(e.section)
                .is_some_and(|s| s.occupied_by(train.train))
        });
        if passed {
            self.signals[slot].clear_enabled();
            trace!(signal = %signal, train = %train.train, "train already past signal");
            return false;
        }

        let train_route_index = match source {
            RouteSource::Train => Some(built.first_index),
            RouteSource::Fixed => built
                .route
                .first()
                .and_then(|e| train_route.index_of(e.section, position_index)),
        };
        let object = &mut self.signals[slot];
        object.train_route_index = train_route_index;
        object.full_route = built.full;
        object.next_signals.set(SignalFunction::Normal, built.next_signal);
        object.route = built.route;
        object.req_clear_ahead = object.required_clear_ahead(clear_next);
        trace!(
            signal = %object.name,
            train = %train.train,
            sections = object.route.len(),
            full = object.full_route,
            clear_ahead = object.req_clear_ahead,
            "signal route built"
        );
        if new_allocation {
            self.notify_extensions(signal, SignalEvent::Enabled(train.train));
        }

        self.check_route_state(signal, propagated);

        let propagate = self
            .signals
            .get(slot)
            .is_some_and(|s| s.enabled_train == Some(train) && !s.propagated);
        if propagate && source == RouteSource::Train {
            self.propagate_request(signal);
        }
        self.signals
            .get(slot)
            .is_some_and(|s| !s.this_sig_mr(SignalFunction::Normal).is_stop())
    }

    /// Two trains asked for the same signal: drop the signal and both trains'
    /// routes ahead, and put both trains on node control.
    fn resolve_double_enable(&mut self, signal: SignalId, current: RoutedTrain, requesting: RoutedTrain) {
        self.reset_signal_chain(signal, true);
        for routed in [requesting, current] {
            let Some((route, from)) = self
                .trains
                .get(routed.train)
                .map(|t| (t.route(routed.route_index).clone(), t.position.route_index))
            else {
                continue;
            };
            self.break_down_route_list(&route, from, routed);
            if let Some(t) = self.trains.get_mut(routed.train) {
                t.switch_to_node_control();
            }
        }
    }

    /// Cut the signal's route out of `source`: from the first exit section
    /// of the signal at or after `start`, up to and including the section
    /// whose end signal protects its exit.
    pub(crate) fn build_signal_route(
        &self,
        signal: SignalId,
        source: &TrackRoute,
        start: usize,
        train: Option<RoutedTrain>,
    ) -> Result<BuiltRoute, RouteAbort> {
        let object = self.signals.get(signal.slot()).ok_or(RouteAbort::NoNextSection)?;
        let section = self
            .graph
            .section(object.section)
            .ok_or(RouteAbort::NoNextSection)?;
        let exits: Vec<SectionId> = section.exits(object.direction).map(|p| p.link).collect();
        let first_index = source
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, e)| exits.contains(&e.section))
            .map(|(i, _)| i)
            .ok_or(RouteAbort::NoNextSection)?;

        let pool = train
            .and_then(|t| self.trains.get(t.train))
            .map(|t| &t.pool_access);
        let mut route = TrackRoute::new();
        let mut seen = BTreeSet::new();
        let mut next_signal = None;
        for element in source.iter().skip(first_index) {
            if !seen.insert(element.section) {
                return Err(RouteAbort::Loop);
            }
            if pool.is_some_and(|p| p.contains(&element.section)) {
                return Err(RouteAbort::PoolAccess);
            }
            route.push(element.clone());
            if let Some(end) = self.placements.end_signal(element.section, element.direction) {
                next_signal = Some(end);
                break;
            }
        }
        let at_end_of_track = route
            .last()
            .and_then(|e| self.graph.kind(e.section))
            == Some(SectionKind::EndOfTrack);
        Ok(BuiltRoute {
            full: next_signal.is_some() || at_end_of_track,
            route,
            first_index,
            next_signal,
        })
    }

    /// Rebuild an enabled signal's route after its train's route changed.
    pub(crate) fn rebuild_signal_route(&mut self, signal: SignalId) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return;
        };
        let Some(train) = object.enabled_train else {
            return;
        };
        let Some(t) = self.trains.get(train.train) else {
            return;
        };
        let start = object.train_route_index.unwrap_or(t.position.route_index);
        let source = t.route(train.route_index).clone();
        if let Ok(built) = self.build_signal_route(signal, &source, start, Some(train)) {
            let object = &mut self.signals[signal.slot()];
            object.train_route_index = Some(built.first_index);
            object.full_route = built.full;
            object.next_signals.set(SignalFunction::Normal, built.next_signal);
            object.route = built.route;
        }
    }

    /// Re-derive block state, aspect, permission and reservations of a
    /// signal's route.
    pub(crate) fn check_route_state(&mut self, signal: SignalId, is_propagated: bool) {
        let slot = signal.slot();
        let Some(object) = self.signals.get(slot) else {
            return;
        };
        let train = object.enabled_train;
        let holds_here = train
            .and_then(|t| self.trains.get(t.train))
            .is_some_and(|t| t.holding_signals.contains(&signal));

        let object = &mut self.signals[slot];
        let mut held = object.hold_state.is_stop_hold();
        if holds_here && matches!(object.hold_state, HoldState::None | HoldState::StationStop) {
            object.hold_state = HoldState::StationStop;
            object.station_hold = true;
            held = true;
        } else if object.hold_state == HoldState::StationStop && !holds_here {
            object.hold_state = HoldState::None;
            object.station_hold = false;
            held = false;
        }

        let mut is_propagated = is_propagated;
        if let Some(t) = train {
            let route = object.route.clone();
            for element in &route {
                let Some(state) = self.circuit_state(element.section) else {
                    continue;
                };
                if state.occupied_by(t.train) {
                    self.state_update(signal);
                    return;
                }
                if state.forced() {
                    self.sections[element.section.slot()].state.set_forced(false);
                    if let Some(train) = self.trains.get_mut(t.train) {
                        train.reroute_requests.push(element.section);
                    }
                    debug!(signal = %signal, section = %element.section, "forced section on route, reroute requested");
                    break;
                }
            }
            let first = self
                .trains
                .get(t.train)
                .and_then(|train| train.next_signal[t.route_index.min(1)]);
            if first == Some(signal) {
                is_propagated = false;
            }
        }

        if held {
            self.signals[slot].block_state = BlockState::Blocked;
        } else {
            let object = &self.signals[slot];
            let (full, part_allowed, has_route) =
                (object.full_route, object.allow_part_route, !object.route.is_empty());
            if full {
                self.route_block_state(signal);
            } else if let Some(t) = train {
                if (!is_propagated || part_allowed) && has_route {
                    self.part_block_state(signal);
                } else if is_propagated && self.double_hold_behind(signal, t) {
                    self.part_block_state(signal);
                }
            }
        }

        self.state_update(signal);

        let manual = train
            .and_then(|t| self.trains.get(t.train))
            .is_some_and(|t| t.control_mode == ControlMode::Manual);
        let object = &mut self.signals[slot];
        let lr = object.this_sig_lr(SignalFunction::Normal);
        let state = object.block_state;
        let before = object.permission;
        if object.permission == Permission::Requested {
            object.permission = if state == BlockState::OccupiedSameDirection && !is_propagated {
                Permission::Granted
            } else if manual && lr.is_stop() && state.is_at_most(BlockState::OccupiedSameDirection) {
                Permission::Granted
            } else {
                Permission::Denied
            };
            debug!(signal = %object.name, permission = ?object.permission, "permission decided");
        }
        if before != Permission::Granted && object.permission == Permission::Granted {
            self.state_update(signal);
        }

        if let Some(t) = train {
            self.reserve_route(signal, t);
        }
    }

    /// The train's first signal ahead routes to `signal`, is clear, but
    /// still shows STOP.
    fn double_hold_behind(&self, signal: SignalId, train: RoutedTrain) -> bool {
        let first = self
            .trains
            .get(train.train)
            .and_then(|t| t.next_signal[train.route_index.min(1)])
            .and_then(|s| self.signals.get(s.slot()));
        first.is_some_and(|f| {
            f.next_signals.get(SignalFunction::Normal) == Some(signal)
                && f.block_state.is_clear()
                && f.this_sig_lr(SignalFunction::Normal).is_stop()
        })
    }

    /// Reserve, pre-reserve or claim the sections of an enabled signal's
    /// route according to its block state.
    fn reserve_route(&mut self, signal: SignalId, train: RoutedTrain) {
        let slot = signal.slot();
        let object = &self.signals[slot];
        let state = object.block_state;
        let route = object.route.clone();
        let lr = object.this_sig_lr(SignalFunction::Normal);
        let granted = object.permission == Permission::Granted;
        let approach_set = object.approach_control_set;
        let claim_locked = object.claim_locked;
        let direction = train.route_index.min(1);

        if state == BlockState::Reservable && !approach_set {
            let mut all = true;
            for element in &route {
                let held_by_other = self.circuit_state(element.section).is_some_and(|s| {
                    (s.reserved().is_some() || s.has_trains())
                        && s.reserved().map(|r| r.train) != Some(train.train)
                });
                if held_by_other || !self.reserve(element.section, train, &route) {
                    all = false;
                    break;
                }
                if let Some(t) = self.trains.get_mut(train.train) {
                    t.last_reserved[direction] = Some(element.section);
                }
            }
            self.signals[slot].block_state = if all {
                BlockState::Reserved
            } else {
                BlockState::Reservable
            };
            if let Some(t) = self.trains.get_mut(train.train) {
                t.claim_state = false;
            }
            trace!(signal = %signal, train = %train.train, reserved = all, "full route reservation");
        } else if (!lr.is_stop() || granted)
            && state != BlockState::Reserved
            && state.is_worse_than(BlockState::Reserved)
            && BlockState::ReservedOther.is_worse_than(state)
        {
            let mut available = 0;
            for element in &route {
                if !self.is_section_available(element.section, train) {
                    break;
                }
                let unreserved = self
                    .circuit_state(element.section)
                    .is_some_and(|s| s.reserved().is_none());
                if unreserved {
                    self.reserve(element.section, train, &route);
                }
                if let Some(t) = self.trains.get_mut(train.train) {
                    t.last_reserved[direction] = Some(element.section);
                }
                available += 1;
            }
            for element in route.iter().skip(available) {
                if self.unresolved_deadlock_area(element.section, train) {
                    break;
                }
                self.sections[element.section.slot()].state.pre_reserve(train);
            }
            if let Some(t) = self.trains.get_mut(train.train) {
                t.claim_state = false;
            }
            trace!(signal = %signal, train = %train.train, available, "partial route reservation");
        } else {
            let claiming = self.trains.get(train.train).is_some_and(|t| {
                t.claim_state && t.next_signal[0] == Some(signal)
            });
            if !claiming || state == BlockState::Reserved {
                return;
            }
            for element in &route {
                let Some(runtime) = self.sections.get(element.section.slot()) else {
                    break;
                };
                if runtime.deadlock_reference.is_some() {
                    break;
                }
                if runtime.state.reserved().map(|r| r.train) == Some(train.train) {
                    continue;
                }
                if runtime.deadlock.is_trapped(train.train) {
                    if let Some(t) = self.trains.get_mut(train.train) {
                        t.claim_state = false;
                    }
                    break;
                }
                if !claim_locked {
                    self.sections[element.section.slot()].state.claim(train);
                    self.set_deadlock_trap(train.train, element.section);
                }
            }
        }
    }

    /// Section starts a passing area where the train has no path yet.
    fn unresolved_deadlock_area(&self, section: SectionId, train: RoutedTrain) -> bool {
        let Some(area) = self.section(section).and_then(|s| s.deadlock_reference) else {
            return false;
        };
        let subpath = self
            .trains
            .get(train.train)
            .map(|t| t.active_subpath)
            .unwrap_or(0);
        self.deadlocks
            .get(area.slot())
            .is_none_or(|info| info.assignment(train.train, subpath).is_none())
    }

    /// Pass a cleared signal's request on to the next NORMAL signal, then
    /// clear idle fixed-route signals further ahead.
    pub(crate) fn propagate_request(&mut self, signal: SignalId) {
        let slot = signal.slot();
        let Some(object) = self.signals.get(slot) else {
            return;
        };
        let Some(train) = object.enabled_train else {
            return;
        };
        let explorer = self
            .trains
            .get(train.train)
            .is_none_or(|t| t.control_mode == ControlMode::Explorer);
        if explorer {
            return;
        }
        let state = object.block_state;
        if state.is_worse_than(BlockState::Reservable) {
            return;
        }
        if !object.force_propagation
            && !object.force_prop_on_approach_control
            && state.is_worse_than(BlockState::Reserved)
        {
            return;
        }

        let object = &mut self.signals[slot];
        if !object.is_propagated
            && object.clear_ahead_msts <= -2
            && object.clear_ahead_active != object.clear_ahead_orts
        {
            object.req_clear_ahead = match object.clear_ahead_active {
                0 => 0,
                active if active > 0 => active - 1,
                _ => 1,
            };
        }
        let valid = if object.approach_control_set && object.force_prop_on_approach_control {
            state.is_clear()
        } else {
            state.is_at_most(BlockState::Reserved)
        };
        let propagate_state =
            !(valid && object.is_normal() && object.this_sig_lr(SignalFunction::Normal).is_stop());
        let next = object.next_signals.get(SignalFunction::Normal);
        let budget = object.req_clear_ahead;
        let approach_ok = !object.approach_control_set || object.force_prop_on_approach_control;

        if let Some(next) = next {
            if (budget > 0 || object.force_propagation) && valid && approach_ok {
                object.propagated = true;
                object.force_propagation = false;
                if self.propagation_depth >= self.signals.len() {
                    warn!(signal = %signal, "propagation depth limit reached");
                } else {
                    self.propagation_depth += 1;
                    trace!(from = %signal, to = %next, budget, "propagating clear request");
                    self.request_clear(next, train, RouteSource::Train, budget, propagate_state, Some(signal));
                    self.propagation_depth -= 1;
                }
            }
            self.clear_fixed_routes_ahead(next, train, budget);
        }
    }

    /// Clear idle signals ahead whose fixed route lies on the train's route
    /// and which already show at least APPROACH_1.
    fn clear_fixed_routes_ahead(&mut self, next: SignalId, train: RoutedTrain, budget: i32) {
        let Some(train_route) = self
            .trains
            .get(train.train)
            .map(|t| t.route(train.route_index).clone())
        else {
            return;
        };
        let eligible = |il: &Interlocking, s: SignalId| {
            il.signals.get(s.slot()).is_some_and(|o| {
                o.this_sig_lr(SignalFunction::Normal).is_at_least(Aspect::Approach1)
                    && o.has_fixed_route
                    && !o.is_enabled()
                    && o.fixed_route.first().is_some_and(|e| train_route.contains_section(e.section))
                    && o.fixed_route.last().is_some_and(|e| train_route.contains_section(e.section))
            })
        };
        if !eligible(self, next) {
            return;
        }
        self.request_clear(next, train, RouteSource::Fixed, 0, true, None);

        let mut remaining = budget - 1;
        let mut further = self.next_sig_id(next, SignalFunction::Normal);
        let mut steps = 0;
        while let Some(s) = further {
            steps += 1;
            if steps > self.signals.len() || !eligible(self, s) {
                break;
            }
            self.request_clear(s, train, RouteSource::Fixed, 0, true, None);
            let object = &mut self.signals[s.slot()];
            object.is_propagated = true;
            remaining = (remaining - 1).max(0);
            object.req_clear_ahead = remaining;
            further = object.next_signals.get(SignalFunction::Normal);
        }
    }

    /// Reset a signal, and with `propagate` every following signal enabled
    /// for the same train, releasing every section their routes hold.
    pub fn reset_signal(&mut self, signal: SignalId, propagate: bool) -> InterlockResult<()> {
        self.check_signal(signal)?;
        self.reset_signal_chain(signal, propagate);
        Ok(())
    }

    pub(crate) fn reset_signal_chain(&mut self, signal: SignalId, propagate: bool) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return;
        };
        let train = object.enabled_train;
        let mut chain = vec![signal];
        if let (true, Some(t)) = (propagate, train) {
            let mut current = object.next_signals.get(SignalFunction::Normal);
            while let Some(s) = current {
                let Some(next) = self.signals.get(s.slot()) else {
                    break;
                };
                if chain.contains(&s) || next.enabled_train != Some(t) {
                    break;
                }
                chain.push(s);
                current = next.next_signals.get(SignalFunction::Normal);
            }
        }

        for s in chain.iter().rev().copied() {
            let sections: Vec<SectionId> = self.signals[s.slot()].route.sections().collect();
            for section in sections.into_iter().rev() {
                match train {
                    Some(t) => self.release_section(section, t.train),
                    None => self.sections[section.slot()].state.unreserve(),
                }
            }
            self.signals[s.slot()].clear_enabled();
            self.notify_extensions(s, SignalEvent::Reset);
            self.state_update(s);
        }
        debug!(signal = %signal, chain = chain.len(), "signal reset");
    }

    /// The enabled train has passed the signal.
    ///
    /// The signal returns to idle without releasing anything the train still
    /// holds ahead, and is re-registered on the junctions of its idle route.
    pub fn signal_passed(&mut self, signal: SignalId) -> InterlockResult<()> {
        self.check_signal(signal)?;
        self.deregister_junctions(signal, None);
        self.signals[signal.slot()].clear_enabled();
        self.refresh_idle_route(signal);
        self.state_update(signal);
        trace!(signal = %signal, "signal passed");
        Ok(())
    }

    fn deregister_junctions(&mut self, signal: SignalId, keep: Option<SectionId>) {
        let junctions = std::mem::take(&mut self.signals[signal.slot()].junctions_passed);
        for junction in junctions {
            if Some(junction) == keep {
                continue;
            }
            if let Some(runtime) = self.sections.get_mut(junction.slot()) {
                runtime.signals_passing_routes.retain(|s| *s != signal);
            }
        }
    }

    /// Follow the current alignment to the next NORMAL signal and register
    /// on the junctions passed.
    fn refresh_idle_route(&mut self, signal: SignalId) {
        let walk = self.walk_to_signal(signal, SignalFunction::Normal);
        self.signals[signal.slot()]
            .next_signals
            .set(SignalFunction::Normal, walk.found);
        self.register_junctions(signal, &walk.junctions);
    }

    /// A junction the signal routes through has been set differently.
    pub(crate) fn reset_route(&mut self, signal: SignalId, junction: SectionId) {
        if signal.slot() >= self.signals.len() {
            return;
        }
        self.deregister_junctions(signal, Some(junction));
        let object = &mut self.signals[signal.slot()];
        object.next_signals = object.default_next.clone();
        if object.is_enabled() {
            let end = object
                .route
                .last()
                .and_then(|e| self.placements.end_signal(e.section, e.direction));
            match end {
                Some(end) => object.next_signals.set(SignalFunction::Normal, Some(end)),
                None if object.next_signals.get(SignalFunction::Normal).is_none() => {
                    let found = self.walk_to_signal(signal, SignalFunction::Normal).found;
                    self.signals[signal.slot()]
                        .next_signals
                        .set(SignalFunction::Normal, found);
                }
                None => {}
            }
        } else {
            self.refresh_idle_route(signal);
        }
        trace!(signal = %signal, junction = %junction, "signal route reset on junction change");
    }

    /// Per-tick evaluation of one signal.
    pub(crate) fn update_signal(&mut self, signal: SignalId) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return;
        };
        if !object.is_normal() {
            self.not_routed_block_state(signal);
            self.state_update(signal);
            return;
        }
        let state = object.block_state;
        if object.is_enabled() {
            if state != BlockState::Reserved {
                self.check_route_state(signal, object.is_propagated);
            } else {
                self.state_update(signal);
            }
            let pending = self
                .signals
                .get(signal.slot())
                .is_some_and(|s| s.is_enabled() && !s.propagated);
            if pending {
                self.propagate_request(signal);
            }
        } else if object.has_fixed_route && state != BlockState::Reserved {
            self.check_route_state(signal, true);
        } else {
            self.state_update(signal);
        }
    }

    /// Dispatcher or timetable hold.
    pub fn request_hold(&mut self, signal: SignalId, hold: HoldState) -> InterlockResult<()> {
        self.check_signal(signal)?;
        let object = &mut self.signals[signal.slot()];
        object.hold_state = hold;
        object.station_hold = hold == HoldState::StationStop;
        if hold.is_stop_hold() {
            object.block_state = BlockState::Blocked;
        }
        debug!(signal = %object.name, ?hold, "hold set");
        self.notify_extensions(signal, SignalEvent::HoldChanged(hold));
        self.state_update(signal);
        Ok(())
    }

    pub fn clear_hold(&mut self, signal: SignalId) -> InterlockResult<()> {
        self.check_signal(signal)?;
        let object = &mut self.signals[signal.slot()];
        object.hold_state = HoldState::None;
        object.station_hold = false;
        let propagated = object.is_propagated;
        let enabled = object.is_enabled();
        self.notify_extensions(signal, SignalEvent::HoldChanged(HoldState::None));
        if enabled {
            self.check_route_state(signal, propagated);
        } else {
            self.update_signal(signal);
        }
        Ok(())
    }

    /// Keep the signal at STOP for one train on one subpath.
    pub fn lock_for_train(&mut self, signal: SignalId, train: TrainId, subpath: u32) -> InterlockResult<()> {
        self.check_signal(signal)?;
        let lock = TrainLock { train, subpath };
        let object = &mut self.signals[signal.slot()];
        if !object.locks.contains(&lock) {
            object.locks.push(lock);
        }
        Ok(())
    }

    pub fn unlock_for_train(&mut self, signal: SignalId, train: TrainId, subpath: u32) -> InterlockResult<bool> {
        self.check_signal(signal)?;
        let object = &mut self.signals[signal.slot()];
        let before = object.locks.len();
        object.locks.retain(|l| *l != TrainLock { train, subpath });
        Ok(before != object.locks.len())
    }

    /// The enabled train asks to pass the signal at its most restrictive
    /// aspect. Decided on the next route check, which runs immediately.
    pub fn request_permission(&mut self, signal: SignalId) -> InterlockResult<Permission> {
        self.check_signal(signal)?;
        let object = &mut self.signals[signal.slot()];
        if !object.is_enabled() {
            return Err(InterlockError::InvalidArg {
                what: format!("signal '{}' is not enabled for a train", object.name),
            });
        }
        object.permission = Permission::Requested;
        let propagated = object.is_propagated;
        self.notify_extensions(signal, SignalEvent::PermissionRequested);
        self.check_route_state(signal, propagated);
        Ok(self.signals[signal.slot()].permission)
    }

    /// Allow the enabled train to be called on past the signal.
    pub fn allow_call_on(&mut self, signal: SignalId) -> InterlockResult<()> {
        self.check_signal(signal)?;
        self.signals[signal.slot()].call_on_manually_allowed = true;
        Ok(())
    }

    /// Override the active clear-ahead count, including this signal.
    pub fn set_clear_ahead(&mut self, signal: SignalId, count: i32) -> InterlockResult<()> {
        self.check_signal(signal)?;
        if count < -1 {
            return Err(InterlockError::InvalidArg {
                what: format!("clear-ahead count {count} below -1"),
            });
        }
        self.signals[signal.slot()].clear_ahead_active = count;
        Ok(())
    }

    pub fn reset_clear_ahead(&mut self, signal: SignalId) -> InterlockResult<()> {
        self.check_signal(signal)?;
        let object = &mut self.signals[signal.slot()];
        object.clear_ahead_active = object.clear_ahead_orts;
        Ok(())
    }
}
