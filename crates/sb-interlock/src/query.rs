//! Side-effect-free lookups across the signal graph.
//!
//! These back both the built-in head rule and the extension handle. A
//! missing signal yields `None` or the most restrictive aspect.

use std::collections::BTreeSet;

use sb_core::{Length, SectionId, SignalId, TrainId, Velocity, m, meters, meters_per_second};
use sb_graph::{SectionKind, TrackDirection};

use crate::aspect::{Aspect, SignalFunction};
use crate::block::{BlockState, SignalBlockState};
use crate::interlocking::Interlocking;
use crate::route::{RouteElement, TrackRoute};

/// Why a walk along the aligned track stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkEnd {
    Signal,
    EndOfTrack,
    UnsetSwitch,
    Loop,
    Limit,
}

/// Result of walking from a signal to the next signal of a function.
#[derive(Debug, Clone)]
pub(crate) struct SignalWalk {
    pub found: Option<SignalId>,
    pub route: TrackRoute,
    pub junctions: Vec<SectionId>,
    pub end: WalkEnd,
}

impl Interlocking {
    /// Walk the currently aligned track ahead of `signal` to the next signal
    /// carrying `function`.
    ///
    /// Searches for other functions stop at the next NORMAL signal.
    pub(crate) fn walk_to_signal(&self, signal: SignalId, function: SignalFunction) -> SignalWalk {
        let Some(object) = self.signals.get(signal.slot()) else {
            return SignalWalk {
                found: None,
                route: TrackRoute::new(),
                junctions: Vec::new(),
                end: WalkEnd::EndOfTrack,
            };
        };
        let own_offset = meters(object.offset);
        let ahead_on_own = self
            .placements
            .signals(object.section, object.direction, function)
            .iter()
            .find(|p| p.signal != signal && meters(p.offset) >= own_offset)
            .map(|p| p.signal);
        if ahead_on_own.is_some() {
            return SignalWalk {
                found: ahead_on_own,
                route: TrackRoute::new(),
                junctions: Vec::new(),
                end: WalkEnd::Signal,
            };
        }
        if !function.is_normal() && !object.is_normal() {
            if let Some(end) = self.placements.end_signal(object.section, object.direction) {
                if end != signal {
                    return SignalWalk {
                        found: None,
                        route: TrackRoute::new(),
                        junctions: Vec::new(),
                        end: WalkEnd::Signal,
                    };
                }
            }
        }
        self.walk_from(object.section, object.direction, function)
    }

    /// Walk onwards from the exit of `section` in `direction`.
    fn walk_from(&self, section: SectionId, direction: TrackDirection, function: SignalFunction) -> SignalWalk {
        let mut walk = SignalWalk {
            found: None,
            route: TrackRoute::new(),
            junctions: Vec::new(),
            end: WalkEnd::EndOfTrack,
        };
        let mut seen = BTreeSet::new();
        let (mut current, mut dir) = (section, direction);
        loop {
            let Some(pin) = self.aligned_next(current, dir) else {
                let has_exits = self
                    .graph
                    .section(current)
                    .is_some_and(|s| s.exit_count(dir) > 0);
                walk.end = if has_exits { WalkEnd::UnsetSwitch } else { WalkEnd::EndOfTrack };
                return walk;
            };
            if !seen.insert(pin.link) {
                walk.end = WalkEnd::Loop;
                return walk;
            }
            if walk.route.len() >= self.config.max_walk_sections {
                walk.end = WalkEnd::Limit;
                return walk;
            }
            let Some(next) = self.graph.section(pin.link) else {
                return walk;
            };
            walk.route.push(RouteElement::new(pin.link, pin.direction));
            if next.kind.is_switchable() {
                walk.junctions.push(pin.link);
            }
            let found = self
                .placements
                .signals(pin.link, pin.direction, function)
                .first()
                .map(|p| p.signal);
            if found.is_some() {
                walk.found = found;
                walk.end = WalkEnd::Signal;
                return walk;
            }
            if self.placements.end_signal(pin.link, pin.direction).is_some() {
                walk.end = WalkEnd::Signal;
                return walk;
            }
            if next.kind == SectionKind::EndOfTrack {
                walk.end = WalkEnd::EndOfTrack;
                return walk;
            }
            current = pin.link;
            dir = pin.direction;
        }
    }

    pub fn next_sig_id(&self, signal: SignalId, function: SignalFunction) -> Option<SignalId> {
        self.signals.get(signal.slot())?.next_signals.get(function)
    }

    /// The `n`th signal of `function` ahead; `n` = 1 is the next one.
    pub fn next_nsig_id(&self, signal: SignalId, function: SignalFunction, n: usize) -> Option<SignalId> {
        let mut current = signal;
        for _ in 0..n.max(1) {
            current = self.next_sig_id(current, function)?;
            if current == signal {
                return None;
            }
        }
        Some(current)
    }

    pub fn next_sig_mr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.next_sig_id(signal, function)
            .map_or(Aspect::Stop, |s| self.id_sig_mr(s, function))
    }

    pub fn next_sig_lr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.next_sig_id(signal, function)
            .map_or(Aspect::Stop, |s| self.id_sig_lr(s, function))
    }

    pub fn next_nsig_lr(&self, signal: SignalId, function: SignalFunction, n: usize) -> Aspect {
        self.next_nsig_id(signal, function, n)
            .map_or(Aspect::Stop, |s| self.id_sig_lr(s, function))
    }

    /// Nearest signal of `function` facing the other way, found by walking
    /// back from the signal's own section.
    pub fn opp_sig_id(&self, signal: SignalId, function: SignalFunction) -> Option<SignalId> {
        let object = self.signals.get(signal.slot())?;
        let back = object.direction.reverse();
        let on_own = self
            .placements
            .signals(object.section, back, function)
            .first()
            .map(|p| p.signal);
        if on_own.is_some() {
            return on_own;
        }
        self.walk_from(object.section, back, function).found
    }

    pub fn opp_sig_mr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.opp_sig_id(signal, function)
            .map_or(Aspect::Stop, |s| self.id_sig_mr(s, function))
    }

    pub fn opp_sig_lr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.opp_sig_id(signal, function)
            .map_or(Aspect::Stop, |s| self.id_sig_lr(s, function))
    }

    pub fn id_sig_mr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.signals
            .get(signal.slot())
            .map_or(Aspect::Stop, |s| s.this_sig_mr(function))
    }

    pub fn id_sig_lr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.signals
            .get(signal.slot())
            .map_or(Aspect::Stop, |s| s.this_sig_lr(function))
    }

    pub fn id_sig_enabled(&self, signal: SignalId) -> bool {
        self.signals
            .get(signal.slot())
            .is_some_and(|s| s.is_enabled())
    }

    /// Displayed aspect of a signal.
    pub fn id_sig_aspect(&self, signal: SignalId) -> Option<Aspect> {
        self.signals.get(signal.slot()).map(|s| s.displayed_aspect())
    }

    /// Most restrictive `from` aspect over the signals ahead, up to and
    /// including the first one that also carries `to`. STOP when no such
    /// signal is found.
    pub fn dist_multi_sig_mr(&self, signal: SignalId, from: SignalFunction, to: SignalFunction) -> Aspect {
        let mut result = Aspect::Clear2;
        let mut current = self.next_sig_id(signal, from);
        let mut steps = 0;
        while let Some(id) = current {
            let Some(object) = self.signals.get(id.slot()) else {
                break;
            };
            result = result.most_restrictive(object.this_sig_mr(from));
            if object.has_function(to) {
                return result;
            }
            steps += 1;
            if steps > self.signals.len() {
                break;
            }
            current = object.next_signals.get(from);
        }
        Aspect::Stop
    }

    /// Local variable of the next signal of `function`; 0 when there is none.
    pub fn next_sig_lvar(&self, signal: SignalId, function: SignalFunction, key: i32) -> i32 {
        self.next_sig_id(signal, function)
            .and_then(|s| self.signals.get(s.slot()))
            .map_or(0, |s| s.local_var(key))
    }

    /// Whether the route from `signal` up to `other` is cleared for the
    /// train `signal` is enabled for.
    pub fn route_cleared_to_signal(&self, signal: SignalId, other: SignalId, allow_call_on: bool) -> SignalBlockState {
        let Some(object) = self.signals.get(signal.slot()) else {
            return SignalBlockState::Obstructed;
        };
        let Some(train) = object.enabled_train else {
            return SignalBlockState::Obstructed;
        };
        let mut worst = object.block_state;
        let mut current = signal;
        let mut steps = 0;
        while current != other {
            let Some(next) = self.next_sig_id(current, SignalFunction::Normal) else {
                return SignalBlockState::Obstructed;
            };
            steps += 1;
            if steps > self.signals.len() {
                return SignalBlockState::Obstructed;
            }
            if next == other {
                break;
            }
            let Some(next_object) = self.signals.get(next.slot()) else {
                return SignalBlockState::Obstructed;
            };
            if next_object.enabled_train != Some(train) {
                return SignalBlockState::Obstructed;
            }
            worst = worst.worst(next_object.block_state);
            current = next;
        }
        match worst {
            w if w.is_clear() => SignalBlockState::Clear,
            BlockState::OccupiedSameDirection if allow_call_on => SignalBlockState::Occupied,
            _ => SignalBlockState::Obstructed,
        }
    }

    /// The enabled train may be called on past the signal.
    pub fn train_has_call_on(&self, signal: SignalId) -> bool {
        self.signals
            .get(signal.slot())
            .is_some_and(|s| s.is_enabled() && s.call_on_manually_allowed)
    }

    /// Distance along the train's route from its front to `signal`, if the
    /// signal lies on the route ahead.
    pub fn distance_to_signal(&self, train: TrainId, signal: SignalId) -> Option<Length> {
        let t = self.trains.get(train)?;
        let object = self.signals.get(signal.slot())?;
        let route = t.route(t.route_index);
        let position = t.position;
        if position.section == object.section && position.direction == object.direction {
            let d = meters(object.offset) - meters(position.offset);
            return (d >= 0.0).then(|| m(d));
        }
        let here = self.graph.length(position.section)?;
        let mut distance = meters(here) - meters(position.offset);
        for element in route.iter().skip(position.route_index + 1) {
            if element.section == object.section && element.direction == object.direction {
                return Some(m(distance + meters(object.offset)));
            }
            distance += meters(self.graph.length(element.section)?);
        }
        None
    }

    /// Approach control test: the enabled train is within `distance` of the
    /// signal and, if given, no faster than `speed`.
    pub(crate) fn approach_control_met(
        &self,
        signal: SignalId,
        distance: Length,
        speed: Option<Velocity>,
    ) -> bool {
        let Some(train) = self.signals.get(signal.slot()).and_then(|s| s.enabled_train) else {
            return false;
        };
        let Some(to_signal) = self.distance_to_signal(train.train, signal) else {
            return false;
        };
        if meters(to_signal) > meters(distance) {
            return false;
        }
        match (speed, self.trains.get(train.train)) {
            (Some(limit), Some(t)) => {
                meters_per_second(t.speed).abs() <= meters_per_second(limit)
            }
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}
