//! Block state of a signal's route, including passing-path selection.

use sb_core::{DeadlockId, SectionId, SignalId, meters};
use sb_graph::SectionKind;
use tracing::{debug, trace};

use crate::block::BlockState;
use crate::config::PassingPathMode;
use crate::interlocking::Interlocking;
use crate::route::{RouteElement, RoutedTrain, TrackRoute};
use crate::signal::Permission;

impl Interlocking {
    /// Fold section states over `route[start..]` into `aggregate`, stopping
    /// after the first section worse than `limit`. Returns the folded state
    /// and the index of the last section looked at.
    fn fold_route(
        &mut self,
        route: &TrackRoute,
        train: Option<RoutedTrain>,
        signal: SignalId,
        start: usize,
        limit: BlockState,
        aggregate: BlockState,
    ) -> (BlockState, Option<usize>) {
        let mut state = aggregate;
        let mut last = None;
        for (index, element) in route.iter().enumerate().skip(start) {
            last = Some(index);
            state = self.section_state(element.section, train, element.direction, state, Some(route), Some(signal));
            if state.is_worse_than(limit) {
                break;
            }
        }
        (state, last)
    }

    /// Block state of a signal with a complete route.
    pub(crate) fn route_block_state(&mut self, signal: SignalId) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return;
        };
        let state = match object.enabled_train {
            None => {
                if !object.has_fixed_route {
                    return;
                }
                let route = object.fixed_route.clone();
                self.fold_route(&route, None, signal, 0, BlockState::Reservable, BlockState::Reserved)
                    .0
            }
            Some(train) => match self.config.passing_paths {
                PassingPathMode::PathBased => self.path_based_block_state(signal, train),
                PassingPathMode::LocationBased => self.location_based_block_state(signal, train),
            },
        };
        self.signals[signal.slot()].block_state = state;
    }

    fn path_based_block_state(&mut self, signal: SignalId, train: RoutedTrain) -> BlockState {
        let route = self.signals[signal.slot()].route.clone();
        let mut state = BlockState::Reserved;
        let mut last = 0;
        for (index, element) in route.iter().enumerate() {
            last = index;
            state = self.section_state(element.section, Some(train), element.direction, state, Some(&route), Some(signal));
            if state.is_worse_than(BlockState::Reservable) {
                break;
            }
            if let Some(alternative) = element.alternative {
                if self.check_deadlock_awaited(alternative.end_section, train.train) {
                    state = BlockState::Blocked;
                    break;
                }
            }
        }

        let Some((train_route, position_index)) = self
            .trains
            .get(train.train)
            .map(|t| (t.route(train.route_index).clone(), t.position.route_index))
        else {
            return state;
        };
        let marked = route
            .iter()
            .take(last + 1)
            .rev()
            .find_map(|e| e.alternative.map(|alt| (e.section, alt)));
        let Some((start_section, alternative)) = marked else {
            return state;
        };
        let Some(start_index) = train_route
            .index_of(start_section, position_index)
            .filter(|i| *i > 0)
        else {
            return state;
        };

        if state.is_worse_than(BlockState::Reservable) {
            if self.check_deadlock_awaited(alternative.end_section, train.train) {
                return state;
            }
            if let Some(new_state) = self.alternative_block_state(signal, train, alternative.path) {
                self.set_alternative_route(signal, train, start_index, alternative.path);
                return new_state;
            }
        } else {
            let trapped_end = self
                .section(alternative.end_section)
                .is_some_and(|s| s.deadlock.traps.contains_key(&train.train));
            let reserved_start = self
                .circuit_state(start_section)
                .is_some_and(|s| s.is_reserved_by(train.train));
            if trapped_end
                && !self.check_deadlock_awaited(alternative.end_section, train.train)
                && !reserved_start
            {
                if let Some(new_state) = self.alternative_block_state(signal, train, alternative.path) {
                    self.set_alternative_route(signal, train, start_index, alternative.path);
                    if let Some(end) = self.sections.get_mut(alternative.end_section.slot()) {
                        end.deadlock.awaited.insert(train.train);
                    }
                    return new_state;
                }
            }
        }
        state
    }

    /// Block state over one of the train's alternative paths, if it is
    /// available.
    fn alternative_block_state(&mut self, signal: SignalId, train: RoutedTrain, path: usize) -> Option<BlockState> {
        let alternative = self.trains.get(train.train)?.alternative_paths.get(path)?.clone();
        let (state, _) = self.fold_route(
            &alternative,
            Some(train),
            signal,
            0,
            BlockState::Reservable,
            BlockState::Reservable,
        );
        state.is_clear().then_some(state)
    }

    /// Switch the train onto alternative path `path` from `start_index`.
    fn set_alternative_route(&mut self, signal: SignalId, train: RoutedTrain, start_index: usize, path: usize) {
        let Some(t) = self.trains.get_mut(train.train) else {
            return;
        };
        let Some(alternative) = t.alternative_paths.get(path).cloned() else {
            return;
        };
        let Some(end_section) = alternative.last().map(|e| e.section) else {
            return;
        };
        let route = t.route_mut(train.route_index);
        let Some(end_index) = route.index_of(end_section, start_index) else {
            return;
        };
        route.splice(start_index, end_index, &alternative);
        debug!(train = %train.train, signal = %signal, path, "alternative path taken");
        self.rebuild_signal_route(signal);
    }

    fn location_based_block_state(&mut self, signal: SignalId, train: RoutedTrain) -> BlockState {
        let auto = self.trains.get(train.train).is_some_and(|t| t.is_auto());
        let requested = self.signals[signal.slot()].permission == Permission::Requested;
        let mut route = self.signals[signal.slot()].route.clone();
        let mut state = BlockState::Reserved;
        let mut assigned: Vec<SectionId> = Vec::new();
        let mut index = 0;

        while let Some(element) = route.get(index).cloned() {
            state = self.section_state(element.section, Some(train), element.direction, state, Some(&route), Some(signal));
            if state.is_worse_than(BlockState::OccupiedSameDirection) {
                break;
            }
            let area = self.section(element.section).and_then(|s| s.deadlock_reference);
            if let (true, Some(area), true) = (element.facing_point, area, auto) {
                if element.used_alternative_path.is_some() {
                    assigned.push(element.section);
                } else {
                    if !state.is_clear() {
                        state = BlockState::Blocked;
                        break;
                    }
                    let Some(path) = self.select_path(area, element.section, train.train) else {
                        trace!(signal = %signal, train = %train.train, "passing area has no free path");
                        state = BlockState::Blocked;
                        break;
                    };
                    if !self.enter_passing_path(signal, train, element.section, area, path) {
                        state = BlockState::Blocked;
                        break;
                    }
                    assigned.push(element.section);
                    route = self.signals[signal.slot()].route.clone();
                    index = route.index_of(element.section, 0).unwrap_or(index);
                }
            }
            if state == BlockState::OccupiedSameDirection && requested {
                break;
            }
            index += 1;
        }

        if !assigned.is_empty() && !state.is_clear() {
            if let Some(t) = self.trains.get_mut(train.train) {
                let from = t.position.route_index;
                let route = t.route_mut(train.route_index);
                for section in &assigned {
                    if let Some(i) = route.index_of(*section, from) {
                        if let Some(e) = route.get_mut(i) {
                            e.used_alternative_path = None;
                        }
                    }
                }
            }
            self.rebuild_signal_route(signal);
        }
        state
    }

    /// Splice the committed path of a passing area into the train's route at
    /// its start section.
    fn enter_passing_path(
        &mut self,
        signal: SignalId,
        train: RoutedTrain,
        start: SectionId,
        area: DeadlockId,
        path: usize,
    ) -> bool {
        let Some(path_route) = self
            .deadlocks
            .get(area.slot())
            .and_then(|info| info.path(path))
            .map(|p| p.route.clone())
        else {
            return false;
        };
        let Some(end_section) = path_route.last().map(|e| e.section) else {
            return false;
        };
        let Some(t) = self.trains.get_mut(train.train) else {
            return false;
        };
        let from = t.position.route_index;
        let route = t.route_mut(train.route_index);
        let Some(start_index) = route.index_of(start, from) else {
            return false;
        };
        let Some(end_index) = route.index_of(end_section, start_index) else {
            return false;
        };
        let original = route[start_index].clone();
        let mut replacement: Vec<RouteElement> = path_route.iter().cloned().collect();
        if let Some(first) = replacement.first_mut() {
            first.facing_point = original.facing_point;
            first.alternative = original.alternative;
            first.used_alternative_path = Some(path);
        }
        route.splice(start_index, end_index, &replacement);
        debug!(train = %train.train, area = %area, path, "passing path entered");
        self.rebuild_signal_route(signal);
        true
    }

    /// Block state of a route that does not yet reach the next signal:
    /// the route itself, then the plain track beyond it up to a junction,
    /// end of track or signal.
    pub(crate) fn part_block_state(&mut self, signal: SignalId) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return;
        };
        let train = object.enabled_train;
        let route = object.route.clone();
        let Some(last) = route.last() else {
            return;
        };

        let mut additional = TrackRoute::new();
        let (mut current, mut direction) = (last.section, last.direction);
        loop {
            if self.placements.end_signal(current, direction).is_some() {
                break;
            }
            let Some(pin) = self.aligned_next(current, direction) else {
                break;
            };
            match self.graph.kind(pin.link) {
                Some(SectionKind::Normal) => {}
                _ => break,
            }
            if additional.len() >= self.config.max_walk_sections || additional.contains_section(pin.link) {
                break;
            }
            additional.push(RouteElement::new(pin.link, pin.direction));
            current = pin.link;
            direction = pin.direction;
        }

        let (mut state, _) =
            self.fold_route(&route, train, signal, 0, BlockState::Reservable, BlockState::Reserved);
        if state.is_clear() {
            state = self
                .fold_route(&additional, train, signal, 0, BlockState::Reservable, state)
                .0;
        }
        self.signals[signal.slot()].block_state = state;
    }

    /// Block state of a signal that is not routed: an idle NORMAL signal
    /// with a fixed route, or a non-NORMAL signal looking along the
    /// aligned track.
    pub(crate) fn not_routed_block_state(&mut self, signal: SignalId) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return;
        };
        let mut state = BlockState::Reserved;
        if object.is_normal() && object.has_fixed_route {
            let occupied = object
                .fixed_route
                .sections()
                .any(|s| self.circuit_state(s).is_some_and(|c| c.has_trains()));
            if occupied {
                state = BlockState::OccupiedSameDirection;
            }
        } else {
            let (own, direction, offset) = (object.section, object.direction, meters(object.offset));
            let (mut current, mut dir) = match (object.is_normal(), object.next_section) {
                (true, Some(next)) => (
                    next,
                    self.aligned_next(own, direction).map_or(direction, |p| p.direction),
                ),
                _ => (own, direction),
            };
            let mut steps = 0;
            loop {
                let occupied = self.circuit_state(current).is_some_and(|c| c.has_trains());
                if occupied {
                    let ahead = current != own
                        || self.trains.iter().any(|t| {
                            t.position.section == own
                                && t.position.direction == direction
                                && meters(t.position.offset) > offset
                        });
                    if ahead {
                        state = BlockState::OccupiedSameDirection;
                    }
                }
                steps += 1;
                let at_end = self.placements.end_signal(current, dir).is_some()
                    || self.graph.kind(current) == Some(SectionKind::EndOfTrack);
                if at_end || steps > self.config.max_walk_sections {
                    break;
                }
                match self.aligned_next(current, dir) {
                    Some(pin) => {
                        current = pin.link;
                        dir = pin.direction;
                    }
                    None => {
                        state = BlockState::Blocked;
                        break;
                    }
                }
            }
        }
        self.signals[signal.slot()].block_state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::{TrainId, m};
    use sb_graph::{TrackBuilder, TrackDirection, TrackGraph};

    use crate::aspect::SignalFunction;
    use crate::config::InterlockConfig;
    use crate::interlocking::{HeadSpec, SignalSpec};
    use crate::signal::SignalKind;
    use crate::train::Train;

    use TrackDirection::Ahead;

    /// A(100) | B(400) | C(400) | D(100)
    fn line() -> TrackGraph {
        let mut b = TrackBuilder::new();
        let a = b.add_section("A", SectionKind::EndOfTrack, m(100.0));
        let sb = b.add_section("B", SectionKind::Normal, m(400.0));
        let c = b.add_section("C", SectionKind::Normal, m(400.0));
        let d = b.add_section("D", SectionKind::EndOfTrack, m(100.0));
        b.connect(a, Ahead, sb, Ahead).unwrap();
        b.connect(sb, Ahead, c, Ahead).unwrap();
        b.connect(c, Ahead, d, Ahead).unwrap();
        b.build().unwrap()
    }

    fn sec(il: &Interlocking, name: &str) -> SectionId {
        il.graph().find(name).unwrap()
    }

    #[test]
    fn fold_stops_at_the_first_unusable_section() {
        let mut il = Interlocking::new(line(), InterlockConfig::default());
        il.commission().unwrap();
        let c = sec(&il, "C");
        let standing = Train::new(TrainId::from_index(2), "T2", TrackRoute::from_steps([(c, Ahead)]));
        il.add_train(standing).unwrap();

        let route = TrackRoute::from_steps(["B", "C", "D"].map(|n| (sec(&il, n), Ahead)));
        let signal = SignalId::from_index(0);
        let fold = |il: &mut Interlocking, start| {
            il.fold_route(&route, None, signal, start, BlockState::Reservable, BlockState::Reserved)
        };
        assert_eq!(fold(&mut il, 0), (BlockState::OccupiedSameDirection, Some(1)));
        assert_eq!(fold(&mut il, 2), (BlockState::Reservable, Some(2)));
        assert_eq!(fold(&mut il, 3), (BlockState::Reserved, None));
    }

    #[test]
    fn distant_signal_sees_only_trains_ahead_of_it() {
        let mut il = Interlocking::new(line(), InterlockConfig::default());
        let b = sec(&il, "B");
        let distant = il
            .add_signal(SignalSpec {
                name: "D1".into(),
                kind: SignalKind::Signal,
                section: b,
                direction: Ahead,
                offset: m(100.0),
                heads: vec![HeadSpec {
                    function: SignalFunction::Distance,
                    signal_type: None,
                }],
                allow_part_route: false,
            })
            .unwrap();
        il.commission().unwrap();
        assert_eq!(il.signal(distant).unwrap().block_state(), BlockState::Reserved);

        let t1 = TrainId::from_index(1);
        il.add_train(Train::new(t1, "T1", TrackRoute::from_steps([(b, Ahead)]))).unwrap();
        il.not_routed_block_state(distant);
        assert_eq!(il.signal(distant).unwrap().block_state(), BlockState::Reserved);

        il.train_mut(t1).unwrap().position.offset = m(250.0);
        il.not_routed_block_state(distant);
        assert_eq!(
            il.signal(distant).unwrap().block_state(),
            BlockState::OccupiedSameDirection
        );
    }
}
