//! The interlocking: arena owner of section state, signals, trains and
//! passing areas, plus the load-time commissioning pass.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use sb_core::{Length, SectionId, SignalId, TrainId, ensure_non_negative, m, meters};
use sb_graph::{SectionKind, TrackDirection, TrackGraph};
use tracing::{debug, info};

use crate::aspect::{FunctionNames, SignalFunction};
use crate::config::InterlockConfig;
use crate::deadlock::DeadlockInfo;
use crate::error::{InterlockError, InterlockResult};
use crate::extension::{ExtensionCall, ExtensionRegistry, SignalMessage};
use crate::head::{SignalHead, SignalType};
use crate::placement::SignalPlacements;
use crate::route::TrackRoute;
use crate::scheduler::UpdateScheduler;
use crate::section::SectionRuntime;
use crate::signal::{NextSignals, SignalKind, SignalObject};
use crate::train::{Train, TrainTable};

/// One head of a signal to be added.
#[derive(Debug, Clone)]
pub struct HeadSpec {
    pub function: SignalFunction,
    pub signal_type: Option<Arc<SignalType>>,
}

/// A signal to be added before commissioning.
#[derive(Debug, Clone)]
pub struct SignalSpec {
    pub name: String,
    pub kind: SignalKind,
    pub section: SectionId,
    pub direction: TrackDirection,
    /// Distance from the section entry in the direction of travel.
    pub offset: Length,
    pub heads: Vec<HeadSpec>,
    pub allow_part_route: bool,
}

/// Simulation context for one interlocking instance.
///
/// Sections, signals and passing areas live in arena vectors addressed by
/// their ids. Every operation takes ids explicitly; nothing is global.
#[derive(Debug)]
pub struct Interlocking {
    pub(crate) graph: TrackGraph,
    pub(crate) sections: Vec<SectionRuntime>,
    pub(crate) signals: Vec<SignalObject>,
    pub(crate) placements: SignalPlacements,
    pub(crate) trains: TrainTable,
    pub(crate) deadlocks: Vec<DeadlockInfo>,
    pub(crate) config: InterlockConfig,
    pub(crate) functions: FunctionNames,
    pub(crate) extensions: ExtensionRegistry,
    pub(crate) outbox: VecDeque<SignalMessage>,
    pub(crate) scheduler: UpdateScheduler,
    pub(crate) propagation_depth: usize,
    pub(crate) commissioned: bool,
}

impl Interlocking {
    pub fn new(graph: TrackGraph, config: InterlockConfig) -> Self {
        let sections = graph.sections().iter().map(SectionRuntime::new).collect();
        let placements = SignalPlacements::new(graph.len());
        Self {
            graph,
            sections,
            signals: Vec::new(),
            placements,
            trains: TrainTable::default(),
            deadlocks: Vec::new(),
            scheduler: UpdateScheduler::new(config.scheduler),
            config,
            functions: FunctionNames::new(),
            extensions: ExtensionRegistry::new(),
            outbox: VecDeque::new(),
            propagation_depth: 0,
            commissioned: false,
        }
    }

    pub fn graph(&self) -> &TrackGraph {
        &self.graph
    }

    pub fn config(&self) -> &InterlockConfig {
        &self.config
    }

    pub fn function_names(&self) -> &FunctionNames {
        &self.functions
    }

    pub fn function_names_mut(&mut self) -> &mut FunctionNames {
        &mut self.functions
    }

    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    pub fn is_commissioned(&self) -> bool {
        self.commissioned
    }

    pub fn signal(&self, id: SignalId) -> Option<&SignalObject> {
        self.signals.get(id.slot())
    }

    pub fn signals(&self) -> &[SignalObject] {
        &self.signals
    }

    pub fn placements(&self) -> &SignalPlacements {
        &self.placements
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub(crate) fn check_signal(&self, signal: SignalId) -> InterlockResult<()> {
        if signal.slot() < self.signals.len() {
            Ok(())
        } else {
            Err(InterlockError::UnknownSignal { signal })
        }
    }

    pub(crate) fn check_train(&self, train: TrainId) -> InterlockResult<()> {
        if self.trains.get(train).is_some() {
            Ok(())
        } else {
            Err(InterlockError::UnknownTrain { train })
        }
    }

    /// Add a signal. At most one signal with NORMAL heads may protect each
    /// section exit.
    pub fn add_signal(&mut self, spec: SignalSpec) -> InterlockResult<SignalId> {
        let invalid = |what: String| InterlockError::InvalidPlacement {
            name: spec.name.clone(),
            what,
        };
        if self.commissioned {
            return Err(invalid("interlocking is already commissioned".into()));
        }
        let Some(section) = self.graph.section(spec.section) else {
            return Err(invalid(format!("unknown section {}", spec.section)));
        };
        if spec.heads.is_empty() {
            return Err(invalid("signal has no heads".into()));
        }
        let offset = meters(spec.offset);
        if ensure_non_negative(offset, "signal offset").is_err() || offset > meters(section.length) {
            return Err(invalid(format!(
                "offset {offset} m outside section '{}'",
                section.name
            )));
        }
        let normal = spec.heads.iter().any(|h| h.function.is_normal());
        if normal {
            if let Some(existing) = self.placements.end_signal(spec.section, spec.direction) {
                return Err(invalid(format!(
                    "section '{}' already has end signal {existing}",
                    section.name
                )));
            }
        }

        let id = SignalId::from_usize(self.signals.len());
        let functions: BTreeSet<SignalFunction> = spec.heads.iter().map(|h| h.function).collect();
        self.placements
            .insert(spec.section, spec.direction, id, spec.offset, functions);
        if normal {
            self.placements.set_end_signal(spec.section, spec.direction, id);
        }

        let mut clear_ahead = None;
        let mut clear_ahead_heads = None;
        let heads = spec
            .heads
            .into_iter()
            .map(|h| {
                if let Some(t) = h.signal_type.as_ref().filter(|_| h.function.is_normal()) {
                    clear_ahead = clear_ahead.or(t.clear_ahead);
                    clear_ahead_heads = clear_ahead_heads.or(t.clear_ahead_heads);
                }
                SignalHead::new(h.function, h.signal_type)
            })
            .collect();
        let mut object = SignalObject::new(
            id,
            spec.name,
            spec.kind,
            spec.section,
            spec.direction,
            spec.offset,
            heads,
        );
        object.allow_part_route = spec.allow_part_route;
        object.configure_clear_ahead(clear_ahead, clear_ahead_heads);
        self.signals.push(object);
        Ok(id)
    }

    /// Register a train and record it on its present section.
    pub fn add_train(&mut self, train: Train) -> InterlockResult<()> {
        for route in &train.routes {
            for element in route {
                self.check_section(element.section)?;
            }
        }
        self.check_section(train.position.section)?;
        let active = train.route(train.route_index);
        if !active.is_empty() && train.position.route_index >= active.len() {
            return Err(InterlockError::InvalidArg {
                what: format!(
                    "train {} is placed at route index {} of a {}-element route",
                    train.id,
                    train.position.route_index,
                    active.len()
                ),
            });
        }
        if self.trains.get(train.id).is_some() {
            return Err(InterlockError::InvalidArg {
                what: format!("train {} already exists", train.id),
            });
        }
        let mut train = train;
        for route in train.routes.iter_mut() {
            self.mark_facing_points(route);
        }
        let id = train.id;
        let routed = train.routed();
        let position = train.position;
        self.trains.insert(train);
        self.set_occupied(position.section, routed, position.direction)?;
        self.refresh_next_signal(id);
        debug!(train = %id, section = %position.section, "train added");
        Ok(())
    }

    /// Remove a train, releasing everything it holds.
    pub fn remove_train_entirely(&mut self, train: TrainId) -> InterlockResult<Train> {
        self.check_train(train)?;
        let enabled: Vec<SignalId> = self
            .signals
            .iter()
            .filter(|s| s.enabled_train.is_some_and(|t| t.train == train))
            .map(|s| s.id)
            .collect();
        for signal in enabled {
            self.reset_signal_chain(signal, false);
        }
        for slot in 0..self.sections.len() {
            self.release_section(SectionId::from_usize(slot), train);
        }
        self.release_deadlock_paths(train);
        self.trains
            .remove(train)
            .ok_or(InterlockError::UnknownTrain { train })
    }

    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.trains.get(id)
    }

    pub fn train_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.get_mut(id)
    }

    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.trains.iter()
    }

    /// Replace a train's route for one direction of travel.
    ///
    /// Passing path commitments are dropped and signals enabled for the
    /// train are reset, so clearance is renegotiated on the new route.
    pub fn set_train_route(
        &mut self,
        train: TrainId,
        route_index: usize,
        route: TrackRoute,
    ) -> InterlockResult<()> {
        self.check_train(train)?;
        for element in &route {
            self.check_section(element.section)?;
        }
        let mut route = route;
        self.mark_facing_points(&mut route);
        self.release_deadlock_paths(train);
        let enabled: Vec<SignalId> = self
            .signals
            .iter()
            .filter(|s| s.enabled_train.is_some_and(|t| t.train == train))
            .map(|s| s.id)
            .collect();
        for signal in enabled {
            self.reset_signal_chain(signal, true);
        }
        if let Some(t) = self.trains.get_mut(train) {
            *t.route_mut(route_index) = route;
            if let Some(index) = t.route(t.route_index).index_of(t.position.section, 0) {
                t.position.route_index = index;
            }
            t.last_reserved = [None, None];
        }
        self.refresh_next_signal(train);
        Ok(())
    }

    /// Recompute the first NORMAL signal ahead of a train on its route.
    pub fn refresh_next_signal(&mut self, train: TrainId) -> Option<SignalId> {
        let found = self.trains.get(train).and_then(|t| {
            t.route(t.route_index)
                .iter()
                .skip(t.position.route_index)
                .find_map(|e| self.placements.end_signal(e.section, e.direction))
        });
        if let Some(t) = self.trains.get_mut(train) {
            let index = t.route_index.min(1);
            t.next_signal[index] = found;
        }
        found
    }

    /// Move a train's head onto the next section of its route.
    ///
    /// The train is modelled as occupying one section. Leaving a section
    /// through its end signal passes that signal; the passed signal is
    /// returned.
    pub fn advance_train(&mut self, train: TrainId) -> InterlockResult<Option<SignalId>> {
        self.check_train(train)?;
        let Some((routed, from, next)) = self.trains.get(train).and_then(|t| {
            let route = t.route(t.route_index);
            let index = t.position.route_index;
            route
                .get(index + 1)
                .map(|next| (t.routed(), route[index].clone(), next.clone()))
        }) else {
            return Ok(None);
        };
        self.set_occupied(next.section, routed, next.direction)?;
        self.release_section(from.section, train);
        let left: Vec<SignalId> = self
            .placements
            .all_signals(from.section, from.direction)
            .collect();
        for signal in left {
            if let Some(object) = self.signals.get_mut(signal.slot()) {
                if !object.is_normal() && object.enabled_train.is_some_and(|t| t.train == train) {
                    object.enabled_train = None;
                }
            }
        }
        if let Some(t) = self.trains.get_mut(train) {
            t.position.section = next.section;
            t.position.direction = next.direction;
            t.position.offset = m(0.0);
            t.position.route_index += 1;
        }
        let passed = self
            .placements
            .end_signal(from.section, from.direction)
            .filter(|s| {
                self.signals
                    .get(s.slot())
                    .is_some_and(|o| o.enabled_train.is_some_and(|t| t.train == train))
            });
        if let Some(signal) = passed {
            self.signal_passed(signal)?;
        }
        self.refresh_next_signal(train);
        Ok(passed)
    }

    /// Clear the way for a train from the first signal ahead of it.
    pub fn request_train_clearance(&mut self, train: TrainId) -> InterlockResult<bool> {
        self.check_train(train)?;
        let Some(signal) = self.refresh_next_signal(train) else {
            return Ok(false);
        };
        let routed = self
            .trains
            .get(train)
            .map(Train::routed)
            .ok_or(InterlockError::UnknownTrain { train })?;
        self.request_clear_signal(signal, routed, 0, false)
    }

    /// Resolve signal topology and bring every signal to its idle state.
    ///
    /// Computes each signal's next section, per-function next-signal
    /// defaults, fixed routes and no-update flags; attaches extensions and
    /// runs a full update pass.
    pub fn commission(&mut self) -> InterlockResult<()> {
        if self.commissioned {
            return Err(InterlockError::InvalidArg {
                what: "interlocking is already commissioned".into(),
            });
        }
        for slot in 0..self.signals.len() {
            let (section, direction) = (self.signals[slot].section, self.signals[slot].direction);
            self.signals[slot].next_section = self.aligned_next(section, direction).map(|p| p.link);
        }

        let functions: BTreeSet<SignalFunction> = self
            .signals
            .iter()
            .flat_map(|s| s.heads.iter().map(|h| h.function))
            .chain([SignalFunction::Normal])
            .collect();

        for slot in 0..self.signals.len() {
            let id = SignalId::from_usize(slot);
            let mut defaults = Vec::new();
            for function in &functions {
                let walk = self.walk_to_signal(id, *function);
                if function.is_normal() {
                    self.register_junctions(id, &walk.junctions);
                }
                if let Some(found) = walk.found {
                    defaults.push((*function, found));
                }
            }
            let defaults = NextSignals::from_pairs(defaults);
            let fixed = self.find_fixed_route(id);
            let object = &mut self.signals[slot];
            object.default_next = defaults.clone();
            object.next_signals = defaults;
            if let Some(route) = fixed {
                object.fixed_route = route;
                object.has_fixed_route = true;
            }
            object.full_route = object.has_fixed_route;
        }

        let attached = self.attach_extensions();
        for object in self.signals.iter_mut() {
            object.no_update = object.heads.iter().all(|h| {
                !h.has_extension()
                    && h.signal_type.as_ref().is_some_and(|t| t.aspects.len() == 1)
            });
        }
        self.commissioned = true;

        for slot in 0..self.signals.len() {
            let id = SignalId::from_usize(slot);
            for head in 0..self.signals[slot].heads.len() {
                self.call_extension(id, head, ExtensionCall::Initialize);
            }
        }
        self.deliver_messages();
        self.tick(true);
        info!(
            signals = self.signals.len(),
            sections = self.sections.len(),
            extensions = attached,
            "interlocking commissioned"
        );
        Ok(())
    }

    /// Record `signal` as routed through the given junctions.
    pub(crate) fn register_junctions(&mut self, signal: SignalId, junctions: &[SectionId]) {
        for junction in junctions {
            if let Some(runtime) = self.sections.get_mut(junction.slot()) {
                if !runtime.signals_passing_routes.contains(&signal) {
                    runtime.signals_passing_routes.push(signal);
                }
            }
        }
        if let Some(object) = self.signals.get_mut(signal.slot()) {
            for junction in junctions {
                if !object.junctions_passed.contains(junction) {
                    object.junctions_passed.push(*junction);
                }
            }
        }
    }

    /// Switch-free route from the signal to the next NORMAL signal or end of
    /// track, if one exists.
    fn find_fixed_route(&self, signal: SignalId) -> Option<TrackRoute> {
        let object = self.signals.get(signal.slot())?;
        if !object.is_normal() {
            return None;
        }
        let mut pin = self
            .graph
            .section(object.section)?
            .pins[object.direction.index()][0];
        if self.graph.section(object.section)?.is_facing(object.direction) {
            return None;
        }
        let mut route = TrackRoute::new();
        let mut seen = BTreeSet::new();
        while let Some(p) = pin {
            let section = self.graph.section(p.link)?;
            if section.kind.is_switchable() || !seen.insert(p.link) {
                return None;
            }
            if route.len() >= self.config.max_walk_sections {
                return None;
            }
            route.push(crate::route::RouteElement::new(p.link, p.direction));
            if self.placements.end_signal(p.link, p.direction).is_some()
                || section.kind == SectionKind::EndOfTrack
            {
                return Some(route);
            }
            pin = section.pins[p.direction.index()][0];
        }
        None
    }

    /// Flag route elements that enter a junction at its facing end.
    fn mark_facing_points(&self, route: &mut TrackRoute) {
        for index in 0..route.len() {
            let (section, direction) = (route[index].section, route[index].direction);
            let is_facing = self
                .graph
                .section(section)
                .is_some_and(|s| s.is_facing(direction));
            if let Some(element) = route.get_mut(index) {
                element.facing_point = element.facing_point || is_facing;
            }
        }
    }
}
