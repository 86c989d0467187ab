//! Signal objects: heads grouped into a named signal plus the
//! enablement / route / permission state machine data.

use std::collections::BTreeMap;

use sb_core::{Length, SectionId, SignalId, TrainId};
use sb_graph::TrackDirection;
use serde::{Deserialize, Serialize};

use crate::aspect::{Aspect, SignalFunction};
use crate::block::BlockState;
use crate::head::SignalHead;
use crate::route::{RoutedTrain, TrackRoute};

/// Kind of signal object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Signal,
    SpeedSignal,
    SpeedPost,
}

/// Dispatcher or timetable hold on a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HoldState {
    #[default]
    None,
    StationStop,
    ManualLock,
    ManualPass,
    ManualApproach,
}

impl HoldState {
    /// Holds that keep the signal at its most restrictive aspect.
    pub fn is_stop_hold(self) -> bool {
        matches!(self, HoldState::StationStop | HoldState::ManualLock)
    }

    /// Holds set by a dispatcher rather than the timetable.
    pub fn is_manual(self) -> bool {
        matches!(
            self,
            HoldState::ManualLock | HoldState::ManualPass | HoldState::ManualApproach
        )
    }
}

/// Permission to pass the signal at its most restrictive aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Permission {
    Granted,
    Requested,
    #[default]
    Denied,
}

/// Observable lifecycle phase of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalPhase {
    /// No train; fixed or default route only.
    Idle,
    /// Train assigned, route not built yet.
    Enabled,
    /// Route built, block state does not allow the train on.
    RouteBuilt,
    /// Block state allows the train to proceed.
    Cleared,
}

/// Manual lock keyed by train and subpath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainLock {
    pub train: TrainId,
    pub subpath: u32,
}

/// Per-function cache of the next signal ahead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextSignals {
    found: BTreeMap<SignalFunction, SignalId>,
}

impl NextSignals {
    pub fn get(&self, function: SignalFunction) -> Option<SignalId> {
        self.found.get(&function).copied()
    }

    pub fn set(&mut self, function: SignalFunction, signal: Option<SignalId>) {
        match signal {
            Some(signal) => {
                self.found.insert(function, signal);
            }
            None => {
                self.found.remove(&function);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalFunction, SignalId)> + '_ {
        self.found.iter().map(|(f, s)| (*f, *s))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (SignalFunction, SignalId)>) -> Self {
        Self {
            found: pairs.into_iter().collect(),
        }
    }
}

/// A signal: one or more heads plus its clearance state.
#[derive(Debug)]
pub struct SignalObject {
    pub id: SignalId,
    pub name: String,
    pub kind: SignalKind,
    /// Section the signal stands on.
    pub section: SectionId,
    pub direction: TrackDirection,
    /// Distance from the section entry in the direction of travel.
    pub offset: Length,
    /// First section beyond the signal.
    pub next_section: Option<SectionId>,
    pub heads: Vec<SignalHead>,

    pub(crate) enabled_train: Option<RoutedTrain>,
    pub(crate) route: TrackRoute,
    pub(crate) fixed_route: TrackRoute,
    pub(crate) has_fixed_route: bool,
    pub(crate) full_route: bool,
    pub allow_part_route: bool,
    pub(crate) block_state: BlockState,
    pub(crate) hold_state: HoldState,
    pub(crate) permission: Permission,
    pub(crate) next_signals: NextSignals,
    pub(crate) default_next: NextSignals,
    pub(crate) train_route_index: Option<usize>,

    pub(crate) propagated: bool,
    pub(crate) is_propagated: bool,
    pub force_propagation: bool,
    pub(crate) req_clear_ahead: i32,
    /// Count including this signal's own heads; -2 when unset.
    pub(crate) clear_ahead_msts: i32,
    pub(crate) clear_ahead_orts: i32,
    pub(crate) clear_ahead_active: i32,

    pub(crate) approach_control_cleared: bool,
    pub(crate) approach_control_set: bool,
    pub force_prop_on_approach_control: bool,
    pub(crate) claim_locked: bool,
    pub(crate) station_hold: bool,
    pub(crate) call_on_manually_allowed: bool,

    pub(crate) junctions_passed: Vec<SectionId>,
    pub(crate) locks: Vec<TrainLock>,
    pub(crate) local_storage: BTreeMap<i32, i32>,
    /// Fixed signals that never need re-evaluation.
    pub no_update: bool,
}

impl SignalObject {
    pub(crate) fn new(
        id: SignalId,
        name: String,
        kind: SignalKind,
        section: SectionId,
        direction: TrackDirection,
        offset: Length,
        heads: Vec<SignalHead>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            section,
            direction,
            offset,
            next_section: None,
            heads,
            enabled_train: None,
            route: TrackRoute::new(),
            fixed_route: TrackRoute::new(),
            has_fixed_route: false,
            full_route: true,
            allow_part_route: false,
            block_state: BlockState::Blocked,
            hold_state: HoldState::None,
            permission: Permission::Denied,
            next_signals: NextSignals::default(),
            default_next: NextSignals::default(),
            train_route_index: None,
            propagated: false,
            is_propagated: false,
            force_propagation: false,
            req_clear_ahead: 0,
            clear_ahead_msts: -2,
            clear_ahead_orts: 2,
            clear_ahead_active: 2,
            approach_control_cleared: false,
            approach_control_set: false,
            force_prop_on_approach_control: false,
            claim_locked: false,
            station_hold: false,
            call_on_manually_allowed: false,
            junctions_passed: Vec::new(),
            locks: Vec::new(),
            local_storage: BTreeMap::new(),
            no_update: false,
        }
    }

    /// Train this signal is serving.
    pub fn enabled_train(&self) -> Option<RoutedTrain> {
        self.enabled_train
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_train.is_some()
    }

    pub fn route(&self) -> &TrackRoute {
        &self.route
    }

    pub fn fixed_route(&self) -> Option<&TrackRoute> {
        self.has_fixed_route.then_some(&self.fixed_route)
    }

    pub fn block_state(&self) -> BlockState {
        self.block_state
    }

    pub fn hold_state(&self) -> HoldState {
        self.hold_state
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn is_full_route(&self) -> bool {
        self.full_route
    }

    pub fn is_propagated(&self) -> bool {
        self.is_propagated
    }

    pub fn has_propagated(&self) -> bool {
        self.propagated
    }

    pub fn req_clear_ahead(&self) -> i32 {
        self.req_clear_ahead
    }

    /// Configured clear-ahead count currently in force.
    pub fn clear_ahead_active(&self) -> i32 {
        self.clear_ahead_active
    }

    pub fn approach_control_set(&self) -> bool {
        self.approach_control_set
    }

    pub fn claim_locked(&self) -> bool {
        self.claim_locked
    }

    /// Next signal of `function` currently cached.
    pub fn next_signal(&self, function: SignalFunction) -> Option<SignalId> {
        self.next_signals.get(function)
    }

    pub fn next_signals(&self) -> &NextSignals {
        &self.next_signals
    }

    pub fn default_next(&self) -> &NextSignals {
        &self.default_next
    }

    pub fn junctions_passed(&self) -> &[SectionId] {
        &self.junctions_passed
    }

    pub fn locks(&self) -> &[TrainLock] {
        &self.locks
    }

    pub fn local_var(&self, key: i32) -> i32 {
        self.local_storage.get(&key).copied().unwrap_or(0)
    }

    pub fn store_local_var(&mut self, key: i32, value: i32) {
        self.local_storage.insert(key, value);
    }

    /// Has at least one NORMAL head.
    pub fn is_normal(&self) -> bool {
        self.heads.iter().any(|h| h.function.is_normal())
    }

    pub fn has_function(&self, function: SignalFunction) -> bool {
        self.heads.iter().any(|h| h.function == function)
    }

    pub fn num_normal_heads(&self) -> i32 {
        self.heads.iter().filter(|h| h.function.is_normal()).count() as i32
    }

    /// Most restrictive aspect across heads of `function`; STOP if there are none.
    pub fn this_sig_mr(&self, function: SignalFunction) -> Aspect {
        self.heads
            .iter()
            .filter(|h| h.function == function)
            .map(|h| h.aspect)
            .reduce(Aspect::most_restrictive)
            .unwrap_or(Aspect::Stop)
    }

    /// Least restrictive aspect across heads of `function`; STOP if there are none.
    pub fn this_sig_lr(&self, function: SignalFunction) -> Aspect {
        self.heads
            .iter()
            .filter(|h| h.function == function)
            .map(|h| h.aspect)
            .reduce(Aspect::least_restrictive)
            .unwrap_or(Aspect::Stop)
    }

    /// The aspect a driver may act on: the most restrictive NORMAL head.
    pub fn displayed_aspect(&self) -> Aspect {
        self.this_sig_mr(SignalFunction::Normal)
    }

    pub fn phase(&self) -> SignalPhase {
        match self.enabled_train {
            None => SignalPhase::Idle,
            Some(_) if self.route.is_empty() => SignalPhase::Enabled,
            Some(_) if self.block_state.is_clear() => SignalPhase::Cleared,
            Some(_) => SignalPhase::RouteBuilt,
        }
    }

    pub fn has_lock_for(&self, train: TrainId, subpath: u32) -> bool {
        self.locks.contains(&TrainLock { train, subpath })
    }

    /// Apply the configured clear-ahead counts of this signal's type.
    ///
    /// `further` counts the NORMAL signals beyond this one to pre-clear;
    /// `legacy` counts this signal's NORMAL heads as well and takes priority.
    pub(crate) fn configure_clear_ahead(&mut self, further: Option<u32>, legacy: Option<u32>) {
        if let Some(further) = further {
            self.clear_ahead_orts = further as i32 + 1;
            self.clear_ahead_active = self.clear_ahead_orts;
        }
        if let Some(legacy) = legacy {
            self.clear_ahead_msts = legacy as i32;
        }
    }

    /// Clear-ahead budget for a new request.
    pub(crate) fn required_clear_ahead(&self, clear_next: i32) -> i32 {
        if self.clear_ahead_msts > -2 {
            if clear_next > 0 {
                clear_next - self.num_normal_heads()
            } else {
                self.clear_ahead_msts - self.num_normal_heads()
            }
        } else if self.clear_ahead_active == -1 {
            if clear_next > 0 { clear_next } else { 1 }
        } else if self.clear_ahead_active == 0 {
            0
        } else if clear_next > 0 {
            clear_next - 1
        } else {
            self.clear_ahead_active - 1
        }
    }

    /// Back to idle after a reset. Hold state and locks survive.
    pub(crate) fn clear_enabled(&mut self) {
        self.enabled_train = None;
        self.route.clear();
        self.full_route = self.has_fixed_route;
        self.train_route_index = None;
        self.propagated = false;
        self.is_propagated = false;
        self.force_propagation = false;
        self.force_prop_on_approach_control = false;
        self.approach_control_cleared = false;
        self.approach_control_set = false;
        self.claim_locked = false;
        self.call_on_manually_allowed = false;
        self.permission = Permission::Denied;
        self.block_state = BlockState::Blocked;
        self.next_signals = self.default_next.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::head::SignalHead;
    use sb_core::{Id, m};

    fn signal(heads: Vec<SignalHead>) -> SignalObject {
        SignalObject::new(
            Id::from_index(0),
            "S1".into(),
            SignalKind::Signal,
            Id::from_index(0),
            TrackDirection::Ahead,
            m(100.0),
            heads,
        )
    }

    #[test]
    fn mr_and_lr_over_normal_heads() {
        let mut a = SignalHead::new(SignalFunction::Normal, None);
        let mut b = SignalHead::new(SignalFunction::Normal, None);
        let mut c = SignalHead::new(SignalFunction::Distance, None);
        a.set_aspect(Aspect::Clear2);
        b.set_aspect(Aspect::Approach1);
        c.set_aspect(Aspect::Stop);
        let sig = signal(vec![a, b, c]);
        assert_eq!(sig.this_sig_mr(SignalFunction::Normal), Aspect::Approach1);
        assert_eq!(sig.this_sig_lr(SignalFunction::Normal), Aspect::Clear2);
        assert_eq!(sig.this_sig_mr(SignalFunction::Speed), Aspect::Stop);
        assert_eq!(sig.displayed_aspect(), Aspect::Approach1);
        assert_eq!(sig.num_normal_heads(), 2);
    }

    #[test]
    fn clear_ahead_formula() {
        let mut sig = signal(vec![SignalHead::new(SignalFunction::Normal, None)]);
        // default: one further signal
        assert_eq!(sig.required_clear_ahead(0), 1);
        assert_eq!(sig.required_clear_ahead(3), 2);

        sig.clear_ahead_active = -1;
        assert_eq!(sig.required_clear_ahead(0), 1);
        assert_eq!(sig.required_clear_ahead(3), 3);

        sig.configure_clear_ahead(Some(2), None);
        assert_eq!(sig.required_clear_ahead(0), 2);
        assert_eq!(sig.required_clear_ahead(2), 1);
        assert_eq!(sig.required_clear_ahead(1), 0);

        sig.configure_clear_ahead(Some(0), None);
        assert_eq!(sig.required_clear_ahead(0), 0);

        sig.clear_ahead_active = 0;
        assert_eq!(sig.required_clear_ahead(5), 0);

        sig.configure_clear_ahead(None, Some(3));
        assert_eq!(sig.required_clear_ahead(0), 2);
        assert_eq!(sig.required_clear_ahead(4), 3);
    }

    #[test]
    fn phases() {
        let mut sig = signal(vec![SignalHead::new(SignalFunction::Normal, None)]);
        assert_eq!(sig.phase(), SignalPhase::Idle);
        sig.enabled_train = Some(RoutedTrain::new(Id::from_index(1), 0));
        assert_eq!(sig.phase(), SignalPhase::Enabled);
        sig.route = TrackRoute::from_steps([(Id::from_index(1), TrackDirection::Ahead)]);
        sig.block_state = BlockState::OccupiedSameDirection;
        assert_eq!(sig.phase(), SignalPhase::RouteBuilt);
        sig.block_state = BlockState::Reserved;
        assert_eq!(sig.phase(), SignalPhase::Cleared);
        sig.clear_enabled();
        assert_eq!(sig.phase(), SignalPhase::Idle);
        assert!(sig.route().is_empty());
        assert_eq!(sig.block_state(), BlockState::Blocked);
    }

    #[test]
    fn local_storage_defaults_to_zero() {
        let mut sig = signal(vec![]);
        assert_eq!(sig.local_var(7), 0);
        sig.store_local_var(7, 42);
        assert_eq!(sig.local_var(7), 42);
    }
}
