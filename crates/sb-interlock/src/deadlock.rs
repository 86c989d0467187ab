//! Deadlock resolver for passing areas.
//!
//! A passing area offers several interchangeable paths between two end
//! sections. Trains entering from either end are committed to one path on
//! arrival; a commitment holds until the train leaves the far end of its
//! path or is rerouted.
//!
//! Tie-break between trains is first-claim-wins: a path (or its opposite
//! direction copy) committed by one train is never offered to another, and
//! every clearance attempt re-validates the remaining candidates.

use std::collections::{BTreeMap, BTreeSet};

use sb_core::{DeadlockId, Length, SectionId, TrainId, m, meters};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InterlockError, InterlockResult};
use crate::interlocking::Interlocking;
use crate::route::TrackRoute;

/// Name that marks the preferred path of an area.
pub const MAIN_PATH: &str = "MAIN";

/// One path through a passing area, from its start section (the facing
/// points) to its end section, both inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlockPath {
    pub name: String,
    pub route: TrackRoute,
    pub length: Length,
    /// Trains allowed to use the path; empty means any train.
    pub allowed_trains: Vec<TrainId>,
    /// Same track travelled the other way.
    pub inverse: Option<usize>,
}

impl DeadlockPath {
    pub fn start_section(&self) -> Option<SectionId> {
        self.route.first().map(|e| e.section)
    }

    pub fn end_section(&self) -> Option<SectionId> {
        self.route.last().map(|e| e.section)
    }

    pub fn allows(&self, train: TrainId) -> bool {
        self.allowed_trains.is_empty() || self.allowed_trains.contains(&train)
    }

    fn is_inverse_of(&self, other: &DeadlockPath) -> bool {
        self.route.len() == other.route.len()
            && self
                .route
                .iter()
                .zip(other.route.iter().rev())
                .all(|(a, b)| a.section == b.section && a.direction == b.direction.reverse())
    }
}

/// Input for [`Interlocking::add_deadlock_area`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathSpec {
    pub name: String,
    pub route: TrackRoute,
    pub allowed_trains: Vec<TrainId>,
}

/// Committed assignment, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub train: TrainId,
    pub subpath: u32,
    pub path: usize,
}

/// State of one passing area.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlockInfo {
    pub id: DeadlockId,
    pub name: String,
    paths: Vec<DeadlockPath>,
    path_refs: BTreeMap<SectionId, Vec<usize>>,
    assignments: BTreeMap<(TrainId, u32), usize>,
    own_path: BTreeMap<TrainId, usize>,
    length_fit: BTreeMap<TrainId, Vec<bool>>,
    waiting: BTreeSet<TrainId>,
}

impl DeadlockInfo {
    pub fn new(id: DeadlockId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            paths: Vec::new(),
            path_refs: BTreeMap::new(),
            assignments: BTreeMap::new(),
            own_path: BTreeMap::new(),
            length_fit: BTreeMap::new(),
            waiting: BTreeSet::new(),
        }
    }

    /// Add a path and link it to an existing opposite-direction copy.
    pub fn add_path(&mut self, path: DeadlockPath) -> usize {
        let index = self.paths.len();
        let mut path = path;
        if let Some(inverse) = self.paths.iter().position(|p| p.is_inverse_of(&path)) {
            path.inverse = Some(inverse);
            self.paths[inverse].inverse = Some(index);
        }
        if let Some(start) = path.start_section() {
            self.path_refs.entry(start).or_default().push(index);
        }
        self.paths.push(path);
        index
    }

    pub fn paths(&self) -> &[DeadlockPath] {
        &self.paths
    }

    pub fn path(&self, index: usize) -> Option<&DeadlockPath> {
        self.paths.get(index)
    }

    /// Sections where trains enter the area.
    pub fn start_sections(&self) -> impl Iterator<Item = SectionId> + '_ {
        self.path_refs.keys().copied()
    }

    /// Paths entered from `start`, in configured priority order.
    pub fn paths_from(&self, start: SectionId) -> &[usize] {
        self.path_refs.get(&start).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record which paths a train of `length` fits into.
    pub fn set_train_details(&mut self, train: TrainId, length: Length) {
        let fits = self
            .paths
            .iter()
            .map(|p| meters(length) <= meters(p.length))
            .collect();
        self.length_fit.insert(train, fits);
    }

    pub fn set_own_path(&mut self, train: TrainId, path: usize) {
        self.own_path.insert(train, path);
    }

    pub fn own_path(&self, train: TrainId) -> Option<usize> {
        self.own_path.get(&train).copied()
    }

    fn fits(&self, train: TrainId, path: usize) -> bool {
        self.length_fit
            .get(&train)
            .and_then(|f| f.get(path).copied())
            .unwrap_or(true)
    }

    pub fn assignment(&self, train: TrainId, subpath: u32) -> Option<usize> {
        self.assignments.get(&(train, subpath)).copied()
    }

    pub fn assignments(&self) -> impl Iterator<Item = Assignment> + '_ {
        self.assignments
            .iter()
            .map(|((train, subpath), path)| Assignment {
                train: *train,
                subpath: *subpath,
                path: *path,
            })
    }

    pub fn committed_end_section(&self, train: TrainId, subpath: u32) -> Option<SectionId> {
        self.assignment(train, subpath)
            .and_then(|p| self.paths.get(p))
            .and_then(DeadlockPath::end_section)
    }

    /// Path committed by another train that rules `path` out.
    pub fn excluded_by(&self, path: usize, train: TrainId) -> Option<TrainId> {
        let inverse = self.paths.get(path).and_then(|p| p.inverse);
        self.assignments
            .iter()
            .find(|((other, _), committed)| {
                *other != train && (**committed == path || Some(**committed) == inverse)
            })
            .map(|((other, _), _)| *other)
    }

    pub fn commit(&mut self, train: TrainId, subpath: u32, path: usize) {
        self.assignments.insert((train, subpath), path);
        self.waiting.remove(&train);
    }

    /// Drop every commitment of `train`. Returns whether one existed.
    pub fn release_train(&mut self, train: TrainId) -> bool {
        let before = self.assignments.len();
        self.assignments.retain(|(t, _), _| *t != train);
        self.waiting.remove(&train);
        self.length_fit.remove(&train);
        before != self.assignments.len()
    }

    /// Release the commitment whose path ends at `section`.
    pub fn release_at_end(&mut self, train: TrainId, section: SectionId) -> bool {
        let paths = &self.paths;
        let before = self.assignments.len();
        self.assignments.retain(|(t, _), path| {
            *t != train || paths.get(*path).and_then(DeadlockPath::end_section) != Some(section)
        });
        if !self.assignments.keys().any(|(t, _)| *t == train) {
            self.length_fit.remove(&train);
        }
        before != self.assignments.len()
    }

    pub fn waiting(&self) -> impl Iterator<Item = TrainId> + '_ {
        self.waiting.iter().copied()
    }

    pub fn is_waiting(&self, train: TrainId) -> bool {
        self.waiting.contains(&train)
    }

    pub(crate) fn restore_assignments(&mut self, assignments: &[Assignment], waiting: &[TrainId]) {
        self.assignments = assignments
            .iter()
            .filter(|a| a.path < self.paths.len())
            .map(|a| ((a.train, a.subpath), a.path))
            .collect();
        self.waiting = waiting.iter().copied().collect();
    }
}

impl Interlocking {
    /// Register a passing area. Every path start becomes a deadlock
    /// reference for the clearance fold.
    pub fn add_deadlock_area(
        &mut self,
        name: impl Into<String>,
        paths: Vec<PathSpec>,
    ) -> InterlockResult<DeadlockId> {
        let id = DeadlockId::from_usize(self.deadlocks.len());
        let mut info = DeadlockInfo::new(id, name);
        for spec in paths {
            if spec.route.is_empty() {
                return Err(InterlockError::InvalidArg {
                    what: format!("passing path '{}' is empty", spec.name),
                });
            }
            let mut length = m(0.0);
            for element in &spec.route {
                self.check_section(element.section)?;
                if let Some(l) = self.graph.length(element.section) {
                    length += l;
                }
            }
            info.add_path(DeadlockPath {
                name: spec.name,
                route: spec.route,
                length,
                allowed_trains: spec.allowed_trains,
                inverse: None,
            });
        }
        let starts: Vec<SectionId> = info.start_sections().collect();
        for start in starts {
            self.sections[start.slot()].deadlock_reference = Some(id);
        }
        self.deadlocks.push(info);
        Ok(id)
    }

    pub fn deadlock_area(&self, id: DeadlockId) -> Option<&DeadlockInfo> {
        self.deadlocks.get(id.slot())
    }

    pub fn deadlock_area_mut(&mut self, id: DeadlockId) -> Option<&mut DeadlockInfo> {
        self.deadlocks.get_mut(id.slot())
    }

    pub fn deadlock_areas(&self) -> &[DeadlockInfo] {
        &self.deadlocks
    }

    /// Paths from `start` that `train` may still be given.
    ///
    /// A train with a commitment gets only its committed path. Otherwise a
    /// path is ruled out when another train committed to it or its inverse,
    /// when the train is not allowed on it, or when its end section holds a
    /// train travelling against it.
    pub fn available_paths(&self, area: DeadlockId, start: SectionId, train: TrainId) -> Vec<usize> {
        let Some(info) = self.deadlocks.get(area.slot()) else {
            return Vec::new();
        };
        let subpath = self.trains.get(train).map(|t| t.active_subpath).unwrap_or(0);
        if let Some(committed) = info.assignment(train, subpath) {
            return vec![committed];
        }
        info.paths_from(start)
            .iter()
            .copied()
            .filter(|p| {
                let Some(path) = info.path(*p) else {
                    return false;
                };
                path.allows(train)
                    && info.excluded_by(*p, train).is_none()
                    && !self.end_opposed(path, train)
            })
            .collect()
    }

    fn end_opposed(&self, path: &DeadlockPath, train: TrainId) -> bool {
        let Some(last) = path.route.last() else {
            return false;
        };
        self.circuit_state(last.section).is_some_and(|state| {
            state
                .occupants()
                .iter()
                .any(|o| o.train.train != train && o.direction != last.direction)
        })
    }

    /// No section of the path is held by another train.
    fn path_is_free(&self, path: &DeadlockPath, train: TrainId) -> bool {
        path.route.iter().all(|element| {
            self.circuit_state(element.section).is_some_and(|state| {
                !state.has_other_trains(train)
                    && state.reserved().is_none_or(|r| r.train == train)
                    && state.claim_head().is_none_or(|c| c.train == train)
            })
        })
    }

    /// Choose and commit a path from `start` for `train`.
    ///
    /// Preference: the train's own path when it fits and is free, then the
    /// MAIN path, then any other free path, then any remaining candidate.
    /// Returns None, and records the train as waiting, when no path is left.
    pub fn select_path(&mut self, area: DeadlockId, start: SectionId, train: TrainId) -> Option<usize> {
        let candidates = self.available_paths(area, start, train);
        let (length, subpath) = self
            .trains
            .get(train)
            .map(|t| (t.length, t.active_subpath))
            .unwrap_or((m(0.0), 0));
        let info = self.deadlocks.get_mut(area.slot())?;
        if !info.length_fit.contains_key(&train) {
            info.set_train_details(train, length);
        }
        let info = self.deadlocks.get(area.slot())?;

        let usable = |p: &usize| {
            info.fits(train, *p) && info.path(*p).is_some_and(|path| self.path_is_free(path, train))
        };
        let own = info.own_path(train).filter(|p| candidates.contains(p));
        let chosen = own
            .filter(&usable)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|p| info.path(*p).is_some_and(|path| path.name == MAIN_PATH) && usable(p))
            })
            .or_else(|| candidates.iter().copied().find(&usable))
            .or(own)
            .or_else(|| candidates.first().copied());

        let info = self.deadlocks.get_mut(area.slot())?;
        match chosen {
            Some(path) => {
                info.commit(train, subpath, path);
                debug!(area = %area, train = %train, path, "passing path committed");
                Some(path)
            }
            None => {
                info.waiting.insert(train);
                debug!(area = %area, train = %train, "no passing path available");
                None
            }
        }
    }

    /// Drop a train's commitments in every area.
    pub fn release_deadlock_paths(&mut self, train: TrainId) {
        for info in self.deadlocks.iter_mut() {
            info.release_train(train);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::Id;
    use sb_graph::TrackDirection::{Ahead, Reverse};

    fn sid(i: u32) -> SectionId {
        Id::from_index(i)
    }

    fn path(name: &str, steps: &[(u32, sb_graph::TrackDirection)], length: f64) -> DeadlockPath {
        DeadlockPath {
            name: name.into(),
            route: TrackRoute::from_steps(steps.iter().map(|(s, d)| (sid(*s), *d))),
            length: m(length),
            allowed_trains: Vec::new(),
            inverse: None,
        }
    }

    fn passing_area() -> DeadlockInfo {
        let mut info = DeadlockInfo::new(Id::from_index(0), "loop");
        info.add_path(path("MAIN", &[(2, Ahead), (3, Ahead), (5, Ahead)], 660.0));
        info.add_path(path("LOOP", &[(2, Ahead), (4, Ahead), (5, Ahead)], 400.0));
        info.add_path(path("MAIN", &[(5, Reverse), (3, Reverse), (2, Reverse)], 660.0));
        info.add_path(path("LOOP", &[(5, Reverse), (4, Reverse), (2, Reverse)], 400.0));
        info
    }

    #[test]
    fn inverse_paths_are_linked() {
        let info = passing_area();
        assert_eq!(info.path(0).unwrap().inverse, Some(2));
        assert_eq!(info.path(1).unwrap().inverse, Some(3));
        assert_eq!(info.paths_from(sid(2)), &[0, 1]);
        assert_eq!(info.paths_from(sid(5)), &[2, 3]);
    }

    #[test]
    fn commitment_excludes_path_and_inverse() {
        let mut info = passing_area();
        let a = Id::from_index(1);
        let b = Id::from_index(2);
        info.commit(a, 0, 0);
        assert_eq!(info.excluded_by(0, b), Some(a));
        assert_eq!(info.excluded_by(2, b), Some(a));
        assert_eq!(info.excluded_by(1, b), None);
        assert_eq!(info.excluded_by(0, a), None);
        assert_eq!(info.committed_end_section(a, 0), Some(sid(5)));
    }

    #[test]
    fn release_at_end_only_matches_end_section() {
        let mut info = passing_area();
        let a = Id::from_index(1);
        info.commit(a, 0, 1);
        assert!(!info.release_at_end(a, sid(4)));
        assert!(info.release_at_end(a, sid(5)));
        assert_eq!(info.assignment(a, 0), None);
    }

    #[test]
    fn length_fit() {
        let mut info = passing_area();
        let a = Id::from_index(1);
        info.set_train_details(a, m(500.0));
        assert!(info.fits(a, 0));
        assert!(!info.fits(a, 1));
        assert!(info.fits(Id::from_index(9), 1));
    }

    #[test]
    fn released_train_forgets_its_length() {
        let mut info = passing_area();
        let (a, b) = (Id::from_index(1), Id::from_index(2));
        info.set_train_details(a, m(500.0));
        info.commit(a, 0, 0);
        assert!(info.release_train(a));
        assert!(info.length_fit.is_empty());

        info.set_train_details(b, m(500.0));
        info.commit(b, 0, 0);
        info.commit(b, 1, 3);
        assert!(info.release_at_end(b, sid(5)));
        assert!(!info.fits(b, 1));
        assert!(info.release_at_end(b, sid(2)));
        assert!(info.fits(b, 1));
        assert!(info.length_fit.is_empty());
    }
}
