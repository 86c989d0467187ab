//! Routes: ordered section + direction sequences.

use std::ops::Deref;

use sb_core::{SectionId, TrainId};
use sb_graph::TrackDirection;
use serde::{Deserialize, Serialize};

/// A train together with the route direction it is currently using.
///
/// Trains keep one route per direction of travel; `route_index` selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutedTrain {
    pub train: TrainId,
    pub route_index: usize,
}

impl RoutedTrain {
    pub fn new(train: TrainId, route_index: usize) -> Self {
        Self { train, route_index }
    }

    /// Same physical train, regardless of route direction.
    pub fn is_same_train(&self, other: RoutedTrain) -> bool {
        self.train == other.train
    }
}

/// Marks a route element where an alternative path may be taken instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeStart {
    /// Index into the train's alternative paths.
    pub path: usize,
    /// Section where the alternative rejoins the route.
    pub end_section: SectionId,
}

/// One step of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteElement {
    pub section: SectionId,
    pub direction: TrackDirection,
    /// Start of an alternative path (path-based passing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<AlternativeStart>,
    /// Facing points that split into a passing area.
    #[serde(default)]
    pub facing_point: bool,
    /// Passing-area path already chosen here (location-based passing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_alternative_path: Option<usize>,
}

impl RouteElement {
    pub fn new(section: SectionId, direction: TrackDirection) -> Self {
        Self {
            section,
            direction,
            alternative: None,
            facing_point: false,
            used_alternative_path: None,
        }
    }
}

/// Ordered route of elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRoute {
    elements: Vec<RouteElement>,
}

impl TrackRoute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plain route from section/direction pairs.
    pub fn from_steps(steps: impl IntoIterator<Item = (SectionId, TrackDirection)>) -> Self {
        Self {
            elements: steps
                .into_iter()
                .map(|(section, direction)| RouteElement::new(section, direction))
                .collect(),
        }
    }

    pub fn push(&mut self, element: RouteElement) {
        self.elements.push(element);
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RouteElement> {
        self.elements.get_mut(index)
    }

    /// Index of `section` at or after `start`.
    pub fn index_of(&self, section: SectionId, start: usize) -> Option<usize> {
        self.elements
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, e)| e.section == section)
            .map(|(i, _)| i)
    }

    pub fn contains_section(&self, section: SectionId) -> bool {
        self.index_of(section, 0).is_some()
    }

    /// Replace `range` (inclusive) with `replacement`.
    pub fn splice(&mut self, first: usize, last: usize, replacement: &[RouteElement]) {
        let last = last.min(self.elements.len().saturating_sub(1));
        if first > last {
            return;
        }
        self.elements
            .splice(first..=last, replacement.iter().cloned());
    }

    /// Section ids in route order.
    pub fn sections(&self) -> impl Iterator<Item = SectionId> + '_ {
        self.elements.iter().map(|e| e.section)
    }
}

impl Deref for TrackRoute {
    type Target = [RouteElement];

    fn deref(&self) -> &Self::Target {
        &self.elements
    }
}

impl FromIterator<RouteElement> for TrackRoute {
    fn from_iter<T: IntoIterator<Item = RouteElement>>(iter: T) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TrackRoute {
    type Item = &'a RouteElement;
    type IntoIter = std::slice::Iter<'a, RouteElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::Id;

    fn route(sections: &[u32]) -> TrackRoute {
        TrackRoute::from_steps(
            sections
                .iter()
                .map(|&i| (Id::from_index(i), TrackDirection::Ahead)),
        )
    }

    #[test]
    fn index_of_respects_start() {
        let r = route(&[1, 2, 3, 2]);
        assert_eq!(r.index_of(Id::from_index(2), 0), Some(1));
        assert_eq!(r.index_of(Id::from_index(2), 2), Some(3));
        assert_eq!(r.index_of(Id::from_index(9), 0), None);
    }

    #[test]
    fn splice_replaces_inclusive_range() {
        let mut r = route(&[1, 2, 3, 4]);
        let replacement = route(&[2, 7, 4]);
        r.splice(1, 3, &replacement);
        let sections: Vec<u32> = r.sections().map(|s| s.index()).collect();
        assert_eq!(sections, vec![1, 2, 7, 4]);
    }

    #[test]
    fn routed_train_identity() {
        let a = RoutedTrain::new(Id::from_index(1), 0);
        let b = RoutedTrain::new(Id::from_index(1), 1);
        assert!(a.is_same_train(b));
        assert_ne!(a, b);
    }
}
