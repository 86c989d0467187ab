//! Core track circuit data structures.

use sb_core::{Length, SectionId};

/// Direction of travel through a section.
///
/// Every section has two ends; travelling `Ahead` leaves through the end
/// whose exits are stored in `pins[0]`, travelling `Reverse` through `pins[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackDirection {
    Ahead,
    Reverse,
}

impl TrackDirection {
    /// Both directions, in index order.
    pub const BOTH: [TrackDirection; 2] = [TrackDirection::Ahead, TrackDirection::Reverse];

    /// Index into per-direction arrays.
    pub fn index(self) -> usize {
        match self {
            TrackDirection::Ahead => 0,
            TrackDirection::Reverse => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            TrackDirection::Ahead
        } else {
            TrackDirection::Reverse
        }
    }

    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            TrackDirection::Ahead => TrackDirection::Reverse,
            TrackDirection::Reverse => TrackDirection::Ahead,
        }
    }
}

/// Kind of track circuit section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SectionKind {
    /// Plain track: at most one neighbour at each end.
    Normal,
    /// Points: one end splits into two routes.
    Junction,
    /// Diamond crossing: two independent routes through the same section.
    Crossover,
    /// Buffer stop or edge of the modelled network.
    EndOfTrack,
}

impl SectionKind {
    /// Junctions and crossovers carry a route selection.
    pub fn is_switchable(self) -> bool {
        matches!(self, SectionKind::Junction | SectionKind::Crossover)
    }
}

/// One exit from a section end: the neighbour and the direction of travel
/// on entering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pin {
    pub link: SectionId,
    pub direction: TrackDirection,
}

/// The exits of one section end. Slot 1 is only used by junctions and crossovers.
pub type PinPair = [Option<Pin>; 2];

/// A fixed-length unit of track used for occupancy and reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSection {
    pub id: SectionId,
    pub name: String,
    pub kind: SectionKind,
    pub length: Length,
    /// `pins[d]` holds the exits taken when leaving in direction `d`.
    pub pins: [PinPair; 2],
}

impl TrackSection {
    /// Exits for a direction of travel.
    pub fn exits(&self, direction: TrackDirection) -> impl Iterator<Item = Pin> + '_ {
        self.pins[direction.index()].iter().flatten().copied()
    }

    /// Number of exits at the end left in `direction`.
    pub fn exit_count(&self, direction: TrackDirection) -> usize {
        self.exits(direction).count()
    }

    /// True when leaving in `direction` requires a route choice (facing points).
    pub fn is_facing(&self, direction: TrackDirection) -> bool {
        self.kind.is_switchable() && self.exit_count(direction) > 1
    }

    /// Slot of the exit in `direction` that leads to `section`, if any.
    pub fn exit_slot(&self, direction: TrackDirection, section: SectionId) -> Option<usize> {
        self.pins[direction.index()]
            .iter()
            .position(|p| p.is_some_and(|p| p.link == section))
    }

    /// Slot of the entry used when arriving from `section` while travelling in `direction`.
    pub fn entry_slot(&self, direction: TrackDirection, section: SectionId) -> Option<usize> {
        self.exit_slot(direction.reverse(), section)
    }
}

/// The track graph: a validated, immutable collection of sections.
///
/// Sections are stored in a vector indexed by their IDs; all cross references
/// are plain [`SectionId`]s.
#[derive(Debug, Clone)]
pub struct TrackGraph {
    pub(crate) sections: Vec<TrackSection>,
}

impl TrackGraph {
    /// Return all sections.
    pub fn sections(&self) -> &[TrackSection] {
        &self.sections
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Get a section by ID (returns None if ID out of bounds).
    pub fn section(&self, id: SectionId) -> Option<&TrackSection> {
        self.sections.get(id.slot())
    }

    /// Find a section by name.
    pub fn find(&self, name: &str) -> Option<SectionId> {
        self.sections.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// The single static exit in `direction`.
    ///
    /// Returns None at a track end and at facing points, where the exit
    /// depends on the current alignment.
    pub fn next(&self, id: SectionId, direction: TrackDirection) -> Option<Pin> {
        let section = self.section(id)?;
        if section.exit_count(direction) != 1 {
            return None;
        }
        section.exits(direction).next()
    }

    /// Kind of a section, if it exists.
    pub fn kind(&self, id: SectionId) -> Option<SectionKind> {
        self.section(id).map(|s| s.kind)
    }

    /// Length of a section, if it exists.
    pub fn length(&self, id: SectionId) -> Option<Length> {
        self.section(id).map(|s| s.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::{Id, m};

    fn junction() -> TrackSection {
        TrackSection {
            id: Id::from_index(0),
            name: "J1".into(),
            kind: SectionKind::Junction,
            length: m(40.0),
            pins: [
                [
                    Some(Pin {
                        link: Id::from_index(1),
                        direction: TrackDirection::Ahead,
                    }),
                    Some(Pin {
                        link: Id::from_index(2),
                        direction: TrackDirection::Ahead,
                    }),
                ],
                [
                    Some(Pin {
                        link: Id::from_index(3),
                        direction: TrackDirection::Reverse,
                    }),
                    None,
                ],
            ],
        }
    }

    #[test]
    fn direction_helpers() {
        assert_eq!(TrackDirection::Ahead.reverse(), TrackDirection::Reverse);
        assert_eq!(TrackDirection::from_index(1), TrackDirection::Reverse);
        assert_eq!(TrackDirection::Reverse.index(), 1);
    }

    #[test]
    fn junction_facing_and_slots() {
        let j = junction();
        assert!(j.is_facing(TrackDirection::Ahead));
        assert!(!j.is_facing(TrackDirection::Reverse));
        assert_eq!(j.exit_slot(TrackDirection::Ahead, Id::from_index(2)), Some(1));
        assert_eq!(j.entry_slot(TrackDirection::Ahead, Id::from_index(3)), Some(0));
        assert_eq!(j.exit_slot(TrackDirection::Ahead, Id::from_index(3)), None);
    }
}
