//! Signal placement index: which signals stand where, per section,
//! direction and function.

use std::collections::BTreeMap;

use sb_core::{Length, SectionId, SignalId};
use sb_graph::TrackDirection;

use crate::aspect::SignalFunction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub signal: SignalId,
    pub offset: Length,
}

#[derive(Debug, Clone, Default)]
struct SectionPlacements {
    by_function: [BTreeMap<SignalFunction, Vec<Placement>>; 2],
    end_signals: [Option<SignalId>; 2],
}

/// Per-section lists of signals ordered by offset, plus the NORMAL signal
/// at the far end of each section in each direction.
#[derive(Debug, Clone, Default)]
pub struct SignalPlacements {
    sections: Vec<SectionPlacements>,
}

impl SignalPlacements {
    pub fn new(section_count: usize) -> Self {
        Self {
            sections: vec![SectionPlacements::default(); section_count],
        }
    }

    /// Register a signal for every function it carries.
    pub fn insert(
        &mut self,
        section: SectionId,
        direction: TrackDirection,
        signal: SignalId,
        offset: Length,
        functions: impl IntoIterator<Item = SignalFunction>,
    ) {
        let Some(entry) = self.sections.get_mut(section.slot()) else {
            return;
        };
        for function in functions {
            let list = entry.by_function[direction.index()]
                .entry(function)
                .or_default();
            if list.iter().any(|p| p.signal == signal) {
                continue;
            }
            list.push(Placement { signal, offset });
            list.sort_by(|a, b| a.offset.value.total_cmp(&b.offset.value));
        }
    }

    pub fn set_end_signal(&mut self, section: SectionId, direction: TrackDirection, signal: SignalId) {
        if let Some(entry) = self.sections.get_mut(section.slot()) {
            entry.end_signals[direction.index()] = Some(signal);
        }
    }

    /// NORMAL signal protecting the exit of `section` in `direction`.
    pub fn end_signal(&self, section: SectionId, direction: TrackDirection) -> Option<SignalId> {
        self.sections
            .get(section.slot())
            .and_then(|s| s.end_signals[direction.index()])
    }

    /// Signals of `function` on `section` in `direction`, nearest first.
    pub fn signals(
        &self,
        section: SectionId,
        direction: TrackDirection,
        function: SignalFunction,
    ) -> &[Placement] {
        self.sections
            .get(section.slot())
            .and_then(|s| s.by_function[direction.index()].get(&function))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every signal placed on `section` in `direction`, any function.
    pub fn all_signals(
        &self,
        section: SectionId,
        direction: TrackDirection,
    ) -> impl Iterator<Item = SignalId> + '_ {
        let mut seen: Vec<SignalId> = Vec::new();
        if let Some(s) = self.sections.get(section.slot()) {
            for list in s.by_function[direction.index()].values() {
                for p in list {
                    if !seen.contains(&p.signal) {
                        seen.push(p.signal);
                    }
                }
            }
        }
        seen.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::{Id, m};

    #[test]
    fn placements_sorted_by_offset() {
        let mut placements = SignalPlacements::new(2);
        let section = Id::from_index(1);
        placements.insert(
            section,
            TrackDirection::Ahead,
            Id::from_index(5),
            m(300.0),
            [SignalFunction::Speed],
        );
        placements.insert(
            section,
            TrackDirection::Ahead,
            Id::from_index(4),
            m(100.0),
            [SignalFunction::Speed, SignalFunction::Info],
        );
        let speed = placements.signals(section, TrackDirection::Ahead, SignalFunction::Speed);
        assert_eq!(speed.len(), 2);
        assert_eq!(speed[0].signal, Id::from_index(4));
        assert!(
            placements
                .signals(section, TrackDirection::Reverse, SignalFunction::Speed)
                .is_empty()
        );
        assert_eq!(placements.all_signals(section, TrackDirection::Ahead).count(), 2);
    }

    #[test]
    fn end_signal_lookup() {
        let mut placements = SignalPlacements::new(1);
        let section = Id::from_index(0);
        placements.set_end_signal(section, TrackDirection::Reverse, Id::from_index(2));
        assert_eq!(
            placements.end_signal(section, TrackDirection::Reverse),
            Some(Id::from_index(2))
        );
        assert_eq!(placements.end_signal(section, TrackDirection::Ahead), None);
        assert_eq!(placements.end_signal(Id::from_index(9), TrackDirection::Ahead), None);
    }
}
