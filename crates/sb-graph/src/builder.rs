//! Incremental track builder.

use sb_core::{Length, SbResult, SectionId};

use crate::error::GraphError;
use crate::graph::{Pin, SectionKind, TrackDirection, TrackGraph, TrackSection};
use crate::validate;

/// Builder for constructing a track graph incrementally.
///
/// Use `add_section` and `connect` to lay out the track,
/// then call `build()` to validate and freeze it into an immutable `TrackGraph`.
#[derive(Debug, Default)]
pub struct TrackBuilder {
    sections: Vec<TrackSection>,
}

impl TrackBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section and return its ID.
    pub fn add_section(
        &mut self,
        name: impl Into<String>,
        kind: SectionKind,
        length: Length,
    ) -> SectionId {
        let id = SectionId::from_usize(self.sections.len());
        self.sections.push(TrackSection {
            id,
            name: name.into(),
            kind,
            length,
            pins: [[None, None], [None, None]],
        });
        id
    }

    /// Connect two sections.
    ///
    /// Leaving `from` in `from_dir` enters `to` travelling `to_dir`; the
    /// reverse link is added on `to` automatically. Each call uses the first
    /// free pin slot at the relevant end, so the main route of a junction is
    /// the one connected first.
    pub fn connect(
        &mut self,
        from: SectionId,
        from_dir: TrackDirection,
        to: SectionId,
        to_dir: TrackDirection,
    ) -> SbResult<()> {
        for id in [from, to] {
            if id.slot() >= self.sections.len() {
                return Err(GraphError::UnknownSection { section: id }.into());
            }
        }

        let forward_slot = self.free_slot(from, from_dir)?;
        let back_dir = to_dir.reverse();
        let back_slot = self.free_slot(to, back_dir)?;

        self.sections[from.slot()].pins[from_dir.index()][forward_slot] = Some(Pin {
            link: to,
            direction: to_dir,
        });
        self.sections[to.slot()].pins[back_dir.index()][back_slot] = Some(Pin {
            link: from,
            direction: from_dir.reverse(),
        });
        Ok(())
    }

    /// Rename a section (useful for post-construction adjustments).
    pub fn rename_section(&mut self, id: SectionId, new_name: impl Into<String>) {
        if let Some(section) = self.sections.get_mut(id.slot()) {
            section.name = new_name.into();
        }
    }

    /// Number of sections added so far.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Build and validate the graph, returning an immutable `TrackGraph`.
    pub fn build(self) -> SbResult<TrackGraph> {
        validate::validate_sections(&self.sections)?;
        validate::validate_links(&self.sections)?;
        Ok(TrackGraph {
            sections: self.sections,
        })
    }

    fn free_slot(&self, id: SectionId, direction: TrackDirection) -> SbResult<usize> {
        let section = &self.sections[id.slot()];
        let capacity = if section.kind.is_switchable() { 2 } else { 1 };
        section.pins[direction.index()][..capacity]
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                GraphError::NoFreePin {
                    section: id,
                    direction,
                }
                .into()
            })
    }
}
