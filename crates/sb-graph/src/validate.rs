//! Track validation logic.

use std::collections::HashSet;

use sb_core::{SbResult, ensure_non_negative};

use crate::error::GraphError;
use crate::graph::{SectionKind, TrackDirection, TrackSection};

/// Validate per-section properties: ids, names, lengths and pin counts per kind.
pub(crate) fn validate_sections(sections: &[TrackSection]) -> SbResult<()> {
    let mut names = HashSet::new();
    for (i, section) in sections.iter().enumerate() {
        if section.id.slot() != i {
            return Err(GraphError::UnknownSection {
                section: section.id,
            }
            .into());
        }

        if !names.insert(section.name.as_str()) {
            return Err(GraphError::DuplicateName {
                name: section.name.clone(),
            }
            .into());
        }

        ensure_non_negative(section.length.value, "section length").map_err(|_| {
            GraphError::InvalidLength {
                section: section.id,
            }
        })?;

        let ahead = section.exit_count(TrackDirection::Ahead);
        let reverse = section.exit_count(TrackDirection::Reverse);
        let mismatch = |reason| GraphError::KindMismatch {
            section: section.id,
            kind: section.kind,
            reason,
        };

        match section.kind {
            SectionKind::Normal => {
                if ahead > 1 || reverse > 1 {
                    return Err(mismatch("plain track has at most one exit per end").into());
                }
            }
            SectionKind::Junction => {
                let split = (ahead == 2 && reverse == 1) || (ahead == 1 && reverse == 2);
                if !split {
                    return Err(
                        mismatch("points need two exits at one end and one at the other").into(),
                    );
                }
            }
            SectionKind::Crossover => {
                if ahead != 2 || reverse != 2 {
                    return Err(mismatch("crossover needs two exits at both ends").into());
                }
            }
            SectionKind::EndOfTrack => {
                if ahead > 1 || reverse > 1 || (ahead == 1 && reverse == 1) {
                    return Err(mismatch("end of track must have one open end").into());
                }
            }
        }
    }
    Ok(())
}

/// Validate that every pin points at an existing section that links back.
pub(crate) fn validate_links(sections: &[TrackSection]) -> SbResult<()> {
    for section in sections {
        for direction in TrackDirection::BOTH {
            for pin in section.exits(direction) {
                let Some(target) = sections.get(pin.link.slot()) else {
                    return Err(GraphError::InvalidLink {
                        section: section.id,
                        link: pin.link,
                    }
                    .into());
                };

                // Arriving at `target` in pin.direction, the way back leaves
                // target in the reverse direction and must enter this section
                // travelling opposite to `direction`.
                let back = target
                    .exits(pin.direction.reverse())
                    .any(|p| p.link == section.id && p.direction == direction.reverse());
                if !back {
                    return Err(GraphError::NonReciprocalLink {
                        from: section.id,
                        to: pin.link,
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Pin;
    use sb_core::{Id, m};

    fn plain(index: u32, name: &str) -> TrackSection {
        TrackSection {
            id: Id::from_index(index),
            name: name.into(),
            kind: SectionKind::Normal,
            length: m(100.0),
            pins: [[None, None], [None, None]],
        }
    }

    #[test]
    fn one_way_link_rejected() {
        let mut a = plain(0, "A");
        let b = plain(1, "B");
        a.pins[0][0] = Some(Pin {
            link: Id::from_index(1),
            direction: TrackDirection::Ahead,
        });
        let err = validate_links(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("no link back"));
    }

    #[test]
    fn dangling_link_rejected() {
        let mut a = plain(0, "A");
        a.pins[1][0] = Some(Pin {
            link: Id::from_index(5),
            direction: TrackDirection::Reverse,
        });
        assert!(validate_links(&[a]).is_err());
    }

    #[test]
    fn junction_needs_a_split_end() {
        let mut j = plain(0, "J");
        j.kind = SectionKind::Junction;
        assert!(validate_sections(&[j]).is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let a = plain(0, "A");
        let b = plain(1, "A");
        assert!(validate_sections(&[a, b]).is_err());
    }

    #[test]
    fn negative_length_rejected() {
        let mut a = plain(0, "A");
        a.length = m(-1.0);
        assert!(validate_sections(&[a]).is_err());
    }
}
