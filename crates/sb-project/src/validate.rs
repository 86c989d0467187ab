//! Layout and scenario validation.
//!
//! Validation rejects files that cannot describe a layout at all: unknown
//! versions, duplicate names and non-physical numbers. Dangling references
//! are left to compilation, which drops the offending item with a warning.

use std::collections::HashSet;

use sb_core::{ensure_finite, ensure_non_negative};

use crate::schema::{ActionDef, Layout, LAYOUT_VERSION, Scenario, SignalTypeDef};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Missing reference: {name} in {context}")]
    MissingReference { name: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_layout(layout: &Layout) -> Result<(), ValidationError> {
    if layout.version == 0 || layout.version > LAYOUT_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: layout.version,
        });
    }

    let mut section_names = HashSet::new();
    for section in &layout.sections {
        if !section_names.insert(section.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: section.name.clone(),
                context: "sections".to_string(),
            });
        }
        positive(section.length_m, || format!("section '{}' length_m", section.name))?;
    }

    let mut type_names = HashSet::new();
    for signal_type in &layout.signal_types {
        if !type_names.insert(signal_type.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: signal_type.name.clone(),
                context: "signal_types".to_string(),
            });
        }
        validate_signal_type(signal_type)?;
    }

    let mut signal_names = HashSet::new();
    for signal in &layout.signals {
        if !signal_names.insert(signal.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: signal.name.clone(),
                context: "signals".to_string(),
            });
        }
        if let Some(offset) = signal.offset_m {
            non_negative(offset, || format!("signal '{}' offset_m", signal.name))?;
        }
    }

    let mut area_names = HashSet::new();
    for area in &layout.passing_areas {
        if !area_names.insert(area.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: area.name.clone(),
                context: "passing_areas".to_string(),
            });
        }
        let out_of_range = area
            .paths
            .iter()
            .flat_map(|p| &p.allowed_trains)
            .find(|t| **t == u32::MAX);
        if let Some(train) = out_of_range {
            return Err(ValidationError::InvalidValue {
                field: format!("passing area '{}' allowed_trains", area.name),
                value: train.to_string(),
                reason: "out of range".to_string(),
            });
        }
    }

    let config = &layout.options;
    non_negative(config.stationary_speed_mps, || {
        "options.stationary_speed_mps".to_string()
    })?;
    positive(config.max_check_distance_m, || {
        "options.max_check_distance_m".to_string()
    })?;

    Ok(())
}

fn validate_signal_type(signal_type: &SignalTypeDef) -> Result<(), ValidationError> {
    let mut draw_states = HashSet::new();
    for entry in &signal_type.aspects {
        if !draw_states.insert(entry.draw_state) {
            return Err(ValidationError::DuplicateName {
                name: entry.draw_state.to_string(),
                context: format!("signal type '{}' draw states", signal_type.name),
            });
        }
        let speeds = entry
            .speed
            .iter()
            .flat_map(|s| [s.passenger_mps, s.freight_mps])
            .flatten();
        for speed in speeds {
            non_negative(speed, || format!("signal type '{}' speed", signal_type.name))?;
        }
    }
    if let Some(approach) = &signal_type.approach_control {
        non_negative(approach.position_m, || {
            format!("signal type '{}' approach_control.position_m", signal_type.name)
        })?;
    }
    Ok(())
}

fn non_negative(value: f64, field: impl FnOnce() -> String) -> Result<(), ValidationError> {
    ensure_non_negative(value, "value").map_err(|_| ValidationError::InvalidValue {
        field: field(),
        value: value.to_string(),
        reason: "must be non-negative and finite".to_string(),
    })?;
    Ok(())
}

fn positive(value: f64, field: impl FnOnce() -> String) -> Result<(), ValidationError> {
    match ensure_finite(value, "value") {
        Ok(v) if v > 0.0 => Ok(()),
        _ => Err(ValidationError::InvalidValue {
            field: field(),
            value: value.to_string(),
            reason: "must be positive and finite".to_string(),
        }),
    }
}

/// Check a scenario against the layout it will run on.
///
/// Unlike layouts, scenarios are rejected on dangling references: a train
/// without its route cannot be placed.
pub fn validate_scenario(scenario: &Scenario, layout: &Layout) -> Result<(), ValidationError> {
    let sections: HashSet<&str> = layout.sections.iter().map(|s| s.name.as_str()).collect();
    let signals: HashSet<&str> = layout.signals.iter().map(|s| s.name.as_str()).collect();

    let mut train_ids = HashSet::new();
    for train in &scenario.trains {
        if !train_ids.insert(train.id) {
            return Err(ValidationError::DuplicateName {
                name: train.id.to_string(),
                context: "scenario trains".to_string(),
            });
        }
        if train.id == u32::MAX {
            return Err(ValidationError::InvalidValue {
                field: format!("train '{}' id", train.name),
                value: train.id.to_string(),
                reason: "out of range".to_string(),
            });
        }
        if train.route.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("train '{}' route", train.name),
                value: "[]".to_string(),
                reason: "a train needs at least its present section".to_string(),
            });
        }
        non_negative(train.speed_mps, || format!("train '{}' speed_mps", train.name))?;
        let section_refs = train
            .route
            .iter()
            .chain(&train.reverse_route)
            .map(|s| s.section.as_str())
            .chain(train.wait_sections.iter().map(String::as_str));
        for name in section_refs {
            if !sections.contains(name) {
                return Err(ValidationError::MissingReference {
                    name: name.to_string(),
                    context: format!("train '{}'", train.name),
                });
            }
        }
        for name in &train.holding_signals {
            if !signals.contains(name.as_str()) {
                return Err(ValidationError::MissingReference {
                    name: name.clone(),
                    context: format!("train '{}' holding_signals", train.name),
                });
            }
        }
    }

    for action in &scenario.actions {
        match action {
            ActionDef::Clear { train }
            | ActionDef::ClearNode { train }
            | ActionDef::Advance { train, .. } => {
                if !train_ids.contains(train) {
                    return Err(ValidationError::MissingReference {
                        name: train.to_string(),
                        context: "scenario actions".to_string(),
                    });
                }
            }
            ActionDef::Hold { signal, .. }
            | ActionDef::ReleaseHold { signal }
            | ActionDef::Permission { signal } => {
                if !signals.contains(signal.as_str()) {
                    return Err(ValidationError::MissingReference {
                        name: signal.clone(),
                        context: "scenario actions".to_string(),
                    });
                }
            }
            ActionDef::Tick { .. } => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use sb_graph::{SectionKind, TrackDirection};
    use sb_interlock::InterlockConfig;

    fn layout() -> Layout {
        Layout {
            version: LAYOUT_VERSION,
            name: "test".to_string(),
            options: InterlockConfig::default(),
            sections: vec![
                SectionDef {
                    name: "A".to_string(),
                    kind: SectionKind::EndOfTrack,
                    length_m: 100.0,
                },
                SectionDef {
                    name: "B".to_string(),
                    kind: SectionKind::EndOfTrack,
                    length_m: 100.0,
                },
            ],
            links: vec![LinkDef {
                from: "A".to_string(),
                from_dir: TrackDirection::Ahead,
                to: "B".to_string(),
                to_dir: TrackDirection::Ahead,
            }],
            signal_types: vec![],
            signals: vec![],
            passing_areas: vec![],
        }
    }

    #[test]
    fn accepts_minimal_layout() {
        validate_layout(&layout()).unwrap();
    }

    #[test]
    fn rejects_future_version() {
        let mut l = layout();
        l.version = LAYOUT_VERSION + 1;
        assert!(matches!(
            validate_layout(&l),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_section() {
        let mut l = layout();
        l.sections[1].name = "A".to_string();
        assert!(matches!(
            validate_layout(&l),
            Err(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn rejects_zero_length() {
        let mut l = layout();
        l.sections[0].length_m = 0.0;
        assert!(matches!(
            validate_layout(&l),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_nan_length_and_check_distance() {
        let mut l = layout();
        l.sections[1].length_m = f64::NAN;
        assert!(matches!(
            validate_layout(&l),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "section 'B' length_m"
        ));

        let mut l = layout();
        l.options.max_check_distance_m = f64::INFINITY;
        assert!(matches!(
            validate_layout(&l),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "options.max_check_distance_m"
        ));
    }

    #[test]
    fn rejects_nan_train_speed() {
        let scenario = Scenario {
            trains: vec![TrainDef {
                id: 1,
                name: "T1".to_string(),
                mode: Default::default(),
                speed_mps: f64::NAN,
                route: vec![StepDef {
                    section: "A".to_string(),
                    direction: TrackDirection::Ahead,
                }],
                reverse_route: vec![],
                holding_signals: vec![],
                wait_sections: vec![],
            }],
            actions: vec![],
        };
        let err = validate_scenario(&scenario, &layout()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref reason, .. } if reason.contains("finite")));
    }

    #[test]
    fn scenario_needs_known_sections() {
        let scenario = Scenario {
            trains: vec![TrainDef {
                id: 1,
                name: "T1".to_string(),
                mode: Default::default(),
                speed_mps: 0.0,
                route: vec![StepDef {
                    section: "Z".to_string(),
                    direction: TrackDirection::Ahead,
                }],
                reverse_route: vec![],
                holding_signals: vec![],
                wait_sections: vec![],
            }],
            actions: vec![],
        };
        assert!(matches!(
            validate_scenario(&scenario, &layout()),
            Err(ValidationError::MissingReference { .. })
        ));
    }

    #[test]
    fn scenario_actions_need_known_trains() {
        let scenario = Scenario {
            trains: vec![],
            actions: vec![ActionDef::Clear { train: 4 }],
        };
        assert!(matches!(
            validate_scenario(&scenario, &layout()),
            Err(ValidationError::MissingReference { .. })
        ));
    }
}
