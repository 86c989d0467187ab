//! Compile a layout definition into an interlocking.
//!
//! Items with dangling references or placements the interlocking refuses are
//! dropped with a warning; the rest of the layout still loads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sb_core::{SectionId, TrainId, m, mps};
use sb_graph::TrackBuilder;
use sb_interlock::{
    ApproachControlLimits, Aspect, AspectEntry, HeadSpec, Interlocking, PathSpec, SignalFunction,
    SignalSpec, SignalType, SpeedInfo, TrackRoute,
};
use tracing::{debug, warn};

use crate::ProjectResult;
use crate::fingerprint::layout_fingerprint;
use crate::schema::{Layout, SignalDef, SignalTypeDef, StepDef};

/// What kind of layout item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroppedKind {
    Link,
    SignalType,
    Signal,
    PassingArea,
}

impl fmt::Display for DroppedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DroppedKind::Link => "link",
            DroppedKind::SignalType => "signal type",
            DroppedKind::Signal => "signal",
            DroppedKind::PassingArea => "passing area",
        };
        f.write_str(label)
    }
}

/// A layout item left out of the interlocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub kind: DroppedKind,
    pub name: String,
    pub reason: String,
}

/// Result of compiling a layout. The interlocking is not yet commissioned,
/// so head extensions can still be registered.
#[derive(Debug)]
pub struct CompiledLayout {
    pub interlocking: Interlocking,
    pub dropped: Vec<Dropped>,
    pub fingerprint: String,
}

struct Compiler {
    dropped: Vec<Dropped>,
}

impl Compiler {
    fn drop_item(&mut self, kind: DroppedKind, name: impl Into<String>, reason: impl Into<String>) {
        let dropped = Dropped {
            kind,
            name: name.into(),
            reason: reason.into(),
        };
        warn!(kind = %dropped.kind, name = %dropped.name, reason = %dropped.reason, "layout item dropped");
        self.dropped.push(dropped);
    }
}

pub fn compile(layout: &Layout) -> ProjectResult<CompiledLayout> {
    let mut compiler = Compiler { dropped: Vec::new() };

    let mut builder = TrackBuilder::new();
    let mut sections: BTreeMap<&str, SectionId> = BTreeMap::new();
    for def in &layout.sections {
        let id = builder.add_section(def.name.as_str(), def.kind, m(def.length_m));
        sections.insert(def.name.as_str(), id);
    }
    for link in &layout.links {
        let label = format!("{} -> {}", link.from, link.to);
        let (Some(from), Some(to)) = (
            sections.get(link.from.as_str()),
            sections.get(link.to.as_str()),
        ) else {
            compiler.drop_item(DroppedKind::Link, label, "unknown section");
            continue;
        };
        if let Err(e) = builder.connect(*from, link.from_dir, *to, link.to_dir) {
            compiler.drop_item(DroppedKind::Link, label, e.to_string());
        }
    }
    let graph = builder.build()?;

    let mut interlocking = Interlocking::new(graph, layout.options);

    let mut types: BTreeMap<&str, Arc<SignalType>> = BTreeMap::new();
    for def in &layout.signal_types {
        match signal_type(&mut interlocking, def) {
            Ok(t) => {
                types.insert(def.name.as_str(), Arc::new(t));
            }
            Err(reason) => compiler.drop_item(DroppedKind::SignalType, def.name.as_str(), reason),
        }
    }

    for def in &layout.signals {
        let spec = match signal_spec(&mut interlocking, &sections, &types, def) {
            Ok(spec) => spec,
            Err(reason) => {
                compiler.drop_item(DroppedKind::Signal, def.name.as_str(), reason);
                continue;
            }
        };
        if let Err(e) = interlocking.add_signal(spec) {
            compiler.drop_item(DroppedKind::Signal, def.name.as_str(), e.to_string());
        }
    }

    for area in &layout.passing_areas {
        let paths: Result<Vec<PathSpec>, String> = area
            .paths
            .iter()
            .map(|p| {
                Ok(PathSpec {
                    name: p.name.clone(),
                    route: route(&sections, &p.route)?,
                    allowed_trains: p.allowed_trains.iter().map(|t| TrainId::from_index(*t)).collect(),
                })
            })
            .collect();
        let result = paths.and_then(|paths| {
            interlocking
                .add_deadlock_area(area.name.as_str(), paths)
                .map_err(|e| e.to_string())
        });
        if let Err(reason) = result {
            compiler.drop_item(DroppedKind::PassingArea, area.name.as_str(), reason);
        }
    }

    debug!(
        layout = %layout.name,
        sections = layout.sections.len(),
        signals = interlocking.signals().len(),
        dropped = compiler.dropped.len(),
        "layout compiled"
    );
    Ok(CompiledLayout {
        interlocking,
        dropped: compiler.dropped,
        fingerprint: layout_fingerprint(layout),
    })
}

/// Resolve a list of steps against the section names.
pub(crate) fn route(sections: &BTreeMap<&str, SectionId>, steps: &[StepDef]) -> Result<TrackRoute, String> {
    let resolved = steps
        .iter()
        .map(|step| {
            sections
                .get(step.section.as_str())
                .map(|id| (*id, step.direction))
                .ok_or_else(|| format!("unknown section '{}'", step.section))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TrackRoute::from_steps(resolved))
}

fn signal_type(il: &mut Interlocking, def: &SignalTypeDef) -> Result<SignalType, String> {
    if def.aspects.is_empty() {
        return Err("no aspects".to_string());
    }
    let function = il.function_names_mut().resolve(&def.function);
    let aspects = def
        .aspects
        .iter()
        .map(|entry| {
            let aspect = Aspect::from_name(&entry.aspect)
                .ok_or_else(|| format!("unknown aspect '{}'", entry.aspect))?;
            Ok(AspectEntry {
                aspect,
                draw_state: entry.draw_state,
                speed: entry.speed.as_ref().map(|s| SpeedInfo {
                    passenger: s.passenger_mps.map(mps),
                    freight: s.freight_mps.map(mps),
                    asap: s.asap,
                    reset: s.reset,
                }),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(SignalType {
        name: def.name.clone(),
        function,
        normal_subtype: def.normal_subtype.clone(),
        aspects,
        clear_ahead: def.clear_ahead,
        clear_ahead_heads: def.clear_ahead_heads,
        semaphore: def.semaphore,
        approach_control: def.approach_control.as_ref().map(|a| ApproachControlLimits {
            position: m(a.position_m),
            speed: a.speed_mps.map(mps),
        }),
    })
}

fn signal_spec(
    il: &mut Interlocking,
    sections: &BTreeMap<&str, SectionId>,
    types: &BTreeMap<&str, Arc<SignalType>>,
    def: &SignalDef,
) -> Result<SignalSpec, String> {
    let section = *sections
        .get(def.section.as_str())
        .ok_or_else(|| format!("unknown section '{}'", def.section))?;
    let offset = match def.offset_m {
        Some(offset) => m(offset),
        None => il
            .graph()
            .length(section)
            .ok_or_else(|| format!("unknown section '{}'", def.section))?,
    };
    if def.heads.is_empty() {
        return Err("no heads".to_string());
    }
    let mut heads = Vec::with_capacity(def.heads.len());
    for head in &def.heads {
        let signal_type = match &head.signal_type {
            Some(name) => Some(
                types
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| format!("unknown signal type '{name}'"))?,
            ),
            None => None,
        };
        let function = match (&head.function, &signal_type) {
            (Some(name), _) => il.function_names_mut().resolve(name),
            (None, Some(t)) => t.function,
            (None, None) => SignalFunction::Normal,
        };
        heads.push(HeadSpec {
            function,
            signal_type,
        });
    }
    Ok(SignalSpec {
        name: def.name.clone(),
        kind: def.kind,
        section,
        direction: def.direction,
        offset,
        heads,
        allow_part_route: def.allow_part_route,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use sb_graph::{SectionKind, TrackDirection};
    use sb_interlock::{InterlockConfig, SignalKind};

    fn section(name: &str, kind: SectionKind, length_m: f64) -> SectionDef {
        SectionDef {
            name: name.to_string(),
            kind,
            length_m,
        }
    }

    fn link(from: &str, to: &str) -> LinkDef {
        LinkDef {
            from: from.to_string(),
            from_dir: TrackDirection::Ahead,
            to: to.to_string(),
            to_dir: TrackDirection::Ahead,
        }
    }

    fn signal(name: &str, section: &str, signal_type: Option<&str>) -> SignalDef {
        SignalDef {
            name: name.to_string(),
            kind: SignalKind::Signal,
            section: section.to_string(),
            direction: TrackDirection::Ahead,
            offset_m: None,
            heads: vec![HeadDef {
                signal_type: signal_type.map(str::to_string),
                function: None,
            }],
            allow_part_route: false,
        }
    }

    fn layout() -> Layout {
        Layout {
            version: LAYOUT_VERSION,
            name: "line".to_string(),
            options: InterlockConfig::default(),
            sections: vec![
                section("A", SectionKind::EndOfTrack, 100.0),
                section("B", SectionKind::Normal, 400.0),
                section("C", SectionKind::EndOfTrack, 100.0),
            ],
            links: vec![link("A", "B"), link("B", "C")],
            signal_types: vec![SignalTypeDef {
                name: "home".to_string(),
                function: "NORMAL".to_string(),
                normal_subtype: None,
                aspects: vec![
                    AspectDef {
                        aspect: "STOP".to_string(),
                        draw_state: 0,
                        speed: None,
                    },
                    AspectDef {
                        aspect: "CLEAR_2".to_string(),
                        draw_state: 1,
                        speed: None,
                    },
                ],
                clear_ahead: None,
                clear_ahead_heads: None,
                semaphore: false,
                approach_control: None,
            }],
            signals: vec![signal("S1", "A", Some("home")), signal("S2", "B", None)],
            passing_areas: vec![],
        }
    }

    #[test]
    fn compiles_sections_and_signals() {
        let compiled = compile(&layout()).unwrap();
        assert!(compiled.dropped.is_empty());
        let il = &compiled.interlocking;
        assert_eq!(il.graph().len(), 3);
        assert_eq!(il.signals().len(), 2);
        let s1 = il.find_signal("S1").unwrap();
        let head = &il.signal(s1).unwrap().heads[0];
        assert_eq!(head.signal_type.as_ref().map(|t| t.name.as_str()), Some("home"));
        assert!(!il.is_commissioned());
    }

    #[test]
    fn drops_signal_with_unknown_type() {
        let mut l = layout();
        l.signals.push(signal("S3", "B", Some("missing")));
        let compiled = compile(&l).unwrap();
        assert_eq!(compiled.dropped.len(), 1);
        assert_eq!(compiled.dropped[0].kind, DroppedKind::Signal);
        assert_eq!(compiled.dropped[0].name, "S3");
        assert_eq!(compiled.interlocking.signals().len(), 2);
    }

    #[test]
    fn drops_signal_on_unknown_section() {
        let mut l = layout();
        l.signals.push(signal("S3", "Z", None));
        let compiled = compile(&l).unwrap();
        assert_eq!(compiled.dropped[0].kind, DroppedKind::Signal);
        assert!(compiled.dropped[0].reason.contains("'Z'"));
    }

    #[test]
    fn drops_type_with_unknown_aspect() {
        let mut l = layout();
        l.signal_types[0].aspects[1].aspect = "GREEN".to_string();
        let compiled = compile(&l).unwrap();
        let kinds: Vec<DroppedKind> = compiled.dropped.iter().map(|d| d.kind).collect();
        // the type goes, and S1 with it
        assert_eq!(kinds, vec![DroppedKind::SignalType, DroppedKind::Signal]);
    }

    #[test]
    fn second_signal_on_same_exit_is_dropped() {
        let mut l = layout();
        l.signals.push(signal("S1b", "A", None));
        let compiled = compile(&l).unwrap();
        assert_eq!(compiled.dropped.len(), 1);
        assert_eq!(compiled.dropped[0].name, "S1b");
    }

    #[test]
    fn dangling_link_is_dropped() {
        let mut l = layout();
        l.links.push(link("C", "Q"));
        let compiled = compile(&l).unwrap();
        assert_eq!(compiled.dropped[0].kind, DroppedKind::Link);
    }
}
