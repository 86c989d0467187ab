//! Drive an interlocking from a scenario definition.

use std::collections::BTreeMap;
use std::fmt;

use sb_core::{SectionId, SignalId, TrainId, mps};
use sb_interlock::{Interlocking, NodeClearance, Permission, TickReport, Train};
use tracing::info;

use crate::compile::route;
use crate::schema::{ActionDef, Scenario, StepDef};
use crate::{ProjectError, ProjectResult};

/// What one scenario action did.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Cleared { train: TrainId, clear: bool },
    Node { train: TrainId, clearance: NodeClearance },
    Advanced { train: TrainId, passed: Vec<SignalId> },
    HoldSet { signal: SignalId },
    HoldReleased { signal: SignalId },
    Permission { signal: SignalId, permission: Permission },
    Ticked(TickReport),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Cleared { train, clear } => {
                write!(f, "train {train}: clearance {}", if *clear { "given" } else { "refused" })
            }
            ActionOutcome::Node { train, clearance } => write!(
                f,
                "train {train}: node authority {:?} after {:.0} m",
                clearance.end_authority,
                sb_core::meters(clearance.distance)
            ),
            ActionOutcome::Advanced { train, passed } => {
                write!(f, "train {train}: advanced, passed {} signal(s)", passed.len())
            }
            ActionOutcome::HoldSet { signal } => write!(f, "signal {signal}: hold set"),
            ActionOutcome::HoldReleased { signal } => write!(f, "signal {signal}: hold released"),
            ActionOutcome::Permission { signal, permission } => {
                write!(f, "signal {signal}: permission {permission:?}")
            }
            ActionOutcome::Ticked(report) => write!(
                f,
                "tick: {} signal(s) updated in {} us",
                report.updated,
                report.elapsed.as_micros()
            ),
        }
    }
}

/// Place the scenario's trains on a commissioned interlocking and run its
/// actions in order.
pub fn run_scenario(il: &mut Interlocking, scenario: &Scenario) -> ProjectResult<Vec<ActionOutcome>> {
    let names: BTreeMap<String, SectionId> = il
        .graph()
        .sections()
        .iter()
        .map(|s| (s.name.clone(), s.id))
        .collect();
    let sections: BTreeMap<&str, SectionId> = names.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let resolve = |steps: &[StepDef]| route(&sections, steps).map_err(|what| ProjectError::Scenario { what });

    for def in &scenario.trains {
        let mut train = Train::new(TrainId::from_index(def.id), def.name.as_str(), resolve(&def.route)?);
        train.control_mode = def.mode;
        train.speed = mps(def.speed_mps);
        train.routes[1] = resolve(&def.reverse_route)?;
        for name in &def.holding_signals {
            train.holding_signals.push(find_signal(il, name)?);
        }
        for name in &def.wait_sections {
            let section = sections.get(name.as_str()).copied().ok_or_else(|| ProjectError::Scenario {
                what: format!("unknown section '{name}'"),
            })?;
            train.wait_sections.insert(section);
        }
        il.add_train(train)?;
    }
    info!(trains = scenario.trains.len(), "scenario trains placed");

    let mut outcomes = Vec::with_capacity(scenario.actions.len());
    for action in &scenario.actions {
        let outcome = match action {
            ActionDef::Clear { train } => {
                let train = TrainId::from_index(*train);
                let clear = il.request_train_clearance(train)?;
                ActionOutcome::Cleared { train, clear }
            }
            ActionDef::ClearNode { train } => {
                let train = TrainId::from_index(*train);
                let clearance = il.request_clear_node(train)?;
                ActionOutcome::Node { train, clearance }
            }
            ActionDef::Advance { train, steps } => {
                let train = TrainId::from_index(*train);
                let mut passed = Vec::new();
                for _ in 0..*steps {
                    if let Some(signal) = il.advance_train(train)? {
                        passed.push(signal);
                    }
                }
                ActionOutcome::Advanced { train, passed }
            }
            ActionDef::Hold { signal, hold } => {
                let signal = find_signal(il, signal)?;
                il.request_hold(signal, *hold)?;
                ActionOutcome::HoldSet { signal }
            }
            ActionDef::ReleaseHold { signal } => {
                let signal = find_signal(il, signal)?;
                il.clear_hold(signal)?;
                ActionOutcome::HoldReleased { signal }
            }
            ActionDef::Permission { signal } => {
                let signal = find_signal(il, signal)?;
                let permission = il.request_permission(signal)?;
                ActionOutcome::Permission { signal, permission }
            }
            ActionDef::Tick { pre_update } => ActionOutcome::Ticked(il.tick(*pre_update)),
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn find_signal(il: &Interlocking, name: &str) -> ProjectResult<SignalId> {
    il.find_signal(name).ok_or_else(|| ProjectError::Scenario {
        what: format!("unknown signal '{name}'"),
    })
}
