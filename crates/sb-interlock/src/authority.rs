//! Node-control authority for trains running without signal authority.

use std::collections::BTreeSet;

use sb_core::{Length, SectionId, TrainId, m, meters};
use sb_graph::SectionKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{InterlockError, InterlockResult};
use crate::extension::SignalEvent;
use crate::interlocking::Interlocking;
use crate::route::{RoutedTrain, TrackRoute};

/// Why a node-control authority ends where it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndAuthority {
    NoPathReserved,
    MaxDistance,
    EndOfTrack,
    EndOfPath,
    ReservedSwitch,
    TrainAhead,
    Loop,
    /// A signal takes over authority.
    EndOfAuthority,
}

/// Result of a node-control clearance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeClearance {
    pub end_authority: EndAuthority,
    /// Cleared distance from the train's front.
    pub distance: Length,
    /// Route index of the last section reserved for the train.
    pub last_reserved_index: Option<usize>,
}

impl Interlocking {
    /// Extend a node-controlled train's authority along its route.
    ///
    /// Reservation continues from the last reserved section while sections
    /// are available and the cleared distance stays below the configured
    /// maximum.
    pub fn request_clear_node(&mut self, train: TrainId) -> InterlockResult<NodeClearance> {
        let t = self
            .trains
            .get(train)
            .ok_or(InterlockError::UnknownTrain { train })?;
        let routed = t.routed();
        let route = t.route(routed.route_index).clone();
        let position = t.position;
        let slot = routed.route_index.min(1);
        let last_reserved = t.last_reserved[slot];

        if route.is_empty() {
            return Ok(NodeClearance {
                end_authority: EndAuthority::NoPathReserved,
                distance: m(0.0),
                last_reserved_index: None,
            });
        }

        let here = self
            .graph
            .length(position.section)
            .ok_or(InterlockError::UnknownSection { section: position.section })?;
        let mut distance = meters(here) - meters(position.offset);
        let mut last_index = last_reserved
            .and_then(|s| route.index_of(s, position.route_index))
            .unwrap_or(position.route_index);
        for element in route.iter().take(last_index + 1).skip(position.route_index + 1) {
            distance += self.graph.length(element.section).map_or(0.0, meters);
        }
        let max = self.config.max_check_distance_m;
        let mut seen: BTreeSet<SectionId> = route
            .iter()
            .take(last_index + 1)
            .skip(position.route_index)
            .map(|e| e.section)
            .collect();

        let start = route.get(last_index).ok_or_else(|| InterlockError::InvalidArg {
            what: format!(
                "train {train} is at route index {last_index} beyond its {}-element route",
                route.len()
            ),
        })?;
        let end_authority = if self.placements.end_signal(start.section, start.direction).is_some() {
            EndAuthority::EndOfAuthority
        } else if self.graph.kind(start.section) == Some(SectionKind::EndOfTrack)
            && last_index > position.route_index
        {
            EndAuthority::EndOfTrack
        } else {
            self.extend_node_authority(&route, routed, &mut last_index, &mut distance, &mut seen, max)
        };

        let reserved = route.get(last_index).map(|e| e.section);
        if let Some(t) = self.trains.get_mut(train) {
            t.last_reserved[slot] = reserved;
        }
        debug!(train = %train, ?end_authority, distance, "node authority");
        Ok(NodeClearance {
            end_authority,
            distance: m(distance),
            last_reserved_index: (last_index > position.route_index).then_some(last_index),
        })
    }

    fn extend_node_authority(
        &mut self,
        route: &TrackRoute,
        routed: RoutedTrain,
        last_index: &mut usize,
        distance: &mut f64,
        seen: &mut BTreeSet<SectionId>,
        max: f64,
    ) -> EndAuthority {
        loop {
            if *distance >= max {
                return EndAuthority::MaxDistance;
            }
            let Some(element) = route.get(*last_index + 1).cloned() else {
                return EndAuthority::EndOfPath;
            };
            if !seen.insert(element.section) {
                return EndAuthority::Loop;
            }
            let available = self.is_section_available(element.section, routed)
                && self.reserve(element.section, routed, route);
            if !available {
                let train_ahead = self
                    .circuit_state(element.section)
                    .is_some_and(|s| s.has_other_trains(routed.train));
                let switch = self
                    .graph
                    .kind(element.section)
                    .is_some_and(SectionKind::is_switchable);
                return if train_ahead {
                    EndAuthority::TrainAhead
                } else if switch {
                    EndAuthority::ReservedSwitch
                } else {
                    EndAuthority::EndOfAuthority
                };
            }
            *last_index += 1;
            *distance += self.graph.length(element.section).map_or(0.0, meters);
            trace!(train = %routed.train, section = %element.section, "node section reserved");
            if self.placements.end_signal(element.section, element.direction).is_some() {
                return EndAuthority::EndOfAuthority;
            }
            if self.graph.kind(element.section) == Some(SectionKind::EndOfTrack) {
                return EndAuthority::EndOfTrack;
            }
        }
    }

    /// Release the train's hold on its route from `first_section` onwards.
    pub fn break_down_route(&mut self, first_section: SectionId, train: RoutedTrain) -> InterlockResult<()> {
        self.check_section(first_section)?;
        let (route, from) = self
            .trains
            .get(train.train)
            .map(|t| (t.route(train.route_index).clone(), t.position.route_index))
            .ok_or(InterlockError::UnknownTrain { train: train.train })?;
        if let Some(index) = route.index_of(first_section, from) {
            self.break_down_route_list(&route, index, train);
        }
        Ok(())
    }

    /// Drop reservations, claims and traps of `train` on `route[from..]`,
    /// and reset signals on those sections that are enabled for it.
    /// Occupancy is left alone.
    pub(crate) fn break_down_route_list(&mut self, route: &TrackRoute, from: usize, train: RoutedTrain) {
        let mut released = 0;
        for element in route.iter().skip(from) {
            let Some(runtime) = self.sections.get_mut(element.section.slot()) else {
                continue;
            };
            if runtime.state.unreserve_train(train.train) {
                released += 1;
            }
            runtime.deadlock.clear(train.train);

            let enabled = self
                .placements
                .end_signal(element.section, element.direction)
                .filter(|s| {
                    self.signals
                        .get(s.slot())
                        .is_some_and(|o| o.enabled_train.is_some_and(|t| t.train == train.train))
                });
            if let Some(signal) = enabled {
                self.signals[signal.slot()].clear_enabled();
                self.notify_extensions(signal, SignalEvent::Reset);
                self.state_update(signal);
            }
        }
        if let Some(t) = self.trains.get_mut(train.train) {
            let before = from.checked_sub(1).and_then(|i| route.get(i)).map(|e| e.section);
            t.last_reserved[train.route_index.min(1)] = before;
        }
        debug!(train = %train.train, from, released, "route broken down");
    }
}
