//! Signal heads and signal types.

use std::fmt;
use std::sync::Arc;

use sb_core::{Length, Velocity};

use crate::aspect::{Aspect, SignalFunction};
use crate::extension::HeadExtension;

/// Speed limits displayed with an aspect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedInfo {
    pub passenger: Option<Velocity>,
    pub freight: Option<Velocity>,
    /// Limit applies immediately rather than at the signal.
    pub asap: bool,
    /// Clears a previous limit.
    pub reset: bool,
}

/// One configured aspect of a signal type.
#[derive(Debug, Clone, PartialEq)]
pub struct AspectEntry {
    pub aspect: Aspect,
    pub draw_state: usize,
    pub speed: Option<SpeedInfo>,
}

/// Approach control envelope: clear only once the train is this close (and slow).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproachControlLimits {
    pub position: Length,
    pub speed: Option<Velocity>,
}

/// Shared configuration for heads of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalType {
    pub name: String,
    pub function: SignalFunction,
    /// Subtype of NORMAL signals (e.g. "shunting" or "main"); informational.
    pub normal_subtype: Option<String>,
    pub aspects: Vec<AspectEntry>,
    /// Further NORMAL signals to clear ahead, if configured.
    pub clear_ahead: Option<u32>,
    /// Legacy clear-ahead count that includes the signal's own NORMAL heads.
    pub clear_ahead_heads: Option<u32>,
    pub semaphore: bool,
    pub approach_control: Option<ApproachControlLimits>,
}

impl SignalType {
    pub fn entry(&self, aspect: Aspect) -> Option<&AspectEntry> {
        self.aspects.iter().find(|e| e.aspect == aspect)
    }

    pub fn most_restrictive(&self) -> Option<Aspect> {
        self.aspects
            .iter()
            .map(|e| e.aspect)
            .reduce(Aspect::most_restrictive)
    }

    pub fn least_restrictive(&self) -> Option<Aspect> {
        self.aspects
            .iter()
            .map(|e| e.aspect)
            .reduce(Aspect::least_restrictive)
    }

    /// Nearest configured aspect that is no less restrictive than `wanted`.
    ///
    /// Falls back to the most restrictive configured aspect.
    pub fn snap(&self, wanted: Aspect) -> Option<Aspect> {
        self.aspects
            .iter()
            .map(|e| e.aspect)
            .filter(|a| !wanted.is_more_restrictive_than(*a))
            .reduce(Aspect::least_restrictive)
            .or_else(|| self.most_restrictive())
    }
}

/// The smallest unit that displays an aspect.
pub struct SignalHead {
    pub function: SignalFunction,
    pub signal_type: Option<Arc<SignalType>>,
    pub(crate) aspect: Aspect,
    pub(crate) draw_state: usize,
    pub(crate) text_aspect: String,
    pub(crate) speed_override: Option<SpeedInfo>,
    pub(crate) extension: Option<Box<dyn HeadExtension>>,
}

impl fmt::Debug for SignalHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHead")
            .field("function", &self.function)
            .field("signal_type", &self.signal_type.as_ref().map(|t| &t.name))
            .field("aspect", &self.aspect)
            .field("draw_state", &self.draw_state)
            .field("extension", &self.extension.is_some())
            .finish()
    }
}

impl SignalHead {
    pub fn new(function: SignalFunction, signal_type: Option<Arc<SignalType>>) -> Self {
        let mut head = Self {
            function,
            signal_type,
            aspect: Aspect::Stop,
            draw_state: 0,
            text_aspect: String::new(),
            speed_override: None,
            extension: None,
        };
        head.request_most_restrictive();
        head
    }

    pub fn aspect(&self) -> Aspect {
        self.aspect
    }

    pub fn draw_state(&self) -> usize {
        self.draw_state
    }

    pub fn text_aspect(&self) -> &str {
        &self.text_aspect
    }

    pub fn has_extension(&self) -> bool {
        self.extension.is_some()
    }

    /// Most restrictive aspect this head can show; STOP when untyped.
    pub fn most_restrictive(&self) -> Aspect {
        self.signal_type
            .as_ref()
            .and_then(|t| t.most_restrictive())
            .unwrap_or(Aspect::Stop)
    }

    /// Least restrictive aspect this head can show; CLEAR_2 when untyped.
    pub fn least_restrictive(&self) -> Aspect {
        self.signal_type
            .as_ref()
            .and_then(|t| t.least_restrictive())
            .unwrap_or(Aspect::Clear2)
    }

    /// Whether the configuration has a draw state for `aspect`.
    pub fn is_drawable(&self, aspect: Aspect) -> bool {
        self.signal_type
            .as_ref()
            .is_some_and(|t| t.entry(aspect).is_some())
    }

    /// Draw state configured for `aspect`, if any.
    pub fn def_draw_state(&self, aspect: Aspect) -> Option<usize> {
        self.signal_type
            .as_ref()
            .and_then(|t| t.entry(aspect))
            .map(|e| e.draw_state)
    }

    pub fn approach_limits(&self) -> Option<ApproachControlLimits> {
        self.signal_type.as_ref().and_then(|t| t.approach_control)
    }

    /// Show `aspect`, snapped to the configured set.
    pub fn set_aspect(&mut self, aspect: Aspect) {
        let shown = match &self.signal_type {
            Some(t) => t.snap(aspect).unwrap_or(Aspect::Stop),
            None => aspect,
        };
        self.aspect = shown;
        self.draw_state = self.def_draw_state(shown).unwrap_or(0);
    }

    pub fn request_most_restrictive(&mut self) {
        self.set_aspect(self.most_restrictive());
    }

    /// First drawable of APPROACH_1/APPROACH_2, else APPROACH_3.
    pub fn request_approach(&mut self) {
        let aspect = [Aspect::Approach1, Aspect::Approach2]
            .into_iter()
            .find(|a| self.is_drawable(*a))
            .unwrap_or(Aspect::Approach3);
        self.set_aspect(aspect);
    }

    pub fn request_least_restrictive(&mut self) {
        self.set_aspect(self.least_restrictive());
    }

    /// Speed limit for the current aspect; an extension override wins.
    pub fn current_speed_info(&self) -> Option<SpeedInfo> {
        if self.speed_override.is_some() {
            return self.speed_override;
        }
        self.signal_type
            .as_ref()
            .and_then(|t| t.entry(self.aspect))
            .and_then(|e| e.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_core::mps;

    fn three_aspect() -> Arc<SignalType> {
        Arc::new(SignalType {
            name: "home3".into(),
            function: SignalFunction::Normal,
            normal_subtype: None,
            aspects: vec![
                AspectEntry {
                    aspect: Aspect::Stop,
                    draw_state: 0,
                    speed: None,
                },
                AspectEntry {
                    aspect: Aspect::Approach2,
                    draw_state: 1,
                    speed: Some(SpeedInfo {
                        passenger: Some(mps(20.0)),
                        freight: None,
                        asap: false,
                        reset: false,
                    }),
                },
                AspectEntry {
                    aspect: Aspect::Clear2,
                    draw_state: 2,
                    speed: None,
                },
            ],
            clear_ahead: Some(1),
            clear_ahead_heads: None,
            semaphore: false,
            approach_control: None,
        })
    }

    #[test]
    fn untyped_head_bounds() {
        let mut head = SignalHead::new(SignalFunction::Normal, None);
        assert_eq!(head.aspect(), Aspect::Stop);
        head.request_least_restrictive();
        assert_eq!(head.aspect(), Aspect::Clear2);
        head.request_approach();
        assert_eq!(head.aspect(), Aspect::Approach3);
    }

    #[test]
    fn approach_picks_first_drawable() {
        let mut head = SignalHead::new(SignalFunction::Normal, Some(three_aspect()));
        head.request_approach();
        assert_eq!(head.aspect(), Aspect::Approach2);
        assert_eq!(head.draw_state(), 1);
        assert_eq!(
            head.current_speed_info().and_then(|s| s.passenger),
            Some(mps(20.0))
        );
    }

    #[test]
    fn unconfigured_aspect_snaps_down() {
        let mut head = SignalHead::new(SignalFunction::Normal, Some(three_aspect()));
        head.set_aspect(Aspect::Clear1);
        assert_eq!(head.aspect(), Aspect::Approach2);
        head.set_aspect(Aspect::Restricting);
        assert_eq!(head.aspect(), Aspect::Stop);
    }

    #[test]
    fn override_speed_wins() {
        let mut head = SignalHead::new(SignalFunction::Normal, Some(three_aspect()));
        head.request_approach();
        head.speed_override = Some(SpeedInfo {
            passenger: Some(mps(5.0)),
            freight: Some(mps(5.0)),
            asap: true,
            reset: false,
        });
        assert_eq!(
            head.current_speed_info().and_then(|s| s.passenger),
            Some(mps(5.0))
        );
    }
}
