//! Built-in aspect rule for heads without an extension, and the per-signal
//! state update that drives every head.

use sb_core::SignalId;

use crate::aspect::{Aspect, SignalFunction};
use crate::block::SignalBlockState;
use crate::extension::ExtensionCall;
use crate::interlocking::Interlocking;
use crate::signal::{HoldState, Permission};

/// What the built-in rule asks a head to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeadRequest {
    MostRestrictive,
    Approach,
    LeastRestrictive,
    Exact(Aspect),
}

/// Outcome of the approach control test for one head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApproachCheck {
    NotApplicable,
    Cleared,
    Held,
}

impl Interlocking {
    /// Re-evaluate every head of a signal, NORMAL heads first so that other
    /// heads see the new NORMAL aspect.
    pub(crate) fn state_update(&mut self, signal: SignalId) {
        let Some(object) = self.signals.get_mut(signal.slot()) else {
            return;
        };
        object.approach_control_set = false;
        let (normal, other): (Vec<usize>, Vec<usize>) =
            (0..object.heads.len()).partition(|i| object.heads[*i].function.is_normal());
        for head in normal.into_iter().chain(other) {
            self.update_head(signal, head);
        }
        self.deliver_messages();
    }

    fn update_head(&mut self, signal: SignalId, head: usize) {
        if self.call_extension(signal, head, ExtensionCall::Update) {
            return;
        }
        let (request, approach) = self.builtin_request(signal, head);
        let Some(object) = self.signals.get_mut(signal.slot()) else {
            return;
        };
        match approach {
            ApproachCheck::NotApplicable => {}
            ApproachCheck::Cleared => object.approach_control_cleared = true,
            ApproachCheck::Held => object.approach_control_set = true,
        }
        let Some(h) = object.heads.get_mut(head) else {
            return;
        };
        match request {
            HeadRequest::MostRestrictive => h.request_most_restrictive(),
            HeadRequest::Approach => h.request_approach(),
            HeadRequest::LeastRestrictive => h.request_least_restrictive(),
            HeadRequest::Exact(aspect) => h.set_aspect(aspect),
        }
    }

    fn builtin_request(&self, signal: SignalId, head: usize) -> (HeadRequest, ApproachCheck) {
        let Some(object) = self.signals.get(signal.slot()) else {
            return (HeadRequest::MostRestrictive, ApproachCheck::NotApplicable);
        };
        let Some(h) = object.heads.get(head) else {
            return (HeadRequest::MostRestrictive, ApproachCheck::NotApplicable);
        };

        if !h.function.is_normal() {
            return (self.mirror_next_normal(signal), ApproachCheck::NotApplicable);
        }

        match object.hold_state {
            HoldState::ManualLock | HoldState::StationStop => {
                return (HeadRequest::MostRestrictive, ApproachCheck::NotApplicable);
            }
            HoldState::ManualApproach => {
                return (HeadRequest::Approach, ApproachCheck::NotApplicable);
            }
            HoldState::ManualPass => {
                return (HeadRequest::LeastRestrictive, ApproachCheck::NotApplicable);
            }
            HoldState::None => {}
        }

        match object.block_state.signal_view() {
            SignalBlockState::Clear => {
                let mut check = ApproachCheck::NotApplicable;
                if let (Some(limits), true) = (h.approach_limits(), object.is_enabled()) {
                    if !object.approach_control_cleared {
                        if self.approach_control_met(signal, limits.position, limits.speed) {
                            check = ApproachCheck::Cleared;
                        } else {
                            return (HeadRequest::MostRestrictive, ApproachCheck::Held);
                        }
                    }
                }
                (self.mirror_next_normal(signal), check)
            }
            SignalBlockState::Occupied if object.permission == Permission::Granted => {
                let request = [Aspect::Restricting, Aspect::StopAndProceed]
                    .into_iter()
                    .find(|a| h.is_drawable(*a))
                    .map_or(HeadRequest::MostRestrictive, HeadRequest::Exact);
                (request, ApproachCheck::NotApplicable)
            }
            _ => (HeadRequest::MostRestrictive, ApproachCheck::NotApplicable),
        }
    }

    /// Caution when the next NORMAL signal shows STOP, otherwise proceed.
    fn mirror_next_normal(&self, signal: SignalId) -> HeadRequest {
        if self.next_sig_mr(signal, SignalFunction::Normal).is_stop() {
            HeadRequest::Approach
        } else {
            HeadRequest::LeastRestrictive
        }
    }
}
