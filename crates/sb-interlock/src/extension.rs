//! Pluggable head logic.
//!
//! A [`HeadExtension`] replaces the built-in aspect rule of every head whose
//! signal type it is registered for. Extensions are created from an
//! [`ExtensionRegistry`] when the interlocking is commissioned and receive a
//! [`HeadHandle`] on every call: read access to the interlocking, write
//! access limited to their own head and the owning signal's local storage.
//! Writes are buffered and applied when the call returns.

use std::collections::BTreeMap;
use std::fmt;

use sb_core::{Length, SignalId, TrainId, Velocity};

use crate::aspect::{Aspect, SignalFunction};
use crate::block::SignalBlockState;
use crate::head::SpeedInfo;
use crate::interlocking::Interlocking;
use crate::signal::{HoldState, Permission};

/// Lifecycle events delivered through [`HeadExtension::on_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// The signal was enabled for a train.
    Enabled(TrainId),
    /// The signal was reset to idle.
    Reset,
    /// A dispatcher hold was set or cleared.
    HoldChanged(HoldState),
    /// The enabled train asked for permission to pass at danger.
    PermissionRequested,
}

/// Aspect logic attached to a signal head.
pub trait HeadExtension: fmt::Debug {
    /// Called once after the interlocking is commissioned.
    fn initialize(&mut self, _head: &mut HeadHandle<'_>) {}

    /// Called on every state update of the owning signal.
    fn update(&mut self, head: &mut HeadHandle<'_>);

    /// Text message sent by another signal's extension.
    fn on_message(&mut self, _head: &mut HeadHandle<'_>, _from: SignalId, _text: &str) {}

    fn on_event(&mut self, _head: &mut HeadHandle<'_>, _event: SignalEvent) {}
}

/// Constructor stored in the registry.
pub type ExtensionFactory = Box<dyn Fn() -> Box<dyn HeadExtension> + Send + Sync>;

/// Extension constructors keyed by signal type name.
#[derive(Default)]
pub struct ExtensionRegistry {
    factories: BTreeMap<String, ExtensionFactory>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, E>(&mut self, signal_type: impl Into<String>, factory: F)
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: HeadExtension + 'static,
    {
        self.factories.insert(
            signal_type.into(),
            Box::new(move || Box::new(factory()) as Box<dyn HeadExtension>),
        );
    }

    pub fn contains(&self, signal_type: &str) -> bool {
        self.factories.contains_key(signal_type)
    }

    pub fn create(&self, signal_type: &str) -> Option<Box<dyn HeadExtension>> {
        self.factories.get(signal_type).map(|f| f())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// A text message between signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    pub from: SignalId,
    pub to: SignalId,
    pub text: String,
}

/// Buffered writes of one extension call.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct HeadWrites {
    pub aspect: Option<Aspect>,
    pub draw_state: Option<usize>,
    pub text_aspect: Option<String>,
    pub speed_override: Option<Option<SpeedInfo>>,
    pub local: Vec<(i32, i32)>,
    pub approach_control_set: bool,
    pub approach_control_cleared: bool,
    pub clear_ahead_active: Option<i32>,
    pub messages: Vec<(SignalId, String)>,
}

/// What an extension sees of its head and the interlocking.
pub struct HeadHandle<'a> {
    pub(crate) world: &'a Interlocking,
    pub(crate) signal: SignalId,
    pub(crate) head: usize,
    pub(crate) writes: &'a mut HeadWrites,
}

impl fmt::Debug for HeadHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadHandle")
            .field("signal", &self.signal)
            .field("head", &self.head)
            .finish()
    }
}

impl HeadHandle<'_> {
    fn object(&self) -> Option<&crate::signal::SignalObject> {
        self.world.signal(self.signal)
    }

    fn own_head(&self) -> Option<&crate::head::SignalHead> {
        self.object().and_then(|s| s.heads.get(self.head))
    }

    pub fn signal_id(&self) -> SignalId {
        self.signal
    }

    pub fn head_index(&self) -> usize {
        self.head
    }

    pub fn function(&self) -> Option<SignalFunction> {
        self.own_head().map(|h| h.function)
    }

    /// Aspect including any write made during this call.
    pub fn aspect(&self) -> Aspect {
        self.writes
            .aspect
            .or_else(|| self.own_head().map(|h| h.aspect()))
            .unwrap_or(Aspect::Stop)
    }

    pub fn draw_state(&self) -> usize {
        self.writes
            .draw_state
            .or_else(|| self.own_head().map(|h| h.draw_state()))
            .unwrap_or(0)
    }

    pub fn most_restrictive(&self) -> Aspect {
        self.own_head()
            .map(|h| h.most_restrictive())
            .unwrap_or(Aspect::Stop)
    }

    pub fn least_restrictive(&self) -> Aspect {
        self.own_head()
            .map(|h| h.least_restrictive())
            .unwrap_or(Aspect::Clear2)
    }

    pub fn is_drawable(&self, aspect: Aspect) -> bool {
        self.own_head().is_some_and(|h| h.is_drawable(aspect))
    }

    pub fn def_draw_state(&self, aspect: Aspect) -> Option<usize> {
        self.own_head().and_then(|h| h.def_draw_state(aspect))
    }

    pub fn is_enabled(&self) -> bool {
        self.object().is_some_and(|s| s.is_enabled())
    }

    pub fn block_state(&self) -> SignalBlockState {
        self.object()
            .map(|s| s.block_state().signal_view())
            .unwrap_or(SignalBlockState::Obstructed)
    }

    pub fn hold_state(&self) -> HoldState {
        self.object().map(|s| s.hold_state()).unwrap_or_default()
    }

    pub fn permission(&self) -> Permission {
        self.object().map(|s| s.permission()).unwrap_or_default()
    }

    pub fn speed_info(&self) -> Option<SpeedInfo> {
        match self.writes.speed_override {
            Some(over) => over,
            None => self.own_head().and_then(|h| h.current_speed_info()),
        }
    }

    pub fn local_var(&self, key: i32) -> i32 {
        self.writes
            .local
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .unwrap_or_else(|| self.object().map(|s| s.local_var(key)).unwrap_or(0))
    }

    pub fn this_sig_mr(&self, function: SignalFunction) -> Aspect {
        self.object()
            .map(|s| s.this_sig_mr(function))
            .unwrap_or(Aspect::Stop)
    }

    pub fn this_sig_lr(&self, function: SignalFunction) -> Aspect {
        self.object()
            .map(|s| s.this_sig_lr(function))
            .unwrap_or(Aspect::Stop)
    }

    pub fn next_sig_mr(&self, function: SignalFunction) -> Aspect {
        self.world.next_sig_mr(self.signal, function)
    }

    pub fn next_sig_lr(&self, function: SignalFunction) -> Aspect {
        self.world.next_sig_lr(self.signal, function)
    }

    pub fn next_nsig_lr(&self, function: SignalFunction, n: usize) -> Aspect {
        self.world.next_nsig_lr(self.signal, function, n)
    }

    pub fn opp_sig_mr(&self, function: SignalFunction) -> Aspect {
        self.world.opp_sig_mr(self.signal, function)
    }

    pub fn opp_sig_lr(&self, function: SignalFunction) -> Aspect {
        self.world.opp_sig_lr(self.signal, function)
    }

    pub fn next_sig_id(&self, function: SignalFunction) -> Option<SignalId> {
        self.world.next_sig_id(self.signal, function)
    }

    pub fn next_nsig_id(&self, function: SignalFunction, n: usize) -> Option<SignalId> {
        self.world.next_nsig_id(self.signal, function, n)
    }

    pub fn opp_sig_id(&self, function: SignalFunction) -> Option<SignalId> {
        self.world.opp_sig_id(self.signal, function)
    }

    pub fn id_sig_lr(&self, signal: SignalId, function: SignalFunction) -> Aspect {
        self.world.id_sig_lr(signal, function)
    }

    pub fn id_sig_enabled(&self, signal: SignalId) -> bool {
        self.world.id_sig_enabled(signal)
    }

    pub fn id_sig_aspect(&self, signal: SignalId) -> Option<Aspect> {
        self.world.id_sig_aspect(signal)
    }

    pub fn dist_multi_sig_mr(&self, from: SignalFunction, to: SignalFunction) -> Aspect {
        self.world.dist_multi_sig_mr(self.signal, from, to)
    }

    pub fn next_sig_lvar(&self, function: SignalFunction, key: i32) -> i32 {
        self.world.next_sig_lvar(self.signal, function, key)
    }

    pub fn route_cleared_to_signal(&self, other: SignalId, allow_call_on: bool) -> SignalBlockState {
        self.world.route_cleared_to_signal(self.signal, other, allow_call_on)
    }

    pub fn train_has_call_on(&self) -> bool {
        self.world.train_has_call_on(self.signal)
    }

    /// Approach control on position: true once the enabled train is within
    /// `distance` of the signal. Raises the approach-control flag while held.
    pub fn approach_control_position(&mut self, distance: Length, forced: bool) -> bool {
        self.approach_control(distance, None, forced)
    }

    /// Approach control on position and speed.
    pub fn approach_control_speed(&mut self, distance: Length, speed: Velocity) -> bool {
        self.approach_control(distance, Some(speed), false)
    }

    fn approach_control(&mut self, distance: Length, speed: Option<Velocity>, forced: bool) -> bool {
        let already = self.object().is_some_and(|s| s.approach_control_cleared);
        if already && !forced {
            return true;
        }
        let cleared = self.world.approach_control_met(self.signal, distance, speed);
        if cleared {
            self.writes.approach_control_cleared = true;
        } else {
            self.writes.approach_control_set = true;
        }
        cleared
    }

    pub fn set_aspect(&mut self, aspect: Aspect) {
        self.writes.aspect = Some(aspect);
    }

    pub fn set_draw_state(&mut self, draw_state: usize) {
        self.writes.draw_state = Some(draw_state);
    }

    pub fn set_text_aspect(&mut self, text: impl Into<String>) {
        self.writes.text_aspect = Some(text.into());
    }

    /// Override the speed shown with the current aspect; None restores the table.
    pub fn set_speed_override(&mut self, speed: Option<SpeedInfo>) {
        self.writes.speed_override = Some(speed);
    }

    pub fn store_local_var(&mut self, key: i32, value: i32) {
        self.writes.local.push((key, value));
    }

    /// Change the active clear-ahead count of the owning signal.
    pub fn set_clear_ahead(&mut self, count: i32) {
        self.writes.clear_ahead_active = Some(count);
    }

    /// Queue a text message for another signal's extensions.
    pub fn send_message(&mut self, to: SignalId, text: impl Into<String>) {
        self.writes.messages.push((to, text.into()));
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ExtensionCall<'m> {
    Initialize,
    Update,
    Message { from: SignalId, text: &'m str },
    Event(SignalEvent),
}

impl Interlocking {
    /// Run one extension hook on a head and apply its writes.
    ///
    /// Returns false when the head has no extension.
    pub(crate) fn call_extension(&mut self, signal: SignalId, head: usize, call: ExtensionCall<'_>) -> bool {
        let Some(mut extension) = self
            .signals
            .get_mut(signal.slot())
            .and_then(|s| s.heads.get_mut(head))
            .and_then(|h| h.extension.take())
        else {
            return false;
        };
        let mut writes = HeadWrites::default();
        {
            let mut handle = HeadHandle {
                world: self,
                signal,
                head,
                writes: &mut writes,
            };
            match call {
                ExtensionCall::Initialize => extension.initialize(&mut handle),
                ExtensionCall::Update => extension.update(&mut handle),
                ExtensionCall::Message { from, text } => extension.on_message(&mut handle, from, text),
                ExtensionCall::Event(event) => extension.on_event(&mut handle, event),
            }
        }
        if let Some(h) = self
            .signals
            .get_mut(signal.slot())
            .and_then(|s| s.heads.get_mut(head))
        {
            h.extension = Some(extension);
        }
        self.apply_writes(signal, head, writes);
        true
    }

    fn apply_writes(&mut self, signal: SignalId, head: usize, writes: HeadWrites) {
        let Some(object) = self.signals.get_mut(signal.slot()) else {
            return;
        };
        if let Some(h) = object.heads.get_mut(head) {
            if let Some(aspect) = writes.aspect {
                h.set_aspect(aspect);
            }
            if let Some(draw_state) = writes.draw_state {
                h.draw_state = draw_state;
            }
            if let Some(text) = writes.text_aspect {
                h.text_aspect = text;
            }
            if let Some(speed) = writes.speed_override {
                h.speed_override = speed;
            }
        }
        for (key, value) in writes.local {
            object.store_local_var(key, value);
        }
        if writes.approach_control_set {
            object.approach_control_set = true;
        }
        if writes.approach_control_cleared {
            object.approach_control_cleared = true;
        }
        if let Some(count) = writes.clear_ahead_active {
            object.clear_ahead_active = count;
        }
        for (to, text) in writes.messages {
            self.outbox.push_back(SignalMessage {
                from: signal,
                to,
                text,
            });
        }
    }

    /// Broadcast an event to every extension on a signal.
    pub(crate) fn notify_extensions(&mut self, signal: SignalId, event: SignalEvent) {
        let heads = self.signals.get(signal.slot()).map_or(0, |s| s.heads.len());
        for head in 0..heads {
            self.call_extension(signal, head, ExtensionCall::Event(event));
        }
    }

    /// Deliver queued messages, including ones sent while delivering.
    pub(crate) fn deliver_messages(&mut self) {
        const MAX_DELIVERIES: usize = 64;
        let mut delivered = 0;
        while let Some(message) = self.outbox.pop_front() {
            if delivered == MAX_DELIVERIES {
                tracing::warn!(
                    pending = self.outbox.len() + 1,
                    "signal message limit reached, dropping remaining messages"
                );
                self.outbox.clear();
                break;
            }
            delivered += 1;
            let heads = self
                .signals
                .get(message.to.slot())
                .map_or(0, |s| s.heads.len());
            for head in 0..heads {
                self.call_extension(
                    message.to,
                    head,
                    ExtensionCall::Message {
                        from: message.from,
                        text: &message.text,
                    },
                );
            }
        }
    }

    /// Attach extensions for every head whose signal type is registered.
    pub(crate) fn attach_extensions(&mut self) -> usize {
        let mut attached = 0;
        for object in self.signals.iter_mut() {
            for head in object.heads.iter_mut() {
                let Some(type_name) = head.signal_type.as_ref().map(|t| t.name.clone()) else {
                    continue;
                };
                if head.extension.is_none() {
                    if let Some(extension) = self.extensions.create(&type_name) {
                        head.extension = Some(extension);
                        attached += 1;
                    }
                }
            }
        }
        attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AlwaysClear;

    impl HeadExtension for AlwaysClear {
        fn update(&mut self, head: &mut HeadHandle<'_>) {
            let lr = head.least_restrictive();
            head.set_aspect(lr);
        }
    }

    #[test]
    fn registry_creates_by_type_name() {
        let mut registry = ExtensionRegistry::new();
        assert!(registry.is_empty());
        registry.register("auto_clear", || AlwaysClear);
        assert!(registry.contains("auto_clear"));
        assert!(registry.create("auto_clear").is_some());
        assert!(registry.create("other").is_none());
        assert_eq!(registry.len(), 1);
    }
}
