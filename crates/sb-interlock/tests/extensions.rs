//! Head extension tests for sb-interlock.

use std::sync::Arc;

use sb_core::{Id, SignalId, TrainId, m};
use sb_graph::{SectionKind, TrackBuilder, TrackDirection, TrackGraph};
use sb_interlock::{
    Aspect, AspectEntry, HeadExtension, HeadHandle, HeadSpec, HoldState, InterlockConfig,
    Interlocking, SignalEvent, SignalFunction, SignalKind, SignalSpec, SignalType, TrackRoute,
    Train,
};

use TrackDirection::Ahead;

const UPDATES: i32 = 1;
const ENABLED_FOR: i32 = 2;
const MESSAGE_LEN: i32 = 3;
const HELD: i32 = 4;

/// Shows a flashing yellow whatever the block ahead does.
#[derive(Debug, Default)]
struct Flasher;

impl HeadExtension for Flasher {
    fn initialize(&mut self, head: &mut HeadHandle<'_>) {
        if let Some(next) = head.next_sig_id(SignalFunction::Normal) {
            head.send_message(next, "approach lit");
        }
    }

    fn update(&mut self, head: &mut HeadHandle<'_>) {
        let count = head.local_var(UPDATES);
        head.store_local_var(UPDATES, count + 1);
        head.set_aspect(Aspect::Approach1);
        head.set_text_aspect("FLASH");
    }

    fn on_message(&mut self, head: &mut HeadHandle<'_>, _from: SignalId, text: &str) {
        head.store_local_var(MESSAGE_LEN, text.len() as i32);
    }

    fn on_event(&mut self, head: &mut HeadHandle<'_>, event: SignalEvent) {
        match event {
            SignalEvent::Enabled(train) => head.store_local_var(ENABLED_FOR, train.index() as i32),
            SignalEvent::HoldChanged(hold) => {
                head.store_local_var(HELD, i32::from(hold != HoldState::None));
            }
            _ => {}
        }
    }
}

fn tid(i: u32) -> TrainId {
    Id::from_index(i)
}

fn flasher_type() -> Arc<SignalType> {
    let entry = |aspect, draw_state| AspectEntry {
        aspect,
        draw_state,
        speed: None,
    };
    Arc::new(SignalType {
        name: "flasher".into(),
        function: SignalFunction::Normal,
        normal_subtype: None,
        aspects: vec![
            entry(Aspect::Stop, 0),
            entry(Aspect::Approach1, 1),
            entry(Aspect::Clear2, 2),
        ],
        clear_ahead: None,
        clear_ahead_heads: None,
        semaphore: false,
        approach_control: None,
    })
}

/// ```text
/// A(100) | B(400) | C(400) | D(100)
///        S1       S2
/// ```
fn layout(registered: bool) -> (Interlocking, SignalId, SignalId) {
    let mut b = TrackBuilder::new();
    let a = b.add_section("A", SectionKind::EndOfTrack, m(100.0));
    let sb = b.add_section("B", SectionKind::Normal, m(400.0));
    let c = b.add_section("C", SectionKind::Normal, m(400.0));
    let d = b.add_section("D", SectionKind::EndOfTrack, m(100.0));
    b.connect(a, Ahead, sb, Ahead).unwrap();
    b.connect(sb, Ahead, c, Ahead).unwrap();
    b.connect(c, Ahead, d, Ahead).unwrap();
    let graph: TrackGraph = b.build().unwrap();

    let mut il = Interlocking::new(graph, InterlockConfig::default());
    if registered {
        il.extensions_mut().register("flasher", || Flasher);
    }
    let mut add = |name: &str, section, offset| {
        il.add_signal(SignalSpec {
            name: name.into(),
            kind: SignalKind::Signal,
            section,
            direction: Ahead,
            offset: m(offset),
            heads: vec![HeadSpec {
                function: SignalFunction::Normal,
                signal_type: Some(flasher_type()),
            }],
            allow_part_route: false,
        })
        .unwrap()
    };
    let s1 = add("S1", a, 100.0);
    let s2 = add("S2", sb, 400.0);
    il.commission().unwrap();
    (il, s1, s2)
}

#[test]
fn extension_replaces_builtin_rule() {
    let (mut il, s1, s2) = layout(true);
    for signal in [s1, s2] {
        let object = il.signal(signal).unwrap();
        assert_eq!(object.displayed_aspect(), Aspect::Approach1);
        assert_eq!(object.heads[0].text_aspect(), "FLASH");
        assert!(object.local_var(UPDATES) >= 1);
    }

    let before = il.signal(s1).unwrap().local_var(UPDATES);
    il.tick(true);
    assert!(il.signal(s1).unwrap().local_var(UPDATES) > before);
}

#[test]
fn unregistered_type_keeps_builtin_rule() {
    let (il, s1, _) = layout(false);
    let object = il.signal(s1).unwrap();
    assert!(object.heads[0].text_aspect().is_empty());
    assert_eq!(object.local_var(UPDATES), 0);
    assert_eq!(object.local_var(MESSAGE_LEN), 0);
}

#[test]
fn messages_reach_the_next_signal() {
    let (il, s1, s2) = layout(true);
    assert_eq!(il.signal(s2).unwrap().local_var(MESSAGE_LEN), "approach lit".len() as i32);
    assert_eq!(il.signal(s1).unwrap().local_var(MESSAGE_LEN), 0);
}

#[test]
fn events_are_delivered() {
    let (mut il, s1, s2) = layout(true);
    let t1 = tid(7);
    let route = TrackRoute::from_steps(
        ["A", "B", "C", "D"].map(|n| (il.graph().find(n).unwrap(), Ahead)),
    );
    il.add_train(Train::new(t1, "T7", route)).unwrap();
    il.request_train_clearance(t1).unwrap();
    assert!(il.signal(s1).unwrap().is_enabled());
    assert_eq!(il.signal(s1).unwrap().local_var(ENABLED_FOR), 7);

    il.request_hold(s2, HoldState::ManualLock).unwrap();
    assert_eq!(il.signal(s2).unwrap().local_var(HELD), 1);
    // the extension still decides the aspect
    assert_eq!(il.signal(s2).unwrap().displayed_aspect(), Aspect::Approach1);
    il.clear_hold(s2).unwrap();
    assert_eq!(il.signal(s2).unwrap().local_var(HELD), 0);
}
