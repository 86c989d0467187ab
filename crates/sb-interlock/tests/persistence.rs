//! Snapshot and restore tests for sb-interlock.

use sb_core::{Id, TrainId, m};
use sb_graph::{SectionKind, TrackBuilder, TrackDirection, TrackGraph};
use sb_interlock::{
    HeadSpec, InterlockConfig, InterlockError, InterlockSnapshot, Interlocking, PathSpec,
    SignalFunction, SignalKind, SignalSpec, TrackRoute, Train,
};

use TrackDirection::{Ahead, Reverse};

fn tid(i: u32) -> TrainId {
    Id::from_index(i)
}

/// ```text
/// A - B - J1 = C = J2 - E - F
///            \ D /
/// ```
fn passing_loop() -> TrackGraph {
    let mut b = TrackBuilder::new();
    let a = b.add_section("A", SectionKind::EndOfTrack, m(100.0));
    let sb = b.add_section("B", SectionKind::Normal, m(400.0));
    let j1 = b.add_section("J1", SectionKind::Junction, m(50.0));
    let c = b.add_section("C", SectionKind::Normal, m(600.0));
    let d = b.add_section("D", SectionKind::Normal, m(600.0));
    let j2 = b.add_section("J2", SectionKind::Junction, m(50.0));
    let e = b.add_section("E", SectionKind::Normal, m(400.0));
    let f = b.add_section("F", SectionKind::EndOfTrack, m(100.0));
    b.connect(a, Ahead, sb, Ahead).unwrap();
    b.connect(sb, Ahead, j1, Ahead).unwrap();
    b.connect(j1, Ahead, c, Ahead).unwrap();
    b.connect(j1, Ahead, d, Ahead).unwrap();
    b.connect(c, Ahead, j2, Ahead).unwrap();
    b.connect(d, Ahead, j2, Ahead).unwrap();
    b.connect(j2, Ahead, e, Ahead).unwrap();
    b.connect(e, Ahead, f, Ahead).unwrap();
    b.build().unwrap()
}

fn route(il: &Interlocking, steps: &[(&str, TrackDirection)]) -> TrackRoute {
    TrackRoute::from_steps(
        steps
            .iter()
            .map(|(name, dir)| (il.graph().find(name).unwrap(), *dir)),
    )
}

/// The static layout: sections, two signals and the passing area.
fn build() -> Interlocking {
    let mut il = Interlocking::new(passing_loop(), InterlockConfig::default());
    for (name, section, direction) in [("SB", "B", Ahead), ("SE", "E", Reverse)] {
        let section = il.graph().find(section).unwrap();
        let offset = il.graph().length(section).unwrap();
        il.add_signal(SignalSpec {
            name: name.into(),
            kind: SignalKind::Signal,
            section,
            direction,
            offset,
            heads: vec![HeadSpec {
                function: SignalFunction::Normal,
                signal_type: None,
            }],
            allow_part_route: false,
        })
        .unwrap();
    }
    let path = |name: &str, steps: &[(&str, TrackDirection)]| PathSpec {
        name: name.into(),
        route: route(&il, steps),
        allowed_trains: Vec::new(),
    };
    let paths = vec![
        path("MAIN", &[("J1", Ahead), ("C", Ahead), ("J2", Ahead)]),
        path("LOOP", &[("J1", Ahead), ("D", Ahead), ("J2", Ahead)]),
        path("MAIN", &[("J2", Reverse), ("C", Reverse), ("J1", Reverse)]),
        path("LOOP", &[("J2", Reverse), ("D", Reverse), ("J1", Reverse)]),
    ];
    il.add_deadlock_area("loop", paths).unwrap();
    il.commission().unwrap();
    il
}

/// Two opposing trains with their routes through the loop cleared.
fn running() -> Interlocking {
    let mut il = build();
    let (t1, t2) = (tid(1), tid(2));
    let r1 = route(
        &il,
        &[("B", Ahead), ("J1", Ahead), ("C", Ahead), ("J2", Ahead), ("E", Ahead), ("F", Ahead)],
    );
    let r2 = route(
        &il,
        &[
            ("F", Reverse),
            ("E", Reverse),
            ("J2", Reverse),
            ("C", Reverse),
            ("J1", Reverse),
            ("B", Reverse),
            ("A", Reverse),
        ],
    );
    il.add_train(Train::new(t1, "T1", r1)).unwrap();
    il.add_train(Train::new(t2, "T2", r2)).unwrap();
    il.request_train_clearance(t1).unwrap();
    il.request_train_clearance(t2).unwrap();
    il
}

#[test]
fn snapshot_survives_json_and_restores_identically() {
    let il = running();
    let snapshot = il.snapshot();
    assert_eq!(snapshot.section_count, il.graph().len());
    assert_eq!(snapshot.deadlocks[0].assignments.len(), 2);

    let json = serde_json::to_string_pretty(&snapshot).unwrap();
    let parsed: InterlockSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, snapshot);

    let mut fresh = build();
    assert_ne!(fresh.snapshot(), snapshot);
    fresh.restore(&parsed).unwrap();
    assert_eq!(fresh.snapshot(), snapshot);

    let sb = fresh.find_signal("SB").unwrap();
    assert_eq!(
        fresh.signal(sb).unwrap().displayed_aspect(),
        il.signal(sb).unwrap().displayed_aspect()
    );
}

#[test]
fn restore_rejects_a_different_layout() {
    let il = running();
    let snapshot = il.snapshot();

    let mut b = TrackBuilder::new();
    let x = b.add_section("X", SectionKind::EndOfTrack, m(100.0));
    let y = b.add_section("Y", SectionKind::EndOfTrack, m(100.0));
    b.connect(x, Ahead, y, Ahead).unwrap();
    let mut other = Interlocking::new(b.build().unwrap(), InterlockConfig::default());
    other.commission().unwrap();
    let before = other.snapshot();

    let err = other.restore(&snapshot).unwrap_err();
    assert!(matches!(
        err,
        InterlockError::SectionCountMismatch { saved: 8, built: 2 }
    ));
    assert_eq!(other.snapshot(), before);
}

#[test]
fn restore_rejects_a_different_signal_count() {
    let il = running();
    let mut snapshot = il.snapshot();
    snapshot.signals.pop();

    let mut fresh = build();
    let before = fresh.snapshot();
    let err = fresh.restore(&snapshot).unwrap_err();
    assert!(matches!(
        err,
        InterlockError::SignalCountMismatch { saved: 1, built: 2 }
    ));
    assert_eq!(fresh.snapshot(), before);
}
