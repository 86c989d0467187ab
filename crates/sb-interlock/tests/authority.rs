//! Node-control authority tests for sb-interlock.

use sb_core::{Id, SectionId, TrainId, m};
use sb_graph::{SectionKind, TrackBuilder, TrackDirection, TrackGraph};
use sb_interlock::{
    ControlMode, EndAuthority, HeadSpec, InterlockConfig, InterlockError, Interlocking, SignalFunction, SignalKind,
    SignalSpec, TrackRoute, Train,
};

use TrackDirection::Ahead;

fn tid(i: u32) -> TrainId {
    Id::from_index(i)
}

/// ```text
/// A(100) | B(400) | C(400) | D(100)
/// ```
fn four_sections() -> TrackGraph {
    let mut b = TrackBuilder::new();
    let a = b.add_section("A", SectionKind::EndOfTrack, m(100.0));
    let sb = b.add_section("B", SectionKind::Normal, m(400.0));
    let c = b.add_section("C", SectionKind::Normal, m(400.0));
    let d = b.add_section("D", SectionKind::EndOfTrack, m(100.0));
    b.connect(a, Ahead, sb, Ahead).unwrap();
    b.connect(sb, Ahead, c, Ahead).unwrap();
    b.connect(c, Ahead, d, Ahead).unwrap();
    b.build().unwrap()
}

fn sec(il: &Interlocking, name: &str) -> SectionId {
    il.graph().find(name).unwrap()
}

fn whole_route(il: &Interlocking) -> TrackRoute {
    TrackRoute::from_steps(["A", "B", "C", "D"].map(|n| (sec(il, n), Ahead)))
}

fn node_train(il: &mut Interlocking, id: TrainId) {
    let mut train = Train::new(id, "node", whole_route(il));
    train.control_mode = ControlMode::AutoNode;
    il.add_train(train).unwrap();
}

#[test]
fn authority_runs_to_end_of_track() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    il.commission().unwrap();
    let t1 = tid(1);
    node_train(&mut il, t1);

    let clearance = il.request_clear_node(t1).unwrap();
    assert_eq!(clearance.end_authority, EndAuthority::EndOfTrack);
    assert_eq!(clearance.distance, m(1000.0));
    assert_eq!(clearance.last_reserved_index, Some(3));
    for name in ["B", "C", "D"] {
        assert!(il.circuit_state(sec(&il, name)).unwrap().is_reserved_by(t1), "{name}");
    }

    // asking again changes nothing
    let again = il.request_clear_node(t1).unwrap();
    assert_eq!(again, clearance);
}

#[test]
fn authority_stops_at_max_distance() {
    let config = InterlockConfig {
        max_check_distance_m: 300.0,
        ..InterlockConfig::default()
    };
    let mut il = Interlocking::new(four_sections(), config);
    il.commission().unwrap();
    let t1 = tid(1);
    node_train(&mut il, t1);

    let clearance = il.request_clear_node(t1).unwrap();
    assert_eq!(clearance.end_authority, EndAuthority::MaxDistance);
    assert_eq!(clearance.distance, m(500.0));
    assert_eq!(clearance.last_reserved_index, Some(1));
    assert!(il.circuit_state(sec(&il, "C")).unwrap().reserved().is_none());
}

#[test]
fn authority_stops_behind_a_train() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    il.commission().unwrap();
    let (t1, t2) = (tid(1), tid(2));
    node_train(&mut il, t1);
    let ahead = TrackRoute::from_steps([(sec(&il, "C"), Ahead), (sec(&il, "D"), Ahead)]);
    il.add_train(Train::new(t2, "ahead", ahead)).unwrap();

    let clearance = il.request_clear_node(t1).unwrap();
    assert_eq!(clearance.end_authority, EndAuthority::TrainAhead);
    assert_eq!(clearance.last_reserved_index, Some(1));
    assert_eq!(clearance.distance, m(500.0));
}

#[test]
fn signal_takes_over_authority() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    let b = sec(&il, "B");
    il.add_signal(SignalSpec {
        name: "SB".into(),
        kind: SignalKind::Signal,
        section: b,
        direction: Ahead,
        offset: m(400.0),
        heads: vec![HeadSpec {
            function: SignalFunction::Normal,
            signal_type: None,
        }],
        allow_part_route: false,
    })
    .unwrap();
    il.commission().unwrap();
    let t1 = tid(1);
    node_train(&mut il, t1);

    let clearance = il.request_clear_node(t1).unwrap();
    assert_eq!(clearance.end_authority, EndAuthority::EndOfAuthority);
    assert_eq!(clearance.last_reserved_index, Some(1));
    assert!(il.circuit_state(b).unwrap().is_reserved_by(t1));
    assert!(!il.circuit_state(sec(&il, "C")).unwrap().is_reserved_by(t1));
}

#[test]
fn break_down_releases_the_rest_of_the_route() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    il.commission().unwrap();
    let t1 = tid(1);
    node_train(&mut il, t1);
    il.request_clear_node(t1).unwrap();

    let routed = il.train(t1).unwrap().routed();
    il.break_down_route(sec(&il, "C"), routed).unwrap();
    assert!(il.circuit_state(sec(&il, "B")).unwrap().is_reserved_by(t1));
    assert!(il.circuit_state(sec(&il, "C")).unwrap().reserved().is_none());
    assert!(il.circuit_state(sec(&il, "D")).unwrap().reserved().is_none());
    assert_eq!(il.train(t1).unwrap().last_reserved[0], Some(sec(&il, "B")));

    // authority can be rebuilt over the released sections
    let clearance = il.request_clear_node(t1).unwrap();
    assert_eq!(clearance.end_authority, EndAuthority::EndOfTrack);
    assert_eq!(clearance.last_reserved_index, Some(3));
}

#[test]
fn unknown_train_is_an_error() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    il.commission().unwrap();
    assert!(il.request_clear_node(tid(9)).is_err());
}

#[test]
fn train_past_its_route_end_is_refused() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    il.commission().unwrap();
    let mut train = Train::new(tid(1), "lost", whole_route(&il));
    train.position.route_index = 9;
    assert!(matches!(il.add_train(train), Err(InterlockError::InvalidArg { .. })));
    assert!(il.train(tid(1)).is_none());
}

#[test]
fn authority_past_route_end_is_an_error() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    il.commission().unwrap();
    let t1 = tid(1);
    node_train(&mut il, t1);
    il.train_mut(t1).unwrap().position.route_index = 9;
    assert!(matches!(
        il.request_clear_node(t1),
        Err(InterlockError::InvalidArg { .. })
    ));
}

#[test]
fn non_finite_signal_offset_is_refused() {
    let mut il = Interlocking::new(four_sections(), InterlockConfig::default());
    let b = sec(&il, "B");
    for offset in [f64::NAN, -1.0, 401.0] {
        let placed = il.add_signal(SignalSpec {
            name: "SB".into(),
            kind: SignalKind::Signal,
            section: b,
            direction: Ahead,
            offset: m(offset),
            heads: vec![HeadSpec {
                function: SignalFunction::Normal,
                signal_type: None,
            }],
            allow_part_route: false,
        });
        assert!(matches!(placed, Err(InterlockError::InvalidPlacement { .. })), "{offset}");
    }
}
