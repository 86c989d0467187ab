//! Integration tests for sb-graph.

use proptest::prelude::*;
use sb_core::m;
use sb_graph::{SectionKind, TrackBuilder, TrackDirection, TrackGraph};

use TrackDirection::{Ahead, Reverse};

/// A single-track line with a passing loop:
///
/// ```text
/// A - B - J1 = C = J2 - E - F
///            \ D /
/// ```
fn passing_loop() -> TrackGraph {
    let mut b = TrackBuilder::new();
    let a = b.add_section("A", SectionKind::EndOfTrack, m(50.0));
    let sb = b.add_section("B", SectionKind::Normal, m(800.0));
    let j1 = b.add_section("J1", SectionKind::Junction, m(30.0));
    let c = b.add_section("C", SectionKind::Normal, m(600.0));
    let d = b.add_section("D", SectionKind::Normal, m(600.0));
    let j2 = b.add_section("J2", SectionKind::Junction, m(30.0));
    let e = b.add_section("E", SectionKind::Normal, m(800.0));
    let f = b.add_section("F", SectionKind::EndOfTrack, m(50.0));

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

#[test]
fn passing_loop_builds() {
    let graph = passing_loop();
    assert_eq!(graph.len(), 8);

    let j1 = graph.find("J1").unwrap();
    let j2 = graph.find("J2").unwrap();
    let section = graph.section(j1).unwrap();
    assert!(section.is_facing(Ahead));
    assert!(!section.is_facing(Reverse));
    assert!(graph.section(j2).unwrap().is_facing(Reverse));

    // facing points have no single static exit
    assert_eq!(graph.next(j1, Ahead), None);
    assert_eq!(
        graph.next(j1, Reverse).map(|p| p.link),
        graph.find("B")
    );
}

#[test]
fn walking_back_reaches_the_start() {
    let graph = passing_loop();
    let mut current = graph.find("E").unwrap();
    let mut seen = vec![current];
    while let Some(pin) = graph.next(current, Reverse) {
        current = pin.link;
        seen.push(current);
    }
    // J2 splits when travelling in reverse, so the walk stops there
    assert_eq!(seen.last().copied(), graph.find("J2"));
}

#[test]
fn end_of_track_with_both_ends_linked_is_invalid() {
    let mut b = TrackBuilder::new();
    let x = b.add_section("X", SectionKind::Normal, m(10.0));
    let buffer = b.add_section("Buffer", SectionKind::EndOfTrack, m(10.0));
    let y = b.add_section("Y", SectionKind::Normal, m(10.0));
    b.connect(x, Ahead, buffer, Ahead).unwrap();
    b.connect(buffer, Ahead, y, Ahead).unwrap();
    assert!(b.build().is_err());
}

#[test]
fn non_finite_length_is_invalid() {
    let mut b = TrackBuilder::new();
    let x = b.add_section("X", SectionKind::EndOfTrack, m(10.0));
    let y = b.add_section("Y", SectionKind::EndOfTrack, m(f64::NAN));
    b.connect(x, Ahead, y, Ahead).unwrap();
    let err = b.build().unwrap_err();
    assert!(err.to_string().contains("invalid length"), "{err}");
}

proptest! {
    #[test]
    fn straight_lines_are_always_valid(lengths in prop::collection::vec(1.0f64..5_000.0, 1..40)) {
        let mut b = TrackBuilder::new();
        let ids: Vec<_> = lengths
            .iter()
            .enumerate()
            .map(|(i, len)| b.add_section(format!("S{i}"), SectionKind::Normal, m(*len)))
            .collect();
        for pair in ids.windows(2) {
            b.connect(pair[0], Ahead, pair[1], Ahead).unwrap();
        }
        let graph = b.build().unwrap();
        prop_assert_eq!(graph.len(), lengths.len());
        for pair in ids.windows(2) {
            prop_assert_eq!(graph.next(pair[0], Ahead).map(|p| p.link), Some(pair[1]));
            prop_assert_eq!(graph.next(pair[1], Reverse).map(|p| p.link), Some(pair[0]));
        }
    }
}
