//! The demo layout and scenario load, compile and run.

use std::path::{Path, PathBuf};

use sb_interlock::{Aspect, HoldState};
use sb_project::{ActionOutcome, build_interlocking, load_layout, load_scenario, run_scenario};

fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

#[test]
fn demo_layout_compiles_without_drops() {
    let layout = load_layout(&demos().join("branch_line.yaml")).unwrap();
    let compiled = build_interlocking(&layout).unwrap();
    assert!(compiled.dropped.is_empty(), "{:?}", compiled.dropped);
    assert_eq!(compiled.interlocking.signals().len(), 3);
    assert!(compiled.interlocking.is_commissioned());
}

#[test]
fn demo_scenario_clears_and_passes_the_first_signal() {
    let layout = load_layout(&demos().join("branch_line.yaml")).unwrap();
    let scenario = load_scenario(&demos().join("branch_line_scenario.yaml"), &layout).unwrap();
    let mut il = build_interlocking(&layout).unwrap().interlocking;

    let outcomes = run_scenario(&mut il, &scenario).unwrap();
    assert_eq!(outcomes.len(), scenario.actions.len());

    let s1 = il.find_signal("S1").unwrap();
    assert!(matches!(outcomes[1], ActionOutcome::Cleared { clear: true, .. }));
    match &outcomes[2] {
        ActionOutcome::Advanced { passed, .. } => assert_eq!(passed, &vec![s1]),
        other => panic!("unexpected outcome {other:?}"),
    }

    let first = il.signal(s1).unwrap();
    assert_eq!(first.displayed_aspect(), Aspect::Stop);
    let s3 = il.find_signal("S3").unwrap();
    assert_eq!(il.signal(s3).unwrap().hold_state(), HoldState::None);
}
