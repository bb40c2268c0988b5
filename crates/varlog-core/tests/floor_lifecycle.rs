// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use varlog_core::{MetadataStore, OpKind, VariableStore};
use varlog_dry_tests::{message, state_block, EngineTestBuilder, FloorScript};

#[test]
fn reapplying_unchanged_text_is_skipped() {
    let mut engine = EngineTestBuilder::new().build();
    let text = message("The hero rests.", "hp: +5");
    let first = engine.apply_floor(1, &text).expect("apply");
    assert_eq!(first.atoms.len(), 1);

    let again = engine.apply_floor(1, &text).expect("re-apply");
    assert!(again.skipped);
    assert!(again.atoms.is_empty());
    assert_eq!(engine.value_at("hp"), Some(json!(5)));
}

#[test]
fn prose_changes_outside_blocks_do_not_reapply() {
    let mut engine = EngineTestBuilder::new().build();
    engine
        .apply_floor(1, &message("draft one", "hp: +5"))
        .expect("apply");
    let edited = engine
        .apply_floor(1, &message("draft two, reworded", "hp: +5"))
        .expect("apply edited");
    assert!(edited.skipped);
}

#[test]
fn retraction_clears_only_that_floor() {
    let mut engine = FloorScript::new()
        .block(1, "a: 1")
        .block(2, "b: 2\n$enum={x} c\nc: y")
        .run()
        .expect("script");
    assert!(engine.advisory().is_some());
    assert_eq!(engine.wal_floors().expect("wal"), vec![1, 2]);

    let outcome = engine
        .apply_floor(2, "the block was edited away")
        .expect("retract");
    assert!(!outcome.skipped);
    assert!(outcome.atoms.is_empty());
    assert_eq!(engine.wal_floors().expect("wal"), vec![1]);
    assert!(engine.advisory().is_none());

    engine.restore_to_floor(10).expect("restore");
    assert_eq!(engine.value_at("a"), Some(json!(1)));
    assert_eq!(engine.value_at("b"), None);
}

#[test]
fn restoring_after_all_floors_matches_live_state() {
    let script = FloorScript::new()
        .block(0, "$schema hero\n  name: \"\"\n  stats: {hp: 0, mp: 0}\n  bag: []")
        .block(1, "hero.name: Aria\nhero.stats.hp: 30\nhero.bag: +[\"rope\", \"lamp\"]")
        .block(2, "$range=[0,40] hero.stats.hp\nhero.stats.hp: +25\nhero.stats.atk: 3")
        .block(3, "hero.bag: -\"rope\"\nlog:\n  - woke up\n  - left town")
        .block(4, "log[0]: null\nhero.stats.mp: (7)");
    let mut engine = EngineTestBuilder::new().checkpoint_every(0).build();
    script.apply(&mut engine).expect("apply");
    let live = engine.snapshot_vars();
    let live_digest = engine.state_digest();

    let restored = engine.restore_to_floor(4).expect("restore");
    assert!(restored.ok);
    assert_eq!(restored.used_checkpoint, None);
    assert_eq!(restored.replayed, 5);
    assert_eq!(engine.snapshot_vars(), live);
    assert_eq!(engine.state_digest(), live_digest);
    assert_eq!(
        engine.value_at("hero"),
        Some(json!({"name": "Aria", "stats": {"hp": 40, "mp": 7}, "bag": ["lamp"]}))
    );
    assert_eq!(engine.value_at("log"), Some(json!(["left town"])));
}

#[test]
fn checkpoint_replay_equals_full_replay() {
    let mut script = FloorScript::new();
    for floor in 0..12 {
        script = script.block(floor, &format!("n: +1\nlast: {floor}\nseen: +[{floor}]"));
    }
    let mut with_cp = EngineTestBuilder::new().checkpoint_every(5).build();
    let mut without_cp = EngineTestBuilder::new().checkpoint_every(0).build();
    script.apply(&mut with_cp).expect("apply");
    script.apply(&mut without_cp).expect("apply");
    assert_eq!(with_cp.checkpoint_floors().expect("cps"), vec![0, 5, 10]);
    assert!(without_cp.checkpoint_floors().expect("cps").is_empty());

    for target in [3_i64, 5, 9, 11] {
        let a = with_cp.restore_to_floor(target).expect("restore");
        let b = without_cp.restore_to_floor(target).expect("restore");
        assert!(a.used_checkpoint.is_some());
        assert_eq!(b.used_checkpoint, None);
        assert_eq!(with_cp.snapshot_vars(), without_cp.snapshot_vars(), "floor {target}");
        assert_eq!(with_cp.value_at("n"), Some(json!(target + 1)));
    }
}

#[test]
fn hp_example_restore_and_trim() {
    let mut engine = FloorScript::new()
        .block(3, "hp: 50")
        .block(7, "hp: +10")
        .run()
        .expect("script");
    assert_eq!(engine.value_at("hp"), Some(json!(60)));

    engine.restore_to_floor(5).expect("restore");
    assert_eq!(engine.value_at("hp"), Some(json!(50)));

    engine.restore_to_floor(7).expect("restore");
    assert_eq!(engine.value_at("hp"), Some(json!(60)));

    let trimmed = engine.trim_from_floor(7).expect("trim");
    assert_eq!(trimmed.wal_removed, 1);
    engine.restore_to_floor(10).expect("restore");
    assert_eq!(engine.value_at("hp"), Some(json!(50)));
}

#[test]
fn restore_forgets_applied_signatures_past_target() {
    let mut engine = FloorScript::new()
        .block(1, "x: 1")
        .block(2, "x: 2")
        .run()
        .expect("script");
    engine.restore_to_floor(1).expect("restore");
    let reapplied = engine.apply_floor(2, &state_block("x: 2")).expect("apply");
    assert!(!reapplied.skipped, "floor 2 must run again after rewinding");
    assert_eq!(engine.value_at("x"), Some(json!(2)));
}

#[test]
fn trim_drops_checkpoints_too() {
    let mut engine = EngineTestBuilder::new().checkpoint_every(2).build();
    FloorScript::new()
        .block(2, "a: 1")
        .block(4, "a: 2")
        .block(6, "a: 3")
        .apply(&mut engine)
        .expect("apply");
    let out = engine.trim_from_floor(4).expect("trim");
    assert_eq!((out.wal_removed, out.checkpoints_removed), (2, 2));
    assert_eq!(engine.checkpoint_floors().expect("cps"), vec![2]);
}

#[test]
fn every_mutating_call_requests_a_save() {
    let mut engine = EngineTestBuilder::new().build();
    engine.apply_floor(1, &state_block("a: 1")).expect("apply");
    engine.apply_floor(2, "no block").expect("retract");
    engine.restore_to_floor(1).expect("restore");
    engine.trim_from_floor(1).expect("trim");
    assert_eq!(engine.meta().save_requests(), 4);
}

#[test]
fn multiple_blocks_concatenate_in_order() {
    let mut engine = EngineTestBuilder::new().build();
    let text = format!(
        "{}\nsome narration\n{}",
        state_block("$range=[0,10] hp"),
        state_block("hp: 99")
    );
    let out = engine.apply_floor(1, &text).expect("apply");
    assert_eq!(engine.value_at("hp"), Some(json!(10)));
    assert_eq!(out.notes.len(), 1);
}

#[test]
fn custom_block_tag() {
    let mut engine = EngineTestBuilder::new().block_tag("vars").build();
    engine
        .apply_floor(1, "<state>a: 1</state><vars>b: 2</vars>")
        .expect("apply");
    assert_eq!(engine.value_at("a"), None);
    assert_eq!(engine.value_at("b"), Some(json!(2)));
}

#[test]
fn parse_warnings_surface_as_notes_and_wal_keeps_ops() {
    let mut engine = EngineTestBuilder::new().build();
    let out = engine
        .apply_floor(1, &state_block("cfg: {broken: [1, 2}"))
        .expect("apply");
    assert_eq!(out.atoms.len(), 1);
    assert_eq!(out.atoms[0].op, OpKind::Set);
    assert!(out.notes.iter().any(|n| n.contains("malformed")));
    assert_eq!(engine.value_at("cfg"), Some(json!("{broken: [1, 2}")));
}

#[test]
fn seeded_variables_are_visible_to_ops() {
    let mut engine = EngineTestBuilder::new()
        .with_var("party", r#"{"size":2}"#)
        .build();
    engine
        .apply_floor(1, &state_block("party.size: +1"))
        .expect("apply");
    assert_eq!(engine.value_at("party.size"), Some(json!(3)));
    let (vars, _) = engine.into_parts();
    assert_eq!(vars.get_scalar("party").as_deref(), Some(r#"{"size":3}"#));
}
