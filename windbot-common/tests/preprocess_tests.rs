//! Sequence preprocessor behaviour on complete timelines

mod helpers;

use helpers::*;
use windbot_common::fingering::{build_release_frame, Hand, InstrumentKind};
use windbot_common::sequence::SerialCommand;
use windbot_common::Error;

#[test]
fn test_repeated_note_then_rest_then_note() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre
        .generate(&timeline(&[("C4", 1.0), ("C4", 1.0), ("NO", 2.0), ("D4", 1.0)]), "scenario.json")
        .unwrap();

    let labels: Vec<&str> = seq.events.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, ["C4", "TONGUE", "C4", "REST", "PRE_D4", "D4", "END"]);

    let e = &seq.events;
    // First C4 pays gL = 15ms, second C4 inherits gR = 15ms
    assert!(approx_eq(e[0].duration_ms, 985.0));
    assert_eq!(e[0].frames.len(), 2);
    assert_eq!(e[0].serial, Some(SerialCommand::On));

    assert!(approx_eq(e[1].duration_ms, 30.0));
    assert!(approx_eq(e[1].timestamp_ms, 985.0));
    assert!(e[1].frames.is_empty());
    assert_eq!(e[1].serial, Some(SerialCommand::Off));

    assert!(approx_eq(e[2].timestamp_ms, 1015.0));
    assert!(approx_eq(e[2].duration_ms, 985.0));
    assert!(e[2].frames.is_empty(), "continuation keeps the fingering");
    assert_eq!(e[2].serial, Some(SerialCommand::On));

    assert!(approx_eq(e[3].timestamp_ms, 2000.0));
    assert!(approx_eq(e[3].duration_ms, 1600.0));
    assert_eq!(e[3].serial, Some(SerialCommand::Off));
    assert_eq!(e[3].frames[0].data, build_release_frame(&RELEASE));

    assert!(approx_eq(e[4].timestamp_ms, 3600.0));
    assert!(approx_eq(e[4].duration_ms, 400.0));
    assert_eq!(e[4].serial, None);
    assert_eq!(e[4].frames, e[5].frames, "pre-switch loads the next note's fingering");

    assert!(approx_eq(e[5].timestamp_ms, 4000.0));
    assert!(approx_eq(e[5].duration_ms, 1000.0));

    assert!(approx_eq(e[6].timestamp_ms, 5000.0));
    assert_eq!(e[6].duration_ms, 0.0);
    assert_eq!(e[6].serial, Some(SerialCommand::Off));
    assert_eq!(e[6].frames.len(), 2);

    assert!(approx_eq(seq.meta.total_duration_ms, 5000.0));
    assert_eq!(seq.meta.total_events, 7);
}

// Holds whenever every rest is followed by a note; an unfollowed rest leaves
// its last fifth as silence with no event.
#[test]
fn test_durations_sum_to_total() {
    let pre = preprocessor(InstrumentKind::Primary, 97.0, 45);
    let seq = pre
        .generate(
            &timeline(&[
                ("C4", 0.5),
                ("C4", 1.5),
                ("C4", 1.0),
                ("D4", 2.0),
                ("NO", 1.5),
                ("E4", 0.25),
                ("E4", 0.75),
            ]),
            "sum.json",
        )
        .unwrap();

    let sum: f64 = seq.events.iter().map(|e| e.duration_ms).sum();
    assert!((sum - seq.meta.total_duration_ms).abs() < 1e-6);
    assert_eq!(seq.meta.total_events, seq.events.len());
    seq.validate().unwrap();
}

#[test]
fn test_tongue_gaps_match_delay_in_three_note_run() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre
        .generate(&timeline(&[("C4", 1.0), ("C4", 2.0), ("C4", 1.0)]), "run.json")
        .unwrap();

    let labels: Vec<&str> = seq.events.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, ["C4", "TONGUE", "C4", "TONGUE", "C4", "END"]);

    // First gap split 1:2 → 10/20, second gap split 2:1 → 20/10
    assert!(approx_eq(seq.events[0].duration_ms, 990.0));
    assert!(approx_eq(seq.events[2].duration_ms, 2000.0 - 20.0 - 20.0));
    assert!(approx_eq(seq.events[4].duration_ms, 990.0));
    for gap in seq.events.iter().filter(|e| e.label == "TONGUE") {
        assert!(approx_eq(gap.duration_ms, 30.0));
    }
    assert!(approx_eq(seq.meta.total_duration_ms, 4000.0));
}

#[test]
fn test_compensation_clamps_at_zero() {
    // 1/64 beat at 240 BPM is ~3.9ms, smaller than its share of a 100ms gap
    let pre = preprocessor(InstrumentKind::Primary, 240.0, 100);
    let seq = pre
        .generate(&timeline(&[("C4", 0.015625), ("C4", 0.015625)]), "tiny.json")
        .unwrap();
    assert_eq!(seq.events[0].duration_ms, 0.0);
    assert_eq!(seq.events[2].duration_ms, 0.0);
    seq.validate().unwrap();
}

#[test]
fn test_rest_followed_by_note_splits_80_20() {
    let pre = preprocessor(InstrumentKind::Primary, 120.0, 30);
    let seq = pre.generate(&timeline(&[("NO", 3.0), ("E4", 1.0)]), "rest.json").unwrap();

    assert_eq!(seq.events[0].label, "REST");
    assert_eq!(seq.events[1].label, "PRE_E4");
    let rest_ms = 1500.0;
    assert!(approx_eq(seq.events[0].duration_ms, rest_ms * 0.8));
    assert!(approx_eq(seq.events[1].duration_ms, rest_ms * 0.2));
    assert!(approx_eq(seq.events[0].duration_ms + seq.events[1].duration_ms, rest_ms));
}

#[test]
fn test_trailing_rest_has_no_pre_switch() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre.generate(&timeline(&[("D4", 1.0), ("NO", 1.0)]), "tail.json").unwrap();

    let labels: Vec<&str> = seq.events.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, ["D4", "REST", "END"]);
    assert!(approx_eq(seq.events[1].duration_ms, 800.0));
    assert!(approx_eq(seq.events[2].timestamp_ms, 2000.0));
    assert!(approx_eq(seq.meta.total_duration_ms, 2000.0));
}

#[test]
fn test_consecutive_rests_only_last_pre_switches() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre
        .generate(&timeline(&[("NO", 1.0), ("NO", 1.0), ("C4", 1.0)]), "rests.json")
        .unwrap();

    let labels: Vec<&str> = seq.events.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, ["REST", "REST", "PRE_C4", "C4", "END"]);
}

#[test]
fn test_rest_between_equal_notes_is_not_tonguing() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre
        .generate(&timeline(&[("C4", 1.0), ("NO", 1.0), ("C4", 1.0)]), "split.json")
        .unwrap();

    let labels: Vec<&str> = seq.events.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, ["C4", "REST", "PRE_C4", "C4", "END"]);
    assert!(approx_eq(seq.events[0].duration_ms, 1000.0));
    assert_eq!(seq.events[3].frames.len(), 2);
}

#[test]
fn test_missing_fingering_aborts_generation() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    match pre.generate(&timeline(&[("C4", 1.0), ("G9", 1.0)]), "bad.json") {
        Err(Error::MissingFingering(note)) => assert_eq!(note, "G9"),
        other => panic!("Expected MissingFingering, got {:?}", other),
    }
}

#[test]
fn test_missing_fingering_after_rest_aborts_generation() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    assert!(matches!(
        pre.generate(&timeline(&[("NO", 1.0), ("G9", 1.0)]), "bad.json"),
        Err(Error::MissingFingering(_))
    ));
}

#[test]
fn test_unplayable_duration_is_validation_error() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    match pre.generate(&timeline(&[("C4", 1.0), ("D4", 1e308)]), "huge.json") {
        Err(Error::Validation { index, .. }) => assert_eq!(index, 2),
        other => panic!("Expected validation error, got {:?}", other),
    }

    let crawl = preprocessor(InstrumentKind::Primary, 1e-300, 30);
    assert!(matches!(
        crawl.generate(&timeline(&[("C4", 1.0)]), "crawl.json"),
        Err(Error::Validation { index: 1, .. })
    ));
}

#[test]
fn test_overlong_sequence_is_validation_error() {
    // 1000 beats at 1 BPM is 60000s per note; the second note passes 24h
    let pre = preprocessor(InstrumentKind::Primary, 1.0, 30);
    match pre.generate(&timeline(&[("C4", 1000.0), ("NO", 1000.0), ("D4", 1.0)]), "long.json") {
        Err(Error::Validation { index, .. }) => assert_eq!(index, 2),
        other => panic!("Expected validation error, got {:?}", other),
    }
}

#[test]
fn test_register_jump_gets_release_step() {
    let pre = preprocessor(InstrumentKind::Secondary, 60.0, 30);
    let seq = pre.generate(&timeline(&[("A5", 1.0), ("B5", 1.0)]), "reg.json").unwrap();

    let b5 = &seq.events[1];
    assert_eq!(b5.label, "B5");
    assert_eq!(b5.frames.len(), 3);
    assert_eq!(b5.frames[0].hand, Hand::Left);
    assert_eq!(b5.frames[0].data, build_release_frame(&RELEASE));
    assert_eq!(b5.frames[1].hand, Hand::Left);
    assert_eq!(b5.frames[1].data.channel(0), 160);
    assert_eq!(b5.frames[1].data.channel(1), 60);
    assert_eq!(b5.frames[2].hand, Hand::Right);
}

#[test]
fn test_rest_neutralizes_register_state() {
    let pre = preprocessor(InstrumentKind::Secondary, 60.0, 30);
    let seq = pre
        .generate(&timeline(&[("A5", 1.0), ("NO", 1.0), ("B5", 1.0)]), "reg.json")
        .unwrap();

    // Rest released the hand, so neither the pre-switch nor B5 need a step
    let pre_b5 = &seq.events[2];
    assert_eq!(pre_b5.label, "PRE_B5");
    assert_eq!(pre_b5.frames.len(), 2);
    assert_eq!(seq.events[3].frames.len(), 2);
}

#[test]
fn test_primary_instrument_has_no_release_step() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre.generate(&timeline(&[("A5", 1.0), ("B5", 1.0)]), "reg.json").unwrap();
    assert_eq!(seq.events[1].frames.len(), 2);
}

#[test]
fn test_frames_use_configured_device_ids() {
    let pre = preprocessor(InstrumentKind::Primary, 60.0, 30);
    let seq = pre.generate(&timeline(&[("C4", 1.0)]), "ids.json").unwrap();
    assert_eq!(seq.events[0].frames[0].id, "0x28");
    assert_eq!(seq.events[0].frames[1].id, "0x29");
    assert_eq!(seq.meta.source_file, "ids.json");
    assert_eq!(seq.meta.instrument, InstrumentKind::Primary);
}

#[test]
fn test_invalid_bpm_rejected_at_construction() {
    let result = windbot_common::preprocess::SequencePreprocessor::new(
        &rig_config(),
        InstrumentKind::Primary,
        fingering(),
        f64::INFINITY,
        30,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}
