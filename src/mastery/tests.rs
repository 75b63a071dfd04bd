use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;

use super::*;
use crate::concept::{ConceptKey, ConceptMode, ContextKey};
use crate::theory::TonalFamily;

const START: i64 = 1_700_000_000_000;

fn key(raw: &str) -> ConceptKey {
    raw.parse().unwrap()
}

fn context(raw: &str) -> ContextKey {
    raw.parse().unwrap()
}

fn attempt(keys: &[&str], ctx: &str, correct: bool) -> AttemptRecord {
    AttemptRecord {
        concept_keys: keys.iter().map(|k| key(k)).collect(),
        context: context(ctx),
        correct,
        response_ms: Some(1500),
    }
}

fn fixture() -> (AdaptiveStore<MemoryStore, FixedClock>, FixedClock) {
    let clock = FixedClock::new(START);
    (AdaptiveStore::with_clock(MemoryStore::new(), clock.clone()), clock)
}

const DEGREES: &str = "scale_degree|melodic|major";

#[test]
fn test_three_correct_degree_answers() {
    let (mut store, clock) = fixture();
    let degree = key("degree:3");
    let ctx = context(DEGREES);

    let mut masteries = Vec::new();
    for _ in 0..3 {
        store.record_attempt(&attempt(&["degree:3"], DEGREES, true));
        let snapshot = store.snapshot();
        let bucket = snapshot.bucket(&ctx, &degree).unwrap();
        masteries.push(bucket.mastery);
        assert!(bucket.mastery < CONFIDENT_MASTERY);
        assert_eq!(bucket.due_at, clock.now_ms());
        assert_eq!(bucket.interval_days, 0);
        clock.advance_ms(5_000);
    }
    assert!(masteries[2] > masteries[0]);
}

#[test]
fn test_interval_ladder_through_store() {
    let (mut store, clock) = fixture();
    let ctx = context(DEGREES);
    let degree = key("degree:5");

    let mut intervals = Vec::new();
    for _ in 0..14 {
        store.record_attempt(&attempt(&["degree:5"], DEGREES, true));
        let snapshot = store.snapshot();
        let bucket = snapshot.bucket(&ctx, &degree).unwrap();
        if bucket.mastery >= CONFIDENT_MASTERY {
            intervals.push(bucket.interval_days);
            assert_eq!(bucket.due_at, clock.now_ms() + bucket.interval_days as i64 * DAY_MS);
        }
        clock.advance_days(1);
    }
    assert_eq!(intervals, vec![1, 3, 7, 14, 30, 30]);
}

#[test]
fn test_wrong_answer_makes_key_due_now() {
    let (mut store, clock) = fixture();
    for _ in 0..12 {
        store.record_attempt(&attempt(&["degree:5"], DEGREES, true));
    }
    let filter = ReviewFilter::default();
    assert!(store.review_queue(ReviewStrategy::Due, &filter).is_empty());

    clock.advance_ms(60_000);
    store.record_attempt(&attempt(&["degree:5"], DEGREES, false));
    assert_eq!(store.review_queue(ReviewStrategy::Due, &filter), vec![key("degree:5")]);
    let bucket = store.snapshot().bucket(&context(DEGREES), &key("degree:5")).cloned().unwrap();
    assert_eq!(bucket.interval_days, 0);
    assert_eq!(bucket.due_at, clock.now_ms());
}

#[test]
fn test_due_queue_sorted_by_due_time() {
    let (mut store, clock) = fixture();
    store.record_attempt(&attempt(&["degree:6"], DEGREES, false));
    clock.advance_ms(1_000);
    store.record_attempt(&attempt(&["degree:2"], DEGREES, false));
    clock.advance_ms(1_000);
    store.record_attempt(&attempt(&["chord:minor"], "chord_quality|harmonic|major", false));
    // confident bucket, not due yet
    for _ in 0..10 {
        store.record_attempt(&attempt(&["degree:1"], DEGREES, true));
    }

    let due = store.review_queue(ReviewStrategy::Due, &ReviewFilter::default());
    assert_eq!(due, vec![key("degree:6"), key("degree:2"), key("chord:minor")]);

    let now = store.now_ms();
    let snapshot = store.snapshot();
    for entry in store.review_entries(ReviewStrategy::Due, &ReviewFilter::default()) {
        assert!(entry.due_at <= now);
        assert!(snapshot.bucket(&entry.context, &entry.key).is_some());
    }

    let only_degrees = ReviewFilter {
        modes: vec![ConceptMode::ScaleDegree],
        family: None,
    };
    assert_eq!(
        store.review_queue(ReviewStrategy::Due, &only_degrees),
        vec![key("degree:6"), key("degree:2")]
    );

    // the confident key comes due after its three-day interval
    clock.advance_days(4);
    let due = store.review_queue(ReviewStrategy::Due, &only_degrees);
    assert_eq!(due.last(), Some(&key("degree:1")));
}

#[test]
fn test_due_queue_dedupes_across_contexts() {
    let (mut store, clock) = fixture();
    store.record_attempt(&attempt(&["degree:4"], "scale_degree|melodic|minor", false));
    clock.advance_ms(10);
    store.record_attempt(&attempt(&["degree:4"], DEGREES, false));

    let entries = store.review_entries(ReviewStrategy::Due, &ReviewFilter::default());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context, context("scale_degree|melodic|minor"));

    let major_only = ReviewFilter {
        modes: Vec::new(),
        family: Some(TonalFamily::Major),
    };
    let entries = store.review_entries(ReviewStrategy::Due, &major_only);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context, context(DEGREES));
}

#[test]
fn test_weak_queue() {
    let (mut store, _clock) = fixture();
    // one attempt is not enough evidence
    store.record_attempt(&attempt(&["degree:7"], DEGREES, false));
    // two misses
    store.record_attempt(&attempt(&["degree:2"], DEGREES, false));
    store.record_attempt(&attempt(&["degree:2"], DEGREES, false));
    // miss then hit
    store.record_attempt(&attempt(&["degree:6"], DEGREES, false));
    store.record_attempt(&attempt(&["degree:6"], DEGREES, true));

    let weak = store.review_queue(ReviewStrategy::Weak, &ReviewFilter::default());
    assert_eq!(weak, vec![key("degree:2"), key("degree:6")]);

    let entries = store.review_entries(ReviewStrategy::Weak, &ReviewFilter::default());
    assert!(entries[0].weight > entries[1].weight);
}

#[test]
fn test_weight_lookup() {
    let (mut store, clock) = fixture();
    let degree = key("degree:3");
    assert_eq!(store.adaptive_weight_for_key(&degree, None), 1.0);

    store.record_attempt(&attempt(&["degree:3"], DEGREES, false));
    for _ in 0..10 {
        store.record_attempt(&attempt(&["degree:3"], "scale_degree|melodic|minor", true));
    }

    let major = context(DEGREES);
    let minor = context("scale_degree|melodic|minor");
    let missed = store.adaptive_weight_for_key(&degree, Some(&major));
    let known = store.adaptive_weight_for_key(&degree, Some(&minor));
    assert!(missed > known);
    assert_eq!(store.adaptive_weight_for_key(&degree, None), missed);
    assert_eq!(
        store.adaptive_weight_for_key(&degree, Some(&context("scale_degree|harmonic|major"))),
        1.0
    );

    let snapshot = store.snapshot();
    let weights = snapshot.weights_at(clock.now_ms());
    assert_eq!(weights.weight_for(&degree, &major), missed);
    assert_eq!(UniformWeights.weight_for(&degree, &major), 1.0);
}

#[test]
fn test_attempt_updates_every_key() {
    let (mut store, _clock) = fixture();
    store.record_attempt(&attempt(
        &["progression:I-IV-V-I", "cadence:authentic"],
        "progression|harmonic|major",
        true,
    ));
    let snapshot = store.snapshot();
    let ctx = context("progression|harmonic|major");
    assert_eq!(snapshot.bucket(&ctx, &key("progression:I-IV-V-I")).unwrap().attempts, 1);
    assert_eq!(snapshot.bucket(&ctx, &key("cadence:authentic")).unwrap().attempts, 1);
}

#[test]
fn test_weakest_areas() {
    let (mut store, _clock) = fixture();
    store.record_attempt(&attempt(&["degree:2"], DEGREES, false));
    store.record_attempt(&attempt(&["degree:5"], DEGREES, true));
    store.record_attempt(&attempt(&["chord:major"], "chord_quality|harmonic|major", true));
    store.record_attempt(&attempt(&["chord:major"], "chord_quality|harmonic|major", true));

    let areas = store.weakest_areas(&ReviewFilter::default(), 10);
    assert_eq!(areas.len(), 3);
    assert_eq!(areas[0].key, key("degree:2"));
    assert!(areas.windows(2).all(|w| w[0].mastery <= w[1].mastery));

    let areas = store.weakest_areas(&ReviewFilter::default(), 1);
    assert_eq!(areas.len(), 1);
}

#[test]
fn test_persisted_snapshot_and_listeners() {
    let writes = Rc::new(RefCell::new(Vec::new()));
    let mut memory = MemoryStore::new();
    let seen = Rc::clone(&writes);
    memory.subscribe(Box::new(move |k, value| {
        seen.borrow_mut().push((k.to_string(), value.clone()));
    }));

    let clock = FixedClock::new(START);
    let mut store = AdaptiveStore::with_clock(memory, clock);
    store.record_attempt(&attempt(&["degree:3"], DEGREES, true));
    store.record_attempt(&attempt(&["degree:3"], DEGREES, false));

    let writes = writes.borrow();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1].0, PROGRESS_KEY);
    let stored = &writes[1].1["buckets"][DEGREES]["degree:3"];
    assert_eq!(stored["attempts"], 2);
    assert_eq!(stored["wrong"], 1);
    assert_eq!(stored["lastOutcomeCorrect"], false);
}

#[test]
fn test_reads_repair_stored_progress() {
    let memory = MemoryStore::with_progress(json!({
        "version": 1,
        "buckets": {
            "scale_degree|melodic|major": {
                "degree:3": { "attempts": 3, "correct": 5, "dueAt": START - 1 },
                "interval:big": { "attempts": 3 },
            }
        }
    }));
    let store = AdaptiveStore::with_clock(memory, FixedClock::new(START));
    let snapshot = store.snapshot();
    let bucket = snapshot.bucket(&context(DEGREES), &key("degree:3")).unwrap();
    assert_eq!(bucket.correct, 3);
    assert_eq!(bucket.wrong, 0);
    assert_eq!(store.review_queue(ReviewStrategy::Due, &ReviewFilter::default()), vec![key("degree:3")]);
}

#[test]
fn test_reset_clears_progress() {
    let (mut store, _clock) = fixture();
    store.record_attempt(&attempt(&["degree:3"], DEGREES, false));
    store.reset();
    assert!(store.snapshot().buckets.is_empty());
    assert!(store.review_queue(ReviewStrategy::Due, &ReviewFilter::default()).is_empty());
    assert!(store.store().read(PROGRESS_KEY).is_some());
}

proptest! {
    #[test]
    fn prop_mastery_non_decreasing_when_correct(
        history in proptest::collection::vec(any::<bool>(), 0..12),
        streak in 1usize..25,
    ) {
        let mut bucket = AdaptiveBucket::default();
        for (i, correct) in history.iter().enumerate() {
            bucket.record(*correct, None, START + i as i64);
        }
        let mut previous = bucket.mastery;
        for i in 0..streak {
            bucket.record(true, None, START + 1_000 + i as i64);
            prop_assert!(bucket.mastery + 1e-12 >= previous);
            prop_assert!(bucket.mastery <= 1.0);
            previous = bucket.mastery;
        }
    }

    #[test]
    fn prop_wrong_answer_is_due_now(
        history in proptest::collection::vec(any::<bool>(), 0..20),
        at in 0i64..1_000_000,
    ) {
        let mut bucket = AdaptiveBucket::default();
        for (i, correct) in history.iter().enumerate() {
            bucket.record(*correct, Some(900), START + i as i64);
        }
        let now = START + 100 + at;
        bucket.record(false, None, now);
        prop_assert_eq!(bucket.interval_days, 0);
        prop_assert_eq!(bucket.due_at, now);
        prop_assert!(bucket.is_due(now));
    }

    #[test]
    fn prop_bucket_survives_normalization(
        outcomes in proptest::collection::vec((any::<bool>(), proptest::option::of(100u64..10_000)), 1..30),
    ) {
        let mut bucket = AdaptiveBucket::default();
        for (i, (correct, ms)) in outcomes.iter().enumerate() {
            bucket.record(*correct, *ms, START + i as i64 * DAY_MS);
        }
        let restored = normalize_bucket(&serde_json::to_value(&bucket).unwrap());
        prop_assert_eq!(restored.attempts, bucket.attempts);
        prop_assert_eq!(restored.correct, bucket.correct);
        prop_assert!((restored.mastery - bucket.mastery).abs() < 1e-9);
    }
}
