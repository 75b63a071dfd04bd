//! Repair of persisted progress on read.
//!
//! Stored progress may come from older builds or be hand-edited. Nothing here rejects input:
//! each field falls back to a sane default, counters are made consistent with each other and
//! entries whose keys no longer parse are dropped.

use std::collections::BTreeMap;

use serde_json::Value;

use super::bucket::{blended_accuracy, compute_mastery, AdaptiveBucket, INTERVAL_LADDER};
use super::store::ProgressSnapshot;
use crate::concept::{ConceptKey, ContextKey};

pub const SNAPSHOT_VERSION: u32 = 1;

fn count(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                v.min(u32::MAX as u64) as u32
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f > 0.0 => f.floor().min(u32::MAX as f64) as u32,
                    _ => 0,
                }
            }
        }
        _ => 0,
    }
}

fn unit(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite())
        .map(|f| f.clamp(0.0, 1.0))
}

fn timestamp(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Rebuild a bucket field by field.
pub fn normalize_bucket(value: &Value) -> AdaptiveBucket {
    let field = |name: &str| value.get(name);

    let attempts = count(field("attempts"));
    let correct = count(field("correct")).min(attempts);
    let wrong = attempts - correct;
    let raw = if attempts == 0 {
        0.0
    } else {
        correct as f64 / attempts as f64
    };

    let rolling_accuracy = if attempts == 0 {
        0.0
    } else {
        unit(field("rollingAccuracy")).unwrap_or(raw)
    };

    let mastery = if attempts == 0 {
        0.0
    } else {
        let ceiling = blended_accuracy(rolling_accuracy, raw);
        unit(field("mastery"))
            .unwrap_or_else(|| compute_mastery(rolling_accuracy, raw, attempts))
            .min(ceiling)
    };

    let timed_attempts = count(field("timedAttempts")).min(attempts);
    let avg_response_ms = field("avgResponseMs")
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite() && *f >= 0.0)
        .unwrap_or(0.0);

    let max_interval = INTERVAL_LADDER[INTERVAL_LADDER.len() - 1];
    let interval_days = count(field("intervalDays")).min(max_interval);

    let last_outcome_correct = field("lastOutcomeCorrect").and_then(Value::as_bool);

    AdaptiveBucket {
        attempts,
        correct,
        wrong,
        rolling_accuracy,
        mastery,
        avg_response_ms,
        timed_attempts,
        interval_days,
        due_at: timestamp(field("dueAt")),
        last_seen: timestamp(field("lastSeen")),
        last_outcome_correct: if attempts == 0 {
            None
        } else {
            last_outcome_correct
        },
    }
}

/// Rebuild a whole snapshot, dropping entries with unrecognised context or concept keys.
pub fn normalize_snapshot(value: &Value) -> ProgressSnapshot {
    let mut buckets: BTreeMap<ContextKey, BTreeMap<ConceptKey, AdaptiveBucket>> = BTreeMap::new();

    if let Some(contexts) = value.get("buckets").and_then(Value::as_object) {
        for (raw_context, concepts) in contexts {
            let context: ContextKey = match raw_context.parse() {
                Ok(context) => context,
                Err(_) => {
                    tracing::warn!(context = %raw_context, "dropping progress for unknown context");
                    continue;
                }
            };
            let Some(concepts) = concepts.as_object() else {
                tracing::warn!(context = %raw_context, "dropping malformed context entry");
                continue;
            };
            for (raw_key, bucket) in concepts {
                match raw_key.parse::<ConceptKey>() {
                    Ok(key) => {
                        buckets
                            .entry(context)
                            .or_default()
                            .insert(key, normalize_bucket(bucket));
                    }
                    Err(_) => {
                        tracing::warn!(concept = %raw_key, "dropping progress for unknown concept key");
                    }
                }
            }
        }
    }

    ProgressSnapshot {
        version: SNAPSHOT_VERSION,
        buckets,
    }
}
