//! Progress snapshot, key/value persistence and the adaptive store built on top of them.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bucket::AdaptiveBucket;
use super::normalize::{normalize_snapshot, SNAPSHOT_VERSION};
use crate::concept::{ConceptKey, ConceptMode, ContextKey};
use crate::theory::TonalFamily;

/// Storage key the progress snapshot lives under.
pub const PROGRESS_KEY: &str = "eartrain.progress";

/// Called with `(key, new value)` after every write.
pub type ChangeListener = Box<dyn FnMut(&str, &Value)>;

/// Synchronous key/value store with change notification.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Option<Value>;
    fn write(&mut self, key: &str, value: Value);
    fn subscribe(&mut self, listener: ChangeListener);

    fn read_or(&self, key: &str, default: Value) -> Value {
        self.read(key).unwrap_or(default)
    }
}

/// In-memory [`KeyValueStore`]. Listeners fire only when a write changes the stored value.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
    listeners: Vec<ChangeListener>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a progress snapshot, e.g. loaded from disk.
    pub fn with_progress(progress: Value) -> Self {
        let mut store = Self::new();
        store.values.insert(PROGRESS_KEY.to_string(), progress);
        store
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("values", &self.values)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: Value) {
        if self.values.get(key) == Some(&value) {
            return;
        }
        for listener in self.listeners.iter_mut() {
            listener(key, &value);
        }
        self.values.insert(key.to_string(), value);
    }

    fn subscribe(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }
}

/// Source of the current time in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock. Clones share the same time, so a test can keep one handle and give
/// another to the store.
#[derive(Debug, Clone)]
pub struct FixedClock(Rc<Cell<i64>>);

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self(Rc::new(Cell::new(now_ms)))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.set(now_ms);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn advance_days(&self, days: i64) {
        self.advance_ms(days * super::bucket::DAY_MS);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }
}

/// One scored response, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub concept_keys: Vec<ConceptKey>,
    pub context: ContextKey,
    pub correct: bool,
    pub response_ms: Option<u64>,
}

/// Complete persisted progress: `context -> concept -> bucket`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub version: u32,
    pub buckets: BTreeMap<ContextKey, BTreeMap<ConceptKey, AdaptiveBucket>>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            buckets: BTreeMap::new(),
        }
    }
}

/// Sampling weight lookup used by the question generator.
pub trait AdaptiveWeights {
    fn weight_for(&self, key: &ConceptKey, context: &ContextKey) -> f64;
}

/// Every concept weighs the same.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeights;

impl AdaptiveWeights for UniformWeights {
    fn weight_for(&self, _key: &ConceptKey, _context: &ContextKey) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStrategy {
    Due,
    Weak,
}

impl ReviewStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "due" => Some(ReviewStrategy::Due),
            "weak" => Some(ReviewStrategy::Weak),
            _ => None,
        }
    }
}

/// Restricts which buckets a review considers. Empty `modes` means every mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    pub modes: Vec<ConceptMode>,
    pub family: Option<TonalFamily>,
}

impl ReviewFilter {
    pub fn matches(&self, context: &ContextKey) -> bool {
        (self.modes.is_empty() || self.modes.contains(&context.mode))
            && self.family.map_or(true, |family| family == context.family)
    }
}

/// A review candidate with the context it was tracked under.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    pub key: ConceptKey,
    pub context: ContextKey,
    pub due_at: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSummary {
    pub key: ConceptKey,
    pub context: ContextKey,
    pub attempts: u32,
    pub accuracy: f64,
    pub mastery: f64,
    pub weight: f64,
    pub due: bool,
}

impl ProgressSnapshot {
    pub fn bucket(&self, context: &ContextKey, key: &ConceptKey) -> Option<&AdaptiveBucket> {
        self.buckets.get(context).and_then(|concepts| concepts.get(key))
    }

    fn entries(&self) -> impl Iterator<Item = (&ContextKey, &ConceptKey, &AdaptiveBucket)> {
        self.buckets
            .iter()
            .flat_map(|(context, concepts)| concepts.iter().map(move |(key, bucket)| (context, key, bucket)))
    }

    pub fn record(&mut self, attempt: &AttemptRecord, now: i64) {
        let concepts = self.buckets.entry(attempt.context).or_default();
        for key in &attempt.concept_keys {
            concepts
                .entry(key.clone())
                .or_default()
                .record(attempt.correct, attempt.response_ms, now);
        }
    }

    /// Weight in one context, or the highest weight across contexts when none is given.
    pub fn weight_for_key(&self, key: &ConceptKey, context: Option<&ContextKey>, now: i64) -> f64 {
        match context {
            Some(context) => self.bucket(context, key).map_or(1.0, |b| b.weight(now)),
            None => self
                .entries()
                .filter(|(_, k, _)| *k == key)
                .map(|(_, _, bucket)| bucket.weight(now))
                .fold(1.0, f64::max),
        }
    }

    /// Review candidates, one per concept key.
    ///
    /// `Due` keeps the earliest due entry per key and sorts by ascending due time; `Weak` keeps
    /// the heaviest entry per key and sorts by descending weight. Remaining ties fall back to
    /// the key's string form.
    pub fn review_entries(
        &self,
        strategy: ReviewStrategy,
        filter: &ReviewFilter,
        now: i64,
    ) -> Vec<ReviewEntry> {
        let mut best: BTreeMap<&ConceptKey, ReviewEntry> = BTreeMap::new();

        for (context, key, bucket) in self.entries() {
            if !filter.matches(context) {
                continue;
            }
            let eligible = match strategy {
                ReviewStrategy::Due => bucket.is_due(now),
                ReviewStrategy::Weak => bucket.is_weak(),
            };
            if !eligible {
                continue;
            }
            let entry = ReviewEntry {
                key: key.clone(),
                context: *context,
                due_at: bucket.due_at,
                weight: bucket.weight(now),
            };
            let replace = match best.get(key) {
                None => true,
                Some(current) => match strategy {
                    ReviewStrategy::Due => entry.due_at < current.due_at,
                    ReviewStrategy::Weak => entry.weight > current.weight,
                },
            };
            if replace {
                best.insert(key, entry);
            }
        }

        let mut entries: Vec<ReviewEntry> = best.into_values().collect();
        match strategy {
            ReviewStrategy::Due => entries.sort_by(|a, b| {
                a.due_at
                    .cmp(&b.due_at)
                    .then_with(|| a.key.to_string().cmp(&b.key.to_string()))
            }),
            ReviewStrategy::Weak => entries.sort_by(|a, b| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.key.to_string().cmp(&b.key.to_string()))
            }),
        }
        entries
    }

    /// Attempted buckets, least mastered first.
    pub fn weakest_areas(&self, filter: &ReviewFilter, limit: usize, now: i64) -> Vec<AreaSummary> {
        let mut areas: Vec<AreaSummary> = self
            .entries()
            .filter(|(context, _, bucket)| bucket.attempts > 0 && filter.matches(context))
            .map(|(context, key, bucket)| AreaSummary {
                key: key.clone(),
                context: *context,
                attempts: bucket.attempts,
                accuracy: bucket.raw_accuracy(),
                mastery: bucket.mastery,
                weight: bucket.weight(now),
                due: bucket.is_due(now),
            })
            .collect();
        areas.sort_by(|a, b| {
            a.mastery
                .partial_cmp(&b.mastery)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal))
                .then_with(|| a.key.to_string().cmp(&b.key.to_string()))
        });
        areas.truncate(limit);
        areas
    }

    /// Borrow the snapshot as a weight table frozen at `now`.
    pub fn weights_at(&self, now: i64) -> SnapshotWeights<'_> {
        SnapshotWeights {
            snapshot: self,
            now,
        }
    }
}

/// [`AdaptiveWeights`] view over a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotWeights<'a> {
    snapshot: &'a ProgressSnapshot,
    now: i64,
}

impl AdaptiveWeights for SnapshotWeights<'_> {
    fn weight_for(&self, key: &ConceptKey, context: &ContextKey) -> f64 {
        self.snapshot.weight_for_key(key, Some(context), self.now)
    }
}

/// Mastery tracking over an injected key/value store.
///
/// The store is the single source of truth: every read re-loads and normalizes the persisted
/// snapshot, and [`record_attempt`](Self::record_attempt) overwrites it in full.
pub struct AdaptiveStore<S: KeyValueStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
}

impl<S: KeyValueStore> AdaptiveStore<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> AdaptiveStore<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        match self.store.read(PROGRESS_KEY) {
            Some(value) => normalize_snapshot(&value),
            None => ProgressSnapshot::default(),
        }
    }

    fn persist(&mut self, snapshot: &ProgressSnapshot) {
        match serde_json::to_value(snapshot) {
            Ok(value) => self.store.write(PROGRESS_KEY, value),
            Err(e) => tracing::error!(error = %e, "failed to serialize progress snapshot"),
        }
    }

    /// Fold one scored response into every bucket it touches and persist the whole snapshot.
    /// Not idempotent: call exactly once per response.
    pub fn record_attempt(&mut self, attempt: &AttemptRecord) {
        let now = self.clock.now_ms();
        let mut snapshot = self.snapshot();
        snapshot.record(attempt, now);
        tracing::info!(
            context = %attempt.context,
            keys = attempt.concept_keys.len(),
            correct = attempt.correct,
            "recorded attempt"
        );
        self.persist(&snapshot);
    }

    pub fn adaptive_weight_for_key(&self, key: &ConceptKey, context: Option<&ContextKey>) -> f64 {
        self.snapshot().weight_for_key(key, context, self.clock.now_ms())
    }

    pub fn review_queue(&self, strategy: ReviewStrategy, filter: &ReviewFilter) -> Vec<ConceptKey> {
        self.review_entries(strategy, filter)
            .into_iter()
            .map(|entry| entry.key)
            .collect()
    }

    pub fn review_entries(&self, strategy: ReviewStrategy, filter: &ReviewFilter) -> Vec<ReviewEntry> {
        self.snapshot().review_entries(strategy, filter, self.clock.now_ms())
    }

    pub fn weakest_areas(&self, filter: &ReviewFilter, limit: usize) -> Vec<AreaSummary> {
        self.snapshot().weakest_areas(filter, limit, self.clock.now_ms())
    }

    /// Drop every bucket.
    pub fn reset(&mut self) {
        tracing::info!("resetting progress");
        self.persist(&ProgressSnapshot::default());
    }
}
