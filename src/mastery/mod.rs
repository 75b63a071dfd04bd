//! # Mastery Module
//!
//! Tracks how well each concept is known and decides what deserves practice next.
//!
//! ## Sub-modules
//! - `bucket` - per (context, concept) accuracy, mastery and review schedule
//! - `store` - progress snapshot, key/value persistence, review queues
//! - `normalize` - field-by-field repair of persisted progress
//!
//! ## Key Types
//! - [`AdaptiveStore`] - record attempts, read weights and review queues
//! - [`AdaptiveBucket`] - one concept's state in one context
//! - [`KeyValueStore`] - injected persistence, [`MemoryStore`] in memory
//!
//! ## Example
//! ```rust
//! use eartrain::mastery::{AdaptiveStore, AttemptRecord, FixedClock, MemoryStore, ReviewFilter, ReviewStrategy};
//! use eartrain::{ConceptKey, ContextKey};
//!
//! let clock = FixedClock::new(1_700_000_000_000);
//! let mut store = AdaptiveStore::with_clock(MemoryStore::new(), clock.clone());
//!
//! let key: ConceptKey = "degree:3".parse().unwrap();
//! let context: ContextKey = "scale_degree|melodic|major".parse().unwrap();
//! store.record_attempt(&AttemptRecord {
//!     concept_keys: vec![key.clone()],
//!     context,
//!     correct: false,
//!     response_ms: Some(2400),
//! });
//!
//! let due = store.review_queue(ReviewStrategy::Due, &ReviewFilter::default());
//! assert_eq!(due, vec![key]);
//! ```

mod bucket;
mod normalize;
mod store;

pub use bucket::*;
pub use normalize::{normalize_bucket, normalize_snapshot, SNAPSHOT_VERSION};
pub use store::*;

#[cfg(test)]
mod tests;
