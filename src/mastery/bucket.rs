//! Adaptive bucket: per (context, concept) performance and scheduling state.

use serde::{Deserialize, Serialize};

/// Smoothing factor of the rolling accuracy.
pub const EWMA_ALPHA: f64 = 0.35;
/// Attempts needed before mastery is trusted at full weight.
pub const CONFIDENCE_ATTEMPTS: f64 = 10.0;
/// Mastery at which a correct answer pushes the next review into the future.
pub const CONFIDENT_MASTERY: f64 = 0.82;
/// Review intervals in days.
pub const INTERVAL_LADDER: [u32; 5] = [1, 3, 7, 14, 30];
pub const DAY_MS: i64 = 86_400_000;

pub const WEAK_MASTERY: f64 = 0.72;
pub const WEAK_MIN_ATTEMPTS: u32 = 2;

const DUE_BOOST: f64 = 2.4;
const WEAKNESS_SCALE: f64 = 2.6;
const MISS_BOOST: f64 = 1.2;
const DECAY_PER_DAY: f64 = 0.08;
const DECAY_CAP: f64 = 1.6;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveBucket {
    pub attempts: u32,
    pub correct: u32,
    pub wrong: u32,
    /// EWMA of correctness, seeded by the first outcome
    pub rolling_accuracy: f64,
    /// Confidence-scaled blend of rolling and raw accuracy, 0..=1
    pub mastery: f64,
    pub avg_response_ms: f64,
    /// Attempts that reported a response time
    pub timed_attempts: u32,
    pub interval_days: u32,
    /// Epoch milliseconds
    pub due_at: i64,
    /// Epoch milliseconds
    pub last_seen: i64,
    pub last_outcome_correct: Option<bool>,
}

/// `(rolling*0.7 + raw*0.3) * min(1, attempts/10)`
pub fn compute_mastery(rolling_accuracy: f64, raw_accuracy: f64, attempts: u32) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    let confidence = (attempts as f64 / CONFIDENCE_ATTEMPTS).min(1.0);
    blended_accuracy(rolling_accuracy, raw_accuracy) * confidence
}

pub fn blended_accuracy(rolling_accuracy: f64, raw_accuracy: f64) -> f64 {
    rolling_accuracy * 0.7 + raw_accuracy * 0.3
}

/// Next rung of the ladder strictly above `current`, capped at the last rung.
pub fn next_interval(current: u32) -> u32 {
    INTERVAL_LADDER
        .iter()
        .copied()
        .find(|days| *days > current)
        .unwrap_or(INTERVAL_LADDER[INTERVAL_LADDER.len() - 1])
}

impl AdaptiveBucket {
    pub fn raw_accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.attempts > 0 && self.due_at <= now
    }

    pub fn is_weak(&self) -> bool {
        self.attempts >= WEAK_MIN_ATTEMPTS && self.mastery < WEAK_MASTERY
    }

    /// Fold one scored response into the bucket.
    pub fn record(&mut self, correct: bool, response_ms: Option<u64>, now: i64) {
        let outcome = if correct { 1.0 } else { 0.0 };
        self.rolling_accuracy = if self.attempts == 0 {
            outcome
        } else {
            self.rolling_accuracy + EWMA_ALPHA * (outcome - self.rolling_accuracy)
        };

        self.attempts += 1;
        if correct {
            self.correct += 1;
        } else {
            self.wrong += 1;
        }

        if let Some(ms) = response_ms {
            self.timed_attempts += 1;
            self.avg_response_ms += (ms as f64 - self.avg_response_ms) / self.timed_attempts as f64;
        }

        self.mastery = compute_mastery(self.rolling_accuracy, self.raw_accuracy(), self.attempts);
        self.last_seen = now;
        self.last_outcome_correct = Some(correct);

        if !correct {
            self.interval_days = 0;
            self.due_at = now;
        } else if self.mastery >= CONFIDENT_MASTERY {
            self.interval_days = next_interval(self.interval_days);
            self.due_at = now + self.interval_days as i64 * DAY_MS;
        } else {
            self.due_at = now;
        }
    }

    /// Sampling weight: `1 + due + weakness*2.6 + miss + decay`. Untouched buckets weigh 1.
    pub fn weight(&self, now: i64) -> f64 {
        if self.attempts == 0 {
            return 1.0;
        }
        let due = if self.is_due(now) { DUE_BOOST } else { 0.0 };
        let weakness = 1.0 - self.mastery;
        let miss = if self.last_outcome_correct == Some(false) {
            MISS_BOOST
        } else {
            0.0
        };
        let days_idle = (now - self.last_seen).max(0) as f64 / DAY_MS as f64;
        let decay = (days_idle * DECAY_PER_DAY).min(DECAY_CAP);
        1.0 + due + weakness * WEAKNESS_SCALE + miss + decay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_first_outcome_seeds_rolling_accuracy() {
        let mut bucket = AdaptiveBucket::default();
        bucket.record(false, None, NOW);
        assert_eq!(bucket.rolling_accuracy, 0.0);
        bucket.record(true, None, NOW);
        assert!((bucket.rolling_accuracy - 0.35).abs() < 1e-12);

        let mut bucket = AdaptiveBucket::default();
        bucket.record(true, None, NOW);
        assert_eq!(bucket.rolling_accuracy, 1.0);
        assert!((bucket.mastery - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_mastery_never_exceeds_blend() {
        let mut bucket = AdaptiveBucket::default();
        for (i, correct) in [true, false, true, true, false, true, true, true, true, true, true, true]
            .into_iter()
            .enumerate()
        {
            bucket.record(correct, None, NOW + i as i64);
            let blend = blended_accuracy(bucket.rolling_accuracy, bucket.raw_accuracy());
            assert!(bucket.mastery <= blend + 1e-12);
            assert!((0.0..=1.0).contains(&bucket.mastery));
        }
        assert_eq!(bucket.correct + bucket.wrong, bucket.attempts);
    }

    #[test]
    fn test_wrong_answer_resets_schedule() {
        let mut bucket = AdaptiveBucket::default();
        for _ in 0..12 {
            bucket.record(true, None, NOW);
        }
        assert!(bucket.interval_days > 0);
        assert!(bucket.due_at > NOW);

        bucket.record(false, None, NOW + 5);
        assert_eq!(bucket.interval_days, 0);
        assert_eq!(bucket.due_at, NOW + 5);
        assert!(bucket.is_due(NOW + 5));
    }

    #[test]
    fn test_interval_ladder() {
        assert_eq!(next_interval(0), 1);
        assert_eq!(next_interval(1), 3);
        assert_eq!(next_interval(3), 7);
        assert_eq!(next_interval(7), 14);
        assert_eq!(next_interval(14), 30);
        assert_eq!(next_interval(30), 30);
        assert_eq!(next_interval(5), 7);
    }

    #[test]
    fn test_average_response_time() {
        let mut bucket = AdaptiveBucket::default();
        bucket.record(true, Some(1000), NOW);
        bucket.record(true, None, NOW);
        bucket.record(false, Some(2000), NOW);
        assert_eq!(bucket.timed_attempts, 2);
        assert!((bucket.avg_response_ms - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_components() {
        assert_eq!(AdaptiveBucket::default().weight(NOW), 1.0);

        let mut missed = AdaptiveBucket::default();
        missed.record(false, None, NOW);
        // due 2.4 + weakness 2.6 + miss 1.2
        assert!((missed.weight(NOW) - 7.2).abs() < 1e-9);

        let mut solid = AdaptiveBucket::default();
        for _ in 0..10 {
            solid.record(true, None, NOW);
        }
        let fresh = solid.weight(NOW);
        let stale = solid.weight(NOW + 10 * DAY_MS);
        assert!(fresh < missed.weight(NOW));
        assert!(stale > fresh);
        // capped decay, and overdue by then
        let ancient = solid.weight(NOW + 400 * DAY_MS);
        assert!((ancient - (1.0 + 2.4 + 0.0 + 1.6)).abs() < 1e-9);
    }
}
