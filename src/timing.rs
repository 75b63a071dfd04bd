//! # Timing Builder
//!
//! Rhythm grids, onset patterns and tap scoring.
//!
//! ## Grid
//! A grid is `bars × beats × steps` slots, where steps is the subdivision of one beat. Compound
//! meters (6/8) have two dotted-quarter beats per bar and always subdivide in threes.
//!
//! ## Onset Patterns
//! - Slot 0 (the downbeat) is always sounded
//! - Between 35% and 60% of the slots are sounded
//! - A pattern is syncopated when an off-beat onset is followed by a silent beat
//!
//! ## Tap Scoring
//! Each target onset claims the nearest unused tap within the tolerance (in beats). Errors are
//! reported in milliseconds at the session tempo.
//!
//! ```rust
//! use eartrain::timing::score_taps;
//!
//! let score = score_taps(&[0.0, 1.0, 2.5, 3.0], &[0.05, 1.1, 3.9], 0.22, 90.0);
//! assert_eq!(score.matches.len(), 2);
//! assert_eq!(score.unmatched_targets, vec![2.5, 3.0]);
//! assert!(!score.passed);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Minimum share of grid slots that sound, in percent.
const MIN_DENSITY_PERCENT: usize = 35;
/// Maximum share of grid slots that sound, in percent.
const MAX_DENSITY_PERCENT: usize = 60;

/// Time signature used for rhythm questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Meter {
    pub numerator: u8,
    pub denominator: u8,
}

impl Meter {
    pub const TWO_FOUR: Meter = Meter { numerator: 2, denominator: 4 };
    pub const THREE_FOUR: Meter = Meter { numerator: 3, denominator: 4 };
    pub const FOUR_FOUR: Meter = Meter { numerator: 4, denominator: 4 };
    pub const FIVE_FOUR: Meter = Meter { numerator: 5, denominator: 4 };
    pub const SIX_EIGHT: Meter = Meter { numerator: 6, denominator: 8 };

    pub const ALL: [Meter; 5] = [
        Meter::TWO_FOUR,
        Meter::THREE_FOUR,
        Meter::FOUR_FOUR,
        Meter::FIVE_FOUR,
        Meter::SIX_EIGHT,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        Meter::ALL.into_iter().find(|m| m.to_string() == s)
    }

    pub fn is_compound(self) -> bool {
        self.denominator == 8 && self.numerator % 3 == 0
    }

    /// Felt beats per bar (6/8 has two).
    pub fn beats_per_bar(self) -> usize {
        if self.is_compound() {
            (self.numerator / 3) as usize
        } else {
            self.numerator as usize
        }
    }

    /// Meters unlocked at a difficulty level.
    pub fn pool(level: u8) -> Vec<Meter> {
        match level {
            0 | 1 => vec![Meter::TWO_FOUR, Meter::THREE_FOUR, Meter::FOUR_FOUR],
            2 => vec![Meter::TWO_FOUR, Meter::THREE_FOUR, Meter::FOUR_FOUR, Meter::SIX_EIGHT],
            _ => Meter::ALL.to_vec(),
        }
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl Serialize for Meter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Meter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Meter::from_str(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown meter '{}'", raw)))
    }
}

/// Number of grid steps per beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subdivision {
    Quarter,
    Eighth,
    Triplet,
    Sixteenth,
}

impl Subdivision {
    pub const ALL: [Subdivision; 4] = [
        Subdivision::Quarter,
        Subdivision::Eighth,
        Subdivision::Triplet,
        Subdivision::Sixteenth,
    ];

    pub fn steps_per_beat(self) -> usize {
        match self {
            Subdivision::Quarter => 1,
            Subdivision::Eighth => 2,
            Subdivision::Triplet => 3,
            Subdivision::Sixteenth => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subdivision::Quarter => "quarter",
            Subdivision::Eighth => "eighth",
            Subdivision::Triplet => "triplet",
            Subdivision::Sixteenth => "sixteenth",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Subdivision::ALL.into_iter().find(|sub| sub.as_str() == s)
    }

    pub fn pool(level: u8) -> Vec<Subdivision> {
        match level {
            0 | 1 => vec![Subdivision::Quarter, Subdivision::Eighth],
            2 => vec![Subdivision::Quarter, Subdivision::Eighth, Subdivision::Triplet],
            _ => Subdivision::ALL.to_vec(),
        }
    }
}

/// Probability that an unconstrained pattern is built syncopated.
pub fn syncopation_chance(level: u8) -> f64 {
    match level {
        0 | 1 => 0.15,
        2 => 0.35,
        _ => 0.55,
    }
}

pub fn bars_for_level(level: u8) -> usize {
    (level.clamp(1, 3) as usize) + 1
}

/// Shape of a rhythm grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmGrid {
    pub meter: Meter,
    pub subdivision: Subdivision,
    pub bars: usize,
}

impl RhythmGrid {
    /// Compound meters only take triplet subdivision; fewer than two bars is raised to two so
    /// the density bounds always admit a whole number of onsets.
    pub fn new(meter: Meter, subdivision: Subdivision, bars: usize) -> Self {
        let subdivision = if meter.is_compound() {
            Subdivision::Triplet
        } else {
            subdivision
        };
        Self {
            meter,
            subdivision,
            bars: bars.max(2),
        }
    }

    pub fn steps_per_beat(&self) -> usize {
        self.subdivision.steps_per_beat()
    }

    pub fn total_beats(&self) -> usize {
        self.bars * self.meter.beats_per_bar()
    }

    pub fn slot_count(&self) -> usize {
        self.total_beats() * self.steps_per_beat()
    }

    pub fn slot_to_beat(&self, slot: usize) -> f64 {
        slot as f64 / self.steps_per_beat() as f64
    }

    fn is_beat_slot(&self, slot: usize) -> bool {
        slot % self.steps_per_beat() == 0
    }

    /// Next beat slot strictly after `slot`.
    fn next_beat_slot(&self, slot: usize) -> usize {
        (slot / self.steps_per_beat() + 1) * self.steps_per_beat()
    }

    /// Inclusive range of onset counts allowed on this grid.
    pub fn onset_bounds(&self) -> (usize, usize) {
        let n = self.slot_count();
        let lo = (n * MIN_DENSITY_PERCENT).div_ceil(100);
        let hi = n * MAX_DENSITY_PERCENT / 100;
        (lo.max(1), hi.max(lo.max(1)))
    }
}

/// Concrete onsets on a grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmPattern {
    pub grid: RhythmGrid,
    pub onset_slots: Vec<usize>,
    pub syncopated: bool,
}

impl RhythmPattern {
    /// Onset positions in beats from the start of the pattern.
    pub fn target_beats(&self) -> Vec<f64> {
        self.onset_slots
            .iter()
            .map(|slot| self.grid.slot_to_beat(*slot))
            .collect()
    }

    /// Compact notation, one character per slot, bars separated by `|`.
    pub fn notation(&self) -> String {
        let per_bar = self.grid.meter.beats_per_bar() * self.grid.steps_per_beat();
        let onsets: BTreeSet<usize> = self.onset_slots.iter().copied().collect();
        let mut out = String::new();
        for slot in 0..self.grid.slot_count() {
            if slot > 0 && slot % per_bar == 0 {
                out.push('|');
            }
            out.push(if onsets.contains(&slot) { 'x' } else { '.' });
        }
        out
    }
}

pub fn is_syncopated(grid: &RhythmGrid, onsets: &BTreeSet<usize>) -> bool {
    let n = grid.slot_count();
    onsets.iter().any(|&slot| {
        if grid.is_beat_slot(slot) {
            return false;
        }
        let next = grid.next_beat_slot(slot);
        next < n && !onsets.contains(&next)
    })
}

/// Build an onset pattern.
///
/// `syncopated` pins the outcome when `Some`; otherwise the pattern is syncopated with
/// probability `syncopation_chance`. Quarter-note grids cannot be syncopated and are always
/// straight.
pub fn build_pattern<R: Rng + ?Sized>(
    grid: RhythmGrid,
    syncopated: Option<bool>,
    syncopation_chance: f64,
    rng: &mut R,
) -> RhythmPattern {
    let n = grid.slot_count();
    let steps = grid.steps_per_beat();
    let want_syncopation = steps > 1
        && syncopated.unwrap_or_else(|| rng.gen_bool(syncopation_chance.clamp(0.0, 1.0)));

    let (lo, hi) = grid.onset_bounds();
    let count = rng.gen_range(lo..=hi);

    let mut candidates: Vec<(usize, f64)> = (1..n)
        .map(|slot| {
            let weight = if grid.is_beat_slot(slot) {
                3.0
            } else if want_syncopation {
                2.0
            } else {
                1.0
            };
            (slot, weight)
        })
        .collect();

    let mut onsets = BTreeSet::from([0usize]);
    while onsets.len() < count && !candidates.is_empty() {
        let total: f64 = candidates.iter().map(|(_, w)| w).sum();
        let mut pick = rng.gen_range(0.0..total);
        let mut chosen = candidates.len() - 1;
        for (i, (_, weight)) in candidates.iter().enumerate() {
            if pick < *weight {
                chosen = i;
                break;
            }
            pick -= weight;
        }
        let (slot, _) = candidates.remove(chosen);
        onsets.insert(slot);
    }

    if want_syncopation && !is_syncopated(&grid, &onsets) {
        add_syncopation(&grid, &mut onsets);
    } else if !want_syncopation {
        remove_syncopation(&grid, &mut onsets);
    }

    let syncopated = is_syncopated(&grid, &onsets);
    RhythmPattern {
        grid,
        onset_slots: onsets.into_iter().collect(),
        syncopated,
    }
}

/// Anticipate one beat by a step, or failing that move a sounded slot onto an off-beat that
/// precedes a silent beat. Keeps the onset count.
fn add_syncopation(grid: &RhythmGrid, onsets: &mut BTreeSet<usize>) {
    let n = grid.slot_count();
    let anticipated = onsets
        .iter()
        .copied()
        .find(|&slot| slot > 0 && grid.is_beat_slot(slot) && !onsets.contains(&(slot - 1)));
    if let Some(beat) = anticipated {
        onsets.remove(&beat);
        onsets.insert(beat - 1);
        return;
    }

    let target = (1..n).find(|&slot| {
        !grid.is_beat_slot(slot) && !onsets.contains(&slot) && {
            let next = grid.next_beat_slot(slot);
            next < n && !onsets.contains(&next)
        }
    });
    let donor = onsets.iter().copied().rev().find(|&slot| slot > 0);
    if let (Some(target), Some(donor)) = (target, donor) {
        onsets.remove(&donor);
        onsets.insert(target);
    }
}

/// Push every syncopating off-beat onto the silent beat that follows it. Keeps the onset count.
fn remove_syncopation(grid: &RhythmGrid, onsets: &mut BTreeSet<usize>) {
    let n = grid.slot_count();
    loop {
        let offender = onsets.iter().copied().find(|&slot| {
            !grid.is_beat_slot(slot) && {
                let next = grid.next_beat_slot(slot);
                next < n && !onsets.contains(&next)
            }
        });
        match offender {
            Some(slot) => {
                onsets.remove(&slot);
                onsets.insert(grid.next_beat_slot(slot));
            }
            None => break,
        }
    }
}

/// One target onset matched to a tap
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapMatch {
    pub target_beat: f64,
    pub tapped_beat: f64,
    /// Signed timing error, positive when late
    pub error_ms: f64,
}

/// Result of comparing tapped beats to target beats
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapScore {
    pub matches: Vec<TapMatch>,
    pub unmatched_targets: Vec<f64>,
    pub extra_taps: Vec<f64>,
    pub tolerance_ms: f64,
    /// Share of targets matched, 0..=1
    pub accuracy: f64,
    pub mean_abs_error_ms: f64,
    /// Every target matched and no stray taps
    pub passed: bool,
}

pub fn beats_to_ms(beats: f64, tempo_bpm: f64) -> f64 {
    beats * 60_000.0 / tempo_bpm.max(1.0)
}

/// Score tapped beats against target beats by nearest-neighbour matching.
pub fn score_taps(targets: &[f64], taps: &[f64], tolerance_beats: f64, tempo_bpm: f64) -> TapScore {
    let mut used = vec![false; taps.len()];
    let mut matches = Vec::new();
    let mut unmatched_targets = Vec::new();

    for &target in targets {
        let nearest = taps
            .iter()
            .enumerate()
            .filter(|(i, tap)| !used[*i] && (*tap - target).abs() <= tolerance_beats)
            .min_by(|(_, a), (_, b)| {
                (*a - target)
                    .abs()
                    .partial_cmp(&(*b - target).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match nearest {
            Some((i, &tap)) => {
                used[i] = true;
                matches.push(TapMatch {
                    target_beat: target,
                    tapped_beat: tap,
                    error_ms: beats_to_ms(tap - target, tempo_bpm),
                });
            }
            None => unmatched_targets.push(target),
        }
    }

    let extra_taps: Vec<f64> = taps
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(tap, _)| *tap)
        .collect();

    let accuracy = if targets.is_empty() {
        1.0
    } else {
        matches.len() as f64 / targets.len() as f64
    };
    let mean_abs_error_ms = if matches.is_empty() {
        0.0
    } else {
        matches.iter().map(|m| m.error_ms.abs()).sum::<f64>() / matches.len() as f64
    };

    TapScore {
        passed: unmatched_targets.is_empty() && extra_taps.is_empty(),
        matches,
        unmatched_targets,
        extra_taps,
        tolerance_ms: beats_to_ms(tolerance_beats, tempo_bpm),
        accuracy,
        mean_abs_error_ms,
    }
}
